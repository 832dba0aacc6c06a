//! Shared types for the PARLAY-EDGE engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that odds, scoring, settlement
//! and backtest modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::odds;

// ---------------------------------------------------------------------------
// Sides
// ---------------------------------------------------------------------------

/// The side of a prop line or matchup a pick is on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Over,
    Under,
    /// A team / participant side (moneyline, spread).
    Team(String),
}

impl Side {
    /// The over/under direction, if this is a totals-style side.
    pub fn line_side(&self) -> Option<LineSide> {
        match self {
            Side::Over => Some(LineSide::Over),
            Side::Under => Some(LineSide::Under),
            Side::Team(_) => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Over => write!(f, "over"),
            Side::Under => write!(f, "under"),
            Side::Team(team) => write!(f, "{team}"),
        }
    }
}

/// Direction against a numeric line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSide {
    Over,
    Under,
}

impl From<LineSide> for Side {
    fn from(side: LineSide) -> Self {
        match side {
            LineSide::Over => Side::Over,
            LineSide::Under => Side::Under,
        }
    }
}

impl std::str::FromStr for LineSide {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "over" | "o" => Ok(LineSide::Over),
            "under" | "u" => Ok(LineSide::Under),
            other => Err(EdgeError::UnsupportedSide(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes & tiers
// ---------------------------------------------------------------------------

/// Settlement state of a pick. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Pending,
    Hit,
    Miss,
    Push,
    Void,
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    /// Hit or miss: the outcomes that count toward a hit rate.
    pub fn is_decided(&self) -> bool {
        matches!(self, Outcome::Hit | Outcome::Miss)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pending => write!(f, "pending"),
            Outcome::Hit => write!(f, "hit"),
            Outcome::Miss => write!(f, "miss"),
            Outcome::Push => write!(f, "push"),
            Outcome::Void => write!(f, "void"),
        }
    }
}

/// Discrete confidence bucket derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceTier {
    Elite,
    Strong,
    Standard,
    Weak,
    /// Disqualified by a `block` penalty rule.
    Blocked,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Elite => write!(f, "ELITE"),
            ConfidenceTier::Strong => write!(f, "STRONG"),
            ConfidenceTier::Standard => write!(f, "STANDARD"),
            ConfidenceTier::Weak => write!(f, "WEAK"),
            ConfidenceTier::Blocked => write!(f, "BLOCKED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Odds quotes
// ---------------------------------------------------------------------------

/// A single bookmaker price on one side of a market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub side: Side,
    pub american_odds: i32,
    /// Raw single-side probability (no vig removal), always in (0, 1).
    pub implied_probability: f64,
    pub bookmaker: String,
    pub observed_at: DateTime<Utc>,
}

impl OddsQuote {
    /// Build a quote, validating the price and deriving its implied probability.
    pub fn new(
        side: Side,
        american_odds: i32,
        bookmaker: impl Into<String>,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, EdgeError> {
        let implied_probability = odds::implied_probability(american_odds)?;
        Ok(Self {
            side,
            american_odds,
            implied_probability,
            bookmaker: bookmaker.into(),
            observed_at,
        })
    }
}

impl fmt::Display for OddsQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {:+} ({:.1}%)",
            self.bookmaker,
            self.side,
            self.american_odds,
            self.implied_probability * 100.0,
        )
    }
}

// ---------------------------------------------------------------------------
// Picks
// ---------------------------------------------------------------------------

/// A candidate pick proposed by one or more scoring engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickCandidate {
    pub id: String,
    /// Player, team or event the pick is about.
    pub subject_id: String,
    /// League / sport bucket, e.g. "NBA".
    pub category: String,
    /// e.g. "points", "rebounds", "spread".
    pub prop_type: String,
    pub line: f64,
    pub recommended_side: Side,
    /// Price available when the pick was made.
    #[serde(default)]
    pub american_odds: Option<i32>,
    /// Model edge over the market, in probability points.
    #[serde(default)]
    pub edge: Option<f64>,
    /// Raw score per engine name.
    #[serde(default)]
    pub per_engine_scores: BTreeMap<String, f64>,
    /// Pattern tags raised by upstream detectors (e.g. "reverse_line_move").
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub composite_score: Option<f64>,
    #[serde(default)]
    pub confidence_tier: Option<ConfidenceTier>,
    /// Engines that carried weight in the composite.
    #[serde(default)]
    pub contributing_engines: Option<usize>,
    #[serde(default)]
    pub outcome: Outcome,
    pub created_at: DateTime<Utc>,
}

impl PickCandidate {
    /// A fresh, unscored, pending pick.
    pub fn new(
        id: impl Into<String>,
        subject_id: impl Into<String>,
        prop_type: impl Into<String>,
        line: f64,
        recommended_side: Side,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            category: String::new(),
            prop_type: prop_type.into(),
            line,
            recommended_side,
            american_odds: None,
            edge: None,
            per_engine_scores: BTreeMap::new(),
            tags: Vec::new(),
            composite_score: None,
            confidence_tier: None,
            contributing_engines: None,
            outcome: Outcome::Pending,
            created_at,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_terminal()
    }

    /// Key identifying "the same pick" across engines: subject + prop + side.
    pub fn dedupe_key(&self) -> (String, String, Side) {
        (
            self.subject_id.clone(),
            self.prop_type.to_lowercase(),
            self.recommended_side.clone(),
        )
    }
}

impl fmt::Display for PickCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.id, self.subject_id, self.prop_type, self.recommended_side, self.line,
        )?;
        if let Some(score) = self.composite_score {
            write!(f, " | score={score:.1}")?;
        }
        if let Some(tier) = self.confidence_tier {
            write!(f, " [{tier}]")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Settlement of a single pick. Never mutated once the outcome is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    /// Reference to the settled pick (by id, not ownership).
    pub pick_id: String,
    #[serde(default)]
    pub actual_value: Option<f64>,
    pub outcome: Outcome,
    #[serde(default)]
    pub clv: Option<ClosingLineValue>,
    #[serde(default)]
    pub void_reason: Option<String>,
    #[serde(default)]
    pub settled_at: Option<DateTime<Utc>>,
}

/// Direction of closing-line value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClvDirection {
    Positive,
    Negative,
    Neutral,
}

/// Whether the price taken beat the closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClosingLineValue {
    pub direction: ClvDirection,
    /// Closing minus opening implied probability, in probability points.
    pub magnitude: f64,
    /// Recorded for reporting; does not influence the direction.
    pub side_won: bool,
}

// ---------------------------------------------------------------------------
// Time windows
// ---------------------------------------------------------------------------

/// Half-open `[start, end)` window over settlement timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d"),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PARLAY-EDGE.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EdgeError {
    #[error("Invalid American odds: {0}")]
    InvalidOdds(i32),

    #[error("Invalid decimal odds: {0} (must be > 1.0)")]
    InvalidDecimalOdds(f64),

    #[error("Cannot combine a parlay with no legs")]
    EmptyParlay,

    #[error("No engine contributed a score for pick {0}")]
    NoSignals(String),

    #[error("Pick {pick_id} already settled as {outcome}")]
    AlreadySettled { pick_id: String, outcome: Outcome },

    #[error("Pick {0} cannot be resolved to pending")]
    InvalidOutcome(String),

    #[error("Unsupported side for line settlement: {0}")]
    UnsupportedSide(String),

    #[error("Baseline run not found: {0}")]
    BaselineNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
