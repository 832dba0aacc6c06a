//! Historical backtesting engine.
//!
//! Replays settled picks through the scoring and settlement logic and
//! rolls them up into grouped statistics: hit rate, unit P&L, ROI and
//! average edge per category / prop type / tier / side / time bucket.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::odds;
use crate::scoring::{ScoringConfig, SignalAggregator};
use crate::settlement::classify;
use crate::types::{
    ConfidenceTier, DateRange, EdgeError, Outcome, PickCandidate, SettlementRecord,
};

// ---------------------------------------------------------------------------
// Historical pick data
// ---------------------------------------------------------------------------

/// A pick together with its settlement; the unit a backtest replays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettledPick {
    pub pick: PickCandidate,
    pub settlement: SettlementRecord,
}

impl SettledPick {
    pub fn new(pick: PickCandidate, settlement: SettlementRecord) -> Self {
        Self { pick, settlement }
    }

    /// Outcome re-derived from the recorded value where possible.
    ///
    /// Voids and externally resolved picks keep their recorded outcome.
    pub fn replayed_outcome(&self) -> Outcome {
        match (self.settlement.outcome, self.settlement.actual_value) {
            (Outcome::Pending, _) | (Outcome::Void, _) => self.settlement.outcome,
            (recorded, Some(actual)) => match self.pick.recommended_side.line_side() {
                Some(side) => classify(self.pick.line, actual, side),
                None => recorded,
            },
            (recorded, None) => recorded,
        }
    }

    /// Timestamp used for date filtering and time buckets.
    pub fn settled_at(&self) -> DateTime<Utc> {
        self.settlement.settled_at.unwrap_or(self.pick.created_at)
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// A field picks can be grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Category,
    PropType,
    Tier,
    Side,
    /// Settlement day (UTC), `YYYY-MM-DD`.
    Day,
    /// Settlement month (UTC), `YYYY-MM`.
    Month,
}

impl GroupField {
    fn name(&self) -> &'static str {
        match self {
            GroupField::Category => "category",
            GroupField::PropType => "prop_type",
            GroupField::Tier => "tier",
            GroupField::Side => "side",
            GroupField::Day => "day",
            GroupField::Month => "month",
        }
    }

    fn value_for(&self, p: &SettledPick) -> String {
        match self {
            GroupField::Category if p.pick.category.is_empty() => "unknown".to_string(),
            GroupField::Category => p.pick.category.clone(),
            GroupField::PropType => p.pick.prop_type.to_lowercase(),
            GroupField::Tier => p
                .pick
                .confidence_tier
                .map(|t| t.to_string())
                .unwrap_or_else(|| "UNSCORED".to_string()),
            GroupField::Side => p.pick.recommended_side.to_string(),
            GroupField::Day => p.settled_at().format("%Y-%m-%d").to_string(),
            GroupField::Month => p.settled_at().format("%Y-%m").to_string(),
        }
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for GroupField {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "category" | "league" => Ok(GroupField::Category),
            "prop_type" | "prop" => Ok(GroupField::PropType),
            "tier" => Ok(GroupField::Tier),
            "side" => Ok(GroupField::Side),
            "day" | "date" => Ok(GroupField::Day),
            "month" => Ok(GroupField::Month),
            other => Err(EdgeError::Config(format!("unknown group field: {other}"))),
        }
    }
}

/// `field=value` pairs joined by `|`, or `all` with no grouping.
pub fn group_key(pick: &SettledPick, group_by: &[GroupField]) -> String {
    if group_by.is_empty() {
        return "all".to_string();
    }
    group_by
        .iter()
        .map(|f| format!("{}={}", f.name(), f.value_for(pick)))
        .collect::<Vec<_>>()
        .join("|")
}

// ---------------------------------------------------------------------------
// Group statistics
// ---------------------------------------------------------------------------

/// Aggregate accuracy for one group of picks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub group_key: String,
    pub total_picks: usize,
    pub hits: usize,
    pub misses: usize,
    pub pushes: usize,
    pub voids: usize,
    /// hits / (hits + misses); `None` when nothing was decided.
    pub hit_rate: Option<f64>,
    /// Mean edge over picks that carry one.
    pub avg_edge: Option<f64>,
    /// Flat one-unit staking profit over decided picks with a price.
    pub units: Decimal,
    pub staked: Decimal,
    /// units / staked; `None` when nothing was staked.
    pub roi: Option<f64>,
}

impl GroupStats {
    pub fn empty(group_key: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            total_picks: 0,
            hits: 0,
            misses: 0,
            pushes: 0,
            voids: 0,
            hit_rate: None,
            avg_edge: None,
            units: Decimal::ZERO,
            staked: Decimal::ZERO,
            roi: None,
        }
    }

    pub fn decided(&self) -> usize {
        self.hits + self.misses
    }
}

impl fmt::Display for GroupStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self
            .hit_rate
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let roi = self
            .roi
            .map(|r| format!("{:+.1}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        write!(
            f,
            "{}: {} picks ({}-{}-{}, {} void) hit={} units={:+.2} roi={}",
            self.group_key,
            self.total_picks,
            self.hits,
            self.misses,
            self.pushes,
            self.voids,
            rate,
            self.units,
            roi,
        )
    }
}

/// Roll a group of picks into statistics. Pending picks are skipped.
pub fn summarize<'a>(
    group_key: impl Into<String>,
    picks: impl IntoIterator<Item = &'a SettledPick>,
) -> GroupStats {
    let mut stats = GroupStats::empty(group_key);
    let mut edge_sum = 0.0;
    let mut edge_count = 0usize;

    for p in picks {
        let outcome = p.replayed_outcome();
        match outcome {
            Outcome::Pending => continue,
            Outcome::Hit => stats.hits += 1,
            Outcome::Miss => stats.misses += 1,
            Outcome::Push => stats.pushes += 1,
            Outcome::Void => stats.voids += 1,
        }
        stats.total_picks += 1;

        if let Some(edge) = p.pick.edge.filter(|e| e.is_finite()) {
            edge_sum += edge;
            edge_count += 1;
        }

        if outcome.is_decided() {
            if let Some(price) = p.pick.american_odds {
                match unit_result(outcome, price) {
                    Ok(result) => {
                        stats.units += result;
                        stats.staked += Decimal::ONE;
                    }
                    Err(e) => warn!(pick_id = %p.pick.id, error = %e, "Skipping unit P&L"),
                }
            }
        }
    }

    let decided = stats.decided();
    if decided > 0 {
        stats.hit_rate = Some(stats.hits as f64 / decided as f64);
    }
    if edge_count > 0 {
        stats.avg_edge = Some(edge_sum / edge_count as f64);
    }
    if stats.staked > Decimal::ZERO {
        stats.roi = (stats.units / stats.staked).to_f64();
    }
    stats
}

/// Profit of a one-unit stake on a decided pick.
fn unit_result(outcome: Outcome, american_odds: i32) -> Result<Decimal, EdgeError> {
    let profit = odds::compute_profit(Decimal::ONE, american_odds)?;
    Ok(if outcome == Outcome::Hit { profit } else { -Decimal::ONE })
}

// ---------------------------------------------------------------------------
// Backtest runs
// ---------------------------------------------------------------------------

/// Grouping and re-scoring settings for a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub group_by: Vec<GroupField>,
    /// Re-score picks with the current scoring config before grouping.
    pub rescore: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            group_by: vec![GroupField::Tier],
            rescore: false,
        }
    }
}

/// Identity and window of a backtest invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestRequest {
    pub run_id: String,
    pub range: DateRange,
    pub category: Option<String>,
    pub baseline_run_id: Option<String>,
    /// Recorded on the run; supplied by the caller so runs are reproducible.
    pub completed_at: DateTime<Utc>,
}

/// Settings captured on a run so it can be compared later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfigSnapshot {
    pub group_by: Vec<GroupField>,
    #[serde(default)]
    pub scoring: Option<ScoringConfig>,
}

/// Completed backtest. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub id: String,
    pub range: DateRange,
    #[serde(default)]
    pub category: Option<String>,
    pub config: RunConfigSnapshot,
    pub overall: GroupStats,
    pub groups: Vec<GroupStats>,
    /// Picks dropped because a block rule now disqualifies them.
    #[serde(default)]
    pub blocked: usize,
    /// Weak reference to a prior run, by id.
    #[serde(default)]
    pub baseline_run_id: Option<String>,
    pub completed_at: DateTime<Utc>,
}

pub struct BacktestAggregator {
    group_by: Vec<GroupField>,
    scorer: Option<SignalAggregator>,
}

impl BacktestAggregator {
    pub fn new(group_by: Vec<GroupField>) -> Self {
        Self { group_by, scorer: None }
    }

    /// Build from config; re-scoring uses the supplied scoring config.
    pub fn from_config(config: &BacktestConfig, scoring: &ScoringConfig) -> Self {
        let scorer = config
            .rescore
            .then(|| SignalAggregator::new(scoring.clone()));
        Self {
            group_by: config.group_by.clone(),
            scorer,
        }
    }

    /// Re-score picks with this aggregator before grouping.
    pub fn with_rescoring(mut self, scorer: SignalAggregator) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn group_by(&self) -> &[GroupField] {
        &self.group_by
    }

    /// Settled picks inside the window, optionally limited to one category.
    pub fn filter<'a>(
        picks: &'a [SettledPick],
        range: &DateRange,
        category: Option<&str>,
    ) -> Vec<&'a SettledPick> {
        picks
            .iter()
            .filter(|p| p.settlement.outcome.is_terminal())
            .filter(|p| range.contains(p.settled_at()))
            .filter(|p| category.map_or(true, |c| p.pick.category.eq_ignore_ascii_case(c)))
            .collect()
    }

    /// Group picks and summarise each group, ordered by group key.
    ///
    /// With no grouping fields a single `all` group is always returned.
    pub fn aggregate(picks: &[&SettledPick], group_by: &[GroupField]) -> Vec<GroupStats> {
        if group_by.is_empty() {
            return vec![summarize("all", picks.iter().copied())];
        }

        let mut groups: BTreeMap<String, Vec<&SettledPick>> = BTreeMap::new();
        for &p in picks {
            groups.entry(group_key(p, group_by)).or_default().push(p);
        }

        groups
            .into_iter()
            .map(|(key, members)| summarize(key, members))
            .collect()
    }

    /// Apply the current scoring config, if any, to a copy of each pick.
    ///
    /// Blocked picks are dropped and counted. Without a scorer the
    /// recorded tier decides; picks with no usable signals keep their
    /// recorded score.
    fn rescore(&self, picks: Vec<&SettledPick>) -> (Vec<SettledPick>, usize) {
        let mut kept = Vec::with_capacity(picks.len());
        let mut blocked = 0;

        for p in picks {
            let mut replay = p.clone();
            if let Some(scorer) = &self.scorer {
                match scorer.score(&replay.pick) {
                    Ok(b) => {
                        replay.pick.composite_score = Some(b.composite);
                        replay.pick.confidence_tier = Some(b.tier);
                        replay.pick.contributing_engines = Some(b.contributions.len());
                    }
                    Err(e) => debug!(pick_id = %p.pick.id, error = %e, "Keeping recorded score"),
                }
            }
            if replay.pick.confidence_tier == Some(ConfidenceTier::Blocked) {
                debug!(pick_id = %p.pick.id, "Blocked pick excluded");
                blocked += 1;
                continue;
            }
            kept.push(replay);
        }
        (kept, blocked)
    }

    /// Run a backtest over the requested window.
    pub fn run(&self, picks: &[SettledPick], request: BacktestRequest) -> BacktestRun {
        let selected = Self::filter(picks, &request.range, request.category.as_deref());
        let selected_count = selected.len();
        let (replayed, blocked) = self.rescore(selected);
        let refs: Vec<&SettledPick> = replayed.iter().collect();

        let overall = summarize("all", refs.iter().copied());
        let groups = Self::aggregate(&refs, &self.group_by);

        info!(
            run_id = %request.run_id,
            range = %request.range,
            category = ?request.category,
            picks_in = picks.len(),
            selected = selected_count,
            blocked,
            groups = groups.len(),
            hit_rate = ?overall.hit_rate,
            "Backtest complete"
        );

        BacktestRun {
            id: request.run_id,
            range: request.range,
            category: request.category,
            config: RunConfigSnapshot {
                group_by: self.group_by.clone(),
                scoring: self.scorer.as_ref().map(|s| s.config().clone()),
            },
            overall,
            groups,
            blocked,
            baseline_run_id: request.baseline_run_id,
            completed_at: request.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
