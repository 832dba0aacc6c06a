//! Penalty and block rules.
//!
//! Rules match a pick on one of its attributes. A matching `block` rule
//! disqualifies the pick; matching `penalize` rules each knock a fraction
//! of the score range off the composite.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::PickCandidate;

/// Which attribute of a pick a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    PropType,
    Subject,
    Category,
    Side,
    /// Upstream pattern tag such as a trap / reverse-line-move flag.
    Tag,
    /// Fires when the named engine contributed a score.
    Engine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Block,
    Penalize,
}

/// A single configured rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyRule {
    pub pattern_type: PatternType,
    pub pattern_key: String,
    pub severity: Severity,
    /// Fraction of the score range (0.0–1.0) removed by a `penalize` rule.
    #[serde(default)]
    pub penalty_amount: f64,
}

impl PenaltyRule {
    pub fn block(pattern_type: PatternType, key: impl Into<String>) -> Self {
        Self {
            pattern_type,
            pattern_key: key.into(),
            severity: Severity::Block,
            penalty_amount: 0.0,
        }
    }

    pub fn penalize(pattern_type: PatternType, key: impl Into<String>, amount: f64) -> Self {
        Self {
            pattern_type,
            pattern_key: key.into(),
            severity: Severity::Penalize,
            penalty_amount: amount,
        }
    }

    /// Case-insensitive match against the pick attribute named by `pattern_type`.
    pub fn matches(&self, pick: &PickCandidate) -> bool {
        let key = self.pattern_key.as_str();
        match self.pattern_type {
            PatternType::PropType => pick.prop_type.eq_ignore_ascii_case(key),
            PatternType::Subject => pick.subject_id.eq_ignore_ascii_case(key),
            PatternType::Category => pick.category.eq_ignore_ascii_case(key),
            PatternType::Side => pick.recommended_side.to_string().eq_ignore_ascii_case(key),
            PatternType::Tag => pick.tags.iter().any(|t| t.eq_ignore_ascii_case(key)),
            PatternType::Engine => pick
                .per_engine_scores
                .iter()
                .any(|(engine, score)| score.is_finite() && engine.eq_ignore_ascii_case(key)),
        }
    }
}

impl fmt::Display for PenaltyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.pattern_type {
            PatternType::PropType => "prop_type",
            PatternType::Subject => "subject",
            PatternType::Category => "category",
            PatternType::Side => "side",
            PatternType::Tag => "tag",
            PatternType::Engine => "engine",
        };
        match self.severity {
            Severity::Block => write!(f, "block {kind}={}", self.pattern_key),
            Severity::Penalize => write!(
                f,
                "penalize {kind}={} (-{:.0}%)",
                self.pattern_key,
                self.penalty_amount * 100.0
            ),
        }
    }
}

/// Result of running a rule set over one pick.
#[derive(Debug, Clone, PartialEq)]
pub enum PenaltyVerdict {
    Clear,
    /// Sum of matching penalty fractions and the rules that fired.
    Penalized { fraction: f64, rules: Vec<String> },
    /// The first matching block rule.
    Blocked { rule: String },
}

/// Evaluate rules in configured order. The first matching `block` rule
/// wins outright; `penalize` rules accumulate.
pub fn evaluate(rules: &[PenaltyRule], pick: &PickCandidate) -> PenaltyVerdict {
    let mut fraction = 0.0;
    let mut fired = Vec::new();

    for rule in rules.iter().filter(|r| r.matches(pick)) {
        match rule.severity {
            Severity::Block => return PenaltyVerdict::Blocked { rule: rule.to_string() },
            Severity::Penalize => {
                fraction += rule.penalty_amount;
                fired.push(rule.to_string());
            }
        }
    }

    if fired.is_empty() {
        PenaltyVerdict::Clear
    } else {
        PenaltyVerdict::Penalized { fraction, rules: fired }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
