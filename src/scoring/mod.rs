//! Signal aggregation.
//!
//! Combines per-engine scores (sharp money, hit-rate history, fatigue,
//! trap detection, ...) into one composite score on a 0–100 scale,
//! applies penalty/block rules, and maps the result to a confidence tier.

pub mod penalty;

use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::types::{ConfidenceTier, EdgeError, PickCandidate};
use penalty::{PenaltyRule, PenaltyVerdict, Severity};

/// Top of the composite score range.
pub const SCORE_MAX: f64 = 100.0;

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

/// Composite-score cut-offs for each confidence tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub elite: f64,
    pub strong: f64,
    pub standard: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            elite: 80.0,
            strong: 65.0,
            standard: 50.0,
        }
    }
}

impl TierThresholds {
    pub fn tier_for(&self, composite: f64) -> ConfidenceTier {
        if composite >= self.elite {
            ConfidenceTier::Elite
        } else if composite >= self.strong {
            ConfidenceTier::Strong
        } else if composite >= self.standard {
            ConfidenceTier::Standard
        } else {
            ConfidenceTier::Weak
        }
    }
}

fn lowercase_keys<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, f64>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect())
}

fn default_engine_weight() -> Option<f64> {
    Some(1.0)
}

fn default_blocked_score() -> f64 {
    -1.0
}

/// Weight table, penalty rules and tier thresholds for the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Weight per engine name, lowercased on load.
    #[serde(default, deserialize_with = "lowercase_keys")]
    pub weights: BTreeMap<String, f64>,
    /// Weight for engines missing from `weights`. `None` ignores them.
    #[serde(default = "default_engine_weight")]
    pub default_weight: Option<f64>,
    /// Engines reporting a probability (0–1) rather than a 0–100 score.
    #[serde(default)]
    pub probability_engines: Vec<String>,
    #[serde(default)]
    pub penalties: Vec<PenaltyRule>,
    #[serde(default)]
    pub tiers: TierThresholds,
    /// Sentinel composite written for blocked picks. Must sit below the score range.
    #[serde(default = "default_blocked_score")]
    pub blocked_score: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            default_weight: default_engine_weight(),
            probability_engines: Vec::new(),
            penalties: Vec::new(),
            tiers: TierThresholds::default(),
            blocked_score: default_blocked_score(),
        }
    }
}

impl ScoringConfig {
    /// Weight for an engine, falling back to `default_weight`.
    pub fn weight_for(&self, engine: &str) -> Option<f64> {
        self.weights
            .get(&engine.to_lowercase())
            .copied()
            .or(self.default_weight)
    }

    fn is_probability_engine(&self, engine: &str) -> bool {
        self.probability_engines
            .iter()
            .any(|e| e.eq_ignore_ascii_case(engine))
    }

    pub fn validate(&self) -> Result<(), EdgeError> {
        for (engine, weight) in &self.weights {
            if *engine != engine.to_lowercase() {
                return Err(EdgeError::Config(format!(
                    "engine weight key '{engine}' must be lowercase"
                )));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(EdgeError::Config(format!(
                    "weight for engine '{engine}' must be a non-negative number, got {weight}"
                )));
            }
        }
        if let Some(w) = self.default_weight {
            if !w.is_finite() || w < 0.0 {
                return Err(EdgeError::Config(format!(
                    "default_weight must be a non-negative number, got {w}"
                )));
            }
        }
        let t = &self.tiers;
        if !(t.elite >= t.strong && t.strong >= t.standard) {
            return Err(EdgeError::Config(format!(
                "tier thresholds must satisfy elite >= strong >= standard, got {}/{}/{}",
                t.elite, t.strong, t.standard
            )));
        }
        for rule in &self.penalties {
            if rule.severity == Severity::Penalize && !(0.0..=1.0).contains(&rule.penalty_amount) {
                return Err(EdgeError::Config(format!(
                    "penalty_amount for '{rule}' must be within 0.0..=1.0"
                )));
            }
        }
        if self.blocked_score >= 0.0 {
            return Err(EdgeError::Config(
                "blocked_score must be below the score range (negative)".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Score breakdown
// ---------------------------------------------------------------------------

/// One engine's share of the composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineContribution {
    pub engine: String,
    /// Score after scaling to 0–100 and clamping.
    pub score: f64,
    pub weight: f64,
}

/// Full result of scoring one pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub pick_id: String,
    /// Weighted average before penalties.
    pub weighted_score: f64,
    /// Final composite (the blocked sentinel if blocked).
    pub composite: f64,
    pub tier: ConfidenceTier,
    pub contributions: Vec<EngineContribution>,
    pub penalties_applied: Vec<String>,
    pub blocked_by: Option<String>,
}

impl ScoreBreakdown {
    pub fn is_blocked(&self) -> bool {
        self.blocked_by.is_some()
    }
}

/// Counters from scoring a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub scored: usize,
    pub blocked: usize,
    pub no_signals: usize,
    pub skipped_settled: usize,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Reduces per-engine scores to a composite score and tier.
pub struct SignalAggregator {
    config: ScoringConfig,
}

impl SignalAggregator {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Weighted average over the engines that reported a usable score.
    ///
    /// Absent engines are left out of both numerator and denominator.
    pub fn weighted_average(
        &self,
        scores: &BTreeMap<String, f64>,
    ) -> Option<(f64, Vec<EngineContribution>)> {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut contributions = Vec::new();

        for (engine, &raw) in scores {
            if !raw.is_finite() {
                warn!(engine = %engine, "Non-finite engine score dropped");
                continue;
            }
            let Some(weight) = self.config.weight_for(engine) else {
                debug!(engine = %engine, "No weight configured, engine ignored");
                continue;
            };
            if weight <= 0.0 {
                continue;
            }

            let scaled = if self.config.is_probability_engine(engine) {
                raw * SCORE_MAX
            } else {
                raw
            };
            let score = scaled.clamp(0.0, SCORE_MAX);
            if score != scaled {
                warn!(engine = %engine, raw, "Engine score outside 0-100, clamped");
            }

            numerator += weight * score;
            denominator += weight;
            contributions.push(EngineContribution {
                engine: engine.clone(),
                score,
                weight,
            });
        }

        if denominator <= 0.0 {
            return None;
        }
        Some((numerator / denominator, contributions))
    }

    /// Score a pick without modifying it.
    pub fn score(&self, pick: &PickCandidate) -> Result<ScoreBreakdown, EdgeError> {
        let (weighted_score, contributions) = self
            .weighted_average(&pick.per_engine_scores)
            .ok_or_else(|| EdgeError::NoSignals(pick.id.clone()))?;

        let breakdown = match penalty::evaluate(&self.config.penalties, pick) {
            PenaltyVerdict::Blocked { rule } => {
                debug!(pick_id = %pick.id, rule = %rule, "Pick blocked");
                ScoreBreakdown {
                    pick_id: pick.id.clone(),
                    weighted_score,
                    composite: self.config.blocked_score,
                    tier: ConfidenceTier::Blocked,
                    contributions,
                    penalties_applied: Vec::new(),
                    blocked_by: Some(rule),
                }
            }
            PenaltyVerdict::Penalized { fraction, rules } => {
                let composite = (weighted_score - fraction * SCORE_MAX).max(0.0);
                ScoreBreakdown {
                    pick_id: pick.id.clone(),
                    weighted_score,
                    composite,
                    tier: self.config.tiers.tier_for(composite),
                    contributions,
                    penalties_applied: rules,
                    blocked_by: None,
                }
            }
            PenaltyVerdict::Clear => ScoreBreakdown {
                pick_id: pick.id.clone(),
                weighted_score,
                composite: weighted_score,
                tier: self.config.tiers.tier_for(weighted_score),
                contributions,
                penalties_applied: Vec::new(),
                blocked_by: None,
            },
        };

        debug!(
            pick_id = %pick.id,
            engines = breakdown.contributions.len(),
            weighted = format!("{:.1}", breakdown.weighted_score),
            composite = format!("{:.1}", breakdown.composite),
            tier = %breakdown.tier,
            "Pick scored"
        );

        Ok(breakdown)
    }

    /// Score a pick and record composite, tier and engine count on it.
    ///
    /// Settled picks are immutable and are rejected. A pick left without
    /// signals loses any earlier score.
    pub fn apply(&self, pick: &mut PickCandidate) -> Result<ScoreBreakdown, EdgeError> {
        if pick.is_settled() {
            return Err(EdgeError::AlreadySettled {
                pick_id: pick.id.clone(),
                outcome: pick.outcome,
            });
        }
        match self.score(pick) {
            Ok(breakdown) => {
                pick.composite_score = Some(breakdown.composite);
                pick.confidence_tier = Some(breakdown.tier);
                pick.contributing_engines = Some(breakdown.contributions.len());
                Ok(breakdown)
            }
            Err(e) => {
                pick.composite_score = None;
                pick.confidence_tier = None;
                pick.contributing_engines = None;
                Err(e)
            }
        }
    }

    /// Score every pending pick in a batch. Picks without signals keep no score.
    pub fn apply_batch(&self, picks: &mut [PickCandidate]) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for pick in picks.iter_mut() {
            match self.apply(pick) {
                Ok(b) if b.is_blocked() => summary.blocked += 1,
                Ok(_) => summary.scored += 1,
                Err(EdgeError::NoSignals(_)) => summary.no_signals += 1,
                Err(_) => summary.skipped_settled += 1,
            }
        }

        info!(
            picks = picks.len(),
            scored = summary.scored,
            blocked = summary.blocked,
            no_signals = summary.no_signals,
            skipped = summary.skipped_settled,
            "Batch scored"
        );
        summary
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Higher composite first; equal composites prefer more contributing
/// engines, then the smaller id.
fn compare_candidates(a: &PickCandidate, b: &PickCandidate) -> Ordering {
    let sa = a.composite_score.unwrap_or(f64::NEG_INFINITY);
    let sb = b.composite_score.unwrap_or(f64::NEG_INFINITY);
    sb.partial_cmp(&sa)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let ea = a.contributing_engines.unwrap_or(0);
            let eb = b.contributing_engines.unwrap_or(0);
            eb.cmp(&ea)
        })
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep the best scored candidate per subject + prop type + side and
/// return them best first. Unscored and blocked candidates are dropped.
pub fn rank_candidates(candidates: &[PickCandidate]) -> Vec<PickCandidate> {
    let mut best: BTreeMap<_, &PickCandidate> = BTreeMap::new();

    let eligible = candidates.iter().filter(|c| {
        c.composite_score.is_some() && c.confidence_tier != Some(ConfidenceTier::Blocked)
    });

    for candidate in eligible {
        match best.entry(candidate.dedupe_key()) {
            Entry::Vacant(slot) => {
                slot.insert(candidate);
            }
            Entry::Occupied(mut slot) => {
                if compare_candidates(candidate, slot.get()) == Ordering::Less {
                    slot.insert(candidate);
                }
            }
        }
    }

    let mut ranked: Vec<PickCandidate> = best.into_values().cloned().collect();
    ranked.sort_by(compare_candidates);
    ranked
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
