//! Engine reweighting.
//!
//! Compares each engine's hit rate on the picks it scored with the hit
//! rate across all decided picks, and nudges its weight in proportion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::runner::SettledPick;
use crate::scoring::ScoringConfig;
use crate::types::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReweightConfig {
    /// Engines with fewer decided picks keep their current weight.
    pub min_samples: usize,
    pub min_weight: f64,
    pub max_weight: f64,
}

impl Default for ReweightConfig {
    fn default() -> Self {
        Self {
            min_samples: 20,
            min_weight: 0.25,
            max_weight: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineAccuracy {
    pub engine: String,
    pub samples: usize,
    pub hits: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightSuggestion {
    /// `None` with no decided picks.
    pub overall_hit_rate: Option<f64>,
    pub engines: Vec<EngineAccuracy>,
    /// Suggested weights for engines that met `min_samples`.
    pub weights: BTreeMap<String, f64>,
}

/// Suggest new engine weights from settled history.
pub fn suggest_weights(
    picks: &[SettledPick],
    scoring: &ScoringConfig,
    config: &ReweightConfig,
) -> WeightSuggestion {
    let mut decided = 0usize;
    let mut decided_hits = 0usize;
    let mut tally: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for p in picks {
        let hit = match p.replayed_outcome() {
            Outcome::Hit => true,
            Outcome::Miss => false,
            _ => continue,
        };
        decided += 1;
        if hit {
            decided_hits += 1;
        }
        for (engine, score) in &p.pick.per_engine_scores {
            if !score.is_finite() {
                continue;
            }
            let entry = tally.entry(engine.to_lowercase()).or_default();
            entry.0 += 1;
            if hit {
                entry.1 += 1;
            }
        }
    }

    let overall_hit_rate = (decided > 0).then(|| decided_hits as f64 / decided as f64);

    let engines: Vec<EngineAccuracy> = tally
        .into_iter()
        .map(|(engine, (samples, hits))| EngineAccuracy {
            engine,
            samples,
            hits,
            hit_rate: hits as f64 / samples as f64,
        })
        .collect();

    let mut weights = BTreeMap::new();
    if let Some(overall) = overall_hit_rate.filter(|r| *r > 0.0) {
        for acc in &engines {
            if acc.samples < config.min_samples {
                debug!(engine = %acc.engine, samples = acc.samples, "Too few samples to reweight");
                continue;
            }
            let Some(current) = scoring.weight_for(&acc.engine) else {
                continue;
            };
            let suggested = (current * acc.hit_rate / overall)
                .max(config.min_weight)
                .min(config.max_weight);
            weights.insert(acc.engine.clone(), suggested);
        }
    }

    info!(
        decided,
        engines = engines.len(),
        reweighted = weights.len(),
        "Weight suggestions computed"
    );

    WeightSuggestion {
        overall_hit_rate,
        engines,
        weights,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
