//! Run-to-run comparison.
//!
//! Reports signed deltas (current − baseline) for every metric, overall
//! and per group. Rate deltas are `None` whenever either side is undefined.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

use super::runner::{BacktestRun, GroupStats};
use crate::storage::Repository;
use crate::types::EdgeError;

/// Signed current − baseline deltas for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDeltas {
    pub total_picks: i64,
    pub hits: i64,
    pub misses: i64,
    pub pushes: i64,
    pub voids: i64,
    pub hit_rate: Option<f64>,
    pub avg_edge: Option<f64>,
    pub roi: Option<f64>,
    pub units: Decimal,
}

impl MetricDeltas {
    pub fn between(current: &GroupStats, baseline: &GroupStats) -> Self {
        fn count(a: usize, b: usize) -> i64 {
            a as i64 - b as i64
        }
        fn rate(a: Option<f64>, b: Option<f64>) -> Option<f64> {
            Some(a? - b?)
        }

        Self {
            total_picks: count(current.total_picks, baseline.total_picks),
            hits: count(current.hits, baseline.hits),
            misses: count(current.misses, baseline.misses),
            pushes: count(current.pushes, baseline.pushes),
            voids: count(current.voids, baseline.voids),
            hit_rate: rate(current.hit_rate, baseline.hit_rate),
            avg_edge: rate(current.avg_edge, baseline.avg_edge),
            roi: rate(current.roi, baseline.roi),
            units: current.units - baseline.units,
        }
    }
}

impl fmt::Display for MetricDeltas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = |v: Option<f64>| {
            v.map(|d| format!("{:+.1}pp", d * 100.0))
                .unwrap_or_else(|| "n/a".to_string())
        };
        write!(
            f,
            "picks {:+} | hits {:+} | misses {:+} | hit_rate {} | roi {} | units {:+.2}",
            self.total_picks,
            self.hits,
            self.misses,
            pct(self.hit_rate),
            pct(self.roi),
            self.units,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupDelta {
    pub group_key: String,
    pub deltas: MetricDeltas,
}

/// Current run measured against a baseline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunComparison {
    pub current_run_id: String,
    pub baseline_run_id: String,
    pub overall: MetricDeltas,
    /// Groups present in both runs, ordered by key.
    pub groups: Vec<GroupDelta>,
    pub only_in_current: Vec<String>,
    pub only_in_baseline: Vec<String>,
}

pub fn compare(current: &BacktestRun, baseline: &BacktestRun) -> RunComparison {
    let baseline_groups: BTreeMap<&str, &GroupStats> = baseline
        .groups
        .iter()
        .map(|g| (g.group_key.as_str(), g))
        .collect();
    let current_groups: BTreeMap<&str, &GroupStats> = current
        .groups
        .iter()
        .map(|g| (g.group_key.as_str(), g))
        .collect();

    let mut groups = Vec::new();
    let mut only_in_current = Vec::new();
    for (key, stats) in &current_groups {
        match baseline_groups.get(key) {
            Some(base) => groups.push(GroupDelta {
                group_key: key.to_string(),
                deltas: MetricDeltas::between(stats, base),
            }),
            None => only_in_current.push(key.to_string()),
        }
    }
    let only_in_baseline = baseline_groups
        .keys()
        .filter(|k| !current_groups.contains_key(*k))
        .map(|k| k.to_string())
        .collect();

    RunComparison {
        current_run_id: current.id.clone(),
        baseline_run_id: baseline.id.clone(),
        overall: MetricDeltas::between(&current.overall, &baseline.overall),
        groups,
        only_in_current,
        only_in_baseline,
    }
}

/// Look the baseline up by id and compare against it.
pub fn compare_with_baseline(
    current: &BacktestRun,
    baseline_id: &str,
    repo: &dyn Repository,
) -> Result<RunComparison, EdgeError> {
    let baseline = repo
        .load_run(baseline_id)?
        .ok_or_else(|| EdgeError::BaselineNotFound(baseline_id.to_string()))?;

    let comparison = compare(current, &baseline);
    info!(
        current = %comparison.current_run_id,
        baseline = %comparison.baseline_run_id,
        deltas = %comparison.overall,
        "Compared against baseline"
    );
    Ok(comparison)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
