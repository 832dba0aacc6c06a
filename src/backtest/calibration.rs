//! Calibration module.
//!
//! Measures how well composite scores line up with realised hit rates.
//! Treats `composite / 100` as a hit probability and computes a
//! calibration curve, Brier scores per category and hit rates per tier.

use serde::Serialize;
use std::collections::BTreeMap;

use super::runner::SettledPick;
use crate::scoring::SCORE_MAX;
use crate::types::Outcome;

// ---------------------------------------------------------------------------
// Calibration data
// ---------------------------------------------------------------------------

/// A scored, decided pick.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub pick_id: String,
    pub category: String,
    pub tier: String,
    /// Composite score on 0–100.
    pub composite: f64,
    pub hit: bool,
}

impl CalibrationPoint {
    /// Build from a settled pick; `None` unless it is scored and decided.
    pub fn from_settled(p: &SettledPick) -> Option<Self> {
        let composite = p.pick.composite_score.filter(|s| (0.0..=SCORE_MAX).contains(s))?;
        let hit = match p.replayed_outcome() {
            Outcome::Hit => true,
            Outcome::Miss => false,
            _ => return None,
        };
        Some(Self {
            pick_id: p.pick.id.clone(),
            category: p.pick.category.clone(),
            tier: p
                .pick
                .confidence_tier
                .map(|t| t.to_string())
                .unwrap_or_else(|| "UNSCORED".to_string()),
            composite,
            hit,
        })
    }

    fn probability(&self) -> f64 {
        self.composite / SCORE_MAX
    }
}

/// Calibration analysis results.
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationReport {
    pub total_points: usize,
    pub overall_brier: Option<f64>,
    pub category_brier: BTreeMap<String, f64>,
    /// Hit rate per confidence tier.
    pub tier_hit_rates: BTreeMap<String, f64>,
    pub calibration_curve: Vec<CalibrationBucket>,
    pub diagnosis: CalibrationDiagnosis,
}

/// One score band of the calibration curve (e.g. composites 60–70).
#[derive(Debug, Clone, Serialize)]
pub struct CalibrationBucket {
    pub bin_start: f64,
    pub bin_end: f64,
    pub mean_score: f64,
    pub hit_rate: Option<f64>,
    pub count: usize,
    /// |mean_score/100 − hit_rate|
    pub deviation: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationDiagnosis {
    WellCalibrated,
    /// High scores hit less often than they claim.
    OverConfident,
    /// High scores hit more often than they claim.
    UnderConfident,
    InsufficientData,
}

// ---------------------------------------------------------------------------
// Calibrator
// ---------------------------------------------------------------------------

pub struct Calibrator {
    points: Vec<CalibrationPoint>,
    num_bins: usize,
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calibrator {
    pub fn new() -> Self {
        Self {
            points: Vec::new(),
            num_bins: 10,
        }
    }

    /// Collect every scored, decided pick.
    pub fn from_settled<'a>(picks: impl IntoIterator<Item = &'a SettledPick>) -> Self {
        let mut cal = Self::new();
        cal.points
            .extend(picks.into_iter().filter_map(CalibrationPoint::from_settled));
        cal
    }

    pub fn add_point(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    pub fn count(&self) -> usize {
        self.points.len()
    }

    pub fn report(&self) -> CalibrationReport {
        let curve = self.curve();
        CalibrationReport {
            total_points: self.points.len(),
            overall_brier: brier(self.points.iter()),
            category_brier: self.category_brier(),
            tier_hit_rates: self.tier_hit_rates(),
            diagnosis: self.diagnose(&curve),
            calibration_curve: curve,
        }
    }

    fn category_brier(&self) -> BTreeMap<String, f64> {
        let mut by_category: BTreeMap<String, Vec<&CalibrationPoint>> = BTreeMap::new();
        for p in &self.points {
            by_category.entry(p.category.clone()).or_default().push(p);
        }
        by_category
            .into_iter()
            .filter_map(|(cat, pts)| Some((cat, brier(pts.into_iter())?)))
            .collect()
    }

    fn tier_hit_rates(&self) -> BTreeMap<String, f64> {
        let mut tally: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for p in &self.points {
            let entry = tally.entry(p.tier.clone()).or_default();
            entry.1 += 1;
            if p.hit {
                entry.0 += 1;
            }
        }
        tally
            .into_iter()
            .map(|(tier, (hits, total))| (tier, hits as f64 / total as f64))
            .collect()
    }

    fn curve(&self) -> Vec<CalibrationBucket> {
        let width = SCORE_MAX / self.num_bins as f64;

        (0..self.num_bins)
            .map(|i| {
                let bin_start = i as f64 * width;
                let bin_end = bin_start + width;
                let last = i == self.num_bins - 1;
                let in_bin: Vec<&CalibrationPoint> = self
                    .points
                    .iter()
                    .filter(|p| {
                        p.composite >= bin_start
                            && (p.composite < bin_end || (last && p.composite <= bin_end))
                    })
                    .collect();

                let count = in_bin.len();
                if count == 0 {
                    return CalibrationBucket {
                        bin_start,
                        bin_end,
                        mean_score: (bin_start + bin_end) / 2.0,
                        hit_rate: None,
                        count,
                        deviation: None,
                    };
                }

                let mean_score = in_bin.iter().map(|p| p.composite).sum::<f64>() / count as f64;
                let hit_rate = in_bin.iter().filter(|p| p.hit).count() as f64 / count as f64;
                CalibrationBucket {
                    bin_start,
                    bin_end,
                    mean_score,
                    hit_rate: Some(hit_rate),
                    count,
                    deviation: Some((mean_score / SCORE_MAX - hit_rate).abs()),
                }
            })
            .collect()
    }

    fn diagnose(&self, curve: &[CalibrationBucket]) -> CalibrationDiagnosis {
        let populated: Vec<&CalibrationBucket> = curve.iter().filter(|b| b.count >= 3).collect();
        if populated.len() < 3 || self.points.len() < 20 {
            return CalibrationDiagnosis::InsufficientData;
        }

        let mut over = 0;
        let mut under = 0;
        for bucket in populated {
            let (Some(rate), Some(dev)) = (bucket.hit_rate, bucket.deviation) else {
                continue;
            };
            if dev < 0.05 {
                continue;
            }
            let predicted = bucket.mean_score / SCORE_MAX;
            let mid = (bucket.bin_start + bucket.bin_end) / 2.0;
            if mid > 50.0 {
                if rate < predicted {
                    over += 1;
                } else {
                    under += 1;
                }
            } else if mid < 50.0 {
                if rate > predicted {
                    over += 1;
                } else {
                    under += 1;
                }
            }
        }

        if over > under + 1 {
            CalibrationDiagnosis::OverConfident
        } else if under > over + 1 {
            CalibrationDiagnosis::UnderConfident
        } else {
            CalibrationDiagnosis::WellCalibrated
        }
    }
}

/// Brier = (1/N) × Σ(p − outcome)². `None` for no points.
fn brier<'a>(points: impl Iterator<Item = &'a CalibrationPoint>) -> Option<f64> {
    let (sum, n) = points.fold((0.0, 0usize), |(sum, n), p| {
        let outcome = if p.hit { 1.0 } else { 0.0 };
        (sum + (p.probability() - outcome).powi(2), n + 1)
    });
    (n > 0).then(|| sum / n as f64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
