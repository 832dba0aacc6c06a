//! Historical replay of settled picks.
//!
//! `runner` groups settled picks into hit-rate / ROI statistics,
//! `compare` diffs two runs, `calibration` checks composite scores
//! against realised hit rates and `reweight` suggests engine weights.

pub mod calibration;
pub mod compare;
pub mod reweight;
pub mod runner;

pub use compare::{compare, compare_with_baseline, RunComparison};
pub use runner::{
    BacktestAggregator, BacktestConfig, BacktestRequest, BacktestRun, GroupField, GroupStats,
    SettledPick,
};
