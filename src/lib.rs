//! parlay-edge: odds maths and edge scoring for player-prop picks.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod backtest;
pub mod config;
pub mod odds;
pub mod scoring;
pub mod settlement;
pub mod storage;
pub mod types;
