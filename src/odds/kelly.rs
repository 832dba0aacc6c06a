//! Kelly criterion stake sizing.
//!
//! Suggests a stake for a scored pick using fractional Kelly with a
//! configurable multiplier, bankroll cap and minimum stake.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::american_to_decimal;
use crate::types::EdgeError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Kelly sizing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly). Lower = more conservative.
    pub multiplier: f64,
    /// Maximum stake as a fraction of bankroll.
    pub max_bet_pct: f64,
    /// Minimum stake (below this, don't bother).
    pub min_bet_size: Decimal,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.25,
            max_bet_pct: 0.05,
            min_bet_size: Decimal::ONE,
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly calculator
// ---------------------------------------------------------------------------

/// Stake recommendation for a single pick.
#[derive(Debug, Clone, PartialEq)]
pub struct StakeSuggestion {
    pub win_probability: f64,
    pub american_odds: i32,
    /// Raw Kelly fraction.
    pub kelly_fraction: f64,
    /// After multiplier and cap.
    pub stake_fraction: f64,
    pub stake: Decimal,
    /// Expected profit of the stake.
    pub expected_value: Decimal,
}

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Size a stake at the given price.
    ///
    /// Kelly formula: f* = (bp - q) / b
    /// where:
    ///   b = net decimal odds
    ///   p = estimated win probability
    ///   q = 1 - p
    ///
    /// Returns `Ok(None)` when there is no positive edge or the stake falls
    /// below the minimum; `Err` only for an invalid price.
    pub fn size(
        &self,
        win_probability: f64,
        american_odds: i32,
        bankroll: Decimal,
    ) -> Result<Option<StakeSuggestion>, EdgeError> {
        let net_odds = american_to_decimal(american_odds)? - 1.0;

        if bankroll <= Decimal::ZERO || !(0.0..=1.0).contains(&win_probability) {
            return Ok(None);
        }

        let lose_probability = 1.0 - win_probability;
        let kelly = (net_odds * win_probability - lose_probability) / net_odds;

        if kelly <= 0.0 {
            debug!(american_odds, win_probability, kelly, "Negative Kelly, no stake");
            return Ok(None);
        }

        let capped = (kelly * self.config.multiplier).min(self.config.max_bet_pct);
        let fraction = Decimal::from_f64(capped).unwrap_or(Decimal::ZERO);
        let stake = (bankroll * fraction).round_dp(2);

        if stake < self.config.min_bet_size {
            debug!(
                stake = %stake,
                min = %self.config.min_bet_size,
                "Stake below minimum size"
            );
            return Ok(None);
        }

        let ev_per_unit = win_probability * net_odds - lose_probability;
        let expected_value =
            (stake * Decimal::from_f64(ev_per_unit).unwrap_or(Decimal::ZERO)).round_dp(4);

        debug!(
            american_odds,
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            fractional = format!("{:.2}%", capped * 100.0),
            stake = %stake,
            ev = %expected_value,
            "Stake sized"
        );

        Ok(Some(StakeSuggestion {
            win_probability,
            american_odds,
            kelly_fraction: kelly,
            stake_fraction: capped,
            stake,
            expected_value,
        }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
