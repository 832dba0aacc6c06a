//! Odds math.
//!
//! Conversions between American odds, decimal odds and implied
//! probability, parlay combination and payout calculation. Everything
//! here is a pure function of its inputs.

pub mod kelly;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::EdgeError;

/// Smallest magnitude a well-formed American price can have.
const MIN_AMERICAN_MAGNITUDE: i32 = 100;

/// Reject zero and sub-100 magnitudes (e.g. `+50`), which are not valid
/// American prices.
fn validate_american(odds: i32) -> Result<(), EdgeError> {
    if odds == 0 || odds.unsigned_abs() < MIN_AMERICAN_MAGNITUDE as u32 {
        return Err(EdgeError::InvalidOdds(odds));
    }
    Ok(())
}

/// Convert American odds to decimal odds.
///
/// `+150` → 2.5, `-150` → 1.667.
pub fn american_to_decimal(odds: i32) -> Result<f64, EdgeError> {
    validate_american(odds)?;
    let decimal = if odds > 0 {
        odds as f64 / 100.0 + 1.0
    } else {
        100.0 / (odds as f64).abs() + 1.0
    };
    Ok(decimal)
}

/// Convert decimal odds back to American odds, rounding to the nearest
/// integer. Even money comes back as `+100`.
pub fn decimal_to_american(decimal: f64) -> Result<i32, EdgeError> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return Err(EdgeError::InvalidDecimalOdds(decimal));
    }

    let american = if decimal >= 2.0 {
        ((decimal - 1.0) * 100.0).round()
    } else {
        (-100.0 / (decimal - 1.0)).round()
    };

    if american > i32::MAX as f64 || american < i32::MIN as f64 {
        return Err(EdgeError::InvalidDecimalOdds(decimal));
    }
    Ok(american as i32)
}

/// Raw implied probability of a price (`1 / decimal`), vig included.
pub fn implied_probability(odds: i32) -> Result<f64, EdgeError> {
    Ok(1.0 / american_to_decimal(odds)?)
}

/// Combine parlay legs into a single American price.
///
/// The decimal odds of every leg are multiplied, so leg order does not
/// matter.
pub fn combine_parlay_odds(legs: &[i32]) -> Result<i32, EdgeError> {
    decimal_to_american(parlay_decimal(legs)?)
}

/// Probability that every leg hits, assuming independence and no vig removal.
pub fn parlay_implied_probability(legs: &[i32]) -> Result<f64, EdgeError> {
    Ok(1.0 / parlay_decimal(legs)?)
}

fn parlay_decimal(legs: &[i32]) -> Result<f64, EdgeError> {
    if legs.is_empty() {
        return Err(EdgeError::EmptyParlay);
    }
    let mut product = 1.0_f64;
    for &leg in legs {
        product *= american_to_decimal(leg)?;
    }
    Ok(product)
}

/// Total return (stake included) of a winning bet.
///
/// Computed in exact decimal arithmetic: `100 @ +150` pays exactly `250`.
pub fn compute_payout(stake: Decimal, american_odds: i32) -> Result<Decimal, EdgeError> {
    Ok(stake * exact_decimal_odds(american_odds)?)
}

/// Profit (stake excluded) of a winning bet.
pub fn compute_profit(stake: Decimal, american_odds: i32) -> Result<Decimal, EdgeError> {
    Ok(compute_payout(stake, american_odds)? - stake)
}

fn exact_decimal_odds(odds: i32) -> Result<Decimal, EdgeError> {
    validate_american(odds)?;
    let hundred = dec!(100);
    let price = Decimal::from(odds);
    let decimal = if odds > 0 {
        price / hundred + Decimal::ONE
    } else {
        hundred / price.abs() + Decimal::ONE
    };
    Ok(decimal)
}

/// Fair (vig-free) probabilities of a two-way market.
///
/// Each side's raw implied probability is normalised by the overround.
pub fn no_vig_probabilities(side_a: i32, side_b: i32) -> Result<(f64, f64), EdgeError> {
    let a = implied_probability(side_a)?;
    let b = implied_probability(side_b)?;
    let overround = a + b;
    Ok((a / overround, b / overround))
}

/// Expected profit per unit staked given a win probability.
///
/// EV = p × (decimal − 1) − (1 − p)
pub fn expected_value(win_probability: f64, american_odds: i32) -> Result<f64, EdgeError> {
    let net = american_to_decimal(american_odds)? - 1.0;
    Ok(win_probability * net - (1.0 - win_probability))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_decimal() {
        assert!((american_to_decimal(150).unwrap() - 2.5).abs() < 1e-12);
        assert!((american_to_decimal(-150).unwrap() - 1.666_666_666_7).abs() < 1e-9);
        assert!((american_to_decimal(100).unwrap() - 2.0).abs() < 1e-12);
        assert!((american_to_decimal(-100).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_and_malformed_odds_rejected() {
        assert_eq!(american_to_decimal(0), Err(EdgeError::InvalidOdds(0)));
        assert_eq!(american_to_decimal(50), Err(EdgeError::InvalidOdds(50)));
        assert_eq!(american_to_decimal(-99), Err(EdgeError::InvalidOdds(-99)));
    }

    #[test]
    fn test_decimal_to_american() {
        assert_eq!(decimal_to_american(2.5).unwrap(), 150);
        assert_eq!(decimal_to_american(2.0).unwrap(), 100);
        assert_eq!(decimal_to_american(1.5).unwrap(), -200);
        assert!(matches!(decimal_to_american(1.0), Err(EdgeError::InvalidDecimalOdds(_))));
        assert!(matches!(decimal_to_american(0.5), Err(EdgeError::InvalidDecimalOdds(_))));
        assert!(matches!(decimal_to_american(f64::NAN), Err(EdgeError::InvalidDecimalOdds(_))));
    }

    #[test]
    fn test_round_trip() {
        for odds in (101..=5000).chain(-5000..=-101) {
            let back = decimal_to_american(american_to_decimal(odds).unwrap()).unwrap();
            assert!((back - odds).abs() <= 1, "{odds} came back as {back}");
        }
        // Even money has one canonical form.
        assert_eq!(decimal_to_american(american_to_decimal(-100).unwrap()).unwrap(), 100);
        assert_eq!(decimal_to_american(american_to_decimal(100).unwrap()).unwrap(), 100);
    }

    #[test]
    fn test_implied_probability_ordering() {
        // Underdogs: longer price, lower probability.
        let mut prev = implied_probability(100).unwrap();
        for odds in (110..=1000).step_by(10) {
            let p = implied_probability(odds).unwrap();
            assert!(p < prev, "{odds} not below previous");
            prev = p;
        }
        // Favorites: bigger magnitude, higher probability.
        assert!(implied_probability(-300).unwrap() > implied_probability(-150).unwrap());
        assert!(implied_probability(-110).unwrap() > implied_probability(110).unwrap());
        assert!((implied_probability(-110).unwrap() - 0.523_809_5).abs() < 1e-6);
    }

    #[test]
    fn test_combine_two_pickem_legs() {
        assert_eq!(combine_parlay_odds(&[-110, -110]).unwrap(), 264);
    }

    #[test]
    fn test_combine_is_order_independent() {
        let a = combine_parlay_odds(&[-110, 150, -200]).unwrap();
        let b = combine_parlay_odds(&[-200, -110, 150]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_combine_single_leg_is_identity() {
        assert_eq!(combine_parlay_odds(&[150]).unwrap(), 150);
        assert_eq!(combine_parlay_odds(&[-150]).unwrap(), -150);
    }

    #[test]
    fn test_combine_errors() {
        assert_eq!(combine_parlay_odds(&[]), Err(EdgeError::EmptyParlay));
        assert_eq!(combine_parlay_odds(&[-110, 0]), Err(EdgeError::InvalidOdds(0)));
    }

    #[test]
    fn test_parlay_probability() {
        let p = parlay_implied_probability(&[-110, -110]).unwrap();
        let single = implied_probability(-110).unwrap();
        assert!((p - single * single).abs() < 1e-12);
    }

    #[test]
    fn test_compute_payout() {
        assert_eq!(compute_payout(dec!(100), 150).unwrap(), dec!(250));
        assert_eq!(compute_payout(dec!(100), -150).unwrap().round_dp(2), dec!(166.67));
        assert_eq!(compute_profit(dec!(110), -110).unwrap().round_dp(2), dec!(100));
        assert_eq!(compute_payout(dec!(10), 0), Err(EdgeError::InvalidOdds(0)));
    }

    #[test]
    fn test_no_vig() {
        let (a, b) = no_vig_probabilities(-110, -110).unwrap();
        assert!((a - 0.5).abs() < 1e-12);
        assert!((a + b - 1.0).abs() < 1e-12);

        let (fav, dog) = no_vig_probabilities(-200, 170).unwrap();
        assert!(fav > dog);
        assert!((fav + dog - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_expected_value() {
        // 50% at even money is a fair bet.
        assert!(expected_value(0.5, 100).unwrap().abs() < 1e-12);
        // 50% at -110 loses the vig.
        assert!(expected_value(0.5, -110).unwrap() < 0.0);
        assert!(expected_value(0.6, 150).unwrap() > 0.0);
    }
}
