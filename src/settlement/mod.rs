//! Outcome classification and settlement.
//!
//! A settlement starts `pending` and moves exactly once to one of the
//! terminal outcomes (`hit`, `miss`, `push`, `void`). Closing-line value
//! is computed alongside and is independent of whether the bet won.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::odds;
use crate::types::{
    ClosingLineValue, ClvDirection, EdgeError, LineSide, Outcome, PickCandidate,
    SettlementRecord,
};

/// Probability shifts smaller than this count as no movement.
const CLV_EPSILON: f64 = 1e-9;

/// Classify an over/under result against its line.
///
/// Exact equality is a push. `Void` is never produced here.
pub fn classify(line: f64, actual_value: f64, side: LineSide) -> Outcome {
    if actual_value == line {
        return Outcome::Push;
    }
    let hit = match side {
        LineSide::Over => actual_value > line,
        LineSide::Under => actual_value < line,
    };
    if hit {
        Outcome::Hit
    } else {
        Outcome::Miss
    }
}

/// Closing-line value of the side taken.
///
/// Positive means the closing price implies a higher probability than the
/// price taken, i.e. the bettor got a better number than the close.
pub fn closing_line_value(
    opening_odds: i32,
    closing_odds: i32,
    side_won: bool,
) -> Result<ClosingLineValue, EdgeError> {
    let opening = odds::implied_probability(opening_odds)?;
    let closing = odds::implied_probability(closing_odds)?;
    let magnitude = closing - opening;

    let direction = if magnitude > CLV_EPSILON {
        ClvDirection::Positive
    } else if magnitude < -CLV_EPSILON {
        ClvDirection::Negative
    } else {
        ClvDirection::Neutral
    };

    Ok(ClosingLineValue {
        direction,
        magnitude,
        side_won,
    })
}

// ---------------------------------------------------------------------------
// Settlement state machine
// ---------------------------------------------------------------------------

impl SettlementRecord {
    pub fn pending(pick_id: impl Into<String>) -> Self {
        Self {
            pick_id: pick_id.into(),
            actual_value: None,
            outcome: Outcome::Pending,
            clv: None,
            void_reason: None,
            settled_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome.is_terminal()
    }

    fn ensure_pending(&self) -> Result<(), EdgeError> {
        if self.is_terminal() {
            return Err(EdgeError::AlreadySettled {
                pick_id: self.pick_id.clone(),
                outcome: self.outcome,
            });
        }
        Ok(())
    }

    /// Settle an over/under pick from the observed value.
    pub fn settle(
        &mut self,
        line: f64,
        actual_value: f64,
        side: LineSide,
        settled_at: DateTime<Utc>,
    ) -> Result<Outcome, EdgeError> {
        self.ensure_pending()?;
        let outcome = classify(line, actual_value, side);
        self.actual_value = Some(actual_value);
        self.outcome = outcome;
        self.settled_at = Some(settled_at);
        debug!(pick_id = %self.pick_id, line, actual_value, outcome = %outcome, "Pick settled");
        Ok(outcome)
    }

    /// Record an outcome decided elsewhere (team sides, spreads graded upstream).
    pub fn resolve(&mut self, outcome: Outcome, settled_at: DateTime<Utc>) -> Result<(), EdgeError> {
        self.ensure_pending()?;
        if outcome == Outcome::Pending {
            return Err(EdgeError::InvalidOutcome(self.pick_id.clone()));
        }
        self.outcome = outcome;
        self.settled_at = Some(settled_at);
        Ok(())
    }

    /// Cancel the pick (postponed game, scratched player, ...).
    pub fn void(&mut self, reason: impl Into<String>, settled_at: DateTime<Utc>) -> Result<(), EdgeError> {
        self.ensure_pending()?;
        let reason = reason.into();
        info!(pick_id = %self.pick_id, reason = %reason, "Pick voided");
        self.outcome = Outcome::Void;
        self.void_reason = Some(reason);
        self.settled_at = Some(settled_at);
        Ok(())
    }

    /// Attach closing-line value. Allowed on settled records since it does
    /// not change the outcome.
    pub fn with_clv(mut self, clv: ClosingLineValue) -> Self {
        self.clv = Some(clv);
        self
    }
}

/// Settle an over/under pick and mirror the outcome onto it.
///
/// Team-side picks cannot be graded from a single value and are rejected.
pub fn settle_pick(
    pick: &mut PickCandidate,
    actual_value: f64,
    settled_at: DateTime<Utc>,
) -> Result<SettlementRecord, EdgeError> {
    let side = pick
        .recommended_side
        .line_side()
        .ok_or_else(|| EdgeError::UnsupportedSide(pick.recommended_side.to_string()))?;

    let mut record = SettlementRecord::pending(&pick.id);
    record.outcome = pick.outcome;
    record.settle(pick.line, actual_value, side, settled_at)?;
    pick.outcome = record.outcome;
    Ok(record)
}

/// Void a pick and mirror the outcome onto it.
pub fn void_pick(
    pick: &mut PickCandidate,
    reason: impl Into<String>,
    settled_at: DateTime<Utc>,
) -> Result<SettlementRecord, EdgeError> {
    let mut record = SettlementRecord::pending(&pick.id);
    record.outcome = pick.outcome;
    record.void(reason, settled_at)?;
    pick.outcome = Outcome::Void;
    Ok(record)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
