//! Mock repository for integration testing.
//!
//! Provides a deterministic `Repository` implementation seeded with a
//! known slate of picks, with write counters and a switch to force
//! storage failures.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use parlay_edge::backtest::BacktestRun;
use parlay_edge::storage::Repository;
use parlay_edge::types::*;

#[derive(Default)]
struct Store {
    picks: Vec<PickCandidate>,
    settlements: Vec<SettlementRecord>,
    runs: Vec<BacktestRun>,
    writes: usize,
}

/// A mock repository for deterministic testing.
///
/// All state is in-memory and fully controllable from test code.
pub struct MockRepository {
    store: Arc<Mutex<Store>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockRepository {
    /// Empty repository.
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Repository seeded with the default slate.
    pub fn with_default_slate() -> Self {
        let repo = Self::new();
        repo.store.lock().unwrap().picks = default_slate();
        repo
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.store.lock().unwrap().writes
    }

    fn check(&self) -> Result<(), EdgeError> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(EdgeError::Storage(err.clone())),
            None => Ok(()),
        }
    }
}

/// Slate start: 2025-03-01 18:00 UTC.
pub fn slate_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap()
}

/// Eight picks across two categories with known engine scores.
///
/// With equal weights the composites are: nba-1 80, nba-2 70, nba-3 60,
/// nba-4 45, nfl-1 75, nfl-2 55, nfl-3 65 and nfl-4 (tagged `injury`) 85.
pub fn default_slate() -> Vec<PickCandidate> {
    let slate: [(&str, &str, &str, &str, f64, Side, i32, [f64; 2], &[&str]); 8] = [
        ("nba-1", "NBA", "player-a", "points", 24.5, Side::Over, -110, [85.0, 75.0], &[]),
        ("nba-2", "NBA", "player-b", "rebounds", 9.5, Side::Under, 120, [70.0, 70.0], &[]),
        ("nba-3", "NBA", "player-c", "assists", 6.5, Side::Over, -120, [65.0, 55.0], &[]),
        ("nba-4", "NBA", "player-d", "points", 18.5, Side::Under, 100, [50.0, 40.0], &[]),
        ("nfl-1", "NFL", "player-e", "passing_yards", 245.5, Side::Over, -115, [80.0, 70.0], &[]),
        ("nfl-2", "NFL", "player-f", "rushing_yards", 60.5, Side::Under, 105, [60.0, 50.0], &[]),
        ("nfl-3", "NFL", "player-g", "receptions", 4.5, Side::Over, -105, [70.0, 60.0], &[]),
        ("nfl-4", "NFL", "player-h", "receiving_yards", 55.5, Side::Over, -110, [90.0, 80.0], &["injury"]),
    ];

    slate.iter()
        .enumerate()
        .map(|(i, (id, category, subject, prop, line, side, price, scores, tags))| {
            let at = slate_start() + Duration::hours(i as i64);
            let mut pick = PickCandidate::new(*id, *subject, *prop, *line, side.clone(), at);
            pick.category = category.to_string();
            pick.american_odds = Some(*price);
            pick.edge = Some(0.02 * (i as f64 + 1.0));
            pick.per_engine_scores = BTreeMap::from([
                ("form".to_string(), scores[0]),
                ("matchup".to_string(), scores[1]),
            ]);
            pick.tags = tags.iter().map(|t| t.to_string()).collect();
            pick
        })
        .collect()
}

impl Repository for MockRepository {
    fn load_picks(&self) -> Result<Vec<PickCandidate>, EdgeError> {
        self.check()?;
        Ok(self.store.lock().unwrap().picks.clone())
    }

    fn save_picks(&self, picks: &[PickCandidate]) -> Result<(), EdgeError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        store.picks = picks.to_vec();
        store.writes += 1;
        Ok(())
    }

    fn load_settlements(&self) -> Result<Vec<SettlementRecord>, EdgeError> {
        self.check()?;
        Ok(self.store.lock().unwrap().settlements.clone())
    }

    fn save_settlement(&self, record: &SettlementRecord) -> Result<(), EdgeError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        match store.settlements.iter().position(|r| r.pick_id == record.pick_id) {
            Some(i) if store.settlements[i].outcome.is_terminal() => {
                return Err(EdgeError::AlreadySettled {
                    pick_id: record.pick_id.clone(),
                    outcome: store.settlements[i].outcome,
                });
            }
            Some(i) => store.settlements[i] = record.clone(),
            None => store.settlements.push(record.clone()),
        }
        store.writes += 1;
        Ok(())
    }

    fn load_run(&self, id: &str) -> Result<Option<BacktestRun>, EdgeError> {
        self.check()?;
        Ok(self.store.lock().unwrap().runs.iter().find(|r| r.id == id).cloned())
    }

    fn save_run(&self, run: &BacktestRun) -> Result<(), EdgeError> {
        self.check()?;
        let mut store = self.store.lock().unwrap();
        if store.runs.iter().any(|r| r.id == run.id) {
            return Err(EdgeError::Storage(format!("run {} already exists", run.id)));
        }
        store.runs.push(run.clone());
        store.writes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parlay_edge::storage::load_settled_picks;

    #[test]
    fn test_mock_default_slate() {
        let repo = MockRepository::with_default_slate();
        let picks = repo.load_picks().unwrap();
        assert_eq!(picks.len(), 8);
        assert_eq!(picks.iter().filter(|p| p.category == "NBA").count(), 4);
        assert!(picks.iter().all(|p| p.outcome == Outcome::Pending));
        assert!(picks.iter().all(|p| p.per_engine_scores.len() == 2));
        assert!(picks.iter().all(|p| p.contributing_engines.is_none()));
    }

    #[test]
    fn test_mock_refuses_terminal_overwrite() {
        let repo = MockRepository::new();
        let mut record = SettlementRecord::pending("nba-1");
        record.resolve(Outcome::Hit, slate_start()).unwrap();
        repo.save_settlement(&record).unwrap();

        let mut second = SettlementRecord::pending("nba-1");
        second.resolve(Outcome::Miss, slate_start()).unwrap();
        assert_eq!(
            repo.save_settlement(&second),
            Err(EdgeError::AlreadySettled { pick_id: "nba-1".into(), outcome: Outcome::Hit })
        );
        assert_eq!(repo.writes(), 1);
    }

    #[test]
    fn test_mock_forced_error() {
        let repo = MockRepository::with_default_slate();
        repo.set_error("simulated disk failure");

        assert!(matches!(repo.load_picks(), Err(EdgeError::Storage(_))));
        assert!(load_settled_picks(&repo).is_err());
        assert!(repo.save_picks(&[]).is_err());

        repo.clear_error();
        assert_eq!(repo.load_picks().unwrap().len(), 8);
        assert_eq!(repo.writes(), 0);
    }
}
