//! Persistence layer.
//!
//! The engine itself never touches storage; callers load picks,
//! settlements and prior runs through the `Repository` trait and hand
//! them to the pure scoring / settlement / backtest functions.
//!
//! `JsonFileRepository` keeps one JSON file per collection in a data
//! directory. `InMemoryRepository` backs tests and one-shot CLI runs.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error, info};

use crate::backtest::runner::{BacktestRun, SettledPick};
use crate::types::{EdgeError, PickCandidate, SettlementRecord};

const PICKS_FILE: &str = "picks.json";
const SETTLEMENTS_FILE: &str = "settlements.json";
const RUNS_FILE: &str = "runs.json";

/// Storage seam between the engine and whatever persists its records.
///
/// `save_settlement` must refuse to overwrite a terminal settlement, and
/// `save_run` must refuse to overwrite an existing run.
#[cfg_attr(test, mockall::automock)]
pub trait Repository {
    fn load_picks(&self) -> Result<Vec<PickCandidate>, EdgeError>;
    fn save_picks(&self, picks: &[PickCandidate]) -> Result<(), EdgeError>;
    fn load_settlements(&self) -> Result<Vec<SettlementRecord>, EdgeError>;
    fn save_settlement(&self, record: &SettlementRecord) -> Result<(), EdgeError>;
    fn load_run(&self, id: &str) -> Result<Option<BacktestRun>, EdgeError>;
    fn save_run(&self, run: &BacktestRun) -> Result<(), EdgeError>;
}

/// Join picks with their terminal settlements.
pub fn load_settled_picks(repo: &dyn Repository) -> Result<Vec<SettledPick>, EdgeError> {
    let settlements: BTreeMap<String, SettlementRecord> = repo
        .load_settlements()?
        .into_iter()
        .filter(|s| s.outcome.is_terminal())
        .map(|s| (s.pick_id.clone(), s))
        .collect();

    let settled: Vec<SettledPick> = repo
        .load_picks()?
        .into_iter()
        .filter_map(|pick| {
            let settlement = settlements.get(&pick.id)?.clone();
            Some(SettledPick::new(pick, settlement))
        })
        .collect();

    debug!(settled = settled.len(), "Settled picks loaded");
    Ok(settled)
}

/// Persist a settlement and the picks it was applied to.
///
/// The settlement goes first: its terminal-state check is what refuses a
/// second grading, and `load_settled_picks` joins on it. If the picks then
/// fail to save, the error names the pick left out of step.
pub fn commit_settlement(
    repo: &dyn Repository,
    record: &SettlementRecord,
    picks: &[PickCandidate],
) -> Result<(), EdgeError> {
    repo.save_settlement(record)?;
    if let Err(e) = repo.save_picks(picks) {
        error!(
            pick_id = %record.pick_id,
            outcome = %record.outcome,
            error = %e,
            "Settlement recorded but picks not updated"
        );
        return Err(EdgeError::Storage(format!(
            "settlement for {} recorded as {} but picks not updated: {e}",
            record.pick_id, record.outcome
        )));
    }
    Ok(())
}

/// Apply the terminal-state check shared by every repository.
fn merge_settlement(
    records: &mut Vec<SettlementRecord>,
    record: &SettlementRecord,
) -> Result<(), EdgeError> {
    match records.iter_mut().find(|r| r.pick_id == record.pick_id) {
        Some(existing) if existing.outcome.is_terminal() => Err(EdgeError::AlreadySettled {
            pick_id: existing.pick_id.clone(),
            outcome: existing.outcome,
        }),
        Some(existing) => {
            *existing = record.clone();
            Ok(())
        }
        None => {
            records.push(record.clone());
            Ok(())
        }
    }
}

fn storage_error(e: anyhow::Error) -> EdgeError {
    EdgeError::Storage(format!("{e:#}"))
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// Read a JSON collection. A missing file is an empty collection.
fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        debug!(path = %path.display(), "No data file, starting empty");
        return Ok(T::default());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise records")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// One JSON file per collection under a data directory.
pub struct JsonFileRepository {
    dir: PathBuf,
}

impl JsonFileRepository {
    /// Open (and create if needed) a data directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;
        info!(dir = %dir.display(), "Opened JSON repository");
        Ok(Self { dir })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn load_runs(&self) -> Result<Vec<BacktestRun>> {
        read_json(&self.path(RUNS_FILE))
    }
}

impl Repository for JsonFileRepository {
    fn load_picks(&self) -> Result<Vec<PickCandidate>, EdgeError> {
        read_json(&self.path(PICKS_FILE)).map_err(storage_error)
    }

    fn save_picks(&self, picks: &[PickCandidate]) -> Result<(), EdgeError> {
        write_json(&self.path(PICKS_FILE), picks).map_err(storage_error)?;
        debug!(count = picks.len(), "Picks saved");
        Ok(())
    }

    fn load_settlements(&self) -> Result<Vec<SettlementRecord>, EdgeError> {
        read_json(&self.path(SETTLEMENTS_FILE)).map_err(storage_error)
    }

    fn save_settlement(&self, record: &SettlementRecord) -> Result<(), EdgeError> {
        let path = self.path(SETTLEMENTS_FILE);
        let mut records: Vec<SettlementRecord> = read_json(&path).map_err(storage_error)?;
        merge_settlement(&mut records, record)?;
        write_json(&path, &records).map_err(storage_error)?;
        debug!(pick_id = %record.pick_id, outcome = %record.outcome, "Settlement saved");
        Ok(())
    }

    fn load_run(&self, id: &str) -> Result<Option<BacktestRun>, EdgeError> {
        let runs = self.load_runs().map_err(storage_error)?;
        Ok(runs.into_iter().find(|r| r.id == id))
    }

    fn save_run(&self, run: &BacktestRun) -> Result<(), EdgeError> {
        let mut runs = self.load_runs().map_err(storage_error)?;
        if runs.iter().any(|r| r.id == run.id) {
            return Err(EdgeError::Storage(format!("run {} already exists", run.id)));
        }
        runs.push(run.clone());
        write_json(&self.path(RUNS_FILE), &runs).map_err(storage_error)?;
        info!(run_id = %run.id, "Backtest run saved");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    picks: Vec<PickCandidate>,
    settlements: Vec<SettlementRecord>,
    runs: Vec<BacktestRun>,
}

/// Process-local repository with the same semantics as the JSON store.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<MemoryState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, EdgeError> {
        self.state
            .lock()
            .map_err(|_| EdgeError::Storage("in-memory repository lock poisoned".into()))
    }
}

impl Repository for InMemoryRepository {
    fn load_picks(&self) -> Result<Vec<PickCandidate>, EdgeError> {
        Ok(self.lock()?.picks.clone())
    }

    fn save_picks(&self, picks: &[PickCandidate]) -> Result<(), EdgeError> {
        self.lock()?.picks = picks.to_vec();
        Ok(())
    }

    fn load_settlements(&self) -> Result<Vec<SettlementRecord>, EdgeError> {
        Ok(self.lock()?.settlements.clone())
    }

    fn save_settlement(&self, record: &SettlementRecord) -> Result<(), EdgeError> {
        merge_settlement(&mut self.lock()?.settlements, record)
    }

    fn load_run(&self, id: &str) -> Result<Option<BacktestRun>, EdgeError> {
        Ok(self.lock()?.runs.iter().find(|r| r.id == id).cloned())
    }

    fn save_run(&self, run: &BacktestRun) -> Result<(), EdgeError> {
        let mut state = self.lock()?;
        if state.runs.iter().any(|r| r.id == run.id) {
            return Err(EdgeError::Storage(format!("run {} already exists", run.id)));
        }
        state.runs.push(run.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
