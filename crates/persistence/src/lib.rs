#![deny(warnings)]

//! Run-scoped persistence for the simulation.
//!
//! Each run owns a directory keyed by `(prompt_variant, run_id)`, with one
//! subdirectory per firm:
//!
//! ```text
//! {base}/P1_run_3/
//!   firm_0/market_history.json      rolling window of the last N outcomes
//!   firm_0/reasoning_process.json   rolling window of the last M reasonings
//!   firm_1/...
//!   simulation_log.json             unbounded append-only audit trail
//!   metadata.json                   written once, on successful completion
//! ```
//!
//! Distinct runs can never interfere: the directory key makes their storage
//! disjoint by construction. All writes go through a temp-file-then-rename
//! step so a reader never observes a partially written log.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sim_core::{AuditRecord, FirmId, PeriodOutcome, PromptVariant, ReasoningEntry, RunMetadata, SimParams};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Shown to the oracle in place of an empty outcome table.
pub const NO_HISTORY_MESSAGE: &str =
    "No historical data available yet. This is the beginning of the market.";

/// Shown to the oracle in place of an empty reasoning log.
pub const NO_REASONING_MESSAGE: &str =
    "No previous reasoning available. This is your first decision.";

/// Persistence failures, with the offending path attached.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        StoreError::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// On-disk shape of the reasoning log. Early runs wrote a single object
/// instead of a list; decode both, always write the list form.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReasoningOnDisk {
    Entries(Vec<ReasoningEntry>),
    Legacy(ReasoningEntry),
}

/// Storage for one simulation run.
pub struct RunStore {
    run_dir: PathBuf,
    history_length: usize,
    reasoning_length: usize,
}

impl RunStore {
    /// Create (or reopen) the storage tree for one `(variant, run_id)` run.
    pub fn create(
        base_dir: &Path,
        variant: PromptVariant,
        run_id: u32,
        sim: &SimParams,
    ) -> Result<Self, StoreError> {
        let run_dir = base_dir.join(format!("{}_run_{}", variant.label(), run_id));
        for firm in FirmId::BOTH {
            let firm_dir = run_dir.join(firm.to_string());
            fs::create_dir_all(&firm_dir).map_err(|e| StoreError::io(&firm_dir, e))?;
        }
        debug!(run_dir = %run_dir.display(), "run store ready");
        Ok(RunStore {
            run_dir,
            history_length: sim.history_length,
            reasoning_length: sim.reasoning_history_length,
        })
    }

    /// Root directory of this run's storage.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn market_history_path(&self, firm: FirmId) -> PathBuf {
        self.run_dir.join(firm.to_string()).join("market_history.json")
    }

    fn reasoning_path(&self, firm: FirmId) -> PathBuf {
        self.run_dir
            .join(firm.to_string())
            .join("reasoning_process.json")
    }

    fn simulation_log_path(&self) -> PathBuf {
        self.run_dir.join("simulation_log.json")
    }

    fn metadata_path(&self) -> PathBuf {
        self.run_dir.join("metadata.json")
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(path, e)),
        };
        let value = serde_json::from_slice(&bytes).map_err(|e| StoreError::json(path, e))?;
        Ok(Some(value))
    }

    /// Write to a temp file in the same directory, flush, then rename over
    /// the final path. Readers see either the old log or the new one.
    fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(value).map_err(|e| StoreError::json(path, e))?;
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
        file.write_all(&data).map_err(|e| StoreError::io(&tmp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| StoreError::io(path, e))?;
        Ok(())
    }

    /// A firm's rolling outcome window, oldest first. Missing storage is an
    /// empty history, not an error.
    pub fn load_history(&self, firm: FirmId) -> Result<Vec<PeriodOutcome>, StoreError> {
        Ok(self
            .read_json(&self.market_history_path(firm))?
            .unwrap_or_default())
    }

    /// Append one outcome, evicting the oldest record past capacity.
    pub fn append_history(&self, firm: FirmId, outcome: PeriodOutcome) -> Result<(), StoreError> {
        let mut history = self.load_history(firm)?;
        history.push(outcome);
        if history.len() > self.history_length {
            let excess = history.len() - self.history_length;
            history.drain(..excess);
        }
        self.write_json_atomic(&self.market_history_path(firm), &history)
    }

    /// A firm's rolling reasoning window, oldest first. A legacy
    /// single-object file decodes as a one-element window.
    pub fn load_reasoning(&self, firm: FirmId) -> Result<Vec<ReasoningEntry>, StoreError> {
        let decoded: Option<ReasoningOnDisk> = self.read_json(&self.reasoning_path(firm))?;
        Ok(match decoded {
            None => Vec::new(),
            Some(ReasoningOnDisk::Entries(entries)) => entries,
            Some(ReasoningOnDisk::Legacy(entry)) => vec![entry],
        })
    }

    /// Append one reasoning entry, evicting past capacity. Always writes the
    /// list shape, which retires any legacy file it read.
    pub fn append_reasoning(&self, firm: FirmId, entry: ReasoningEntry) -> Result<(), StoreError> {
        let mut entries = self.load_reasoning(firm)?;
        entries.push(entry);
        if entries.len() > self.reasoning_length {
            let excess = entries.len() - self.reasoning_length;
            entries.drain(..excess);
        }
        self.write_json_atomic(&self.reasoning_path(firm), &entries)
    }

    /// Full audit trail, oldest first.
    pub fn load_audit(&self) -> Result<Vec<AuditRecord>, StoreError> {
        Ok(self
            .read_json(&self.simulation_log_path())?
            .unwrap_or_default())
    }

    /// Append one period to the audit trail. Unbounded by design: the audit
    /// log is the analysis artifact, not oracle context.
    pub fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError> {
        let mut log = self.load_audit()?;
        log.push(record);
        self.write_json_atomic(&self.simulation_log_path(), &log)
    }

    /// Record run completion. Only ever written once, after the final period.
    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<(), StoreError> {
        self.write_json_atomic(&self.metadata_path(), metadata)
    }

    /// The completion record, if the run finished.
    pub fn load_metadata(&self) -> Result<Option<RunMetadata>, StoreError> {
        self.read_json(&self.metadata_path())
    }
}

/// Render the outcome window as the fixed-column table the oracle reads.
pub fn format_history(history: &[PeriodOutcome]) -> String {
    if history.is_empty() {
        return NO_HISTORY_MESSAGE.to_string();
    }

    let mut out = String::from(
        "Period | Your Price | Your Sales | Your Profit | Market Share | Competitor Price\n",
    );
    out.push_str(&"-".repeat(90));
    out.push('\n');
    for entry in history {
        out.push_str(&format!(
            "{:6} | ${:9.2} | {:10.2} | ${:11.2} | {:11.2}% | ${:15.2}\n",
            entry.period,
            entry.own_price,
            entry.own_sales,
            entry.own_profit,
            entry.market_share,
            entry.competitor_price,
        ));
    }
    out
}

/// Render the reasoning window as period-tagged blocks.
pub fn format_reasoning(entries: &[ReasoningEntry]) -> String {
    if entries.is_empty() {
        return NO_REASONING_MESSAGE.to_string();
    }

    let blocks: Vec<String> = entries
        .iter()
        .map(|entry| match entry.period {
            Some(period) => format!("[Period {}]\n{}", period, entry.reasoning),
            None => format!("[Period unknown]\n{}", entry.reasoning),
        })
        .collect();
    blocks.join(&format!("\n\n{}\n\n", "=".repeat(80)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::{RunStatus, SimParams};
    use tempfile::tempdir;

    fn outcome(period: u32) -> PeriodOutcome {
        PeriodOutcome {
            period,
            own_price: 1.80,
            own_sales: 42.50,
            own_profit: 34.00,
            market_share: 50.00,
            competitor_price: 1.80,
        }
    }

    fn small_store(base: &Path) -> RunStore {
        let sim = SimParams {
            num_periods: 10,
            history_length: 3,
            reasoning_history_length: 2,
        };
        RunStore::create(base, PromptVariant::Defensive, 1, &sim).unwrap()
    }

    #[test]
    fn missing_files_load_as_empty() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let firm = FirmId::new(0).unwrap();
        assert!(store.load_history(firm).unwrap().is_empty());
        assert!(store.load_reasoning(firm).unwrap().is_empty());
        assert!(store.load_audit().unwrap().is_empty());
        assert!(store.load_metadata().unwrap().is_none());
    }

    #[test]
    fn history_window_evicts_oldest_first() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let firm = FirmId::new(0).unwrap();

        for period in 0..4 {
            store.append_history(firm, outcome(period)).unwrap();
        }

        let history = store.load_history(firm).unwrap();
        let periods: Vec<u32> = history.iter().map(|o| o.period).collect();
        assert_eq!(periods, vec![1, 2, 3]);
    }

    #[test]
    fn firms_have_disjoint_histories() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let f0 = FirmId::new(0).unwrap();
        store.append_history(f0, outcome(0)).unwrap();
        assert_eq!(store.load_history(f0).unwrap().len(), 1);
        assert!(store.load_history(f0.rival()).unwrap().is_empty());
    }

    #[test]
    fn runs_have_disjoint_directories() {
        let dir = tempdir().unwrap();
        let sim = SimParams::default();
        let a = RunStore::create(dir.path(), PromptVariant::Defensive, 1, &sim).unwrap();
        let b = RunStore::create(dir.path(), PromptVariant::Defensive, 2, &sim).unwrap();
        let c = RunStore::create(dir.path(), PromptVariant::Offensive, 1, &sim).unwrap();
        assert_ne!(a.run_dir(), b.run_dir());
        assert_ne!(a.run_dir(), c.run_dir());
        assert!(a.run_dir().ends_with("P1_run_1"));
        assert!(c.run_dir().ends_with("P2_run_1"));
    }

    #[test]
    fn reasoning_window_is_bounded() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let firm = FirmId::new(1).unwrap();

        for period in 0..3 {
            store
                .append_reasoning(
                    firm,
                    ReasoningEntry {
                        period: Some(period),
                        reasoning: format!("thoughts {period}"),
                    },
                )
                .unwrap();
        }

        let entries = store.load_reasoning(firm).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].period, Some(1));
        assert_eq!(entries[1].period, Some(2));
    }

    #[test]
    fn legacy_single_entry_reasoning_migrates() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let firm = FirmId::new(0).unwrap();

        // Old runs wrote one bare object instead of a list.
        let legacy_path = dir
            .path()
            .join("P1_run_1")
            .join("firm_0")
            .join("reasoning_process.json");
        fs::write(
            &legacy_path,
            r#"{"period": 4, "reasoning": "stay at 1.80"}"#,
        )
        .unwrap();

        let entries = store.load_reasoning(firm).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].period, Some(4));

        // The next append rewrites the file in list form.
        store
            .append_reasoning(
                firm,
                ReasoningEntry {
                    period: Some(5),
                    reasoning: "undercut".to_string(),
                },
            )
            .unwrap();
        let raw = fs::read_to_string(&legacy_path).unwrap();
        assert!(raw.trim_start().starts_with('['));
        assert_eq!(store.load_reasoning(firm).unwrap().len(), 2);
    }

    #[test]
    fn audit_log_is_unbounded() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());

        for period in 0..5 {
            store
                .append_audit(AuditRecord {
                    period,
                    price_0: 1.70,
                    price_1: 1.75,
                    demand_0: 40.0,
                    demand_1: 38.0,
                    profit_0: 28.0,
                    profit_1: 28.5,
                    market_share_0: 51.3,
                    market_share_1: 48.7,
                    reasoning_0: Some("r0".into()),
                    reasoning_1: Some("r1".into()),
                })
                .unwrap();
        }

        // Past the history window's capacity of 3, nothing is evicted here.
        let log = store.load_audit().unwrap();
        assert_eq!(log.len(), 5);
        assert_eq!(log[0].period, 0);
        assert_eq!(log[4].period, 4);
    }

    #[test]
    fn metadata_roundtrips() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let meta = RunMetadata {
            prompt_variant: PromptVariant::Defensive,
            run_id: 1,
            num_periods: 10,
            status: RunStatus::Completed,
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            elapsed_seconds: 12,
        };
        store.write_metadata(&meta).unwrap();
        let back = store.load_metadata().unwrap().unwrap();
        assert_eq!(back.run_id, 1);
        assert_eq!(back.status, RunStatus::Completed);
    }

    #[test]
    fn atomic_writes_leave_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = small_store(dir.path());
        let firm = FirmId::new(0).unwrap();
        store.append_history(firm, outcome(0)).unwrap();

        let firm_dir = store.run_dir().join("firm_0");
        let leftovers: Vec<_> = fs::read_dir(&firm_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn history_table_has_fixed_columns() {
        let table = format_history(&[outcome(12)]);
        assert!(table.starts_with("Period | Your Price |"));
        assert!(table.contains("    12 | $     1.80 |"));
        assert!(table.contains('%'));
    }

    #[test]
    fn empty_windows_format_as_sentinels() {
        assert_eq!(format_history(&[]), NO_HISTORY_MESSAGE);
        assert_eq!(format_reasoning(&[]), NO_REASONING_MESSAGE);
    }

    #[test]
    fn reasoning_blocks_are_period_tagged() {
        let text = format_reasoning(&[
            ReasoningEntry {
                period: Some(3),
                reasoning: "hold".into(),
            },
            ReasoningEntry {
                period: None,
                reasoning: "old entry".into(),
            },
        ]);
        assert!(text.contains("[Period 3]\nhold"));
        assert!(text.contains("[Period unknown]\nold entry"));
        assert!(text.contains(&"=".repeat(80)));
    }
}
