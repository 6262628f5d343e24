//! # redb-backed Tracking Service
//!
//! Local run tracking using the redb embedded database.
//!
//! ## Tables
//!
//! | Table      | Key           | Value                               |
//! |------------|---------------|-------------------------------------|
//! | `runs`     | run id        | postcard `RunRecord`                |
//! | `metrics`  | (run, seq)    | postcard `(name, MetricValue)`      |
//! | `params`   | (run, seq)    | postcard `(name, value)`            |
//! | `metadata` | `next_run_id` | counter                             |
//!
//! A run's summary is the last logged value of each metric name. Metrics
//! and params can only be logged while the run is `Running`.

use super::{MetricValue, RunHandle, RunId, RunStatus, RunSummary, TrackingService};
use featurestage_core::StageError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Table: run id -> serialized RunRecord.
const RUNS: TableDefinition<u64, &[u8]> = TableDefinition::new("runs");

/// Table: (run id, sequence) -> serialized (name, MetricValue).
const METRICS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("metrics");

/// Table: (run id, sequence) -> serialized (name, value).
const PARAMS: TableDefinition<(u64, u64), &[u8]> = TableDefinition::new("params");

/// Table: metadata key -> value.
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Stored state of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub project: String,
    pub name: String,
    pub status: RunStatus,
    /// RFC 3339.
    pub started_at: String,
    /// RFC 3339; set when the run is finalized.
    pub ended_at: Option<String>,
}

/// Tracking service persisted in a single redb file.
pub struct RedbTracker {
    db: Database,
}

impl std::fmt::Debug for RedbTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbTracker").finish_non_exhaustive()
    }
}

fn decode_run(bytes: &[u8]) -> Result<RunRecord, StageError> {
    postcard::from_bytes(bytes).map_err(|e| StageError::SerializationError(e.to_string()))
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StageError> {
    postcard::to_allocvec(value).map_err(|e| StageError::SerializationError(e.to_string()))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl RedbTracker {
    /// Open or create a tracking database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StageError::IoError(e.to_string()))?;
            }
        }

        let db =
            Database::create(path.as_ref()).map_err(|e| StageError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(RUNS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METRICS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(PARAMS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }

        Ok(Self { db })
    }

    /// Look up one run.
    pub fn run(&self, id: RunId) -> Result<Option<RunRecord>, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(RUNS)
            .map_err(|e| StageError::IoError(e.to_string()))?;
        match table
            .get(id.0)
            .map_err(|e| StageError::IoError(e.to_string()))?
        {
            Some(data) => Ok(Some(decode_run(data.value())?)),
            None => Ok(None),
        }
    }

    /// All runs, oldest first, optionally restricted to one project.
    pub fn list_runs(&self, project: Option<&str>) -> Result<Vec<RunRecord>, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(RUNS)
            .map_err(|e| StageError::IoError(e.to_string()))?;

        let mut runs = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| StageError::IoError(e.to_string()))?
        {
            let (_, data) = entry.map_err(|e| StageError::IoError(e.to_string()))?;
            let record = decode_run(data.value())?;
            if project.is_none_or(|p| p == record.project) {
                runs.push(record);
            }
        }
        Ok(runs)
    }

    /// Params of a run, in logging order.
    pub fn run_params(&self, id: RunId) -> Result<Vec<(String, String)>, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(PARAMS)
            .map_err(|e| StageError::IoError(e.to_string()))?;

        let mut params = Vec::new();
        for entry in table
            .range((id.0, 0u64)..=(id.0, u64::MAX))
            .map_err(|e| StageError::IoError(e.to_string()))?
        {
            let (_, data) = entry.map_err(|e| StageError::IoError(e.to_string()))?;
            let param: (String, String) = postcard::from_bytes(data.value())
                .map_err(|e| StageError::SerializationError(e.to_string()))?;
            params.push(param);
        }
        Ok(params)
    }

    /// Append one serialized entry to a (run, seq) table of an open run.
    fn append(
        &self,
        table_def: TableDefinition<'static, (u64, u64), &'static [u8]>,
        run: &RunHandle,
        bytes: &[u8],
    ) -> Result<(), StageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        {
            let runs = write_txn
                .open_table(RUNS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let record = match runs
                .get(run.id.0)
                .map_err(|e| StageError::IoError(e.to_string()))?
            {
                Some(data) => decode_run(data.value())?,
                None => {
                    return Err(StageError::IoError(format!("unknown run {}", run.id)));
                }
            };
            if record.status.is_terminal() {
                return Err(StageError::IoError(format!(
                    "run {} already ended as {}",
                    run.id, record.status
                )));
            }
        }
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let seq = {
                let last = table
                    .range((run.id.0, 0u64)..=(run.id.0, u64::MAX))
                    .map_err(|e| StageError::IoError(e.to_string()))?
                    .next_back();
                match last {
                    Some(entry) => {
                        let (key, _) = entry.map_err(|e| StageError::IoError(e.to_string()))?;
                        key.value().1.saturating_add(1)
                    }
                    None => 0,
                }
            };
            table
                .insert((run.id.0, seq), bytes)
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        Ok(())
    }
}

impl TrackingService for RedbTracker {
    fn latest_run(&self, project: &str) -> Result<Option<RunId>, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(RUNS)
            .map_err(|e| StageError::IoError(e.to_string()))?;

        for entry in table
            .iter()
            .map_err(|e| StageError::IoError(e.to_string()))?
            .rev()
        {
            let (_, data) = entry.map_err(|e| StageError::IoError(e.to_string()))?;
            let record = decode_run(data.value())?;
            if record.project == project && record.status.is_terminal() {
                return Ok(Some(record.id));
            }
        }
        Ok(None)
    }

    fn run_summary(&self, run: RunId) -> Result<Option<RunSummary>, StageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        {
            let runs = read_txn
                .open_table(RUNS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            if runs
                .get(run.0)
                .map_err(|e| StageError::IoError(e.to_string()))?
                .is_none()
            {
                return Ok(None);
            }
        }

        let table = read_txn
            .open_table(METRICS)
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let mut values = BTreeMap::new();
        for entry in table
            .range((run.0, 0u64)..=(run.0, u64::MAX))
            .map_err(|e| StageError::IoError(e.to_string()))?
        {
            let (_, data) = entry.map_err(|e| StageError::IoError(e.to_string()))?;
            let (name, value): (String, MetricValue) = postcard::from_bytes(data.value())
                .map_err(|e| StageError::SerializationError(e.to_string()))?;
            values.insert(name, value);
        }
        Ok(Some(RunSummary { values }))
    }

    fn start_run(&self, project: &str, name: &str) -> Result<RunHandle, StageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        let id = {
            let mut meta = write_txn
                .open_table(METADATA)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let id = meta
                .get("next_run_id")
                .map_err(|e| StageError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(1);
            meta.insert("next_run_id", id.saturating_add(1))
                .map_err(|e| StageError::IoError(e.to_string()))?;
            RunId(id)
        };
        {
            let record = RunRecord {
                id,
                project: project.to_string(),
                name: name.to_string(),
                status: RunStatus::Running,
                started_at: now(),
                ended_at: None,
            };
            let bytes = encode(&record)?;
            let mut runs = write_txn
                .open_table(RUNS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            runs.insert(id.0, bytes.as_slice())
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StageError::IoError(e.to_string()))?;

        Ok(RunHandle {
            id,
            project: project.to_string(),
            name: name.to_string(),
        })
    }

    fn log_metric(
        &self,
        run: &RunHandle,
        name: &str,
        value: MetricValue,
    ) -> Result<(), StageError> {
        let bytes = encode(&(name.to_string(), value))?;
        self.append(METRICS, run, &bytes)
    }

    fn log_param(&self, run: &RunHandle, name: &str, value: &str) -> Result<(), StageError> {
        let bytes = encode(&(name.to_string(), value.to_string()))?;
        self.append(PARAMS, run, &bytes)
    }

    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), StageError> {
        if !status.is_terminal() {
            return Err(StageError::IoError(format!(
                "run {} cannot end as {}",
                run.id, status
            )));
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        {
            let mut runs = write_txn
                .open_table(RUNS)
                .map_err(|e| StageError::IoError(e.to_string()))?;
            let mut record = match runs
                .get(run.id.0)
                .map_err(|e| StageError::IoError(e.to_string()))?
            {
                Some(data) => decode_run(data.value())?,
                None => return Err(StageError::IoError(format!("unknown run {}", run.id))),
            };
            if record.status.is_terminal() {
                return Err(StageError::IoError(format!(
                    "run {} already ended as {}",
                    run.id, record.status
                )));
            }
            record.status = status;
            record.ended_at = Some(now());
            let bytes = encode(&record)?;
            runs.insert(run.id.0, bytes.as_slice())
                .map_err(|e| StageError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StageError::IoError(e.to_string()))?;
        Ok(())
    }
}
