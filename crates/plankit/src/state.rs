//! State recorder - remembers which steps completed across runs
//!
//! The durable implementation keeps one TOML file per provisioning target.
//! Writes are serialized with an OS lock on a sidecar `.lock` file that is
//! held for a single record update; reads use the in-memory snapshot.

use crate::error::StateError;
use crate::step::StepId;
use crate::types::{ExecutionRecord, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Storage for per-step execution records
pub trait StateRecorder {
    /// Recorded status of a step (`Pending` if never recorded)
    fn get(&self, id: &str) -> StepStatus;

    /// Record a step outcome
    fn set(
        &mut self,
        id: &str,
        status: StepStatus,
        timestamp: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), StateError>;

    /// Every record, sorted by step identifier
    fn all_records(&self) -> Vec<ExecutionRecord>;
}

fn make_record(
    id: &str,
    status: StepStatus,
    timestamp: DateTime<Utc>,
    error: Option<&str>,
) -> ExecutionRecord {
    ExecutionRecord {
        id: id.to_string(),
        status,
        timestamp,
        error: error.map(str::to_string),
    }
}

// ============================================================================
// In-memory recorder
// ============================================================================

/// Non-persistent recorder for tests and previews
#[derive(Debug, Default, Clone)]
pub struct MemoryStateRecorder {
    records: BTreeMap<StepId, ExecutionRecord>,
}

impl MemoryStateRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: &str) -> Option<&ExecutionRecord> {
        self.records.get(id)
    }
}

impl StateRecorder for MemoryStateRecorder {
    fn get(&self, id: &str) -> StepStatus {
        self.records.get(id).map(|r| r.status).unwrap_or_default()
    }

    fn set(
        &mut self,
        id: &str,
        status: StepStatus,
        timestamp: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), StateError> {
        self.records
            .insert(id.to_string(), make_record(id, status, timestamp, error));
        Ok(())
    }

    fn all_records(&self) -> Vec<ExecutionRecord> {
        self.records.values().cloned().collect()
    }
}

// ============================================================================
// File-backed recorder
// ============================================================================

/// On-disk layout of the state file
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    steps: BTreeMap<StepId, StoredRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    status: StepStatus,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl StoredRecord {
    fn into_record(self, id: &str) -> ExecutionRecord {
        ExecutionRecord {
            id: id.to_string(),
            status: self.status,
            timestamp: self.timestamp,
            error: self.error,
        }
    }
}

/// Durable recorder backed by a TOML file
#[derive(Debug)]
pub struct FileStateRecorder {
    path: PathBuf,
    snapshot: StateFile,
}

impl FileStateRecorder {
    /// Open the state file at `path`
    ///
    /// A missing file means no prior state. An unreadable or corrupt file is
    /// also treated as no prior state, with a warning; the next write
    /// replaces it.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let snapshot = read_state(&path).unwrap_or_else(|reason| {
            log::warn!(
                "Ignoring unreadable state file {} ({}); treating all steps as pending",
                path.display(),
                reason
            );
            StateFile::default()
        });
        Self { path, snapshot }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, picking up writes from other instances
    pub fn refresh(&mut self) {
        match read_state(&self.path) {
            Ok(state) => self.snapshot = state,
            Err(reason) => log::warn!(
                "Could not refresh state from {}: {}",
                self.path.display(),
                reason
            ),
        }
    }

    /// Drop the record for one step; returns whether it existed
    pub fn forget(&mut self, id: &str) -> Result<bool, StateError> {
        let mut existed = false;
        self.update(|state| existed = state.steps.remove(id).is_some())?;
        Ok(existed)
    }

    /// Drop every record
    pub fn clear(&mut self) -> Result<(), StateError> {
        self.update(|state| state.steps.clear())
    }

    /// Apply a change under the write lock
    ///
    /// Re-reads the file first so records written by another instance since
    /// our last read are kept, then writes a temp file and renames it over
    /// the state file so readers never see a half-written file.
    fn update<F>(&mut self, change: F) -> Result<(), StateError>
    where
        F: FnOnce(&mut StateFile),
    {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|source| StateError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let _lock = FileLock::acquire(&lock_path_for(&self.path))?;

        let mut state = match read_state(&self.path) {
            Ok(state) => state,
            Err(reason) => {
                log::warn!(
                    "Overwriting unreadable state file {}: {}",
                    self.path.display(),
                    reason
                );
                StateFile::default()
            }
        };
        change(&mut state);

        let content = toml::to_string_pretty(&state)?;
        replace_file(&self.path, &content)?;

        log::debug!("Saved state to {}", self.path.display());
        self.snapshot = state;
        Ok(())
    }
}

impl StateRecorder for FileStateRecorder {
    fn get(&self, id: &str) -> StepStatus {
        self.snapshot
            .steps
            .get(id)
            .map(|r| r.status)
            .unwrap_or_default()
    }

    fn set(
        &mut self,
        id: &str,
        status: StepStatus,
        timestamp: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<(), StateError> {
        let record = StoredRecord {
            status,
            timestamp,
            error: error.map(str::to_string),
        };
        self.update(|state| {
            state.steps.insert(id.to_string(), record);
        })
    }

    fn all_records(&self) -> Vec<ExecutionRecord> {
        self.snapshot
            .steps
            .iter()
            .map(|(id, r)| r.clone().into_record(id))
            .collect()
    }
}

/// Read the state file; a missing file is empty state
fn read_state(path: &Path) -> Result<StateFile, String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("State file {} does not exist yet", path.display());
            return Ok(StateFile::default());
        }
        Err(e) => return Err(e.to_string()),
    };
    toml::from_str(&content).map_err(|e| e.to_string())
}

/// Sidecar lock file guarding `path`, e.g. `state.toml.lock`
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Replace `path` with `content` via a temp file and rename
///
/// Readers see either the old or the new content, never a partial write.
pub fn replace_file(path: &Path, content: &str) -> Result<(), StateError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    fs::write(&tmp, content).map_err(|source| StateError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Exclusive OS lock on a lock file, released on drop
#[derive(Debug)]
pub struct FileLock {
    file: File,
}

impl FileLock {
    /// Block until the lock at `path` is held, creating the file if needed
    pub fn acquire(path: &Path) -> Result<Self, StateError> {
        let io_err = |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(io_err)?;
        file.lock().map_err(io_err)?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            log::debug!("Failed to release lock: {e}");
        }
    }
}
