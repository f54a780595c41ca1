//! File-per-record durable store
//!
//! One pretty-printed JSON object per file, routed into a date-based
//! directory hierarchy derived purely from the record itself. The layout
//! is a persisted contract: changing it requires a migration, not a
//! silent path change.
//!
//! Retrieval by id alone walks the record roots for a matching filename.
//! That is the correctness-over-performance default for this store; a
//! deployment that needs to scale should add an id-to-path index in front
//! of it rather than changing the layout.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{EngramError, Result};
use crate::record::{Record, RecordKind};
use crate::storage::filter::RecordFilter;

/// Outcome of a filtered scan: the matching records plus the number of
/// files that failed to decode and were excluded.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub records: Vec<Record>,
    pub corrupt_count: usize,
}

/// Filesystem-backed durable store, the authoritative source of truth.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `base_dir`, creating it if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Compute the on-disk path for a record. Pure: two computations for
    /// the same record are always identical, across processes.
    pub fn record_path(&self, record: &Record) -> PathBuf {
        let created = record.created_at();
        let year = created.year().to_string();
        let month = format!("{:02}", created.month());

        let dir = match record {
            Record::Episode(_) => self.base_dir.join("episodes").join(year).join(month),
            Record::TurnUser(_) => self
                .base_dir
                .join("turns")
                .join("user")
                .join(year)
                .join(month),
            Record::TurnLlm(_) => self
                .base_dir
                .join("turns")
                .join("llm")
                .join(year)
                .join(month),
            Record::Sensory(_) => self
                .base_dir
                .join("turns")
                .join("sensory")
                .join(year)
                .join(month),
            // Semantic facts are bucketed by subject, not by date, so that
            // facts about the same subject cluster in one directory.
            Record::Semantic(fact) => self
                .base_dir
                .join("semantic")
                .join(subject_bucket(&fact.subject)),
        };

        dir.join(format!("{}.json", record.id()))
    }

    /// Persist a record, replacing any previous file for the same id.
    /// Full-overwrite: callers must not assume partial merge semantics.
    pub fn store(&mut self, record: &Record) -> Result<String> {
        let path = self.record_path(record);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(record)
            .map_err(|e| EngramError::Serialization(e.to_string()))?;
        fs::write(&path, json)?;

        debug!(id = record.id(), path = %path.display(), "stored record");
        Ok(record.id().to_string())
    }

    /// Retrieve a record by id. Walks the record roots for `{id}.json`;
    /// a matching file that fails to decode is a `CorruptRecord` error,
    /// never silently skipped.
    pub fn retrieve(&self, id: &str) -> Result<Record> {
        let path = self
            .find_record_file(id)?
            .ok_or_else(|| EngramError::NotFound(id.to_string()))?;
        self.read_record(&path)
    }

    /// Scan for records matching `filter`, up to `limit`. Corrupt files
    /// are logged, excluded, and counted in the outcome.
    pub fn query(&self, filter: &RecordFilter, limit: usize) -> Result<ScanOutcome> {
        let mut outcome = ScanOutcome::default();
        if limit == 0 {
            return Ok(outcome);
        }

        let roots = match filter.kind() {
            Some(kind) => vec![self.kind_root(kind)],
            None => self.record_roots(),
        };

        for root in roots {
            for path in json_files(&root)? {
                match self.read_record(&path) {
                    Ok(record) => {
                        if filter.matches(&record) {
                            outcome.records.push(record);
                            if outcome.records.len() >= limit {
                                return Ok(outcome);
                            }
                        }
                    }
                    Err(EngramError::CorruptRecord { path, reason }) => {
                        warn!(path = %path.display(), reason, "corrupt record excluded from scan");
                        outcome.corrupt_count += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(outcome)
    }

    /// Remove the record file for `id`. Returns false on a miss.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        match self.find_record_file(id)? {
            Some(path) => {
                fs::remove_file(&path)?;
                debug!(id, path = %path.display(), "deleted record");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The subtrees that hold records. Distiller unit directories live
    /// beside these and are never touched by record operations.
    fn record_roots(&self) -> Vec<PathBuf> {
        vec![
            self.base_dir.join("episodes"),
            self.base_dir.join("turns"),
            self.base_dir.join("semantic"),
        ]
    }

    fn kind_root(&self, kind: RecordKind) -> PathBuf {
        match kind {
            RecordKind::Episode => self.base_dir.join("episodes"),
            RecordKind::TurnUser => self.base_dir.join("turns").join("user"),
            RecordKind::TurnLlm => self.base_dir.join("turns").join("llm"),
            RecordKind::Sensory => self.base_dir.join("turns").join("sensory"),
            RecordKind::Semantic => self.base_dir.join("semantic"),
        }
    }

    fn find_record_file(&self, id: &str) -> Result<Option<PathBuf>> {
        let target = std::ffi::OsString::from(format!("{id}.json"));
        for root in self.record_roots() {
            for path in json_files(&root)? {
                if path.file_name() == Some(target.as_os_str()) {
                    return Ok(Some(path));
                }
            }
        }
        Ok(None)
    }

    fn read_record(&self, path: &Path) -> Result<Record> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| EngramError::CorruptRecord {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// All `.json` files under `root`, in stable sorted order. A missing root
/// is an empty scan, not an error.
fn json_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            EngramError::Io(e.into_io_error().unwrap_or_else(|| {
                std::io::Error::other("directory walk failed")
            }))
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "json")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Two-hex-char bucket for a semantic subject. Stable across processes.
pub fn subject_bucket(subject: &str) -> String {
    let hex = blake3::hash(subject.as_bytes()).to_hex();
    hex.as_str()[..2].to_string()
}
