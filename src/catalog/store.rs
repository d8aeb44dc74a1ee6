//! Persisted records: one JSON file per crawled entry, and the CSV download ledger.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::AssetRecord;
use crate::paths;

/// Record store errors. Always fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

impl PersistenceError {
    fn read(path: &Path, source: io::Error) -> Self {
        Self::Read {
            path: path.to_path_buf(),
            source,
        }
    }

    fn write(path: &Path, source: io::Error) -> Self {
        Self::Write {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory of `<sanitized title>.json` metadata files.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    dir: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn create_dir(&self) -> Result<(), PersistenceError> {
        fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::write(&self.dir, e))
    }

    /// File a record with this title is stored in
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.dir.join(format!("{}.json", paths::sanitize_filename(title)))
    }

    /// Write `record` as pretty JSON, replacing any file with the same name.
    pub fn write(&self, record: &AssetRecord) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(&record.title);
        let json = serde_json::to_string_pretty(record).map_err(|e| PersistenceError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        fs::write(&path, json).map_err(|e| PersistenceError::write(&path, e))?;
        Ok(path)
    }

    /// Load every `*.json` record, sorted by file name.
    ///
    /// Unparseable files are logged and skipped; an unreadable directory is an error.
    pub fn load_all(&self) -> Result<Vec<AssetRecord>, PersistenceError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| PersistenceError::read(&self.dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && paths::extension_lower(p).as_deref() == Some("json"))
            .collect();
        files.sort();

        let mut records = Vec::with_capacity(files.len());
        for path in files {
            let content = fs::read_to_string(&path).map_err(|e| PersistenceError::read(&path, e))?;
            match serde_json::from_str::<AssetRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable metadata {}: {}", path.display(), e),
            }
        }

        debug!("Loaded {} metadata records from {}", records.len(), self.dir.display());
        Ok(records)
    }
}

/// Outcome recorded for a title
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    /// Also assumed for rows written without a status column
    #[default]
    Downloaded,
    Skipped,
}

/// One ledger row: the record's fields plus what happened to it.
///
/// Columns the struct does not know (such as an unnamed index column in
/// front) are ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub title: String,
    pub author: String,
    pub text: Option<String>,
    pub asset_page_url: Option<String>,
    pub image_src: Option<String>,
    #[serde(default)]
    pub status: LedgerStatus,
    /// Unix epoch when the ledger predates the column
    #[serde(default = "unknown_time")]
    pub recorded_at: DateTime<Utc>,
}

fn unknown_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl LedgerRow {
    pub fn new(record: &AssetRecord, status: LedgerStatus) -> Self {
        Self {
            title: record.title.clone(),
            author: record.author.clone(),
            text: record.description.clone(),
            asset_page_url: record.page_url.clone(),
            image_src: record.image_url.clone(),
            status,
            recorded_at: Utc::now(),
        }
    }
}

/// Titles already handled by previous download runs.
///
/// Loaded once, mutated in memory, written back wholesale with [`DownloadLedger::save`].
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    rows: Vec<LedgerRow>,
    titles: HashSet<String>,
}

impl DownloadLedger {
    /// Load the ledger at `path`; a missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let mut ledger = Self {
            path,
            rows: Vec::new(),
            titles: HashSet::new(),
        };

        if !ledger.path.exists() {
            return Ok(ledger);
        }

        let mut reader = csv::Reader::from_path(&ledger.path).map_err(|e| PersistenceError::Parse {
            path: ledger.path.clone(),
            reason: e.to_string(),
        })?;
        for row in reader.deserialize::<LedgerRow>() {
            let row = row.map_err(|e| PersistenceError::Parse {
                path: ledger.path.clone(),
                reason: e.to_string(),
            })?;
            if ledger.titles.insert(row.title.clone()) {
                ledger.rows.push(row);
            }
        }

        debug!("Ledger {} holds {} titles", ledger.path.display(), ledger.rows.len());
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, title: &str) -> bool {
        self.titles.contains(title)
    }

    pub fn get(&self, title: &str) -> Option<&LedgerRow> {
        self.rows.iter().find(|r| r.title == title)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add a row for `record`. An existing row for the title is kept as is.
    pub fn insert(&mut self, record: &AssetRecord, status: LedgerStatus) -> bool {
        if !self.titles.insert(record.title.clone()) {
            return false;
        }
        self.rows.push(LedgerRow::new(record, status));
        true
    }

    /// Rewrite the whole ledger file.
    ///
    /// Rows go to a temporary file next to the ledger which then replaces it,
    /// so an interrupted save leaves the previous ledger intact.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let dir = paths::ensure_parent_dirs(&self.path).map_err(|e| PersistenceError::write(&self.path, e))?;

        let tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| PersistenceError::write(&self.path, e))?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file());
            for row in &self.rows {
                writer
                    .serialize(row)
                    .map_err(|e| PersistenceError::write(&self.path, io::Error::other(e.to_string())))?;
            }
            writer.flush().map_err(|e| PersistenceError::write(&self.path, e))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| PersistenceError::write(&self.path, e.error))?;
        debug!("Saved {} ledger rows to {}", self.rows.len(), self.path.display());
        Ok(())
    }
}
