//! Cache store
//!
//! One last-known-good entry per task, persisted as JSON. A lookup hits
//! only when the stored input fingerprint equals the freshly computed
//! one and every recorded output file still exists. The store is
//! advisory: every failure here downgrades to a cache miss.

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Last-known-good record for one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of the resolved command plus declared inputs
    pub input_fingerprint: String,

    /// Fingerprint of the produced outputs
    pub output_fingerprint: String,

    /// Declared output paths at the time of the run
    pub outputs: Vec<PathBuf>,

    /// When the entry was recorded
    pub recorded_at: DateTime<Utc>,
}

/// JSON-on-disk cache store
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheStore {
    /// Open a store, creating an empty one if the file does not exist
    pub fn open(path: PathBuf) -> CacheResult<Self> {
        let entries = if path.is_file() {
            let contents = fs::read_to_string(&path).map_err(|e| CacheError::Io {
                path: path.clone(),
                error: e,
            })?;
            serde_json::from_str(&contents)
                .map_err(|e| CacheError::Corrupt(format!("{}: {}", path.display(), e)))?
        } else {
            BTreeMap::new()
        };

        Ok(CacheStore { path, entries })
    }

    /// An empty store at the given path, for recovering from a corrupt
    /// or unreadable file
    pub fn empty(path: PathBuf) -> Self {
        CacheStore {
            path,
            entries: BTreeMap::new(),
        }
    }

    /// The backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw entry for a task, regardless of validity
    pub fn entry(&self, task: &str) -> Option<&CacheEntry> {
        self.entries.get(task)
    }

    /// Look up a valid entry for a task
    ///
    /// Valid means the input fingerprint matches and every recorded
    /// output still exists under `base`.
    pub fn lookup(&self, task: &str, input_fingerprint: &str, base: &Path) -> Option<&CacheEntry> {
        let entry = self.entries.get(task)?;
        if entry.input_fingerprint != input_fingerprint {
            return None;
        }

        let all_outputs_present = entry.outputs.iter().all(|output| {
            let path = if output.is_absolute() {
                output.clone()
            } else {
                base.join(output)
            };
            path.exists()
        });

        if all_outputs_present {
            Some(entry)
        } else {
            None
        }
    }

    /// Insert or replace the entry for a task and persist the store
    pub fn upsert(&mut self, task: &str, entry: CacheEntry) -> CacheResult<()> {
        self.entries.insert(task.to_string(), entry);
        self.save()
    }

    fn save(&self) -> CacheResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                error: e,
            })?;
        }

        let contents = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        fs::write(&self.path, contents).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            error: e,
        })
    }
}
