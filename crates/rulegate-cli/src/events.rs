//! Append-only JSONL event journal.
//!
//! Every significant action appends one structured event carrying a
//! timestamp, an event kind, and kind-specific fields. The journal is an
//! audit trail for the invoking host; the engine never reads it back.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CacheBuildComplete,
    CacheIndexLoaded,
    CacheInjection,
    CacheInjectionError,
    ValidationStart,
    ValidationWarning,
    ValidationError,
    ValidationComplete,
}

#[derive(Debug, Serialize)]
struct JournalEntry<'a> {
    timestamp: &'a str,
    event: EventKind,
    #[serde(flatten)]
    data: serde_json::Value,
}

pub struct Journal {
    path: PathBuf,
}

impl Journal {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    /// Append one event. `data` holds the kind-specific fields and is
    /// flattened next to `timestamp` and `event`.
    ///
    /// # Errors
    /// Returns an error when the journal file cannot be created or written.
    pub fn append(&self, event: EventKind, data: serde_json::Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create journal directory {}", parent.display())
                })?;
            }
        }

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .context("failed to format journal timestamp")?;
        let line = serde_json::to_string(&JournalEntry { timestamp: &timestamp, event, data })
            .context("failed to serialize journal entry")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to journal {}", self.path.display()))?;
        Ok(())
    }
}
