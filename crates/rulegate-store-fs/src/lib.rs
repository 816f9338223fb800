//! Flat-file rule store.
//!
//! One JSON file per rule record, named by the record's id, plus a single
//! `index.json` slot that each build replaces wholesale. The layout is
//! human-diffable on purpose: pretty-printed, stable key order, trailing
//! newline.
//!
//! The store assumes a single writer (the batch rebuild) and any number of
//! readers. A reader that races a rebuild may observe a missing or
//! half-written file; both read as "absent", never as an error.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rulegate_core::{RuleId, RuleIndex, RuleRecord};

const INDEX_FILE: &str = "index.json";

pub struct FsRuleStore {
    cache_dir: PathBuf,
}

impl FsRuleStore {
    /// Open (creating if needed) a store rooted at `cache_dir`.
    ///
    /// # Errors
    /// Returns an error when the cache directory cannot be created.
    pub fn open(cache_dir: &Path) -> Result<Self> {
        fs::create_dir_all(cache_dir).with_context(|| {
            format!("failed to create cache directory {}", cache_dir.display())
        })?;
        Ok(Self { cache_dir: cache_dir.to_path_buf() })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.cache_dir.join(INDEX_FILE)
    }

    #[must_use]
    pub fn record_path(&self, id: &RuleId) -> PathBuf {
        self.cache_dir.join(format!("{id}.json"))
    }

    /// Persist one rule record keyed by its id, replacing any prior version.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn put_record(&self, record: &RuleRecord) -> Result<()> {
        let body = serde_json::to_string_pretty(record)
            .with_context(|| format!("failed to serialize rule record {}", record.id))?;
        self.write_atomic(&format!("{}.json", record.id), &body)
    }

    /// Load one rule record. `Ok(None)` when the file is missing or cannot
    /// be parsed — an unreadable rule is unavailable, not fatal.
    ///
    /// # Errors
    /// Returns an error only for I/O failures other than a missing file.
    pub fn get_record(&self, id: &RuleId) -> Result<Option<RuleRecord>> {
        let path = self.record_path(id);
        let Some(body) = read_if_present(&path)? else {
            return Ok(None);
        };

        match serde_json::from_str(&body) {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                tracing::warn!(rule_id = %id, error = %err, "skipping unparseable rule record");
                Ok(None)
            }
        }
    }

    /// Replace the single current index wholesale.
    ///
    /// # Errors
    /// Returns an error when serialization or the write fails.
    pub fn put_index(&self, index: &RuleIndex) -> Result<()> {
        let body =
            serde_json::to_string_pretty(index).context("failed to serialize rule index")?;
        self.write_atomic(INDEX_FILE, &body)
    }

    /// Load the current index. `Ok(None)` when no index has been built yet
    /// or the slot is torn mid-rebuild.
    ///
    /// # Errors
    /// Returns an error only for I/O failures other than a missing file.
    pub fn get_index(&self) -> Result<Option<RuleIndex>> {
        let path = self.index_path();
        let Some(body) = read_if_present(&path)? else {
            return Ok(None);
        };

        match serde_json::from_str(&body) {
            Ok(index) => Ok(Some(index)),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unparseable rule index");
                Ok(None)
            }
        }
    }

    /// Remove every record file and the index before a full rebuild, so a
    /// rebuild never leaves records from a previous generation behind.
    ///
    /// # Errors
    /// Returns an error when the cache directory cannot be listed or a file
    /// cannot be removed.
    pub fn wipe(&self) -> Result<()> {
        let entries = fs::read_dir(&self.cache_dir).with_context(|| {
            format!("failed to list cache directory {}", self.cache_dir.display())
        })?;

        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to read cache directory entry in {}", self.cache_dir.display())
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }

    // Temp file + rename so readers never observe a partial file.
    fn write_atomic(&self, file_name: &str, body: &str) -> Result<()> {
        let tmp = self.cache_dir.join(format!(".{file_name}.tmp"));
        let path = self.cache_dir.join(file_name);

        fs::write(&tmp, format!("{body}\n"))
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn read_if_present(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(body) => Ok(Some(body)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read cache file {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use rulegate_core::{build_index, Keywords, Layer, Priority};
    use tempfile::TempDir;
    use time::{Duration, OffsetDateTime};

    use super::*;

    fn fixture_time() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(1_700_000_000)
    }

    fn mk_record(id: &str) -> RuleRecord {
        RuleRecord {
            id: RuleId(id.to_string()),
            source_path: format!("docs/conventions/{id}.md"),
            layer: Layer::Domain,
            priority: Priority::Critical,
            keywords: Keywords {
                primary: vec!["aggregate".to_string()],
                secondary: vec!["aggregate".to_string(), "design".to_string()],
                anti: vec!["setTotal(".to_string()],
            },
            prohibited: vec!["\u{274c} `setTotal(` outside the aggregate".to_string()],
            allowed: vec!["\u{2705} Mutate through aggregate methods".to_string()],
            token_estimate: 42,
            documentation_summary: format!("Auto-generated from {id}.md"),
        }
    }

    fn open_store(dir: &TempDir) -> FsRuleStore {
        match FsRuleStore::open(dir.path()) {
            Ok(store) => store,
            Err(err) => panic!("store should open: {err}"),
        }
    }

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("store operation should succeed: {err}"),
        }
    }

    #[test]
    fn record_round_trip() {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("temp dir should create: {err}"),
        };
        let store = open_store(&dir);
        let record = mk_record("domain-aggregate-design");

        must(store.put_record(&record));
        let loaded = must(store.get_record(&record.id));

        assert_eq!(loaded, Some(record));
    }

    #[test]
    fn missing_record_reads_as_none() {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("temp dir should create: {err}"),
        };
        let store = open_store(&dir);

        assert_eq!(must(store.get_record(&RuleId("nope".to_string()))), None);
        assert!(must(store.get_index()).is_none());
    }

    #[test]
    fn unparseable_record_reads_as_none() {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("temp dir should create: {err}"),
        };
        let store = open_store(&dir);
        let id = RuleId("broken".to_string());

        if let Err(err) = fs::write(store.record_path(&id), "{ not json") {
            panic!("fixture write should succeed: {err}");
        }

        assert_eq!(must(store.get_record(&id)), None);
    }

    #[test]
    fn index_slot_is_replaced_wholesale() {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("temp dir should create: {err}"),
        };
        let store = open_store(&dir);

        let first = build_index(&[mk_record("domain-a")], fixture_time());
        let second = build_index(&[mk_record("domain-b")], fixture_time());

        must(store.put_index(&first));
        must(store.put_index(&second));

        let loaded = match must(store.get_index()) {
            Some(index) => index,
            None => panic!("index should be present"),
        };
        assert_eq!(loaded, second);
        assert_eq!(
            loaded.rules_for_layer(Layer::Domain),
            &[RuleId("domain-b".to_string())]
        );
    }

    #[test]
    fn wipe_clears_records_and_index() {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("temp dir should create: {err}"),
        };
        let store = open_store(&dir);
        let record = mk_record("domain-aggregate-design");

        must(store.put_record(&record));
        must(store.put_index(&build_index(std::slice::from_ref(&record), fixture_time())));
        must(store.wipe());

        assert_eq!(must(store.get_record(&record.id)), None);
        assert!(must(store.get_index()).is_none());
    }

    #[test]
    fn persisted_record_is_human_diffable() {
        let dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("temp dir should create: {err}"),
        };
        let store = open_store(&dir);
        let record = mk_record("domain-aggregate-design");

        must(store.put_record(&record));
        let body = match fs::read_to_string(store.record_path(&record.id)) {
            Ok(body) => body,
            Err(err) => panic!("record file should read: {err}"),
        };

        assert!(body.contains("\"sourcePath\""));
        assert!(body.contains("\"tokenEstimate\""));
        assert!(body.ends_with('\n'));
        assert!(body.lines().count() > 10, "record file should be pretty-printed");
    }
}
