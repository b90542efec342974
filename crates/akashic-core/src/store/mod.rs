//! Learned mapping store.
//!
//! A single JSON object keyed by namespace key, shared by every process that
//! points at the same file. Mutations run read-modify-write under a sentinel
//! lock, land through an atomic rename, and append one audit line each.
//! Entries this version cannot parse are carried through rewrites untouched.
//! A file that is not a readable JSON object is never rewritten: lookups see it
//! as empty, mutations fail with [`StoreError::Corrupt`].

mod atomic;
mod audit;
mod lock;

pub use atomic::*;
pub use audit::*;
pub use lock::*;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ResolverConfig, DEFAULT_LOCK_TIMEOUT};
use crate::dataset::{read_json_lenient, UTF8_BOM};
use crate::models::{AuditRecord, LearnedEntry};
use crate::resolver::{namespace_key, normalize, normalize_context};

/// Learned-store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Timed out after {waited_ms}ms waiting for lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },

    #[error("Invalid learned mapping: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Learned store {} is unreadable ({reason}); refusing to overwrite it", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// File-backed learned overrides plus their audit trail.
#[derive(Debug, Clone)]
pub struct LearnedStore {
    path: PathBuf,
    audit: AuditLog,
    lock_timeout: Duration,
    keep_backup: bool,
}

impl LearnedStore {
    /// Store at `path` logging to `audit_dir`, with default lock and backup settings.
    pub fn open(path: impl Into<PathBuf>, audit_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            audit: AuditLog::new(audit_dir),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            keep_backup: true,
        }
    }

    pub fn from_config(config: &ResolverConfig) -> Self {
        Self::open(&config.learned_path, &config.audit_dir)
            .with_lock_timeout(config.lock_timeout)
            .with_backup(config.keep_backup)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_backup(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Sentinel file guarding mutations: `<path>.lock`.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Entry stored for `term` in `context`, if any.
    pub fn get(&self, context: Option<&str>, term: &str) -> Option<LearnedEntry> {
        let key = namespace_key(context, term);
        self.read_raw()
            .remove(&key)
            .and_then(|value| parse_entry(&key, value))
    }

    /// Entry in `context` that lists `term` among its aliases.
    ///
    /// Keys are scanned in order, so the first matching entry wins.
    pub fn find_by_alias(&self, context: Option<&str>, term: &str) -> Option<(String, LearnedEntry)> {
        let wanted = normalize(term);
        if wanted.is_empty() {
            return None;
        }
        let prefix = format!("{}::", normalize_context(context));

        self.read_raw()
            .into_iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, value)| parse_entry(&key, value).map(|entry| (key, entry)))
            .find(|(_, entry)| entry.aliases.iter().any(|alias| normalize(alias) == wanted))
    }

    /// All parseable entries by key.
    pub fn entries(&self) -> BTreeMap<String, LearnedEntry> {
        self.read_raw()
            .into_iter()
            .filter_map(|(key, value)| parse_entry(&key, value).map(|entry| (key, entry)))
            .collect()
    }

    /// What [`commit`](Self::commit) would store, without touching disk.
    pub fn preview(
        &self,
        term: &str,
        context: Option<&str>,
        snomed_code: &str,
        snomed_display: &str,
        lay_text: Option<&str>,
    ) -> StoreResult<(String, LearnedEntry)> {
        validate_mapping(term, snomed_code)?;
        let key = namespace_key(context, term);
        let existing = self.read_raw().remove(&key);
        let entry = merge_commit(existing, term, context, snomed_code, snomed_display, lay_text);
        Ok((key, entry))
    }

    /// Create or overwrite the mapping for `(context, term)`.
    ///
    /// Aliases and the LOINC code of an existing entry survive; code, display,
    /// lay text and timestamp are replaced.
    pub fn commit(
        &self,
        term: &str,
        context: Option<&str>,
        snomed_code: &str,
        snomed_display: &str,
        lay_text: Option<&str>,
    ) -> StoreResult<(String, LearnedEntry)> {
        validate_mapping(term, snomed_code)?;
        let key = namespace_key(context, term);

        let _lock = FileLock::acquire(&self.lock_path(), self.lock_timeout)?;
        let mut raw = self.read_for_update()?;
        let entry = merge_commit(raw.remove(&key), term, context, snomed_code, snomed_display, lay_text);
        raw.insert(key.clone(), serde_json::to_value(&entry)?);
        write_json_atomic(&self.path, &raw, self.keep_backup)?;
        self.record(AuditRecord::learn(&entry, Utc::now()));

        info!(key = %key, code = snomed_code, "learned mapping committed");
        Ok((key, entry))
    }

    /// Attach aliases to the entry for `(context, term)`, creating a code-less
    /// entry when none exists. Returns the resulting entry.
    pub fn add_aliases(
        &self,
        term: &str,
        context: Option<&str>,
        aliases: &[String],
    ) -> StoreResult<(String, LearnedEntry)> {
        if normalize(term).is_empty() {
            return Err(StoreError::Validation("term must not be blank".into()));
        }
        let added: Vec<String> = aliases
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !normalize(a).is_empty())
            .collect();
        if added.is_empty() {
            return Err(StoreError::Validation("no usable aliases given".into()));
        }
        let key = namespace_key(context, term);

        let _lock = FileLock::acquire(&self.lock_path(), self.lock_timeout)?;
        let mut raw = self.read_for_update()?;
        let mut entry = raw
            .remove(&key)
            .and_then(|value| parse_entry(&key, value))
            .unwrap_or_else(|| LearnedEntry::new(term.trim(), normalize_context(context)));
        entry.aliases.extend(added.iter().cloned());
        entry.updated_at = Some(Utc::now());

        raw.insert(key.clone(), serde_json::to_value(&entry)?);
        write_json_atomic(&self.path, &raw, self.keep_backup)?;
        self.record(AuditRecord::alias(&entry, added, Utc::now()));

        info!(key = %key, aliases = entry.aliases.len(), "learned aliases added");
        Ok((key, entry))
    }

    /// Remove the mapping for `(context, term)`. With `keep_aliases` the entry
    /// stays, stripped of its code. Returns whether an entry existed.
    pub fn unlearn(&self, term: &str, context: Option<&str>, keep_aliases: bool) -> StoreResult<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        let key = namespace_key(context, term);

        let _lock = FileLock::acquire(&self.lock_path(), self.lock_timeout)?;
        let mut raw = self.read_for_update()?;
        let Some(existing) = raw.remove(&key) else {
            debug!(key = %key, "unlearn: no entry");
            return Ok(false);
        };

        if keep_aliases {
            let mut entry = parse_entry(&key, existing)
                .unwrap_or_else(|| LearnedEntry::new(term.trim(), normalize_context(context)));
            entry.degrade();
            entry.updated_at = Some(Utc::now());
            raw.insert(key.clone(), serde_json::to_value(&entry)?);
        }
        write_json_atomic(&self.path, &raw, self.keep_backup)?;
        self.record(AuditRecord::unlearn(
            term.trim(),
            &normalize_context(context),
            keep_aliases,
            Utc::now(),
        ));

        info!(key = %key, keep_aliases, "learned mapping removed");
        Ok(true)
    }

    /// Current file contents as raw JSON values. Anything but an object reads as empty.
    fn read_raw(&self) -> BTreeMap<String, Value> {
        match read_json_lenient(&self.path) {
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(_) => {
                warn!(path = %self.path.display(), "learned store is not a JSON object; treating as empty");
                BTreeMap::new()
            }
            None => BTreeMap::new(),
        }
    }

    /// Strict read for read-modify-write. A missing or blank file is empty;
    /// anything else that is not a JSON object is [`StoreError::Corrupt`].
    fn read_for_update(&self) -> StoreResult<BTreeMap<String, Value>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        let corrupt = |reason: String| {
            warn!(path = %self.path.display(), %reason, "learned store unreadable; mutation refused");
            StoreError::Corrupt {
                path: self.path.clone(),
                reason,
            }
        };
        match serde_json::from_slice(body) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(_) => Err(corrupt("top level is not a JSON object".into())),
            Err(e) => Err(corrupt(e.to_string())),
        }
    }

    /// Audit failures never fail the mutation that already landed.
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(&record) {
            warn!(dir = %self.audit.dir().display(), error = %e, "failed to append audit record");
        }
    }
}

fn validate_mapping(term: &str, snomed_code: &str) -> StoreResult<()> {
    if normalize(term).is_empty() {
        return Err(StoreError::Validation("term must not be blank".into()));
    }
    if snomed_code.trim().is_empty() {
        return Err(StoreError::Validation("code must not be blank".into()));
    }
    Ok(())
}

fn parse_entry(key: &str, value: Value) -> Option<LearnedEntry> {
    match serde_json::from_value(value) {
        Ok(entry) => Some(entry),
        Err(e) => {
            debug!(key, error = %e, "skipping unreadable learned entry");
            None
        }
    }
}

fn merge_commit(
    existing: Option<Value>,
    term: &str,
    context: Option<&str>,
    snomed_code: &str,
    snomed_display: &str,
    lay_text: Option<&str>,
) -> LearnedEntry {
    let previous = existing.and_then(|value| serde_json::from_value::<LearnedEntry>(value).ok());
    let term = term.trim();

    let mut entry = LearnedEntry::new(term, normalize_context(context));
    if let Some(previous) = previous {
        entry.aliases = previous.aliases;
        entry.loinc_code = previous.loinc_code;
    }
    entry.snomed_code = Some(snomed_code.trim().to_string());
    entry.snomed_display = Some(snomed_display.trim().to_string()).filter(|d| !d.is_empty());
    entry.lay_text = Some(
        lay_text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(term)
            .to_string(),
    );
    entry.updated_at = Some(Utc::now());
    entry
}
