//! Learned override and audit models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context used when a caller does not name one.
pub const DEFAULT_CONTEXT: &str = "global";

fn default_context() -> String {
    DEFAULT_CONTEXT.to_string()
}

/// A human-confirmed term to code mapping.
///
/// Stored in the learned JSON file under its namespace key
/// (`normalize(context) + "::" + normalize(term)`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LearnedEntry {
    /// Term as the reviewer confirmed it
    #[serde(default)]
    pub term: String,
    /// Namespace the mapping applies to
    #[serde(default = "default_context")]
    pub context: String,
    /// Confirmed SNOMED code; `None` once unlearned with aliases kept
    #[serde(default, alias = "snomed")]
    pub snomed_code: Option<String>,
    #[serde(default)]
    pub snomed_display: Option<String>,
    /// Patient-facing wording
    #[serde(default)]
    pub lay_text: Option<String>,
    /// Learned alternative phrasings
    #[serde(default)]
    pub aliases: BTreeSet<String>,
    #[serde(default, alias = "loinc")]
    pub loinc_code: Option<String>,
    #[serde(default, alias = "updated_utc")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LearnedEntry {
    /// Create an empty entry for a term in a context.
    pub fn new(term: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            context: context.into(),
            snomed_code: None,
            snomed_display: None,
            lay_text: None,
            aliases: BTreeSet::new(),
            loinc_code: None,
            updated_at: None,
        }
    }

    /// Whether this entry still carries a code mapping.
    pub fn has_code(&self) -> bool {
        self.snomed_code
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// Strip the code mapping, keeping aliases and lay text.
    pub fn degrade(&mut self) {
        self.snomed_code = None;
        self.snomed_display = None;
    }
}

/// Kind of learned-store mutation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Learn,
    Unlearn,
    Alias,
}

/// One line in the daily audit log. Appended, never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    pub id: Uuid,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    pub term: String,
    pub context: String,
    pub snomed_code: Option<String>,
    pub snomed_display: Option<String>,
    pub lay_text: Option<String>,
    /// Only set for unlearn records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_aliases: Option<bool>,
    /// Aliases added by an alias record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

impl AuditRecord {
    /// Audit line for a commit of `entry`.
    pub fn learn(entry: &LearnedEntry, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: at,
            action: AuditAction::Learn,
            term: entry.term.clone(),
            context: entry.context.clone(),
            snomed_code: entry.snomed_code.clone(),
            snomed_display: entry.snomed_display.clone(),
            lay_text: entry.lay_text.clone(),
            keep_aliases: None,
            aliases: Vec::new(),
        }
    }

    /// Audit line for aliases attached to `entry`.
    pub fn alias(entry: &LearnedEntry, added: Vec<String>, at: DateTime<Utc>) -> Self {
        Self {
            action: AuditAction::Alias,
            aliases: added,
            ..Self::learn(entry, at)
        }
    }

    /// Audit line for an unlearn of `term`.
    pub fn unlearn(term: &str, context: &str, keep_aliases: bool, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: at,
            action: AuditAction::Unlearn,
            term: term.to_string(),
            context: context.to_string(),
            snomed_code: None,
            snomed_display: None,
            lay_text: None,
            keep_aliases: Some(keep_aliases),
            aliases: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_entry_fields() {
        let json = r#"{
            "snomed": "29857009",
            "snomed_display": "Chest pain",
            "lay_text": "chest pain",
            "aliases": ["cp", "chest discomfort"],
            "updated_utc": "2024-05-01T10:00:00.123456Z"
        }"#;
        let entry: LearnedEntry = serde_json::from_str(json).unwrap();

        assert_eq!(entry.snomed_code.as_deref(), Some("29857009"));
        assert_eq!(entry.context, DEFAULT_CONTEXT);
        assert!(entry.aliases.contains("cp"));
        assert!(entry.updated_at.is_some());
        assert!(entry.has_code());
    }

    #[test]
    fn test_degrade_keeps_aliases() {
        let mut entry = LearnedEntry::new("sob", DEFAULT_CONTEXT);
        entry.snomed_code = Some("267036007".into());
        entry.snomed_display = Some("Dyspnea".into());
        entry.lay_text = Some("short of breath".into());
        entry.aliases.insert("breathless".into());

        entry.degrade();

        assert!(!entry.has_code());
        assert_eq!(entry.lay_text.as_deref(), Some("short of breath"));
        assert!(entry.aliases.contains("breathless"));
    }

    #[test]
    fn test_audit_record_serializes_ts() {
        let entry = LearnedEntry::new("fever", DEFAULT_CONTEXT);
        let record = AuditRecord::learn(&entry, Utc::now());
        let value = serde_json::to_value(&record).unwrap();

        assert!(value.get("ts").is_some());
        assert_eq!(value["action"], "learn");
        assert!(value.get("keep_aliases").is_none());
        assert!(value.get("aliases").is_none());
    }

    #[test]
    fn test_alias_record() {
        let entry = LearnedEntry::new("sob", DEFAULT_CONTEXT);
        let record = AuditRecord::alias(&entry, vec!["winded".into()], Utc::now());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["action"], "alias");
        assert_eq!(value["aliases"][0], "winded");
    }
}
