//! Alias index and immutable dataset snapshots.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::loader::LoadedEntry;
use crate::models::{CodeRecord, CodeSystem};
use crate::resolver::normalize;

/// Normalized term/alias → code. The first registration of a key wins.
#[derive(Debug, Clone, Default)]
pub struct AliasIndex {
    map: HashMap<String, String>,
}

impl AliasIndex {
    /// Register `term` for `code`. Returns false if the key was empty or already taken.
    pub fn register(&mut self, term: &str, code: &str) -> bool {
        let key = normalize(term);
        if key.is_empty() {
            return false;
        }
        match self.map.get(&key) {
            Some(existing) if existing != code => {
                debug!(alias = %key, kept = %existing, ignored = %code, "alias collision");
                false
            }
            Some(_) => false,
            None => {
                self.map.insert(key, code.to_string());
                true
            }
        }
    }

    /// Exact lookup after normalization.
    pub fn get(&self, term: &str) -> Option<&str> {
        self.map.get(&normalize(term)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Every registered key with its code.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// All records of one code system plus their alias index. Immutable once built.
#[derive(Debug, Clone)]
pub struct Snapshot {
    system: CodeSystem,
    records: BTreeMap<String, CodeRecord>,
    alias_index: AliasIndex,
}

impl Snapshot {
    /// A snapshot with no records.
    pub fn empty(system: CodeSystem) -> Self {
        Self {
            system,
            records: BTreeMap::new(),
            alias_index: AliasIndex::default(),
        }
    }

    /// Build from parsed rows. Rows sharing a code merge into the first
    /// record; their terms become aliases.
    pub fn from_entries(system: CodeSystem, entries: Vec<LoadedEntry>) -> Self {
        let mut records: BTreeMap<String, CodeRecord> = BTreeMap::new();
        let mut alias_index = AliasIndex::default();

        for LoadedEntry { term, record } in entries {
            alias_index.register(term.as_deref().unwrap_or(&record.display), &record.code);
            alias_index.register(&record.display, &record.code);
            for alias in &record.aliases {
                alias_index.register(alias, &record.code);
            }

            match records.get_mut(&record.code) {
                Some(existing) => {
                    if let Some(term) = term {
                        existing.add_alias(term);
                    }
                    existing.add_alias(record.display);
                    for alias in record.aliases {
                        existing.add_alias(alias);
                    }
                }
                None => {
                    let mut record = record;
                    if let Some(term) = term {
                        record.add_alias(term);
                    }
                    records.insert(record.code.clone(), record);
                }
            }
        }

        Self {
            system,
            records,
            alias_index,
        }
    }

    pub fn system(&self) -> CodeSystem {
        self.system
    }

    /// Record by code.
    pub fn get(&self, code: &str) -> Option<&CodeRecord> {
        self.records.get(code.trim())
    }

    /// Exact alias-index hit for a term.
    pub fn lookup(&self, term: &str) -> Option<&CodeRecord> {
        self.alias_index.get(term).and_then(|code| self.records.get(code))
    }

    pub fn records(&self) -> impl Iterator<Item = &CodeRecord> {
        self.records.values()
    }

    pub fn alias_index(&self) -> &AliasIndex {
        &self.alias_index
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(term: Option<&str>, code: &str, display: &str, aliases: &[&str]) -> LoadedEntry {
        LoadedEntry {
            term: term.map(String::from),
            record: CodeRecord::new(code, display).with_aliases(aliases.iter().copied()),
        }
    }

    #[test]
    fn test_lookup_is_reflexive() {
        let snapshot = Snapshot::from_entries(
            CodeSystem::Snomed,
            vec![
                loaded(Some("chest pain"), "29857009", "Chest pain", &["cp"]),
                loaded(Some("sob"), "267036007", "Dyspnea", &["shortness of breath"]),
            ],
        );

        assert_eq!(snapshot.lookup("Chest Pain!").unwrap().code, "29857009");
        assert_eq!(snapshot.lookup("SOB").unwrap().code, "267036007");
        assert_eq!(snapshot.lookup("dyspnea").unwrap().code, "267036007");
        assert_eq!(snapshot.lookup(" shortness  of breath ").unwrap().code, "267036007");
        assert!(snapshot.lookup("nausea").is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let snapshot = Snapshot::from_entries(
            CodeSystem::Snomed,
            vec![
                loaded(None, "1", "Cold", &["chill"]),
                loaded(None, "2", "Rigor", &["chill"]),
            ],
        );
        assert_eq!(snapshot.lookup("chill").unwrap().code, "1");
    }

    #[test]
    fn test_duplicate_codes_merge() {
        let snapshot = Snapshot::from_entries(
            CodeSystem::Snomed,
            vec![
                loaded(Some("high blood pressure"), "38341003", "Hypertension", &[]),
                loaded(Some("htn"), "38341003", "Hypertensive disorder", &[]),
            ],
        );

        assert_eq!(snapshot.len(), 1);
        let record = snapshot.get("38341003").unwrap();
        assert_eq!(record.display, "Hypertension");
        assert!(record.aliases.contains(&"htn".to_string()));
        assert!(record.aliases.contains(&"Hypertensive disorder".to_string()));
        assert_eq!(snapshot.lookup("htn").unwrap().code, "38341003");
    }

    #[test]
    fn test_index_keys_resolve_to_records() {
        let snapshot = Snapshot::from_entries(
            CodeSystem::Loinc,
            vec![loaded(None, "718-7", "Hemoglobin [Mass/volume] in Blood", &["Hgb", "HGB", ""])],
        );
        for (key, code) in snapshot.alias_index().iter() {
            assert_eq!(key, normalize(key));
            assert!(snapshot.get(code).is_some());
        }
        assert_eq!(snapshot.alias_index().len(), 2);
    }

    #[test]
    fn test_empty_snapshot_lookup() {
        let snapshot = Snapshot::empty(CodeSystem::Snomed);
        assert!(snapshot.is_empty());
        assert!(snapshot.lookup("anything").is_none());
    }
}
