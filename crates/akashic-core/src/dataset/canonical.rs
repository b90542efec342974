//! Canonical LOINC codes for common lab terms.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use super::loader::read_json_lenient;
use crate::resolver::normalize;

/// Gold-standard codes seeded before any canonical file is applied.
pub const BUILTIN_CANONICAL: &[(&str, &str)] = &[
    ("hemoglobin", "718-7"),
    ("creatinine", "2160-0"),
    ("ldl", "2089-1"),
    ("ldl cholesterol", "2089-1"),
    ("total cholesterol", "2093-3"),
    ("hdl", "2085-9"),
];

/// Term → canonical key → LOINC code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalMap {
    aliases: HashMap<String, String>,
    codes: HashMap<String, String>,
}

impl CanonicalMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table only.
    pub fn builtin() -> Self {
        let mut map = Self::empty();
        for (key, code) in BUILTIN_CANONICAL {
            map.insert(key, code);
        }
        map
    }

    /// Load canonical and alias files on top of (optionally) the built-in table.
    /// Either file may be missing or malformed; it then contributes nothing.
    pub fn load(canonical_path: &Path, aliases_path: &Path, with_builtin: bool) -> Self {
        let mut map = if with_builtin { Self::builtin() } else { Self::empty() };
        for (key, code) in read_string_map(canonical_path) {
            map.insert(&key, &code);
        }
        for (alias, key) in read_string_map(aliases_path) {
            map.insert_alias(&alias, &key);
        }
        debug!(codes = map.codes.len(), aliases = map.aliases.len(), "loaded canonical LOINC map");
        map
    }

    /// Set the code for a canonical key; a later insert of the same key wins.
    pub fn insert(&mut self, key: &str, code: &str) {
        let key = normalize(key);
        let code = code.trim();
        if key.is_empty() || code.is_empty() {
            return;
        }
        self.codes.insert(key, code.to_string());
    }

    /// Map an alias onto a canonical key.
    pub fn insert_alias(&mut self, alias: &str, key: &str) {
        let alias = normalize(alias);
        let key = normalize(key);
        if alias.is_empty() || key.is_empty() {
            return;
        }
        self.aliases.insert(alias, key);
    }

    /// Canonical key for a term: its alias target if one exists, else the term itself.
    pub fn canonical_key(&self, term: &str) -> String {
        let normalized = normalize(term);
        self.aliases.get(&normalized).cloned().unwrap_or(normalized)
    }

    /// Canonical LOINC code for a term.
    pub fn lookup(&self, term: &str) -> Option<&str> {
        let key = self.canonical_key(term);
        self.codes
            .get(&key)
            .or_else(|| self.codes.get(&normalize(term)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// A JSON object of string values, in key order. Non-string values are skipped.
fn read_string_map(path: &Path) -> Vec<(String, String)> {
    match read_json_lenient(path) {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect(),
        Some(_) => {
            warn!(path = %path.display(), "expected a JSON object, treating as empty");
            Vec::new()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let map = CanonicalMap::builtin();
        assert_eq!(map.lookup("Hemoglobin"), Some("718-7"));
        assert_eq!(map.lookup(" LDL  Cholesterol "), Some("2089-1"));
        assert_eq!(map.lookup("glucose"), None);
    }

    #[test]
    fn test_files_extend_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = dir.path().join("canonical.json");
        let aliases = dir.path().join("aliases.json");
        std::fs::write(&canonical, r#"{"glucose": "2345-7", "hdl": "2085-9X", "bad": 7}"#).unwrap();
        std::fs::write(&aliases, r#"{"blood sugar": "Glucose", "hgb": "hemoglobin"}"#).unwrap();

        let map = CanonicalMap::load(&canonical, &aliases, true);

        assert_eq!(map.lookup("blood sugar"), Some("2345-7"));
        assert_eq!(map.lookup("HGB"), Some("718-7"));
        assert_eq!(map.lookup("hdl"), Some("2085-9X"));
        assert_eq!(map.lookup("bad"), None);
    }

    #[test]
    fn test_missing_and_malformed_files_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "{not json").unwrap();
        let array = dir.path().join("array.json");
        std::fs::write(&array, r#"["hemoglobin"]"#).unwrap();

        assert!(CanonicalMap::load(&garbage, &dir.path().join("missing.json"), false).is_empty());
        assert!(CanonicalMap::load(&array, &array, false).is_empty());
    }
}
