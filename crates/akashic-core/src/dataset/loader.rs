//! Reference dataset loading.
//!
//! All readers here fail soft: a missing file, undecodable bytes, bad JSON, or
//! an unexpected top-level shape all produce `None`/empty output and a log
//! line, never an error.

use std::fs;
use std::io;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{CodeRecord, CodeSystem};

/// Byte-order mark some editors prepend to UTF-8 JSON.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const LOINC_CODE_KEYS: &[&str] = &["code", "LOINC_NUM", "loinc_num", "id"];
const LOINC_DISPLAY_KEYS: &[&str] = &[
    "display",
    "LONG_COMMON_NAME",
    "LongCommonName",
    "long_common_name",
    "SHORTNAME",
    "ShortName",
    "shortname",
    "COMPONENT",
    "Component",
    "component",
];
const LOINC_PROPERTY_KEYS: &[&str] = &["PROPERTY", "property"];
const LOINC_METHOD_KEYS: &[&str] = &["METHOD_TYP", "METHOD", "MethodType"];
const LOINC_CLASS_KEYS: &[&str] = &["CLASS", "Class", "class"];
const ALIAS_KEYS: &[&str] = &["aliases", "synonyms"];

/// A parsed dataset row: the record plus the primary term it was keyed by.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedEntry {
    pub term: Option<String>,
    pub record: CodeRecord,
}

/// Read a JSON document, tolerating a UTF-8 byte-order mark.
pub fn read_json_lenient(path: &Path) -> Option<Value> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "optional data file not found");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read data file");
            return None;
        }
    };
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes[..]);
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "malformed JSON, treating as empty");
            None
        }
    }
}

/// Parse a dataset document for the given code system.
pub fn parse_dataset(system: CodeSystem, value: &Value) -> Vec<LoadedEntry> {
    match system {
        CodeSystem::Snomed => parse_snomed(value),
        CodeSystem::Loinc => parse_loinc(value),
    }
}

/// SNOMED: `[{term?, code, display, aliases}]`, `{term: {code, display, aliases}}`
/// or `{code: "display"}`.
pub fn parse_snomed(value: &Value) -> Vec<LoadedEntry> {
    match value {
        Value::Array(rows) => rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| snomed_row(row, None))
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter(|(key, _)| !key.starts_with('_'))
            .filter_map(|(key, v)| match v {
                Value::Object(row) => snomed_row(row, Some(key)),
                Value::String(display) => entry(key.clone(), display.clone(), None, Vec::new()),
                _ => None,
            })
            .collect(),
        _ => {
            warn!("SNOMED dataset has unexpected top-level type, treating as empty");
            Vec::new()
        }
    }
}

fn snomed_row(row: &Map<String, Value>, key: Option<&String>) -> Option<LoadedEntry> {
    let code = str_field(row, &["code"])?;
    let display = str_field(row, &["display"])?;
    let term = key.cloned().or_else(|| str_field(row, &["term"]));
    entry(code, display, term, list_field(row, ALIAS_KEYS))
}

/// LOINC: row array, `{"rows": [...]}`, or `{code: row}`; legacy column names accepted.
pub fn parse_loinc(value: &Value) -> Vec<LoadedEntry> {
    match value {
        Value::Array(rows) => rows
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|row| loinc_row(row, None))
            .collect(),
        Value::Object(map) => {
            if let Some(Value::Array(rows)) = map.get("rows") {
                return parse_loinc(&Value::Array(rows.clone()));
            }
            map.iter()
                .filter(|(key, _)| !key.starts_with('_'))
                .filter_map(|(key, v)| match v {
                    Value::Object(row) => loinc_row(row, Some(key)),
                    Value::String(display) => entry(key.clone(), display.clone(), None, Vec::new()),
                    _ => None,
                })
                .collect()
        }
        _ => {
            warn!("LOINC dataset has unexpected top-level type, treating as empty");
            Vec::new()
        }
    }
}

fn loinc_row(row: &Map<String, Value>, key: Option<&String>) -> Option<LoadedEntry> {
    let code = match key {
        Some(k) => Some(k.trim().to_string()).filter(|k| !k.is_empty()),
        None => str_field(row, LOINC_CODE_KEYS),
    }?;
    let display = str_field(row, LOINC_DISPLAY_KEYS)?;
    let mut loaded = entry(code, display, str_field(row, &["term"]), list_field(row, ALIAS_KEYS))?;
    loaded.record.property = str_field(row, LOINC_PROPERTY_KEYS);
    loaded.record.method = str_field(row, LOINC_METHOD_KEYS);
    loaded.record.class = str_field(row, LOINC_CLASS_KEYS);
    Some(loaded)
}

fn entry(code: String, display: String, term: Option<String>, aliases: Vec<String>) -> Option<LoadedEntry> {
    let code = code.trim().to_string();
    let display = display.trim().to_string();
    if code.is_empty() || display.is_empty() {
        return None;
    }
    Some(LoadedEntry {
        term: term.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
        record: CodeRecord::new(code, display).with_aliases(aliases),
    })
}

/// First non-empty string (or number) among `keys`.
fn str_field(row: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| scalar_string(row.get(*k)?))
}

fn scalar_string(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// First non-empty alias list among `keys`; non-list values yield nothing.
fn list_field(row: &Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys
        .iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !is_falsy(v))
    else {
        return Vec::new();
    };
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        _ => Vec::new(),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}
