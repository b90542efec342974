//! Reference terminology records.

use serde::{Deserialize, Serialize};

/// Code system a record or candidate belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CodeSystem {
    Snomed,
    Loinc,
}

impl CodeSystem {
    /// Interoperability URI for codings in this system.
    pub fn uri(&self) -> &'static str {
        match self {
            CodeSystem::Snomed => "http://snomed.info/sct",
            CodeSystem::Loinc => "http://loinc.org",
        }
    }

    /// Lowercase short name used in profiles and query filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeSystem::Snomed => "snomed",
            CodeSystem::Loinc => "loinc",
        }
    }

    /// Parse a short name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "snomed" | "sct" | "snomedct" => Some(CodeSystem::Snomed),
            "loinc" => Some(CodeSystem::Loinc),
            _ => None,
        }
    }
}

/// One SNOMED concept or LOINC code as loaded from a reference dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeRecord {
    /// Concept or observation code
    pub code: String,
    /// Human-readable display text
    pub display: String,
    /// Alternative names, de-duplicated case-insensitively, in first-seen order
    #[serde(default)]
    pub aliases: Vec<String>,
    /// LOINC property axis (e.g. "MCNC")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    /// LOINC method type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// LOINC class (e.g. "CHEM")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl CodeRecord {
    /// Create a record with required fields.
    pub fn new(code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display: display.into(),
            aliases: Vec::new(),
            property: None,
            method: None,
            class: None,
        }
    }

    /// Builder-style alias registration.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            self.add_alias(alias.into());
        }
        self
    }

    /// Add an alias unless an equal one (ignoring case and surrounding space) is present.
    pub fn add_alias(&mut self, alias: String) {
        let trimmed = alias.trim();
        if trimmed.is_empty() {
            return;
        }
        let key = trimmed.to_lowercase();
        if self.display.trim().to_lowercase() == key {
            return;
        }
        if self.aliases.iter().any(|a| a.to_lowercase() == key) {
            return;
        }
        self.aliases.push(trimmed.to_string());
    }

    /// Display text followed by every alias.
    pub fn haystacks(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.display.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// A scored candidate produced by the fuzzy ranker. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankedCandidate {
    pub code: String,
    pub display: String,
    /// Final score, 0 - 100
    pub score: u8,
}
