//! LOINC bonus/penalty scoring policy.
//!
//! The policy is data: a versioned table of keyword rules that can be loaded
//! from JSON to replace the built-in table without touching ranking code.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataset::read_json_lenient;
use crate::models::CodeRecord;

/// Which record attribute a rule inspects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalField {
    /// Lowercased `display + " " + method`, substring match
    Text,
    /// Uppercased property axis, exact match
    Property,
    /// Uppercased class, substring match
    Class,
}

/// One (patterns, weight) row. Fires at most once per candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringRule {
    pub field: SignalField,
    pub any_of: Vec<String>,
    /// Positive for a bonus, negative for a penalty
    pub weight: i32,
}

impl ScoringRule {
    fn new(field: SignalField, any_of: &[&str], weight: i32) -> Self {
        Self {
            field,
            any_of: any_of.iter().map(|s| s.to_string()).collect(),
            weight,
        }
    }

    /// Whether this rule fires for the given signals.
    pub fn matches(&self, signals: &CandidateSignals) -> bool {
        match self.field {
            SignalField::Text => self
                .any_of
                .iter()
                .any(|p| signals.text.contains(&p.to_lowercase())),
            SignalField::Property => self
                .any_of
                .iter()
                .any(|p| signals.property == p.to_uppercase()),
            SignalField::Class => self
                .any_of
                .iter()
                .any(|p| signals.class.contains(&p.to_uppercase())),
        }
    }
}

/// Pre-extracted text signals of one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSignals {
    pub text: String,
    pub property: String,
    pub class: String,
}

impl CandidateSignals {
    pub fn from_record(record: &CodeRecord) -> Self {
        Self {
            text: format!(
                "{} {}",
                record.display,
                record.method.as_deref().unwrap_or_default()
            )
            .to_lowercase(),
            // Compared trimmed; exports sometimes pad the column
            property: record
                .property
                .as_deref()
                .unwrap_or_default()
                .trim()
                .to_uppercase(),
            class: record.class.as_deref().unwrap_or_default().to_uppercase(),
        }
    }
}

/// Hand-tuned adjustment table applied on the LOINC ranking path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoringPolicy {
    pub version: u32,
    /// Codes that get `preferred_bonus`
    pub preferred_codes: BTreeSet<String>,
    pub preferred_bonus: i32,
    pub rules: Vec<ScoringRule>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        use SignalField::{Class, Property, Text};

        Self {
            version: 1,
            preferred_codes: ["2089-1", "2093-3", "2085-9", "8480-6", "8462-4"]
                .into_iter()
                .map(String::from)
                .collect(),
            preferred_bonus: 8,
            rules: vec![
                // Bonuses
                ScoringRule::new(Text, &["serum", "plasma", "ser/plas"], 6),
                ScoringRule::new(Property, &["MCNC", "MASS CONC"], 6),
                ScoringRule::new(Class, &["CHEM"], 4),
                // Panels and questionnaires
                ScoringRule::new(Text, &["panel"], -20),
                ScoringRule::new(Text, &["question"], -20),
                ScoringRule::new(Text, &["survey"], -20),
                // Ratios
                ScoringRule::new(Text, &["ratio"], -12),
                ScoringRule::new(Text, &["/hdl"], -10),
                ScoringRule::new(Text, &["ldl/hdl"], -12),
                // Qualitative and immunology assays
                ScoringRule::new(Text, &["presence"], -12),
                ScoringRule::new(Text, &["antibody"], -12),
                ScoringRule::new(Text, &[" ab "], -12),
                ScoringRule::new(Text, &["receptor"], -10),
                ScoringRule::new(Text, &["electrophoresis"], -12),
                // Lipoprotein (a)
                ScoringRule::new(Text, &["little a"], -12),
                ScoringRule::new(Text, &["lp(a)"], -12),
                // Derived values
                ScoringRule::new(Text, &["by calculation"], -6),
                ScoringRule::new(Text, &["corrected"], -6),
            ],
        }
    }
}

impl ScoringPolicy {
    /// Load a policy file, falling back to the built-in table on any failure.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        let Some(value) = read_json_lenient(path) else {
            return Self::default();
        };
        match serde_json::from_value::<ScoringPolicy>(value) {
            Ok(policy) => {
                debug!(version = policy.version, rules = policy.rules.len(), "loaded scoring policy");
                policy
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "invalid scoring policy, using built-in table");
                Self::default()
            }
        }
    }

    /// Net adjustment (bonuses minus penalties) for one record.
    pub fn adjustment(&self, record: &CodeRecord) -> i32 {
        let signals = CandidateSignals::from_record(record);
        let mut total: i32 = 0;
        if self.preferred_codes.contains(record.code.trim()) {
            total = total.saturating_add(self.preferred_bonus);
        }
        for rule in &self.rules {
            if rule.matches(&signals) {
                total = total.saturating_add(rule.weight);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loinc(code: &str, display: &str) -> CodeRecord {
        CodeRecord::new(code, display)
    }

    #[test]
    fn test_preferred_code_bonus() {
        let policy = ScoringPolicy::default();
        // "serum" +6 on top of preferred +8
        let record = loinc("2089-1", "Cholesterol in LDL [Mass/volume] in Serum or Plasma");
        assert_eq!(policy.adjustment(&record), 14);
    }

    #[test]
    fn test_property_and_class_bonus() {
        let policy = ScoringPolicy::default();
        let mut record = loinc("2160-0", "Creatinine [Mass/volume] in Blood");
        record.property = Some("mcnc".into());
        record.class = Some("CHEM".into());
        assert_eq!(policy.adjustment(&record), 10);
    }

    #[test]
    fn test_panel_penalty() {
        let policy = ScoringPolicy::default();
        let record = loinc("24331-1", "Lipid panel with direct LDL - Serum or Plasma");
        assert_eq!(policy.adjustment(&record), 6 - 20);
    }

    #[test]
    fn test_ratio_penalties_stack() {
        let policy = ScoringPolicy::default();
        let record = loinc("9830-1", "Cholesterol.total/HDL [Mass Ratio] in Serum or Plasma");
        // ratio -12, /hdl -10, serum +6
        assert_eq!(policy.adjustment(&record), -16);
    }

    #[test]
    fn test_method_text_is_inspected() {
        let policy = ScoringPolicy::default();
        let mut record = loinc("13457-7", "Cholesterol in LDL [Mass/volume]");
        record.method = Some("Calculated by calculation".into());
        assert_eq!(policy.adjustment(&record), -6);
    }

    #[test]
    fn test_antibody_token_needs_spaces() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.adjustment(&loinc("1", "Tab count")), 0);
        assert_eq!(policy.adjustment(&loinc("2", "HIV 1 Ab Ql")), -12);
    }

    #[test]
    fn test_padded_property_still_matches() {
        let policy = ScoringPolicy::default();
        let mut record = loinc("1", "Glucose");
        record.property = Some(" MCNC ".into());
        assert_eq!(policy.adjustment(&record), 6);
    }

    #[test]
    fn test_extreme_weights_saturate() {
        let policy = ScoringPolicy {
            version: 9,
            preferred_codes: ["1".to_string()].into_iter().collect(),
            preferred_bonus: i32::MAX,
            rules: vec![ScoringRule::new(SignalField::Text, &["glucose"], i32::MAX)],
        };
        assert_eq!(policy.adjustment(&loinc("1", "Glucose")), i32::MAX);

        let policy = ScoringPolicy {
            preferred_bonus: i32::MIN,
            rules: vec![ScoringRule::new(SignalField::Text, &["glucose"], i32::MIN)],
            ..policy
        };
        assert_eq!(policy.adjustment(&loinc("1", "Glucose")), i32::MIN);
    }

    #[test]
    fn test_missing_policy_file_uses_default() {
        let policy = ScoringPolicy::load_or_default(Some(Path::new("/nonexistent/policy.json")));
        assert_eq!(policy, ScoringPolicy::default());
        assert_eq!(ScoringPolicy::load_or_default(None).version, 1);
    }

    #[test]
    fn test_policy_file_replaces_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{"version": 2, "preferred_codes": ["718-7"], "preferred_bonus": 3,
                "rules": [{"field": "text", "any_of": ["blood"], "weight": 5}]}"#,
        )
        .unwrap();

        let policy = ScoringPolicy::load_or_default(Some(&path));
        assert_eq!(policy.version, 2);
        assert_eq!(policy.adjustment(&loinc("718-7", "Hemoglobin in Blood")), 8);
    }
}
