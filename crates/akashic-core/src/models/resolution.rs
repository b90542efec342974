//! Query and response models for the resolution pipeline.

use serde::{Deserialize, Serialize};

use super::{CodeSystem, LearnedEntry, RankedCandidate};

/// Which code systems a query may resolve against.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DomainFilter {
    /// Both systems, unless the context profile says otherwise
    #[default]
    Auto,
    Snomed,
    Loinc,
}

impl DomainFilter {
    /// Parse a filter name; anything unrecognised means `Auto`.
    pub fn parse(s: &str) -> Self {
        match CodeSystem::parse(s) {
            Some(CodeSystem::Snomed) => DomainFilter::Snomed,
            Some(CodeSystem::Loinc) => DomainFilter::Loinc,
            None => DomainFilter::Auto,
        }
    }

    /// The single system this filter pins, if any.
    pub fn system(&self) -> Option<CodeSystem> {
        match self {
            DomainFilter::Auto => None,
            DomainFilter::Snomed => Some(CodeSystem::Snomed),
            DomainFilter::Loinc => Some(CodeSystem::Loinc),
        }
    }
}

/// Inputs to a resolution query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolutionQuery {
    /// Free text as typed by the patient or clinician
    pub text: String,
    /// Learned-store namespace; `None` means "global"
    pub context: Option<String>,
    pub domain: DomainFilter,
    /// Candidates considered for the best SNOMED match
    pub top_k: usize,
    pub score_cutoff: u8,
    /// Size of technical and practitioner candidate lists
    pub tech_top_k: usize,
    pub tech_score_cutoff: u8,
    pub include_technical: bool,
}

impl ResolutionQuery {
    pub const DEFAULT_TOP_K: usize = 5;
    pub const DEFAULT_SCORE_CUTOFF: u8 = 70;
    pub const DEFAULT_TECH_TOP_K: usize = 8;
    pub const DEFAULT_TECH_SCORE_CUTOFF: u8 = 60;

    /// Create a query with default ranking parameters.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: None,
            domain: DomainFilter::Auto,
            top_k: Self::DEFAULT_TOP_K,
            score_cutoff: Self::DEFAULT_SCORE_CUTOFF,
            tech_top_k: Self::DEFAULT_TECH_TOP_K,
            tech_score_cutoff: Self::DEFAULT_TECH_SCORE_CUTOFF,
            include_technical: false,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_domain(mut self, domain: DomainFilter) -> Self {
        self.domain = domain;
        self
    }

    pub fn with_technical(mut self, include: bool) -> Self {
        self.include_technical = include;
        self
    }
}

impl Default for ResolutionQuery {
    fn default() -> Self {
        Self::new("")
    }
}

/// How the best match was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Human-confirmed learned entry
    Learned,
    /// Exact hit in the SNOMED alias index
    AliasIndex,
    /// Canonical LOINC map
    Canonical,
    /// Fuzzy ranking
    Fuzzy,
}

impl ResolutionMethod {
    /// Deterministic answers bypass fuzzy scoring entirely.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, ResolutionMethod::Fuzzy)
    }
}

/// A single coding inside a codeable concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Coding {
    pub system: String,
    pub code: String,
    pub display: String,
}

/// Interoperability record pairing codings with free text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeableConcept {
    pub coding: Vec<Coding>,
    pub text: String,
}

impl CodeableConcept {
    /// A concept with exactly one coding.
    pub fn single(system: CodeSystem, code: &str, display: &str, text: &str) -> Self {
        Self {
            coding: vec![Coding {
                system: system.uri().to_string(),
                code: code.to_string(),
                display: display.to_string(),
            }],
            text: text.to_string(),
        }
    }
}

/// An entry in the practitioner's pick list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PractitionerOption {
    pub code: String,
    pub display: String,
    pub score: u8,
    #[serde(default)]
    pub selected: bool,
}

/// The best deterministic-or-fuzzy answer for a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTerm {
    pub system: CodeSystem,
    pub code: String,
    pub display: String,
    /// Confidence, 0 - 100
    pub score: u8,
    pub method: ResolutionMethod,
    /// The term the phrases are built from
    pub term: String,
    pub aliases: Vec<String>,
    pub loinc_code: Option<String>,
    pub patient_view: String,
    pub practitioner_view: String,
    pub codeable_concept: CodeableConcept,
    /// SNOMED pick list; `None` for lab-only answers
    pub options: Option<Vec<PractitionerOption>>,
}

/// Raw ranked lists for operator review.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TechnicalCandidates {
    pub snomed: Vec<RankedCandidate>,
    pub loinc: Vec<RankedCandidate>,
}

/// Result of a resolution query. "No match" is `best == None`, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResponse {
    pub query: String,
    pub normalized: String,
    pub context: String,
    pub domain: DomainFilter,
    pub best: Option<ResolvedTerm>,
    /// Canonical lab code, independent of the SNOMED outcome
    pub canonical_loinc: Option<RankedCandidate>,
    /// Aliases from a learned entry, even one whose code was retracted
    pub learned_aliases: Vec<String>,
    pub technical: Option<TechnicalCandidates>,
}

impl ResolutionResponse {
    /// Whether any code was found.
    pub fn is_match(&self) -> bool {
        self.best.is_some()
    }

    /// Code of the best match, if any.
    pub fn best_code(&self) -> Option<&str> {
        self.best.as_ref().map(|b| b.code.as_str())
    }
}

/// A reviewer's confirmed selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub term: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(alias = "snomedCode")]
    pub code: String,
    #[serde(alias = "snomedDisplay")]
    pub display: String,
    #[serde(default)]
    pub lay_text: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

impl CommitRequest {
    pub fn new(term: impl Into<String>, code: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            context: None,
            code: code.into(),
            display: display.into(),
            lay_text: None,
            dry_run: false,
        }
    }
}

/// Result of a commit: the stored (or previewed) entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub key: String,
    pub entry: LearnedEntry,
    /// False for dry runs
    pub persisted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_filter_parse() {
        assert_eq!(DomainFilter::parse("auto"), DomainFilter::Auto);
        assert_eq!(DomainFilter::parse("LOINC"), DomainFilter::Loinc);
        assert_eq!(DomainFilter::parse("snomed"), DomainFilter::Snomed);
        assert_eq!(DomainFilter::parse("whatever"), DomainFilter::Auto);
    }

    #[test]
    fn test_query_defaults_from_json() {
        let query: ResolutionQuery = serde_json::from_str(r#"{"text": "ldl", "domain": "loinc"}"#).unwrap();
        assert_eq!(query.top_k, ResolutionQuery::DEFAULT_TOP_K);
        assert_eq!(query.tech_score_cutoff, ResolutionQuery::DEFAULT_TECH_SCORE_CUTOFF);
        assert_eq!(query.domain, DomainFilter::Loinc);
        assert!(!query.include_technical);
    }

    #[test]
    fn test_commit_request_accepts_snomed_keys() {
        let json = r#"{"term": "cp", "snomedCode": "29857009", "snomedDisplay": "Chest pain"}"#;
        let req: CommitRequest = serde_json::from_str(json).unwrap();

        assert_eq!(req.code, "29857009");
        assert_eq!(req.display, "Chest pain");
        assert!(!req.dry_run);
    }

    #[test]
    fn test_codeable_concept_single() {
        let cc = CodeableConcept::single(CodeSystem::Snomed, "25064002", "Headache", "head pain");
        assert_eq!(cc.coding.len(), 1);
        assert_eq!(cc.coding[0].system, "http://snomed.info/sct");
        assert_eq!(cc.text, "head pain");
    }
}
