//! Akashic Core Library
//!
//! Resolves free-text clinical terms to SNOMED CT concepts and LOINC lab codes,
//! and remembers human-confirmed mappings so later identical queries are
//! deterministic.
//!
//! # Architecture
//!
//! ```text
//! query text ──► normalize ──► learned store ──► SNOMED alias index ──► SNOMED fuzzy
//!                                   ▲                                        │
//!                                   │                         (no SNOMED answer)
//!                          reviewer commit                                   ▼
//!                                   │                 canonical LOINC ──► LOINC fuzzy
//!                                   ▼                                        │
//!                   lock ► atomic write ► audit                   representative pick
//! ```
//!
//! # Core Principle
//!
//! **A confirmed mapping always beats a guess.** Fuzzy scoring is only reached
//! when no learned, alias, or canonical answer exists.
//!
//! # Modules
//!
//! - [`config`]: Paths and knobs, overridable from the environment
//! - [`dataset`]: Reference dataset loading, alias index, canonical map, reload
//! - [`models`]: Domain types (CodeRecord, LearnedEntry, ResolutionResponse, etc.)
//! - [`resolver`]: Normalizer, scoring policy, fuzzy ranker, resolution composer
//! - [`store`]: Learned store with file lock, atomic writes, and audit log

pub mod config;
pub mod dataset;
pub mod models;
pub mod resolver;
pub mod store;

// Re-export commonly used types
pub use config::ResolverConfig;
pub use dataset::{DatasetBundle, Datasets};
pub use models::{
    CodeRecord, CodeSystem, CommitOutcome, CommitRequest, DomainFilter, LearnedEntry,
    RankedCandidate, ResolutionMethod, ResolutionQuery, ResolutionResponse, ResolvedTerm,
};
pub use resolver::{normalize, FuzzyRanker, Resolver, ResolverError, ScoringPolicy};
pub use store::LearnedStore;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::Arc;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum AkashicError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("Invalid input: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<resolver::ResolverError> for AkashicError {
    fn from(e: resolver::ResolverError) -> Self {
        use store::StoreError;

        let message = e.to_string();
        match e {
            ResolverError::Configuration(_) => AkashicError::ConfigurationError(message),
            ResolverError::Validation(msg) | ResolverError::Store(StoreError::Validation(msg)) => {
                AkashicError::ValidationError(msg)
            }
            ResolverError::Store(StoreError::LockTimeout { .. }) => AkashicError::LockTimeout(message),
            ResolverError::Store(_) => AkashicError::StorageError(message),
        }
    }
}

impl From<serde_json::Error> for AkashicError {
    fn from(e: serde_json::Error) -> Self {
        AkashicError::SerializationError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open a resolver over the default file layout under `data_dir`.
#[uniffi::export]
pub fn open_resolver(data_dir: String) -> Result<Arc<AkashicCore>, AkashicError> {
    let resolver = Resolver::open(ResolverConfig::with_data_dir(data_dir))?;
    Ok(Arc::new(AkashicCore { resolver }))
}

/// Open a resolver configured from environment variables.
#[uniffi::export]
pub fn open_resolver_from_env() -> Result<Arc<AkashicCore>, AkashicError> {
    let resolver = Resolver::open(ResolverConfig::from_env())?;
    Ok(Arc::new(AkashicCore { resolver }))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe resolver handle for FFI.
#[derive(uniffi::Object)]
pub struct AkashicCore {
    resolver: Resolver,
}

#[uniffi::export]
impl AkashicCore {
    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve a free-text term.
    pub fn lookup(&self, request: FfiLookupRequest) -> Result<FfiLookupResponse, AkashicError> {
        let response = self.resolver.resolve(&request.into())?;
        Ok(response.into())
    }

    /// Resolve from a JSON query, answering with the full JSON response
    /// (including the coded concept).
    pub fn lookup_json(&self, request_json: String) -> Result<String, AkashicError> {
        let query: ResolutionQuery = serde_json::from_str(&request_json)?;
        let response = self.resolver.resolve(&query)?;
        Ok(serde_json::to_string(&response)?)
    }

    // =========================================================================
    // Learned Mappings
    // =========================================================================

    /// Confirm a reviewer's selection (or preview it with `dry_run`).
    pub fn commit_selection(&self, request: FfiCommitRequest) -> Result<FfiLearnedEntry, AkashicError> {
        let outcome = self.resolver.commit_selection(request.into())?;
        Ok(outcome.into())
    }

    /// Attach alternative phrasings to a learned term.
    pub fn learn_aliases(
        &self,
        term: String,
        context: Option<String>,
        aliases: Vec<String>,
    ) -> Result<Vec<String>, AkashicError> {
        let entry = self
            .resolver
            .learn_aliases(&term, context.as_deref(), &aliases)?;
        Ok(entry.aliases.into_iter().collect())
    }

    /// Retract a learned mapping. Returns whether one existed.
    pub fn unlearn(
        &self,
        term: String,
        context: Option<String>,
        keep_aliases: bool,
    ) -> Result<bool, AkashicError> {
        Ok(self
            .resolver
            .unlearn(&term, context.as_deref(), keep_aliases)?)
    }

    // =========================================================================
    // Datasets
    // =========================================================================

    /// Reload reference datasets now. Returns the new content hash.
    pub fn reload_datasets(&self) -> Result<String, AkashicError> {
        Ok(self.resolver.reload()?)
    }

    /// Content hash of the datasets currently served.
    pub fn data_hash(&self) -> String {
        self.resolver.data_hash()
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe resolution query.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLookupRequest {
    pub text: String,
    pub context: Option<String>,
    /// "auto", "snomed" or "loinc"
    pub domain: String,
    pub top_k: u32,
    pub score_cutoff: u8,
    pub tech_top_k: u32,
    pub tech_score_cutoff: u8,
    pub include_technical: bool,
}

impl From<FfiLookupRequest> for ResolutionQuery {
    fn from(req: FfiLookupRequest) -> Self {
        ResolutionQuery {
            text: req.text,
            context: req.context,
            domain: DomainFilter::parse(&req.domain),
            top_k: req.top_k as usize,
            score_cutoff: req.score_cutoff,
            tech_top_k: req.tech_top_k as usize,
            tech_score_cutoff: req.tech_score_cutoff,
            include_technical: req.include_technical,
        }
    }
}

/// FFI-safe ranked candidate.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCandidate {
    pub code: String,
    pub display: String,
    pub score: u8,
}

impl From<RankedCandidate> for FfiCandidate {
    fn from(candidate: RankedCandidate) -> Self {
        Self {
            code: candidate.code,
            display: candidate.display,
            score: candidate.score,
        }
    }
}

/// FFI-safe practitioner pick-list entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiOption {
    pub code: String,
    pub display: String,
    pub score: u8,
    pub selected: bool,
}

/// FFI-safe best match.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiResolvedTerm {
    pub system: String,
    pub system_uri: String,
    pub code: String,
    pub display: String,
    pub score: u8,
    pub method: String,
    pub term: String,
    pub aliases: Vec<String>,
    pub loinc_code: Option<String>,
    pub patient_view: String,
    pub practitioner_view: String,
    pub options: Vec<FfiOption>,
}

impl From<ResolvedTerm> for FfiResolvedTerm {
    fn from(term: ResolvedTerm) -> Self {
        Self {
            system: term.system.as_str().to_string(),
            system_uri: term.system.uri().to_string(),
            code: term.code,
            display: term.display,
            score: term.score,
            method: format!("{:?}", term.method),
            term: term.term,
            aliases: term.aliases,
            loinc_code: term.loinc_code,
            patient_view: term.patient_view,
            practitioner_view: term.practitioner_view,
            options: term
                .options
                .unwrap_or_default()
                .into_iter()
                .map(|o| FfiOption {
                    code: o.code,
                    display: o.display,
                    score: o.score,
                    selected: o.selected,
                })
                .collect(),
        }
    }
}

/// FFI-safe resolution response.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLookupResponse {
    pub query: String,
    pub normalized: String,
    pub context: String,
    pub best: Option<FfiResolvedTerm>,
    pub canonical_loinc: Option<FfiCandidate>,
    pub learned_aliases: Vec<String>,
    pub technical_snomed: Vec<FfiCandidate>,
    pub technical_loinc: Vec<FfiCandidate>,
}

impl From<ResolutionResponse> for FfiLookupResponse {
    fn from(response: ResolutionResponse) -> Self {
        let technical = response.technical.unwrap_or_default();
        Self {
            query: response.query,
            normalized: response.normalized,
            context: response.context,
            best: response.best.map(|b| b.into()),
            canonical_loinc: response.canonical_loinc.map(|c| c.into()),
            learned_aliases: response.learned_aliases,
            technical_snomed: technical.snomed.into_iter().map(|c| c.into()).collect(),
            technical_loinc: technical.loinc.into_iter().map(|c| c.into()).collect(),
        }
    }
}

/// FFI-safe commit request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCommitRequest {
    pub term: String,
    pub context: Option<String>,
    pub code: String,
    pub display: String,
    pub lay_text: Option<String>,
    pub dry_run: bool,
}

impl From<FfiCommitRequest> for CommitRequest {
    fn from(req: FfiCommitRequest) -> Self {
        CommitRequest {
            term: req.term,
            context: req.context,
            code: req.code,
            display: req.display,
            lay_text: req.lay_text,
            dry_run: req.dry_run,
        }
    }
}

/// FFI-safe learned entry, as stored or previewed.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLearnedEntry {
    pub key: String,
    pub term: String,
    pub context: String,
    pub snomed_code: Option<String>,
    pub snomed_display: Option<String>,
    pub lay_text: Option<String>,
    pub aliases: Vec<String>,
    pub loinc_code: Option<String>,
    pub updated_at: Option<String>,
    pub persisted: bool,
}

impl From<CommitOutcome> for FfiLearnedEntry {
    fn from(outcome: CommitOutcome) -> Self {
        let entry = outcome.entry;
        Self {
            key: outcome.key,
            term: entry.term,
            context: entry.context,
            snomed_code: entry.snomed_code,
            snomed_display: entry.snomed_display,
            lay_text: entry.lay_text,
            aliases: entry.aliases.into_iter().collect(),
            loinc_code: entry.loinc_code,
            updated_at: entry.updated_at.map(|t| t.to_rfc3339()),
            persisted: outcome.persisted,
        }
    }
}
