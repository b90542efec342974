//! Term resolution.
//!
//! Precedence: learned override → SNOMED alias index → canonical LOINC →
//! SNOMED fuzzy → LOINC fuzzy. The canonical LOINC code is reported alongside
//! any deterministic SNOMED answer since the two systems are orthogonal, but a
//! canonical hit is never second-guessed by fuzzy SNOMED ranking.

mod normalizer;
mod ranker;
mod scoring;
mod selection;

pub use normalizer::*;
pub use ranker::*;
pub use scoring::*;
pub use selection::*;

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::ResolverConfig;
use crate::dataset::{DatasetBundle, DatasetError, Datasets};
use crate::models::{
    CodeSystem, CodeableConcept, CommitOutcome, CommitRequest, LearnedEntry, PractitionerOption,
    RankedCandidate, ResolutionMethod, ResolutionQuery, ResolutionResponse, ResolvedTerm,
    TechnicalCandidates,
};
use crate::store::{LearnedStore, StoreError};

/// Resolver errors. An unresolvable term is not an error.
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] DatasetError),

    #[error("Learned store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ResolverError {
    /// Only lock contention is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolverError::Store(StoreError::LockTimeout { .. }))
    }
}

pub type ResolverResult<T> = Result<T, ResolverError>;

/// Resolution service: reference datasets plus the learned store.
pub struct Resolver {
    datasets: Datasets,
    store: LearnedStore,
}

impl Resolver {
    pub fn new(datasets: Datasets, store: LearnedStore) -> Self {
        Self { datasets, store }
    }

    /// Load datasets and open the learned store described by `config`.
    pub fn open(config: ResolverConfig) -> ResolverResult<Self> {
        let store = LearnedStore::from_config(&config);
        let datasets = Datasets::load(config)?;
        Ok(Self::new(datasets, store))
    }

    pub fn datasets(&self) -> &Datasets {
        &self.datasets
    }

    pub fn store(&self) -> &LearnedStore {
        &self.store
    }

    /// Content hash of the datasets currently served.
    pub fn data_hash(&self) -> String {
        self.datasets.current().data_hash.clone()
    }

    /// Reload datasets now. Returns the new content hash.
    pub fn reload(&self) -> ResolverResult<String> {
        let bundle = self.datasets.reload()?;
        info!(hash = %bundle.data_hash, "datasets reloaded on request");
        Ok(bundle.data_hash.clone())
    }

    /// Resolve free text to the best code.
    pub fn resolve(&self, query: &ResolutionQuery) -> ResolverResult<ResolutionResponse> {
        let bundle = self.datasets.current();
        let text = query.text.trim();
        let context = query.context.as_deref();
        let normalized = normalize(text);

        let mut response = ResolutionResponse {
            query: query.text.clone(),
            normalized: normalized.clone(),
            context: normalize_context(context),
            domain: query.domain,
            best: None,
            canonical_loinc: None,
            learned_aliases: Vec::new(),
            technical: None,
        };
        if normalized.is_empty() {
            return Ok(response);
        }

        let allowed = bundle.profile.allowed_systems(context, query.domain);
        let use_snomed = allowed.contains(&CodeSystem::Snomed);
        let use_loinc = allowed.contains(&CodeSystem::Loinc);

        let learned = self
            .store
            .get(context, text)
            .or_else(|| self.store.find_by_alias(context, text).map(|(_, entry)| entry));
        if let Some(entry) = &learned {
            response.learned_aliases = entry.aliases.iter().cloned().collect();
        }

        let canonical = if use_loinc {
            bundle.canonical.lookup(text).map(|code| RankedCandidate {
                code: code.to_string(),
                display: bundle
                    .loinc
                    .get(code)
                    .map(|r| r.display.clone())
                    .unwrap_or_else(|| code.to_string()),
                score: 100,
            })
        } else {
            None
        };
        response.canonical_loinc = canonical.clone();
        let canonical_code = canonical.as_ref().map(|c| c.code.clone());

        let mut best = None;
        if use_snomed {
            best = learned
                .as_ref()
                .filter(|entry| entry.has_code())
                .and_then(|entry| learned_term(&bundle, entry, text, query));
            if best.is_none() {
                best = bundle.snomed.lookup(text).map(|record| {
                    snomed_term(&bundle, query, SnomedHit {
                        code: &record.code,
                        display: &record.display,
                        score: 100,
                        method: ResolutionMethod::AliasIndex,
                        term: text,
                        aliases: Vec::new(),
                        loinc_code: canonical_code,
                    })
                });
            }
            if best.is_none() && canonical.is_none() {
                let ranked = FuzzyRanker::plain().rank(
                    text,
                    bundle.snomed.records(),
                    query.top_k,
                    query.score_cutoff,
                );
                debug!(query = %text, candidates = ranked.len(), "snomed fuzzy ranking");
                best = ranked.first().map(|top| {
                    snomed_term(&bundle, query, SnomedHit {
                        code: &top.code,
                        display: &top.display,
                        score: top.score,
                        method: ResolutionMethod::Fuzzy,
                        term: text,
                        aliases: Vec::new(),
                        loinc_code: None,
                    })
                });
            }
        }

        if best.is_none() && use_loinc {
            best = match &canonical {
                Some(hit) => Some(loinc_term(hit, ResolutionMethod::Canonical, text)),
                None => {
                    let ranked = FuzzyRanker::with_policy(&bundle.policy).rank(
                        text,
                        bundle.loinc.records(),
                        query.tech_top_k,
                        query.tech_score_cutoff,
                    );
                    debug!(query = %text, candidates = ranked.len(), "loinc fuzzy ranking");
                    pick_representative_loinc(&ranked, text)
                        .map(|pick| loinc_term(pick, ResolutionMethod::Fuzzy, text))
                }
            };
        }

        if query.include_technical {
            response.technical = Some(technical_candidates(&bundle, query, use_snomed, use_loinc));
        }

        match &best {
            Some(b) => debug!(query = %text, code = %b.code, method = ?b.method, score = b.score, "resolved"),
            None => debug!(query = %text, "no match"),
        }
        response.best = best;
        Ok(response)
    }

    /// Persist (or preview) a reviewer's selection.
    pub fn commit_selection(&self, request: CommitRequest) -> ResolverResult<CommitOutcome> {
        let term = if normalize(&request.term).is_empty() {
            request.lay_text.clone().unwrap_or_default()
        } else {
            request.term.clone()
        };
        if normalize(&term).is_empty() {
            return Err(ResolverError::Validation("term or layText is required".into()));
        }
        if request.code.trim().is_empty() {
            return Err(ResolverError::Validation("code is required".into()));
        }
        if request.display.trim().is_empty() {
            return Err(ResolverError::Validation("display is required".into()));
        }

        let context = request.context.as_deref();
        let lay_text = request.lay_text.as_deref();
        if request.dry_run {
            let (key, entry) =
                self.store
                    .preview(&term, context, &request.code, &request.display, lay_text)?;
            return Ok(CommitOutcome {
                key,
                entry,
                persisted: false,
            });
        }

        let (key, entry) = self
            .store
            .commit(&term, context, &request.code, &request.display, lay_text)?;
        Ok(CommitOutcome {
            key,
            entry,
            persisted: true,
        })
    }

    /// Record alternative phrasings for a term.
    pub fn learn_aliases(
        &self,
        term: &str,
        context: Option<&str>,
        aliases: &[String],
    ) -> ResolverResult<LearnedEntry> {
        let (_, entry) = self.store.add_aliases(term, context, aliases)?;
        Ok(entry)
    }

    /// Retract a learned mapping. Returns whether one existed.
    pub fn unlearn(&self, term: &str, context: Option<&str>, keep_aliases: bool) -> ResolverResult<bool> {
        if normalize(term).is_empty() {
            return Err(ResolverError::Validation("term is required".into()));
        }
        Ok(self.store.unlearn(term, context, keep_aliases)?)
    }
}

struct SnomedHit<'a> {
    code: &'a str,
    display: &'a str,
    score: u8,
    method: ResolutionMethod,
    term: &'a str,
    aliases: Vec<String>,
    loinc_code: Option<String>,
}

fn learned_term(
    bundle: &DatasetBundle,
    entry: &LearnedEntry,
    text: &str,
    query: &ResolutionQuery,
) -> Option<ResolvedTerm> {
    let code = entry.snomed_code.as_deref()?.trim();
    let display = entry
        .snomed_display
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .map(str::to_string)
        .or_else(|| bundle.snomed.get(code).map(|r| r.display.clone()))
        .unwrap_or_else(|| code.to_string());
    let term = entry
        .lay_text
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(text);

    Some(snomed_term(bundle, query, SnomedHit {
        code,
        display: &display,
        score: 100,
        method: ResolutionMethod::Learned,
        term,
        aliases: entry.aliases.iter().cloned().collect(),
        loinc_code: entry.loinc_code.clone(),
    }))
}

fn snomed_term(bundle: &DatasetBundle, query: &ResolutionQuery, hit: SnomedHit<'_>) -> ResolvedTerm {
    ResolvedTerm {
        system: CodeSystem::Snomed,
        code: hit.code.to_string(),
        display: hit.display.to_string(),
        score: hit.score,
        method: hit.method,
        term: hit.term.to_string(),
        aliases: hit.aliases,
        loinc_code: hit.loinc_code,
        patient_view: format!("{} ({})", hit.term, hit.display),
        practitioner_view: format!("{} ({})", hit.display, hit.term),
        codeable_concept: CodeableConcept::single(CodeSystem::Snomed, hit.code, hit.display, hit.term),
        options: Some(practitioner_options(bundle, query, hit.code, hit.display)),
    }
}

fn loinc_term(hit: &RankedCandidate, method: ResolutionMethod, text: &str) -> ResolvedTerm {
    ResolvedTerm {
        system: CodeSystem::Loinc,
        code: hit.code.clone(),
        display: hit.display.clone(),
        score: if method.is_deterministic() { 100 } else { hit.score },
        method,
        term: text.to_string(),
        aliases: Vec::new(),
        loinc_code: Some(hit.code.clone()),
        patient_view: format!("{} ({})", text, hit.display),
        practitioner_view: hit.display.clone(),
        codeable_concept: CodeableConcept::single(CodeSystem::Loinc, &hit.code, &hit.display, text),
        options: None,
    }
}

/// The chosen code first, then SNOMED neighbours of its display.
fn practitioner_options(
    bundle: &DatasetBundle,
    query: &ResolutionQuery,
    code: &str,
    display: &str,
) -> Vec<PractitionerOption> {
    let limit = query.tech_top_k.max(1);
    let mut seen = HashSet::from([code.to_string()]);
    let mut options = vec![PractitionerOption {
        code: code.to_string(),
        display: display.to_string(),
        score: 100,
        selected: true,
    }];

    let neighbours = FuzzyRanker::plain().rank(
        display,
        bundle.snomed.records(),
        limit,
        query.tech_score_cutoff,
    );
    for candidate in neighbours {
        if options.len() >= limit {
            break;
        }
        if seen.insert(candidate.code.clone()) {
            options.push(PractitionerOption {
                code: candidate.code,
                display: candidate.display,
                score: candidate.score,
                selected: false,
            });
        }
    }
    options
}

fn technical_candidates(
    bundle: &DatasetBundle,
    query: &ResolutionQuery,
    use_snomed: bool,
    use_loinc: bool,
) -> TechnicalCandidates {
    let text = query.text.trim();
    let mut technical = TechnicalCandidates::default();
    if use_snomed {
        technical.snomed = FuzzyRanker::plain().rank(
            text,
            bundle.snomed.records(),
            query.tech_top_k,
            query.tech_score_cutoff,
        );
    }
    if use_loinc {
        technical.loinc = FuzzyRanker::with_policy(&bundle.policy).rank(
            text,
            bundle.loinc.records(),
            query.tech_top_k,
            query.tech_score_cutoff,
        );
    }
    technical
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DomainFilter;
    use std::fs;
    use std::path::Path;

    fn write_fixtures(dir: &Path) {
        fs::write(
            dir.join("snomed.json"),
            r#"[
                {"code": "29857009", "display": "Chest pain", "aliases": ["chest discomfort"]},
                {"code": "25064002", "display": "Headache", "aliases": ["head pain"]},
                {"code": "386661006", "display": "Fever", "aliases": ["pyrexia"]},
                {"code": "113075003", "display": "Serum creatinine measurement"}
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.join("loinc.json"),
            r#"[
                {"code": "718-7", "display": "Hemoglobin [Mass/volume] in Blood", "PROPERTY": "MCNC"},
                {"code": "2160-0", "display": "Creatinine [Mass/volume] in Serum or Plasma", "PROPERTY": "MCNC", "CLASS": "CHEM"}
            ]"#,
        )
        .unwrap();
    }

    fn resolver_in(dir: &Path) -> Resolver {
        write_fixtures(dir);
        let mut config = ResolverConfig::with_data_dir(dir);
        config.cache_ttl = None;
        Resolver::open(config).unwrap()
    }

    #[test]
    fn test_alias_index_hit() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let response = resolver.resolve(&ResolutionQuery::new("Chest Discomfort")).unwrap();
        let best = response.best.unwrap();
        assert_eq!(best.code, "29857009");
        assert_eq!(best.method, ResolutionMethod::AliasIndex);
        assert_eq!(best.score, 100);
        assert_eq!(best.patient_view, "Chest Discomfort (Chest pain)");
        assert_eq!(best.practitioner_view, "Chest pain (Chest Discomfort)");

        let options = best.options.unwrap();
        assert_eq!(options[0].code, "29857009");
        assert!(options[0].selected);
        assert!(options[1..].iter().all(|o| !o.selected && o.code != "29857009"));
    }

    #[test]
    fn test_fuzzy_snomed_hit() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let response = resolver.resolve(&ResolutionQuery::new("severe headache")).unwrap();
        let best = response.best.unwrap();
        assert_eq!(best.code, "25064002");
        assert_eq!(best.method, ResolutionMethod::Fuzzy);
    }

    #[test]
    fn test_canonical_loinc_when_no_snomed() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let response = resolver.resolve(&ResolutionQuery::new("Creatinine")).unwrap();
        let best = response.best.unwrap();
        assert_eq!(best.system, CodeSystem::Loinc);
        assert_eq!(best.code, "2160-0");
        assert_eq!(best.method, ResolutionMethod::Canonical);
        assert_eq!(best.practitioner_view, "Creatinine [Mass/volume] in Serum or Plasma");
        assert!(best.options.is_none());
        assert_eq!(response.canonical_loinc.unwrap().code, "2160-0");
        assert_eq!(best.codeable_concept.coding[0].system, "http://loinc.org");
    }

    #[test]
    fn test_canonical_hit_skips_snomed_fuzzy() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let query = ResolutionQuery::new("creatinine").with_technical(true);
        let response = resolver.resolve(&query).unwrap();
        let best = response.best.unwrap();
        assert_eq!(best.system, CodeSystem::Loinc);
        assert_eq!(best.method, ResolutionMethod::Canonical);

        // The SNOMED measurement concept is still offered for review
        let technical = response.technical.unwrap();
        assert!(technical.snomed.iter().any(|c| c.code == "113075003"));
    }

    #[test]
    fn test_domain_filter_excludes_snomed() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let query = ResolutionQuery::new("chest pain").with_domain(DomainFilter::Loinc);
        let response = resolver.resolve(&query).unwrap();
        assert!(response.best.is_none());
    }

    #[test]
    fn test_empty_query_is_no_match() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let response = resolver.resolve(&ResolutionQuery::new("  ?! ")).unwrap();
        assert!(!response.is_match());
        assert_eq!(response.normalized, "");
        assert_eq!(response.context, "global");
    }

    #[test]
    fn test_technical_lists() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let query = ResolutionQuery::new("hemoglobin").with_technical(true);
        let technical = resolver.resolve(&query).unwrap().technical.unwrap();
        assert_eq!(technical.loinc[0].code, "718-7");
        assert!(technical.snomed.len() <= query.tech_top_k);
    }

    #[test]
    fn test_learned_overrides_alias_index() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        resolver
            .commit_selection(CommitRequest::new("chest pain", "10000001", "Precordial pain"))
            .unwrap();
        let best = resolver
            .resolve(&ResolutionQuery::new("chest pain"))
            .unwrap()
            .best
            .unwrap();
        assert_eq!(best.code, "10000001");
        assert_eq!(best.method, ResolutionMethod::Learned);
    }

    #[test]
    fn test_learned_alias_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        resolver
            .commit_selection(CommitRequest::new("sob", "267036007", "Dyspnea"))
            .unwrap();
        resolver.learn_aliases("sob", None, &["winded".to_string()]).unwrap();

        let response = resolver.resolve(&ResolutionQuery::new("Winded")).unwrap();
        assert_eq!(response.best_code(), Some("267036007"));
        assert_eq!(response.learned_aliases, vec!["winded".to_string()]);
    }

    #[test]
    fn test_commit_validation() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let missing_display = CommitRequest::new("fever", "386661006", " ");
        assert!(matches!(
            resolver.commit_selection(missing_display),
            Err(ResolverError::Validation(_))
        ));

        let mut lay_only = CommitRequest::new("", "386661006", "Fever");
        lay_only.lay_text = Some("hot and sweaty".into());
        let outcome = resolver.commit_selection(lay_only).unwrap();
        assert_eq!(outcome.key, "global::hot and sweaty");
    }

    #[test]
    fn test_dry_run_does_not_persist() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver_in(dir.path());

        let mut request = CommitRequest::new("fever", "386661006", "Fever");
        request.dry_run = true;
        let outcome = resolver.commit_selection(request).unwrap();
        assert!(!outcome.persisted);
        assert!(!resolver.store().path().exists());
        assert!(!resolver.store().audit().dir().exists());
    }

    #[test]
    fn test_retryable_only_for_lock_timeout() {
        let timeout = ResolverError::Store(StoreError::LockTimeout {
            path: "x.lock".into(),
            waited_ms: 10,
        });
        assert!(timeout.is_retryable());
        assert!(!ResolverError::Validation("x".into()).is_retryable());
    }
}
