//! Reference datasets: loading, alias indexing, and snapshot lifecycle.
//!
//! [`Datasets`] owns the current [`DatasetBundle`] behind an `Arc`. Readers
//! clone the `Arc` once per request; reloads build a complete new bundle and
//! swap it in, so nobody ever observes a partially built one.

mod canonical;
mod index;
mod loader;
mod profile;

pub use canonical::*;
pub use index::*;
pub use loader::*;
pub use profile::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock, TryLockError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ResolverConfig;
use crate::models::CodeSystem;
use crate::resolver::ScoringPolicy;

/// Dataset errors. Format problems never surface here; they load as empty.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Missing required dataset file: {}", .0.display())]
    MissingRequired(PathBuf),
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Everything a request reads, built together and never mutated.
#[derive(Debug)]
pub struct DatasetBundle {
    pub snomed: Snapshot,
    pub loinc: Snapshot,
    pub canonical: CanonicalMap,
    pub profile: DomainProfile,
    pub policy: ScoringPolicy,
    /// Content hash of the source files
    pub data_hash: String,
    pub loaded_at: DateTime<Utc>,
}

impl DatasetBundle {
    /// Read every source file named by `config`.
    pub fn load(config: &ResolverConfig) -> DatasetResult<Self> {
        if config.require_snomed && !config.snomed_path.exists() {
            return Err(DatasetError::MissingRequired(config.snomed_path.clone()));
        }

        let bundle = Self {
            snomed: load_snapshot(CodeSystem::Snomed, &config.snomed_path),
            loinc: load_snapshot(CodeSystem::Loinc, &config.loinc_path),
            canonical: CanonicalMap::load(
                &config.canonical_path,
                &config.loinc_aliases_path,
                config.builtin_canonical,
            ),
            profile: DomainProfile::load(&config.domain_profile_path),
            policy: ScoringPolicy::load_or_default(config.scoring_policy_path.as_deref()),
            data_hash: data_hash(&config.hashed_paths()),
            loaded_at: Utc::now(),
        };

        info!(
            snomed = bundle.snomed.len(),
            loinc = bundle.loinc.len(),
            canonical = bundle.canonical.len(),
            hash = %bundle.data_hash,
            "datasets loaded"
        );
        Ok(bundle)
    }

    /// Snapshot for a code system.
    pub fn snapshot(&self, system: CodeSystem) -> &Snapshot {
        match system {
            CodeSystem::Snomed => &self.snomed,
            CodeSystem::Loinc => &self.loinc,
        }
    }
}

/// Load one dataset file into a snapshot; any failure yields an empty one.
pub fn load_snapshot(system: CodeSystem, path: &Path) -> Snapshot {
    match read_json_lenient(path) {
        Some(value) => Snapshot::from_entries(system, parse_dataset(system, &value)),
        None => Snapshot::empty(system),
    }
}

/// SHA-256 over the `|`-joined hex digests of the files that exist.
pub fn data_hash(paths: &[&Path]) -> String {
    let parts: Vec<String> = paths
        .iter()
        .filter_map(|p| fs::read(p).ok())
        .map(|bytes| hex::encode(Sha256::digest(&bytes)))
        .collect();
    hex::encode(Sha256::digest(parts.join("|").as_bytes()))
}

struct Loaded {
    bundle: Arc<DatasetBundle>,
    at: Instant,
}

/// Dataset service with explicit and TTL-triggered reload.
pub struct Datasets {
    config: ResolverConfig,
    state: RwLock<Loaded>,
    reloading: Mutex<()>,
}

impl Datasets {
    /// Load datasets for `config`.
    pub fn load(config: ResolverConfig) -> DatasetResult<Self> {
        let bundle = DatasetBundle::load(&config)?;
        Ok(Self::from_bundle(config, bundle))
    }

    /// Wrap an already-built bundle.
    pub fn from_bundle(config: ResolverConfig, bundle: DatasetBundle) -> Self {
        Self {
            config,
            state: RwLock::new(Loaded {
                bundle: Arc::new(bundle),
                at: Instant::now(),
            }),
            reloading: Mutex::new(()),
        }
    }

    /// The current bundle, reloading first if the TTL has elapsed.
    ///
    /// A failed TTL reload keeps serving the previous bundle.
    pub fn current(&self) -> Arc<DatasetBundle> {
        let (bundle, stale) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (Arc::clone(&state.bundle), self.is_stale(state.at))
        };
        if !stale {
            return bundle;
        }

        // Another thread is already reloading; keep using what we have.
        let _guard = match self.reloading.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => return bundle,
        };
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if !self.is_stale(state.at) {
                return Arc::clone(&state.bundle);
            }
        }
        match self.swap_in_fresh() {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "dataset reload failed, keeping previous snapshot");
                self.touch();
                bundle
            }
        }
    }

    /// Reload now, regardless of TTL.
    pub fn reload(&self) -> DatasetResult<Arc<DatasetBundle>> {
        let _guard = self.reloading.lock().unwrap_or_else(PoisonError::into_inner);
        self.swap_in_fresh()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    fn swap_in_fresh(&self) -> DatasetResult<Arc<DatasetBundle>> {
        let fresh = Arc::new(DatasetBundle::load(&self.config)?);
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.bundle = Arc::clone(&fresh);
        state.at = Instant::now();
        Ok(fresh)
    }

    fn touch(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.at = Instant::now();
    }

    fn is_stale(&self, at: Instant) -> bool {
        self.config
            .cache_ttl
            .is_some_and(|ttl| at.elapsed() >= ttl)
    }
}
