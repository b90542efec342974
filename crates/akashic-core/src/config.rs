//! Resolver configuration.
//!
//! Every path defaults to a file under `data_dir` and can be overridden from
//! the environment. Bad override values are ignored with a warning.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

/// Default dataset reload interval.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default bound on waiting for the learned-store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Paths and knobs for datasets and the learned store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ResolverConfig {
    pub data_dir: PathBuf,
    pub snomed_path: PathBuf,
    pub loinc_path: PathBuf,
    pub loinc_aliases_path: PathBuf,
    pub canonical_path: PathBuf,
    pub domain_profile_path: PathBuf,
    /// Replacement keyword table; built-in table when `None`
    pub scoring_policy_path: Option<PathBuf>,
    pub learned_path: PathBuf,
    pub audit_dir: PathBuf,
    /// Dataset reload interval; `None` reloads only on request
    pub cache_ttl: Option<Duration>,
    pub lock_timeout: Duration,
    /// Keep `<learned>.bak` with the previous store version
    pub keep_backup: bool,
    /// Fail at load when the SNOMED file is absent
    pub require_snomed: bool,
    /// Seed the canonical map with the built-in lab table
    pub builtin_canonical: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::with_data_dir("data")
    }
}

impl ResolverConfig {
    /// Default layout rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref();
        Self {
            data_dir: dir.to_path_buf(),
            snomed_path: dir.join("snomed.json"),
            loinc_path: dir.join("loinc.json"),
            loinc_aliases_path: dir.join("loinc_aliases.json"),
            canonical_path: dir.join("loinc_canonical.json"),
            domain_profile_path: dir.join("domain_profile.json"),
            scoring_policy_path: None,
            learned_path: dir.join("layman_learned.json"),
            audit_dir: dir.join("logs").join("learned"),
            cache_ttl: Some(DEFAULT_CACHE_TTL),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            keep_backup: true,
            require_snomed: false,
            builtin_canonical: true,
        }
    }

    /// Configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config = match get("DATA_DIR") {
            Some(dir) => Self::with_data_dir(dir),
            None => Self::default(),
        };

        let paths: [(&str, &mut PathBuf); 7] = [
            ("SNOMED_JSON", &mut config.snomed_path),
            ("LOINC_JSON", &mut config.loinc_path),
            ("LOINC_ALIASES_JSON", &mut config.loinc_aliases_path),
            ("LOINC_CANONICAL_JSON", &mut config.canonical_path),
            ("DOMAIN_PROFILE_PATH", &mut config.domain_profile_path),
            ("LEARNED_JSON", &mut config.learned_path),
            ("LEARNED_LOG_DIR", &mut config.audit_dir),
        ];
        for (key, slot) in paths {
            if let Some(value) = get(key) {
                *slot = PathBuf::from(value);
            }
        }

        if let Some(value) = get("AKASHIC_SCORING_POLICY") {
            config.scoring_policy_path = Some(PathBuf::from(value));
        }
        if let Some(secs) = get("AKASHIC_CACHE_TTL_SECS").and_then(|v| parse_number("AKASHIC_CACHE_TTL_SECS", &v)) {
            config.cache_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(ms) = get("AKASHIC_LOCK_TIMEOUT_MS").and_then(|v| parse_number("AKASHIC_LOCK_TIMEOUT_MS", &v)) {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = get("AKASHIC_KEEP_BACKUP").and_then(|v| parse_flag("AKASHIC_KEEP_BACKUP", &v)) {
            config.keep_backup = flag;
        }
        if let Some(flag) = get("AKASHIC_REQUIRE_SNOMED").and_then(|v| parse_flag("AKASHIC_REQUIRE_SNOMED", &v)) {
            config.require_snomed = flag;
        }
        if let Some(flag) = get("AKASHIC_BUILTIN_CANONICAL").and_then(|v| parse_flag("AKASHIC_BUILTIN_CANONICAL", &v)) {
            config.builtin_canonical = flag;
        }

        config
    }

    /// Files whose content feeds the dataset hash.
    pub fn hashed_paths(&self) -> [&Path; 3] {
        [
            self.snomed_path.as_path(),
            self.loinc_path.as_path(),
            self.domain_profile_path.as_path(),
        ]
    }
}

fn parse_number(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse() {
        Ok(n) => Some(n),
        Err(_) => {
            warn!(key, value, "ignoring non-numeric override");
            None
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!(key, value, "ignoring non-boolean override");
            None
        }
    }
}
