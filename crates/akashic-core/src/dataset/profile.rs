//! Per-context code system restrictions.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use super::loader::read_json_lenient;
use crate::models::{CodeSystem, DomainFilter};
use crate::resolver::normalize;

/// `context → allowed systems`, loaded from the domain profile file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainProfile {
    contexts: HashMap<String, BTreeSet<CodeSystem>>,
}

impl DomainProfile {
    /// Load a profile; missing or malformed files give an empty profile.
    pub fn load(path: &Path) -> Self {
        let mut profile = Self::default();
        match read_json_lenient(path) {
            Some(Value::Object(map)) => {
                for (context, systems) in map {
                    let Value::Array(systems) = systems else {
                        continue;
                    };
                    let systems = systems
                        .iter()
                        .filter_map(Value::as_str)
                        .filter_map(CodeSystem::parse);
                    profile.set(&context, systems);
                }
            }
            Some(_) => warn!(path = %path.display(), "domain profile is not a JSON object, ignoring"),
            None => {}
        }
        profile
    }

    /// Restrict a context to the given systems.
    pub fn set(&mut self, context: &str, systems: impl IntoIterator<Item = CodeSystem>) {
        self.contexts
            .insert(normalize(context), systems.into_iter().collect());
    }

    /// Systems a query may use: the context's profile entry, else the explicit
    /// domain filter, else both.
    pub fn allowed_systems(&self, context: Option<&str>, domain: DomainFilter) -> BTreeSet<CodeSystem> {
        if let Some(systems) = context.and_then(|c| self.contexts.get(&normalize(c))) {
            return systems.clone();
        }
        match domain.system() {
            Some(system) => BTreeSet::from([system]),
            None => BTreeSet::from([CodeSystem::Snomed, CodeSystem::Loinc]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
