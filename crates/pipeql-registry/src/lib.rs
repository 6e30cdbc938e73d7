//! Step registry: maps each step kind to a backend translator

use pipeql_ir::{StepError, StepKind, Version};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("Step '{kind}' is already registered in {namespace}")]
    Conflict { namespace: String, kind: StepKind },

    #[error("Step '{kind}' is not supported by {namespace}")]
    NotRegistered { namespace: String, kind: StepKind },

    #[error("Step '{kind}' requires version {required} or later, target is {actual}")]
    VersionTooLow {
        kind: StepKind,
        required: Version,
        actual: Version,
    },
}

impl From<RegistryError> for StepError {
    fn from(err: RegistryError) -> Self {
        StepError::Registry(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Registration<F> {
    pub translator: F,
    pub min_version: Option<Version>,
}

/// Namespaced mapping from step kind to translator
#[derive(Debug, Clone)]
pub struct StepRegistry<F: Clone> {
    namespace: String,
    entries: BTreeMap<StepKind, Registration<F>>,
}

impl<F: Clone> StepRegistry<F> {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Registry built from a fixed table; a kind listed twice keeps its last entry
    pub fn from_entries(
        namespace: impl Into<String>,
        entries: impl IntoIterator<Item = (StepKind, F, Option<Version>)>,
    ) -> Self {
        let entries = entries
            .into_iter()
            .map(|(kind, translator, min_version)| {
                (
                    kind,
                    Registration {
                        translator,
                        min_version,
                    },
                )
            })
            .collect();
        Self {
            namespace: namespace.into(),
            entries,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn register(
        &mut self,
        kind: StepKind,
        translator: F,
        min_version: Option<Version>,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&kind) {
            return Err(RegistryError::Conflict {
                namespace: self.namespace.clone(),
                kind,
            });
        }
        trace!(namespace = %self.namespace, step = %kind, "registering step translator");
        self.entries.insert(
            kind,
            Registration {
                translator,
                min_version,
            },
        );
        Ok(())
    }

    /// Replace (or insert) a mapping, keeping any minimum version already declared
    pub fn override_step(&mut self, kind: StepKind, translator: F) -> Option<Registration<F>> {
        let min_version = self.entries.get(&kind).and_then(|r| r.min_version);
        debug!(
            namespace = %self.namespace,
            step = %kind,
            replaced = self.entries.contains_key(&kind),
            "overriding step translator"
        );
        self.entries.insert(
            kind,
            Registration {
                translator,
                min_version,
            },
        )
    }

    pub fn unregister(&mut self, kind: StepKind) -> Option<Registration<F>> {
        self.entries.remove(&kind)
    }

    /// Registry named `<parent>.<namespace>` starting from a snapshot of this one
    pub fn child(&self, namespace: &str) -> Self {
        Self {
            namespace: format!("{}.{}", self.namespace, namespace),
            entries: self.entries.clone(),
        }
    }

    pub fn supported_steps(&self) -> BTreeMap<StepKind, F> {
        self.entries
            .iter()
            .map(|(kind, registration)| (*kind, registration.translator.clone()))
            .collect()
    }

    pub fn is_supported(&self, kind: StepKind) -> bool {
        self.entries.contains_key(&kind)
    }

    /// Translator for `kind`; no target version means "latest" and always passes
    pub fn lookup(&self, kind: StepKind, version: Option<&Version>) -> Result<&F, RegistryError> {
        let registration = self
            .entries
            .get(&kind)
            .ok_or_else(|| RegistryError::NotRegistered {
                namespace: self.namespace.clone(),
                kind,
            })?;
        if let (Some(required), Some(actual)) = (registration.min_version, version) {
            if *actual < required {
                return Err(RegistryError::VersionTooLow {
                    kind,
                    required,
                    actual: *actual,
                });
            }
        }
        Ok(&registration.translator)
    }
}
