//! pipeql Intermediate Representation (IR)
//!
//! Backend-agnostic pipeline model shared by the SQL and MongoDB code generators.
//! All types are deterministically serializable so a pipeline can be fingerprinted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod condition;
mod error;
mod formula;
mod metadata;
mod reference;
mod schema;
mod step;
pub mod template;
mod types;
mod version;

pub use condition::*;
pub use error::*;
pub use formula::*;
pub use metadata::*;
pub use reference::*;
pub use schema::*;
pub use step::*;
pub use types::*;
pub use version::*;

/// Ordered list of steps, the first of which is always a `domain` step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Pipeline reading a single domain with no further steps
    pub fn from_domain(domain: impl Into<String>) -> Self {
        Self::new(vec![Step::Domain(DomainStep {
            domain: domain.into(),
        })])
    }

    /// Name of the leading domain step, if the pipeline is well formed
    pub fn domain(&self) -> Option<&str> {
        match self.steps.first() {
            Some(Step::Domain(step)) => Some(&step.domain),
            _ => None,
        }
    }

    /// Check the domain-first invariant.
    ///
    /// Returns the 1-based position and kind of the first offending step.
    pub fn check_shape(&self) -> Result<(), PipelineTranslationFailure> {
        let Some(first) = self.steps.first() else {
            return Err(PipelineTranslationFailure::new(
                1,
                StepKind::Domain,
                StepError::InvalidStep("pipeline is empty".to_string()),
            ));
        };
        if first.kind() != StepKind::Domain {
            return Err(PipelineTranslationFailure::new(
                1,
                first.kind(),
                StepError::InvalidStep("a pipeline must start with a domain step".to_string()),
            ));
        }
        if let Some((index, step)) = self
            .steps
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, step)| step.kind() == StepKind::Domain)
        {
            return Err(PipelineTranslationFailure::new(
                index + 1,
                step.kind(),
                StepError::InvalidStep("a domain step is only allowed first".to_string()),
            ));
        }
        Ok(())
    }

    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("IR should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Pipeline {
        serde_json::from_str(
            r#"[
                {"name": "domain", "domain": "sales"},
                {"name": "rename", "to_rename": [["A", "B"]]},
                {"name": "filter", "condition": {"column": "B", "operator": "eq", "value": 5}}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let pipeline1 = sample();
        let pipeline2 = pipeline1.clone();

        assert_eq!(pipeline1.fingerprint(), pipeline2.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let pipeline = sample();

        let json = serde_json::to_string(&pipeline).unwrap();
        let parsed: Pipeline = serde_json::from_str(&json).unwrap();

        assert_eq!(pipeline, parsed);
        assert_eq!(pipeline.fingerprint(), parsed.fingerprint());
    }

    #[test]
    fn test_check_shape_requires_leading_domain() {
        let pipeline: Pipeline =
            serde_json::from_str(r#"[{"name": "delete", "columns": ["a"]}]"#).unwrap();
        let err = pipeline.check_shape().unwrap_err();
        assert_eq!(err.step_index, 1);
        assert_eq!(err.step_name, "delete");

        let pipeline: Pipeline = serde_json::from_str(
            r#"[{"name": "domain", "domain": "a"}, {"name": "domain", "domain": "b"}]"#,
        )
        .unwrap();
        let err = pipeline.check_shape().unwrap_err();
        assert_eq!(err.step_index, 2);

        assert!(sample().check_shape().is_ok());
        assert!(Pipeline::new(vec![]).check_shape().is_err());
    }

    #[test]
    fn test_domain_accessor() {
        assert_eq!(sample().domain(), Some("sales"));
        assert_eq!(Pipeline::from_domain("x").domain(), Some("x"));
    }
}
