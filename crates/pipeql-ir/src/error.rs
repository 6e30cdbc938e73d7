//! Translation error taxonomy

use thiserror::Error;

use crate::StepKind;

/// Failure of a single step translator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Step '{step}' is not implemented for dialect {dialect}")]
    NotImplementedForDialect { step: String, dialect: String },

    #[error("Invalid formula '{formula}': {reason}")]
    InvalidFormula { formula: String, reason: String },

    #[error("Column '{0}' already exists")]
    DuplicateColumn(String),

    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    #[error("Column '{column}' not found (available: {})", available.join(", "))]
    ColumnNotFound { column: String, available: Vec<String> },

    #[error("Invalid step: {0}")]
    InvalidStep(String),

    #[error("Probe failed: {0}")]
    Probe(String),

    #[error("Reference cycle: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),

    #[error("References nested deeper than {0} levels")]
    ReferenceTooDeep(usize),

    #[error("Unknown domain or pipeline '{0}'")]
    UnknownReference(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Sub-pipeline failed: {0}")]
    SubPipeline(Box<PipelineTranslationFailure>),
}

/// The single user-visible translation failure, positioned on the offending step
#[derive(Debug, Clone, PartialEq, Error)]
#[error("step {step_index} ({step_name}) failed: {message}")]
pub struct PipelineTranslationFailure {
    /// 1-based position in the pipeline
    pub step_index: usize,
    pub step_name: String,
    pub message: String,
    #[source]
    pub cause: StepError,
}

impl PipelineTranslationFailure {
    pub fn new(step_index: usize, kind: StepKind, cause: StepError) -> Self {
        Self {
            step_index,
            step_name: kind.as_str().to_string(),
            message: cause.to_string(),
            cause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message() {
        let failure = PipelineTranslationFailure::new(
            3,
            StepKind::Filter,
            StepError::ColumnNotFound {
                column: "C".to_string(),
                available: vec!["A".to_string(), "B".to_string()],
            },
        );
        assert_eq!(failure.step_name, "filter");
        assert_eq!(
            failure.to_string(),
            "step 3 (filter) failed: Column 'C' not found (available: A, B)"
        );
    }

    #[test]
    fn test_nested_failure() {
        let inner = PipelineTranslationFailure::new(
            2,
            StepKind::Delete,
            StepError::InvalidStep("boom".to_string()),
        );
        let outer = PipelineTranslationFailure::new(
            4,
            StepKind::Join,
            StepError::SubPipeline(Box::new(inner)),
        );
        assert!(outer.message.contains("step 2 (delete) failed"));
    }
}
