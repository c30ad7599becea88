//! Error taxonomy shared by every stage of the planning engine.
//!
//! Validators fail fast and their errors propagate unchanged. Memory errors
//! always carry both the required and the available quantity so a caller can
//! correct the input without inspecting internals.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("Invalid value for `{field}`: {reason} (got {value})")]
    Validation {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported quantization format `{name}`; valid formats: {}", valid.join(", "))]
    UnsupportedFormat { name: String, valid: Vec<String> },

    #[error(
        "Insufficient GPU memory: {required_gb:.3} GB required but only {available_gb:.3} GB available"
    )]
    InsufficientMemory { required_gb: f64, available_gb: f64 },

    #[error("Inconsistent configuration: {0}")]
    Configuration(String),

    #[error("Invalid input for `{field}`: {value} must be positive")]
    InvalidInput { field: String, value: String },
}

impl PlanError {
    pub(crate) fn validation(
        field: &str,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        PlanError::Validation {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::Validation { .. } => "validation_error",
            PlanError::UnsupportedFormat { .. } => "unsupported_format",
            PlanError::InsufficientMemory { .. } => "insufficient_memory",
            PlanError::Configuration(_) => "configuration_error",
            PlanError::InvalidInput { .. } => "invalid_input",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_memory_message_has_both_quantities() {
        let err = PlanError::InsufficientMemory {
            required_gb: 14.0,
            available_gb: 8.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("14.000"));
        assert!(msg.contains("8.000"));
    }

    #[test]
    fn test_unsupported_format_lists_options() {
        let err = PlanError::UnsupportedFormat {
            name: "int3".into(),
            valid: vec!["fp16".into(), "int8".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported quantization format `int3`; valid formats: fp16, int8"
        );
        assert_eq!(err.kind(), "unsupported_format");
    }
}
