//! Error Handling Module
//!
//! Defines the error type for the clock reader library.
//! Uses thiserror for ergonomic error definitions.
//!
//! Construction-time errors (shapes, names, initializers) and step-time errors
//! (non-finite losses, missing gradients, empty batches) are all fatal: the
//! library never retries, it only reports.

use thiserror::Error;

/// Main error type for clock reader operations
#[derive(Error, Debug)]
pub enum ClockError {
    /// A parameter was declared twice under the same qualified name
    #[error("Parameter '{0}' is already declared in this scope")]
    DuplicateParameter(String),

    /// The initializer cannot produce values (bad constant or stddev)
    #[error("Invalid initializer for '{name}': {reason}")]
    InvalidInitializer { name: String, reason: String },

    /// A tensor did not have the expected dimensions
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// A label fell outside its class range
    #[error("Invalid {unit} label {value}: must be in [0, {num_classes})")]
    InvalidLabel {
        unit: String,
        value: i64,
        num_classes: usize,
    },

    /// A trainable parameter received no gradient from the loss graph
    #[error("No gradient for {count} parameter tensor(s); every parameter must feed the loss")]
    MissingGradient { count: usize },

    /// A loss or metric evaluated to NaN or infinity
    #[error("Numeric overflow: {0}")]
    NumericOverflow(String),

    /// An average was requested over zero samples
    #[error("Empty batch: {0}")]
    EmptyBatch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tensor data could not be read back to the host
    #[error("Tensor data error: {0}")]
    TensorData(String),

    /// Error with checkpoint save/load
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ClockError {
    fn from(err: serde_json::Error) -> Self {
        ClockError::Serialization(err.to_string())
    }
}

/// Convenience Result type for clock reader operations
pub type Result<T> = std::result::Result<T, ClockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClockError::DuplicateParameter("conv1/weights".to_string());
        assert_eq!(
            err.to_string(),
            "Parameter 'conv1/weights' is already declared in this scope"
        );
    }

    #[test]
    fn test_invalid_label_display() {
        let err = ClockError::InvalidLabel {
            unit: "hour".to_string(),
            value: 12,
            num_classes: 12,
        };
        assert!(err.to_string().contains("[0, 12)"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClockError = io_err.into();
        assert!(matches!(err, ClockError::Io(_)));
    }
}
