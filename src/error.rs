use std::fmt;

/// Result type for layer operations
pub type Result<T> = std::result::Result<T, LayerError>;

/// Main error type for the layer library
#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Operation the layer does not provide
    Unsupported {
        operation: String,
    },

    /// Layer is not in a state where the operation can run
    IllegalState(String),

    /// Named parameter absent from the parameter table
    MissingParameter(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Numerical computation errors
    NumericalError(String),
}

impl fmt::Display for LayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            LayerError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            LayerError::Unsupported { operation } => {
                write!(f, "Unsupported operation: {}", operation)
            }
            LayerError::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            LayerError::MissingParameter(name) => write!(f, "Missing parameter '{}'", name),
            LayerError::IoError(msg) => write!(f, "IO error: {}", msg),
            LayerError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            LayerError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
        }
    }
}

impl std::error::Error for LayerError {}

// Conversion from std::io::Error
impl From<std::io::Error> for LayerError {
    fn from(err: std::io::Error) -> Self {
        LayerError::IoError(err.to_string())
    }
}

// Conversion from bincode::Error
impl From<bincode::Error> for LayerError {
    fn from(err: bincode::Error) -> Self {
        LayerError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for LayerError {
    fn from(err: serde_json::Error) -> Self {
        LayerError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for LayerError {
    fn from(err: ndarray::ShapeError) -> Self {
        LayerError::DimensionMismatch {
            expected: "compatible shape".to_string(),
            actual: err.to_string(),
        }
    }
}

// Helper functions for common error patterns
impl LayerError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        LayerError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        LayerError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        LayerError::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn illegal_state<S: Into<String>>(msg: S) -> Self {
        LayerError::IllegalState(msg.into())
    }
}
