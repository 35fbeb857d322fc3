//! Error types for OxiONE operations.
//!
//! This module provides a comprehensive error type that covers all possible
//! error conditions when reading or writing ONE-code files: I/O errors,
//! ASCII parse errors, binary decoding errors, codec misuse, and calls made
//! from the wrong session state.

use std::io;
use thiserror::Error;

/// The main error type for OxiONE operations.
#[derive(Debug, Error)]
pub enum OneError {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The file does not conform to its schema.
    #[error("Schema violation: {message}")]
    Schema {
        /// Description of the violation.
        message: String,
    },

    /// Malformed ASCII input.
    #[error("Parse error at line {line}: {message}: {text}")]
    Parse {
        /// 1-based line number of the offending line.
        line: i64,
        /// Description of what went wrong.
        message: String,
        /// Excerpt of the offending line (up to 128 bytes).
        text: String,
    },

    /// Malformed or truncated binary input.
    #[error("Binary error at line {line}: {message}")]
    Binary {
        /// 1-based line number of the offending record.
        line: i64,
        /// Description of what went wrong.
        message: String,
    },

    /// A codec was used in a state that does not permit the operation.
    #[error("Codec error: {message}")]
    Codec {
        /// Description of the misuse or inconsistency.
        message: String,
    },

    /// A session operation was called in the wrong state.
    #[error("State error: {message}")]
    State {
        /// Description of the violated precondition.
        message: String,
    },
}

/// Result type alias for OxiONE operations.
pub type Result<T> = std::result::Result<T, OneError>;

impl OneError {
    /// Create a schema violation error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a parse error with a line number and excerpt.
    pub fn parse(line: i64, message: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
            text: text.into(),
        }
    }

    /// Create a binary decoding error.
    pub fn binary(line: i64, message: impl Into<String>) -> Self {
        Self::Binary {
            line,
            message: message.into(),
        }
    }

    /// Create a codec misuse error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create a session-state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OneError::parse(12, "bad int", "S x acgt");
        assert!(err.to_string().contains("line 12"));
        assert!(err.to_string().contains("S x acgt"));

        let err = OneError::codec("compressor already has a codec");
        assert!(err.to_string().contains("already has a codec"));

        let err = OneError::state("cannot read from a write session");
        assert!(err.to_string().contains("write session"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: OneError = io_err.into();
        assert!(matches!(err, OneError::Io(_)));
    }
}
