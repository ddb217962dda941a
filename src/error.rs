//! Error types for kql2sql.

use thiserror::Error;

/// The main error type for kql2sql operations.
#[derive(Debug, Error)]
pub enum KqlError {
    /// A construct with no translation rule in the active translator or dialect.
    #[error("Unsupported construct: {construct}")]
    Unsupported { construct: String },

    /// Failed to parse the query text.
    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KqlError {
    /// Create an unsupported-construct error naming the construct.
    pub fn unsupported(construct: impl Into<String>) -> Self {
        Self::Unsupported {
            construct: construct.into(),
        }
    }

    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// The offending construct, if this is a translation error.
    pub fn construct(&self) -> Option<&str> {
        match self {
            Self::Unsupported { construct } => Some(construct),
            _ => None,
        }
    }
}

/// Result type alias for kql2sql operations.
pub type KqlResult<T> = Result<T, KqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KqlError::parse(5, "unexpected character");
        assert_eq!(
            err.to_string(),
            "Parse error at position 5: unexpected character"
        );
    }

    #[test]
    fn test_unsupported_names_construct() {
        let err = KqlError::unsupported("frobnicate");
        assert_eq!(err.to_string(), "Unsupported construct: frobnicate");
        assert_eq!(err.construct(), Some("frobnicate"));
    }
}
