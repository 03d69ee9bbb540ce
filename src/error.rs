//! Error types for qmap.

use thiserror::Error;

/// The main error type for query mapping operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    /// A destination node has no source counterpart (missing type map or member).
    #[error("Translation error: {0}")]
    Translation(String),

    /// No predicate-free overload exists to reapply a reducer after projection.
    #[error("Unsupported reducer: '{operator}' has no overload taking {arity} argument(s)")]
    UnsupportedReducer { operator: String, arity: usize },

    /// The source provider could not evaluate the translated query.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The source provider does not support an expression shape.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// The object mapper failed to map a value.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Final coercion to the requested result type failed.
    #[error("Cannot convert {from} to {to}")]
    Conversion { from: String, to: String },

    #[error("Parse error at position {position}: {message}")]
    Parse { position: usize, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl MapError {
    /// Create a parse error at the given position.
    pub fn parse(position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            position,
            message: message.into(),
        }
    }

    /// Create a conversion error between two displayable types.
    pub fn conversion(from: impl ToString, to: impl ToString) -> Self {
        Self::Conversion {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create an unsupported reducer error.
    pub fn unsupported_reducer(operator: impl ToString, arity: usize) -> Self {
        Self::UnsupportedReducer {
            operator: operator.to_string(),
            arity,
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type alias for qmap operations.
pub type MapResult<T> = Result<T, MapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapError::parse(5, "unexpected character");
        assert_eq!(
            err.to_string(),
            "Parse error at position 5: unexpected character"
        );
    }

    #[test]
    fn test_unsupported_reducer_display() {
        let err = MapError::unsupported_reducer("All", 1);
        assert_eq!(
            err.to_string(),
            "Unsupported reducer: 'All' has no overload taking 1 argument(s)"
        );
    }
}
