use thiserror::Error;

/// Main error type for the GridSweep system
#[derive(Error, Debug)]
pub enum GsError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl GsError {
    /// True when the error only says the configuration is already recorded.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, GsError::Store(StoreError::DuplicateKey { .. }))
    }

    /// True when the store holds no results.
    pub fn is_empty_store(&self) -> bool {
        matches!(self, GsError::Store(StoreError::EmptyStore))
    }
}

/// Result store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection failed: {message}")]
    Connection { message: String },

    #[error("Schema setup failed: {message}")]
    Schema { message: String },

    #[error("Configuration already recorded: {key}")]
    DuplicateKey { key: String },

    #[error("No results recorded yet")]
    EmptyStore,

    #[error("Query execution failed: {query}, error: {error}")]
    QueryFailed { query: String, error: String },

    #[error("Stored row is corrupt: {message}")]
    Corruption { message: String },
}

/// Errors raised while scoring a single configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("Scoring failed: {message}")]
    ScoringFailed { message: String },

    #[error("Scoring function returned a non-finite score: {score}")]
    NonFiniteScore { score: f64 },

    #[error("Evaluation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Scoring function panicked: {message}")]
    Panicked { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Invalid cross-validation setup: {message}")]
    InvalidSplit { message: String },
}

impl EvaluationError {
    pub fn scoring(message: impl Into<String>) -> Self {
        Self::ScoringFailed {
            message: message.into(),
        }
    }
}

/// Result type alias for GridSweep operations
pub type GsResult<T> = Result<T, GsError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::GsError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::GsError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = StoreError::DuplicateKey {
            key: r#"{"C":0.1}"#.to_string(),
        };

        assert!(error.to_string().contains("already recorded"));
        assert!(error.to_string().contains(r#"{"C":0.1}"#));
    }

    #[test]
    fn test_error_conversion() {
        let store_error = StoreError::DuplicateKey { key: "k".into() };
        let gs_error: GsError = store_error.into();
        assert!(gs_error.is_duplicate_key());
        assert!(!gs_error.is_empty_store());

        let gs_error: GsError = StoreError::EmptyStore.into();
        assert!(gs_error.is_empty_store());

        let gs_error: GsError = EvaluationError::scoring("boom").into();
        match gs_error {
            GsError::Evaluation(EvaluationError::ScoringFailed { message }) => {
                assert_eq!(message, "boom")
            }
            other => panic!("Expected Evaluation error, got {other:?}"),
        }
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(validation_err.to_string().contains("42"));
        let config_err = config_error!("Missing required field: {}", "table");
        assert!(matches!(config_err, GsError::Config(_)));
    }
}
