//! Error types for chat metrics
//!
//! Validation failures are reported immediately; store failures carry the
//! engine error code so the retry executor can recognise transient ones.

/// Engine error code DocumentDB reports when an aggregation runs out of memory
pub const LOW_MEMORY_CODE: i32 = 39;

const LOW_MEMORY_MESSAGE: &str = "low available memory";

/// Main error type for metrics operations
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Store error{}: {message}", code_suffix(.code))]
    Store { code: Option<i32>, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn code_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

impl MetricsError {
    /// Shorthand for a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Store failure without an engine code
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            code: None,
            message: message.into(),
        }
    }

    /// Whether this is the transient "engine low memory" signature
    pub fn is_low_memory(&self) -> bool {
        match self {
            Self::Store { code, message } => {
                *code == Some(LOW_MEMORY_CODE) || message.contains(LOW_MEMORY_MESSAGE)
            }
            _ => false,
        }
    }

    /// HTTP status code for the calling layer
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Store { .. } => 503,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }
}

impl From<mongodb::error::Error> for MetricsError {
    fn from(err: mongodb::error::Error) -> Self {
        let code = match err.kind.as_ref() {
            mongodb::error::ErrorKind::Command(command) => Some(command.code),
            _ => None,
        };
        Self::Store {
            code,
            message: err.to_string(),
        }
    }
}

impl From<bson::ser::Error> for MetricsError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Internal(format!("BSON serialization error: {}", err))
    }
}

impl From<bson::de::Error> for MetricsError {
    fn from(err: bson::de::Error) -> Self {
        Self::Internal(format!("BSON deserialization error: {}", err))
    }
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for MetricsError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for metrics operations
pub type Result<T> = std::result::Result<T, MetricsError>;
