//! Unified error handling for the model layer.

use dynadoc_engine::ErrorKind;

/// Failure reported by a store client.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed store response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub const RESOURCE_IN_USE: &'static str = "ResourceInUseException";
    pub const RESOURCE_NOT_FOUND: &'static str = "ResourceNotFoundException";
    pub const CONDITIONAL_CHECK_FAILED: &'static str = "ConditionalCheckFailedException";
    pub const VALIDATION: &'static str = "ValidationException";
    /// Batch requests the store kept returning as unprocessed.
    pub const UNPROCESSED: &'static str = "UnprocessedItems";

    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Error code reported by the store, if it answered at all.
    pub fn code(&self) -> Option<&str> {
        match self {
            StoreError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The table being created already exists.
    pub fn is_resource_in_use(&self) -> bool {
        self.code() == Some(Self::RESOURCE_IN_USE)
    }

    /// A condition expression evaluated to false.
    pub fn is_conditional_check_failed(&self) -> bool {
        self.code() == Some(Self::CONDITIONAL_CHECK_FAILED)
    }
}

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] dynadoc_engine::Error),

    #[error("database error during {operation}: {source}")]
    Database {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl Error {
    /// Wrap a store failure raised by `operation`.
    pub fn database(operation: &'static str, source: StoreError) -> Self {
        Error::Database { operation, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Engine(e) => e.kind(),
            Error::Database { .. } => ErrorKind::Database,
        }
    }
}

/// Result type alias for model operations.
pub type Result<T> = std::result::Result<T, Error>;
