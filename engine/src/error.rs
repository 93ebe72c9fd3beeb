//! Error types for the dynadoc engine.

use thiserror::Error;

/// Application-level error kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Value failed a schema check, or could not be represented on the wire.
    DataFormat,
    /// The document already exists.
    Permission,
    /// The request needs a capability this layer does not offer.
    NotImplemented,
    /// The underlying store failed.
    Database,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::DataFormat => write!(f, "DataFormatError"),
            ErrorKind::Permission => write!(f, "PermissionError"),
            ErrorKind::NotImplemented => write!(f, "NotImplementedError"),
            ErrorKind::Database => write!(f, "DatabaseError"),
        }
    }
}

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("data format error: {0}")]
    DataFormat(String),

    #[error("validation failed for '{path}': {message}")]
    Validation { path: String, message: String },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

impl Error {
    /// Shorthand for a [`Error::DataFormat`] error.
    pub fn data_format(message: impl Into<String>) -> Self {
        Error::DataFormat(message.into())
    }

    /// The error kind this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DataFormat(_) | Error::Validation { .. } => ErrorKind::DataFormat,
            Error::Permission(_) => ErrorKind::Permission,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
        }
    }

    /// The document path a validation error refers to, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::Validation { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::Permission("document with _id \"x\" already exists".into());
        assert_eq!(
            err.to_string(),
            "permission denied: document with _id \"x\" already exists"
        );

        let err = Error::Validation {
            path: "age".into(),
            message: "Path `age` is required.".into(),
        };
        assert_eq!(
            err.to_string(),
            "validation failed for 'age': Path `age` is required."
        );
    }

    #[test]
    fn error_kinds() {
        assert_eq!(Error::data_format("bad").kind(), ErrorKind::DataFormat);
        let validation = Error::Validation {
            path: "name".into(),
            message: "bad".into(),
        };
        assert_eq!(validation.kind(), ErrorKind::DataFormat);
        assert_eq!(validation.path(), Some("name"));
        assert_eq!(
            Error::NotImplemented("$text".into()).kind(),
            ErrorKind::NotImplemented
        );
        assert_eq!(ErrorKind::Permission.to_string(), "PermissionError");
    }
}
