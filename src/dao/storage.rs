use std::{error::Error, fmt};

use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Kind of access checked against the store's permission rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Reading or subscribing to a path.
    Read,
    /// Setting, updating, pushing or removing a path.
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

/// Error raised by store backends regardless of the underlying technology.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed while serving the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The path's access rules rejected the caller.
    #[error("permission denied: {access} on `{path}`")]
    PermissionDenied { access: Access, path: String },
    /// Nothing is stored at the requested path.
    #[error("no data available on path `{path}`")]
    NoData { path: String },
    /// A write was attempted with a null payload.
    #[error("no data present for write on `{path}`")]
    EmptyWrite { path: String },
    /// No device identity is signed in.
    #[error("no identity present")]
    Unauthenticated,
    /// A stored value could not be converted to or from its model.
    #[error("failed to convert value at `{path}`")]
    Serialization {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether this error only reports a missing value.
    pub fn is_no_data(&self) -> bool {
        matches!(self, StorageError::NoData { .. })
    }
}
