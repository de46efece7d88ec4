//! Error types for the Reefline reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of a tick:
//! configuration, state persistence, cloud API calls, and reconciliation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::resource::ResourceKind;

/// The main error type for Reefline.
#[derive(Debug, Error)]
pub enum ReeflineError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Cloud API errors that were not scoped to a reconcile operation.
    #[error("Cloud API error: {0}")]
    Cloud(#[from] CloudError),

    /// Reconciliation errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The manifest file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The manifest could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Two resources share a logical name.
    #[error("Duplicate resource name: {name}")]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// State files could not be written.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the I/O failure.
        message: String,
    },

    /// Serialization error.
    #[error("State serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },

    /// State version mismatch.
    #[error("State version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected state version.
        expected: String,
        /// Found state version.
        found: String,
    },
}

/// Errors returned by external clients.
///
/// Whenever the remote answered, the HTTP status is carried so the
/// classifier can tell not-found apart from other failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// The API answered with a non-success status.
    #[error("API request failed: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Rate limited.
    #[error("API rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The request never produced a response.
    #[error("network error: {message}")]
    Network {
        /// Description of the network error.
        message: String,
    },

    /// The response body could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// An argument was rejected before any request was sent.
    #[error("{argument} is invalid because {reason}")]
    InvalidArgument {
        /// Name of the offending argument.
        argument: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The client does not implement this operation for the kind.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Name of the unsupported operation.
        operation: String,
    },
}

/// The engine step during which a cloud call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Fetching the remote object.
    Observe,
    /// Creating the remote object.
    Create,
    /// Updating the remote object.
    Update,
    /// Deleting the remote object.
    Delete,
    /// Fetching extra connection material.
    ConnectionDetails,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Observe => "observe",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ConnectionDetails => "fetch connection details for",
        };
        write!(f, "{s}")
    }
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A cloud call failed during one engine step.
    #[error("cannot {operation} {kind}: {source}")]
    Operation {
        /// Kind of the resource.
        kind: ResourceKind,
        /// Step that failed.
        operation: Operation,
        /// Underlying client error.
        #[source]
        source: CloudError,
    },

    /// The tick was cancelled before the step ran.
    #[error("{operation} of {kind} cancelled")]
    Cancelled {
        /// Kind of the resource.
        kind: ResourceKind,
        /// Step that was skipped.
        operation: Operation,
    },

    /// Neither an external name nor a resource name was available.
    #[error("a name is required to create a {kind}")]
    NameRequired {
        /// Kind of the resource.
        kind: ResourceKind,
    },

    /// Create was requested although an identity already exists.
    #[error("{kind} already has identity {identity}")]
    IdentityAlreadyAssigned {
        /// Kind of the resource.
        kind: ResourceKind,
        /// The identity already held.
        identity: String,
    },

    /// The manifest changed the kind of an existing resource.
    #[error("resource '{name}' changed kind from {recorded} to {declared}")]
    KindChanged {
        /// Logical resource name.
        name: String,
        /// Kind stored in state.
        recorded: ResourceKind,
        /// Kind declared in the manifest.
        declared: ResourceKind,
    },

    /// Stored observation could not be decoded.
    #[error("stored observation for '{name}' is unreadable: {message}")]
    CorruptObservation {
        /// Logical resource name.
        name: String,
        /// Decoder message.
        message: String,
    },
}

/// Result type alias for Reefline operations.
pub type Result<T> = std::result::Result<T, ReeflineError>;

/// Result type alias for external client calls.
pub type CloudResult<T> = std::result::Result<T, CloudError>;

impl ReeflineError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the cloud error behind this error, if any.
    #[must_use]
    pub const fn cloud_error(&self) -> Option<&CloudError> {
        match self {
            Self::Cloud(e) | Self::Reconcile(ReconcileError::Operation { source: e, .. }) => {
                Some(e)
            }
            _ => None,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if let Some(e) = self.cloud_error() {
            return crate::resource::classify(e) == crate::resource::ErrorClass::Transient;
        }
        matches!(self, Self::State(StateError::LockFailed { .. }))
    }

    /// Returns the suggested retry delay in seconds, if applicable.
    #[must_use]
    pub fn retry_delay_secs(&self) -> Option<u64> {
        match self.cloud_error() {
            Some(CloudError::RateLimited { retry_after_secs }) => Some(*retry_after_secs),
            Some(_) if self.is_retryable() => Some(5),
            _ => match self {
                Self::State(StateError::LockFailed { .. }) => Some(2),
                _ => None,
            },
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl StateError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl CloudError {
    /// Creates an API error.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates the error the API returns for an empty or non-positive identifier.
    #[must_use]
    pub fn invalid_id(argument: &str) -> Self {
        Self::InvalidArgument {
            argument: argument.to_string(),
            reason: String::from("cannot be less than 1"),
        }
    }

    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl ReconcileError {
    /// Wraps a client error with the step it happened in.
    #[must_use]
    pub const fn operation(kind: ResourceKind, operation: Operation, source: CloudError) -> Self {
        Self::Operation {
            kind,
            operation,
            source,
        }
    }
}
