//! Error types for flapboard.
//!
//! Every error here is scoped to the single action that raised it. Nothing is
//! fatal to the process; callers surface the failure and carry on.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// The main error type for flapboard operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Validation Errors ===
    /// Input was rejected before any store call.
    #[error("invalid {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: &'static str,
        /// Description of the problem.
        message: String,
    },

    // === Store Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// A document addressed by id does not exist.
    #[error("{collection} document {id} not found")]
    NotFound {
        /// Logical collection name.
        collection: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    // === Identity Errors ===
    /// A write was attempted without a signed-in identity.
    #[error("sign-in required for this action")]
    NotAuthenticated,

    /// The identity provider rejected a request.
    #[error("authentication failed: {0}")]
    Auth(String),

    // === Generative Text Errors ===
    /// The generative-text service failed.
    #[error("text generation failed: {0}")]
    AiService(String),

    /// HTTP transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for flapboard operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a validation error for the given field.
    #[must_use]
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(collection: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    /// Create an identity provider error.
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a generative-text error.
    #[must_use]
    pub fn ai_service(message: impl Into<String>) -> Self {
        Self::AiService(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error was raised before touching the store.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// Check if this error came from the document store.
    #[must_use]
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
                | Self::NotFound { .. }
                | Self::StoreUnavailable(_)
        )
    }

    /// Check if this error means the caller must sign in first.
    #[must_use]
    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, Self::NotAuthenticated)
    }
}

/// Structured reply for a single user action.
///
/// Mirrors the `{ success, error }` shape the board front end expects, with an
/// optional `count` for bulk operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    /// Whether the action completed.
    pub success: bool,
    /// Failure message, present only when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of documents written, for bulk actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl ActionOutcome {
    /// A successful outcome with no count.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            count: None,
        }
    }

    /// A successful outcome reporting how many documents were written.
    #[must_use]
    pub fn with_count(count: usize) -> Self {
        Self {
            success: true,
            error: None,
            count: Some(count),
        }
    }

    /// A failed outcome carrying the error message.
    #[must_use]
    pub fn failed(err: &Error) -> Self {
        if err.is_store_error() {
            error!("store action failed: {}", err);
        }
        Self {
            success: false,
            error: Some(err.to_string()),
            count: None,
        }
    }
}

impl<T> From<&Result<T>> for ActionOutcome {
    fn from(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(err) => Self::failed(err),
        }
    }
}
