//! Error types for terrane-rdbc
//!
//! Provides structural error classification so callers branch on variants
//! instead of matching driver message text:
//! - Configuration-time errors (malformed descriptor)
//! - Connectivity errors (pool creation, validation, connection loss)
//! - Statement and transaction errors, carrying the offending SQL
//! - Classified tolerances (`AlreadyExists`, `Timeout`)

use std::fmt;
use thiserror::Error;

/// Result type for terrane-rdbc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connection-target grammar violation (fix the configuration)
    Descriptor,
    /// Connection-related errors (pool creation, validation, lost connection)
    Connection,
    /// Prepare/bind/execute error on one statement
    Statement,
    /// Commit/rollback errors
    Transaction,
    /// The object being created is already present
    AlreadyExists,
    /// The operation timed out
    Timeout,
    /// Unknown/other errors
    Other,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Descriptor => write!(f, "descriptor"),
            Self::Connection => write!(f, "connection"),
            Self::Statement => write!(f, "statement"),
            Self::Transaction => write!(f, "transaction"),
            Self::AlreadyExists => write!(f, "already_exists"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Main error type for terrane-rdbc
#[derive(Error, Debug)]
pub enum Error {
    /// The connection target text violates the descriptor grammar
    #[error("malformed descriptor: {message}")]
    MalformedDescriptor {
        /// What part of the grammar was violated
        message: String,
    },

    /// Connection failed (creation, validation or connectivity loss)
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable description
        message: String,
        /// Underlying driver error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Prepare/bind/execute failed for one statement
    #[error("statement error: {message}")]
    Statement {
        /// Human-readable description
        message: String,
        /// The offending SQL template, for diagnosis
        sql: Option<String>,
        /// Underlying driver error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Commit or rollback failed
    #[error("transaction error: {message}")]
    Transaction {
        /// Human-readable description
        message: String,
        /// Underlying driver error, if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The object being created already exists
    #[error("{object} already exists")]
    AlreadyExists {
        /// Name of the pre-existing object
        object: String,
    },

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout {
        /// What timed out
        message: String,
    },

    /// Internal error
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description
        message: String,
    },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedDescriptor { .. } => ErrorCategory::Descriptor,
            Self::Connection { .. } => ErrorCategory::Connection,
            Self::Statement { .. } => ErrorCategory::Statement,
            Self::Transaction { .. } => ErrorCategory::Transaction,
            Self::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error reports an already-existing object
    #[inline]
    pub fn is_already_exists(&self) -> bool {
        self.category() == ErrorCategory::AlreadyExists
    }

    /// Whether this error reports a timeout
    #[inline]
    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }

    /// Create a descriptor error
    pub fn descriptor(message: impl Into<String>) -> Self {
        Self::MalformedDescriptor {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a statement error
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a statement error carrying the offending SQL
    pub fn statement_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a statement error carrying the offending SQL and source
    pub fn statement_with_source(
        message: impl Into<String>,
        sql: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Statement {
            message: message.into(),
            sql: Some(sql.into()),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transaction error with source
    pub fn transaction_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transaction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(object: impl Into<String>) -> Self {
        Self::AlreadyExists {
            object: object.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
