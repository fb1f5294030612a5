//! # terrane-rdbc
//!
//! Relational backend connectivity for the Terrane graph storage engine.
//!
//! This crate is the connection/session layer between the storage framework
//! and a relational database: it parses textual connection targets, maintains
//! a registry of shared connection pools keyed by target and credential, and
//! binds one transactional session per worker with batched execution and a
//! prepared-statement cache.
//!
//! ## Features
//!
//! - **Lenient target grammar**: driver connection strings that do not comply
//!   with standard URL syntax parse into a structured, ordered descriptor
//! - **Shared pooling**: one physical pool per `(target, credential)` key,
//!   created at most once and validated with a configurable query
//! - **Worker-bound sessions**: one session and one connection per worker,
//!   with stale-handle detection and forced reset
//! - **Batched transactions**: prepared-statement caching, batch accumulation
//!   and explicit commit/rollback/reset state transitions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use terrane_rdbc::prelude::*;
//!
//! let registry = Arc::new(PoolRegistry::new());
//! registry.register_driver(Arc::new(MyDriverFactory)).await;
//!
//! let config = BackendConfig::new("mysql", "mysql://db.internal:3306/graph")
//!     .with_credentials("terrane", "secret")
//!     .with_max_active(16);
//!
//! let sessions = SessionPool::new(registry, config, "graph", "vertices");
//! sessions.open().await?;
//! sessions.create_database().await?;
//!
//! let session = sessions.session(WorkerId::new(1)).await?;
//! session.begin().await?;
//! let stmt = session.prepare_statement("INSERT INTO vertices VALUES (?, ?)").await?;
//! stmt.set_parameters(&[SqlValue::Int(1), SqlValue::Text("person".into())]).await?;
//! session.add(stmt.as_ref()).await?;
//! let updated = session.commit().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod descriptor;
pub mod error;
pub mod pool;
pub mod security;
pub mod session;
pub mod types;

/// Prelude module for convenient imports
pub mod prelude {
    // Error types
    pub use crate::error::{Error, ErrorCategory, Result};

    // Value and row types
    pub use crate::types::{Row, SqlValue};

    // Descriptor and configuration
    pub use crate::config::{BackendConfig, Credentials, DEFAULT_PORT};
    pub use crate::descriptor::ConnectDescriptor;

    // Driver-facing traits
    pub use crate::connection::{Connection, ConnectionFactory, PreparedStatement};

    // Pool types
    pub use crate::pool::{
        ConnectionPool, PoolOptions, PoolRegistry, PoolStats, PooledConnection, WorkerId,
    };

    // Session types
    pub use crate::session::{Session, SessionPool};
}

// Re-export commonly used items at crate root
pub use config::BackendConfig;
pub use descriptor::ConnectDescriptor;
pub use error::{Error, Result};
pub use pool::{PoolRegistry, WorkerId};
pub use session::{Session, SessionPool};
