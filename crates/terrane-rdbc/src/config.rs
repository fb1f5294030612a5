//! Configuration surface consumed by the pool and session layers.
//!
//! Loading and validating configuration files belongs to the outer storage
//! framework; this crate only consumes the resolved values.

use serde::{Deserialize, Serialize};

/// Default port of the relational backend protocol.
pub const DEFAULT_PORT: u16 = 3306;

/// Username and password handed to the driver factory.
///
/// `Debug` redacts the password so connection setup can be traced safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name
    pub username: String,
    password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The password (never logged)
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Resolved backend configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registered driver identifier (e.g. `mysql`)
    pub driver: String,
    /// Textual connection target, parsed by [`crate::ConnectDescriptor`]
    pub url: String,
    /// Account name
    pub username: String,
    password: String,
    /// Default SSL/TLS mode injected as `useSSL` when the target omits it
    pub ssl_mode: String,
    /// Maximum concurrently borrowed connections per pool
    pub max_active: usize,
    /// Idle connections kept ready
    pub min_idle: usize,
    /// Validate idle connections before handing them out
    pub keep_alive: bool,
    /// Milliseconds to wait for a free connection before giving up
    pub acquire_timeout_ms: u64,
    /// Query run once against a fresh connection when a pool is created
    pub validation_query: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".into(),
            url: String::new(),
            username: String::new(),
            password: String::new(),
            ssl_mode: "false".into(),
            max_active: 10,
            min_idle: 1,
            keep_alive: true,
            acquire_timeout_ms: 30_000,
            validation_query: "SELECT 1".into(),
        }
    }
}

impl BackendConfig {
    /// Create a configuration for a driver and connection target
    pub fn new(driver: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set username and password
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// Set the default SSL/TLS mode
    pub fn with_ssl_mode(mut self, mode: impl Into<String>) -> Self {
        self.ssl_mode = mode.into();
        self
    }

    /// Set the maximum number of concurrently borrowed connections
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    /// Set the number of idle connections kept ready
    pub fn with_min_idle(mut self, min_idle: usize) -> Self {
        self.min_idle = min_idle;
        self
    }

    /// Enable or disable idle-connection validation on borrow
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Set the acquire timeout in milliseconds
    pub fn with_acquire_timeout_ms(mut self, ms: u64) -> Self {
        self.acquire_timeout_ms = ms;
        self
    }

    /// Set the pool validation query
    pub fn with_validation_query(mut self, sql: impl Into<String>) -> Self {
        self.validation_query = sql.into();
        self
    }

    /// Credentials for the driver factory
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.username.clone(), self.password.clone())
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ssl_mode", &self.ssl_mode)
            .field("max_active", &self.max_active)
            .field("min_idle", &self.min_idle)
            .field("keep_alive", &self.keep_alive)
            .field("acquire_timeout_ms", &self.acquire_timeout_ms)
            .field("validation_query", &self.validation_query)
            .finish()
    }
}
