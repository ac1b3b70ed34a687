use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::async_executor::DEFAULT_WORKERS;
use crate::backend::{BackendDescriptor, BackendKind, BatchMode, resolve};
use crate::error::DbError;

const DEFAULT_POOL_MIN_SIZE: u32 = 1;
const DEFAULT_POOL_MAX_SIZE: u32 = 4;
const DEFAULT_LEASE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

fn default_pool_min_size() -> u32 {
    DEFAULT_POOL_MIN_SIZE
}

fn default_pool_max_size() -> u32 {
    DEFAULT_POOL_MAX_SIZE
}

fn default_lease_timeout_ms() -> u64 {
    DEFAULT_LEASE_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_true() -> bool {
    true
}

/// Settings for one configured database instance, as handed over by the
/// host's configuration loader.
///
/// ```rust
/// use sql_bridge::prelude::*;
///
/// let cfg = DatabaseConfig::from_json_str(
///     r#"{ "backendKind": "embedded-file", "filePath": "data/points.db", "poolMaxSize": 2 }"#,
/// )?;
/// assert_eq!(cfg.pool_max_size, 2);
/// # Ok::<(), DbError>(())
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub backend_kind: BackendKind,
    /// Database file (embedded file backend only).
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_pool_min_size")]
    pub pool_min_size: u32,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    /// How long a networked lease waits before failing. Embedded kinds wait
    /// in slices of this length until a handle frees up.
    #[serde(default = "default_lease_timeout_ms")]
    pub pool_lease_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Overrides the backend's default batch behavior.
    #[serde(default)]
    pub batch_mode: Option<BatchMode>,
    /// Rewrite placeholders into the backend's native style.
    #[serde(default = "default_true")]
    pub translate_placeholders: bool,
    /// Size of the worker pool used for asynchronous execution.
    #[serde(default = "default_workers")]
    pub async_workers: usize,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("backend_kind", &self.backend_kind)
            .field("file_path", &self.file_path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("pool_min_size", &self.pool_min_size)
            .field("pool_max_size", &self.pool_max_size)
            .field("pool_lease_timeout_ms", &self.pool_lease_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("batch_mode", &self.batch_mode)
            .field("translate_placeholders", &self.translate_placeholders)
            .field("async_workers", &self.async_workers)
            .finish()
    }
}

impl DatabaseConfig {
    /// Configuration with defaults for `kind`; location fields still need to be set.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            backend_kind: kind,
            file_path: None,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            pool_min_size: DEFAULT_POOL_MIN_SIZE,
            pool_max_size: DEFAULT_POOL_MAX_SIZE,
            pool_lease_timeout_ms: DEFAULT_LEASE_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            batch_mode: None,
            translate_placeholders: true,
            async_workers: DEFAULT_WORKERS,
        }
    }

    #[must_use]
    pub fn builder(kind: BackendKind) -> DatabaseConfigBuilder {
        DatabaseConfigBuilder::new(kind)
    }

    /// Shorthand for an embedded file database.
    #[must_use]
    pub fn embedded_file(path: impl Into<PathBuf>) -> Self {
        Self::builder(BackendKind::EmbeddedFile).file_path(path).finish()
    }

    /// Shorthand for a private in-memory database.
    #[must_use]
    pub fn embedded_memory() -> Self {
        Self::new(BackendKind::EmbeddedMemory)
    }

    /// Parse the loader's JSON payload and validate it.
    ///
    /// # Errors
    /// Returns [`DbError::Config`] if the payload is malformed or invalid.
    pub fn from_json_str(json: &str) -> Result<Self, DbError> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| DbError::Config(format!("invalid database config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub fn descriptor(&self) -> BackendDescriptor {
        resolve(self.backend_kind)
    }

    /// Batch behavior after applying the per-instance override.
    #[must_use]
    pub fn effective_batch_mode(&self) -> BatchMode {
        self.batch_mode
            .unwrap_or_else(|| self.descriptor().batch_mode)
    }

    /// Pool bounds after applying backend constraints: the in-memory backend
    /// always runs on exactly one shared connection.
    #[must_use]
    pub fn effective_pool_bounds(&self) -> (u32, u32) {
        if self.descriptor().single_connection {
            (1, 1)
        } else {
            (self.pool_min_size, self.pool_max_size)
        }
    }

    #[must_use]
    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_lease_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check that the settings are usable for the configured backend.
    ///
    /// # Errors
    /// Returns [`DbError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.pool_max_size == 0 {
            return Err(DbError::Config("poolMaxSize must be at least 1".into()));
        }
        if self.pool_min_size > self.pool_max_size {
            return Err(DbError::Config(format!(
                "poolMinSize ({}) exceeds poolMaxSize ({})",
                self.pool_min_size, self.pool_max_size
            )));
        }
        if self.pool_lease_timeout_ms == 0 {
            return Err(DbError::Config(
                "poolLeaseTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.async_workers == 0 {
            return Err(DbError::Config("asyncWorkers must be at least 1".into()));
        }
        self.credentials().map(|_| ())
    }

    /// Connection parameters for the configured backend.
    ///
    /// # Errors
    /// Returns [`DbError::Config`] when a required location field is missing.
    pub fn credentials(&self) -> Result<Credentials, DbError> {
        match self.backend_kind {
            BackendKind::EmbeddedFile => {
                let path = self.file_path.clone().ok_or_else(|| {
                    DbError::Config("filePath is required for embedded-file".into())
                })?;
                if path.as_os_str().is_empty() {
                    return Err(DbError::Config("filePath must not be empty".into()));
                }
                Ok(Credentials::File { path })
            }
            BackendKind::EmbeddedMemory => Ok(Credentials::Memory),
            BackendKind::NetworkedPrimary | BackendKind::NetworkedCompatible => {
                let required = |field: &Option<String>, name: &str| {
                    field
                        .clone()
                        .filter(|v| !v.is_empty())
                        .ok_or_else(|| {
                            DbError::Config(format!(
                                "{name} is required for {}",
                                self.backend_kind
                            ))
                        })
                };
                let port = self
                    .port
                    .or(self.descriptor().default_port)
                    .ok_or_else(|| DbError::Config("port is required".into()))?;
                Ok(Credentials::Server(ServerCredentials {
                    host: required(&self.host, "host")?,
                    port,
                    database: required(&self.database, "database")?,
                    username: required(&self.username, "username")?,
                    password: self.password.clone().unwrap_or_default(),
                    connect_timeout: self.connect_timeout(),
                }))
            }
        }
    }
}

/// Fluent builder for [`DatabaseConfig`].
#[derive(Debug, Clone)]
pub struct DatabaseConfigBuilder {
    cfg: DatabaseConfig,
}

impl DatabaseConfigBuilder {
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            cfg: DatabaseConfig::new(kind),
        }
    }

    #[must_use]
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cfg.file_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.cfg.host = Some(host.into());
        self.cfg.port = Some(port);
        self
    }

    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.cfg.database = Some(database.into());
        self
    }

    #[must_use]
    pub fn login(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.cfg.username = Some(username.into());
        self.cfg.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn pool_size(mut self, min: u32, max: u32) -> Self {
        self.cfg.pool_min_size = min;
        self.cfg.pool_max_size = max;
        self
    }

    #[must_use]
    pub fn lease_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.pool_lease_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn batch_mode(mut self, mode: BatchMode) -> Self {
        self.cfg.batch_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn translation(mut self, translate_placeholders: bool) -> Self {
        self.cfg.translate_placeholders = translate_placeholders;
        self
    }

    #[must_use]
    pub fn async_workers(mut self, workers: usize) -> Self {
        self.cfg.async_workers = workers;
        self
    }

    /// Return the configuration without validating it.
    #[must_use]
    pub fn finish(self) -> DatabaseConfig {
        self.cfg
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    /// Returns [`DbError::Config`] if validation fails.
    pub fn build(self) -> Result<DatabaseConfig, DbError> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// What a driver needs to open one physical connection.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    File { path: PathBuf },
    Memory,
    Server(ServerCredentials),
}

#[derive(Clone, PartialEq, Eq)]
pub struct ServerCredentials {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub connect_timeout: Duration,
}

impl Credentials {
    /// Location part of a connection URL, without any secret.
    #[must_use]
    pub fn location(&self) -> String {
        match self {
            Credentials::File { path } => path.display().to_string(),
            Credentials::Memory => String::new(),
            Credentials::Server(server) => format!(
                "{}@{}:{}/{}",
                server.username, server.host, server.port, server.database
            ),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::File { path } => f.debug_struct("File").field("path", path).finish(),
            Credentials::Memory => f.write_str("Memory"),
            Credentials::Server(server) => f.debug_tuple("Server").field(server).finish(),
        }
    }
}

impl fmt::Debug for ServerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}
