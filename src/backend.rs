//! Static metadata for the closed set of supported backends.
//!
//! Adding a backend means adding a [`BackendKind`] variant and one arm in
//! [`resolve`]; the exhaustive `match` makes an unresolved kind a compile error.

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::translation::PlaceholderStyle;

/// The four interchangeable storage engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// `SQLite` database file, created on first use.
    #[serde(alias = "sqlite")]
    #[value(alias = "sqlite")]
    EmbeddedFile,
    /// Private in-memory `SQLite` database shared through one connection.
    #[serde(alias = "memory")]
    #[value(alias = "memory")]
    EmbeddedMemory,
    /// `PostgreSQL` server.
    #[serde(alias = "postgres", alias = "postgresql")]
    #[value(alias = "postgres", alias = "postgresql")]
    NetworkedPrimary,
    /// Server speaking the `PostgreSQL` wire protocol (`CockroachDB`, `YugabyteDB`, ...).
    #[serde(alias = "postgres-compatible", alias = "cockroachdb")]
    #[value(alias = "postgres-compatible", alias = "cockroachdb")]
    NetworkedCompatible,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::EmbeddedFile,
        BackendKind::EmbeddedMemory,
        BackendKind::NetworkedPrimary,
        BackendKind::NetworkedCompatible,
    ];

    #[must_use]
    pub const fn descriptor(self) -> BackendDescriptor {
        resolve(self)
    }

    #[must_use]
    pub const fn is_embedded(self) -> bool {
        resolve(self).is_embedded
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::EmbeddedFile => "embedded-file",
            BackendKind::EmbeddedMemory => "embedded-memory",
            BackendKind::NetworkedPrimary => "networked-primary",
            BackendKind::NetworkedCompatible => "networked-compatible",
        };
        f.write_str(name)
    }
}

/// How a backend applies a multi-statement batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchMode {
    /// All statements commit together or none do.
    Atomic,
    /// Statements apply one by one; execution stops at the first failure and
    /// earlier statements stay applied.
    Partial,
}

/// Metadata describing one backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    /// Identifier of the native driver used for this backend.
    pub driver_id: &'static str,
    /// Scheme prefix used when rendering connection URLs.
    pub url_prefix: &'static str,
    pub is_embedded: bool,
    /// Port used when the configuration does not name one.
    pub default_port: Option<u16>,
    pub batch_mode: BatchMode,
    /// Placeholder style the driver understands natively.
    pub placeholder_style: PlaceholderStyle,
    /// The backend is only reachable through one shared physical connection.
    pub single_connection: bool,
}

/// Resolve the static descriptor of a backend kind.
#[must_use]
pub const fn resolve(kind: BackendKind) -> BackendDescriptor {
    match kind {
        BackendKind::EmbeddedFile => BackendDescriptor {
            kind,
            driver_id: "rusqlite",
            url_prefix: "sqlite://",
            is_embedded: true,
            default_port: None,
            batch_mode: BatchMode::Atomic,
            placeholder_style: PlaceholderStyle::Sqlite,
            single_connection: false,
        },
        BackendKind::EmbeddedMemory => BackendDescriptor {
            kind,
            driver_id: "rusqlite",
            url_prefix: "sqlite::memory:",
            is_embedded: true,
            default_port: None,
            batch_mode: BatchMode::Atomic,
            placeholder_style: PlaceholderStyle::Sqlite,
            single_connection: true,
        },
        BackendKind::NetworkedPrimary => BackendDescriptor {
            kind,
            driver_id: "postgres",
            url_prefix: "postgresql://",
            is_embedded: false,
            default_port: Some(5432),
            batch_mode: BatchMode::Atomic,
            placeholder_style: PlaceholderStyle::Postgres,
            single_connection: false,
        },
        BackendKind::NetworkedCompatible => BackendDescriptor {
            kind,
            driver_id: "postgres-compatible",
            url_prefix: "postgres://",
            is_embedded: false,
            default_port: Some(26257),
            batch_mode: BatchMode::Partial,
            placeholder_style: PlaceholderStyle::Postgres,
            single_connection: false,
        },
    }
}

impl BackendDescriptor {
    /// Whether the native driver for this backend was compiled in.
    #[must_use]
    pub const fn driver_available(&self) -> bool {
        if self.is_embedded {
            cfg!(feature = "sqlite")
        } else {
            cfg!(feature = "postgres")
        }
    }

    /// Render a connection URL for logs. Passwords are never included.
    #[must_use]
    pub fn display_url(&self, location: &str) -> String {
        format!("{}{location}", self.url_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_total_and_consistent() {
        for kind in BackendKind::ALL {
            let descriptor = resolve(kind);
            assert_eq!(descriptor.kind, kind);
            assert_eq!(descriptor.is_embedded, descriptor.default_port.is_none());
            assert!(!descriptor.url_prefix.is_empty());
        }
    }

    #[test]
    fn only_memory_backend_is_single_connection() {
        let single: Vec<_> = BackendKind::ALL
            .into_iter()
            .filter(|kind| resolve(*kind).single_connection)
            .collect();
        assert_eq!(single, vec![BackendKind::EmbeddedMemory]);
    }

    #[test]
    fn parses_from_cli_names_and_aliases() {
        assert_eq!(
            BackendKind::from_str("embedded-file", true),
            Ok(BackendKind::EmbeddedFile)
        );
        assert_eq!(
            BackendKind::from_str("postgres", true),
            Ok(BackendKind::NetworkedPrimary)
        );
        assert!(BackendKind::from_str("oracle", true).is_err());
    }

    #[test]
    fn display_matches_serde_names() {
        for kind in BackendKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
        }
    }
}
