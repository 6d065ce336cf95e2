use std::path::PathBuf;

use thiserror::Error;

/// Problems found while loading or validating the character table.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("theme catalog parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed reading theme catalog {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid theme id '{0}' (expected lowercase [a-z0-9_])")]
    InvalidId(String),

    #[error("duplicate theme id '{0}'")]
    DuplicateId(String),

    #[error("theme id '{0}' is reserved")]
    ReservedId(String),

    #[error("friend theme '{id}' is missing {field}")]
    MissingField { id: String, field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThemeError {
    #[error("unknown theme '{0}'")]
    Unknown(String),
}

/// Raised only for navigation requests outside the fixed page set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Invalid page: {0}")]
    InvalidPage(String),
}
