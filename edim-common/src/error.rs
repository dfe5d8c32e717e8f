//! Common error types for edim

use std::fmt;

use thiserror::Error;

/// Common result type for edim operations
pub type Result<T> = std::result::Result<T, Error>;

/// A dimension or dimension value slug that could not be resolved against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSlug {
    pub dimension: String,
    /// `None` when the dimension itself is unknown
    pub value: Option<String>,
}

impl UnresolvedSlug {
    pub fn dimension(dimension: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: None,
        }
    }

    pub fn value(dimension: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            value: Some(value.into()),
        }
    }
}

impl fmt::Display for UnresolvedSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.dimension, value),
            None => write!(f, "{}", self.dimension),
        }
    }
}

fn join_unresolved(slugs: &[UnresolvedSlug]) -> String {
    slugs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Common error types across edim crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column or payload could not be (de)serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored identifier is not a valid UUID
    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] uuid::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Assignment map references dimensions or values missing from the catalog
    #[error("Unknown dimension or value: {}", join_unresolved(.0))]
    UnresolvedSlugs(Vec<UnresolvedSlug>),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_slugs_lists_every_key() {
        let err = Error::UnresolvedSlugs(vec![
            UnresolvedSlug::dimension("nonexistent"),
            UnresolvedSlug::value("room", "attic"),
        ]);

        assert_eq!(
            err.to_string(),
            "Unknown dimension or value: nonexistent, room=attic"
        );
    }
}
