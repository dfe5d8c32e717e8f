//! Import errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    /// Storage, catalog or resolution failure outside a single programme
    #[error(transparent)]
    Common(#[from] edim_common::Error),

    /// Transaction handling during programme writes
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Source export could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Source export is not valid JSON for the expected shape
    #[error("Invalid source data: {0}")]
    Source(#[from] serde_json::Error),

    /// Derivation for one programme failed
    #[error("Programme '{slug}': {source}")]
    Programme {
        slug: String,
        #[source]
        source: edim_common::Error,
    },
}
