//! # edim importer
//!
//! Derives dimension catalogs and per-program dimension assignments from a
//! legacy programme export and writes them through the edim tag store.
//!
//! - [`source`]: the export format
//! - [`importer`]: derivation rules (default and per-event)
//! - [`job`]: the import run

pub mod error;
pub mod importer;
pub mod job;
pub mod source;

pub use error::{ImportError, Result};
pub use importer::{DefaultImporter, DerivedDimensions, ImportContext, Importer, TraconImporter};
pub use job::{run_import, ImportFailure, ImportOptions, ImportReport};
pub use source::SourceCatalog;
