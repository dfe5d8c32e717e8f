//! # edim common library
//!
//! Shared code for the event dimension services:
//! - Database initialization, migrations and persisted records
//! - Dimension catalog (dimensions and their values)
//! - Tag store and bulk upsert engine
//! - Configuration loading
//! - API key authorization primitives
//! - Slug and localized text helpers

pub mod api;
pub mod config;
pub mod db;
pub mod dimensions;
pub mod error;
pub mod localized;
pub mod slug;
pub mod tags;

pub use error::{Error, Result, UnresolvedSlug};
pub use localized::LocalizedText;
