//! Shared HTTP API functionality
//!
//! Only framework-independent pieces live here: API key hashing, issuance and
//! grant checks against the database. The HTTP service wraps them in its own
//! extractors.

pub mod auth;

pub use auth::{
    check_access, create_api_key, generate_api_key, grant, hash_api_key, AccessAction,
    AccessScope, ApiAuthError,
};
