//! edim-api library interface
//!
//! HTTP surface over the dimension catalog and the tag store: catalog read and
//! sync, program tag reconciliation and survey response dimension submission.

pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Skip API key checks (development only)
    pub auth_disabled: bool,
    /// Language used for title ordering when a request names none
    pub language: String,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, auth_disabled: bool, language: impl Into<String>) -> Self {
        Self {
            db,
            auth_disabled,
            language: language.into(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::dimension_routes())
        .merge(api::program_routes())
        .merge(api::response_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
