//! HTTP API handlers for edim-api

pub mod auth;
pub mod dimensions;
pub mod health;
pub mod programs;
pub mod responses;

pub use auth::{authorize, ApiKey};
pub use dimensions::dimension_routes;
pub use health::health_routes;
pub use programs::program_routes;
pub use responses::response_routes;

use crate::{ApiError, ApiResult, AppState};
use edim_common::db::events::load_event_by_slug;
use edim_common::db::Event;

/// Look up the event named in a request path
pub(crate) async fn load_event(state: &AppState, slug: &str) -> ApiResult<Event> {
    load_event_by_slug(&state.db, slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("event '{}'", slug)))
}
