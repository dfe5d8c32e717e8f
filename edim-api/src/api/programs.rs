//! Program dimension endpoints
//!
//! PATCH reconciles only the dimensions named in the body; an empty list
//! clears that dimension. Other dimensions of the program are left alone.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use edim_common::api::{AccessAction, AccessScope};
use edim_common::db::programs::load_program;
use edim_common::db::Program;
use edim_common::tags::{
    build_upsert_cache, set_dimension_values, value_slugs_for, AssignmentMap, CachedDimensions,
    ReconcileScope, TaggedEntity,
};
use serde::Serialize;
use tracing::info;

use super::{authorize, load_event, ApiKey};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
pub struct ProgramDimensionsResponse {
    pub program: String,
    pub dimensions: CachedDimensions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upserted: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<u64>,
}

async fn find_program(state: &AppState, event_id: uuid::Uuid, slug: &str) -> ApiResult<Program> {
    load_program(&state.db, event_id, slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("program '{}'", slug)))
}

/// GET /api/events/:event/programs/:program/dimensions
pub async fn get_program_dimensions(
    State(state): State<AppState>,
    Path((event_slug, program_slug)): Path<(String, String)>,
    key: ApiKey,
) -> ApiResult<Json<ProgramDimensionsResponse>> {
    let event = load_event(&state, &event_slug).await?;
    authorize(&state, &key, &event, AccessScope::Program, AccessAction::Query).await?;

    let program = find_program(&state, event.guid, &program_slug).await?;
    let dimensions = value_slugs_for(&state.db, program.tag_owner()).await?;

    Ok(Json(ProgramDimensionsResponse {
        program: program.slug,
        dimensions,
        upserted: None,
        deleted: None,
    }))
}

/// PATCH /api/events/:event/programs/:program/dimensions
pub async fn patch_program_dimensions(
    State(state): State<AppState>,
    Path((event_slug, program_slug)): Path<(String, String)>,
    key: ApiKey,
    payload: Result<Json<AssignmentMap>, JsonRejection>,
) -> ApiResult<Json<ProgramDimensionsResponse>> {
    let event = load_event(&state, &event_slug).await?;
    authorize(&state, &key, &event, AccessScope::Program, AccessAction::Mutation).await?;
    let Json(assignments) = payload?;

    let program = find_program(&state, event.guid, &program_slug).await?;
    let cache = build_upsert_cache(&state.db, event.guid).await?;
    let outcome =
        set_dimension_values(&state.db, &program, &assignments, &cache, ReconcileScope::Listed).await?;

    info!(
        "Program {}/{}: {} tags written, {} removed",
        event.slug, program.slug, outcome.upserted, outcome.deleted
    );

    let dimensions = value_slugs_for(&state.db, program.tag_owner()).await?;
    Ok(Json(ProgramDimensionsResponse {
        program: program.slug,
        dimensions,
        upserted: Some(outcome.upserted),
        deleted: Some(outcome.deleted),
    }))
}

/// Build program routes
pub fn program_routes() -> Router<AppState> {
    Router::new().route(
        "/api/events/:event/programs/:program/dimensions",
        get(get_program_dimensions).patch(patch_program_dimensions),
    )
}
