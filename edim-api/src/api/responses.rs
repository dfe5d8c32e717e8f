//! Survey response dimension endpoints
//!
//! The dimensions box of a response submits one field per dimension. A field
//! may be a single select (`"room": "iso-sali"`) or a multi select
//! (`"signup": ["konsti", "tickets"]` or checkbox keys `"signup.konsti": "on"`)
//! depending on how many values the dimension allows or already has, so every
//! dimension is read both ways and the results are merged. The merged map
//! replaces all of the response's tags.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::get,
    Json, Router,
};
use edim_common::api::{AccessAction, AccessScope};
use edim_common::db::surveys::{load_response, load_survey};
use edim_common::db::{Event, Response};
use edim_common::tags::{
    build_upsert_cache, set_dimension_values, value_slugs_for, AssignmentMap, CachedDimensions,
    ReconcileScope, TaggedEntity, UpsertCache,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use super::{authorize, load_event, ApiKey};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct UpdateResponseDimensions {
    pub form_data: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct ResponseDimensionsResponse {
    pub response: Uuid,
    pub dimensions: CachedDimensions,
}

/// Read one dimension as a single select
fn single_select(slug: &str, form_data: &Map<String, Value>, warnings: &mut Vec<String>) -> Option<String> {
    match form_data.get(slug) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()).filter(|v| !v.is_empty()),
        // Lists are the multi select reading
        Some(Value::Array(_)) => None,
        Some(_) => {
            warnings.push(format!("{}: expected a value slug", slug));
            None
        }
    }
}

/// Read one dimension as a multi select: a list under the slug plus checkbox keys
fn multi_select(slug: &str, form_data: &Map<String, Value>, warnings: &mut Vec<String>) -> Vec<String> {
    let mut values = Vec::new();

    if let Some(Value::Array(items)) = form_data.get(slug) {
        for item in items {
            match item {
                Value::String(value) if !value.is_empty() => values.push(value.clone()),
                Value::String(_) | Value::Null => {}
                _ => warnings.push(format!("{}: expected a list of value slugs", slug)),
            }
        }
    }

    let prefix = format!("{}.", slug);
    for (key, checked) in form_data {
        let Some(value) = key.strip_prefix(&prefix) else {
            continue;
        };
        let checked = match checked {
            Value::Bool(b) => *b,
            Value::String(s) => matches!(s.as_str(), "on" | "true" | "1"),
            _ => false,
        };
        if checked && !value.is_empty() {
            values.push(value.to_string());
        }
    }

    values
}

/// Turn submitted form data into a full assignment map over the event's catalog
///
/// Every catalog dimension is present in the result, empty when nothing was
/// submitted for it. Values not in the catalog are collected and reported
/// together; keys that name no dimension are ignored.
pub fn process_form_data(
    cache: &UpsertCache,
    form_data: &Map<String, Value>,
) -> Result<AssignmentMap, Vec<String>> {
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut warnings = Vec::new();

    let mut slugs: Vec<&str> = cache.dimensions_by_slug.keys().map(String::as_str).collect();
    slugs.sort_unstable();

    for slug in slugs {
        let mut candidates = Vec::new();
        candidates.extend(single_select(slug, form_data, &mut warnings));
        candidates.extend(multi_select(slug, form_data, &mut warnings));

        let values = merged.entry(slug.to_string()).or_default();
        for value in candidates {
            if cache.value(slug, &value).is_none() {
                warnings.push(format!("{}={}", slug, value));
            } else if !values.contains(&value) {
                values.push(value);
            }
        }
    }

    if !warnings.is_empty() {
        return Err(warnings);
    }
    Ok(merged.into_iter().collect())
}

async fn find_response(
    state: &AppState,
    event: &Event,
    survey_slug: &str,
    response_id: Uuid,
) -> ApiResult<Response> {
    let survey = load_survey(&state.db, event.guid, survey_slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("survey '{}'", survey_slug)))?;

    load_response(&state.db, survey.guid, response_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("response {}", response_id)))
}

/// GET /api/events/:event/surveys/:survey/responses/:response/dimensions
pub async fn get_response_dimensions(
    State(state): State<AppState>,
    Path((event_slug, survey_slug, response_id)): Path<(String, String, Uuid)>,
    key: ApiKey,
) -> ApiResult<Json<ResponseDimensionsResponse>> {
    let event = load_event(&state, &event_slug).await?;
    authorize(&state, &key, &event, AccessScope::Response, AccessAction::Query).await?;

    let response = find_response(&state, &event, &survey_slug, response_id).await?;
    let dimensions = value_slugs_for(&state.db, response.tag_owner()).await?;

    Ok(Json(ResponseDimensionsResponse {
        response: response.guid,
        dimensions,
    }))
}

/// POST /api/events/:event/surveys/:survey/responses/:response/dimensions
pub async fn update_response_dimensions(
    State(state): State<AppState>,
    Path((event_slug, survey_slug, response_id)): Path<(String, String, Uuid)>,
    key: ApiKey,
    payload: Result<Json<UpdateResponseDimensions>, JsonRejection>,
) -> ApiResult<Json<ResponseDimensionsResponse>> {
    let event = load_event(&state, &event_slug).await?;
    authorize(&state, &key, &event, AccessScope::Response, AccessAction::Mutation).await?;
    let Json(input) = payload?;

    let response = find_response(&state, &event, &survey_slug, response_id).await?;
    let cache = build_upsert_cache(&state.db, event.guid).await?;

    let assignments = process_form_data(&cache, &input.form_data).map_err(|warnings| {
        warn!("Rejected dimensions for response {}: {}", response.guid, warnings.join(", "));
        ApiError::Validation(warnings)
    })?;

    let outcome =
        set_dimension_values(&state.db, &response, &assignments, &cache, ReconcileScope::Entire).await?;
    info!(
        "Response {}: {} tags written, {} removed",
        response.guid, outcome.upserted, outcome.deleted
    );

    let dimensions = value_slugs_for(&state.db, response.tag_owner()).await?;
    Ok(Json(ResponseDimensionsResponse {
        response: response.guid,
        dimensions,
    }))
}

/// Build survey response routes
pub fn response_routes() -> Router<AppState> {
    Router::new().route(
        "/api/events/:event/surveys/:survey/responses/:response/dimensions",
        get(get_response_dimensions).post(update_response_dimensions),
    )
}
