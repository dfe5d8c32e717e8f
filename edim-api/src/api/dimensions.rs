//! Dimension catalog endpoints
//!
//! - `GET /api/events/:event/dimensions[?lang=xx]`
//! - `PUT /api/events/:event/dimensions` with a JSON list of dimension specs

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use edim_common::api::{AccessAction, AccessScope};
use edim_common::dimensions::{list_dimensions, sync_catalog, DimensionSpec, DimensionWithValues, ValueOrdering};
use edim_common::LocalizedText;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{authorize, load_event, ApiKey};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    pub lang: Option<String>,
}

/// One dimension with effective display metadata on its values
#[derive(Debug, Serialize)]
pub struct DimensionResponse {
    pub slug: String,
    pub title: LocalizedText,
    pub color: String,
    pub icon: String,
    pub value_ordering: ValueOrdering,
    pub is_negative_selection: bool,
    pub is_list_filter: bool,
    pub is_shown_in_detail: bool,
    pub values: Vec<DimensionValueResponse>,
}

#[derive(Debug, Serialize)]
pub struct DimensionValueResponse {
    pub slug: String,
    pub title: LocalizedText,
    pub color: String,
    pub icon: String,
}

impl From<&DimensionWithValues> for DimensionResponse {
    fn from(entry: &DimensionWithValues) -> Self {
        let dimension = &entry.dimension;
        Self {
            slug: dimension.slug.clone(),
            title: dimension.title.clone(),
            color: dimension.color.clone(),
            icon: dimension.icon.clone(),
            value_ordering: dimension.value_ordering,
            is_negative_selection: dimension.is_negative_selection,
            is_list_filter: dimension.is_list_filter,
            is_shown_in_detail: dimension.is_shown_in_detail,
            values: entry
                .values
                .iter()
                .map(|value| DimensionValueResponse {
                    slug: value.slug.clone(),
                    title: value.title.clone(),
                    color: value.color(dimension).to_string(),
                    icon: value.icon(dimension).to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub dimensions_written: u64,
    pub values_written: u64,
    pub values_deleted: u64,
    pub dimensions: Vec<DimensionResponse>,
}

/// GET /api/events/:event/dimensions
pub async fn get_dimensions(
    State(state): State<AppState>,
    Path(event_slug): Path<String>,
    Query(query): Query<CatalogQuery>,
    key: ApiKey,
) -> ApiResult<Json<Vec<DimensionResponse>>> {
    let event = load_event(&state, &event_slug).await?;
    authorize(&state, &key, &event, AccessScope::Dimensions, AccessAction::Query).await?;

    let language = query.lang.as_deref().unwrap_or(&state.language);
    let catalog = list_dimensions(&state.db, event.guid, language).await?;

    Ok(Json(catalog.iter().map(DimensionResponse::from).collect()))
}

/// PUT /api/events/:event/dimensions
///
/// Dimensions left out of the body are kept; values left out of a listed
/// dimension's choices are deleted together with their tags.
pub async fn put_dimensions(
    State(state): State<AppState>,
    Path(event_slug): Path<String>,
    key: ApiKey,
    payload: Result<Json<Vec<DimensionSpec>>, JsonRejection>,
) -> ApiResult<Json<SyncResponse>> {
    let event = load_event(&state, &event_slug).await?;
    authorize(&state, &key, &event, AccessScope::Dimensions, AccessAction::Mutation).await?;
    let Json(specs) = payload?;

    let sync = sync_catalog(&state.db, event.guid, &specs).await?;
    info!(
        "Catalog of {} synced: {} dimensions written, {} values written, {} values deleted",
        event.slug, sync.dimensions_written, sync.values_written, sync.values_deleted
    );

    let catalog = list_dimensions(&state.db, event.guid, &state.language).await?;

    Ok(Json(SyncResponse {
        dimensions_written: sync.dimensions_written,
        values_written: sync.values_written,
        values_deleted: sync.values_deleted,
        dimensions: catalog.iter().map(DimensionResponse::from).collect(),
    }))
}

/// Build dimension catalog routes
pub fn dimension_routes() -> Router<AppState> {
    Router::new().route(
        "/api/events/:event/dimensions",
        get(get_dimensions).put(put_dimensions),
    )
}
