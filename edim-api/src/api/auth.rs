//! Bearer key extraction and per-event access checks
//!
//! Handlers resolve the event from the path first, then call [`authorize`]
//! with the scope and action they are about to perform.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use edim_common::api::{check_access, AccessAction, AccessScope};
use edim_common::db::Event;
use std::convert::Infallible;
use tracing::warn;

use crate::{ApiResult, AppState};

/// API key from an `Authorization: Bearer <key>` header, if any
#[derive(Debug, Clone, Default)]
pub struct ApiKey(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ApiKey {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(ApiKey(key))
    }
}

/// Check the request's key against one event, scope and action
pub async fn authorize(
    state: &AppState,
    key: &ApiKey,
    event: &Event,
    scope: AccessScope,
    action: AccessAction,
) -> ApiResult<()> {
    if state.auth_disabled {
        return Ok(());
    }

    check_access(&state.db, key.0.as_deref(), event.guid, scope, action)
        .await
        .map_err(|e| {
            warn!("Access denied to {} {} on {}: {}", scope, action, event.slug, e);
            e.into()
        })
}
