//! Tag reads and cached aggregates
//!
//! Every tagged entity keeps a `cached_dimensions` JSON column holding its
//! dimension slug → value slugs. It is recomputed from persisted tags, never
//! patched with a delta, so concurrent refreshes converge.

use super::{CachedDimensions, TagOwner, TagTarget};
use crate::db::get_guid;
use crate::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Current tags of one entity as dimension slug → value slugs, in catalog order
pub async fn value_slugs_for(pool: &SqlitePool, owner: TagOwner) -> Result<CachedDimensions> {
    let target = owner.target;
    let rows = sqlx::query(&format!(
        r#"
        SELECT d.slug AS dimension_slug, v.slug AS value_slug
        FROM {table} t
        JOIN dimensions d ON d.guid = t.dimension_id
        JOIN dimension_values v ON v.guid = t.value_id
        WHERE t.{column} = ?
        ORDER BY d.position, d.slug, v.position, v.slug
        "#,
        table = target.tag_table(),
        column = target.entity_column(),
    ))
    .bind(owner.entity_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut slugs = CachedDimensions::new();
    for row in &rows {
        let dimension: String = row.try_get("dimension_slug")?;
        let value: String = row.try_get("value_slug")?;
        slugs.entry(dimension).or_default().push(value);
    }
    Ok(slugs)
}

/// Recompute one entity's `cached_dimensions`
pub async fn refresh_cached_dimensions(
    pool: &SqlitePool,
    owner: TagOwner,
) -> Result<CachedDimensions> {
    let cached = value_slugs_for(pool, owner).await?;
    write_cached(pool, owner.target, owner.entity_id, &cached).await?;
    Ok(cached)
}

/// Recompute `cached_dimensions` of every entity of `target` in an event
///
/// Returns the number of entities refreshed.
pub async fn refresh_cached_dimensions_for_event(
    pool: &SqlitePool,
    target: TagTarget,
    event_id: Uuid,
) -> Result<u64> {
    let entity_rows = sqlx::query(target.entities_of_event_sql())
        .bind(event_id.to_string())
        .fetch_all(pool)
        .await?;

    let tag_rows = sqlx::query(&format!(
        r#"
        SELECT t.{column} AS entity_id, d.slug AS dimension_slug, v.slug AS value_slug
        FROM {table} t
        JOIN dimensions d ON d.guid = t.dimension_id
        JOIN dimension_values v ON v.guid = t.value_id
        WHERE d.event_id = ?
        ORDER BY d.position, d.slug, v.position, v.slug
        "#,
        table = target.tag_table(),
        column = target.entity_column(),
    ))
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut by_entity: HashMap<Uuid, CachedDimensions> = HashMap::new();
    for row in &tag_rows {
        let entity_id = get_guid(row, "entity_id")?;
        let dimension: String = row.try_get("dimension_slug")?;
        let value: String = row.try_get("value_slug")?;
        by_entity
            .entry(entity_id)
            .or_default()
            .entry(dimension)
            .or_default()
            .push(value);
    }

    let empty = CachedDimensions::new();
    let mut tx = pool.begin().await?;
    for row in &entity_rows {
        let entity_id = get_guid(row, "guid")?;
        let cached = by_entity.get(&entity_id).unwrap_or(&empty);
        sqlx::query(&format!(
            "UPDATE {} SET cached_dimensions = ? WHERE guid = ?",
            target.entity_table()
        ))
        .bind(serde_json::to_string(cached)?)
        .bind(entity_id.to_string())
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    debug!(
        "Refreshed cached dimensions of {} {} in event {}",
        entity_rows.len(),
        target.entity_table(),
        event_id
    );

    Ok(entity_rows.len() as u64)
}

async fn write_cached(
    pool: &SqlitePool,
    target: TagTarget,
    entity_id: Uuid,
    cached: &CachedDimensions,
) -> Result<()> {
    sqlx::query(&format!(
        "UPDATE {} SET cached_dimensions = ? WHERE guid = ?",
        target.entity_table()
    ))
    .bind(serde_json::to_string(cached)?)
    .bind(entity_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}
