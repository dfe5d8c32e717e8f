//! Event records
//!
//! Events own every dimension, program and survey; deleting an event cascades.

use crate::db::get_guid;
use crate::slug::validate_slug;
use crate::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub guid: Uuid,
    pub slug: String,
    pub name: String,
}

impl Event {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        use sqlx::Row;
        Ok(Self {
            guid: get_guid(row, "guid")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
        })
    }
}

/// Create an event, or rename the existing event with the same slug
pub async fn save_event(pool: &SqlitePool, slug: &str, name: &str) -> Result<Event> {
    validate_slug(slug)?;

    let row = sqlx::query(
        r#"
        INSERT INTO events (guid, slug, name)
        VALUES (?, ?, ?)
        ON CONFLICT(slug) DO UPDATE SET
            name = excluded.name,
            updated_at = CURRENT_TIMESTAMP
        RETURNING guid, slug, name
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(slug)
    .bind(name)
    .fetch_one(pool)
    .await?;

    Event::from_row(&row)
}

pub async fn load_event_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Event>> {
    let row = sqlx::query("SELECT guid, slug, name FROM events WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Event::from_row).transpose()
}

/// Delete an event and, by cascade, its whole catalog, programs, surveys and tags
pub async fn delete_event(pool: &SqlitePool, event_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM events WHERE guid = ?")
        .bind(event_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
