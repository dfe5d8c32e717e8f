//! Program item records
//!
//! Programs are upserted by (event, slug) so reimports keep their identity and
//! therefore their tags.

use crate::db::get_guid;
use crate::slug::validate_slug;
use crate::tags::{CachedDimensions, TagOwner, TaggedEntity};
use crate::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

const PROGRAM_COLUMNS: &str =
    "guid, event_id, slug, title, description, annotations, cached_dimensions, cached_location";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub guid: Uuid,
    pub event_id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Auxiliary metadata such as derived external links
    pub annotations: Map<String, Value>,
    pub cached_dimensions: CachedDimensions,
    pub cached_location: String,
}

impl Program {
    /// Unsaved program with a fresh guid
    pub fn new(event_id: Uuid, slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            event_id,
            slug: slug.into(),
            title: title.into(),
            description: String::new(),
            annotations: Map::new(),
            cached_dimensions: CachedDimensions::new(),
            cached_location: String::new(),
        }
    }

    fn from_row(row: &SqliteRow) -> Result<Self> {
        let annotations: String = row.try_get("annotations")?;
        let cached_dimensions: String = row.try_get("cached_dimensions")?;

        Ok(Self {
            guid: get_guid(row, "guid")?,
            event_id: get_guid(row, "event_id")?,
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            annotations: serde_json::from_str(&annotations)?,
            cached_dimensions: serde_json::from_str(&cached_dimensions)?,
            cached_location: row.try_get("cached_location")?,
        })
    }
}

impl TaggedEntity for Program {
    fn tag_owner(&self) -> TagOwner {
        TagOwner::program(self.guid, self.event_id)
    }
}

/// Insert or update a program by (event, slug); returns the persisted guid
///
/// An existing row keeps its guid. `cached_dimensions` is not written here.
pub async fn save_program(conn: &mut SqliteConnection, program: &Program) -> Result<Uuid> {
    validate_slug(&program.slug)?;

    let row = sqlx::query(
        r#"
        INSERT INTO programs (guid, event_id, slug, title, description, annotations, cached_location)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id, slug) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            annotations = excluded.annotations,
            cached_location = excluded.cached_location,
            updated_at = CURRENT_TIMESTAMP
        RETURNING guid
        "#,
    )
    .bind(program.guid.to_string())
    .bind(program.event_id.to_string())
    .bind(&program.slug)
    .bind(&program.title)
    .bind(&program.description)
    .bind(serde_json::to_string(&program.annotations)?)
    .bind(&program.cached_location)
    .fetch_one(&mut *conn)
    .await?;

    get_guid(&row, "guid")
}

pub async fn load_program(pool: &SqlitePool, event_id: Uuid, slug: &str) -> Result<Option<Program>> {
    let row = sqlx::query(&format!(
        "SELECT {PROGRAM_COLUMNS} FROM programs WHERE event_id = ? AND slug = ?"
    ))
    .bind(event_id.to_string())
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(Program::from_row).transpose()
}

pub async fn load_program_by_id(pool: &SqlitePool, guid: Uuid) -> Result<Option<Program>> {
    let row = sqlx::query(&format!("SELECT {PROGRAM_COLUMNS} FROM programs WHERE guid = ?"))
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(Program::from_row).transpose()
}

/// All programs of an event ordered by slug
pub async fn list_programs(pool: &SqlitePool, event_id: Uuid) -> Result<Vec<Program>> {
    let rows = sqlx::query(&format!(
        "SELECT {PROGRAM_COLUMNS} FROM programs WHERE event_id = ? ORDER BY slug"
    ))
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(Program::from_row).collect()
}
