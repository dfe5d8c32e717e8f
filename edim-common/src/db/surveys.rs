//! Survey and response records

use crate::db::get_guid;
use crate::slug::validate_slug;
use crate::tags::{CachedDimensions, TagOwner, TaggedEntity};
use crate::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Survey {
    pub guid: Uuid,
    pub event_id: Uuid,
    pub slug: String,
    pub title: String,
}

impl Survey {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            guid: get_guid(row, "guid")?,
            event_id: get_guid(row, "event_id")?,
            slug: row.try_get("slug")?,
            title: row.try_get("title")?,
        })
    }
}

/// A form response; its event is the survey's
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub guid: Uuid,
    pub survey_id: Uuid,
    pub event_id: Uuid,
    pub form_data: Map<String, Value>,
    pub cached_dimensions: CachedDimensions,
}

impl Response {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let form_data: String = row.try_get("form_data")?;
        let cached_dimensions: String = row.try_get("cached_dimensions")?;

        Ok(Self {
            guid: get_guid(row, "guid")?,
            survey_id: get_guid(row, "survey_id")?,
            event_id: get_guid(row, "event_id")?,
            form_data: serde_json::from_str(&form_data)?,
            cached_dimensions: serde_json::from_str(&cached_dimensions)?,
        })
    }
}

impl TaggedEntity for Response {
    fn tag_owner(&self) -> TagOwner {
        TagOwner::response(self.guid, self.event_id)
    }
}

/// Create a survey, or retitle the existing one with the same slug
pub async fn create_survey(
    pool: &SqlitePool,
    event_id: Uuid,
    slug: &str,
    title: &str,
) -> Result<Survey> {
    validate_slug(slug)?;

    let row = sqlx::query(
        r#"
        INSERT INTO surveys (guid, event_id, slug, title)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(event_id, slug) DO UPDATE SET title = excluded.title
        RETURNING guid, event_id, slug, title
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event_id.to_string())
    .bind(slug)
    .bind(title)
    .fetch_one(pool)
    .await?;

    Survey::from_row(&row)
}

pub async fn load_survey(pool: &SqlitePool, event_id: Uuid, slug: &str) -> Result<Option<Survey>> {
    let row = sqlx::query(
        "SELECT guid, event_id, slug, title FROM surveys WHERE event_id = ? AND slug = ?",
    )
    .bind(event_id.to_string())
    .bind(slug)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(Survey::from_row).transpose()
}

pub async fn create_response(
    pool: &SqlitePool,
    survey: &Survey,
    form_data: &Map<String, Value>,
) -> Result<Response> {
    let guid = Uuid::new_v4();
    sqlx::query("INSERT INTO responses (guid, survey_id, form_data) VALUES (?, ?, ?)")
        .bind(guid.to_string())
        .bind(survey.guid.to_string())
        .bind(serde_json::to_string(form_data)?)
        .execute(pool)
        .await?;

    Ok(Response {
        guid,
        survey_id: survey.guid,
        event_id: survey.event_id,
        form_data: form_data.clone(),
        cached_dimensions: CachedDimensions::new(),
    })
}

/// Load a response of a survey
pub async fn load_response(
    pool: &SqlitePool,
    survey_id: Uuid,
    response_id: Uuid,
) -> Result<Option<Response>> {
    let row = sqlx::query(
        r#"
        SELECT r.guid, r.survey_id, s.event_id, r.form_data, r.cached_dimensions
        FROM responses r
        JOIN surveys s ON s.guid = r.survey_id
        WHERE r.survey_id = ? AND r.guid = ?
        "#,
    )
    .bind(survey_id.to_string())
    .bind(response_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(Response::from_row).transpose()
}
