//! Database initialization
//!
//! Creates the database on first run, enables foreign keys on every pooled
//! connection, creates tables idempotently and then runs versioned migrations.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Per-connection setting
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with the full schema
///
/// Used by tests and dry runs. The pool holds exactly one connection, so a
/// caller holding an open transaction must route every query through it.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables, indexes and triggers, then run migrations
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_events_table(pool).await?;
    create_dimensions_table(pool).await?;
    create_dimension_values_table(pool).await?;

    // Tagged entities
    create_programs_table(pool).await?;
    create_schedule_items_table(pool).await?;
    create_surveys_table(pool).await?;
    create_responses_table(pool).await?;

    // Tag tables
    create_tag_table(pool, "program_dimension_values", "program_id", "programs").await?;
    create_tag_table(pool, "response_dimension_values", "response_id", "responses").await?;

    // API access
    create_api_key_tables(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            guid TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the dimensions table
///
/// One row per (event, slug). Title is a JSON object of language → text.
pub async fn create_dimensions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dimensions (
            guid TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '{}',
            color TEXT NOT NULL DEFAULT '',
            icon TEXT NOT NULL DEFAULT '',
            value_ordering TEXT NOT NULL DEFAULT 'manual' CHECK (value_ordering IN ('slug', 'title', 'manual')),
            is_negative_selection INTEGER NOT NULL DEFAULT 0,
            is_list_filter INTEGER NOT NULL DEFAULT 1,
            is_shown_in_detail INTEGER NOT NULL DEFAULT 1,
            position INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (event_id, slug),
            CHECK (slug <> '')
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the dimension_values table
///
/// One row per (dimension, slug). Override color/icon are empty when the
/// value inherits them from its dimension.
pub async fn create_dimension_values_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dimension_values (
            guid TEXT PRIMARY KEY,
            dimension_id TEXT NOT NULL REFERENCES dimensions(guid) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '{}',
            override_color TEXT NOT NULL DEFAULT '',
            override_icon TEXT NOT NULL DEFAULT '',
            position INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (dimension_id, slug),
            CHECK (slug <> '')
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dimension_values_dimension ON dimension_values(dimension_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_programs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS programs (
            guid TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            annotations TEXT NOT NULL DEFAULT '{}',
            cached_dimensions TEXT NOT NULL DEFAULT '{}',
            cached_location TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (event_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_schedule_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schedule_items (
            guid TEXT PRIMARY KEY,
            program_id TEXT NOT NULL REFERENCES programs(guid) ON DELETE CASCADE,
            subtitle TEXT NOT NULL DEFAULT '',
            start_time TIMESTAMP NOT NULL,
            length_seconds INTEGER NOT NULL,
            cached_end_time TIMESTAMP NOT NULL,
            cached_location TEXT NOT NULL DEFAULT '',
            slot_start TIMESTAMP,
            slot_end TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (length_seconds >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_schedule_items_program ON schedule_items(program_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_surveys_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS surveys (
            guid TEXT PRIMARY KEY,
            event_id TEXT NOT NULL REFERENCES events(guid) ON DELETE CASCADE,
            slug TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (event_id, slug)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_responses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS responses (
            guid TEXT PRIMARY KEY,
            survey_id TEXT NOT NULL REFERENCES surveys(guid) ON DELETE CASCADE,
            form_data TEXT NOT NULL DEFAULT '{}',
            cached_dimensions TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_responses_survey ON responses(survey_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create one tag table plus the triggers that keep its denormalized
/// `dimension_id` equal to the dimension of the referenced value
///
/// Uniqueness is on (entity, value), not (entity, dimension): a dimension may
/// carry several values for one entity.
async fn create_tag_table(
    pool: &SqlitePool,
    table: &str,
    entity_column: &str,
    entity_table: &str,
) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            guid TEXT PRIMARY KEY,
            {entity_column} TEXT NOT NULL REFERENCES {entity_table}(guid) ON DELETE CASCADE,
            dimension_id TEXT NOT NULL REFERENCES dimensions(guid) ON DELETE CASCADE,
            value_id TEXT NOT NULL REFERENCES dimension_values(guid) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE ({entity_column}, value_id)
        )
        "#
    ))
    .execute(pool)
    .await?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_entity_dimension ON {table}({entity_column}, dimension_id)"
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_dimension ON {table}(dimension_id)"
    ))
    .execute(pool)
    .await?;

    for (suffix, event) in [("insert", "INSERT"), ("update", "UPDATE OF dimension_id, value_id")] {
        sqlx::query(&format!(
            r#"
            CREATE TRIGGER IF NOT EXISTS trg_{table}_dimension_{suffix}
            BEFORE {event} ON {table}
            WHEN NEW.dimension_id IS NOT (SELECT dimension_id FROM dimension_values WHERE guid = NEW.value_id)
            BEGIN
                SELECT RAISE(ABORT, 'tag dimension must equal the dimension of its value');
            END
            "#
        ))
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn create_api_key_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            key_hash TEXT PRIMARY KEY,
            label TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // NULL event_id grants the scope/action on every event
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_key_grants (
            key_hash TEXT NOT NULL REFERENCES api_keys(key_hash) ON DELETE CASCADE,
            event_id TEXT REFERENCES events(guid) ON DELETE CASCADE,
            scope TEXT NOT NULL CHECK (scope IN ('dimensions', 'program', 'response')),
            action TEXT NOT NULL CHECK (action IN ('query', 'mutation')),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (key_hash, event_id, scope, action)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let pool = open_in_memory().await.unwrap();

        // Second run must not fail or duplicate anything
        init_schema(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in [
            "api_key_grants",
            "api_keys",
            "dimension_values",
            "dimensions",
            "events",
            "program_dimension_values",
            "programs",
            "response_dimension_values",
            "responses",
            "schedule_items",
            "schema_version",
            "surveys",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = open_in_memory().await.unwrap();

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
