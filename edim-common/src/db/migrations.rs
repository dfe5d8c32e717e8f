//! Database schema migrations
//!
//! Versioned, idempotent upgrades tracked in the `schema_version` table.
//! `init_schema` creates fresh tables with every column already present, so on
//! a new database each migration finds nothing to do and only records its
//! version.
//!
//! # Migration Guidelines
//!
//! 1. Never modify existing migrations; add a new one
//! 2. Check before altering (`pragma_table_info`) so reruns are harmless
//! 3. Prefer ALTER TABLE over DROP/CREATE to preserve data

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Get current schema version from database
///
/// Returns 0 if schema_version has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: realign denormalized tag dimensions
///
/// Sets every tag row's `dimension_id` to its value's dimension. Only rows
/// that bypassed the consistency triggers can differ.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    for table in ["program_dimension_values", "response_dimension_values"] {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {table}
            SET dimension_id = (SELECT dimension_id FROM dimension_values WHERE guid = {table}.value_id)
            WHERE dimension_id IS NOT (SELECT dimension_id FROM dimension_values WHERE guid = {table}.value_id)
            "#
        ))
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            warn!(
                "Migration v1: repaired {} tag rows in {} with stale dimension",
                result.rows_affected(),
                table
            );
        }
    }

    Ok(())
}
