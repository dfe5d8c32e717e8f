//! Catalog sync and listing
//!
//! `save_many` is declarative: applying the same specs twice writes nothing
//! the second time, and a value missing from a dimension's choice list is
//! deleted (with every tag that references it). Dimensions missing from the
//! call are left alone.

use super::{Dimension, DimensionSpec, DimensionValue, DimensionWithValues, ValueOrdering};
use crate::slug::validate_slug;
use crate::tags::{store, TagTarget};
use crate::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};
use uuid::Uuid;

pub(crate) const DIMENSION_COLUMNS: &str = "d.guid, d.event_id, d.slug, d.title, d.color, d.icon, \
     d.value_ordering, d.is_negative_selection, d.is_list_filter, d.is_shown_in_detail, d.position";

pub(crate) const VALUE_COLUMNS: &str =
    "v.guid, v.dimension_id, v.slug, v.title, v.override_color, v.override_icon, v.position";

/// Outcome of one catalog sync
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSync {
    /// Persisted dimensions in input order
    pub dimensions: Vec<Dimension>,
    /// Dimension rows inserted or changed
    pub dimensions_written: u64,
    /// Value rows inserted or changed
    pub values_written: u64,
    /// Value rows pruned because their slug left the choice list
    pub values_deleted: u64,
}

impl CatalogSync {
    pub fn is_noop(&self) -> bool {
        self.dimensions_written == 0 && self.values_written == 0 && self.values_deleted == 0
    }
}

/// Sync dimension specs for an event; returns the persisted dimensions in input order
pub async fn save_many(
    pool: &SqlitePool,
    event_id: Uuid,
    specs: &[DimensionSpec],
) -> Result<Vec<Dimension>> {
    Ok(sync_catalog(pool, event_id, specs).await?.dimensions)
}

/// [`save_many`] with write counts
///
/// Validation happens before any write. Within the transaction every
/// dimension and value is inserted/updated before stale values are deleted.
/// When values were deleted, cached dimension aggregates of the event's
/// programs and responses are recomputed after commit.
pub async fn sync_catalog(
    pool: &SqlitePool,
    event_id: Uuid,
    specs: &[DimensionSpec],
) -> Result<CatalogSync> {
    validate_specs(specs)?;

    let mut tx = pool.begin().await?;
    let mut sync = CatalogSync::default();

    for (position, spec) in specs.iter().enumerate() {
        sync.dimensions_written += upsert_dimension(&mut tx, event_id, spec, position as i64).await?;
        let dimension = load_dimension_in(&mut tx, event_id, &spec.slug)
            .await?
            .ok_or_else(|| Error::Internal(format!("dimension '{}' vanished during sync", spec.slug)))?;

        for (value_position, choice) in spec.choices.iter().flatten().enumerate() {
            sync.values_written += upsert_value(
                &mut tx,
                dimension.guid,
                choice,
                value_position as i64,
            )
            .await?;
        }

        sync.dimensions.push(dimension);
    }

    // Deletes strictly after all inserts/updates of this call
    for (spec, dimension) in specs.iter().zip(&sync.dimensions) {
        sync.values_deleted += delete_stale_values(&mut tx, dimension.guid, &spec.choice_slugs()).await?;
    }

    tx.commit().await?;

    info!(
        "Catalog sync for event {}: {} dimensions, {} dimension rows written, {} value rows written, {} values pruned",
        event_id,
        specs.len(),
        sync.dimensions_written,
        sync.values_written,
        sync.values_deleted
    );

    if sync.values_deleted > 0 {
        for target in [TagTarget::Program, TagTarget::Response] {
            store::refresh_cached_dimensions_for_event(pool, target, event_id).await?;
        }
    }

    Ok(sync)
}

fn validate_specs(specs: &[DimensionSpec]) -> Result<()> {
    let mut seen = HashSet::new();
    for spec in specs {
        validate_slug(&spec.slug)
            .map_err(|e| Error::InvalidInput(format!("dimension: {}", e)))?;
        if !seen.insert(spec.slug.as_str()) {
            return Err(Error::InvalidInput(format!(
                "dimension '{}' listed more than once",
                spec.slug
            )));
        }

        let mut seen_values = HashSet::new();
        for choice in spec.choices.iter().flatten() {
            validate_slug(&choice.slug)
                .map_err(|e| Error::InvalidInput(format!("value of '{}': {}", spec.slug, e)))?;
            if !seen_values.insert(choice.slug.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "value '{}' listed more than once in dimension '{}'",
                    choice.slug, spec.slug
                )));
            }
        }
    }
    Ok(())
}

/// Insert or update one dimension; returns 1 if a row changed, 0 if it was already current
async fn upsert_dimension(
    conn: &mut SqliteConnection,
    event_id: Uuid,
    spec: &DimensionSpec,
    position: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO dimensions (
            guid, event_id, slug, title, color, icon, value_ordering,
            is_negative_selection, is_list_filter, is_shown_in_detail, position
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(event_id, slug) DO UPDATE SET
            title = excluded.title,
            color = excluded.color,
            icon = excluded.icon,
            value_ordering = excluded.value_ordering,
            is_negative_selection = excluded.is_negative_selection,
            is_list_filter = excluded.is_list_filter,
            is_shown_in_detail = excluded.is_shown_in_detail,
            position = excluded.position,
            updated_at = CURRENT_TIMESTAMP
        WHERE dimensions.title IS NOT excluded.title
            OR dimensions.color IS NOT excluded.color
            OR dimensions.icon IS NOT excluded.icon
            OR dimensions.value_ordering IS NOT excluded.value_ordering
            OR dimensions.is_negative_selection IS NOT excluded.is_negative_selection
            OR dimensions.is_list_filter IS NOT excluded.is_list_filter
            OR dimensions.is_shown_in_detail IS NOT excluded.is_shown_in_detail
            OR dimensions.position IS NOT excluded.position
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(event_id.to_string())
    .bind(&spec.slug)
    .bind(spec.title.to_json())
    .bind(&spec.color)
    .bind(&spec.icon)
    .bind(spec.value_ordering.as_str())
    .bind(spec.is_negative_selection)
    .bind(spec.is_list_filter)
    .bind(spec.is_shown_in_detail)
    .bind(position)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

async fn upsert_value(
    conn: &mut SqliteConnection,
    dimension_id: Uuid,
    choice: &super::DimensionValueSpec,
    position: i64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        INSERT INTO dimension_values (
            guid, dimension_id, slug, title, override_color, override_icon, position
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(dimension_id, slug) DO UPDATE SET
            title = excluded.title,
            override_color = excluded.override_color,
            override_icon = excluded.override_icon,
            position = excluded.position,
            updated_at = CURRENT_TIMESTAMP
        WHERE dimension_values.title IS NOT excluded.title
            OR dimension_values.override_color IS NOT excluded.override_color
            OR dimension_values.override_icon IS NOT excluded.override_icon
            OR dimension_values.position IS NOT excluded.position
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(dimension_id.to_string())
    .bind(&choice.slug)
    .bind(choice.title.to_json())
    .bind(&choice.color)
    .bind(&choice.icon)
    .bind(position)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Delete values of a dimension whose slug is not in `keep`; tag rows go with them
async fn delete_stale_values(
    conn: &mut SqliteConnection,
    dimension_id: Uuid,
    keep: &[&str],
) -> Result<u64> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("DELETE FROM dimension_values WHERE dimension_id = ");
    qb.push_bind(dimension_id.to_string());

    if !keep.is_empty() {
        qb.push(" AND slug NOT IN (");
        let mut separated = qb.separated(", ");
        for slug in keep {
            separated.push_bind(slug.to_string());
        }
        separated.push_unseparated(")");
    }

    let result = qb.build().execute(&mut *conn).await?;
    if result.rows_affected() > 0 {
        debug!(
            "Pruned {} values of dimension {}",
            result.rows_affected(),
            dimension_id
        );
    }
    Ok(result.rows_affected())
}

async fn load_dimension_in(
    conn: &mut SqliteConnection,
    event_id: Uuid,
    slug: &str,
) -> Result<Option<Dimension>> {
    let row = sqlx::query(&format!(
        "SELECT {DIMENSION_COLUMNS} FROM dimensions d WHERE d.event_id = ? AND d.slug = ?"
    ))
    .bind(event_id.to_string())
    .bind(slug)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(Dimension::from_row).transpose()
}

/// Load one dimension of an event by slug
pub async fn load_dimension(
    pool: &SqlitePool,
    event_id: Uuid,
    slug: &str,
) -> Result<Option<Dimension>> {
    let mut conn = pool.acquire().await?;
    load_dimension_in(&mut conn, event_id, slug).await
}

/// List the event's catalog in position order, values ordered per dimension policy
///
/// `language` selects the title used by [`ValueOrdering::Title`].
pub async fn list_dimensions(
    pool: &SqlitePool,
    event_id: Uuid,
    language: &str,
) -> Result<Vec<DimensionWithValues>> {
    let dimension_rows = sqlx::query(&format!(
        "SELECT {DIMENSION_COLUMNS} FROM dimensions d WHERE d.event_id = ? ORDER BY d.position, d.slug"
    ))
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    let value_rows = sqlx::query(&format!(
        "SELECT {VALUE_COLUMNS} FROM dimension_values v \
         JOIN dimensions d ON d.guid = v.dimension_id \
         WHERE d.event_id = ?"
    ))
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut values_by_dimension: HashMap<Uuid, Vec<DimensionValue>> = HashMap::new();
    for row in &value_rows {
        let value = DimensionValue::from_row(row)?;
        values_by_dimension
            .entry(value.dimension_id)
            .or_default()
            .push(value);
    }

    let mut catalog = Vec::with_capacity(dimension_rows.len());
    for row in &dimension_rows {
        let dimension = Dimension::from_row(row)?;
        let mut values = values_by_dimension.remove(&dimension.guid).unwrap_or_default();
        sort_values(&mut values, dimension.value_ordering, language);
        catalog.push(DimensionWithValues { dimension, values });
    }

    Ok(catalog)
}

fn sort_values(values: &mut [DimensionValue], ordering: ValueOrdering, language: &str) {
    match ordering {
        ValueOrdering::Slug => values.sort_by(|a, b| a.slug.cmp(&b.slug)),
        ValueOrdering::Title => values.sort_by(|a, b| {
            a.title
                .get_or_any(language)
                .to_lowercase()
                .cmp(&b.title.get_or_any(language).to_lowercase())
                .then_with(|| a.slug.cmp(&b.slug))
        }),
        ValueOrdering::Manual => values.sort_by_key(|v| v.position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::DimensionValueSpec;
    use crate::LocalizedText;

    async fn setup() -> (SqlitePool, Uuid) {
        let pool = crate::db::open_in_memory().await.unwrap();
        let event = crate::db::events::save_event(&pool, "tracon2024", "Tracon")
            .await
            .unwrap();
        (pool, event.guid)
    }

    fn choice(slug: &str, title: &str) -> DimensionValueSpec {
        DimensionValueSpec::new(slug, LocalizedText::single("en", title))
    }

    fn audience(choices: &[(&str, &str)]) -> DimensionSpec {
        DimensionSpec::new("audience", LocalizedText::single("en", "Audience")).choices(
            choices
                .iter()
                .map(|(slug, title)| choice(slug, title))
                .collect(),
        )
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_many_returns_input_order() {
        let (pool, event_id) = setup().await;

        let specs = vec![
            DimensionSpec::new("room", LocalizedText::single("en", "Room")),
            audience(&[("r18", "Adults")]),
            DimensionSpec::new("date", LocalizedText::single("en", "Date")),
        ];
        let dimensions = save_many(&pool, event_id, &specs).await.unwrap();

        let slugs: Vec<&str> = dimensions.iter().map(|d| d.slug.as_str()).collect();
        assert_eq!(slugs, vec!["room", "audience", "date"]);
        assert!(dimensions.iter().all(|d| d.event_id == event_id));
    }

    #[tokio::test]
    async fn test_empty_slug_rejected_before_write() {
        let (pool, event_id) = setup().await;

        let specs = vec![
            audience(&[("r18", "Adults")]),
            DimensionSpec::new("", LocalizedText::single("en", "Nameless")),
        ];
        let err = save_many(&pool, event_id, &specs).await.unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(count(&pool, "dimensions").await, 0);
        assert_eq!(count(&pool, "dimension_values").await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_slugs_rejected() {
        let (pool, event_id) = setup().await;

        let dup_dimension = vec![audience(&[]), audience(&[])];
        assert!(save_many(&pool, event_id, &dup_dimension).await.is_err());

        let dup_value = vec![audience(&[("r18", "Adults"), ("r18", "Adults again")])];
        assert!(save_many(&pool, event_id, &dup_value).await.is_err());
    }

    #[tokio::test]
    async fn test_save_many_is_idempotent() {
        let (pool, event_id) = setup().await;
        let specs = vec![audience(&[("r18", "Adults"), ("child-friendly", "Kids")])];

        let first = sync_catalog(&pool, event_id, &specs).await.unwrap();
        assert_eq!(first.dimensions_written, 1);
        assert_eq!(first.values_written, 2);

        // Pin timestamps so any rewrite would be visible
        sqlx::query("UPDATE dimensions SET updated_at = '2000-01-01 00:00:00'")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE dimension_values SET updated_at = '2000-01-01 00:00:00'")
            .execute(&pool)
            .await
            .unwrap();

        let second = sync_catalog(&pool, event_id, &specs).await.unwrap();
        assert!(second.is_noop(), "second sync wrote: {:?}", second);
        assert_eq!(first.dimensions, second.dimensions);

        assert_eq!(count(&pool, "dimensions").await, 1);
        assert_eq!(count(&pool, "dimension_values").await, 2);

        let touched: i64 = sqlx::query_scalar(
            "SELECT (SELECT COUNT(*) FROM dimensions WHERE updated_at <> '2000-01-01 00:00:00') + \
                    (SELECT COUNT(*) FROM dimension_values WHERE updated_at <> '2000-01-01 00:00:00')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(touched, 0);
    }

    #[tokio::test]
    async fn test_changed_title_is_updated_in_place() {
        let (pool, event_id) = setup().await;

        let before = save_many(&pool, event_id, &[audience(&[("r18", "Adults")])])
            .await
            .unwrap();
        let after = sync_catalog(&pool, event_id, &[audience(&[("r18", "Ages 18 and up")])])
            .await
            .unwrap();

        assert_eq!(after.values_written, 1);
        assert_eq!(after.values_deleted, 0);
        assert_eq!(before[0].guid, after.dimensions[0].guid);

        let catalog = list_dimensions(&pool, event_id, "en").await.unwrap();
        assert_eq!(
            catalog[0].value("r18").unwrap().title.get("en"),
            Some("Ages 18 and up")
        );
    }

    #[tokio::test]
    async fn test_omitted_value_is_deleted() {
        let (pool, event_id) = setup().await;

        save_many(&pool, event_id, &[audience(&[("a", "A"), ("b", "B"), ("c", "C")])])
            .await
            .unwrap();
        let sync = sync_catalog(&pool, event_id, &[audience(&[("a", "A"), ("b", "B")])])
            .await
            .unwrap();

        assert_eq!(sync.values_deleted, 1);
        let catalog = list_dimensions(&pool, event_id, "en").await.unwrap();
        let slugs: Vec<&str> = catalog[0].values.iter().map(|v| v.slug.as_str()).collect();
        assert_eq!(slugs, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_omitted_dimension_is_kept() {
        let (pool, event_id) = setup().await;

        save_many(
            &pool,
            event_id,
            &[
                audience(&[("r18", "Adults")]),
                DimensionSpec::new("room", LocalizedText::single("en", "Room"))
                    .choices(vec![choice("main-hall", "Main Hall")]),
            ],
        )
        .await
        .unwrap();
        save_many(&pool, event_id, &[audience(&[("r18", "Adults")])])
            .await
            .unwrap();

        let room = load_dimension(&pool, event_id, "room").await.unwrap();
        assert!(room.is_some());
        assert_eq!(count(&pool, "dimension_values").await, 2);
    }

    #[tokio::test]
    async fn test_missing_choices_prunes_all_values() {
        let (pool, event_id) = setup().await;

        save_many(&pool, event_id, &[audience(&[("r18", "Adults")])])
            .await
            .unwrap();
        let bare = DimensionSpec::new("audience", LocalizedText::single("en", "Audience"));
        let sync = sync_catalog(&pool, event_id, &[bare]).await.unwrap();

        assert_eq!(sync.values_deleted, 1);
        assert_eq!(count(&pool, "dimension_values").await, 0);
    }

    #[tokio::test]
    async fn test_value_ordering_policies() {
        let (pool, event_id) = setup().await;
        let choices = vec![
            choice("zeta", "Alpha"),
            choice("alpha", "Zeta"),
            choice("mid", "Mid"),
        ];

        save_many(
            &pool,
            event_id,
            &[
                DimensionSpec::new("by-slug", LocalizedText::new())
                    .value_ordering(ValueOrdering::Slug)
                    .choices(choices.clone()),
                DimensionSpec::new("by-title", LocalizedText::new())
                    .value_ordering(ValueOrdering::Title)
                    .choices(choices.clone()),
                DimensionSpec::new("manual", LocalizedText::new()).choices(choices),
            ],
        )
        .await
        .unwrap();

        let catalog = list_dimensions(&pool, event_id, "en").await.unwrap();
        let order = |i: usize| -> Vec<String> {
            catalog[i].values.iter().map(|v| v.slug.clone()).collect()
        };

        assert_eq!(catalog[0].dimension.slug, "by-slug");
        assert_eq!(order(0), vec!["alpha", "mid", "zeta"]);
        assert_eq!(order(1), vec!["zeta", "mid", "alpha"]);
        assert_eq!(order(2), vec!["zeta", "alpha", "mid"]);
    }

    #[tokio::test]
    async fn test_event_deletion_cascades_catalog() {
        let (pool, event_id) = setup().await;

        save_many(&pool, event_id, &[audience(&[("r18", "Adults")])])
            .await
            .unwrap();
        crate::db::events::delete_event(&pool, event_id).await.unwrap();

        assert_eq!(count(&pool, "dimensions").await, 0);
        assert_eq!(count(&pool, "dimension_values").await, 0);
    }
}
