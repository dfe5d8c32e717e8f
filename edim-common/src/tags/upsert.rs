//! Bulk tag upsert
//!
//! The work is split in three steps:
//! 1. [`build_upsert_cache`] reads an event's whole catalog once.
//! 2. [`resolve`] / [`build_upsertables`] turn assignment maps into tag rows
//!    against that cache without touching the database.
//! 3. [`bulk_upsert`] and [`apply`] write them.
//!
//! A bulk import builds one cache and reuses it for every entity, so tagging
//! costs no catalog queries per entity.

use super::{store, AssignmentMap, NewTag, Tag, TagOwner, TagTarget, TaggedEntity};
use crate::db::get_guid;
use crate::dimensions::catalog::DIMENSION_COLUMNS;
use crate::dimensions::{Dimension, DimensionValue};
use crate::{Error, LocalizedText, Result, UnresolvedSlug};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Rows per INSERT statement; four binds per row keeps well under SQLite's bind limit
const UPSERT_CHUNK_SIZE: usize = 500;

/// Catalog of one event keyed by slug
#[derive(Debug, Clone, Default)]
pub struct UpsertCache {
    pub event_id: Uuid,
    pub dimensions_by_slug: HashMap<String, Dimension>,
    /// Dimension slug → value slug → value
    pub values_by_slug: HashMap<String, HashMap<String, DimensionValue>>,
}

impl UpsertCache {
    pub fn dimension(&self, slug: &str) -> Option<&Dimension> {
        self.dimensions_by_slug.get(slug)
    }

    pub fn value(&self, dimension_slug: &str, value_slug: &str) -> Option<&DimensionValue> {
        self.values_by_slug
            .get(dimension_slug)
            .and_then(|values| values.get(value_slug))
    }

    pub fn value_count(&self) -> usize {
        self.values_by_slug.values().map(HashMap::len).sum()
    }
}

/// Load every dimension and value of an event with a single query
///
/// Dimensions without values are included with an empty value map.
pub async fn build_upsert_cache(pool: &SqlitePool, event_id: Uuid) -> Result<UpsertCache> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {DIMENSION_COLUMNS},
            v.guid AS value_guid, v.slug AS value_slug, v.title AS value_title,
            v.override_color AS value_override_color, v.override_icon AS value_override_icon,
            v.position AS value_position
        FROM dimensions d
        LEFT JOIN dimension_values v ON v.dimension_id = d.guid
        WHERE d.event_id = ?
        "#
    ))
    .bind(event_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut cache = UpsertCache {
        event_id,
        ..Default::default()
    };

    for row in &rows {
        let dimension = Dimension::from_row(row)?;
        let values = cache
            .values_by_slug
            .entry(dimension.slug.clone())
            .or_default();

        if let Some(value) = value_from_joined_row(row, dimension.guid)? {
            values.insert(value.slug.clone(), value);
        }

        cache
            .dimensions_by_slug
            .entry(dimension.slug.clone())
            .or_insert(dimension);
    }

    debug!(
        "Built upsert cache for event {}: {} dimensions, {} values",
        event_id,
        cache.dimensions_by_slug.len(),
        cache.value_count()
    );

    Ok(cache)
}

fn value_from_joined_row(row: &SqliteRow, dimension_id: Uuid) -> Result<Option<DimensionValue>> {
    let guid: Option<String> = row.try_get("value_guid")?;
    let Some(guid) = guid else {
        return Ok(None);
    };
    let title: String = row.try_get("value_title")?;

    Ok(Some(DimensionValue {
        guid: Uuid::parse_str(&guid)?,
        dimension_id,
        slug: row.try_get("value_slug")?,
        title: LocalizedText::from_json(&title)?,
        override_color: row.try_get("value_override_color")?,
        override_icon: row.try_get("value_override_icon")?,
        position: row.try_get("value_position")?,
    }))
}

/// Which dimensions a reconciliation owns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconcileScope {
    /// Only dimensions named in the map; an empty entry clears that dimension
    #[default]
    Listed,
    /// Every dimension of the event; dimensions missing from the map are cleared
    Entire,
}

/// Output of [`resolve`]: the desired rows and the dimensions they replace
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAssignments {
    pub rows: Vec<NewTag>,
    pub dimension_ids: Vec<Uuid>,
}

/// Write counts of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub upserted: u64,
    pub deleted: u64,
}

/// Resolve an assignment map into unsaved tag rows
///
/// Empty entries are skipped. Every unknown dimension or value is collected
/// and reported together as [`Error::UnresolvedSlugs`].
pub fn build_upsertables(
    owner: TagOwner,
    assignments: &AssignmentMap,
    cache: &UpsertCache,
) -> Result<Vec<NewTag>> {
    let mut rows = Vec::new();
    let mut unresolved = Vec::new();

    for (dimension_slug, value_slugs) in assignments.iter() {
        let value_slugs = value_slugs.normalized();
        if value_slugs.is_empty() {
            continue;
        }

        if cache.dimension(dimension_slug).is_none() {
            unresolved.push(UnresolvedSlug::dimension(dimension_slug));
            continue;
        }

        for value_slug in value_slugs {
            match cache.value(dimension_slug, value_slug) {
                Some(value) => rows.push(NewTag::new(owner, value)),
                None => unresolved.push(UnresolvedSlug::value(dimension_slug, value_slug)),
            }
        }
    }

    if !unresolved.is_empty() {
        return Err(Error::UnresolvedSlugs(unresolved));
    }

    Ok(rows)
}

/// Resolve an assignment map and determine which dimensions it reconciles
pub fn resolve(
    owner: TagOwner,
    assignments: &AssignmentMap,
    cache: &UpsertCache,
    scope: ReconcileScope,
) -> Result<ResolvedAssignments> {
    if owner.event_id != cache.event_id {
        return Err(Error::InvalidInput(format!(
            "entity {} belongs to event {}, catalog cache is for event {}",
            owner.entity_id, owner.event_id, cache.event_id
        )));
    }

    let rows = build_upsertables(owner, assignments, cache)?;

    let mut dimension_ids: Vec<Uuid> = match scope {
        ReconcileScope::Listed => assignments
            .iter()
            .filter_map(|(slug, _)| cache.dimension(slug).map(|d| d.guid))
            .collect(),
        ReconcileScope::Entire => cache.dimensions_by_slug.values().map(|d| d.guid).collect(),
    };
    dimension_ids.sort();
    dimension_ids.dedup();

    Ok(ResolvedAssignments {
        rows,
        dimension_ids,
    })
}

/// Insert tag rows, updating the dimension of rows that already exist
///
/// Never deletes. Returns the persisted rows.
pub async fn bulk_upsert(conn: &mut SqliteConnection, rows: &[NewTag]) -> Result<Vec<Tag>> {
    let mut persisted = Vec::with_capacity(rows.len());

    for target in [TagTarget::Program, TagTarget::Response] {
        let target_rows: Vec<&NewTag> = rows.iter().filter(|r| r.owner().target == target).collect();

        for chunk in target_rows.chunks(UPSERT_CHUNK_SIZE) {
            let entity_column = target.entity_column();
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "INSERT INTO {} (guid, {}, dimension_id, value_id) ",
                target.tag_table(),
                entity_column
            ));

            qb.push_values(chunk.iter(), |mut b, row| {
                b.push_bind(Uuid::new_v4().to_string())
                    .push_bind(row.owner().entity_id.to_string())
                    .push_bind(row.dimension_id().to_string())
                    .push_bind(row.value_id().to_string());
            });

            qb.push(format!(
                " ON CONFLICT({entity_column}, value_id) DO UPDATE SET dimension_id = excluded.dimension_id \
                 RETURNING guid, {entity_column}, dimension_id, value_id"
            ));

            let returned = qb.build().fetch_all(&mut *conn).await?;
            for row in &returned {
                persisted.push(Tag {
                    guid: get_guid(row, "guid")?,
                    target,
                    entity_id: get_guid(row, entity_column)?,
                    dimension_id: get_guid(row, "dimension_id")?,
                    value_id: get_guid(row, "value_id")?,
                });
            }
        }
    }

    Ok(persisted)
}

/// Delete the entity's tags in `dimension_ids` whose value is not in `keep_value_ids`
async fn delete_stale(
    conn: &mut SqliteConnection,
    owner: TagOwner,
    dimension_ids: &[Uuid],
    keep_value_ids: &[Uuid],
) -> Result<u64> {
    if dimension_ids.is_empty() {
        return Ok(0);
    }

    let target = owner.target;
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "DELETE FROM {} WHERE {} = ",
        target.tag_table(),
        target.entity_column()
    ));
    qb.push_bind(owner.entity_id.to_string());

    qb.push(" AND dimension_id IN (");
    let mut separated = qb.separated(", ");
    for id in dimension_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(")");

    if !keep_value_ids.is_empty() {
        qb.push(" AND value_id NOT IN (");
        let mut separated = qb.separated(", ");
        for id in keep_value_ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }

    Ok(qb.build().execute(&mut *conn).await?.rows_affected())
}

/// Write resolved assignments for one entity: upsert first, then delete stale tags
///
/// Runs on the caller's connection so it composes into a larger transaction.
/// Does not refresh the cached aggregate.
pub async fn apply(
    conn: &mut SqliteConnection,
    owner: TagOwner,
    resolved: &ResolvedAssignments,
) -> Result<ReconcileOutcome> {
    let upserted = bulk_upsert(conn, &resolved.rows).await?;

    let keep: Vec<Uuid> = resolved.rows.iter().map(NewTag::value_id).collect();
    let deleted = delete_stale(conn, owner, &resolved.dimension_ids, &keep).await?;

    Ok(ReconcileOutcome {
        upserted: upserted.len() as u64,
        deleted,
    })
}

/// Make an entity's tags match an assignment map
///
/// Resolution happens before the transaction opens, so an unknown slug writes
/// nothing. The cached aggregate is refreshed after commit.
pub async fn set_dimension_values<E: TaggedEntity + ?Sized>(
    pool: &SqlitePool,
    entity: &E,
    assignments: &AssignmentMap,
    cache: &UpsertCache,
    scope: ReconcileScope,
) -> Result<ReconcileOutcome> {
    let owner = entity.tag_owner();
    let resolved = resolve(owner, assignments, cache, scope)?;

    let mut tx = pool.begin().await?;
    let outcome = apply(&mut tx, owner, &resolved).await?;
    tx.commit().await?;

    store::refresh_cached_dimensions(pool, owner).await?;

    debug!(
        "Reconciled tags of {:?} {}: {} upserted, {} deleted",
        owner.target, owner.entity_id, outcome.upserted, outcome.deleted
    );

    Ok(outcome)
}
