//! Tag store behavior against a real schema
//!
//! Covers catalog sync interplay with tags, reconciliation scopes, the
//! dimension consistency guard and cached aggregate refresh.

use edim_common::db::programs::{load_program_by_id, save_program, Program};
use edim_common::db::surveys::{create_response, create_survey, load_response};
use edim_common::db::{events, open_in_memory};
use edim_common::dimensions::{save_many, sync_catalog, DimensionSpec, DimensionValueSpec};
use edim_common::tags::{
    build_upsert_cache, build_upsertables, bulk_upsert, refresh_cached_dimensions_for_event,
    set_dimension_values, value_slugs_for, AssignmentMap, CachedDimensions, ReconcileScope,
    TagOwner, TagTarget, TaggedEntity, ValueSlugs,
};
use edim_common::{Error, LocalizedText};
use sqlx::SqlitePool;
use uuid::Uuid;

fn spec(slug: &str, values: &[&str]) -> DimensionSpec {
    DimensionSpec::new(slug, LocalizedText::single("en", slug)).choices(
        values
            .iter()
            .map(|v| DimensionValueSpec::new(*v, LocalizedText::single("en", *v)))
            .collect(),
    )
}

async fn setup() -> (SqlitePool, Uuid, Program) {
    let pool = open_in_memory().await.unwrap();
    let event = events::save_event(&pool, "tracon2024", "Tracon").await.unwrap();

    save_many(
        &pool,
        event.guid,
        &[
            spec("signup", &["konsti", "tickets", "none"]),
            spec("language", &["fi", "en", "sv"]),
            spec("room", &["main-hall", "attic", "cellar"]),
        ],
    )
    .await
    .unwrap();

    let mut program = Program::new(event.guid, "opening", "Opening");
    let mut conn = pool.acquire().await.unwrap();
    program.guid = save_program(&mut conn, &program).await.unwrap();
    drop(conn);

    (pool, event.guid, program)
}

fn map(entries: &[(&str, &[&str])]) -> AssignmentMap {
    entries
        .iter()
        .map(|(dimension, values)| (*dimension, ValueSlugs::from(values.to_vec())))
        .collect()
}

async fn tag_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM program_dimension_values")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_round_trip_yields_assignment_values() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    let mut assignments = map(&[("language", &["fi", "en", ""]), ("room", &[])]);
    assignments.insert("signup", "konsti");

    let rows = build_upsertables(program.tag_owner(), &assignments, &cache).unwrap();
    let mut conn = pool.acquire().await.unwrap();
    let persisted = bulk_upsert(&mut conn, &rows).await.unwrap();
    drop(conn);
    assert_eq!(persisted.len(), 3);

    let slugs = value_slugs_for(&pool, program.tag_owner()).await.unwrap();
    let expected: CachedDimensions = [
        ("language".to_string(), vec!["fi".to_string(), "en".to_string()]),
        ("signup".to_string(), vec!["konsti".to_string()]),
    ]
    .into_iter()
    .collect();
    assert_eq!(slugs, expected);
}

#[tokio::test]
async fn test_bulk_upsert_twice_keeps_one_row_per_value() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();
    let rows = build_upsertables(
        program.tag_owner(),
        &map(&[("signup", &["konsti", "tickets"])]),
        &cache,
    )
    .unwrap();

    let mut conn = pool.acquire().await.unwrap();
    let first = bulk_upsert(&mut conn, &rows).await.unwrap();
    let second = bulk_upsert(&mut conn, &rows).await.unwrap();
    drop(conn);

    assert_eq!(tag_count(&pool).await, 2);
    let mut first_ids: Vec<Uuid> = first.iter().map(|t| t.guid).collect();
    let mut second_ids: Vec<Uuid> = second.iter().map(|t| t.guid).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids, "conflicting rows keep their identity");

    let mismatched: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM program_dimension_values t \
         JOIN dimension_values v ON v.guid = t.value_id \
         WHERE t.dimension_id <> v.dimension_id",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(mismatched, 0);
}

#[tokio::test]
async fn test_tag_with_foreign_dimension_is_rejected() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    let value = cache.value("signup", "konsti").unwrap();
    let other_dimension = cache.dimension("room").unwrap();

    let result = sqlx::query(
        "INSERT INTO program_dimension_values (guid, program_id, dimension_id, value_id) VALUES (?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(program.guid.to_string())
    .bind(other_dimension.guid.to_string())
    .bind(value.guid.to_string())
    .execute(&pool)
    .await;

    assert!(result.is_err());
    assert_eq!(tag_count(&pool).await, 0);
}

#[tokio::test]
async fn test_unknown_slug_writes_nothing() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    let assignments = map(&[("signup", &["konsti"]), ("nonexistent_dimension", &["x"])]);
    let result = set_dimension_values(
        &pool,
        &program,
        &assignments,
        &cache,
        ReconcileScope::Listed,
    )
    .await;

    assert!(matches!(result, Err(Error::UnresolvedSlugs(_))));
    assert_eq!(tag_count(&pool).await, 0);
}

#[tokio::test]
async fn test_listed_scope_only_touches_named_dimensions() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    set_dimension_values(
        &pool,
        &program,
        &map(&[("signup", &["konsti"]), ("language", &["fi", "en"])]),
        &cache,
        ReconcileScope::Listed,
    )
    .await
    .unwrap();

    let outcome = set_dimension_values(
        &pool,
        &program,
        &map(&[("language", &["sv"])]),
        &cache,
        ReconcileScope::Listed,
    )
    .await
    .unwrap();
    assert_eq!(outcome.upserted, 1);
    assert_eq!(outcome.deleted, 2);

    let slugs = value_slugs_for(&pool, program.tag_owner()).await.unwrap();
    assert_eq!(slugs["language"], vec!["sv"]);
    assert_eq!(slugs["signup"], vec!["konsti"]);

    // Empty entry clears just that dimension
    set_dimension_values(
        &pool,
        &program,
        &map(&[("language", &[])]),
        &cache,
        ReconcileScope::Listed,
    )
    .await
    .unwrap();
    let slugs = value_slugs_for(&pool, program.tag_owner()).await.unwrap();
    assert!(!slugs.contains_key("language"));
    assert!(slugs.contains_key("signup"));
}

#[tokio::test]
async fn test_entire_scope_clears_unlisted_dimensions() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    set_dimension_values(
        &pool,
        &program,
        &map(&[("signup", &["konsti"]), ("room", &["attic"])]),
        &cache,
        ReconcileScope::Entire,
    )
    .await
    .unwrap();
    set_dimension_values(
        &pool,
        &program,
        &map(&[("room", &["cellar"])]),
        &cache,
        ReconcileScope::Entire,
    )
    .await
    .unwrap();

    let slugs = value_slugs_for(&pool, program.tag_owner()).await.unwrap();
    let expected: CachedDimensions = [("room".to_string(), vec!["cellar".to_string()])]
        .into_iter()
        .collect();
    assert_eq!(slugs, expected);

    let reloaded = load_program_by_id(&pool, program.guid).await.unwrap().unwrap();
    assert_eq!(reloaded.cached_dimensions, expected);
}

#[tokio::test]
async fn test_catalog_pruning_removes_tags_and_refreshes_cache() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    set_dimension_values(
        &pool,
        &program,
        &map(&[("room", &["main-hall", "cellar"]), ("signup", &["konsti"])]),
        &cache,
        ReconcileScope::Listed,
    )
    .await
    .unwrap();

    // Drop "cellar" from the room choices; other dimensions omitted from the call survive
    let sync = sync_catalog(&pool, event_id, &[spec("room", &["main-hall", "attic"])])
        .await
        .unwrap();
    assert_eq!(sync.values_deleted, 1);

    let slugs = value_slugs_for(&pool, program.tag_owner()).await.unwrap();
    assert_eq!(slugs["room"], vec!["main-hall"]);
    assert_eq!(slugs["signup"], vec!["konsti"]);

    let reloaded = load_program_by_id(&pool, program.guid).await.unwrap().unwrap();
    assert_eq!(reloaded.cached_dimensions, slugs);
}

#[tokio::test]
async fn test_response_tags_and_event_refresh() {
    let (pool, event_id, _program) = setup().await;
    let survey = create_survey(&pool, event_id, "feedback", "Feedback").await.unwrap();
    let response = create_response(&pool, &survey, &Default::default()).await.unwrap();
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    set_dimension_values(
        &pool,
        &response,
        &map(&[("language", &["en"])]),
        &cache,
        ReconcileScope::Entire,
    )
    .await
    .unwrap();

    // Wipe the cache column and let the event-wide refresh rebuild it
    sqlx::query("UPDATE responses SET cached_dimensions = '{}'")
        .execute(&pool)
        .await
        .unwrap();
    let refreshed = refresh_cached_dimensions_for_event(&pool, TagTarget::Response, event_id)
        .await
        .unwrap();
    assert_eq!(refreshed, 1);

    let reloaded = load_response(&pool, survey.guid, response.guid)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.cached_dimensions["language"], vec!["en"]);
    assert_eq!(
        response.tag_owner(),
        TagOwner::response(response.guid, event_id)
    );
}

#[tokio::test]
async fn test_entity_deletion_cascades_tags() {
    let (pool, event_id, program) = setup().await;
    let cache = build_upsert_cache(&pool, event_id).await.unwrap();

    set_dimension_values(
        &pool,
        &program,
        &map(&[("signup", &["konsti"])]),
        &cache,
        ReconcileScope::Listed,
    )
    .await
    .unwrap();
    assert_eq!(tag_count(&pool).await, 1);

    sqlx::query("DELETE FROM programs WHERE guid = ?")
        .bind(program.guid.to_string())
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(tag_count(&pool).await, 0);
}
