//! Import runs against an in-memory database

use edim_common::db::events::save_event;
use edim_common::db::programs::{list_programs, load_program};
use edim_common::db::schedule::list_schedule_items;
use edim_common::db::{open_in_memory, Program};
use edim_common::tags::{value_slugs_for, TaggedEntity};
use edim_im::source::{SourceProgramme, SourceRoom};
use edim_im::{
    run_import, DefaultImporter, DerivedDimensions, ImportContext, ImportError, ImportOptions, Importer,
    SourceCatalog, TraconImporter,
};
use sqlx::SqlitePool;
use std::path::Path;

fn fixture() -> SourceCatalog {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/tracon2024.json");
    SourceCatalog::from_file(&path).unwrap()
}

async fn setup(source: SourceCatalog) -> (SqlitePool, ImportContext) {
    let pool = open_in_memory().await.unwrap();
    let event = save_event(&pool, &source.event.slug, &source.event.name).await.unwrap();
    let ctx = ImportContext::new(event, source, chrono_tz::Europe::Helsinki, "fi");
    (pool, ctx)
}

async fn program(pool: &SqlitePool, ctx: &ImportContext, slug: &str) -> Program {
    load_program(pool, ctx.event.guid, slug).await.unwrap().unwrap()
}

async fn tag_guids(pool: &SqlitePool) -> Vec<String> {
    sqlx::query_scalar("SELECT guid FROM program_dimension_values ORDER BY guid")
        .fetch_all(pool)
        .await
        .unwrap()
}

fn sorted(values: &[String]) -> Vec<&str> {
    let mut values: Vec<&str> = values.iter().map(String::as_str).collect();
    values.sort();
    values
}

#[tokio::test]
async fn test_tracon_import_tags_every_programme() {
    let (pool, ctx) = setup(fixture()).await;
    let importer = TraconImporter::new(ctx.clone());

    let report = run_import(&pool, &importer, ImportOptions::default()).await.unwrap();
    assert_eq!(report.programs_imported, 4);
    assert!(report.failures.is_empty());
    assert_eq!(report.dimensions, 8);

    let dnd = program(&pool, &ctx, "dnd-adventure").await;
    let tags = value_slugs_for(&pool, dnd.tag_owner()).await.unwrap();
    assert_eq!(sorted(&tags["signup"]), vec!["konsti", "tickets"]);
    assert_eq!(tags["konsti"], vec!["tabletopRPG"]);
    assert_eq!(tags["audience"], vec!["r18"]);
    assert_eq!(tags["room"], vec!["pelisali"]);
    assert_eq!(dnd.annotations["internal:links:signup"], "");
    assert_eq!(dnd.annotations["internal:links:tickets"], "https://www.lippu.fi/event/tracon-2024");

    // Cached aggregate matches the persisted tags
    assert_eq!(dnd.cached_dimensions, tags);

    let opening = program(&pool, &ctx, "opening").await;
    assert_eq!(opening.cached_dimensions["accessibility"], vec!["flashing-lights"]);
    assert_eq!(opening.cached_dimensions["language"], vec!["fi"]);
    assert_eq!(opening.cached_dimensions["signup"], vec!["none"]);
    assert_eq!(opening.cached_dimensions["category"], vec!["anime"]);
    assert!(!opening.cached_dimensions.contains_key("konsti"));
}

#[tokio::test]
async fn test_private_category_and_late_night_date() {
    let (pool, ctx) = setup(fixture()).await;
    let importer = TraconImporter::new(ctx.clone());
    run_import(&pool, &importer, ImportOptions::default()).await.unwrap();

    let briefing = program(&pool, &ctx, "crew-briefing").await;
    assert!(!briefing.cached_dimensions.contains_key("category"));
    // 02:30 local on Sunday still counts as Saturday
    assert_eq!(briefing.cached_dimensions["date"], vec!["2024-09-07"]);
    // Rooms only seen on programmes still get a value
    assert_eq!(briefing.cached_dimensions["room"], vec!["kokoushuone"]);
}

#[tokio::test]
async fn test_fleamarket_slots_are_stored() {
    let (pool, ctx) = setup(fixture()).await;
    let importer = TraconImporter::new(ctx.clone());
    run_import(&pool, &importer, ImportOptions::default()).await.unwrap();

    let fleamarket = program(&pool, &ctx, "kirpputorin-ajanvaraus-lauantai").await;
    assert_eq!(fleamarket.annotations["konsti:maxAttendance"], 130);

    let items = list_schedule_items(&pool, fleamarket.guid).await.unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item.slot.is_some()));
    assert!(items.iter().all(|item| item.cached_location == "Pelisali"));

    let opening = program(&pool, &ctx, "opening").await;
    let items = list_schedule_items(&pool, opening.guid).await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].slot.is_none());
}

#[tokio::test]
async fn test_reimport_is_idempotent() {
    let (pool, ctx) = setup(fixture()).await;
    let importer = TraconImporter::new(ctx.clone());

    run_import(&pool, &importer, ImportOptions::default()).await.unwrap();
    let programs_before = list_programs(&pool, ctx.event.guid).await.unwrap();
    let tags_before = tag_guids(&pool).await;

    let report = run_import(&pool, &importer, ImportOptions::default()).await.unwrap();
    assert_eq!(report.values_deleted, 0);
    assert_eq!(report.tags_deleted, 0);

    let programs_after = list_programs(&pool, ctx.event.guid).await.unwrap();
    assert_eq!(programs_before, programs_after);
    assert_eq!(tags_before, tag_guids(&pool).await);

    // Schedule items are replaced, not duplicated
    let fleamarket = program(&pool, &ctx, "kirpputorin-ajanvaraus-lauantai").await;
    assert_eq!(list_schedule_items(&pool, fleamarket.guid).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_changed_source_replaces_tags() {
    let (pool, ctx) = setup(fixture()).await;
    run_import(&pool, &TraconImporter::new(ctx.clone()), ImportOptions::default())
        .await
        .unwrap();
    let before = program(&pool, &ctx, "opening").await;

    let mut source = fixture();
    let opening = source
        .programmes
        .iter_mut()
        .find(|p| p.slug == "opening")
        .unwrap();
    opening.room = Some("Pelisali".to_string());
    opening.has_flashing_lights = false;
    opening.is_using_paikkala = true;
    let ctx = ImportContext::new(ctx.event.clone(), source, chrono_tz::Europe::Helsinki, "fi");

    let report = run_import(&pool, &TraconImporter::new(ctx.clone()), ImportOptions::default())
        .await
        .unwrap();
    assert!(report.tags_deleted >= 3);

    let after = program(&pool, &ctx, "opening").await;
    assert_eq!(after.guid, before.guid);
    assert_eq!(after.cached_dimensions["room"], vec!["pelisali"]);
    assert_eq!(after.cached_dimensions["signup"], vec!["paikkala"]);
    assert!(!after.cached_dimensions.contains_key("accessibility"));
    assert_eq!(
        after.annotations["internal:links:reservation"],
        "https://kompassi.eu/profile/reservations"
    );
}

/// Emits a dimension the catalog never declares for one programme
struct UndeclaredMood {
    inner: DefaultImporter,
}

impl Importer for UndeclaredMood {
    fn context(&self) -> &ImportContext {
        self.inner.context()
    }

    fn get_program_dimension_values(&self, programme: &SourceProgramme) -> DerivedDimensions {
        let mut dimensions = self.inner.get_program_dimension_values(programme);
        if programme.slug == "opening" {
            dimensions.add("mood", "festive");
        }
        dimensions
    }
}

#[tokio::test]
async fn test_unresolved_programme_aborts_by_default() {
    let (pool, ctx) = setup(fixture()).await;
    let importer = UndeclaredMood {
        inner: DefaultImporter::new(ctx.clone()),
    };

    let err = run_import(&pool, &importer, ImportOptions::default()).await.unwrap_err();
    match err {
        ImportError::Programme { slug, source } => {
            assert_eq!(slug, "opening");
            assert!(matches!(source, edim_common::Error::UnresolvedSlugs(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Nothing written for the failed programme
    assert!(load_program(&pool, ctx.event.guid, "opening").await.unwrap().is_none());
}

#[tokio::test]
async fn test_keep_going_reports_failures() {
    let (pool, ctx) = setup(fixture()).await;
    let importer = UndeclaredMood {
        inner: DefaultImporter::new(ctx.clone()),
    };

    let report = run_import(&pool, &importer, ImportOptions { fail_fast: false })
        .await
        .unwrap();

    assert_eq!(report.programs_imported, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].slug, "opening");
    assert!(report.failures[0].error.contains("mood"));
    assert!(load_program(&pool, ctx.event.guid, "opening").await.unwrap().is_none());

    let dnd = program(&pool, &ctx, "dnd-adventure").await;
    assert_eq!(dnd.cached_dimensions["category"], vec!["roolipelit"]);
    assert!(!dnd.cached_dimensions.contains_key("signup"));
}

#[tokio::test]
async fn test_rooms_with_colliding_slugs_import() {
    let mut source = fixture();
    let names = ["Sali", "SALI", "Sali 2"];
    source.rooms = names
        .iter()
        .map(|name| SourceRoom {
            name: name.to_string(),
        })
        .collect();
    for (programme, name) in source.programmes.iter_mut().zip(names) {
        programme.room = Some(name.to_string());
    }
    let (pool, ctx) = setup(source).await;

    let slugs: Vec<&str> = ctx.rooms().iter().map(|(_, slug)| slug.as_str()).collect();
    assert_eq!(slugs, vec!["sali", "sali-2", "sali-2-2", "kokoushuone"]);

    let importer = DefaultImporter::new(ctx.clone());
    let report = run_import(&pool, &importer, ImportOptions::default()).await.unwrap();
    assert_eq!(report.programs_imported, 4);

    assert_eq!(program(&pool, &ctx, "opening").await.cached_dimensions["room"], vec!["sali"]);
    assert_eq!(program(&pool, &ctx, "dnd-adventure").await.cached_dimensions["room"], vec!["sali-2"]);
    assert_eq!(
        program(&pool, &ctx, "kirpputorin-ajanvaraus-lauantai")
            .await
            .cached_dimensions["room"],
        vec!["sali-2-2"]
    );
}

#[tokio::test]
async fn test_out_of_range_length_is_a_programme_failure() {
    let mut source = fixture();
    source.programmes[2].length = Some(i64::MAX);
    source.programmes[2].end_time = None;
    let (pool, ctx) = setup(source).await;
    let importer = TraconImporter::new(ctx.clone());

    let report = run_import(&pool, &importer, ImportOptions { fail_fast: false })
        .await
        .unwrap();

    assert_eq!(report.programs_imported, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].slug, "kirpputorin-ajanvaraus-lauantai");
    assert!(report.failures[0].error.contains("length"));
    assert!(load_program(&pool, ctx.event.guid, "kirpputorin-ajanvaraus-lauantai")
        .await
        .unwrap()
        .is_none());

    let err = run_import(&pool, &importer, ImportOptions::default()).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::Programme {
            source: edim_common::Error::InvalidInput(_),
            ..
        }
    ));
}
