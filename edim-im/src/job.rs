//! Import run
//!
//! 1. Sync the importer's catalog for the event
//! 2. Build the upsert cache once
//! 3. Per programme: derive, resolve, then write the program row, its tags and
//!    schedule items in one transaction
//! 4. Refresh cached dimensions of every program in the event

use crate::importer::Importer;
use crate::source::SourceProgramme;
use crate::{ImportError, Result};
use edim_common::db::programs::{list_programs, save_program};
use edim_common::db::schedule::replace_schedule_items;
use edim_common::db::Program;
use edim_common::dimensions::sync_catalog;
use edim_common::tags::{
    apply, build_upsert_cache, refresh_cached_dimensions_for_event, resolve, ReconcileScope,
    TagTarget, TaggedEntity, UpsertCache,
};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Abort on the first programme that fails to resolve
    pub fail_fast: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { fail_fast: true }
    }
}

/// A programme skipped because its source row is invalid or its derivation
/// did not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportFailure {
    pub slug: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub dimensions: usize,
    pub values_deleted: u64,
    pub programs_imported: usize,
    pub tags_upserted: u64,
    pub tags_deleted: u64,
    pub schedule_items: usize,
    pub failures: Vec<ImportFailure>,
}

/// Run a full import for the importer's event
pub async fn run_import<I: Importer + ?Sized>(
    pool: &SqlitePool,
    importer: &I,
    options: ImportOptions,
) -> Result<ImportReport> {
    let ctx = importer.context();
    let event_id = ctx.event.guid;
    let mut report = ImportReport::default();

    info!(
        "Importing {} programmes into event {}",
        ctx.source.programmes.len(),
        ctx.event.slug
    );

    let specs = importer.get_dimensions();
    let sync = sync_catalog(pool, event_id, &specs).await?;
    report.dimensions = sync.dimensions.len();
    report.values_deleted = sync.values_deleted;

    let cache = build_upsert_cache(pool, event_id).await?;

    let existing: HashMap<String, Uuid> = list_programs(pool, event_id)
        .await?
        .into_iter()
        .map(|program| (program.slug, program.guid))
        .collect();

    for programme in &ctx.source.programmes {
        match import_programme(pool, importer, &cache, &existing, programme).await {
            Ok(written) => {
                report.programs_imported += 1;
                report.tags_upserted += written.tags_upserted;
                report.tags_deleted += written.tags_deleted;
                report.schedule_items += written.schedule_items;
            }
            Err(err) if options.fail_fast => return Err(err),
            Err(err) => {
                warn!("Skipping programme {}: {}", programme.slug, err);
                report.failures.push(ImportFailure {
                    slug: programme.slug.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    refresh_cached_dimensions_for_event(pool, TagTarget::Program, event_id).await?;

    info!(
        "Import finished: {} programs, {} tags written, {} tags removed, {} schedule items, {} failures",
        report.programs_imported,
        report.tags_upserted,
        report.tags_deleted,
        report.schedule_items,
        report.failures.len()
    );

    Ok(report)
}

struct ProgrammeWrites {
    tags_upserted: u64,
    tags_deleted: u64,
    schedule_items: usize,
}

async fn import_programme<I: Importer + ?Sized>(
    pool: &SqlitePool,
    importer: &I,
    cache: &UpsertCache,
    existing: &HashMap<String, Uuid>,
    programme: &SourceProgramme,
) -> Result<ProgrammeWrites> {
    let ctx = importer.context();
    let programme_error = |source: edim_common::Error| ImportError::Programme {
        slug: programme.slug.clone(),
        source,
    };

    programme.validate().map_err(programme_error)?;

    let mut program = Program::new(ctx.event.guid, &programme.slug, &programme.title);
    if let Some(guid) = existing.get(&programme.slug) {
        program.guid = *guid;
    }
    program.description = programme.description.clone();
    program.cached_location = programme.room.clone().unwrap_or_default();

    // Derivation and resolution happen before anything is written
    let assignments = importer
        .get_program_dimension_values(programme)
        .into_assignment_map();
    program.annotations = importer.get_program_annotations(programme);
    let resolved = resolve(program.tag_owner(), &assignments, cache, ReconcileScope::Entire)
        .map_err(programme_error)?;
    let schedule_items = importer.get_schedule_items(programme, &program);

    let mut tx = pool.begin().await?;
    let guid = save_program(&mut tx, &program).await.map_err(programme_error)?;
    if guid != program.guid {
        return Err(programme_error(edim_common::Error::Internal(format!(
            "program guid changed during import ({} -> {})",
            program.guid, guid
        ))));
    }
    let outcome = apply(&mut tx, program.tag_owner(), &resolved).await?;
    replace_schedule_items(&mut tx, program.guid, &schedule_items).await?;
    tx.commit().await?;

    debug!(
        "Imported {}: {} tags, {} schedule items",
        programme.slug,
        resolved.rows.len(),
        schedule_items.len()
    );

    Ok(ProgrammeWrites {
        tags_upserted: outcome.upserted,
        tags_deleted: outcome.deleted,
        schedule_items: schedule_items.len(),
    })
}
