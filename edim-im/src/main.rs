//! edim-im - programme importer
//!
//! Reads a legacy programme export, syncs the event's dimension catalog and
//! tags every programme.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use edim_common::config::{resolve_root_folder, TomlConfig};
use edim_common::db::events::save_event;
use edim_common::db::init_database;
use edim_im::{run_import, DefaultImporter, ImportContext, ImportOptions, Importer, SourceCatalog, TraconImporter};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImporterKind {
    /// Date, category and room only
    Default,
    /// Tracon rules
    Tracon,
}

/// Command-line arguments for edim-im
#[derive(Parser, Debug)]
#[command(name = "edim-im")]
#[command(about = "Import a programme export and derive its dimension tags")]
#[command(version)]
struct Args {
    /// Programme export (JSON)
    source: PathBuf,

    /// Derivation rules to apply
    #[arg(short, long, value_enum, default_value = "default")]
    importer: ImporterKind,

    /// Root folder holding the database
    #[arg(short, long, env = "EDIM_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Skip programmes that fail to resolve instead of aborting
    #[arg(long)]
    keep_going: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let source = SourceCatalog::from_file(&args.source)
        .with_context(|| format!("Failed to read {}", args.source.display()))?;
    let event = save_event(&pool, &source.event.slug, &source.event.name)
        .await
        .context("Failed to save event")?;

    let context = ImportContext::new(
        event,
        source,
        config.timezone().context("Invalid timezone")?,
        config.language(),
    );
    let importer: Box<dyn Importer> = match args.importer {
        ImporterKind::Default => Box::new(DefaultImporter::new(context)),
        ImporterKind::Tracon => Box::new(TraconImporter::new(context)),
    };

    let options = ImportOptions {
        fail_fast: !args.keep_going,
    };
    let report = run_import(&pool, importer.as_ref(), options)
        .await
        .context("Import failed")?;

    for failure in &report.failures {
        warn!("{}: {}", failure.slug, failure.error);
    }
    info!(
        "Imported {} programs with {} dimensions",
        report.programs_imported, report.dimensions
    );

    pool.close().await;
    Ok(())
}
