//! edim-api - HTTP service for dimension catalogs and tags

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edim_api::{build_router, AppState};
use edim_common::api::{create_api_key, grant, AccessAction, AccessScope};
use edim_common::config::{resolve_root_folder, TomlConfig};
use edim_common::db::events::load_event_by_slug;
use edim_common::db::init_database;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for edim-api
#[derive(Parser, Debug)]
#[command(name = "edim-api")]
#[command(about = "HTTP API for event dimensions and tags")]
#[command(version)]
struct Args {
    /// Root folder holding the database
    #[arg(short, long, env = "EDIM_ROOT_FOLDER", global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve {
        /// Address to bind, overrides `[api] bind`
        #[arg(short, long, env = "EDIM_API_BIND")]
        bind: Option<String>,
    },
    /// Issue an API key with one grant and print it
    CreateKey {
        #[arg(long)]
        label: String,
        /// Event slug; omit to grant on every event
        #[arg(long)]
        event: Option<String>,
        /// dimensions, program or response
        #[arg(long)]
        scope: AccessScope,
        /// query or mutation
        #[arg(long, default_value = "query")]
        action: AccessAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=debug", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = config.database_path(&root_folder);
    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    match args.command {
        Command::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| config.api_bind().to_string());
            if config.api.auth_disabled {
                warn!("API key checks are disabled");
            }

            let state = AppState::new(pool.clone(), config.api.auth_disabled, config.language());
            let app = build_router(state);

            info!("Starting HTTP server on {}", addr);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind to {}", addr))?;

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;

            info!("Server shutdown complete");
        }
        Command::CreateKey {
            label,
            event,
            scope,
            action,
        } => {
            let event_id = match event.as_deref() {
                Some(slug) => Some(
                    load_event_by_slug(&pool, slug)
                        .await?
                        .with_context(|| format!("Unknown event '{}'", slug))?
                        .guid,
                ),
                None => None,
            };

            let key = create_api_key(&pool, &label).await?;
            grant(&pool, &key, event_id, scope, action).await?;
            info!(
                "Created key '{}' with {} {} on {}",
                label,
                scope,
                action,
                event.as_deref().unwrap_or("all events")
            );
            println!("{}", key);
        }
    }

    pool.close().await;
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
