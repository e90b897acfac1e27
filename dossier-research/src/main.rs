//! dossier - multi-source person research
//!
//! ```text
//! dossier research "Jane Doe" --employer Acme --format json
//! dossier research "Jane Doe" --fixtures demos/fixtures.json
//! dossier serve --bind 127.0.0.1:5780
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dossier_common::events::EventBus;
use dossier_common::logging::{init_tracing, with_startup_logging};
use dossier_research::adapters::FixtureSet;
use dossier_research::report::{export, ExportFormat};
use dossier_research::{AppState, DossierConfig, HintKind, Query, ResearchError};
use tokio::signal;
use tracing::{info, warn};

/// Command-line arguments for dossier
#[derive(Parser, Debug)]
#[command(name = "dossier")]
#[command(about = "Research a person across public sources")]
#[command(version)]
struct Args {
    /// Config file (overrides DOSSIER_CONFIG and the user config path)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research one person and print the result
    Research {
        /// Full name of the person
        name: String,

        #[arg(long)]
        employer: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        profession: Option<String>,

        #[arg(long)]
        education: Option<String>,

        /// Output format: text, json or csv
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Serve sources from a fixture file instead of the network
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },

    /// Run the HTTP API
    Serve {
        #[arg(short, long, default_value = "127.0.0.1:5780", env = "DOSSIER_BIND")]
        bind: SocketAddr,

        /// Serve sources from a fixture file instead of the network
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config resolution logs before the configured subscriber exists
    let config = with_startup_logging(|| DossierConfig::load(args.config.clone()))
        .context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialize logging")?;

    match args.command {
        Command::Research {
            name,
            employer,
            location,
            profession,
            education,
            format,
            fixtures,
        } => {
            let format: ExportFormat = format.parse()?;
            let query = Query::new(name)?
                .with_optional_hint(HintKind::Employer, employer)
                .with_optional_hint(HintKind::Location, location)
                .with_optional_hint(HintKind::Profession, profession)
                .with_optional_hint(HintKind::Education, education);

            let fixtures = load_fixtures(fixtures.as_ref())?;
            let orchestrator = config.build_orchestrator(fixtures.as_ref())?;

            match orchestrator.research(&query).await {
                Ok(outcome) => {
                    println!("{}", export(&outcome, format)?);
                    Ok(())
                }
                Err(ResearchError::NoSourcesAvailable { coverage }) => {
                    for note in &coverage {
                        eprintln!("{}", note);
                    }
                    anyhow::bail!("No source could be queried for \"{}\"", query.full_name())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Serve { bind, fixtures } => {
            let fixtures = load_fixtures(fixtures.as_ref())?;
            let orchestrator = config.build_orchestrator(fixtures.as_ref())?;

            let state = AppState::new(orchestrator, EventBus::new(100));
            info!(
                "Starting dossier {} with sources: {:?}",
                env!("CARGO_PKG_VERSION"),
                state.orchestrator.source_ids()
            );
            let app = dossier_research::build_router(state);

            let listener = tokio::net::TcpListener::bind(bind)
                .await
                .context("Failed to bind to address")?;
            info!("Listening on http://{}", bind);
            info!("Health check: http://{}/health", bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("Server error")?;

            info!("Server shutdown complete");
            Ok(())
        }
    }
}

fn load_fixtures(path: Option<&PathBuf>) -> Result<Option<FixtureSet>> {
    path.map(|p| FixtureSet::load(p))
        .transpose()
        .context("Failed to load fixtures")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
