use autorecover::application::ingestor::RecoveryIngestor;
use autorecover::application::links::TokenLinkGenerator;
use autorecover::application::query::QueryService;
use autorecover::config::{EngineConfig, ServeConfig};
use autorecover::domain::ports::RecordStoreRef;
use autorecover::infrastructure::in_memory::InMemoryRecordStore;
use autorecover::interfaces::csv::event_reader::EventReader;
use autorecover::interfaces::http::{AppState, create_router};
use autorecover::telemetry;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the stats read API and the inbound event endpoint
    Serve {
        #[command(flatten)]
        engine: EngineConfig,
        #[command(flatten)]
        serve: ServeConfig,
    },
    /// Apply the events of a CSV file and print the resulting stats as JSON
    Replay {
        /// Input events CSV file (`type, invoice, email`)
        input: std::path::PathBuf,
        #[command(flatten)]
        engine: EngineConfig,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    match Cli::parse().command {
        Command::Serve { engine, serve } => run_server(engine, serve).await,
        Command::Replay { input, engine } => {
            let (ingestor, query) = build(&engine)?;
            replay(&ingestor, &input).await?;

            let stats = query.get_stats().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            serde_json::to_writer_pretty(&mut out, &stats).into_diagnostic()?;
            writeln!(out).into_diagnostic()?;
            Ok(())
        }
    }
}

fn open_store(engine: &EngineConfig) -> Result<RecordStoreRef> {
    #[cfg(feature = "storage-rocksdb")]
    {
        if let Some(db_path) = &engine.db_path {
            use autorecover::infrastructure::rocksdb::RocksDbRecordStore;

            tracing::info!(path = %db_path.display(), "Opening RocksDB record store");
            let store = RocksDbRecordStore::open(db_path).into_diagnostic()?;
            return Ok(Arc::new(store));
        }
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    {
        if engine.db_path.is_some() {
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }

    Ok(Arc::new(InMemoryRecordStore::new()))
}

fn build(engine: &EngineConfig) -> Result<(Arc<RecoveryIngestor>, QueryService)> {
    let store = open_store(engine)?;
    let links = TokenLinkGenerator::new(&engine.link_base_url).into_diagnostic()?;

    let ingestor = RecoveryIngestor::new(
        Arc::clone(&store),
        Arc::new(links),
        engine.link_policy,
        engine.storage_timeout(),
    );
    let query = QueryService::new(store, engine.storage_timeout());
    Ok((Arc::new(ingestor), query))
}

/// Feeds every event of `path` to the ingestor. Unreadable rows and rejected
/// events are logged and skipped; storage errors abort the replay.
async fn replay(ingestor: &RecoveryIngestor, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let reader = EventReader::new(file);
    let (mut applied, mut skipped) = (0usize, 0usize);

    for event_result in reader.events() {
        match event_result {
            Ok(event) => match ingestor.ingest(event).await {
                Ok(_) => applied += 1,
                Err(e) if e.is_retryable() => return Err(e).into_diagnostic(),
                Err(_) => skipped += 1,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Error reading event");
                skipped += 1;
            }
        }
    }

    tracing::info!(path = %path.display(), applied, skipped, "Replay finished");
    Ok(())
}

async fn run_server(engine: EngineConfig, serve: ServeConfig) -> Result<()> {
    tracing::info!("Starting autorecover v{}", env!("CARGO_PKG_VERSION"));
    let (ingestor, query) = build(&engine)?;

    if let Some(seed) = &serve.seed_events {
        replay(&ingestor, seed).await?;
    }

    let app = create_router(AppState { ingestor, query });

    let listener = tokio::net::TcpListener::bind(serve.addr)
        .await
        .into_diagnostic()?;
    tracing::info!(addr = %serve.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .into_diagnostic()?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl-C, or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to set up SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "Signal received"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "Signal received"),
    }
}
