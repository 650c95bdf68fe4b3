//! codegraph binary — thin CLI shell over the [`codegraph`] library crate.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use codegraph::api::{self, AppState};
use codegraph::config::ServerConfig;
use codegraph::ingest::IngestService;
use codegraph::progress::ProgressHub;
use codegraph::store::{GraphStore, SqliteStore};
use codegraph::types::{ParseRequest, SourceKind};

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Repository ingestion server — builds and serves a knowledge graph of code.
#[derive(Parser)]
#[command(name = "codegraph", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: ./codegraph.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Port for the HTTP surface (overrides config; PORT env also honored)
    #[arg(long)]
    port: Option<u16>,

    /// Bind to 0.0.0.0 instead of 127.0.0.1 (localhost)
    #[arg(long)]
    bind_all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse one repository to completion and print the result as JSON
    Parse {
        /// Human-readable name for the source
        #[arg(long)]
        name: String,

        /// Remote repository URL (cloned shallowly)
        #[arg(long)]
        url: Option<String>,

        /// Local repository path
        #[arg(long)]
        path: Option<PathBuf>,

        /// Branch to clone
        #[arg(long, default_value = "main")]
        branch: String,

        /// Restrict parsing to these languages (repeatable)
        #[arg(long = "language")]
        languages: Vec<String>,

        /// Size ceiling per file in KB
        #[arg(long, default_value_t = 500)]
        max_file_size_kb: u64,

        /// Per-file parse budget in seconds
        #[arg(long, default_value_t = 30)]
        parse_timeout_seconds: u64,

        /// Skip the cross-file relationship passes
        #[arg(long)]
        no_cross_file: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Graceful shutdown signal
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codegraph=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "codegraph", &mut std::io::stdout());
        return;
    }

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from("codegraph.toml"));
    let mut config = ServerConfig::load(&config_path);
    if let Some(db) = &cli.db {
        config.database_path = db.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let store = match SqliteStore::open(&config.database_path) {
        Ok(store) => store,
        Err(e) => {
            error!(db = %config.database_path.display(), error = %e, "Could not open database");
            std::process::exit(1);
        }
    };
    let store: Arc<dyn GraphStore> = Arc::new(store);
    let progress = Arc::new(ProgressHub::new());
    let service = Arc::new(IngestService::new(store, progress));

    // One-shot parse mode
    if let Some(Commands::Parse {
        name,
        url,
        path,
        branch,
        languages,
        max_file_size_kb,
        parse_timeout_seconds,
        no_cross_file,
    }) = cli.command
    {
        let request = ParseRequest {
            source_kind: SourceKind::ProjectRepository,
            name,
            repository_url: url,
            local_path: path.map(|p| p.display().to_string()),
            branch_name: branch,
            external_source_id: None,
            external_project_id: None,
            languages: if languages.is_empty() { None } else { Some(languages) },
            max_file_size_kb,
            parse_timeout_seconds,
            enable_cross_file_refs: !no_cross_file,
        };
        let result = service.parse_repository(request).await;
        println!("{}", serde_json::to_string_pretty(&result).unwrap());
        std::process::exit(if result.success { 0 } else { 1 });
    }

    // Server mode
    let state = AppState::new(service);
    let app = api::router(state);

    let bind_addr = if cli.bind_all { "0.0.0.0".to_string() } else { config.bind_addr.clone() };
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.port);

    let listener = match tokio::net::TcpListener::bind(format!("{bind_addr}:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port = port, error = %e, "Could not bind to port");
            eprintln!("  Try: PORT=<port> codegraph");
            std::process::exit(1);
        }
    };

    info!(db = %config.database_path.display(), "Store ready");
    info!(port = port, "http://localhost:{port}/api/kg/health");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await.unwrap();
}
