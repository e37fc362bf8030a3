use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use gemgrid_engine::GameRegistry;
use gemgrid_store::{Database, GameRepo};
use gemgrid_telemetry::{init_telemetry, TelemetryConfig};

/// Two-player diamond hunt: game server with WebSocket play and SQLite
/// persistence.
#[derive(Debug, Parser)]
#[command(name = "gemgrid", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 9090)]
    port: u16,

    /// Path to the game database. Defaults to ~/.gemgrid/games.db.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Advertised WebSocket URL, e.g. wss://example.com/ws.
    #[arg(long)]
    ws_url: Option<String>,

    /// Disable persisting warn+ logs to SQLite.
    #[arg(long)]
    no_log_db: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _telemetry = init_telemetry(TelemetryConfig {
        log_to_sqlite: !cli.no_log_db,
        ..TelemetryConfig::default()
    });

    tracing::info!("Starting gemgrid server");

    let db_path = cli.db_path.unwrap_or_else(|| {
        let dir = dirs_home().join(".gemgrid");
        std::fs::create_dir_all(&dir).expect("Failed to create data directory");
        dir.join("games.db")
    });

    let db = Database::open(&db_path).expect("Failed to open database");
    tracing::info!(path = %db_path.display(), "Database opened");

    let games = Arc::new(GameRegistry::new(Some(GameRepo::new(db))));
    let rehydrated = games.hydrate().expect("Failed to reload games");
    if rehydrated > 0 {
        tracing::info!(count = rehydrated, "Unfinished games reloaded");
    }

    let config = gemgrid_server::ServerConfig {
        port: cli.port,
        public_ws_url: cli.ws_url,
        ..Default::default()
    };
    let handle = gemgrid_server::start(config, games)
        .await
        .expect("Failed to start server");

    tracing::info!(port = handle.port, "Gemgrid server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
