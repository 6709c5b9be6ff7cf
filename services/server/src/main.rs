// radar-server: the TeamRadar central server.
//
// Clients connect over TCP, greet with a unique user name, join a project
// group, and exchange activity events, chat and identity metadata. Every
// event lands in the SQLite log for later replay and phase clustering.

use clap::Parser;
use radar_server::blob::PhotoStore;
use radar_server::db::Db;
use radar_server::hub::Hub;
use radar_server::{config, listener};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "radar-server", version, about = "TeamRadar central server")]
struct Args {
    /// Path to the TOML config file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured listen port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut cfg = match config::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = args.port {
        cfg.server.port = port;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = cfg.server.port,
        sqlite_path = %cfg.storage.sqlite_path,
        "radar-server starting"
    );

    let db = Db::open(Path::new(&cfg.storage.sqlite_path)).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to open database: {e}");
        std::process::exit(1);
    });
    // Nobody is connected yet: clear stale online flags left by a previous
    // unclean shutdown.
    db.make_all_offline().unwrap_or_else(|e| {
        eprintln!("FATAL: failed to reset user presence: {e}");
        std::process::exit(1);
    });
    let photos = PhotoStore::new(&cfg.storage.photo_dir).unwrap_or_else(|e| {
        eprintln!("FATAL: failed to create photo dir: {e}");
        std::process::exit(1);
    });

    let hub = Hub::new(db, photos).spawn();

    let (_port_tx, port_rx) = watch::channel(cfg.server.port);
    tokio::select! {
        result = listener::run(port_rx, hub, cfg.limits.write_queue_cap) => {
            if let Err(e) = result {
                eprintln!("FATAL: listener failed: {e}");
                std::process::exit(1);
            }
        }
        () = shutdown_signal() => info!("shutting down"),
    }
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        _ = terminate => {},
    }
}
