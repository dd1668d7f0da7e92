// src/main.rs

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use dust_tracker::server::routes::{assemble, PackageFilter};
use dust_tracker::{
    parse_duration, PacmanCatalog, ProcSnapshot, ScanScheduler, TrackerConfig,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dust")]
#[command(author, version, about = "Tracks which installed packages are actively used and which are gathering dust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the usage ledger database
    Init {
        /// Ledger database path (default: ~/.local/share/dust/dust.db)
        #[arg(short, long)]
        db_path: Option<PathBuf>,
    },
    /// Run one scan, print summary stats, and exit
    Scan {
        /// Ledger database path (default: ~/.local/share/dust/dust.db)
        #[arg(short, long)]
        db_path: Option<PathBuf>,
    },
    /// Run the scan scheduler and HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8765")]
        bind: SocketAddr,
        /// Ledger database path (default: ~/.local/share/dust/dust.db)
        #[arg(short, long)]
        db_path: Option<PathBuf>,
        /// Pause between automatic scans (e.g. 90s, 15m, 1h)
        #[arg(short, long, default_value = "15m")]
        interval: String,
    },
}

fn base_config(db_path: Option<PathBuf>) -> TrackerConfig {
    match db_path {
        Some(path) => TrackerConfig::default().with_db_path(path),
        None => TrackerConfig::default(),
    }
}

fn build_scheduler(config: TrackerConfig) -> Arc<ScanScheduler> {
    if !PacmanCatalog::is_available() {
        warn!("pacman not found on PATH; scans will fail until it is installed");
    }
    ScanScheduler::new(config, Arc::new(PacmanCatalog), Arc::new(ProcSnapshot::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_path } => {
            let config = base_config(db_path);
            dust_tracker::db::init(&config.db_path)?;
            println!("Ledger initialized at: {}", config.db_path.display());
            Ok(())
        }
        Commands::Scan { db_path } => {
            let config = base_config(db_path);
            let scheduler = build_scheduler(config.clone());

            let outcome = scheduler.scan_once().await?;
            println!(
                "Scan complete: {} package(s) observed running, {} unresolved path(s), {} ms",
                outcome.observed, outcome.unresolved, outcome.duration_ms
            );

            let conn = dust_tracker::db::open(&config.db_path)?;
            let records = dust_tracker::ledger::get_all(&conn)?;
            let metas = scheduler.catalog_metas().await;
            let (_, stats) = assemble(&records, &metas, Utc::now(), PackageFilter::All);
            println!("Total packages:   {}", stats.total);
            println!("Unused (7+ days): {}", stats.unused_week);
            println!("Dusty explicit:   {}", stats.dusty_explicit);
            Ok(())
        }
        Commands::Serve {
            bind,
            db_path,
            interval,
        } => {
            let config = base_config(db_path)
                .with_bind(bind)
                .with_scan_interval(parse_duration(&interval)?);
            info!("Starting dust tracker (ledger: {})", config.db_path.display());

            let scheduler = build_scheduler(config.clone());

            // Seed newly installed packages as "seen now" before serving.
            if let Err(e) = scheduler.reconcile().await {
                warn!("Startup reconciliation failed: {}", e);
            }

            tokio::spawn(Arc::clone(&scheduler).run_timer());
            dust_tracker::server::run_server(config, scheduler).await?;
            Ok(())
        }
    }
}
