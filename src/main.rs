//! # Upkeep: Maintenance Scheduling Engine
//!
//! Usage:
//!   upkeep serve                          # HTTP gateway + periodic sweeper
//!   upkeep sweep                          # Run one due check and print the report
//!   upkeep init-config                    # Write the default config file
//!   upkeep add-asset boiler-1 "Boiler"    # Register an asset name

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use upkeep_core::UpkeepConfig;
use upkeep_scheduler::{MaintenanceDb, SweepEngine};

#[derive(Parser)]
#[command(
    name = "upkeep",
    version,
    about = "🔧 Upkeep: maintenance scheduling and overdue notifications"
)]
struct Cli {
    /// Config file (defaults to $UPKEEP_CONFIG or ~/.upkeep/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP gateway and the periodic sweeper
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run a single due check and exit
    Sweep,
    /// Write the default configuration and exit
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Register or rename an asset
    AddAsset { id: String, name: String },
}

fn config_path(cli: &Cli) -> Option<PathBuf> {
    cli.config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
}

fn load_config(cli: &Cli) -> Result<UpkeepConfig> {
    Ok(match config_path(cli) {
        Some(path) => UpkeepConfig::load_from(&path)?,
        None => UpkeepConfig::load()?,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "upkeep=debug,upkeep_scheduler=debug,upkeep_gateway=debug,tower_http=debug"
    } else {
        "upkeep=info,upkeep_scheduler=info,upkeep_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    match &cli.command {
        Command::InitConfig { force } => {
            let path = config_path(&cli).unwrap_or_else(UpkeepConfig::default_path);
            if path.exists() && !force {
                println!("⚠️  Config already exists: {} (use --force to overwrite)", path.display());
                return Ok(());
            }
            UpkeepConfig::default().save_to(&path)?;
            println!("✅ Config written: {}", path.display());
        }
        Command::AddAsset { id, name } => {
            let config = load_config(&cli)?;
            let db = MaintenanceDb::open(&config.database.resolved_path())?;
            db.upsert_asset(id, name)?;
            println!("✅ Asset {id} → {name}");
        }
        Command::Sweep => {
            let config = load_config(&cli)?;
            let db = Arc::new(MaintenanceDb::open(&config.database.resolved_path())?);
            let engine = SweepEngine::from_config(db, &config.scheduler)?;
            let report = tokio::task::spawn_blocking(move || engine.run_due_check(chrono::Utc::now())).await??;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve { port } => {
            let mut config = load_config(&cli)?;
            if let Some(port) = port {
                config.gateway.port = *port;
            }
            println!("🔧 Upkeep v{}", env!("CARGO_PKG_VERSION"));
            println!("   🌐 API:      http://{}:{}/api/v1", config.gateway.host, config.gateway.port);
            println!("   🗄️  Database: {}", config.database.resolved_path().display());
            println!("   ⏰ Sweep:    every {}s", config.scheduler.check_interval_secs);
            println!();
            upkeep_gateway::start(config).await?;
        }
    }

    Ok(())
}
