use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

mod config;
mod runner;

use binsync_config::validate_sources;
use binsync_queue::RedisBroker;
use binsync_state::{PositionStore, SqlitePositionStore};
use config::ProjectConfig;

#[derive(Parser)]
#[command(name = "binsync")]
#[command(about = "Stream MySQL binlog changes to a downstream queue")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to binsync.toml config file
    #[arg(short, long, default_value = "binsync.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new binsync project
    Init {
        /// Directory to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Start the dispatch loop for one source
    Run {
        /// Source name (may be omitted when only one source is configured)
        #[arg(long)]
        source: Option<String>,
    },

    /// Show persisted binlog positions
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("binsync=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => cmd_init(&path),
        Commands::Run { source } => {
            let config = ProjectConfig::load(&cli.config)?;
            cmd_run(config, source.as_deref()).await
        }
        Commands::Status => {
            let config = ProjectConfig::load(&cli.config)?;
            cmd_status(config)
        }
    }
}

fn cmd_init(path: &PathBuf) -> Result<()> {
    info!(path = %path.display(), "Initializing binsync project");

    fs::create_dir_all(path)?;

    // Create .env.example
    let env_example = r#"# binsync environment variables
# Copy this to .env and fill in your values

# Redis connection URL for the downstream queue
REDIS_URL=redis://127.0.0.1:6379

# Password of the MySQL replication user
MYSQL_PASSWORD=change-me
"#;

    let env_example_path = path.join(".env.example");
    if !env_example_path.exists() {
        fs::write(&env_example_path, env_example)?;
        info!(path = %env_example_path.display(), "Created .env.example");
    }

    // Create default config that references env vars
    let config = r#"# binsync configuration
# Secrets are loaded from .env via ${VAR} references

[state]
path = "binsync-state.db"

[queue]
url = "${REDIS_URL}"
stream_prefix = "binsync:events"

[[sources]]
name = "primary"
host = "127.0.0.1"
port = 3306
user = "repl"
password = "${MYSQL_PASSWORD}"
# Must be unique among the server's replicas
server_id = 1001
report_interval_secs = 10

# Start position used only when no checkpoint has been persisted yet;
# without it a fresh start begins at the source's live head.
# init_log_file = "mysql-bin.000001"
# init_log_offset = 4

# Optional filtering
# skip_ops = ["delete"]
# skip_delete_tables = ["shop.audit_log"]
# skip_update_tables = []

[[sources.databases]]
database = "shop"
tables = ["orders", "customers"]
"#;

    let config_path = path.join("binsync.toml");
    if !config_path.exists() {
        fs::write(&config_path, config)?;
        info!(path = %config_path.display(), "Created binsync.toml");
    } else {
        warn!(path = %config_path.display(), "Config file already exists, skipping");
    }

    println!("\nbinsync project initialized!\n");
    println!("Next steps:");
    println!("  1. Copy .env.example to .env and fill in your credentials");
    println!("  2. Edit binsync.toml for your schemas and tables");
    println!("  3. Run: binsync run\n");

    Ok(())
}

async fn cmd_run(config: ProjectConfig, source: Option<&str>) -> Result<()> {
    validate_sources(&config.sources).context("invalid configuration")?;
    let source_config = config.find_source(source)?;

    info!(source = %source_config.name, "Starting binsync dispatch loop");

    let store = SqlitePositionStore::open(config.state_path())
        .context("Failed to open position store")?;

    let broker = RedisBroker::connect(&config.queue_url(), config.queue.stream_prefix.clone())
        .await
        .context("Failed to connect to queue")?;

    let password = config.source_password(source_config);

    runner::run_dispatch_loop(source_config, password, &store, &broker).await
}

fn cmd_status(config: ProjectConfig) -> Result<()> {
    let store = SqlitePositionStore::open(config.state_path())
        .context("Failed to open position store")?;

    let positions = store.all_positions()?;

    if positions.is_empty() {
        println!("No positions recorded. Run 'binsync run' to start streaming.");
        return Ok(());
    }

    println!("\n{:<12} {:>32}", "Server", "Position");
    println!("{:-<45}", "");

    for (server_id, position) in positions {
        println!("{:<12} {:>32}", server_id, position.to_string());
    }

    println!();
    Ok(())
}
