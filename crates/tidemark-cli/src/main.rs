mod confirm;
mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tidemark_config::{ConfigLoader, MigrationsConfig};
use tidemark_core::{DEFAULT_CHANNEL, Migrator};
use tidemark_db::{ControlStore, SqliteControlStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tidemark", version, about = "Inspect and administer migration control records")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to ~/.tidemark/tidemark.{yml,yaml,toml}.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database holding the control records.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the recorded version of a channel.
    Version {
        #[arg(long, default_value = DEFAULT_CHANNEL)]
        channel: String,
    },
    /// List every channel's control record.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Clear a stale lock left behind by a crashed migration.
    Unlock {
        #[arg(long, default_value = DEFAULT_CHANNEL)]
        channel: String,
    },
    /// Delete all control records.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli)?;
    let db_path = resolve_database(&cli, &config)?;
    let store = SqliteControlStore::open(&db_path, &config.collection_name)
        .with_context(|| format!("failed to open control store {}", db_path.display()))?;
    let mut migrator = Migrator::from_config(Arc::new(store), &config);

    match cli.command {
        Commands::Version { channel } => {
            let version = migrator.version(&channel)?;
            println!("{version}");
        }
        Commands::Status { json } => {
            let records = migrator.store().list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                status::print_status(&records, &db_path);
            }
        }
        Commands::Unlock { channel } => {
            migrator.unlock(&channel)?;
            println!("Unlocked {channel}.");
        }
        Commands::Reset { yes } => {
            if !yes && !confirm::confirm_reset(&db_path)? {
                bail!("reset cancelled");
            }
            migrator.reset()?;
            info!("control records in {} cleared", db_path.display());
            println!("All control records removed.");
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<MigrationsConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load(path)?,
        None => ConfigLoader::load_or_default(&ConfigLoader::default_config_dir())?,
    };
    Ok(config)
}

fn resolve_database(cli: &Cli, config: &MigrationsConfig) -> Result<PathBuf> {
    if let Some(path) = cli.database.clone().or_else(|| config.database_path.clone()) {
        return Ok(path);
    }

    let data_dir = ConfigLoader::default_config_dir().join("data");
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;
    Ok(data_dir.join("tidemark.db"))
}
