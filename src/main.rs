use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use rask_log_ingest::app::config::{LogFormat, LogVerbosity};
use rask_log_ingest::app::{keys, logging, shutdown};
use rask_log_ingest::auth::ApiKeyAuthority;
use rask_log_ingest::reliability::RecoveryManager;
use rask_log_ingest::storage::MemoryStore;
use rask_log_ingest::{App, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path (optional)
    #[arg(long, global = true, env = "RASK_INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `logging.level` from the config file
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogVerbosity>,

    /// Overrides `logging.format` from the config file
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion core against the in-memory store (local development)
    Serve,
    /// Manage API keys in the configured key file
    #[command(subcommand)]
    Keys(KeysCommand),
    /// Inspect or prune recovery files
    #[command(subcommand)]
    Recovery(RecoveryCommand),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum KeysCommand {
    /// Create a key and print it once
    Create(CreateKeyArgs),
    /// List keys by hash prefix
    List,
    /// Revoke a key by raw value or by name
    Revoke {
        /// Raw key to revoke
        #[arg(long, conflicts_with = "name", required_unless_present = "name")]
        key: Option<String>,
        /// Revoke every active key with this name
        #[arg(long)]
        name: Option<String>,
    },
    /// Replace a key with a new one carrying the same settings
    Rotate {
        #[arg(long)]
        key: String,
    },
}

#[derive(Args, Debug)]
struct CreateKeyArgs {
    #[arg(long)]
    name: String,
    /// Comma separated: ingest_logs, query_logs, admin, metrics
    #[arg(long, default_value = "ingest_logs")]
    permissions: String,
    /// Requests per minute, 0 for unlimited
    #[arg(long, default_value_t = 0)]
    rate_limit: u32,
    #[arg(long)]
    expires_in_days: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum RecoveryCommand {
    /// Print recovery directory statistics as JSON
    Stats,
    /// Delete recovery files older than `recovery.max_file_age`
    Cleanup,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration and print the effective settings
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    logging::init_tracing(config.logging.level, config.logging.format);

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Keys(command) => run_keys(&config, command),
        Command::Recovery(command) => run_recovery(&config, command).await,
        Command::Config(ConfigCommand::Check) => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            println!("# configuration OK");
            Ok(())
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(MemoryStore::new());
    let app = App::start(config, store).await?;

    shutdown::wait_for_signal().await;
    let outcome = app.shutdown().await;
    info!(?outcome, "Stopped");
    Ok(())
}

fn open_authority(config: &Config) -> anyhow::Result<ApiKeyAuthority> {
    let Some(path) = &config.auth.keys_file else {
        bail!("auth.keys_file must be configured to manage keys");
    };
    ApiKeyAuthority::load(path)
        .with_context(|| format!("Failed to load key file {}", path.display()))
}

fn run_keys(config: &Config, command: KeysCommand) -> anyhow::Result<()> {
    let authority = open_authority(config)?;

    match command {
        KeysCommand::Create(args) => {
            let permissions = keys::parse_permissions(&args.permissions)?;
            let expires_at = keys::expiry_from_days(args.expires_in_days, Utc::now());
            let raw = authority.create_api_key(&args.name, permissions, args.rate_limit, expires_at)?;
            println!("{raw}");
            eprintln!("Store this key now; it cannot be shown again.");
        }
        KeysCommand::List => {
            print!("{}", keys::format_key_table(&authority.list_api_keys(), Utc::now()));
        }
        KeysCommand::Revoke { key: Some(key), .. } => {
            if !authority.revoke_api_key(&key)? {
                bail!("Unknown API key");
            }
            println!("Revoked 1 key");
        }
        KeysCommand::Revoke { key: None, name } => {
            let name = name.context("--key or --name is required")?;
            let revoked = authority.revoke_by_name(&name)?;
            println!("Revoked {revoked} key(s) named '{name}'");
        }
        KeysCommand::Rotate { key } => {
            let raw = keys::rotate_api_key(&authority, &key)?;
            println!("{raw}");
            eprintln!("The previous key is revoked. Store the new key now.");
        }
    }
    Ok(())
}

async fn run_recovery(config: &Config, command: RecoveryCommand) -> anyhow::Result<()> {
    let manager = RecoveryManager::new(config.recovery.directory.clone());

    match command {
        RecoveryCommand::Stats => {
            let stats = manager.recovery_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        RecoveryCommand::Cleanup => {
            let removed = manager
                .cleanup_old_recovery_files(config.recovery.max_file_age)
                .await?;
            println!("Removed {removed} recovery file(s)");
        }
    }
    Ok(())
}
