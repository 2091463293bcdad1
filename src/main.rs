use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kassenbuch_server::config::{AppConfig, CliConfig, FileConfig};
use kassenbuch_server::mailer::SmtpMailer;
use kassenbuch_server::scheduler::ReminderScheduler;
use kassenbuch_server::server::{run_server, RequestsLoggingLevel, ServerConfig};
use kassenbuch_server::store::SqliteStore;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database file. Created on first start.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML config file. Its values override the CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3000)]
    pub port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,

    /// IANA name of the zone all reminder schedules are interpreted in.
    #[clap(long, default_value = "Europe/Berlin")]
    pub timezone: String,

    /// Expected Cloudflare Access application audience tag.
    #[clap(long)]
    pub cf_audience: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        port: cli_args.port,
        logging_level: cli_args.logging_level,
        frontend_dir_path: cli_args.frontend_dir_path,
        timezone: cli_args.timezone,
        cf_audience: cli_args.cf_audience,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite database at {:?}...", config.db_path);
    let store = Arc::new(SqliteStore::new(&config.db_path)?);

    let mailer = Arc::new(SmtpMailer);
    let scheduler = Arc::new(ReminderScheduler::new(
        store.clone(),
        mailer.clone(),
        config.timezone,
    ));
    info!("Restoring reminder triggers from storage...");
    scheduler
        .initialize()
        .await
        .context("Failed to restore reminder triggers")?;

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level,
        port: config.port,
        frontend_dir_path: config.frontend_dir_path,
        cf_audience: config.cf_audience,
    };

    info!("Ready to serve at port {}!", config.port);
    run_server(server_config, store, scheduler, mailer).await
}
