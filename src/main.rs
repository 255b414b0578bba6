mod calendar;
mod config;
mod database;
mod entities;
mod error;
mod http_server;
mod logging;
mod ports;
mod rate_limit;
mod services;
mod show_time;
#[cfg(test)]
mod test_utils;
mod validation;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};

use crate::{
    config::Config,
    database::Database,
    http_server::state::AppState,
    logging::init_tracing,
    ports::{auth::AuthVerifier, music_catalog::MusicCatalog},
    services::{
        auth_client::HostedAuthClient,
        background::release_check::check_all_releases,
        spotify::client::{SpotifyApiCredentials, SpotifyCatalogClient, UnconfiguredCatalog},
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "SHOW_TRACKER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Tracing filter, e.g. "info" or "show_tracker=debug,tower_http=info"
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    /// OTLP gRPC endpoint to export traces to
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// The port to run the server on
        #[arg(short, long, default_value = "3000", env = "SHOW_TRACKER_HTTP_PORT")]
        port: u16,

        /// Overrides `database_url` from the config file
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    /// Check every tracked artist for new releases once, then exit
    CheckReleases {
        /// Overrides `database_url` from the config file
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    }
    .wrap_err("Failed to load show-tracker config")
}

async fn connect(config: &Config, database_url: Option<String>) -> Result<Arc<Database>> {
    let url = match database_url {
        Some(url) => url,
        None => config.database_url()?,
    };
    // SQLite allows a single writer; a bigger pool only adds lock contention.
    let max_connections = if url.starts_with("sqlite:") { 1 } else { 10 };
    Ok(Arc::new(Database::connect(&url, max_connections).await?))
}

fn music_catalog(config: &Config) -> Result<Arc<dyn MusicCatalog>> {
    match &config.spotify {
        Some(spotify) => {
            let credentials =
                SpotifyApiCredentials::new(spotify.client_id.clone(), spotify.client_secret.clone());
            Ok(Arc::new(SpotifyCatalogClient::new(
                credentials,
                spotify.requests_per_second,
            )?))
        }
        None => {
            tracing::warn!("No [spotify] section in config; artist tracking is disabled");
            Ok(Arc::new(UnconfiguredCatalog))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider = init_tracing(
        args.otlp_endpoint.as_deref(),
        &args.log_level,
        args.log_json,
    )?;

    let result = run(args).await;

    if let Some(provider) = tracer_provider
        && let Err(e) = provider.shutdown()
    {
        eprintln!("Failed to flush traces: {e}");
    }
    result
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = match &args.config {
                    Some(path) => {
                        Config::create_default_at(path)?;
                        path.clone()
                    }
                    None => Config::create_default()?,
                };
                println!("{}", path.display());
            }
            ConfigCommands::Path => match args.config.or_else(Config::config_path) {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::CheckReleases { database_url } => {
            let config = load_config(args.config.as_ref())?;
            if config.spotify.is_none() {
                tracing::warn!("No [spotify] section in config; nothing to check");
                return Ok(());
            }
            let db = connect(&config, database_url).await?;
            let catalog = music_catalog(&config)?;

            let summary =
                check_all_releases(&db, catalog.as_ref(), config.release_check.delay).await?;
            println!(
                "Checked {} artists: {} new releases, {} failures",
                summary.artists_checked, summary.new_releases, summary.failures
            );
        }
        Commands::Serve { port, database_url } => {
            let config = load_config(args.config.as_ref())?;
            let db = connect(&config, database_url).await?;
            let catalog = music_catalog(&config)?;
            let auth: Arc<dyn AuthVerifier> = Arc::new(HostedAuthClient::new(
                &config.auth.url,
                config.auth.anon_key.clone(),
            )?);

            let app_state = Arc::new(AppState::new(db, config, auth, catalog)?);
            tracing::info!(port, "Starting HTTP server");
            http_server::app::start(port, app_state).await?;
        }
    }

    Ok(())
}
