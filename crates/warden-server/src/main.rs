//! Warden server - runs the account backend over HTTP
//!
//! Configuration comes from the environment (`JWT_SECRET` is required) with
//! optional overrides from warden.toml and the command line.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

mod config;
mod error;
mod output;

use config::{ServerFile, DEFAULT_BIND};
use error::{Result, ServerError};
use warden::api::{router, AppState};
use warden::error::ErrorConfig;
use warden::observability::{self, ObservabilityConfig, SecurityEvent};
use warden::{LogMailer, SecureRouter, UserStore, WardenConfig};

/// Warden - user accounts, tokens and access control
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to warden.toml (defaults to ./warden.toml when present)
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "WARDEN_BIND")]
        bind: Option<String>,

        /// Log format: pretty, json, compact
        #[arg(long)]
        log_format: Option<String>,
    },

    /// Load and validate configuration without starting the server
    CheckConfig {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { bind, log_format } => cmd_serve(cli.config, bind, log_format),
        Commands::CheckConfig { json } => cmd_check_config(cli.config, json),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

/// Environment first, then the file on top.
fn load(config_path: Option<PathBuf>) -> Result<(WardenConfig, Option<ServerFile>)> {
    let file = ServerFile::discover(config_path.as_deref())?;
    let mut config = WardenConfig::from_env()?;
    if let Some(file) = &file {
        file.apply(&mut config)?;
    }
    Ok((config, file))
}

fn database_url(file: Option<&ServerFile>) -> Option<String> {
    std::env::var("DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .or_else(|| file.and_then(|f| f.database_url()).map(str::to_string))
}

fn store_label(file: Option<&ServerFile>) -> &'static str {
    if cfg!(feature = "postgres") && database_url(file).is_some() {
        "postgres"
    } else {
        "memory"
    }
}

fn cmd_check_config(config_path: Option<PathBuf>, json: bool) -> Result<()> {
    let (config, file) = load(config_path)?;
    let bind = file
        .as_ref()
        .and_then(ServerFile::bind)
        .unwrap_or(DEFAULT_BIND)
        .to_string();
    let store = store_label(file.as_ref());

    if json {
        let report = serde_json::json!({
            "bind": bind,
            "store": store,
            "token": {
                "issuer": config.token.issuer,
                "audience": config.token.audience,
                "ttl_secs": config.token.ttl.as_secs(),
                "header": config.token.header,
                "response_header": config.token.response_header,
            },
            "public_paths": config.public_paths,
            "login": {
                "max_attempts": config.login.max_attempts,
                "attempt_window_secs": config.login.attempt_window.as_secs(),
                "capacity": config.login.capacity,
            },
            "images": {
                "root": config.images.root.display().to_string(),
                "public_base_url": config.images.public_base_url,
                "avatar_base_url": config.images.avatar_base_url,
                "max_size": config.images.max_size,
            },
            "http": {
                "max_request_size": config.http.max_request_size,
                "request_timeout_secs": config.http.request_timeout.as_secs(),
                "cors_origins": config.http.cors_origins,
                "security_headers": config.http.security_headers_enabled,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        if file.is_none() {
            output::info("No warden.toml found, using environment only");
        }
        output::print_config_summary(&config, &bind, store);
        output::success("Configuration is valid");
    }

    Ok(())
}

fn cmd_serve(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    log_format: Option<String>,
) -> Result<()> {
    let (config, file) = load(config_path)?;

    let mut logging = ObservabilityConfig::from_env();
    if let Some(file) = &file {
        file.apply_logging(&mut logging)?;
    }
    if let Some(format) = &log_format {
        logging.log_format = config::log_format(format)?;
    }
    observability::init(logging)?;
    warden::error::init(ErrorConfig::from_env());

    let bind = bind
        .or_else(|| file.as_ref().and_then(ServerFile::bind).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let database_url = database_url(file.as_ref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(config, bind, database_url))
}

async fn serve(config: WardenConfig, bind: String, database_url: Option<String>) -> Result<()> {
    let store = open_store(database_url).await?;
    let state = AppState::new(config.clone(), store, Arc::new(LogMailer))?;
    let app = router(state).with_security(&config);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.clone(),
            source,
        })?;

    warden::security_event!(
        SecurityEvent::SystemStartup,
        address = %bind,
        version = env!("CARGO_PKG_VERSION"),
        "Warden listening"
    );

    axum_serve(listener, app).await?;

    warden::security_event!(SecurityEvent::SystemShutdown, "Warden stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_store(database_url: Option<String>) -> Result<Arc<dyn UserStore>> {
    use warden::{create_pool, DatabaseConfig, PgUserStore};

    match database_url {
        Some(url) => {
            let pool = create_pool(&DatabaseConfig::new(url)).await?;
            let store = PgUserStore::new(pool);
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory user store");
            Ok(Arc::new(warden::MemoryUserStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn open_store(database_url: Option<String>) -> Result<Arc<dyn UserStore>> {
    if database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built without the postgres feature");
    }
    Ok(Arc::new(warden::MemoryUserStore::new()))
}

async fn axum_serve(listener: tokio::net::TcpListener, app: axum::Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
