mod api;

use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use triage_core::load_config;
use triage_correlation::TriagePipeline;
use triage_storage::TriageStore;

const DEFAULT_ADDR: &str = "127.0.0.1:8787";

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    db_path: PathBuf,
    config_path: PathBuf,
    debug: bool,
}

#[derive(Parser, Debug)]
#[command(name = "triage-hub")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    #[arg(long, default_value = "")]
    db: String,
    #[arg(long, default_value = "")]
    config: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[tokio::main]
async fn main() {
    let config = load_hub_config();
    init_logging(&config);

    let addr: SocketAddr = match config.addr.parse() {
        Ok(value) => value,
        Err(err) => {
            error!(event = "invalid_addr", error = %err, addr = %config.addr);
            return;
        }
    };
    if !addr.ip().is_loopback() {
        error!(event = "invalid_addr", addr = %config.addr);
        return;
    }

    let triage_config = match load_config(&config.config_path) {
        Ok(value) => value,
        Err(err) => {
            error!(event = "config_error", error = %err, path = %config.config_path.display());
            return;
        }
    };
    let pipeline = match TriagePipeline::new(triage_config) {
        Ok(value) => value,
        Err(err) => {
            error!(event = "config_error", error = %err);
            return;
        }
    };
    let store = match TriageStore::open(&config.db_path) {
        Ok(value) => value,
        Err(err) => {
            error!(event = "store_error", error = %err, path = %config.db_path.display());
            return;
        }
    };

    let hub = Arc::new(api::HubState::new(pipeline, store));
    let app = api::router(hub);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(value) => value,
        Err(err) => {
            error!(event = "hub_error", error = %err);
            return;
        }
    };

    info!(
        event = "hub_start",
        addr = %config.addr,
        db = %config.db_path.display(),
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "hub_shutdown");
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "hub_error", error = %err);
    }
}

fn load_hub_config() -> Config {
    let args = Args::parse();
    Config {
        addr: resolve(&args.addr, "TRIAGE_HUB_ADDR", DEFAULT_ADDR),
        db_path: PathBuf::from(resolve(&args.db, "TRIAGE_DB", "triage.db")),
        config_path: PathBuf::from(resolve(&args.config, "TRIAGE_CONFIG", "triage.toml")),
        debug: args.debug || env_true("TRIAGE_HUB_DEBUG"),
    }
}

fn resolve(flag: &str, env_key: &str, default: &str) -> String {
    if !flag.trim().is_empty() {
        return flag.trim().to_string();
    }
    match std::env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn env_true(key: &str) -> bool {
    match std::env::var(key) {
        Ok(value) => matches!(value.trim(), "1" | "true" | "yes" | "on"),
        Err(_) => false,
    }
}

fn init_logging(config: &Config) {
    let level = if config.debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("TRIAGE_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
