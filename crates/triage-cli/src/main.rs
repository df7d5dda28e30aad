mod admin;
mod run;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use triage_core::{load_config, TriageConfig};
use triage_storage::TriageStore;

const DEFAULT_DB_PATH: &str = "triage.db";
const DEFAULT_CONFIG_PATH: &str = "triage.toml";

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Incident triage team attribution", long_about = None)]
struct Cli {
    /// SQLite store holding incidents and telemetry (env: TRIAGE_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// TOML config; a missing file means defaults (env: TRIAGE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, default_value_t = false)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attribute incidents to owning teams
    Run(run::RunArgs),
    /// Load a JSON fixture bundle into the store
    Import(admin::ImportArgs),
    /// List incidents the candidate query would triage
    Candidates(admin::CandidatesArgs),
    /// Show the alias map in match order
    Teams,
    /// Print the effective configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let config_path = resolve_path(cli.config, "TRIAGE_CONFIG", DEFAULT_CONFIG_PATH);
    let config = load_config(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    match cli.command {
        Commands::Run(args) => {
            let store = open_store(cli.db)?;
            run::execute(args, config, &store)
        }
        Commands::Import(args) => {
            let store = open_store(cli.db)?;
            admin::import(&args, &store)
        }
        Commands::Candidates(args) => {
            let store = open_store(cli.db)?;
            admin::candidates(&args, config, &store)
        }
        Commands::Teams => admin::teams(&config),
        Commands::Config => print_config(&config),
    }
}

fn open_store(db: Option<PathBuf>) -> Result<TriageStore> {
    let path = resolve_path(db, "TRIAGE_DB", DEFAULT_DB_PATH);
    TriageStore::open(&path).with_context(|| format!("failed to open store {}", path.display()))
}

fn print_config(config: &TriageConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("failed to render config")?;
    print!("{rendered}");
    Ok(())
}

fn resolve_path(flag: Option<PathBuf>, env_key: &str, default: &str) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    match std::env::var(env_key) {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => PathBuf::from(default),
    }
}

fn init_logging(debug: bool) {
    let level = if debug {
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

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn explicit_flag_wins_over_default() {
        let path = resolve_path(
            Some(PathBuf::from("/tmp/custom.db")),
            "TRIAGE_TEST_UNSET_KEY",
            DEFAULT_DB_PATH,
        );
        assert_eq!(path, PathBuf::from("/tmp/custom.db"));
        assert_eq!(
            resolve_path(None, "TRIAGE_TEST_UNSET_KEY", DEFAULT_DB_PATH),
            PathBuf::from(DEFAULT_DB_PATH)
        );
    }

    #[test]
    fn run_accepts_repeated_incident_ids() {
        let cli = Cli::try_parse_from([
            "triage",
            "--debug",
            "run",
            "--incident-id",
            "511101094",
            "-i",
            "42",
            "--format",
            "json",
        ])
        .expect("parse args");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(cli.debug);
        assert_eq!(args.incident_ids, vec![511101094, 42]);
        assert!(matches!(args.format, run::OutputFormat::Json));
    }
}
