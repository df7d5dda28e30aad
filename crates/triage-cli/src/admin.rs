use crate::run::resolve_now;
use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use triage_core::{TeamAliasMap, TriageConfig};
use triage_correlation::TriagePipeline;
use triage_storage::{FixtureBundle, TriageStore};

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON bundle with `incidents`, `team_history` and `error_events`
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct CandidatesArgs {
    #[arg(long)]
    pub now: Option<String>,
}

pub fn import(args: &ImportArgs, store: &TriageStore) -> Result<()> {
    let contents = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let bundle = FixtureBundle::from_json(&contents)
        .with_context(|| format!("failed to parse {}", args.file.display()))?;
    let report = store
        .import_fixtures(&bundle)
        .context("failed to import fixtures")?;
    println!(
        "imported {} incidents, {} team history rows, {} error events",
        report.incidents, report.team_history, report.error_events
    );
    Ok(())
}

pub fn candidates(args: &CandidatesArgs, config: TriageConfig, store: &TriageStore) -> Result<()> {
    let now = resolve_now(args.now.as_deref())?;
    let pipeline = TriagePipeline::new(config).context("invalid triage config")?;
    let query = pipeline.candidate_query(now);
    let ids = store
        .candidate_incident_ids(&query)
        .context("candidate query failed")?;
    if ids.is_empty() {
        println!("no candidate incidents");
        return Ok(());
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

pub fn teams(config: &TriageConfig) -> Result<()> {
    let aliases = config.alias_map().context("invalid team map")?;
    print!("{}", format_teams(&aliases));
    Ok(())
}

fn format_teams(aliases: &TeamAliasMap) -> String {
    let width = aliases
        .iter()
        .map(|entry| entry.alias.len())
        .max()
        .unwrap_or(0);
    aliases
        .iter()
        .map(|entry| format!("{:<width$}  {}\n", entry.alias, entry.label))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn teams_are_listed_in_match_order() {
        let aliases = TriageConfig::default().alias_map().expect("aliases");
        let listing = format_teams(&aliases);
        let first = listing.lines().next().expect("first line");
        assert!(first.starts_with("rnm "));
        assert!(first.ends_with("CLOUDNET\\RNM"));
        assert_eq!(listing.lines().count(), aliases.len());
    }

    #[test]
    fn import_reads_bundle_from_disk() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"incidents": [{{"incident_id": 5, "subscription_id": "sub-1", "summary": "s", "created_at": "2024-05-07T16:00:00Z"}}]}}"#
        )
        .expect("write bundle");

        let store = TriageStore::open_in_memory().expect("store");
        import(
            &ImportArgs {
                file: file.path().to_path_buf(),
            },
            &store,
        )
        .expect("import");
        assert!(store.load_incident(5).expect("load").is_some());
    }
}
