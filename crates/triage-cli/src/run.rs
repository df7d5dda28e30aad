use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, ValueEnum};
use triage_core::{parse_flexible_timestamp, BatchReport, TriageConfig};
use triage_correlation::{render_failures, render_text_table, TriagePipeline};
use triage_storage::TriageStore;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Incident to triage; repeat for a batch. Without ids the recent
    /// candidate incidents are triaged.
    #[arg(long = "incident-id", short = 'i')]
    pub incident_ids: Vec<u64>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Reference time for the candidate query (defaults to now)
    #[arg(long)]
    pub now: Option<String>,
}

pub fn execute(args: RunArgs, config: TriageConfig, store: &TriageStore) -> Result<()> {
    let pipeline = TriagePipeline::new(config).context("invalid triage config")?;
    let now = resolve_now(args.now.as_deref())?;
    let batch = pipeline
        .triage_batch(store, store, &args.incident_ids, now)
        .context("failed to select candidate incidents")?;

    print!("{}", render(&batch, args.format)?);
    Ok(())
}

fn render(batch: &BatchReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            let mut out = serde_json::to_string_pretty(&batch.to_response())
                .context("failed to serialize triage results")?;
            out.push('\n');
            Ok(out)
        }
        OutputFormat::Table => {
            let mut out = render_text_table(&batch.rows());
            let failures = batch.failures();
            if !failures.is_empty() {
                out.push('\n');
                out.push_str(&render_failures(&failures));
            }
            Ok(out)
        }
    }
}

pub fn resolve_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(raw) = raw else {
        return Ok(Utc::now());
    };
    match parse_flexible_timestamp(raw) {
        Some(ts) => Ok(ts),
        None => bail!("unrecognised timestamp {raw:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use triage_core::{IncidentReport, TriageError};

    #[test]
    fn now_accepts_compact_and_rfc3339() {
        let expected = Utc
            .with_ymd_and_hms(2024, 5, 7, 15, 4, 5)
            .single()
            .expect("valid timestamp");
        assert_eq!(
            resolve_now(Some("2024-05-07T15:04:05")).expect("compact"),
            expected
        );
        assert_eq!(
            resolve_now(Some("2024-05-07T15:04:05Z")).expect("rfc3339"),
            expected
        );
        assert!(resolve_now(Some("yesterday")).is_err());
    }

    #[test]
    fn table_output_lists_failures_after_rows() {
        let batch = BatchReport {
            reports: vec![IncidentReport::from_outcome(
                9,
                Err(TriageError::no_data("telemetry", "nothing in window")),
            )],
        };
        let out = render(&batch, OutputFormat::Table).expect("render");
        assert!(out.starts_with("no triage rows\n"));
        assert!(out.contains("incident 9 [no_data]: telemetry: nothing in window"));

        let json = render(&batch, OutputFormat::Json).expect("render json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["results"], serde_json::json!([]));
        assert_eq!(value["failures"][0]["incident_id"], 9);
    }
}
