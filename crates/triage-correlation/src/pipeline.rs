use crate::correlator::correlate;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use triage_attribution::{reduce_records, AttributionError, TeamAttributionEngine};
use triage_core::{
    parse_summary_start_time, BatchReport, CandidateQuery, IncidentRecord, IncidentReport,
    IncidentSource, TelemetrySource, TimeWindow, TriageConfig, TriageError, TriageResult,
};

/// Drives one incident at a time through attribution, reduction and
/// correlation. Collaborators are passed per call so a single pipeline can
/// serve any store.
pub struct TriagePipeline {
    engine: TeamAttributionEngine,
    config: TriageConfig,
}

impl TriagePipeline {
    pub fn new(config: TriageConfig) -> Result<Self, AttributionError> {
        let engine = TeamAttributionEngine::from_config(&config)?;
        Ok(Self { engine, config })
    }

    pub fn with_engine(engine: TeamAttributionEngine, config: TriageConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn engine(&self) -> &TeamAttributionEngine {
        &self.engine
    }

    pub fn candidate_query(&self, now: DateTime<Utc>) -> CandidateQuery {
        CandidateQuery {
            now,
            lookback: Duration::days(self.config.candidates.lookback_days.max(0)),
            tracked_teams: self.config.candidates.tracked_teams.clone(),
            limit: self.config.candidates.limit,
        }
    }

    pub fn triage_incident<I, T>(
        &self,
        incidents: &I,
        telemetry: &T,
        incident_id: u64,
    ) -> Result<Vec<TriageResult>, TriageError>
    where
        I: IncidentSource + ?Sized,
        T: TelemetrySource + ?Sized,
    {
        if incident_id == 0 {
            return Err(TriageError::MalformedInput {
                message: "incident id is required".to_string(),
            });
        }

        let Some(incident) = incidents.incident(incident_id)? else {
            return Err(TriageError::no_data(
                "incident",
                format!("no closed incident with a summary for id {incident_id}"),
            ));
        };
        if incident.subscription_id.trim().is_empty() {
            return Err(TriageError::no_data(
                "incident",
                format!("incident {incident_id} has no subscription id"),
            ));
        }
        if incident.team_history.is_empty() {
            return Err(TriageError::no_data(
                "incident",
                format!("incident {incident_id} has no owning-team history"),
            ));
        }

        let start_time = self.resolve_start_time(&incident);
        let anchor = self.resolve_anchor(telemetry, &incident, start_time);
        let window = TimeWindow::around(anchor, self.config.window.error_radius());

        let records = telemetry.error_records(&incident.subscription_id, &window)?;
        if records.is_empty() {
            return Err(TriageError::no_data(
                "telemetry",
                format!(
                    "no failed operations for subscription {} between {} and {}",
                    incident.subscription_id, window.start, window.end
                ),
            ));
        }

        let report = self.engine.attribute_all(records);
        if report.attributed.is_empty() {
            return Err(TriageError::Unattributable {
                message: format!(
                    "{} records: {} without class paths, {} without a team match",
                    report.records_processed, report.without_fragments, report.unmatched
                ),
            });
        }

        let reduced = reduce_records(report.attributed)?;
        let rows = correlate(
            &reduced,
            &incident,
            start_time,
            self.config.incident_link(incident_id),
        )?;

        info!(
            event = "incident_triaged",
            incident_id,
            records = report.records_processed,
            rows = rows.len(),
        );
        Ok(rows)
    }

    /// Triages every id, or the candidate query's ids when none are given.
    /// Per-incident failures are reported, never propagated; only a failing
    /// candidate query fails the batch.
    pub fn triage_batch<I, T>(
        &self,
        incidents: &I,
        telemetry: &T,
        incident_ids: &[u64],
        now: DateTime<Utc>,
    ) -> Result<BatchReport, TriageError>
    where
        I: IncidentSource + ?Sized,
        T: TelemetrySource + ?Sized,
    {
        let ids = if incident_ids.is_empty() {
            let query = self.candidate_query(now);
            let ids = incidents.candidate_incidents(&query)?;
            info!(event = "candidates_selected", count = ids.len(), limit = query.limit);
            ids
        } else {
            incident_ids.to_vec()
        };

        let mut batch = BatchReport::default();
        for incident_id in ids {
            let outcome = self.triage_incident(incidents, telemetry, incident_id);
            if let Err(err) = &outcome {
                warn!(
                    event = "incident_not_triaged",
                    incident_id,
                    status = %err.status(),
                    error = %err,
                );
            }
            batch
                .reports
                .push(IncidentReport::from_outcome(incident_id, outcome));
        }
        Ok(batch)
    }

    fn resolve_start_time(&self, incident: &IncidentRecord) -> DateTime<Utc> {
        match parse_summary_start_time(&incident.summary) {
            Ok(start) => start,
            Err(err) => {
                warn!(
                    event = "summary_start_time_fallback",
                    incident_id = incident.incident_id,
                    error = %err,
                    created_at = %incident.created_at,
                );
                incident.created_at
            }
        }
    }

    fn resolve_anchor<T>(
        &self,
        telemetry: &T,
        incident: &IncidentRecord,
        start_time: DateTime<Utc>,
    ) -> DateTime<Utc>
    where
        T: TelemetrySource + ?Sized,
    {
        let lookback = TimeWindow::ending_at(start_time, self.config.window.peak_lookback());
        match telemetry.peak_error_hour(&incident.subscription_id, &lookback) {
            Ok(Some(peak)) => peak,
            Ok(None) => start_time,
            Err(err) => {
                warn!(
                    event = "peak_hour_lookup_failed",
                    incident_id = incident.incident_id,
                    error = %err,
                );
                start_time
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::RefCell;
    use triage_core::{
        FailureStatus, OperationMetadata, RawErrorRecord, SourceError, TeamHistoryEntry,
    };

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 7, hour, min, 0)
            .single()
            .expect("valid timestamp")
    }

    struct Incidents {
        records: Vec<IncidentRecord>,
        candidates: Vec<u64>,
    }

    impl IncidentSource for Incidents {
        fn incident(&self, incident_id: u64) -> Result<Option<IncidentRecord>, SourceError> {
            Ok(self
                .records
                .iter()
                .find(|record| record.incident_id == incident_id)
                .cloned())
        }

        fn candidate_incidents(&self, _query: &CandidateQuery) -> Result<Vec<u64>, SourceError> {
            Ok(self.candidates.clone())
        }
    }

    struct Telemetry {
        peak: Option<DateTime<Utc>>,
        records: Vec<RawErrorRecord>,
        windows: RefCell<Vec<TimeWindow>>,
    }

    impl TelemetrySource for Telemetry {
        fn peak_error_hour(
            &self,
            _subscription_id: &str,
            _window: &TimeWindow,
        ) -> Result<Option<DateTime<Utc>>, SourceError> {
            Ok(self.peak)
        }

        fn error_records(
            &self,
            subscription_id: &str,
            window: &TimeWindow,
        ) -> Result<Vec<RawErrorRecord>, SourceError> {
            self.windows.borrow_mut().push(*window);
            Ok(self
                .records
                .iter()
                .filter(|record| {
                    record.subscription_id == subscription_id && window.contains(record.timestamp)
                })
                .cloned()
                .collect())
        }
    }

    fn incident(incident_id: u64, summary: &str) -> IncidentRecord {
        IncidentRecord {
            incident_id,
            subscription_id: "sub-1".to_string(),
            summary: summary.to_string(),
            created_at: ts(20, 0),
            team_history: vec![TeamHistoryEntry {
                owning_team_name: "CLOUDNET\\SdnPubSub".to_string(),
                modified_at: ts(20, 0),
            }],
        }
    }

    fn error(min: u32, details: &str) -> RawErrorRecord {
        RawErrorRecord {
            timestamp: ts(15, min),
            subscription_id: "sub-1".to_string(),
            correlation_id: format!("corr-{min}"),
            error_details: details.to_string(),
            stack_trace: None,
            operation: OperationMetadata::default(),
        }
    }

    fn pipeline() -> TriagePipeline {
        TriagePipeline::new(TriageConfig::default()).expect("default pipeline")
    }

    const PUBSUB_TRACE: &str = "at A() in X:\\bt\\7\\repo\\src\\sources\\PubSub\\Facade.cs:line 3";

    #[test]
    fn summary_start_time_anchors_the_error_window() {
        let incidents = Incidents {
            records: vec![incident(
                7,
                "<b>Problem start time:</b> 5/7/2024 3:30:00 PM UTC<br>",
            )],
            candidates: Vec::new(),
        };
        let telemetry = Telemetry {
            peak: None,
            records: vec![error(10, PUBSUB_TRACE)],
            windows: RefCell::new(Vec::new()),
        };

        let rows = pipeline()
            .triage_incident(&incidents, &telemetry, 7)
            .expect("triaged");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].predicted_owning_team, "CLOUDNET\\SdnPubSub");
        assert!(rows[0].predicted_team_in_history);
        assert_eq!(rows[0].incident_start_time, ts(15, 30));

        let windows = telemetry.windows.borrow();
        assert_eq!(windows[0], TimeWindow::around(ts(15, 30), Duration::hours(1)));
    }

    #[test]
    fn peak_hour_overrides_start_time_anchor() {
        let incidents = Incidents {
            records: vec![incident(7, "no timestamp here")],
            candidates: Vec::new(),
        };
        let telemetry = Telemetry {
            peak: Some(ts(15, 0)),
            records: vec![error(10, PUBSUB_TRACE)],
            windows: RefCell::new(Vec::new()),
        };

        let rows = pipeline()
            .triage_incident(&incidents, &telemetry, 7)
            .expect("triaged");
        assert_eq!(rows[0].incident_start_time, ts(20, 0));
        assert_eq!(
            telemetry.windows.borrow()[0],
            TimeWindow::around(ts(15, 0), Duration::hours(1))
        );
    }

    #[test]
    fn unattributable_records_are_no_data() {
        let incidents = Incidents {
            records: vec![incident(7, "")],
            candidates: Vec::new(),
        };
        let telemetry = Telemetry {
            peak: Some(ts(15, 0)),
            records: vec![error(10, "plain failure without frames")],
            windows: RefCell::new(Vec::new()),
        };

        let err = pipeline()
            .triage_incident(&incidents, &telemetry, 7)
            .expect_err("nothing to attribute");
        assert!(matches!(err, TriageError::Unattributable { .. }));
        assert_eq!(err.status(), FailureStatus::NoData);
    }

    #[test]
    fn zero_id_is_malformed() {
        let incidents = Incidents {
            records: Vec::new(),
            candidates: Vec::new(),
        };
        let telemetry = Telemetry {
            peak: None,
            records: Vec::new(),
            windows: RefCell::new(Vec::new()),
        };
        let err = pipeline()
            .triage_incident(&incidents, &telemetry, 0)
            .expect_err("missing id");
        assert_eq!(err.status(), FailureStatus::Error);
    }

    #[test]
    fn empty_batch_uses_candidates_and_keeps_going() {
        let incidents = Incidents {
            records: vec![incident(7, "")],
            candidates: vec![404, 7],
        };
        let telemetry = Telemetry {
            peak: Some(ts(15, 0)),
            records: vec![error(10, PUBSUB_TRACE)],
            windows: RefCell::new(Vec::new()),
        };

        let batch = pipeline()
            .triage_batch(&incidents, &telemetry, &[], ts(21, 0))
            .expect("batch");
        assert_eq!(batch.reports.len(), 2);
        assert_eq!(batch.rows().len(), 1);
        let failures = batch.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].incident_id, 404);
        assert_eq!(failures[0].status, FailureStatus::NoData);
    }

    #[test]
    fn candidate_query_follows_config() {
        let query = pipeline().candidate_query(ts(21, 0));
        assert_eq!(query.lookback, Duration::days(30));
        assert_eq!(query.limit, 20);
        assert!(!query.tracked_teams.is_empty());
    }
}
