use crate::summary::compact_timestamp;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationMetadata {
    #[serde(default)]
    pub operation_id: String,
    #[serde(default)]
    pub operation_name: String,
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub resource_group: String,
}

/// One failed-operation row from the telemetry store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub subscription_id: String,
    pub correlation_id: String,
    pub error_details: String,
    #[serde(default)]
    pub stack_trace: Option<String>,
    #[serde(default)]
    pub operation: OperationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamHistoryEntry {
    pub owning_team_name: String,
    #[serde(with = "compact_timestamp")]
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentRecord {
    pub incident_id: u64,
    pub subscription_id: String,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    pub team_history: Vec<TeamHistoryEntry>,
}

impl IncidentRecord {
    pub fn team_in_history(&self, label: &str) -> bool {
        let needle = label.to_lowercase();
        self.team_history
            .iter()
            .any(|entry| entry.owning_team_name.to_lowercase() == needle)
    }
}

/// Collapses consecutive hops to the same team. A team that comes back after
/// another owner is kept as a new hop.
pub fn collapse_team_history<I>(entries: I) -> Vec<TeamHistoryEntry>
where
    I: IntoIterator<Item = TeamHistoryEntry>,
{
    let mut out: Vec<TeamHistoryEntry> = Vec::new();
    for entry in entries {
        if out
            .last()
            .is_some_and(|previous| previous.owning_team_name == entry.owning_team_name)
        {
            continue;
        }
        out.push(entry);
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriageResult {
    pub incident_id: u64,
    pub subscription_id: String,
    pub predicted_owning_team: String,
    pub predicted_team_in_history: bool,
    #[serde(with = "compact_timestamp")]
    pub error_timestamp: DateTime<Utc>,
    #[serde(with = "compact_timestamp")]
    pub incident_start_time: DateTime<Utc>,
    #[serde(default)]
    pub team_history: Vec<TeamHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_link: Option<String>,
}

/// Inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn around(anchor: DateTime<Utc>, radius: Duration) -> Self {
        Self {
            start: anchor - radius,
            end: anchor + radius,
        }
    }

    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        Self {
            start: end - span,
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuery {
    pub now: DateTime<Utc>,
    pub lookback: Duration,
    pub tracked_teams: Vec<String>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{source_name} query failed: {message}")]
pub struct SourceError {
    pub source_name: String,
    pub message: String,
}

impl SourceError {
    pub fn new(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

pub trait IncidentSource {
    fn incident(&self, incident_id: u64) -> Result<Option<IncidentRecord>, SourceError>;
    fn candidate_incidents(&self, query: &CandidateQuery) -> Result<Vec<u64>, SourceError>;
}

pub trait TelemetrySource {
    fn peak_error_hour(
        &self,
        subscription_id: &str,
        window: &TimeWindow,
    ) -> Result<Option<DateTime<Utc>>, SourceError>;

    fn error_records(
        &self,
        subscription_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RawErrorRecord>, SourceError>;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    NoData,
    Error,
}

impl FailureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FailureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriageError {
    #[error("{stage}: {message}")]
    NoData {
        stage: &'static str,
        message: String,
    },
    #[error("unattributable: {message}")]
    Unattributable { message: String },
    #[error("upstream error: {message}")]
    Upstream { message: String },
    #[error("malformed input: {message}")]
    MalformedInput { message: String },
}

impl TriageError {
    pub fn no_data(stage: &'static str, message: impl Into<String>) -> Self {
        Self::NoData {
            stage,
            message: message.into(),
        }
    }

    pub fn status(&self) -> FailureStatus {
        match self {
            Self::NoData { .. } | Self::Unattributable { .. } => FailureStatus::NoData,
            Self::Upstream { .. } | Self::MalformedInput { .. } => FailureStatus::Error,
        }
    }
}

impl From<SourceError> for TriageError {
    fn from(value: SourceError) -> Self {
        Self::Upstream {
            message: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentFailure {
    pub incident_id: u64,
    pub status: FailureStatus,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IncidentReport {
    Triaged {
        incident_id: u64,
        rows: Vec<TriageResult>,
    },
    NoData {
        incident_id: u64,
        message: String,
    },
    Error {
        incident_id: u64,
        message: String,
    },
}

impl IncidentReport {
    pub fn from_outcome(incident_id: u64, outcome: Result<Vec<TriageResult>, TriageError>) -> Self {
        match outcome {
            Ok(rows) => Self::Triaged { incident_id, rows },
            Err(err) => match err.status() {
                FailureStatus::NoData => Self::NoData {
                    incident_id,
                    message: err.to_string(),
                },
                FailureStatus::Error => Self::Error {
                    incident_id,
                    message: err.to_string(),
                },
            },
        }
    }

    pub fn incident_id(&self) -> u64 {
        match self {
            Self::Triaged { incident_id, .. }
            | Self::NoData { incident_id, .. }
            | Self::Error { incident_id, .. } => *incident_id,
        }
    }

    pub fn failure(&self) -> Option<IncidentFailure> {
        match self {
            Self::Triaged { .. } => None,
            Self::NoData {
                incident_id,
                message,
            } => Some(IncidentFailure {
                incident_id: *incident_id,
                status: FailureStatus::NoData,
                message: message.clone(),
            }),
            Self::Error {
                incident_id,
                message,
            } => Some(IncidentFailure {
                incident_id: *incident_id,
                status: FailureStatus::Error,
                message: message.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchReport {
    pub reports: Vec<IncidentReport>,
}

impl BatchReport {
    pub fn rows(&self) -> Vec<TriageResult> {
        self.reports
            .iter()
            .filter_map(|report| match report {
                IncidentReport::Triaged { rows, .. } => Some(rows.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn failures(&self) -> Vec<IncidentFailure> {
        self.reports
            .iter()
            .filter_map(IncidentReport::failure)
            .collect()
    }

    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            results: self.rows(),
            failures: self.failures(),
        }
    }
}

/// Wire shape shared by the CLI's JSON output and the HTTP boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchResponse {
    pub results: Vec<TriageResult>,
    pub failures: Vec<IncidentFailure>,
}
