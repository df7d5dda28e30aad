use crate::{StorageError, StoredErrorEvent, StoredIncident, TriageStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_core::RawErrorRecord;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IncidentFixture {
    pub incident_id: u64,
    pub subscription_id: String,
    pub summary: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_incident_type")]
    pub incident_type: String,
    #[serde(default)]
    pub owning_team_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamHistoryFixture {
    pub incident_id: u64,
    pub owning_team_name: String,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEventFixture {
    #[serde(flatten)]
    pub record: RawErrorRecord,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user_error: bool,
}

/// JSON snapshot of both collaborators, used to seed a local store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureBundle {
    #[serde(default)]
    pub incidents: Vec<IncidentFixture>,
    #[serde(default)]
    pub team_history: Vec<TeamHistoryFixture>,
    #[serde(default)]
    pub error_events: Vec<ErrorEventFixture>,
}

impl FixtureBundle {
    pub fn from_json(contents: &str) -> Result<Self, StorageError> {
        serde_json::from_str(contents).map_err(|err| StorageError::Serialization(err.to_string()))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub incidents: usize,
    pub team_history: usize,
    pub error_events: usize,
}

impl TriageStore {
    /// Imports the bundle in one transaction; nothing is written on failure.
    pub fn import_fixtures(&self, bundle: &FixtureBundle) -> Result<ImportReport, StorageError> {
        let tx = self.connection().unchecked_transaction()?;
        let mut report = ImportReport::default();

        for incident in &bundle.incidents {
            self.upsert_incident(&StoredIncident {
                incident_id: incident.incident_id,
                subscription_id: incident.subscription_id.clone(),
                summary: incident.summary.clone(),
                status: incident.status.clone(),
                incident_type: incident.incident_type.clone(),
                owning_team_name: incident.owning_team_name.clone(),
                created_at: incident.created_at,
            })?;
            report.incidents += 1;
        }

        for hop in &bundle.team_history {
            if self.append_team_history(hop.incident_id, &hop.owning_team_name, hop.modified_at)? {
                report.team_history += 1;
            }
        }

        for event in &bundle.error_events {
            self.insert_error_event(&StoredErrorEvent {
                record: event.record.clone(),
                success: event.success,
                user_error: event.user_error,
            })?;
            report.error_events += 1;
        }

        tx.commit()?;
        Ok(report)
    }
}

fn default_status() -> String {
    "RESOLVED".to_string()
}

fn default_incident_type() -> String {
    "CustomerReported".to_string()
}
