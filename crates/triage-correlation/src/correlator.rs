use chrono::{DateTime, Utc};
use triage_attribution::AttributedRecord;
use triage_core::{IncidentRecord, TriageError, TriageResult};

/// Joins reduced records with their incident on subscription id. Raw error
/// text, stack traces and correlation ids stay behind.
pub fn correlate(
    reduced: &[AttributedRecord],
    incident: &IncidentRecord,
    incident_start_time: DateTime<Utc>,
    incident_link: Option<String>,
) -> Result<Vec<TriageResult>, TriageError> {
    let rows = reduced
        .iter()
        .filter(|attributed| attributed.record.subscription_id == incident.subscription_id)
        .map(|attributed| TriageResult {
            incident_id: incident.incident_id,
            subscription_id: incident.subscription_id.clone(),
            predicted_owning_team: attributed.predicted_owning_team.clone(),
            predicted_team_in_history: incident.team_in_history(&attributed.predicted_owning_team),
            error_timestamp: attributed.record.timestamp,
            incident_start_time,
            team_history: incident.team_history.clone(),
            incident_link: incident_link.clone(),
        })
        .collect::<Vec<_>>();

    if rows.is_empty() {
        return Err(TriageError::no_data(
            "correlate",
            format!(
                "no attributed records for subscription {} of incident {}",
                incident.subscription_id, incident.incident_id
            ),
        ));
    }

    Ok(rows)
}
