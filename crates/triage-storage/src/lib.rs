pub mod fixtures;

pub use fixtures::{
    ErrorEventFixture, FixtureBundle, ImportReport, IncidentFixture, TeamHistoryFixture,
};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use triage_core::{
    collapse_team_history, CandidateQuery, IncidentRecord, IncidentSource, OperationMetadata,
    RawErrorRecord, SourceError, TeamHistoryEntry, TelemetrySource, TimeWindow,
};

pub const STORE_SCHEMA_VERSION: i64 = 1;

const INCIDENT_SOURCE_NAME: &str = "incident store";
const TELEMETRY_SOURCE_NAME: &str = "telemetry store";
const HOUR_BUCKET_LEN: i64 = 13;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIncident {
    pub incident_id: u64,
    pub subscription_id: String,
    pub summary: String,
    pub status: String,
    pub incident_type: String,
    pub owning_team_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredErrorEvent {
    pub record: RawErrorRecord,
    pub success: bool,
    pub user_error: bool,
}

pub struct TriageStore {
    conn: Connection,
}

impl TriageStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > STORE_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: STORE_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_triage_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    pub fn upsert_incident(&self, incident: &StoredIncident) -> Result<(), StorageError> {
        self.conn.execute(
            "
            INSERT INTO incidents (
                incident_id,
                subscription_id,
                summary,
                status,
                incident_type,
                owning_team_name,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(incident_id) DO UPDATE SET
                subscription_id=excluded.subscription_id,
                summary=excluded.summary,
                status=excluded.status,
                incident_type=excluded.incident_type,
                owning_team_name=excluded.owning_team_name,
                created_at=excluded.created_at
            ",
            params![
                incident_id_to_sql(incident.incident_id)?,
                incident.subscription_id,
                incident.summary,
                incident.status,
                incident.incident_type,
                incident.owning_team_name,
                timestamp_to_sql(incident.created_at),
            ],
        )?;

        Ok(())
    }

    pub fn append_team_history(
        &self,
        incident_id: u64,
        owning_team_name: &str,
        modified_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let changes = self.conn.execute(
            "
            INSERT OR IGNORE INTO incident_team_history (
                incident_id,
                modified_at,
                owning_team_name
            ) VALUES (?1, ?2, ?3)
            ",
            params![
                incident_id_to_sql(incident_id)?,
                timestamp_to_sql(modified_at),
                owning_team_name,
            ],
        )?;

        Ok(changes > 0)
    }

    pub fn insert_error_event(&self, event: &StoredErrorEvent) -> Result<i64, StorageError> {
        let record = &event.record;
        self.conn.execute(
            "
            INSERT INTO error_events (
                ts,
                subscription_id,
                correlation_id,
                error_details,
                stack_trace,
                operation_id,
                operation_name,
                error_code,
                resource_group,
                success,
                user_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                timestamp_to_sql(record.timestamp),
                record.subscription_id,
                record.correlation_id,
                record.error_details,
                record.stack_trace,
                record.operation.operation_id,
                record.operation.operation_name,
                record.operation.error_code,
                record.operation.resource_group,
                event.success,
                event.user_error,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Non-active incidents with a summary, plus their collapsed team history.
    pub fn load_incident(&self, incident_id: u64) -> Result<Option<IncidentRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT incident_id, subscription_id, summary, created_at
                FROM incidents
                WHERE incident_id = ?1
                  AND status != 'ACTIVE'
                  AND summary != ''
                ",
                [incident_id_to_sql(incident_id)?],
                |row| {
                    let created_at: String = row.get(3)?;
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        created_at,
                    ))
                },
            )
            .optional()?;

        let Some((id, subscription_id, summary, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(IncidentRecord {
            incident_id: id as u64,
            subscription_id,
            summary,
            created_at: parse_timestamp(created_at)?,
            team_history: self.team_history(incident_id)?,
        }))
    }

    pub fn team_history(&self, incident_id: u64) -> Result<Vec<TeamHistoryEntry>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT owning_team_name, modified_at
            FROM incident_team_history
            WHERE incident_id = ?1
            ORDER BY modified_at ASC, owning_team_name ASC
            ",
        )?;

        let rows = statement.query_map([incident_id_to_sql(incident_id)?], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (owning_team_name, modified_at) = row?;
            entries.push(TeamHistoryEntry {
                owning_team_name,
                modified_at: parse_timestamp(modified_at)?,
            });
        }

        Ok(collapse_team_history(entries))
    }

    pub fn candidate_incident_ids(&self, query: &CandidateQuery) -> Result<Vec<u64>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT incident_id, owning_team_name
            FROM incidents
            WHERE status = 'RESOLVED'
              AND incident_type = 'CustomerReported'
              AND subscription_id != ''
              AND created_at >= ?1
              AND created_at <= ?2
            ORDER BY created_at DESC, incident_id DESC
            ",
        )?;

        let since = timestamp_to_sql(query.now - query.lookback);
        let until = timestamp_to_sql(query.now);
        let rows = statement.query_map(params![since, until], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut ids = Vec::new();
        for row in rows {
            if ids.len() >= query.limit {
                break;
            }
            let (incident_id, owning_team_name) = row?;
            let tracked = query.tracked_teams.is_empty()
                || query
                    .tracked_teams
                    .iter()
                    .any(|team| team == &owning_team_name);
            if !tracked {
                continue;
            }
            ids.push(incident_id as u64);
        }

        Ok(ids)
    }

    /// Start of the hour bucket holding the most failed events, earliest
    /// bucket on ties.
    pub fn peak_failure_hour(
        &self,
        subscription_id: &str,
        window: &TimeWindow,
    ) -> Result<Option<DateTime<Utc>>, StorageError> {
        let bucket = self
            .conn
            .query_row(
                "
                SELECT substr(ts, 1, ?4) AS bucket, COUNT(*) AS error_count
                FROM error_events
                WHERE subscription_id = ?1
                  AND ts >= ?2
                  AND ts <= ?3
                  AND success = 0
                GROUP BY bucket
                ORDER BY error_count DESC, bucket ASC
                LIMIT 1
                ",
                params![
                    subscription_id,
                    timestamp_to_sql(window.start),
                    timestamp_to_sql(window.end),
                    HOUR_BUCKET_LEN,
                ],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        bucket
            .map(|bucket| parse_timestamp(format!("{bucket}:00:00Z")))
            .transpose()
    }

    pub fn failed_events(
        &self,
        subscription_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RawErrorRecord>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT ts, subscription_id, correlation_id, error_details, stack_trace,
                   operation_id, operation_name, error_code, resource_group
            FROM error_events
            WHERE subscription_id = ?1
              AND ts >= ?2
              AND ts <= ?3
              AND success = 0
              AND user_error = 0
            ORDER BY ts ASC, event_id ASC
            ",
        )?;

        let rows = statement.query_map(
            params![
                subscription_id,
                timestamp_to_sql(window.start),
                timestamp_to_sql(window.end),
            ],
            |row| {
                let ts = parse_timestamp(row.get::<_, String>(0)?).map_err(|err| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(err),
                    )
                })?;
                Ok(RawErrorRecord {
                    timestamp: ts,
                    subscription_id: row.get(1)?,
                    correlation_id: row.get(2)?,
                    error_details: row.get(3)?,
                    stack_trace: row.get(4)?,
                    operation: OperationMetadata {
                        operation_id: row.get(5)?,
                        operation_name: row.get(6)?,
                        error_code: row.get(7)?,
                        resource_group: row.get(8)?,
                    },
                })
            },
        )?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl IncidentSource for TriageStore {
    fn incident(&self, incident_id: u64) -> Result<Option<IncidentRecord>, SourceError> {
        self.load_incident(incident_id)
            .map_err(|err| SourceError::new(INCIDENT_SOURCE_NAME, err.to_string()))
    }

    fn candidate_incidents(&self, query: &CandidateQuery) -> Result<Vec<u64>, SourceError> {
        self.candidate_incident_ids(query)
            .map_err(|err| SourceError::new(INCIDENT_SOURCE_NAME, err.to_string()))
    }
}

impl TelemetrySource for TriageStore {
    fn peak_error_hour(
        &self,
        subscription_id: &str,
        window: &TimeWindow,
    ) -> Result<Option<DateTime<Utc>>, SourceError> {
        self.peak_failure_hour(subscription_id, window)
            .map_err(|err| SourceError::new(TELEMETRY_SOURCE_NAME, err.to_string()))
    }

    fn error_records(
        &self,
        subscription_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RawErrorRecord>, SourceError> {
        self.failed_events(subscription_id, window)
            .map_err(|err| SourceError::new(TELEMETRY_SOURCE_NAME, err.to_string()))
    }
}

/// Fixed-width UTC text so lexical order in SQL matches time order.
fn timestamp_to_sql(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn incident_id_to_sql(incident_id: u64) -> Result<i64, StorageError> {
    i64::try_from(incident_id)
        .map_err(|_| StorageError::Serialization(format!("incident id {incident_id} overflows")))
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StorageError::Timestamp(err.to_string()))
}
