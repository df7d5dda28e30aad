pub mod config;
pub mod contracts;
pub mod summary;

pub use config::{
    load_config, CandidateConfig, ConfigError, PositionPolicy, TeamAlias, TeamAliasMap,
    TriageConfig, WindowConfig,
};
pub use contracts::{
    collapse_team_history, BatchReport, BatchResponse, CandidateQuery, FailureStatus,
    IncidentFailure, IncidentRecord, IncidentReport, IncidentSource, OperationMetadata,
    RawErrorRecord, SourceError, TeamHistoryEntry, TelemetrySource, TimeWindow, TriageError,
    TriageResult,
};
pub use summary::{
    format_compact_timestamp, parse_flexible_timestamp, parse_summary_start_time,
    SummaryTimeError,
};
