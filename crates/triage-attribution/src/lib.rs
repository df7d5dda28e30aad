pub mod normalize;
pub mod reduce;
pub mod scoring;

pub use normalize::{ClassPathFragment, PathNormalizer};
pub use reduce::{reduce_records, AttributedRecord};
pub use scoring::{compare_matches, score_fragments, TeamMatch, TeamScores};

use thiserror::Error;
use tracing::debug;
use triage_core::{
    ConfigError, PositionPolicy, RawErrorRecord, TeamAliasMap, TriageConfig, TriageError,
};

#[derive(Debug, Error)]
pub enum AttributionError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid source root pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("source root pattern {pattern:?} has no capture group")]
    MissingCaptureGroup { pattern: String },
    #[error("no attributed records left to reduce")]
    NothingToReduce,
}

impl From<AttributionError> for TriageError {
    fn from(value: AttributionError) -> Self {
        match value {
            AttributionError::NothingToReduce => TriageError::no_data("reduce", value.to_string()),
            other => TriageError::MalformedInput {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordAttribution {
    Attributed(AttributedRecord),
    /// No line carried a source-root class path.
    NoFragments,
    /// Class paths were found but none named a configured team.
    NoTeamMatch,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AttributionReport {
    pub records_processed: usize,
    pub without_fragments: usize,
    pub unmatched: usize,
    pub attributed: Vec<AttributedRecord>,
}

pub struct TeamAttributionEngine {
    normalizer: PathNormalizer,
    aliases: TeamAliasMap,
    policy: PositionPolicy,
}

impl TeamAttributionEngine {
    pub fn new(aliases: TeamAliasMap, policy: PositionPolicy) -> Self {
        Self {
            normalizer: PathNormalizer::default(),
            aliases,
            policy,
        }
    }

    pub fn with_normalizer(
        normalizer: PathNormalizer,
        aliases: TeamAliasMap,
        policy: PositionPolicy,
    ) -> Self {
        Self {
            normalizer,
            aliases,
            policy,
        }
    }

    pub fn from_config(config: &TriageConfig) -> Result<Self, AttributionError> {
        let normalizer = PathNormalizer::new(&config.source_root_pattern)?;
        Ok(Self::with_normalizer(
            normalizer,
            config.alias_map()?,
            config.position_policy,
        ))
    }

    pub fn aliases(&self) -> &TeamAliasMap {
        &self.aliases
    }

    pub fn attribute(&self, record: RawErrorRecord) -> RecordAttribution {
        let fragments = self.normalizer.normalize(&record.error_details);
        if fragments.is_empty() {
            return RecordAttribution::NoFragments;
        }

        let scores = score_fragments(&fragments, &self.aliases, self.policy);
        if scores.is_empty() {
            return RecordAttribution::NoTeamMatch;
        }

        let predicted_owning_team = scores.predicted_owning_team();
        RecordAttribution::Attributed(AttributedRecord {
            record,
            fragments,
            scores,
            predicted_owning_team,
        })
    }

    /// Attributes records in fetch order, dropping the ones that cannot be
    /// attributed.
    pub fn attribute_all<I>(&self, records: I) -> AttributionReport
    where
        I: IntoIterator<Item = RawErrorRecord>,
    {
        let mut report = AttributionReport::default();
        for record in records {
            report.records_processed += 1;
            let correlation_id = record.correlation_id.clone();
            match self.attribute(record) {
                RecordAttribution::Attributed(attributed) => {
                    debug!(
                        event = "record_attributed",
                        correlation_id = %correlation_id,
                        team = %attributed.predicted_owning_team,
                        fragments = attributed.fragments.len(),
                        evidence = attributed.evidence(),
                    );
                    report.attributed.push(attributed);
                }
                RecordAttribution::NoFragments => {
                    debug!(event = "record_without_class_paths", correlation_id = %correlation_id);
                    report.without_fragments += 1;
                }
                RecordAttribution::NoTeamMatch => {
                    debug!(event = "record_unmatched", correlation_id = %correlation_id);
                    report.unmatched += 1;
                }
            }
        }
        report
    }
}
