use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_SOURCE_ROOT_PATTERN: &str =
    r"bt[\\/][0-9]+[\\/]repo[\\/]src[\\/]sources[\\/]([A-Za-z\\/]+)";
pub const DEFAULT_INCIDENT_LINK_TEMPLATE: &str =
    "https://portal.microsofticm.com/imp/v5/incidents/details/{incident_id}/summary";
const INCIDENT_ID_PLACEHOLDER: &str = "{incident_id}";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("team alias for label {label:?} is empty")]
    EmptyAlias { label: String },
    #[error("team alias {alias:?} has an empty label")]
    EmptyLabel { alias: String },
    #[error("team alias {alias:?} is configured more than once")]
    DuplicateAlias { alias: String },
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionPolicy {
    /// Earliest fragment wins; a later match on the same fragment index only
    /// refreshes the word offset.
    #[default]
    EarliestFragment,
    /// The fragment holding the most occurrences of the alias wins, earliest
    /// fragment on ties.
    MostOccurrences,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamAlias {
    pub alias: String,
    pub label: String,
}

impl TeamAlias {
    pub fn new(alias: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            label: label.into(),
        }
    }
}

/// Read-only alias table. Iteration order is configuration order, which is
/// also the final tie-break between otherwise identical matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamAliasMap {
    entries: Vec<TeamAlias>,
}

impl TeamAliasMap {
    pub fn new<I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = TeamAlias>,
    {
        let mut seen = BTreeSet::new();
        let mut normalized = Vec::new();
        for entry in entries {
            let alias = entry.alias.trim().to_lowercase();
            let label = entry.label.trim().to_string();
            if alias.is_empty() {
                return Err(ConfigError::EmptyAlias { label });
            }
            if label.is_empty() {
                return Err(ConfigError::EmptyLabel { alias });
            }
            if !seen.insert(alias.clone()) {
                return Err(ConfigError::DuplicateAlias { alias });
            }
            normalized.push(TeamAlias { alias, label });
        }
        Ok(Self {
            entries: normalized,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeamAlias> {
        self.entries.iter()
    }

    pub fn label_for(&self, alias: &str) -> Option<&str> {
        let alias = alias.trim().to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.alias == alias)
            .map(|entry| entry.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    #[serde(default = "default_peak_lookback_hours")]
    pub peak_lookback_hours: i64,
    #[serde(default = "default_error_radius_minutes")]
    pub error_radius_minutes: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            peak_lookback_hours: default_peak_lookback_hours(),
            error_radius_minutes: default_error_radius_minutes(),
        }
    }
}

impl WindowConfig {
    pub fn peak_lookback(&self) -> Duration {
        Duration::hours(self.peak_lookback_hours.max(0))
    }

    pub fn error_radius(&self) -> Duration {
        Duration::minutes(self.error_radius_minutes.max(0))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateConfig {
    #[serde(default = "default_candidate_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_candidate_limit")]
    pub limit: usize,
    #[serde(default = "default_tracked_teams")]
    pub tracked_teams: Vec<String>,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_candidate_lookback_days(),
            limit: default_candidate_limit(),
            tracked_teams: default_tracked_teams(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriageConfig {
    #[serde(default)]
    pub position_policy: PositionPolicy,
    #[serde(default = "default_source_root_pattern")]
    pub source_root_pattern: String,
    #[serde(default = "default_incident_link_template")]
    pub incident_link_template: String,
    #[serde(default = "default_teams")]
    pub teams: Vec<TeamAlias>,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub candidates: CandidateConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            position_policy: PositionPolicy::default(),
            source_root_pattern: default_source_root_pattern(),
            incident_link_template: default_incident_link_template(),
            teams: default_teams(),
            window: WindowConfig::default(),
            candidates: CandidateConfig::default(),
        }
    }
}

impl TriageConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: TriageConfig = toml::from_str(contents)?;
        config.alias_map()?;
        Ok(config)
    }

    pub fn alias_map(&self) -> Result<TeamAliasMap, ConfigError> {
        TeamAliasMap::new(self.teams.iter().cloned())
    }

    pub fn incident_link(&self, incident_id: u64) -> Option<String> {
        let template = self.incident_link_template.trim();
        if template.is_empty() {
            return None;
        }
        Some(template.replace(INCIDENT_ID_PLACEHOLDER, &incident_id.to_string()))
    }
}

/// Missing file means defaults; anything unreadable or invalid is an error.
pub fn load_config(path: &Path) -> Result<TriageConfig, ConfigError> {
    if !path.exists() {
        return Ok(TriageConfig::default());
    }
    let contents = fs::read_to_string(path)?;
    TriageConfig::from_toml_str(&contents)
}

fn default_source_root_pattern() -> String {
    DEFAULT_SOURCE_ROOT_PATTERN.to_string()
}

fn default_incident_link_template() -> String {
    DEFAULT_INCIDENT_LINK_TEMPLATE.to_string()
}

fn default_peak_lookback_hours() -> i64 {
    6 * 24
}

fn default_error_radius_minutes() -> i64 {
    60
}

fn default_candidate_lookback_days() -> i64 {
    30
}

fn default_candidate_limit() -> usize {
    20
}

fn default_teams() -> Vec<TeamAlias> {
    [
        ("rnm", "CLOUDNET\\RNM"),
        ("nrpinternal", "CLOUDNET\\NRP"),
        ("networkanalytics", "CLOUDNET\\NetAnalytics"),
        ("slb", "CLOUDNET\\SLB"),
        ("virtualwan", "CLOUDNET\\VirtualWAN"),
        ("networkservice", "CLOUDNET\\Network Manager"),
        ("nrp", "CLOUDNET\\NRP"),
        ("pubsub", "CLOUDNET\\SdnPubSub"),
        ("applicationgateway", "CLOUDNET\\ApplicationGateway"),
    ]
    .into_iter()
    .map(|(alias, label)| TeamAlias::new(alias, label))
    .collect()
}

fn default_tracked_teams() -> Vec<String> {
    [
        "CLOUDNET\\RNM",
        "CLOUDNET\\NRP",
        "NetworkAnalytics",
        "CLOUDNET\\NetAnalytics",
        "CLOUDNET\\SLB",
        "CLOUDNET\\ApplicationGateway",
        "CLOUDNET\\Gateway Manager",
        "CLOUDNET\\ExpressRouteSupport",
        "CLOUDNET\\Azure Bastion",
        "CLOUDNET\\VirtualWAN",
        "CLOUDNET\\DDOS",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_carry_production_alias_order() {
        let map = TriageConfig::default().alias_map().expect("default map");
        let aliases = map.iter().map(|entry| entry.alias.as_str()).collect::<Vec<_>>();
        assert_eq!(
            aliases,
            vec![
                "rnm",
                "nrpinternal",
                "networkanalytics",
                "slb",
                "virtualwan",
                "networkservice",
                "nrp",
                "pubsub",
                "applicationgateway",
            ]
        );
        assert_eq!(map.label_for("NRP"), Some("CLOUDNET\\NRP"));
    }

    #[test]
    fn alias_map_normalizes_and_rejects_duplicates() {
        let map = TeamAliasMap::new(vec![TeamAlias::new("  PubSub ", "TeamX")]).expect("map");
        assert_eq!(map.label_for("pubsub"), Some("TeamX"));

        let err = TeamAliasMap::new(vec![
            TeamAlias::new("slb", "TeamA"),
            TeamAlias::new("SLB", "TeamB"),
        ])
        .expect_err("duplicate alias");
        assert!(matches!(err, ConfigError::DuplicateAlias { alias } if alias == "slb"));

        let err = TeamAliasMap::new(vec![TeamAlias::new(" ", "TeamA")]).expect_err("empty");
        assert!(matches!(err, ConfigError::EmptyAlias { .. }));
    }

    #[test]
    fn toml_overrides_merge_with_defaults() {
        let config = TriageConfig::from_toml_str(
            r#"
            position_policy = "most_occurrences"
            incident_link_template = ""

            [[teams]]
            alias = "pubsub"
            label = "TeamX"

            [window]
            error_radius_minutes = 15
            "#,
        )
        .expect("parse config");

        assert_eq!(config.position_policy, PositionPolicy::MostOccurrences);
        assert_eq!(config.teams.len(), 1);
        assert_eq!(config.window.error_radius(), Duration::minutes(15));
        assert_eq!(config.window.peak_lookback(), Duration::hours(144));
        assert_eq!(config.candidates.limit, 20);
        assert_eq!(config.incident_link(42), None);
        assert_eq!(config.source_root_pattern, DEFAULT_SOURCE_ROOT_PATTERN);
    }

    #[test]
    fn invalid_team_table_is_rejected_at_load() {
        let err = TriageConfig::from_toml_str(
            r#"
            [[teams]]
            alias = "nrp"
            label = ""
            "#,
        )
        .expect_err("empty label");
        assert!(matches!(err, ConfigError::EmptyLabel { .. }));
    }

    #[test]
    fn load_config_falls_back_to_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load_config(&dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config, TriageConfig::default());
        assert_eq!(
            config.incident_link(511101094).as_deref(),
            Some("https://portal.microsofticm.com/imp/v5/incidents/details/511101094/summary")
        );
    }

    #[test]
    fn load_config_reports_parse_errors() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "position_policy = [").expect("write");
        let err = load_config(file.path()).expect_err("broken toml");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
