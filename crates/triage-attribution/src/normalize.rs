use crate::AttributionError;
use regex::Regex;
use std::fmt;
use triage_core::config::DEFAULT_SOURCE_ROOT_PATTERN;

const PATH_SEPARATORS: [char; 2] = ['\\', '/'];

/// One cleaned class path taken from a single stack-trace line: digits
/// stripped, path separators collapsed into single spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassPathFragment(String);

impl ClassPathFragment {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassPathFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PathNormalizer {
    pattern: Regex,
}

impl PathNormalizer {
    /// The pattern must capture the sub-path below the source root as group 1.
    pub fn new(pattern: &str) -> Result<Self, AttributionError> {
        let compiled = Regex::new(pattern).map_err(|err| AttributionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: err.to_string(),
        })?;
        if compiled.captures_len() < 2 {
            return Err(AttributionError::MissingCaptureGroup {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self { pattern: compiled })
    }

    pub fn normalize(&self, error_details: &str) -> Vec<ClassPathFragment> {
        error_details
            .lines()
            .filter_map(|line| self.normalize_line(line))
            .collect()
    }

    pub fn normalize_line(&self, line: &str) -> Option<ClassPathFragment> {
        let captured = self.pattern.captures(line)?.get(1)?.as_str();
        Some(ClassPathFragment(clean_path(captured)))
    }
}

impl Default for PathNormalizer {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_SOURCE_ROOT_PATTERN).expect("valid regex"),
        }
    }
}

fn clean_path(path: &str) -> String {
    let without_digits = path
        .chars()
        .filter(|ch| !ch.is_ascii_digit())
        .collect::<String>();
    without_digits
        .split(PATH_SEPARATORS)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
