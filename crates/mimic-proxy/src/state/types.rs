//! Control-plane request bodies.

use crate::expectation::RequestDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounds on how many times a request must have been received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationTimes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_least: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_most: Option<usize>,
}

impl Default for VerificationTimes {
    fn default() -> Self {
        Self::at_least(1)
    }
}

impl VerificationTimes {
    pub fn at_least(count: usize) -> Self {
        Self {
            at_least: Some(count),
            at_most: None,
        }
    }

    pub fn exactly(count: usize) -> Self {
        Self {
            at_least: Some(count),
            at_most: Some(count),
        }
    }

    pub fn is_satisfied_by(&self, count: usize) -> bool {
        self.at_least.map_or(true, |min| count >= min)
            && self.at_most.map_or(true, |max| count <= max)
    }
}

impl fmt::Display for VerificationTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.at_least, self.at_most) {
            (Some(min), Some(max)) if min == max => write!(f, "exactly {min} times"),
            (Some(min), Some(max)) => write!(f, "between {min} and {max} times"),
            (Some(min), None) => write!(f, "at least {min} times"),
            (None, Some(max)) => write!(f, "at most {max} times"),
            (None, None) => f.write_str("any number of times"),
        }
    }
}

/// Body of the `verify` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    #[serde(default)]
    pub http_request: RequestDefinition,
    #[serde(default)]
    pub times: VerificationTimes,
}

/// Body of the `verify_sequence` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationSequence {
    #[serde(default)]
    pub http_requests: Vec<RequestDefinition>,
}

/// What the `retrieve` operation returns, selected by the `type` query
/// parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetrieveType {
    #[default]
    Requests,
    Logs,
    RecordedExpectations,
    ActiveExpectations,
}

impl RetrieveType {
    /// Accepts `recorded_expectations`, `RECORDED_EXPECTATIONS` and
    /// `recordedExpectations` style spellings.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "requests" => Some(RetrieveType::Requests),
            "logs" => Some(RetrieveType::Logs),
            "recordedexpectations" => Some(RetrieveType::RecordedExpectations),
            "activeexpectations" => Some(RetrieveType::ActiveExpectations),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_times() {
        assert!(VerificationTimes::default().is_satisfied_by(1));
        assert!(!VerificationTimes::default().is_satisfied_by(0));
        assert!(VerificationTimes::exactly(2).is_satisfied_by(2));
        assert!(!VerificationTimes::exactly(2).is_satisfied_by(3));
        assert_eq!(VerificationTimes::exactly(2).to_string(), "exactly 2 times");
    }

    #[test]
    fn test_verification_deserializes_with_defaults() {
        let verification: Verification =
            serde_json::from_str(r#"{"httpRequest": {"path": "/a"}}"#).unwrap();
        assert_eq!(verification.http_request.path.as_deref(), Some("/a"));
        assert_eq!(verification.times, VerificationTimes::at_least(1));
    }

    #[test]
    fn test_retrieve_type_spellings() {
        assert_eq!(RetrieveType::parse("requests"), Some(RetrieveType::Requests));
        assert_eq!(
            RetrieveType::parse("RECORDED_EXPECTATIONS"),
            Some(RetrieveType::RecordedExpectations)
        );
        assert_eq!(
            RetrieveType::parse("activeExpectations"),
            Some(RetrieveType::ActiveExpectations)
        );
        assert_eq!(RetrieveType::parse("bogus"), None);
    }
}
