//! Expectation definitions.
//!
//! On the wire an expectation names its action with one of the keys
//! `httpResponse`, `httpForward`, `httpCallback` or `httpError`. Exactly one
//! must be present; the raw form is validated into [`Expectation`].

use super::matcher::RequestDefinition;
use crate::model::HttpResponse;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpectationError {
    #[error("invalid expectation: {0}")]
    Json(String),

    #[error("expectation must define one of httpResponse, httpForward, httpCallback or httpError")]
    MissingAction,

    #[error("expectation defines more than one action: {}", .0.join(", "))]
    AmbiguousAction(Vec<&'static str>),

    #[error("httpForward requires a non-empty host")]
    EmptyForwardHost,

    #[error("httpCallback requires a callbackName")]
    EmptyCallbackName,

    #[error("times.remainingTimes must be greater than zero unless times.unlimited is true")]
    ExhaustedTimes,
}

impl From<serde_json::Error> for ExpectationError {
    fn from(err: serde_json::Error) -> Self {
        ExpectationError::Json(err.to_string())
    }
}

/// URL scheme used for forwarding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forward the matched request to a fixed upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardAction {
    pub host: String,
    /// Defaults to the scheme's port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub scheme: Scheme,
}

/// Delegate the response to a named callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackAction {
    pub callback_name: String,
}

/// Simulate a broken upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAction {
    /// Close the connection without writing a response
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub drop_connection: bool,
    /// Raw bytes written as the body, base64 on the wire
    #[serde(
        default,
        skip_serializing_if = "Bytes::is_empty",
        with = "base64_bytes"
    )]
    pub response_bytes: Bytes,
    #[serde(
        default = "default_error_status",
        deserialize_with = "crate::model::deserialize_status_code"
    )]
    pub status_code: u16,
}

fn default_error_status() -> u16 {
    502
}

impl Default for ErrorAction {
    fn default() -> Self {
        Self {
            drop_connection: false,
            response_bytes: Bytes::new(),
            status_code: default_error_status(),
        }
    }
}

impl fmt::Display for ErrorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.drop_connection {
            write!(f, "drop connection")
        } else {
            write!(
                f,
                "status {} with {} byte(s)",
                self.status_code,
                self.response_bytes.len()
            )
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

/// What to do with a matched request.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Respond(HttpResponse),
    Forward(ForwardAction),
    Callback(CallbackAction),
    Error(ErrorAction),
}

impl Action {
    /// Short label used in metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Respond(_) => "response",
            Action::Forward(_) => "forward",
            Action::Callback(_) => "callback",
            Action::Error(_) => "error",
        }
    }
}

/// How many more times an expectation may match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Times {
    #[serde(default)]
    pub remaining_times: u32,
    #[serde(default)]
    pub unlimited: bool,
}

impl Default for Times {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl Times {
    pub fn unlimited() -> Self {
        Self {
            remaining_times: 0,
            unlimited: true,
        }
    }

    pub fn exactly(count: u32) -> Self {
        Self {
            remaining_times: count,
            unlimited: false,
        }
    }

    pub fn once() -> Self {
        Self::exactly(1)
    }

    pub fn is_exhausted(&self) -> bool {
        !self.unlimited && self.remaining_times == 0
    }

    /// Consume one use. Returns false when nothing was left.
    pub(crate) fn decrement(&mut self) -> bool {
        if self.unlimited {
            return true;
        }
        match self.remaining_times.checked_sub(1) {
            Some(left) => {
                self.remaining_times = left;
                true
            }
            None => false,
        }
    }
}

/// A request definition paired with the action to take when it matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExpectationWire", into = "ExpectationWire")]
pub struct Expectation {
    /// Assigned by the registry; zero until registered
    pub id: u64,
    pub http_request: RequestDefinition,
    pub action: Action,
    pub times: Times,
}

impl Expectation {
    pub fn new(http_request: RequestDefinition, action: Action) -> Self {
        Self {
            id: 0,
            http_request,
            action,
            times: Times::unlimited(),
        }
    }

    pub fn respond(http_request: RequestDefinition, response: HttpResponse) -> Self {
        Self::new(http_request, Action::Respond(response))
    }

    pub fn with_times(mut self, times: Times) -> Self {
        self.times = times;
        self
    }

    /// Parse one expectation or a JSON array of them.
    pub fn parse_all(json: &str) -> Result<Vec<Expectation>, ExpectationError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let raws: Vec<ExpectationWire> = if value.is_array() {
            serde_json::from_value(value)?
        } else {
            vec![serde_json::from_value(value)?]
        };
        raws.into_iter().map(Expectation::try_from).collect()
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "expectation {}", self.id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpectationWire {
    #[serde(default, skip_serializing_if = "is_zero")]
    id: u64,
    #[serde(default)]
    http_request: RequestDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_response: Option<HttpResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_forward: Option<ForwardAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_callback: Option<CallbackAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    http_error: Option<ErrorAction>,
    #[serde(default)]
    times: Times,
}

fn is_zero(id: &u64) -> bool {
    *id == 0
}

impl TryFrom<ExpectationWire> for Expectation {
    type Error = ExpectationError;

    fn try_from(wire: ExpectationWire) -> Result<Self, Self::Error> {
        let present: Vec<&'static str> = [
            ("httpResponse", wire.http_response.is_some()),
            ("httpForward", wire.http_forward.is_some()),
            ("httpCallback", wire.http_callback.is_some()),
            ("httpError", wire.http_error.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect();
        if present.len() > 1 {
            return Err(ExpectationError::AmbiguousAction(present));
        }

        let action = if let Some(response) = wire.http_response {
            Action::Respond(response)
        } else if let Some(forward) = wire.http_forward {
            if forward.host.trim().is_empty() {
                return Err(ExpectationError::EmptyForwardHost);
            }
            Action::Forward(forward)
        } else if let Some(callback) = wire.http_callback {
            if callback.callback_name.trim().is_empty() {
                return Err(ExpectationError::EmptyCallbackName);
            }
            Action::Callback(callback)
        } else if let Some(error) = wire.http_error {
            Action::Error(error)
        } else {
            return Err(ExpectationError::MissingAction);
        };

        if wire.times.is_exhausted() {
            return Err(ExpectationError::ExhaustedTimes);
        }

        Ok(Expectation {
            id: wire.id,
            http_request: wire.http_request,
            action,
            times: wire.times,
        })
    }
}

impl From<Expectation> for ExpectationWire {
    fn from(expectation: Expectation) -> Self {
        let mut wire = ExpectationWire {
            id: expectation.id,
            http_request: expectation.http_request,
            times: expectation.times,
            ..Default::default()
        };
        match expectation.action {
            Action::Respond(response) => wire.http_response = Some(response),
            Action::Forward(forward) => wire.http_forward = Some(forward),
            Action::Callback(callback) => wire.http_callback = Some(callback),
            Action::Error(error) => wire.http_error = Some(error),
        }
        wire
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn encode_response_bytes(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn test_parse_single_response_expectation() {
        let expectations = Expectation::parse_all(
            r#"{
                "httpRequest": {"method": "GET", "path": "/hello"},
                "httpResponse": {"statusCode": 200, "body": "world"},
                "times": {"remainingTimes": 2, "unlimited": false}
            }"#,
        )
        .unwrap();

        assert_eq!(expectations.len(), 1);
        let expectation = &expectations[0];
        assert_eq!(expectation.http_request.path.as_deref(), Some("/hello"));
        assert_eq!(expectation.times, Times::exactly(2));
        match &expectation.action {
            Action::Respond(response) => assert_eq!(response.body.as_str(), Some("world")),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_parse_array_with_defaults() {
        let expectations = Expectation::parse_all(
            r#"[
                {"httpForward": {"host": "upstream.local", "port": 8080}},
                {"httpError": {"dropConnection": true}},
                {"httpCallback": {"callbackName": "audit"}}
            ]"#,
        )
        .unwrap();

        assert_eq!(expectations.len(), 3);
        assert_eq!(expectations[0].http_request, RequestDefinition::default());
        assert_eq!(expectations[0].times, Times::unlimited());
        assert_eq!(
            expectations[0].action,
            Action::Forward(ForwardAction {
                host: "upstream.local".to_string(),
                port: Some(8080),
                scheme: Scheme::Http,
            })
        );
        match &expectations[1].action {
            Action::Error(error) => {
                assert!(error.drop_connection);
                assert_eq!(error.status_code, 502);
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(expectations[2].action.kind(), "callback");
    }

    #[test]
    fn test_error_action_decodes_base64() {
        let expectations = Expectation::parse_all(&format!(
            r#"{{"httpError": {{"responseBytes": "{}"}}}}"#,
            encode_response_bytes(b"\x00garbage")
        ))
        .unwrap();
        match &expectations[0].action {
            Action::Error(error) => assert_eq!(&error.response_bytes[..], b"\x00garbage"),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn test_missing_action_is_rejected() {
        let err = Expectation::parse_all(r#"{"httpRequest": {"path": "/x"}}"#).unwrap_err();
        assert_eq!(err, ExpectationError::MissingAction);
    }

    #[test]
    fn test_multiple_actions_are_rejected() {
        let err = Expectation::parse_all(
            r#"{"httpResponse": {}, "httpForward": {"host": "a"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExpectationError::AmbiguousAction(vec!["httpResponse", "httpForward"])
        );
    }

    #[test]
    fn test_zero_limited_times_is_rejected() {
        let err = Expectation::parse_all(
            r#"{"httpResponse": {}, "times": {"remainingTimes": 0, "unlimited": false}}"#,
        )
        .unwrap_err();
        assert_eq!(err, ExpectationError::ExhaustedTimes);
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let err = Expectation::parse_all("{not json").unwrap_err();
        assert!(matches!(err, ExpectationError::Json(_)));
    }

    #[test]
    fn test_serializes_back_to_wire_keys() {
        let expectation = Expectation::respond(
            RequestDefinition::any().path("/a"),
            HttpResponse::new(204),
        );
        let json = serde_json::to_value(&expectation).unwrap();
        assert_eq!(json["httpRequest"]["path"], "/a");
        assert_eq!(json["httpResponse"]["statusCode"], 204);
        assert!(json.get("httpForward").is_none());
        assert_eq!(json["times"]["unlimited"], true);
    }

    #[test]
    fn test_times_decrement() {
        let mut times = Times::exactly(1);
        assert!(times.decrement());
        assert!(times.is_exhausted());
        assert!(!times.decrement());

        let mut unlimited = Times::unlimited();
        assert!(unlimited.decrement());
        assert!(!unlimited.is_exhausted());
    }
}
