//! HTTP response produced by the action pipeline or the control plane.

use super::{
    default_status_code, deserialize_multimap, deserialize_status_code, multimap_get, Body,
    Multimap,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    #[serde(
        default = "default_status_code",
        deserialize_with = "deserialize_status_code"
    )]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Multimap::is_empty",
        deserialize_with = "deserialize_multimap"
    )]
    pub headers: Multimap,
    #[serde(default, skip_serializing_if = "Body::is_empty")]
    pub body: Body,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self::new(default_status_code())
    }
}

impl HttpResponse {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            reason_phrase: None,
            headers: Multimap::new(),
            body: Body::empty(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Replace any existing `Content-Type` header.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.headers
            .retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
        self.headers
            .insert("Content-Type".to_string(), vec![content_type.into()]);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.first_header("content-type")
    }

    pub fn first_header(&self, name: &str) -> Option<&str> {
        multimap_get(&self.headers, name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

impl fmt::Display for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{}", self.status_code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_accepts_string() {
        let response: HttpResponse =
            serde_json::from_str(r#"{"statusCode": "418", "body": "teapot"}"#).unwrap();
        assert_eq!(response.status_code, 418);
        assert_eq!(response.body.as_str(), Some("teapot"));
    }

    #[test]
    fn test_status_code_defaults_to_ok() {
        let response: HttpResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.status_code, 200);
    }

    #[test]
    fn test_with_content_type_replaces_existing() {
        let response = HttpResponse::new(200)
            .with_header("content-type", "text/html")
            .with_content_type("application/json");
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.headers.len(), 1);
    }
}
