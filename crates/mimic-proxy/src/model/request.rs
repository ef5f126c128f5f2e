//! Parsed inbound HTTP request.

use super::{deserialize_multimap, multimap_get, Body, Multimap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An inbound request as seen by the dispatch core. Immutable once observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    #[serde(
        default,
        skip_serializing_if = "Multimap::is_empty",
        deserialize_with = "deserialize_multimap"
    )]
    pub query_string_parameters: Multimap,
    /// Query string exactly as received, relayed as-is when forwarding
    #[serde(skip)]
    pub raw_query: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Multimap::is_empty",
        deserialize_with = "deserialize_multimap"
    )]
    pub headers: Multimap,
    #[serde(default, skip_serializing_if = "Body::is_empty")]
    pub body: Body,
    /// Whether the request arrived over TLS
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secure: bool,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_query_parameter(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.query_string_parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self.raw_query = None;
        self
    }

    /// Set the query from a raw string, keeping it for relaying.
    pub fn with_raw_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query_string_parameters = Self::parse_query_string(&query);
        self.raw_query = Some(query);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Exact method (case-insensitive) and path check.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.path == path
    }

    /// First value of the named header, case-insensitive.
    pub fn first_header(&self, name: &str) -> Option<&str> {
        multimap_get(&self.headers, name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// First value of the named query parameter.
    pub fn first_query_parameter(&self, name: &str) -> Option<&str> {
        self.query_string_parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// The query as received, or the parameters re-encoded when the request
    /// was built without one. `None` when there is no query.
    pub fn query_string(&self) -> Option<String> {
        if let Some(raw) = &self.raw_query {
            return Some(raw.clone());
        }
        if self.query_string_parameters.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .query_string_parameters
            .iter()
            .flat_map(|(name, values)| {
                values.iter().map(move |value| {
                    format!(
                        "{}={}",
                        urlencoding::encode(name),
                        urlencoding::encode(value)
                    )
                })
            })
            .collect();
        Some(pairs.join("&"))
    }

    /// Parse a raw query string, URL-decoding keys and values.
    pub fn parse_query_string(query: &str) -> Multimap {
        let mut params = Multimap::new();
        for pair in query.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " "))
                .map(|k| k.into_owned())
                .unwrap_or_else(|_| key.to_string());
            let value = urlencoding::decode(&value.replace('+', " "))
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            params.entry(key).or_default().push(value);
        }
        params
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{} {}", self.method, self.path),
        }
    }
}
