//! Request definitions and the matching capability.
//!
//! A [`RequestDefinition`] is a partial description of a request. Every field
//! that is set must match; unset fields match anything. String fields match
//! exactly first and fall back to a full-string regular expression, so
//! `/users/\d+` and `/users/42` are both usable as a path.
//!
//! Definitions are compiled into a [`CompiledRequestMatcher`] before
//! matching so patterns are parsed once, not once per request.

use crate::model::{multimap_get, HttpRequest, Multimap};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Decides whether a request satisfies some criteria.
///
/// The event log and the registry only depend on this trait, so the matching
/// engine can be replaced without touching either.
pub trait RequestMatcher: Send + Sync {
    fn matches(&self, request: &HttpRequest) -> bool;
}

/// Body criteria.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum BodyDefinition {
    /// `"body": "exact text"`
    Exact(String),
    /// `"body": {"type": "STRING_CONTAINS", "string": "text"}` and friends
    Typed(TypedBody),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypedBody {
    String { string: String },
    StringContains { string: String },
    Regex { regex: String },
    /// Structural JSON equality, ignoring formatting and key order
    Json { json: serde_json::Value },
}

/// Partial request description used by expectations, retrieval filters and
/// verification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Every listed value must be present (names are case-insensitive)
    #[serde(
        default,
        skip_serializing_if = "Multimap::is_empty",
        deserialize_with = "crate::model::deserialize_multimap"
    )]
    pub headers: Multimap,

    #[serde(
        default,
        skip_serializing_if = "Multimap::is_empty",
        deserialize_with = "crate::model::deserialize_multimap"
    )]
    pub query_string_parameters: Multimap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDefinition>,

    /// Negate the whole definition
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not: bool,
}

impl RequestDefinition {
    /// Definition matching every request.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn query_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_string_parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn body(mut self, body: BodyDefinition) -> Self {
        self.body = Some(body);
        self
    }

    /// Whether every criterion set on `self` is also set, with the same
    /// value, on `other`. Used to select expectations by a partial definition.
    pub fn covers(&self, other: &RequestDefinition) -> bool {
        fn field<T: PartialEq>(mine: &Option<T>, theirs: &Option<T>) -> bool {
            mine.is_none() || mine == theirs
        }
        fn subset(mine: &Multimap, theirs: &Multimap, fold_case: bool) -> bool {
            mine.iter().all(|(name, values)| {
                let found = if fold_case {
                    multimap_get(theirs, name)
                } else {
                    theirs.get(name).map(Vec::as_slice)
                };
                found.is_some_and(|found| values.iter().all(|v| found.contains(v)))
            })
        }

        self.not == other.not
            && field(&self.method, &other.method)
            && field(&self.path, &other.path)
            && field(&self.body, &other.body)
            && subset(&self.headers, &other.headers, true)
            && subset(
                &self.query_string_parameters,
                &other.query_string_parameters,
                false,
            )
    }
}

/// Exact definition of an observed request, used when recording.
impl From<&HttpRequest> for RequestDefinition {
    fn from(request: &HttpRequest) -> Self {
        Self {
            method: Some(request.method.clone()),
            path: Some(request.path.clone()),
            headers: request.headers.clone(),
            query_string_parameters: request.query_string_parameters.clone(),
            body: request
                .body
                .as_str()
                .filter(|body| !body.is_empty())
                .map(|body| BodyDefinition::Exact(body.to_string())),
            not: false,
        }
    }
}

/// Compiles on every call; compile once with [`CompiledRequestMatcher`] when
/// matching many requests.
impl RequestMatcher for RequestDefinition {
    fn matches(&self, request: &HttpRequest) -> bool {
        CompiledRequestMatcher::compile(self).matches(request)
    }
}

impl fmt::Display for RequestDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// Exact text with a full-string regex fallback. An invalid pattern only
/// matches literally.
#[derive(Debug, Clone)]
struct CompiledPattern {
    literal: String,
    regex: Option<Arc<Regex>>,
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Self {
        Self {
            literal: pattern.to_string(),
            regex: Regex::new(&format!("^(?:{pattern})$")).ok().map(Arc::new),
        }
    }

    fn matches(&self, actual: &str) -> bool {
        self.literal == actual || self.regex_matches(actual)
    }

    fn matches_ignore_case(&self, actual: &str) -> bool {
        self.literal.eq_ignore_ascii_case(actual) || self.regex_matches(actual)
    }

    fn regex_matches(&self, actual: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(actual))
    }
}

#[derive(Debug, Clone)]
enum CompiledBody {
    Exact(String),
    Contains(String),
    /// Unanchored; `None` for an invalid pattern, which never matches
    Regex(Option<Arc<Regex>>),
    Json(serde_json::Value),
}

impl CompiledBody {
    fn compile(body: &BodyDefinition) -> Self {
        match body {
            BodyDefinition::Exact(text) | BodyDefinition::Typed(TypedBody::String { string: text }) => {
                CompiledBody::Exact(text.clone())
            }
            BodyDefinition::Typed(TypedBody::StringContains { string }) => {
                CompiledBody::Contains(string.clone())
            }
            BodyDefinition::Typed(TypedBody::Regex { regex }) => {
                CompiledBody::Regex(Regex::new(regex).ok().map(Arc::new))
            }
            BodyDefinition::Typed(TypedBody::Json { json }) => CompiledBody::Json(json.clone()),
        }
    }

    fn matches(&self, body: &[u8]) -> bool {
        if let CompiledBody::Json(expected) = self {
            return serde_json::from_slice::<serde_json::Value>(body)
                .map(|actual| &actual == expected)
                .unwrap_or(false);
        }
        let text = String::from_utf8_lossy(body);
        match self {
            CompiledBody::Exact(expected) => text == expected.as_str(),
            CompiledBody::Contains(expected) => text.contains(expected.as_str()),
            CompiledBody::Regex(regex) => regex.as_ref().is_some_and(|re| re.is_match(&text)),
            CompiledBody::Json(_) => false,
        }
    }
}

type CompiledMultimap = Vec<(String, Vec<CompiledPattern>)>;

fn compile_multimap(map: &Multimap) -> CompiledMultimap {
    map.iter()
        .map(|(name, values)| {
            (
                name.clone(),
                values.iter().map(|v| CompiledPattern::compile(v)).collect(),
            )
        })
        .collect()
}

fn multimap_matches<'a>(
    expected: &CompiledMultimap,
    lookup: impl Fn(&str) -> Option<&'a [String]>,
) -> bool {
    expected.iter().all(|(name, patterns)| match lookup(name) {
        Some(actual) => patterns
            .iter()
            .all(|pattern| actual.iter().any(|candidate| pattern.matches(candidate))),
        None => false,
    })
}

/// A [`RequestDefinition`] with its patterns compiled, ready for repeated
/// evaluation.
#[derive(Debug, Clone)]
pub struct CompiledRequestMatcher {
    method: Option<CompiledPattern>,
    path: Option<CompiledPattern>,
    headers: CompiledMultimap,
    query_string_parameters: CompiledMultimap,
    body: Option<CompiledBody>,
    not: bool,
}

impl CompiledRequestMatcher {
    pub fn compile(definition: &RequestDefinition) -> Self {
        Self {
            method: definition.method.as_deref().map(CompiledPattern::compile),
            path: definition.path.as_deref().map(CompiledPattern::compile),
            headers: compile_multimap(&definition.headers),
            query_string_parameters: compile_multimap(&definition.query_string_parameters),
            body: definition.body.as_ref().map(CompiledBody::compile),
            not: definition.not,
        }
    }

    fn matches_positive(&self, request: &HttpRequest) -> bool {
        if let Some(method) = &self.method {
            if !method.matches_ignore_case(&request.method) {
                return false;
            }
        }
        if let Some(path) = &self.path {
            if !path.matches(&request.path) {
                return false;
            }
        }
        if !multimap_matches(&self.headers, |name| multimap_get(&request.headers, name)) {
            return false;
        }
        if !multimap_matches(&self.query_string_parameters, |name| {
            request
                .query_string_parameters
                .get(name)
                .map(Vec::as_slice)
        }) {
            return false;
        }
        match &self.body {
            Some(body) => body.matches(request.body.as_bytes()),
            None => true,
        }
    }
}

impl From<&RequestDefinition> for CompiledRequestMatcher {
    fn from(definition: &RequestDefinition) -> Self {
        Self::compile(definition)
    }
}

impl RequestMatcher for CompiledRequestMatcher {
    fn matches(&self, request: &HttpRequest) -> bool {
        self.matches_positive(request) != self.not
    }
}
