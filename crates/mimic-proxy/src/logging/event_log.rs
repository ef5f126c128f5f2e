//! Append-only event log correlated to requests.
//!
//! Every decision taken while handling a request is recorded here, and the
//! control plane reads it back for retrieval and verification.

use crate::expectation::RequestMatcher;
use crate::model::{HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use prometheus::IntGauge;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => f.write_str("INFO"),
            LogLevel::Error => f.write_str("ERROR"),
        }
    }
}

/// What a log entry records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogEntryKind {
    /// A data-plane request arrived
    Received,
    /// A request was forwarded upstream and this response relayed back
    Forwarded { response: HttpResponse },
    /// A formatted decision message
    Message,
}

/// Immutable record in the event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    id: u64,
    timestamp: DateTime<Utc>,
    level: LogLevel,
    #[serde(flatten)]
    kind: LogEntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlated_request: Option<HttpRequest>,
    message: String,
}

impl LogEntry {
    fn new(
        level: LogLevel,
        kind: LogEntryKind,
        correlated_request: Option<HttpRequest>,
        message: String,
    ) -> Self {
        Self {
            id: 0,
            timestamp: Utc::now(),
            level,
            kind,
            correlated_request,
            message,
        }
    }

    /// A formatted message, optionally correlated to a request.
    pub fn message(
        level: LogLevel,
        correlated_request: Option<HttpRequest>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(level, LogEntryKind::Message, correlated_request, message.into())
    }

    pub fn received(request: HttpRequest) -> Self {
        Self::new(
            LogLevel::Info,
            LogEntryKind::Received,
            Some(request),
            "received request".to_string(),
        )
    }

    pub fn forwarded(request: HttpRequest, response: HttpResponse) -> Self {
        Self::new(
            LogLevel::Info,
            LogEntryKind::Forwarded { response },
            Some(request),
            "forwarded request".to_string(),
        )
    }

    /// Sequence number assigned by the store, starting at 1.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn kind(&self) -> &LogEntryKind {
        &self.kind
    }

    pub fn correlated_request(&self) -> Option<&HttpRequest> {
        self.correlated_request.as_ref()
    }

    pub fn text(&self) -> &str {
        &self.message
    }

    fn correlates_with(&self, matcher: Option<&dyn RequestMatcher>) -> bool {
        match (matcher, &self.correlated_request) {
            (None, _) => true,
            (Some(matcher), Some(request)) => matcher.matches(request),
            (Some(_), None) => false,
        }
    }
}

struct Inner {
    entries: Vec<Arc<LogEntry>>,
    next_id: u64,
}

/// Shared, append-only sequence of [`LogEntry`] values.
///
/// Appends and reads each take the lock once; readers get `Arc` clones so no
/// partially written entry is ever observable.
pub struct EventLogStore {
    inner: RwLock<Inner>,
    /// Tracks the entry count; updated under the write lock
    size: IntGauge,
}

impl EventLogStore {
    pub fn new() -> Self {
        Self::with_size_gauge(crate::metrics::LOG_ENTRIES.clone())
    }

    pub fn with_size_gauge(size: IntGauge) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                next_id: 0,
            }),
            size,
        }
    }

    /// Append an entry, returning its assigned sequence number.
    pub fn append(&self, mut entry: LogEntry) -> u64 {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        entry.id = id;
        inner.entries.push(Arc::new(entry));
        self.size.set(inner.entries.len() as i64);
        id
    }

    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.inner.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// Drop every entry. Sequence numbers keep increasing across resets.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        self.size.set(0);
    }

    /// Received requests, optionally filtered by a matcher, in arrival order.
    pub fn retrieve_requests(&self, matcher: Option<&dyn RequestMatcher>) -> Vec<HttpRequest> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .filter(|entry| matches!(entry.kind, LogEntryKind::Received))
            .filter(|entry| entry.correlates_with(matcher))
            .filter_map(|entry| entry.correlated_request.clone())
            .collect()
    }

    /// Message entries correlated with requests that satisfy the matcher.
    /// Uncorrelated messages are only returned when no matcher is given.
    pub fn retrieve_messages(&self, matcher: Option<&dyn RequestMatcher>) -> Vec<Arc<LogEntry>> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .filter(|entry| matches!(entry.kind, LogEntryKind::Message))
            .filter(|entry| entry.correlates_with(matcher))
            .cloned()
            .collect()
    }

    /// Request/response pairs relayed from upstream.
    pub fn retrieve_recorded(
        &self,
        matcher: Option<&dyn RequestMatcher>,
    ) -> Vec<(HttpRequest, HttpResponse)> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .filter(|entry| entry.correlates_with(matcher))
            .filter_map(|entry| match (&entry.kind, &entry.correlated_request) {
                (LogEntryKind::Forwarded { response }, Some(request)) => {
                    Some((request.clone(), response.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Number of received requests that satisfy the matcher.
    pub fn count_received(&self, matcher: &dyn RequestMatcher) -> usize {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .filter(|entry| matches!(entry.kind, LogEntryKind::Received))
            .filter(|entry| entry.correlates_with(Some(matcher)))
            .count()
    }

    /// Whether the received requests contain the matchers as an ordered
    /// (not necessarily contiguous) subsequence.
    pub fn verify_sequence<M: RequestMatcher>(&self, matchers: &[M]) -> bool {
        let requests = self.retrieve_requests(None);
        let mut pending = matchers.iter().peekable();
        for request in &requests {
            match pending.peek() {
                Some(matcher) if matcher.matches(request) => {
                    pending.next();
                }
                Some(_) => {}
                None => break,
            }
        }
        pending.peek().is_none()
    }
}

impl Default for EventLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::RequestDefinition;

    fn path(path: &str) -> RequestDefinition {
        RequestDefinition {
            path: Some(path.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_append_preserves_order_and_assigns_ids() {
        let store = EventLogStore::new();
        store.append(LogEntry::received(HttpRequest::new("GET", "/a")));
        store.append(LogEntry::message(LogLevel::Info, None, "hello"));
        store.append(LogEntry::received(HttpRequest::new("GET", "/b")));

        let entries = store.snapshot();
        assert_eq!(entries.len(), 3);
        let ids: Vec<u64> = entries.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(entries[1].text(), "hello");
    }

    #[test]
    fn test_size_gauge_tracks_concurrent_appends() {
        let gauge = IntGauge::new("test_log_entries", "entries").unwrap();
        let store = Arc::new(EventLogStore::with_size_gauge(gauge.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.append(LogEntry::received(HttpRequest::new("GET", format!("/{i}"))));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(gauge.get(), 400);
        assert_eq!(store.len(), 400);

        store.reset();
        assert_eq!(gauge.get(), 0);
    }

    #[test]
    fn test_retrieve_requests_filters_by_matcher() {
        let store = EventLogStore::new();
        store.append(LogEntry::received(HttpRequest::new("GET", "/a")));
        store.append(LogEntry::received(HttpRequest::new("GET", "/b")));
        store.append(LogEntry::message(
            LogLevel::Info,
            Some(HttpRequest::new("GET", "/a")),
            "matched",
        ));

        let all = store.retrieve_requests(None);
        assert_eq!(all.len(), 2);

        let only_a = store.retrieve_requests(Some(&path("/a")));
        assert_eq!(only_a, vec![HttpRequest::new("GET", "/a")]);
    }

    #[test]
    fn test_retrieve_messages_skips_uncorrelated_when_filtered() {
        let store = EventLogStore::new();
        store.append(LogEntry::message(LogLevel::Info, None, "global"));
        store.append(LogEntry::message(
            LogLevel::Error,
            Some(HttpRequest::new("GET", "/a")),
            "for a",
        ));

        assert_eq!(store.retrieve_messages(None).len(), 2);
        let filtered = store.retrieve_messages(Some(&path("/a")));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text(), "for a");
        assert_eq!(filtered[0].level(), LogLevel::Error);
    }

    #[test]
    fn test_retrieve_recorded_returns_forwarded_pairs() {
        let store = EventLogStore::new();
        store.append(LogEntry::received(HttpRequest::new("GET", "/a")));
        store.append(LogEntry::forwarded(
            HttpRequest::new("GET", "/a"),
            HttpResponse::new(201),
        ));

        let recorded = store.retrieve_recorded(None);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].1.status_code, 201);
    }

    #[test]
    fn test_verify_sequence_allows_gaps_but_not_reordering() {
        let store = EventLogStore::new();
        for p in ["/one", "/noise", "/two", "/three"] {
            store.append(LogEntry::received(HttpRequest::new("GET", p)));
        }

        assert!(store.verify_sequence(&[path("/one"), path("/two"), path("/three")]));
        assert!(store.verify_sequence(&[path("/one"), path("/three")]));
        assert!(!store.verify_sequence(&[path("/two"), path("/one")]));
        assert!(store.verify_sequence::<RequestDefinition>(&[]));
    }

    #[test]
    fn test_reset_clears_but_ids_keep_increasing() {
        let store = EventLogStore::new();
        store.append(LogEntry::received(HttpRequest::new("GET", "/a")));
        store.reset();
        assert!(store.is_empty());

        store.append(LogEntry::received(HttpRequest::new("GET", "/b")));
        assert_eq!(store.snapshot()[0].id(), 2);
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(EventLogStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store.append(LogEntry::received(HttpRequest::new(
                            "GET",
                            format!("/{t}/{i}"),
                        )));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entries = store.snapshot();
        assert_eq!(entries.len(), 2000);
        let mut ids: Vec<u64> = entries.iter().map(|e| e.id()).collect();
        let in_order = ids.windows(2).all(|w| w[0] < w[1]);
        assert!(in_order);
        ids.dedup();
        assert_eq!(ids.len(), 2000);
    }
}
