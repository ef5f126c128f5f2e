//! Active expectations, matched first-come first-served.

use super::matcher::{CompiledRequestMatcher, RequestDefinition, RequestMatcher};
use super::types::Expectation;
use crate::model::HttpRequest;
use parking_lot::RwLock;

struct Entry {
    expectation: Expectation,
    matcher: CompiledRequestMatcher,
}

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    next_id: u64,
}

/// Ordered set of expectations shared by the control plane and the action
/// handler.
#[derive(Default)]
pub struct ExpectationRegistry {
    inner: RwLock<Inner>,
}

impl ExpectationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expectation after all existing ones, returning its id.
    pub fn add(&self, mut expectation: Expectation) -> u64 {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        expectation.id = inner.next_id;
        let matcher = CompiledRequestMatcher::compile(&expectation.http_request);
        inner.entries.push(Entry {
            expectation,
            matcher,
        });
        inner.next_id
    }

    /// Find the first expectation matching `request` and consume one of its
    /// remaining uses, removing it once exhausted. The returned copy reflects
    /// the state before the use was consumed.
    ///
    /// Matching runs under the read lock. Only a limited expectation takes
    /// the write lock, to consume a use.
    pub fn first_match(&self, request: &HttpRequest) -> Option<Expectation> {
        loop {
            let matched = {
                let inner = self.inner.read();
                let entry = inner
                    .entries
                    .iter()
                    .find(|entry| entry.matcher.matches(request))?;
                entry.expectation.clone()
            };
            if matched.times.unlimited {
                return Some(matched);
            }

            let mut inner = self.inner.write();
            // Another request may have used it up since the scan
            let Some(index) = inner
                .entries
                .iter()
                .position(|entry| entry.expectation.id == matched.id)
            else {
                continue;
            };
            let before = inner.entries[index].expectation.clone();
            let times = &mut inner.entries[index].expectation.times;
            if !times.decrement() {
                continue;
            }
            if times.is_exhausted() {
                inner.entries.remove(index);
            }
            return Some(before);
        }
    }

    /// Remove expectations whose definition is covered by `filter`, or all of
    /// them when no filter is given. Returns how many were removed.
    pub fn clear(&self, filter: Option<&RequestDefinition>) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        match filter {
            Some(filter) => inner
                .entries
                .retain(|entry| !filter.covers(&entry.expectation.http_request)),
            None => inner.entries.clear(),
        }
        before - inner.entries.len()
    }

    pub fn reset(&self) {
        self.inner.write().entries.clear();
    }

    /// Snapshot of active expectations, optionally filtered like [`clear`](Self::clear).
    pub fn active(&self, filter: Option<&RequestDefinition>) -> Vec<Expectation> {
        let inner = self.inner.read();
        inner
            .entries
            .iter()
            .map(|entry| &entry.expectation)
            .filter(|expectation| filter.map_or(true, |f| f.covers(&expectation.http_request)))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}
