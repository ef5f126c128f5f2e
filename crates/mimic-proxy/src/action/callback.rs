//! Named callbacks that compute a response for a matched request.

use crate::model::{HttpRequest, HttpResponse};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Computes the response for a request matched by an `httpCallback`
/// expectation.
#[async_trait]
pub trait ExpectationCallback: Send + Sync {
    async fn handle(&self, request: &HttpRequest) -> anyhow::Result<HttpResponse>;
}

/// Callbacks by name.
#[derive(Default)]
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<String, Arc<dyn ExpectationCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `name`, replacing any previous one.
    pub fn register(&self, name: impl Into<String>, callback: Arc<dyn ExpectationCallback>) {
        self.callbacks.write().insert(name.into(), callback);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ExpectationCallback>> {
        self.callbacks.read().get(name).cloned()
    }
}

/// Posts the request as JSON to a URL and reads an `HttpResponse` back.
pub struct WebhookCallback {
    url: String,
    client: reqwest::Client,
}

impl WebhookCallback {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build webhook client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl ExpectationCallback for WebhookCallback {
    async fn handle(&self, request: &HttpRequest) -> anyhow::Result<HttpResponse> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("webhook {} unreachable", self.url))?
            .error_for_status()
            .with_context(|| format!("webhook {} returned an error status", self.url))?;
        response
            .json::<HttpResponse>()
            .await
            .with_context(|| format!("webhook {} returned an invalid response", self.url))
    }
}
