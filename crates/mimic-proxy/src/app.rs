//! Wiring of the handlers from a [`Config`].

use crate::action::{ActionHandler, CallbackRegistry, HttpForwarder, WebhookCallback};
use crate::config::Config;
use crate::logging::{EventLogStore, LeveledLogger, LoggingFormatter};
use crate::server::{Dispatcher, Server};
use crate::state::HttpStateHandler;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The state and action handlers sharing one event log and registry.
pub struct Mimic {
    state: Arc<HttpStateHandler>,
    actions: Arc<ActionHandler>,
    is_proxy: bool,
}

impl Mimic {
    /// Build the handlers, register configured callbacks and load the
    /// initial expectations.
    pub fn from_config(config: &Config, logger: Arc<dyn LeveledLogger>) -> anyhow::Result<Self> {
        let formatter = LoggingFormatter::new(logger, Arc::new(EventLogStore::new()));
        let state = Arc::new(HttpStateHandler::new(
            formatter,
            config.control_plane.to_routes(),
        ));

        let callbacks = Arc::new(CallbackRegistry::new());
        for callback in &config.callbacks {
            let webhook = WebhookCallback::new(callback.url.clone(), callback.timeout())
                .with_context(|| format!("failed to create callback '{}'", callback.name))?;
            callbacks.register(callback.name.clone(), Arc::new(webhook));
        }

        let forwarder = HttpForwarder::new(
            config.upstream.timeout(),
            config.upstream.connect_timeout(),
        )
        .context("failed to create upstream client")?;
        let actions = Arc::new(ActionHandler::new(
            Arc::clone(&state),
            Arc::new(forwarder),
            callbacks,
        ));

        for expectation in &config.expectations {
            state.add_expectation(expectation.clone());
        }
        info!(
            expectations = config.expectations.len(),
            callbacks = config.callbacks.len(),
            "mimic configured"
        );

        Ok(Self {
            state,
            actions,
            is_proxy: config.mode.is_proxy(),
        })
    }

    /// Dispatcher for a listener bound on `port`.
    pub fn dispatcher(&self, port: u16) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            Arc::clone(&self.state),
            Arc::clone(&self.actions),
            self.is_proxy,
            port,
        ))
    }

    /// Bind `addr` and serve in a background task until `shutdown` fires.
    /// Returns the bound address.
    pub async fn spawn(
        &self,
        addr: SocketAddr,
        shutdown: broadcast::Receiver<()>,
    ) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<std::io::Result<()>>)> {
        let server = Server::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let local = server.local_addr()?;
        let dispatcher = self.dispatcher(local.port());
        let handle = tokio::spawn(server.serve(dispatcher, shutdown));
        Ok((local, handle))
    }
}
