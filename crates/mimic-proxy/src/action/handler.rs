//! Decides and executes the single action taken for a data-plane request.

use super::callback::CallbackRegistry;
use super::error::ActionError;
use super::forward::{ForwardTarget, Forwarder};
use super::FAULT_HEADER;
use crate::expectation::{Action, ErrorAction};
use crate::logging::{best_effort, ErrorChain, LogEntry};
use crate::metrics;
use crate::model::{HttpRequest, HttpResponse};
use crate::server::{Reply, ResponseWriter};
use crate::state::HttpStateHandler;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

const TEXT: &str = "text/plain; charset=utf-8";

pub struct ActionHandler {
    state: Arc<HttpStateHandler>,
    forwarder: Arc<dyn Forwarder>,
    callbacks: Arc<CallbackRegistry>,
}

impl ActionHandler {
    pub fn new(
        state: Arc<HttpStateHandler>,
        forwarder: Arc<dyn Forwarder>,
        callbacks: Arc<CallbackRegistry>,
    ) -> Self {
        Self {
            state,
            forwarder,
            callbacks,
        }
    }

    pub fn state(&self) -> &Arc<HttpStateHandler> {
        &self.state
    }

    /// Take exactly one action for `request` and write exactly one reply.
    ///
    /// Failures never escape: they become a 400 carrying the failure text,
    /// logged at error severity with the cause attached.
    pub async fn process_action(
        &self,
        request: &HttpRequest,
        writer: &mut dyn ResponseWriter,
        client_address: Option<SocketAddr>,
        local_addresses: &HashSet<String>,
        is_proxy: bool,
    ) {
        debug!(
            method = %request.method,
            path = %request.path,
            client = ?client_address,
            "processing action"
        );
        self.state.log(LogEntry::received(request.clone()));

        match self.execute(request, local_addresses, is_proxy).await {
            Ok(Reply::Response(response)) => writer.write_response(request, response),
            Ok(Reply::DropConnection) => writer.drop_connection(request),
            Err(err) => {
                metrics::record_action("failure");
                best_effort(self.state.formatter().error_log_with_cause(
                    request,
                    &err,
                    "exception processing request {}",
                    &[request],
                ));
                let body = ErrorChain(&err).to_string();
                writer.write_status(request, 400, Some(&body), Some(TEXT));
            }
        }
    }

    async fn execute(
        &self,
        request: &HttpRequest,
        local_addresses: &HashSet<String>,
        is_proxy: bool,
    ) -> Result<Reply, ActionError> {
        let formatter = self.state.formatter();

        let expectation = self.state.registry().first_match(request);
        let action = match expectation {
            Some(expectation) => expectation.action,
            None if is_proxy => {
                let target =
                    ForwardTarget::from_host_header(request).map_err(ActionError::InvalidTarget)?;
                return self.forward(request, target, local_addresses).await;
            }
            None => {
                metrics::record_action("not_found");
                best_effort(formatter.info_log(
                    request,
                    "no expectation for request {}",
                    &[request],
                ));
                return Ok(Reply::Response(HttpResponse::not_found()));
            }
        };

        let kind = action.kind();
        match action {
            Action::Respond(response) => {
                metrics::record_action(kind);
                best_effort(formatter.info_log(
                    request,
                    "returning response for request {}",
                    &[request],
                ));
                Ok(Reply::Response(response))
            }
            Action::Callback(callback) => {
                let name = callback.callback_name;
                let handler = self
                    .callbacks
                    .get(&name)
                    .ok_or_else(|| ActionError::UnknownCallback(name.clone()))?;
                let response = handler
                    .handle(request)
                    .await
                    .map_err(|source| ActionError::Callback {
                        name: name.clone(),
                        source: source.into(),
                    })?;
                metrics::record_action(kind);
                best_effort(formatter.info_log(
                    request,
                    "returning callback response for request {} from callback {}",
                    &[request, &name],
                ));
                Ok(Reply::Response(response))
            }
            Action::Forward(forward) => {
                self.forward(request, ForwardTarget::from(&forward), local_addresses)
                    .await
            }
            Action::Error(error) => {
                metrics::record_action(kind);
                best_effort(formatter.info_log(
                    request,
                    "returning error {} for request {}",
                    &[&error, request],
                ));
                Ok(error_reply(error))
            }
        }
    }

    /// Forward to `target` unless it is this server.
    async fn forward(
        &self,
        request: &HttpRequest,
        target: ForwardTarget,
        local_addresses: &HashSet<String>,
    ) -> Result<Reply, ActionError> {
        let formatter = self.state.formatter();

        // Checked before any network call: forwarding to ourselves recurses.
        if target.is_local(local_addresses) {
            metrics::record_action("loop_detected");
            best_effort(formatter.error_log(
                request,
                "proxy loop detected, refusing to forward request {} to {}",
                &[request, &target],
            ));
            return Ok(Reply::Response(
                HttpResponse::new(400)
                    .with_content_type(TEXT)
                    .with_body(format!("proxy loop detected forwarding to {target}")),
            ));
        }

        let response = self
            .forwarder
            .forward(&target, request)
            .await
            .map_err(|source| ActionError::forward(target.to_string(), source))?;

        metrics::record_action("forward");
        self.state
            .log(LogEntry::forwarded(request.clone(), response.clone()));
        best_effort(formatter.info_log(
            request,
            "forwarded request {} to {} and received response {}",
            &[request, &target, &response],
        ));
        Ok(Reply::Response(response))
    }
}

fn error_reply(error: ErrorAction) -> Reply {
    if error.drop_connection {
        return Reply::DropConnection;
    }
    Reply::Response(
        HttpResponse::new(error.status_code)
            .with_header(FAULT_HEADER, "true")
            .with_body(error.response_bytes),
    )
}
