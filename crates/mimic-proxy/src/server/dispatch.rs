//! Per-request dispatch: control plane, built-ins, then the action handler.

use super::writer::{BufferedResponseWriter, Reply, ResponseWriter};
use crate::action::{ActionError, ActionHandler};
use crate::logging::{best_effort, ErrorChain};
use crate::model::{HttpRequest, HttpResponse};
use crate::state::HttpStateHandler;
use futures::FutureExt;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub struct Dispatcher {
    state: Arc<HttpStateHandler>,
    actions: Arc<ActionHandler>,
    is_proxy: bool,
    port: u16,
}

impl Dispatcher {
    pub fn new(
        state: Arc<HttpStateHandler>,
        actions: Arc<ActionHandler>,
        is_proxy: bool,
        port: u16,
    ) -> Self {
        Self {
            state,
            actions,
            is_proxy,
            port,
        }
    }

    pub fn is_proxy(&self) -> bool {
        self.is_proxy
    }

    pub fn state(&self) -> &Arc<HttpStateHandler> {
        &self.state
    }

    /// Produce the single reply for `request`.
    ///
    /// A panic in either handler is reported as a 400 carrying the panic
    /// message, unless a response had already been written.
    pub async fn dispatch(
        &self,
        request: &HttpRequest,
        client_address: Option<SocketAddr>,
        local_addresses: &HashSet<String>,
    ) -> Reply {
        let mut writer = BufferedResponseWriter::new();

        let outcome = AssertUnwindSafe(self.route(
            request,
            &mut writer,
            client_address,
            local_addresses,
        ))
        .catch_unwind()
        .await;

        if let Err(payload) = outcome {
            let err = ActionError::from_panic(payload.as_ref());
            best_effort(self.state.formatter().error_log_with_cause(
                request,
                &err,
                "exception processing request {}",
                &[request],
            ));
            if !writer.has_written() {
                let body = ErrorChain(&err).to_string();
                writer.write_status(request, 400, Some(&body), Some("text/plain; charset=utf-8"));
            }
        }
        writer.into_reply()
    }

    async fn route(
        &self,
        request: &HttpRequest,
        writer: &mut BufferedResponseWriter,
        client_address: Option<SocketAddr>,
        local_addresses: &HashSet<String>,
    ) {
        if self.state.handle(request, writer, self.is_proxy) {
            return;
        }
        if let Some(response) = self.built_in(request) {
            writer.write_response(request, response);
            return;
        }
        self.actions
            .process_action(
                request,
                writer,
                client_address,
                local_addresses,
                self.is_proxy,
            )
            .await;
    }

    /// Server-level endpoints that sit outside the control-plane table.
    fn built_in(&self, request: &HttpRequest) -> Option<HttpResponse> {
        if request.matches("PUT", "/status") {
            let body = serde_json::json!({ "ports": [self.port] }).to_string();
            return Some(
                HttpResponse::new(200)
                    .with_content_type("application/json")
                    .with_body(body),
            );
        }
        if request.matches("PUT", "/bind") || request.matches("PUT", "/stop") {
            return Some(HttpResponse::new(501));
        }
        None
    }
}
