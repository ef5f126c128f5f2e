//! Control-plane request handling.

use super::routes::{ControlOperation, ControlPlaneRoutes, RouteMatch};
use super::types::{RetrieveType, Verification, VerificationSequence};
use crate::expectation::{
    CompiledRequestMatcher, Expectation, ExpectationRegistry, RequestDefinition, RequestMatcher,
};
use crate::logging::{best_effort, Correlation, EventLogStore, LogEntry, LoggingFormatter};
use crate::metrics;
use crate::model::{HttpRequest, HttpResponse};
use crate::server::ResponseWriter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Owns the event log and the expectation registry and serves the control
/// plane.
pub struct HttpStateHandler {
    formatter: LoggingFormatter,
    registry: Arc<ExpectationRegistry>,
    routes: ControlPlaneRoutes,
}

impl HttpStateHandler {
    pub fn new(formatter: LoggingFormatter, routes: ControlPlaneRoutes) -> Self {
        Self {
            formatter,
            registry: Arc::new(ExpectationRegistry::new()),
            routes,
        }
    }

    pub fn formatter(&self) -> &LoggingFormatter {
        &self.formatter
    }

    pub fn store(&self) -> &Arc<EventLogStore> {
        self.formatter.store()
    }

    pub fn registry(&self) -> &Arc<ExpectationRegistry> {
        &self.registry
    }

    pub fn routes(&self) -> &ControlPlaneRoutes {
        &self.routes
    }

    /// Append an entry to the event log.
    pub fn log(&self, entry: LogEntry) {
        self.store().append(entry);
    }

    /// Register an expectation, returning its id.
    pub fn add_expectation(&self, expectation: Expectation) -> u64 {
        let id = self.registry.add(expectation.clone());
        best_effort(self.formatter.info_log(
            Correlation::None,
            "creating expectation:{}",
            &[&Expectation { id, ..expectation }],
        ));
        id
    }

    /// Serve `request` if it is a control-plane operation.
    ///
    /// Returns `true` when a response has been written; `false` means the
    /// request is data-plane traffic and nothing was written.
    pub fn handle(
        &self,
        request: &HttpRequest,
        writer: &mut dyn ResponseWriter,
        is_proxy: bool,
    ) -> bool {
        let operation = match self.routes.resolve(request, is_proxy) {
            RouteMatch::NotControlPlane => return false,
            RouteMatch::WrongMethod(operation) => {
                debug!(
                    operation = %operation,
                    method = %request.method,
                    "control-plane path reached with unsupported method"
                );
                writer.write_status(request, 501, None, None);
                return true;
            }
            RouteMatch::Operation(operation) => operation,
        };

        debug!(operation = %operation, path = %request.path, "control-plane request");
        metrics::record_control_request(operation.as_str());

        let response = match operation {
            ControlOperation::Expectation => self.create_expectations(request),
            ControlOperation::Clear => self.clear(request),
            ControlOperation::Reset => self.reset(),
            ControlOperation::Retrieve => self.retrieve(request),
            ControlOperation::Verify => self.verify(request),
            ControlOperation::VerifySequence => self.verify_sequence(request),
            ControlOperation::DumpToLog => self.dump_to_log(),
            ControlOperation::Metrics => metrics_response(),
        };
        writer.write_response(request, response);
        true
    }

    fn create_expectations(&self, request: &HttpRequest) -> HttpResponse {
        match Expectation::parse_all(&request.body.to_string_lossy()) {
            Ok(expectations) => {
                for expectation in expectations {
                    self.add_expectation(expectation);
                }
                HttpResponse::new(201)
            }
            Err(err) => text_response(400, err.to_string()),
        }
    }

    fn clear(&self, request: &HttpRequest) -> HttpResponse {
        let filter = match parse_optional::<RequestDefinition>(request) {
            Ok(filter) => filter,
            Err(response) => return response,
        };
        let removed = self.registry.clear(filter.as_ref());
        let result = match &filter {
            Some(filter) => self.formatter.info_log(
                Correlation::None,
                "cleared {} expectation(s) that match:{}",
                &[&removed, filter],
            ),
            None => self.formatter.info_log(
                Correlation::None,
                "cleared all {} expectation(s)",
                &[&removed],
            ),
        };
        best_effort(result);
        HttpResponse::new(200)
    }

    fn reset(&self) -> HttpResponse {
        self.registry.reset();
        self.store().reset();
        best_effort(self.formatter.info_log(
            Correlation::None,
            "resetting all expectations and request logs",
            &[],
        ));
        HttpResponse::new(200)
    }

    fn retrieve(&self, request: &HttpRequest) -> HttpResponse {
        let kind = match request.first_query_parameter("type") {
            None => RetrieveType::default(),
            Some(value) => match RetrieveType::parse(value) {
                Some(kind) => kind,
                None => return text_response(400, format!("invalid retrieve type: {value}")),
            },
        };
        let filter = match parse_optional::<RequestDefinition>(request) {
            Ok(filter) => filter,
            Err(response) => return response,
        };
        let compiled = filter.as_ref().map(CompiledRequestMatcher::compile);
        let matcher = compiled.as_ref().map(|m| m as &dyn RequestMatcher);
        let store = self.store();

        match kind {
            RetrieveType::Requests => json_response(200, &store.retrieve_requests(matcher)),
            RetrieveType::Logs => {
                let entries = store.retrieve_messages(matcher);
                let entries: Vec<&LogEntry> = entries.iter().map(Arc::as_ref).collect();
                json_response(200, &entries)
            }
            RetrieveType::RecordedExpectations => {
                let recorded: Vec<Expectation> = store
                    .retrieve_recorded(matcher)
                    .into_iter()
                    .map(|(request, response)| {
                        Expectation::respond(RequestDefinition::from(&request), response)
                    })
                    .collect();
                json_response(200, &recorded)
            }
            RetrieveType::ActiveExpectations => {
                json_response(200, &self.registry.active(filter.as_ref()))
            }
        }
    }

    fn verify(&self, request: &HttpRequest) -> HttpResponse {
        let verification = match parse_optional::<Verification>(request) {
            Ok(verification) => verification.unwrap_or_default(),
            Err(response) => return response,
        };
        best_effort(self.formatter.info_log(
            Correlation::None,
            "verifying requests that match:{}",
            &[&verification.http_request],
        ));

        let matcher = CompiledRequestMatcher::compile(&verification.http_request);
        let count = self.store().count_received(&matcher);
        if verification.times.is_satisfied_by(count) {
            return HttpResponse::new(202);
        }
        let received = pretty_json(&self.store().retrieve_requests(None));
        text_response(
            406,
            format!(
                "Request not found {}, expected:<{}> but was:<{}>",
                verification.times, verification.http_request, received
            ),
        )
    }

    fn verify_sequence(&self, request: &HttpRequest) -> HttpResponse {
        let sequence = match parse_optional::<VerificationSequence>(request) {
            Ok(sequence) => sequence.unwrap_or_default(),
            Err(response) => return response,
        };
        let expected = pretty_json(&sequence.http_requests);
        best_effort(self.formatter.info_log(
            Correlation::None,
            "verifying sequence that matches:{}",
            &[&expected],
        ));

        let matchers: Vec<CompiledRequestMatcher> = sequence
            .http_requests
            .iter()
            .map(CompiledRequestMatcher::compile)
            .collect();
        if self.store().verify_sequence(&matchers) {
            return HttpResponse::new(202);
        }
        let received = pretty_json(&self.store().retrieve_requests(None));
        text_response(
            406,
            format!("Request sequence not found, expected:<{expected}> but was:<{received}>"),
        )
    }

    fn dump_to_log(&self) -> HttpResponse {
        for expectation in self.registry.active(None) {
            best_effort(self.formatter.info_log(
                Correlation::None,
                "active expectation:{}",
                &[&expectation],
            ));
        }
        HttpResponse::new(200)
    }
}

fn metrics_response() -> HttpResponse {
    match metrics::collect_metrics() {
        Ok(text) => HttpResponse::new(200)
            .with_content_type("text/plain; version=0.0.4")
            .with_body(text),
        Err(err) => text_response(500, err.to_string()),
    }
}

/// Deserialize the JSON body, treating an empty body as absent. A malformed
/// body yields the 400 response to send back.
fn parse_optional<T: DeserializeOwned>(request: &HttpRequest) -> Result<Option<T>, HttpResponse> {
    if request.body.as_bytes().iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(request.body.as_bytes())
        .map(Some)
        .map_err(|err| text_response(400, format!("invalid request body: {err}")))
}

fn text_response(status: u16, body: String) -> HttpResponse {
    HttpResponse::new(status)
        .with_content_type(TEXT)
        .with_body(body)
}

fn json_response<T: Serialize + ?Sized>(status: u16, value: &T) -> HttpResponse {
    match serde_json::to_string_pretty(value) {
        Ok(json) => HttpResponse::new(status)
            .with_content_type(JSON)
            .with_body(json),
        Err(err) => text_response(500, err.to_string()),
    }
}

fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|err| err.to_string())
}
