//! Upstream forwarding.

use crate::expectation::{ForwardAction, Scheme};
use crate::metrics;
use crate::model::{HttpRequest, HttpResponse, Multimap};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Where a request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl ForwardTarget {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    /// Resolve the target of a pure-proxy request from its `Host` header.
    pub fn from_host_header(request: &HttpRequest) -> Result<Self, String> {
        let host = request
            .first_header("host")
            .map(str::trim)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| "request has no Host header".to_string())?;
        let scheme = if request.secure {
            Scheme::Https
        } else {
            Scheme::Http
        };
        Self::parse_authority(scheme, host)
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    pub fn parse_authority(scheme: Scheme, authority: &str) -> Result<Self, String> {
        let invalid = || format!("invalid host {authority:?}");
        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail.strip_prefix(':') {
                Some(port) => (format!("[{host}]"), Some(port)),
                None if tail.is_empty() => (format!("[{host}]"), None),
                None => return Err(invalid()),
            }
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host.to_string(), Some(port)),
                None => (authority.to_string(), None),
            }
        };
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => scheme.default_port(),
        };
        Ok(Self::new(scheme, host, port))
    }

    /// `host` when the port is the scheme default, otherwise `host:port`.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            self.host_port()
        }
    }

    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the target is one of this server's own addresses, in either
    /// the elided or the explicit port form.
    pub fn is_local(&self, local_addresses: &HashSet<String>) -> bool {
        let authority = self.authority().to_ascii_lowercase();
        let host_port = self.host_port().to_ascii_lowercase();
        local_addresses.iter().any(|local| {
            let local = local.to_ascii_lowercase();
            local == authority || local == host_port
        })
    }

    /// Absolute URL for `request` at this target.
    pub fn url_for(&self, request: &HttpRequest) -> String {
        let path = if request.path.starts_with('/') {
            request.path.clone()
        } else {
            format!("/{}", request.path)
        };
        match request.query_string() {
            Some(query) => format!("{self}{path}?{query}"),
            None => format!("{self}{path}"),
        }
    }
}

impl From<&ForwardAction> for ForwardTarget {
    fn from(action: &ForwardAction) -> Self {
        let port = action.port.unwrap_or_else(|| action.scheme.default_port());
        Self::new(action.scheme, action.host.clone(), port)
    }
}

impl fmt::Display for ForwardTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("could not connect to upstream")]
    Connect(#[source] reqwest::Error),

    #[error("invalid method {0:?}")]
    InvalidMethod(String),

    #[error("upstream request failed")]
    Transport(#[source] reqwest::Error),

    #[error("could not build HTTP client")]
    Client(#[source] reqwest::Error),
}

/// Sends a request upstream and returns the upstream response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        target: &ForwardTarget,
        request: &HttpRequest,
    ) -> Result<HttpResponse, ForwardError>;
}

/// [`Forwarder`] backed by a shared `reqwest` client with a bounded timeout.
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ForwardError::Client)?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, err: reqwest::Error) -> ForwardError {
        if err.is_timeout() {
            ForwardError::Timeout(self.timeout)
        } else if err.is_connect() {
            ForwardError::Connect(err)
        } else {
            ForwardError::Transport(err)
        }
    }

    async fn send(
        &self,
        target: &ForwardTarget,
        request: &HttpRequest,
    ) -> Result<HttpResponse, ForwardError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| ForwardError::InvalidMethod(request.method.clone()))?;
        let url = target.url_for(request);
        debug!(%url, method = %method, "forwarding request upstream");

        let mut builder = self.client.request(method, &url);
        for (name, values) in &request.headers {
            if is_hop_by_hop(name)
                || name.eq_ignore_ascii_case("host")
                || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.bytes());
        }

        let upstream = builder.send().await.map_err(|err| self.classify(err))?;
        let status = upstream.status().as_u16();
        let mut headers = Multimap::new();
        for (name, value) in upstream.headers() {
            if is_hop_by_hop(name.as_str()) || *name == reqwest::header::CONTENT_LENGTH {
                continue;
            }
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        let body = upstream.bytes().await.map_err(|err| self.classify(err))?;

        let mut response = HttpResponse::new(status).with_body(body);
        response.headers = headers;
        Ok(response)
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(
        &self,
        target: &ForwardTarget,
        request: &HttpRequest,
    ) -> Result<HttpResponse, ForwardError> {
        let start = Instant::now();
        let result = self.send(target, request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(ForwardError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        metrics::record_forward(outcome, start.elapsed().as_secs_f64() * 1000.0);
        result
    }
}
