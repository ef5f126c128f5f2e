//! Request intake: the HTTP/1.1 listener feeding the dispatcher.

mod convert;
mod dispatch;
mod writer;

pub use convert::{into_http_request, into_hyper_response};
pub use dispatch::Dispatcher;
pub use writer::{BufferedResponseWriter, Reply, ResponseWriter};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Errors returned from the per-request service. Either one makes hyper close
/// the connection without writing a response.
#[derive(Debug, thiserror::Error)]
enum ServeError {
    #[error("failed to read request: {0}")]
    Intake(#[from] hyper::Error),

    #[error("connection dropped by expectation")]
    ConnectionDropped,
}

/// The addresses under which this server can be reached on `local`.
///
/// Each host is listed with the port suffix, or bare when the port is the
/// scheme default.
pub fn local_addresses(local: SocketAddr, secure: bool) -> HashSet<String> {
    let default_port = if secure { 443 } else { 80 };
    let ext = if local.port() == default_port {
        String::new()
    } else {
        format!(":{}", local.port())
    };
    let ip = match local {
        SocketAddr::V4(v4) => v4.ip().to_string(),
        SocketAddr::V6(v6) => format!("[{}]", v6.ip()),
    };
    [ip.as_str(), "localhost", "127.0.0.1"]
        .iter()
        .map(|host| format!("{host}{ext}"))
        .collect()
}

/// A bound listener; the dispatcher is supplied when serving.
pub struct Server {
    listener: TcpListener,
}

impl Server {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` fires.
    pub async fn serve(
        self,
        dispatcher: Arc<Dispatcher>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> std::io::Result<()> {
        let port = self.local_addr()?.port();
        info!(
            "mimic listening on {} ({} mode)",
            self.local_addr()?,
            if dispatcher.is_proxy() { "proxy" } else { "mock" }
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, client)) => {
                            let dispatcher = Arc::clone(&dispatcher);
                            let local = match stream.local_addr() {
                                Ok(local) => local,
                                Err(e) => {
                                    error!("Failed to read local address: {}", e);
                                    continue;
                                }
                            };
                            let locals = Arc::new(local_addresses(local, false));
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| {
                                    let dispatcher = Arc::clone(&dispatcher);
                                    let locals = Arc::clone(&locals);
                                    async move { handle(req, dispatcher, client, locals).await }
                                });
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    debug!("Connection error on port {}: {}", port, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error on port {}: {}", port, e);
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Server on port {} shutting down", port);
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn handle(
    request: Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
    client: SocketAddr,
    locals: Arc<HashSet<String>>,
) -> Result<Response<Full<Bytes>>, ServeError> {
    let request = into_http_request(request, false).await?;
    match dispatcher.dispatch(&request, Some(client), &locals).await {
        Reply::Response(response) => Ok(into_hyper_response(response)),
        Reply::DropConnection => Err(ServeError::ConnectionDropped),
    }
}
