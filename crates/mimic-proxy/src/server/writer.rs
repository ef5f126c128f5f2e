//! Response writing capability handed to the handlers.

use crate::model::{HttpRequest, HttpResponse};
use tracing::warn;

/// Outcome of handling one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Response(HttpResponse),
    /// Close the connection without writing anything
    DropConnection,
}

/// Where handlers put their single response.
pub trait ResponseWriter: Send {
    fn write_response(&mut self, request: &HttpRequest, response: HttpResponse);

    fn drop_connection(&mut self, request: &HttpRequest);

    fn write_status(
        &mut self,
        request: &HttpRequest,
        status: u16,
        body: Option<&str>,
        content_type: Option<&str>,
    ) {
        let mut response = HttpResponse::new(status);
        if let Some(body) = body {
            response = response.with_body(body);
        }
        if let Some(content_type) = content_type {
            response = response.with_content_type(content_type);
        }
        self.write_response(request, response);
    }
}

/// Captures the first reply; later writes are ignored with a warning.
#[derive(Debug, Default)]
pub struct BufferedResponseWriter {
    reply: Option<Reply>,
}

impl BufferedResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_written(&self) -> bool {
        self.reply.is_some()
    }

    /// The captured reply, or a 500 if no handler wrote one.
    pub fn into_reply(self) -> Reply {
        self.reply.unwrap_or_else(|| {
            warn!("no response was written, returning 500");
            Reply::Response(HttpResponse::new(500))
        })
    }

    fn set(&mut self, request: &HttpRequest, reply: Reply) {
        if self.reply.is_some() {
            warn!(
                method = %request.method,
                path = %request.path,
                "ignoring second response write"
            );
            return;
        }
        self.reply = Some(reply);
    }
}

impl ResponseWriter for BufferedResponseWriter {
    fn write_response(&mut self, request: &HttpRequest, response: HttpResponse) {
        self.set(request, Reply::Response(response));
    }

    fn drop_connection(&mut self, request: &HttpRequest) {
        self.set(request, Reply::DropConnection);
    }
}
