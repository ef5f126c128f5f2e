//! Conversion between hyper messages and the crate's model.

use crate::model::{HttpRequest, HttpResponse, Multimap};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::{Request, Response, StatusCode};
use tracing::warn;

/// Read a hyper request, including its full body, into an [`HttpRequest`].
///
/// Absolute-form targets (`GET http://host:port/path`) are how forward
/// proxies receive requests; their authority replaces the `Host` header.
pub async fn into_http_request(
    request: Request<Incoming>,
    secure: bool,
) -> Result<HttpRequest, hyper::Error> {
    let (parts, body) = request.into_parts();
    let body = body.collect().await?.to_bytes();

    let mut headers = Multimap::new();
    for (name, value) in &parts.headers {
        headers
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    if let Some(authority) = parts.uri.authority() {
        headers.retain(|name, _| !name.eq_ignore_ascii_case("host"));
        headers.insert("host".to_string(), vec![authority.to_string()]);
    }

    let raw_query = parts.uri.query().map(str::to_string);
    let query_string_parameters = raw_query
        .as_deref()
        .map(HttpRequest::parse_query_string)
        .unwrap_or_default();

    Ok(HttpRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query_string_parameters,
        raw_query,
        headers,
        body: body.into(),
        secure,
    })
}

/// Build the hyper response for an [`HttpResponse`].
///
/// Headers that cannot be represented are skipped with a warning; an
/// unrepresentable status becomes 500.
pub fn into_hyper_response(response: HttpResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status_code).unwrap_or_else(|_| {
        warn!(status = response.status_code, "invalid status code, using 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });

    let mut builder = Response::builder().status(status);
    for (name, values) in &response.headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        for value in values {
            match (
                hyper::header::HeaderName::from_bytes(name.as_bytes()),
                hyper::header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => builder = builder.header(name, value),
                _ => warn!(header = %name, "skipping invalid response header"),
            }
        }
    }
    if let Some(phrase) = &response.reason_phrase {
        match ReasonPhrase::try_from(phrase.clone()) {
            Ok(phrase) => builder = builder.extension(phrase),
            Err(_) => warn!(reason = %phrase, "skipping invalid reason phrase"),
        }
    }

    builder
        .body(Full::new(response.body.bytes()))
        .unwrap_or_else(|err| {
            warn!(error = %err, "failed to build response, returning 500");
            let mut fallback = Response::new(Full::new(Bytes::new()));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
