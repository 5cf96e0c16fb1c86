//! Conversions between axum requests/responses and bootx request parts.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, RawPathParams, Request};
use axum::response::Response;
use bytes::BytesMut;
use futures::StreamExt;
use http::StatusCode;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use tracing::{error, warn};

use bootx_core::{ErrorEnvelope, MIME_APPLICATION_JSON, RequestParts};

/// Buffers the body and collects everything an endpoint needs.
///
/// Bodies over `body_limit` bytes are answered with a 413 envelope, bodies
/// that fail to arrive with a 400 one.
pub async fn into_parts(
    request: Request,
    params: &RawPathParams,
    body_limit: usize,
) -> Result<RequestParts, Response> {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > body_limit) {
        return Err(too_large(body_limit));
    }

    let (parts, body) = request.into_parts();
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(err) => {
                warn!(uri = %parts.uri, error = %err, "failed to read request body");
                return Err(envelope(
                    StatusCode::BAD_REQUEST,
                    "failed to read request body",
                ));
            }
        };
        if buf.len() + chunk.len() > body_limit {
            return Err(too_large(body_limit));
        }
        buf.extend_from_slice(&chunk);
    }
    let body = buf.freeze();

    Ok(RequestParts {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        path_params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        remote_addr,
        body,
    })
}

fn too_large(limit: usize) -> Response {
    envelope(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("request body exceeds {limit} bytes"),
    )
}

/// A JSON `{code, message}` response outside any endpoint.
pub fn envelope(status: StatusCode, message: impl Into<String>) -> Response {
    let body = match ErrorEnvelope::new(status, message).to_pretty_json() {
        Ok(body) => body,
        Err(err) => {
            error!(error = %err, "failed to serialize error envelope");
            Vec::new()
        }
    };
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(MIME_APPLICATION_JSON));
    response
}

/// Hands an endpoint's buffered response to axum.
pub fn from_response(response: http::Response<bytes::Bytes>) -> Response {
    response.map(Body::from)
}
