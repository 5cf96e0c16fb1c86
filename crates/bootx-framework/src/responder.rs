//! Turns a context's slots into the final response.
//!
//! Runs once per request, after the whole chain has unwound:
//!
//! 1. a response already committed by user code is left alone;
//! 2. an error renders the [`ErrorEnvelope`](bootx_core::ErrorEnvelope) with
//!    its status (`HEAD` requests get the status only);
//! 3. a response value renders as pretty JSON with the context's status;
//! 4. otherwise an empty body with the context's status.
//!
//! A value that fails to serialize is logged and answered with an empty 500;
//! it never re-enters the error path.

use bytes::Bytes;
use http::{Method, StatusCode};
use tracing::error;

use bootx_core::{Context, MIME_APPLICATION_JSON};

/// A response computed from the context, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl Rendered {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            content_type: None,
            body: Bytes::new(),
        }
    }

    fn json(status: StatusCode, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: Some(MIME_APPLICATION_JSON),
            body: Bytes::from(body),
        }
    }
}

/// Computes the response for the current slots, or `None` if user code has
/// already committed one.
pub fn render(ctx: &Context) -> Option<Rendered> {
    compute(ctx, true)
}

/// Like [`render`], without logging.
pub fn peek(ctx: &Context) -> Option<Rendered> {
    compute(ctx, false)
}

fn compute(ctx: &Context, log: bool) -> Option<Rendered> {
    if ctx.is_committed() {
        return None;
    }
    let head = ctx.method() == Method::HEAD;
    let debug = ctx.debug();

    let failure = ctx.with_error(|err| {
        err.map(|e| (e.envelope(debug), e.is_unknown().then(|| e.to_string())))
    });
    if let Some((envelope, unknown)) = failure {
        if log && let Some(message) = unknown {
            error!(func = %ctx.func_name(), error = %message, "request failed");
        }
        let status = envelope.status();
        if head {
            return Some(Rendered::empty(status));
        }
        return Some(match envelope.to_pretty_json() {
            Ok(body) => Rendered::json(status, body),
            Err(e) => {
                if log {
                    error!(error = %e, "failed to serialize error envelope");
                }
                Rendered::empty(StatusCode::INTERNAL_SERVER_ERROR)
            }
        });
    }

    let status = ctx.status();
    let body = ctx.with_reply(|reply| reply.map(|r| (r.type_name(), r.to_pretty_json())));
    Some(match body {
        None => Rendered::empty(status),
        Some((_, Ok(_))) if head => Rendered::empty(status),
        Some((_, Ok(body))) => Rendered::json(status, body),
        Some((type_name, Err(e))) => {
            if log {
                error!(
                    func = %ctx.func_name(),
                    response_type = type_name,
                    error = %e,
                    "failed to serialize response value"
                );
            }
            Rendered::empty(StatusCode::INTERNAL_SERVER_ERROR)
        }
    })
}

/// Renders and commits the response.
pub fn respond(ctx: &Context) {
    let Some(rendered) = render(ctx) else {
        return;
    };
    ctx.with_response(|sink| match rendered.content_type {
        Some(content_type) => sink.write(rendered.status, content_type, rendered.body),
        None => sink.no_content(rendered.status),
    });
}
