//! Raw request/response body dumping.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use tracing::info;

use bootx_core::Context;

use super::{Middleware, Next, Skipper, default_skipper};
use crate::responder;

/// Which parts of an exchange [`BodyDump`] logs.
///
/// Body flags match on the request's and the response's content type
/// independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DumpOptions(u32);

impl DumpOptions {
    /// Log nothing.
    pub const NONE: Self = Self(1 << 0);
    /// Request and response headers.
    pub const HEADER: Self = Self(1 << 1);
    pub const FORM: Self = Self(1 << 2);
    pub const MULTIPART_FORM: Self = Self(1 << 3);
    pub const JSON: Self = Self(1 << 4);
    pub const HTML: Self = Self(1 << 5);
    pub const TEXT_PLAIN: Self = Self(1 << 6);
    pub const XML: Self = Self(1 << 7);
    pub const JS: Self = Self(1 << 8);
    /// Every body regardless of content type.
    pub const ALL: Self = Self(1 << 9);

    const BODY_KINDS: [(Self, &'static str); 7] = [
        (Self::FORM, "application/x-www-form-urlencoded"),
        (Self::MULTIPART_FORM, "multipart/form-data"),
        (Self::JSON, "application/json"),
        (Self::HTML, "text/html"),
        (Self::TEXT_PLAIN, "text/plain"),
        (Self::XML, "text/xml"),
        (Self::JS, "application/javascript"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether a body with this content type should be logged.
    pub fn dumps_body(self, content_type: &str) -> bool {
        if self.contains(Self::ALL) {
            return true;
        }
        Self::BODY_KINDS
            .iter()
            .any(|(flag, mime)| self.contains(*flag) && content_type.contains(mime))
    }
}

impl BitOr for DumpOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DumpOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// One side of a dumped exchange.
#[derive(Debug, Clone, Default)]
pub struct DumpedMessage {
    pub content_type: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl fmt::Display for DumpedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}

/// Receives the raw request and response of one call.
pub type BodyDumpHandler =
    Arc<dyn Fn(&Context, &DumpedMessage, &DumpedMessage, u64) + Send + Sync>;

/// Logs raw bodies, filtered by [`DumpOptions`].
#[derive(Clone)]
pub struct BodyDump {
    handler: BodyDumpHandler,
    skipper: Skipper,
}

impl BodyDump {
    /// Logs through `tracing` according to `options`.
    pub fn new(options: DumpOptions) -> Self {
        Self {
            handler: Arc::new(
                move |ctx: &Context, req: &DumpedMessage, res: &DumpedMessage, latency_ms: u64| {
                    log_exchange(options, ctx, req, res, latency_ms)
                },
            ),
            skipper: default_skipper(),
        }
    }

    /// Hands every exchange to `handler` instead of logging it.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Context, &DumpedMessage, &DumpedMessage, u64) + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            skipper: default_skipper(),
        }
    }

    pub fn skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.skipper = Arc::new(skipper);
        self
    }
}

fn log_exchange(
    options: DumpOptions,
    ctx: &Context,
    req: &DumpedMessage,
    res: &DumpedMessage,
    latency_ms: u64,
) {
    if options.contains(DumpOptions::NONE) {
        return;
    }
    let headers = options.contains(DumpOptions::HEADER);
    let request_body = options
        .dumps_body(&req.content_type)
        .then(|| req.to_string());
    let response_body = options
        .dumps_body(&res.content_type)
        .then(|| res.to_string());
    let remote = ctx.remote_addr().map(|a| a.to_string()).unwrap_or_default();

    info!(
        remote = %remote,
        method = %ctx.method(),
        uri = %ctx.uri(),
        latency_ms,
        request_headers = headers.then(|| format!("{:?}", req.headers)),
        request = request_body,
        response_headers = headers.then(|| format!("{:?}", res.headers)),
        response = response_body,
        "body dump"
    );
}

/// The response the client will receive.
fn outgoing(ctx: &Context) -> DumpedMessage {
    let content_type_of = |headers: &HeaderMap| {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    };
    match responder::peek(ctx) {
        Some(rendered) => {
            let mut headers = ctx.with_response(|r| r.headers().clone());
            let content_type = rendered.content_type.unwrap_or_default();
            if !content_type.is_empty()
                && let Ok(value) = content_type.parse()
            {
                headers.insert(CONTENT_TYPE, value);
            }
            DumpedMessage {
                content_type: content_type.to_owned(),
                headers,
                body: rendered.body,
            }
        }
        None => ctx.with_response(|r| DumpedMessage {
            content_type: content_type_of(r.headers()),
            headers: r.headers().clone(),
            body: r.body().clone(),
        }),
    }
}

#[async_trait]
impl Middleware for BodyDump {
    async fn handle(&self, ctx: &Context, next: Next<'_>) {
        if (self.skipper)(ctx) {
            next.run(ctx).await;
            return;
        }

        let start = Instant::now();
        let request = ctx.with_request(|r| DumpedMessage {
            content_type: r.content_type().unwrap_or_default(),
            headers: r.headers.clone(),
            body: r.body.clone(),
        });
        next.run(ctx).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let response = outgoing(ctx);
        (self.handler)(ctx, &request, &response, latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use http::{Method, StatusCode, Uri};
    use parking_lot::Mutex;

    use super::*;
    use crate::middleware::{Chain, Terminal};
    use bootx_core::{ContextEnv, RequestParts};

    struct Echo;

    impl Terminal for Echo {
        fn call<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                ctx.set_reply(Box::new(serde_json::json!({"msg": "hi"})));
            })
        }
    }

    struct Plain;

    impl Terminal for Plain {
        fn call<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()> {
            Box::pin(async move { ctx.string(StatusCode::OK, "pong") })
        }
    }

    type Seen = Arc<Mutex<Vec<(DumpedMessage, DumpedMessage)>>>;

    fn capture() -> (BodyDump, Seen) {
        let seen = Seen::default();
        let sink = seen.clone();
        let dump = BodyDump::with_handler(move |_, req, res, _| {
            sink.lock().push((req.clone(), res.clone()))
        });
        (dump, seen)
    }

    fn ctx() -> Context {
        let req = RequestParts::new(Method::POST, Uri::from_static("/echo"))
            .json(&serde_json::json!({"msg": "hi"}))
            .unwrap();
        Context::new(Arc::new(ContextEnv::default()), req)
    }

    #[test]
    fn test_option_flags() {
        let opts = DumpOptions::JSON | DumpOptions::FORM;
        assert_eq!(opts.bits(), 16 | 4);
        assert!(opts.dumps_body("application/json; charset=UTF-8"));
        assert!(opts.dumps_body("application/x-www-form-urlencoded"));
        assert!(!opts.dumps_body("text/plain"));
        assert!(DumpOptions::ALL.dumps_body("image/png"));
        assert!(!DumpOptions::HEADER.dumps_body("application/json"));
    }

    #[tokio::test]
    async fn test_captures_request_and_rendered_response() {
        let (dump, seen) = capture();
        Chain::new().with(dump).run(&ctx(), &Echo).await;

        let seen = seen.lock();
        let (req, res) = &seen[0];
        assert!(req.content_type.starts_with("application/json"));
        assert_eq!(req.to_string(), r#"{"msg":"hi"}"#);
        assert!(res.content_type.starts_with("application/json"));
        assert_eq!(res.to_string(), "{\n    \"msg\": \"hi\"\n}");
    }

    #[tokio::test]
    async fn test_captures_committed_response() {
        let (dump, seen) = capture();
        let ctx = ctx();
        Chain::new().with(dump).run(&ctx, &Plain).await;

        let seen = seen.lock();
        let (_, res) = &seen[0];
        assert!(res.content_type.starts_with("text/plain"));
        assert_eq!(res.to_string(), "pong");
        // dumping must not consume the response
        assert_eq!(ctx.take_response().body().as_ref(), b"pong");
    }

    #[tokio::test]
    async fn test_default_logger_runs() {
        let ctx = ctx();
        let dump = BodyDump::new(DumpOptions::HEADER | DumpOptions::JSON);
        Chain::new().with(dump).run(&ctx, &Echo).await;
        assert!(!ctx.is_committed());
        assert!(ctx.has_reply());
    }
}
