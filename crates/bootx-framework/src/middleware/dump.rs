//! Request/response dumping for handler calls.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::{Method, StatusCode, Uri};
use serde_json::Value;
use tracing::info;

use bootx_core::Context;

use super::{Middleware, Next, Skipper, default_skipper};

/// Everything [`Dump`] knows about one finished call.
#[derive(Debug, Clone)]
pub struct DumpRecord {
    pub func: String,
    pub request_id: String,
    pub remote_addr: Option<SocketAddr>,
    pub method: Method,
    pub uri: Uri,
    pub status: StatusCode,
    pub latency: Duration,
    /// The decoded payload, as seen before the handler ran.
    pub input: Option<Value>,
    /// The handler's response value.
    pub output: Option<Value>,
    pub error: Option<String>,
}

/// Receives one [`DumpRecord`] per call.
pub type DumpHandler = Arc<dyn Fn(&Context, &DumpRecord) + Send + Sync>;

/// Logs each call after the inner chain has unwound.
#[derive(Clone)]
pub struct Dump {
    handler: DumpHandler,
    skipper: Skipper,
}

impl Default for Dump {
    fn default() -> Self {
        Self {
            handler: Arc::new(log_record),
            skipper: default_skipper(),
        }
    }
}

impl Dump {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Context, &DumpRecord) + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    pub fn skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.skipper = Arc::new(skipper);
        self
    }
}

fn log_record(_ctx: &Context, record: &DumpRecord) {
    let input = record.input.as_ref().map(Value::to_string).unwrap_or_default();
    let output = record.output.as_ref().map(Value::to_string).unwrap_or_default();
    let remote = record
        .remote_addr
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    info!(
        func = %record.func,
        request_id = %record.request_id,
        remote = %remote,
        method = %record.method,
        uri = %record.uri,
        status = record.status.as_u16(),
        latency_ms = record.latency.as_millis() as u64,
        input = %input,
        output = %output,
        error = record.error.as_deref().unwrap_or(""),
        "dump"
    );
}

/// The status the client will see: the error's, a committed response's, or
/// the context's success status.
fn observed_status(ctx: &Context) -> StatusCode {
    if let Some(status) = ctx.with_error(|err| err.map(|e| e.status())) {
        return status;
    }
    ctx.with_response(|r| r.is_committed().then(|| r.status()))
        .unwrap_or_else(|| ctx.status())
}

#[async_trait]
impl Middleware for Dump {
    async fn handle(&self, ctx: &Context, next: Next<'_>) {
        if (self.skipper)(ctx) {
            next.run(ctx).await;
            return;
        }

        let start = Instant::now();
        next.run(ctx).await;
        let latency = start.elapsed();

        let record = DumpRecord {
            func: ctx.func_name(),
            request_id: ctx.id(),
            remote_addr: ctx.remote_addr(),
            method: ctx.method(),
            uri: ctx.uri(),
            status: observed_status(ctx),
            latency,
            input: ctx.payload_json(),
            output: ctx.response_json(),
            error: ctx.error_message(),
        };
        (self.handler)(ctx, &record);
    }
}
