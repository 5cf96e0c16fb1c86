//! Middleware composition.
//!
//! A [`Chain`] `[m1, m2, ..., mn]` built around a terminal `t` runs as
//! `m1(m2(...mn(t)))`: pre-`next` logic runs first-registered first, and
//! post-`next` logic unwinds in reverse. A middleware that returns without
//! calling [`Next::run`] skips everything inside it; the responder still
//! renders whatever the context's slots hold.
//!
//! ```rust,ignore
//! struct Timing;
//!
//! #[async_trait]
//! impl Middleware for Timing {
//!     async fn handle(&self, ctx: &Context, next: Next<'_>) {
//!         let start = Instant::now();
//!         next.run(ctx).await;
//!         tracing::info!(elapsed = ?start.elapsed(), "done");
//!     }
//! }
//! ```

mod body_dump;
mod dump;
#[cfg(feature = "jwt")]
mod jwt;
mod request_id;
mod validate;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use bootx_core::Context;

pub use body_dump::{BodyDump, BodyDumpHandler, DumpOptions, DumpedMessage};
pub use dump::{Dump, DumpHandler, DumpRecord};
#[cfg(feature = "jwt")]
pub use jwt::{DEFAULT_AUTH_SCHEME, Jwt, JwtClaims, JwtError, JwtErrorHandler, JwtKey, TokenLookup};
pub use request_id::RequestId;
pub use validate::ValidatePayload;

/// A cross-cutting step wrapped around a route's handler.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, ctx: &Context, next: Next<'_>);
}

/// The innermost step of a chain.
pub trait Terminal: Send + Sync {
    fn call<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()>;
}

/// Decides per request whether a middleware steps aside.
pub type Skipper = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Never skips.
pub fn default_skipper() -> Skipper {
    Arc::new(|_: &Context| false)
}

// ============================================================================
// Next
// ============================================================================

/// The remainder of a chain, handed to each middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], terminal: &'a dyn Terminal) -> Self {
        Self { chain, terminal }
    }

    /// Runs the rest of the chain, then the terminal.
    pub async fn run(self, ctx: &Context) {
        match self.chain.split_first() {
            Some((first, rest)) => {
                let next = Next {
                    chain: rest,
                    terminal: self.terminal,
                };
                first.handle(ctx, next).await;
            }
            None => self.terminal.call(ctx).await,
        }
    }
}

// ============================================================================
// Chain
// ============================================================================

/// An ordered list of middleware; first registered is outermost.
#[derive(Clone, Default)]
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `middleware` as the new innermost layer.
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.push(middleware);
        self
    }

    pub fn with_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn push(&mut self, middleware: impl Middleware) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Appends every layer of `other`, keeping its order.
    pub fn extend(&mut self, other: &Chain) {
        self.middleware.extend(other.middleware.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs the chain around `terminal`.
    pub async fn run(&self, ctx: &Context, terminal: &dyn Terminal) {
        Next::new(&self.middleware, terminal).run(ctx).await;
    }

    /// Fixes the chain around `terminal`, producing a new terminal.
    pub fn build<T: Terminal>(self, terminal: T) -> Composed<T> {
        Composed {
            chain: self,
            terminal,
        }
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("len", &self.middleware.len())
            .finish()
    }
}

/// A chain bound to its terminal.
pub struct Composed<T> {
    chain: Chain,
    terminal: T,
}

impl<T: Terminal> Terminal for Composed<T> {
    fn call<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()> {
        Box::pin(self.chain.run(ctx, &self.terminal))
    }
}

// ============================================================================
// from_fn
// ============================================================================

/// Middleware backed by a function.
pub struct FromFn<F>(F);

/// Adapts a function into a [`Middleware`].
///
/// ```rust,ignore
/// let audit = from_fn(|ctx, next| Box::pin(async move {
///     next.run(ctx).await;
///     tracing::info!(status = %ctx.status(), "audited");
/// }));
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a Context, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    FromFn(f)
}

#[async_trait]
impl<F> Middleware for FromFn<F>
where
    F: for<'a> Fn(&'a Context, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &Context, next: Next<'_>) {
        (self.0)(ctx, next).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use bootx_core::{ContextEnv, RequestParts};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    #[async_trait]
    impl Middleware for Recorder {
        async fn handle(&self, ctx: &Context, next: Next<'_>) {
            self.log.lock().push(format!("{}:pre", self.name));
            next.run(ctx).await;
            self.log.lock().push(format!("{}:post", self.name));
        }
    }

    struct Record(Log, Arc<AtomicUsize>);

    impl Terminal for Record {
        fn call<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.1.fetch_add(1, Ordering::SeqCst);
                self.0.lock().push("t".to_string());
            })
        }
    }

    fn ctx() -> Context {
        Context::new(Arc::new(ContextEnv::default()), RequestParts::default())
    }

    fn recorder(name: &'static str, log: &Log) -> Recorder {
        Recorder {
            name,
            log: log.clone(),
        }
    }

    #[tokio::test]
    async fn test_chain_order_is_lifo() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .with(recorder("m1", &log))
            .with(recorder("m2", &log))
            .with(recorder("m3", &log));

        chain.run(&ctx(), &Record(log.clone(), calls.clone())).await;

        assert_eq!(
            *log.lock(),
            ["m1:pre", "m2:pre", "m3:pre", "t", "m3:post", "m2:post", "m1:post"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_inner_layers() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = from_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.string(http::StatusCode::FORBIDDEN, "stop");
            })
        });
        let chain = Chain::new()
            .with(recorder("outer", &log))
            .with(gate)
            .with(recorder("inner", &log));

        let ctx = ctx();
        chain.run(&ctx, &Record(log.clone(), calls.clone())).await;

        assert_eq!(*log.lock(), ["outer:pre", "outer:post"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(ctx.is_committed());
    }

    #[tokio::test]
    async fn test_nested_chains_compose_in_order() {
        let log = Log::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = Chain::new()
            .with(recorder("route", &log))
            .build(Record(log.clone(), calls.clone()));
        let outer = Chain::new().with(recorder("global", &log));

        outer.run(&ctx(), &inner).await;

        assert_eq!(
            *log.lock(),
            ["global:pre", "route:pre", "t", "route:post", "global:post"]
        );
    }
}
