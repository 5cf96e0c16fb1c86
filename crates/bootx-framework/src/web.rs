//! The web application context and its endpoints.
//!
//! A [`Web`] owns everything shared by its routes: the context pool, the
//! pre-use middleware chain and the route table. It is built once and
//! passed around explicitly:
//!
//! ```rust,ignore
//! let web = Web::builder().debug(true).build();
//! web.pre_use(Dump::new());
//! web.post("/echo", echo, Chain::new());
//!
//! for route in web.routes() {
//!     router = router.route(&route.path, on(route.method, route.endpoint));
//! }
//! ```
//!
//! Each request to an [`Endpoint`] runs:
//!
//! ```text
//! acquire ─▶ pre-use chain ─▶ bind ─▶ route chain ─▶ invoke
//!                                                      │
//! release ◀─ take response ◀─ respond ◀────────────────┘
//! ```

use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use http::Method;
use parking_lot::RwLock;
use tracing::{Instrument, debug, error, info_span};

use bootx_core::{
    Binder, Context, ContextEnv, ContextPool, DEFAULT_POOL_CAPACITY, DefaultBinder,
    DefaultValidator, Error, RequestParts, Validator,
};

use crate::binding::{bind_payload, empty_payload};
use crate::descriptor::{HandlerDescriptor, PayloadType, describe};
use crate::error::{RegistrationError, RegistrationResult};
use crate::handler::Handler;
use crate::invoke::Invoke;
use crate::middleware::{Chain, Composed, Middleware, RequestId, Terminal};
use crate::responder;

// ============================================================================
// WebBuilder
// ============================================================================

/// Configures a [`Web`].
pub struct WebBuilder {
    debug: bool,
    binder: Arc<dyn Binder>,
    validator: Arc<dyn Validator>,
    pool_capacity: usize,
    request_id: bool,
    pre_bind: bool,
}

impl Default for WebBuilder {
    fn default() -> Self {
        Self {
            debug: false,
            binder: Arc::new(DefaultBinder),
            validator: Arc::new(DefaultValidator),
            pool_capacity: DEFAULT_POOL_CAPACITY,
            request_id: true,
            pre_bind: true,
        }
    }
}

impl WebBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include real error text in 500 responses.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn binder(mut self, binder: impl Binder) -> Self {
        self.binder = Arc::new(binder);
        self
    }

    pub fn validator(mut self, validator: impl Validator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Maximum number of idle contexts kept for reuse.
    pub fn pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Install [`RequestId`] in front of the pre-use chain (default `true`).
    pub fn request_id(mut self, enabled: bool) -> Self {
        self.request_id = enabled;
        self
    }

    /// Decode and validate payloads before the route chain runs (default
    /// `true`). Routes can override this through [`RouteOptions::pre_bind`].
    pub fn pre_bind(mut self, enabled: bool) -> Self {
        self.pre_bind = enabled;
        self
    }

    pub fn build(self) -> Web {
        let env = ContextEnv {
            binder: self.binder,
            validator: self.validator,
            debug: self.debug,
        };
        let mut pre_use = Chain::new();
        if self.request_id {
            pre_use.push(RequestId::new());
        }
        Web {
            inner: Arc::new(WebInner {
                pool: ContextPool::new(Arc::new(env), self.pool_capacity),
                pre_use: Arc::new(RwLock::new(Arc::new(pre_use))),
                routes: RwLock::new(Vec::new()),
                pre_bind: self.pre_bind,
            }),
        }
    }
}

// ============================================================================
// RouteOptions
// ============================================================================

/// Per-route registration settings.
///
/// A bare [`Chain`] converts into options with the application defaults.
#[derive(Clone, Default)]
pub struct RouteOptions {
    chain: Chain,
    pre_bind: Option<bool>,
}

impl RouteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Middleware wrapping this route's handler.
    pub fn chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Overrides [`WebBuilder::pre_bind`] for this route.
    ///
    /// With pre-binding off the handler receives its payload type built from
    /// an empty object and reads the request itself, usually through
    /// [`Context::bind_and_validate`].
    pub fn pre_bind(mut self, enabled: bool) -> Self {
        self.pre_bind = Some(enabled);
        self
    }
}

impl From<Chain> for RouteOptions {
    fn from(chain: Chain) -> Self {
        Self::new().chain(chain)
    }
}

// ============================================================================
// Web
// ============================================================================

type SharedChain = Arc<RwLock<Arc<Chain>>>;

struct WebInner {
    pool: Arc<ContextPool>,
    pre_use: SharedChain,
    routes: RwLock<Vec<Route>>,
    pre_bind: bool,
}

/// The application-wide web context.
///
/// Cloning is cheap; clones share the pool, chain and routes.
#[derive(Clone)]
pub struct Web {
    inner: Arc<WebInner>,
}

impl Default for Web {
    fn default() -> Self {
        WebBuilder::default().build()
    }
}

impl Web {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> WebBuilder {
        WebBuilder::new()
    }

    pub fn debug(&self) -> bool {
        self.inner.pool.env().debug
    }

    pub fn pool(&self) -> &Arc<ContextPool> {
        &self.inner.pool
    }

    /// Appends a middleware to the chain every route runs first.
    ///
    /// Applies to endpoints registered before and after the call.
    pub fn pre_use(&self, middleware: impl Middleware) {
        let mut slot = self.inner.pre_use.write();
        let mut chain = Chain::clone(&slot);
        chain.push(middleware);
        *slot = Arc::new(chain);
    }

    /// Adapts `handler` into an endpoint and records it in the route table.
    ///
    /// The route chain wraps the handler only, inside the bind stage.
    pub fn try_register<H, T>(
        &self,
        method: Method,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> RegistrationResult<Endpoint>
    where
        H: Handler<T>,
    {
        let RouteOptions { chain, pre_bind } = options.into();
        if !path.starts_with('/') {
            return Err(RegistrationError::InvalidPath {
                path: path.to_string(),
            });
        }

        let descriptor = describe(&handler.signature())?;
        let callable = handler.into_callable();
        if callable.shape() != descriptor.shape {
            return Err(RegistrationError::CallableMismatch {
                name: descriptor.display_name,
                declared: descriptor.shape.as_str(),
                actual: callable.shape().as_str(),
            });
        }

        let pre_bind = pre_bind.unwrap_or(self.inner.pre_bind);
        let bind = match descriptor.payload {
            None => BindMode::None,
            Some(payload) if pre_bind => BindMode::Decode(payload),
            Some(payload) => {
                (payload.empty)().map_err(|err| RegistrationError::EmptyPayload {
                    name: descriptor.display_name.clone(),
                    payload: payload.token.name,
                    reason: err.to_string(),
                })?;
                BindMode::Empty(payload)
            }
        };

        debug!(
            method = %method,
            path,
            func = %descriptor.display_name,
            shape = %descriptor.shape,
            middleware = chain.len(),
            pre_bind,
            "route registered"
        );

        let stage = RouteStage {
            bind,
            inner: chain.build(Invoke::new(callable)),
        };
        let endpoint = Endpoint {
            inner: Arc::new(EndpointInner {
                pool: self.inner.pool.clone(),
                pre_use: self.inner.pre_use.clone(),
                descriptor,
                stage,
            }),
        };
        self.inner.routes.write().push(Route {
            method,
            path: path.to_string(),
            endpoint: endpoint.clone(),
        });
        Ok(endpoint)
    }

    /// Like [`try_register`](Self::try_register), panicking on an invalid
    /// handler. Meant for startup code.
    pub fn register<H, T>(
        &self,
        method: Method,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> Endpoint
    where
        H: Handler<T>,
    {
        match self.try_register(method, path, handler, options) {
            Ok(endpoint) => endpoint,
            Err(err) => panic!("bootx: {err}"),
        }
    }

    pub fn get<H: Handler<T>, T>(
        &self,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> Endpoint {
        self.register(Method::GET, path, handler, options)
    }

    pub fn post<H: Handler<T>, T>(
        &self,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> Endpoint {
        self.register(Method::POST, path, handler, options)
    }

    pub fn put<H: Handler<T>, T>(
        &self,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> Endpoint {
        self.register(Method::PUT, path, handler, options)
    }

    pub fn patch<H: Handler<T>, T>(
        &self,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> Endpoint {
        self.register(Method::PATCH, path, handler, options)
    }

    pub fn delete<H: Handler<T>, T>(
        &self,
        path: &str,
        handler: H,
        options: impl Into<RouteOptions>,
    ) -> Endpoint {
        self.register(Method::DELETE, path, handler, options)
    }

    /// Every registered route, in registration order.
    pub fn routes(&self) -> Vec<Route> {
        self.inner.routes.read().clone()
    }
}

impl std::fmt::Debug for Web {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Web")
            .field("debug", &self.debug())
            .field("pre_use", &self.inner.pre_use.read().len())
            .field("routes", &self.inner.routes.read().len())
            .finish()
    }
}

/// One entry of the route table.
#[derive(Clone, Debug)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub endpoint: Endpoint,
}

// ============================================================================
// Endpoint
// ============================================================================

/// How a route fills the payload slot before its chain runs.
enum BindMode {
    None,
    Decode(PayloadType),
    Empty(PayloadType),
}

/// Bind stage followed by the route chain and the handler.
struct RouteStage {
    bind: BindMode,
    inner: Composed<Invoke>,
}

impl Terminal for RouteStage {
    fn call<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let bound = match &self.bind {
                BindMode::None => true,
                BindMode::Decode(payload) => bind_payload(ctx, payload),
                BindMode::Empty(payload) => empty_payload(ctx, payload),
            };
            if bound {
                self.inner.call(ctx).await;
            }
        })
    }
}

struct EndpointInner {
    pool: Arc<ContextPool>,
    pre_use: SharedChain,
    descriptor: HandlerDescriptor,
    stage: RouteStage,
}

/// A registered handler, callable with a buffered request.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    pub fn descriptor(&self) -> &HandlerDescriptor {
        &self.inner.descriptor
    }

    /// Runs one request through the whole pipeline.
    ///
    /// The context goes back to the pool on every path, including panics in
    /// middleware or the handler.
    pub async fn handle(&self, request: RequestParts) -> http::Response<Bytes> {
        let inner = &*self.inner;
        let span = info_span!(
            "bootx.request",
            method = %request.method,
            path = %request.path(),
            func = %inner.descriptor.display_name,
        );

        async move {
            let guard = inner.pool.acquire(request);
            let ctx = guard.context();
            ctx.set_func_name(&inner.descriptor.display_name);

            let chain = inner.pre_use.read().clone();
            let outcome = AssertUnwindSafe(chain.run(ctx, &inner.stage))
                .catch_unwind()
                .await;
            if let Err(panic) = outcome {
                let message = panic_message(&*panic);
                error!(panic = %message, "handler panicked");
                ctx.set_error(Error::Panic(message));
            }

            responder::respond(ctx);
            ctx.take_response()
        }
        .instrument(span)
        .await
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("func", &self.inner.descriptor.display_name)
            .field("shape", &self.inner.descriptor.shape)
            .finish()
    }
}

impl tower::Service<RequestParts> for Endpoint {
    type Response = http::Response<Bytes>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RequestParts) -> Self::Future {
        let endpoint = self.clone();
        Box::pin(async move { Ok(endpoint.handle(request).await) })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http::{StatusCode, Uri};
    use serde::{Deserialize, Serialize};
    use tower::ServiceExt;

    use super::*;
    use crate::handler::{Callable, ErasedHandler, HandlerFuture};
    use crate::descriptor::{ReturnKind, Signature};
    use crate::middleware::from_fn;
    use bootx_core::{BoxError, HEADER_REQUEST_ID, HttpError, REDACTED_MESSAGE, Validate};

    #[derive(Debug, Deserialize)]
    struct EchoRequest {
        #[allow(dead_code)]
        id: String,
        msg: String,
    }

    impl Validate for EchoRequest {}

    #[derive(Serialize)]
    struct EchoResponse {
        msg: String,
    }

    async fn echo(_ctx: Context, req: EchoRequest) -> Result<EchoResponse, HttpError> {
        Ok(EchoResponse { msg: req.msg })
    }

    async fn broken() -> Result<(), BoxError> {
        Err("connection refused by db".into())
    }

    async fn missing(ctx: Context) -> Result<(), HttpError> {
        Err(HttpError::not_found(format!("no user {}", ctx.param("id").unwrap_or_default())))
    }

    async fn whoami(ctx: Context) -> Result<String, HttpError> {
        ctx.principal::<String>()
            .map(|p| (*p).clone())
            .ok_or_else(|| HttpError::unauthorized("anonymous"))
    }

    async fn explode() -> Result<(), HttpError> {
        panic!("boom")
    }

    fn post_json(path: &'static str, body: &'static str) -> RequestParts {
        RequestParts::new(Method::POST, Uri::from_static(path))
            .header("content-type", "application/json")
            .body(body)
    }

    fn body(response: &http::Response<Bytes>) -> &str {
        std::str::from_utf8(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let web = Web::new();
        let endpoint = web.post("/echo", echo, Chain::new());

        let response = endpoint.handle(post_json("/echo", r#"{"id":"1","msg":"hi"}"#)).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "{\n    \"msg\": \"hi\"\n}");
        assert!(response.headers().contains_key(HEADER_REQUEST_ID));
        assert_eq!(web.pool().idle(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_never_reaches_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let web = Web::new();
        let endpoint = web.post(
            "/echo",
            move |req: EchoRequest| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HttpError>(EchoResponse { msg: req.msg })
                }
            },
            Chain::new(),
        );

        let response = endpoint.handle(post_json("/echo", "{oops")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response).contains("malformed"));
        assert!(body(&response).contains("\"code\": 400"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_error_redacted_unless_debug() {
        let request = || RequestParts::new(Method::GET, Uri::from_static("/broken"));

        let endpoint = Web::new().get("/broken", broken, Chain::new());
        let response = endpoint.handle(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(&response).contains(REDACTED_MESSAGE));
        assert!(!body(&response).contains("db"));

        let endpoint = Web::builder().debug(true).build().get("/broken", broken, Chain::new());
        let response = endpoint.handle(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(&response).contains("connection refused by db"));
    }

    #[tokio::test]
    async fn test_http_error_passthrough() {
        let endpoint = Web::new().get("/users/{id}", missing, Chain::new());
        let request = RequestParts::new(Method::GET, Uri::from_static("/users/9")).path_param("id", "9");

        let response = endpoint.handle(request).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(&response), "{\n    \"code\": 404,\n    \"message\": \"no user 9\"\n}");
    }

    #[tokio::test]
    async fn test_principal_from_route_middleware() {
        let auth = from_fn(|ctx, next| {
            Box::pin(async move {
                if ctx.header("x-user").is_some() {
                    let _ = ctx.set_principal("ann".to_string());
                }
                next.run(ctx).await;
            })
        });
        let web = Web::new();
        let endpoint = web.get("/me", whoami, Chain::new().with(auth));

        let request = RequestParts::new(Method::GET, Uri::from_static("/me")).header("x-user", "1");
        let response = endpoint.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "\"ann\"");

        let request = RequestParts::new(Method::GET, Uri::from_static("/me"));
        let response = endpoint.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_pre_use_applies_to_existing_routes() {
        let web = Web::builder().request_id(false).build();
        let endpoint = web.get("/me", whoami, Chain::new());
        web.pre_use(from_fn(|ctx, next| {
            Box::pin(async move {
                let _ = ctx.set_principal("root".to_string());
                next.run(ctx).await;
            })
        }));

        let response = endpoint
            .handle(RequestParts::new(Method::GET, Uri::from_static("/me")))
            .await;
        assert_eq!(body(&response), "\"root\"");
        assert!(!response.headers().contains_key(HEADER_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let web = Web::new();
        let endpoint = web.get("/explode", explode, Chain::new());

        let response = endpoint
            .handle(RequestParts::new(Method::GET, Uri::from_static("/explode")))
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(&response).contains(REDACTED_MESSAGE));
        assert_eq!(web.pool().idle(), 1);
    }

    #[tokio::test]
    async fn test_contexts_are_reused_across_requests() {
        let web = Web::new();
        let endpoint = web.post("/echo", echo, Chain::new());
        for _ in 0..8 {
            let response = endpoint.handle(post_json("/echo", r#"{"id":"1","msg":"x"}"#)).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(web.pool().idle(), 1);
    }

    #[derive(Debug, Deserialize)]
    struct Again {
        #[allow(dead_code)]
        msg: String,
    }

    impl Validate for Again {}

    async fn rebind(ctx: Context) -> Result<(), BoxError> {
        let _: Again = ctx.bind()?;
        Ok(())
    }

    #[tokio::test]
    async fn test_handler_bind_error_is_bad_request() {
        let endpoint = Web::new().post("/rebind", rebind, Chain::new());

        let response = endpoint.handle(post_json("/rebind", "{oops")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response).contains("malformed request body"));
        assert!(!body(&response).contains(REDACTED_MESSAGE));
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Note {
        text: String,
    }

    impl Validate for Note {
        fn validate(&self) -> Result<(), bootx_core::ValidationError> {
            if self.text.is_empty() {
                return Err(bootx_core::ValidationError::field("text", "is required"));
            }
            Ok(())
        }
    }

    async fn late_bind(ctx: Context, preset: Note) -> Result<String, BoxError> {
        assert!(preset.text.is_empty());
        let note: Note = ctx.bind_and_validate()?;
        Ok(note.text)
    }

    #[tokio::test]
    async fn test_route_without_pre_bind() {
        let web = Web::new();
        let endpoint = web.post("/notes", late_bind, RouteOptions::new().pre_bind(false));

        let response = endpoint.handle(post_json("/notes", r#"{"text":"hi"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "\"hi\"");

        let response = endpoint.handle(post_json("/notes", r#"{"text":""}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response).contains("text: is required"));

        let response = endpoint.handle(post_json("/notes", "{oops")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_pre_bind_default_and_override() {
        let web = Web::builder().pre_bind(false).build();
        let unbound = web.post("/notes", late_bind, Chain::new());
        let bound = web.post(
            "/echo",
            echo,
            RouteOptions::new().pre_bind(true).with(RequestId::new()),
        );

        let response = unbound.handle(post_json("/notes", r#"{"text":"a"}"#)).await;
        assert_eq!(body(&response), "\"a\"");

        let response = bound.handle(post_json("/echo", r#"{"id":"1","msg":"b"}"#)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "{\n    \"msg\": \"b\"\n}");
    }

    #[test]
    fn test_pre_bind_off_needs_empty_payload() {
        let web = Web::new();
        let err = web
            .try_register(Method::POST, "/echo", echo, RouteOptions::new().pre_bind(false))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyPayload { .. }));
        assert!(web.routes().is_empty());
    }

    async fn avatar(ctx: Context) -> Result<u64, BoxError> {
        let options = bootx_core::UploadOptions::new("avatar")
            .max_size(4)
            .allow_extension("png");
        Ok(ctx.upload(&options).await?.size())
    }

    #[tokio::test]
    async fn test_upload_errors_keep_their_status() {
        let endpoint = Web::new().post("/avatar", avatar, Chain::new());
        let upload = |file_name: &str, content: &str| {
            let body = format!(
                "--b\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"{file_name}\"\r\n\r\n{content}\r\n--b--\r\n"
            );
            RequestParts::new(Method::POST, Uri::from_static("/avatar"))
                .header("content-type", "multipart/form-data; boundary=b")
                .body(body)
        };

        let response = endpoint.handle(upload("a.png", "png")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response), "3");

        let response = endpoint.handle(upload("a.png", "too long")).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = endpoint.handle(upload("a.exe", "mz")).await;
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_registration_errors() {
        let web = Web::new();
        assert_eq!(
            web.try_register(Method::GET, "nope", broken, Chain::new()).unwrap_err(),
            RegistrationError::InvalidPath {
                path: "nope".into()
            }
        );

        let lying = ErasedHandler::new(
            Signature::new("lying").output(ReturnKind::Error),
            Callable::Context(Arc::new(|_ctx: Context| -> HandlerFuture {
                Box::pin(async { Ok(None) })
            })),
        );
        let err = web
            .try_register(Method::GET, "/lying", lying, Chain::new())
            .unwrap_err();
        assert!(matches!(err, RegistrationError::CallableMismatch { .. }));
        assert!(web.routes().is_empty());

        web.get("/broken", broken, Chain::new());
        let routes = web.routes();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].method, Method::GET);
        assert_eq!(routes[0].path, "/broken");
        assert_eq!(routes[0].endpoint.descriptor().display_name, "tests::broken");
    }

    #[test]
    #[should_panic(expected = "at most 2 are supported")]
    fn test_register_fails_fast() {
        let sig = Signature::new("wide")
            .input(crate::descriptor::ParamKind::Context)
            .input(crate::descriptor::ParamKind::Context)
            .input(crate::descriptor::ParamKind::Context)
            .output(ReturnKind::Error);
        let handler = ErasedHandler::new(
            sig,
            Callable::Bare(Arc::new(|| -> HandlerFuture { Box::pin(async { Ok(None) }) })),
        );
        Web::new().get("/wide", handler, Chain::new());
    }
}
