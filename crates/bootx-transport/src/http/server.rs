//! HTTP server mounting a [`Web`]'s route table.

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::Router;
use axum::extract::{RawPathParams, Request};
use axum::response::Response;
use axum::routing::{MethodFilter, MethodRouter, on};
use http::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use bootx_framework::{Endpoint, Web};

use super::convert::{envelope, from_response, into_parts};
use crate::error::{TransportError, TransportResult};

/// Default request body limit: 5 MiB.
pub const DEFAULT_BODY_LIMIT: usize = 5 * 1024 * 1024;

/// Listener address and request limits.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum buffered request body, in bytes.
    pub body_limit: usize,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl HttpServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serves a [`Web`] over HTTP/1.1.
pub struct HttpServer {
    config: HttpServerConfig,
    router: Router,
}

impl HttpServer {
    /// Mounts every route currently registered on `web`.
    pub fn new(web: &Web, config: HttpServerConfig) -> TransportResult<Self> {
        let router = router(web, config.body_limit)?;
        Ok(Self { config, router })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Binds the configured address and serves until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> TransportResult<()> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        serve(listener, self.router, shutdown).await
    }
}

/// Serves `router` on an already bound listener until `shutdown` is
/// cancelled, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> TransportResult<()> {
    let local = listener.local_addr()?;
    info!(addr = %local, "HTTP server listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    info!(addr = %local, "HTTP server stopped");
    Ok(())
}

/// Builds an axum router from the route table.
///
/// Echo-style `:name` segments are accepted and rewritten to `{name}`.
pub fn router(web: &Web, body_limit: usize) -> TransportResult<Router> {
    let mut seen = HashSet::new();
    let mut paths: Vec<(String, MethodRouter)> = Vec::new();

    for route in web.routes() {
        let path = axum_path(&route.path);
        if !seen.insert((route.method.clone(), path.clone())) {
            return Err(TransportError::DuplicateRoute {
                method: route.method,
                path,
            });
        }
        let filter = MethodFilter::try_from(route.method.clone())
            .map_err(|_| TransportError::UnsupportedMethod(route.method.clone()))?;
        let endpoint = route.endpoint;
        let handler = move |params: RawPathParams, request: Request| {
            let endpoint = endpoint.clone();
            async move { dispatch(endpoint, params, request, body_limit).await }
        };

        debug!(method = %route.method, path = %path, "mounting route");
        match paths.iter_mut().find(|(p, _)| *p == path) {
            Some((_, methods)) => {
                let current = std::mem::replace(methods, MethodRouter::new());
                *methods = current.on(filter, handler);
            }
            None => paths.push((path, on(filter, handler))),
        }
    }

    let router = paths
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| {
            router.route(&path, methods)
        })
        .fallback(|| async { envelope(StatusCode::NOT_FOUND, "not found") })
        .method_not_allowed_fallback(|| async {
            envelope(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        });
    Ok(router)
}

async fn dispatch(
    endpoint: Endpoint,
    params: RawPathParams,
    request: Request,
    body_limit: usize,
) -> Response {
    match into_parts(request, &params, body_limit).await {
        Ok(parts) => from_response(endpoint.handle(parts).await),
        Err(rejection) => rejection,
    }
}

/// `/users/:id` to `/users/{id}`; `*` to a catch-all.
fn axum_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                format!("{{{name}}}")
            } else if segment == "*" {
                "{*wildcard}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use serde::Deserialize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tower::ServiceExt;

    use super::*;
    use bootx_core::{Context, HttpError, Validate};
    use bootx_framework::Chain;

    #[derive(Debug, Deserialize)]
    struct Greet {
        id: String,
        name: String,
    }

    impl Validate for Greet {}

    async fn greet(req: Greet) -> Result<String, HttpError> {
        Ok(format!("{} says hi to {}", req.name, req.id))
    }

    async fn ping(ctx: Context) -> Result<(), HttpError> {
        let remote = ctx.remote_addr().map(|a| a.ip().to_string()).unwrap_or_default();
        ctx.string(StatusCode::OK, format!("pong {remote}"));
        Ok(())
    }

    fn web() -> Web {
        let web = Web::new();
        web.post("/greet/:id", greet, Chain::new());
        web.get("/ping", ping, Chain::new());
        web
    }

    async fn call(router: Router, request: http::Request<Body>) -> (StatusCode, String) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn post(uri: &str, body: &'static str) -> http::Request<Body> {
        http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_axum_path() {
        assert_eq!(axum_path("/users/:id/posts/:post"), "/users/{id}/posts/{post}");
        assert_eq!(axum_path("/static/*"), "/static/{*wildcard}");
        assert_eq!(axum_path("/plain"), "/plain");
    }

    #[tokio::test]
    async fn test_path_params_reach_the_binder() {
        let router = router(&web(), DEFAULT_BODY_LIMIT).unwrap();
        let (status, body) = call(router, post("/greet/42", r#"{"name":"ann"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "\"ann says hi to 42\"");
    }

    #[tokio::test]
    async fn test_body_limit() {
        let router = router(&web(), 8).unwrap();
        let (status, body) = call(router, post("/greet/42", r#"{"name":"a long name"}"#)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body.contains("\"code\": 413"));
    }

    #[tokio::test]
    async fn test_body_read_failure_is_bad_request() {
        let chunks = futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"{\"name\":")),
            Err(std::io::Error::other("connection reset")),
        ]);
        let request = http::Request::post("/greet/42")
            .header("content-type", "application/json")
            .body(Body::from_stream(chunks))
            .unwrap();

        let (status, body) = call(router(&web(), DEFAULT_BODY_LIMIT).unwrap(), request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("failed to read request body"));
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let router = router(&web(), DEFAULT_BODY_LIMIT).unwrap();
        let request = http::Request::get("/nope").body(Body::empty()).unwrap();
        let (status, body) = call(router.clone(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("\"code\": 404"));

        let request = http::Request::delete("/ping").body(Body::empty()).unwrap();
        let (status, _) = call(router, request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_duplicate_route_rejected() {
        let web = web();
        web.get("/ping", ping, Chain::new());
        assert!(matches!(
            router(&web, DEFAULT_BODY_LIMIT),
            Err(TransportError::DuplicateRoute { .. })
        ));
    }

    #[tokio::test]
    async fn test_serve_until_cancelled() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            router(&web(), DEFAULT_BODY_LIMIT).unwrap(),
            shutdown.clone(),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).await.unwrap();
        assert!(raw.starts_with("HTTP/1.1 200 OK"));
        assert!(raw.ends_with("pong 127.0.0.1"));

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
