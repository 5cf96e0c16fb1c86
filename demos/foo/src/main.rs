//! Foo
//!
//! A small bootx application showing each handler shape:
//!
//! | Route | Handler shape |
//! |---|---|
//! | `GET /` | context only, writes the response itself |
//! | `GET /foo/bar` | no input, returns a reply |
//! | `POST /foo/bar` | context and bound input, re-binds the body into a richer type |
//! | `GET /me` | context only, behind the JWT middleware |
//!
//! # Usage
//!
//! ```bash
//! cargo run --package foo -- --port 8080 --debug
//! curl -X POST localhost:8080/foo/bar -H 'content-type: application/json' \
//!      -d '{"id":"1","msg":"hi","name":"ann"}'
//! ```

use std::path::PathBuf;

use anyhow::Result;
use bootx::prelude::*;
use bootx::runtime::{ConfigLoader, validate_config};
use clap::Parser;
use tracing::{info, warn};

// ============================================================================
// Command Line
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "foo", version, about = "bootx demo application")]
struct Args {
    /// Configuration file; bootx.toml in the working directory when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the configuration
    #[arg(short, long)]
    port: Option<u16>,

    /// Expose real error text in 500 responses
    #[arg(long)]
    debug: bool,

    /// HS256 secret accepted by `GET /me`
    #[arg(long, env = "FOO_JWT_SECRET", default_value = "foo-secret")]
    jwt_secret: String,
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Serialize)]
struct FooResponse {
    msg: String,
}

impl FooResponse {
    fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

#[derive(Debug, Deserialize, Validate)]
struct TestBindRequest {
    #[validate(required)]
    id: String,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TestBindAgainRequest {
    id: String,
    msg: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

async fn hello(ctx: Context) -> Result<(), HttpError> {
    ctx.string(StatusCode::OK, "hello word");
    Ok(())
}

async fn foo_bar() -> Result<FooResponse, HttpError> {
    Ok(FooResponse::new("hello word"))
}

async fn foo_bar_bind(ctx: Context, req: TestBindRequest) -> Result<FooResponse, HttpError> {
    info!(id = %req.id, msg = %req.msg, "foo bar");
    match ctx.bind::<TestBindAgainRequest>() {
        Ok(again) => {
            info!(id = %again.id, msg = %again.msg, name = %again.name, "bound again");
            Ok(FooResponse::new("hello word"))
        }
        Err(err) => {
            warn!(error = %err, "bind again failed");
            Ok(FooResponse::new("bind again err"))
        }
    }
}

async fn me(ctx: Context) -> Result<Claims, HttpError> {
    ctx.principal::<Claims>()
        .map(|claims| (*claims).clone())
        .ok_or_else(|| HttpError::unauthorized("not signed in"))
}

// ============================================================================
// Application
// ============================================================================

struct FooApp {
    jwt_secret: String,
}

#[async_trait]
impl Application for FooApp {
    fn name(&self) -> &str {
        "Foo"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn bootstrap(&self, web: &Web) -> Result<(), BoxError> {
        web.pre_use(BodyDump::new(
            DumpOptions::TEXT_PLAIN | DumpOptions::FORM | DumpOptions::JSON,
        ));

        web.get("/", hello, Chain::new());
        web.get("/foo/bar", foo_bar, Chain::new());
        web.post("/foo/bar", foo_bar_bind, Chain::new());
        web.get(
            "/me",
            me,
            Chain::new().with(Jwt::<Claims>::new(JwtKey::secret(&self.jwt_secret))),
        );
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), BoxError> {
        info!("foo says goodbye");
        Ok(())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new().with_current_dir();
    if let Some(path) = &args.config {
        loader = loader.file(path);
    }
    let mut config = loader.load()?;
    if let Some(port) = args.port {
        config.web.port = port;
    }
    config.web.debug |= args.debug;
    validate_config(&config)?;

    let runtime = BootxRuntime::from_config(config);
    runtime
        .run(FooApp {
            jwt_secret: args.jwt_secret,
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use bootx::core::{Bytes, Uri};
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};

    use super::*;

    const SECRET: &str = "test-secret";

    async fn web() -> Web {
        let web = Web::new();
        let app = FooApp {
            jwt_secret: SECRET.to_string(),
        };
        app.bootstrap(&web).await.unwrap();
        web
    }

    async fn call(web: &Web, request: RequestParts) -> (StatusCode, Bytes) {
        let endpoint = web
            .routes()
            .into_iter()
            .find(|r| r.method == request.method && r.path == request.path())
            .unwrap()
            .endpoint;
        let response = endpoint.handle(request).await;
        (response.status(), response.into_body())
    }

    fn request(method: Method, path: &'static str) -> RequestParts {
        RequestParts::new(method, Uri::from_static(path))
    }

    fn json_body(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_hello_writes_its_own_response() {
        let (status, body) = call(&web().await, request(Method::GET, "/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"hello word");
    }

    #[tokio::test]
    async fn test_foo_bar_reply() {
        let (status, body) = call(&web().await, request(Method::GET, "/foo/bar")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["msg"], "hello word");
    }

    #[tokio::test]
    async fn test_bind_again() {
        let web = web().await;

        let partial = request(Method::POST, "/foo/bar")
            .json(&json!({"id": "1", "msg": "hi"}))
            .unwrap();
        let (status, body) = call(&web, partial).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["msg"], "bind again err");

        let full = request(Method::POST, "/foo/bar")
            .json(&json!({"id": "1", "msg": "hi", "name": "ann"}))
            .unwrap();
        let (_, body) = call(&web, full).await;
        assert_eq!(json_body(&body)["msg"], "hello word");
    }

    #[tokio::test]
    async fn test_missing_id_is_rejected() {
        let req = request(Method::POST, "/foo/bar")
            .json(&json!({"msg": "hi"}))
            .unwrap();
        let (status, body) = call(&web().await, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["code"], 400);
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let web = web().await;

        let (status, _) = call(&web, request(Method::GET, "/me")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let token = jsonwebtoken::encode(
            &Header::default(),
            &json!({"sub": "42", "name": "ann"}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        let signed_in = request(Method::GET, "/me").header("authorization", &format!("Bearer {token}"));
        let (status, body) = call(&web, signed_in).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body)["sub"], "42");
        assert_eq!(json_body(&body)["name"], "ann");
    }

    #[test]
    fn test_args() {
        let args = Args::parse_from(["foo", "--port", "9000", "--debug"]);
        assert_eq!(args.port, Some(9000));
        assert!(args.debug);
        assert!(args.config.is_none());
    }
}
