//! # Bootx
//!
//! Turn plain async functions into HTTP endpoints.
//!
//! ## Overview
//!
//! A handler is an ordinary async function in one of four shapes:
//!
//! | Shape | Example |
//! |---|---|
//! | context only | `async fn f(ctx: Context) -> Result<(), E>` |
//! | output only | `async fn f() -> Result<Reply, E>` |
//! | context and input | `async fn f(ctx: Context, req: Req) -> Result<Reply, E>` |
//! | input only | `async fn f(req: Req) -> Result<Reply, E>` |
//!
//! Registration inspects the shape once. Each request then flows through
//! the same pipeline:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────────┐   ┌────────┐   ┌───────────┐
//! │ Transport│──▶│ pre-use     │──▶│ route chain │──▶│  bind  │──▶│  invoke   │
//! │ (axum)   │   │ middleware  │   │ middleware  │   │+validate│  │  handler  │
//! └──────────┘   └─────────────┘   └─────────────┘   └────────┘   └───────────┘
//!       ▲                                                               │
//!       └───────────── responder (JSON reply or {code, message}) ◀──────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bootx::prelude::*;
//!
//! #[derive(Deserialize, Validate)]
//! struct Greet {
//!     #[validate(required)]
//!     name: String,
//! }
//!
//! #[derive(Serialize)]
//! struct Greeting {
//!     msg: String,
//! }
//!
//! async fn greet(req: Greet) -> Result<Greeting, HttpError> {
//!     Ok(Greeting { msg: format!("hello {}", req.name) })
//! }
//!
//! struct App;
//!
//! #[async_trait]
//! impl Application for App {
//!     fn name(&self) -> &str { "App" }
//!     fn version(&self) -> &str { "1.0.0" }
//!
//!     async fn bootstrap(&self, web: &Web) -> Result<(), BoxError> {
//!         web.post("/greet", greet, Chain::new());
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     BootxRuntime::new()?.run(App).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `derive` *(default)*: `#[derive(Validate)]`
//! - `jwt` *(default)*: JWT middleware
//! - `multipart` *(default)*: [`Context::upload`](bootx_core::Context::upload)
//!   and `multipart/form-data` binding
//! - `toml-config` *(default)* / `yaml-config`: configuration file formats
//! - `json-log`: JSON log output

pub use bootx_core as core;
pub use bootx_framework as framework;
pub use bootx_runtime as runtime;
pub use bootx_transport as transport;

/// Commonly used types for building bootx applications.
///
/// ```rust,ignore
/// use bootx::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use bootx_runtime::{Application, BootxConfig, BootxRuntime, WebConfig};

    // Request pipeline
    pub use bootx_core::{
        BoxError, Context, Error, HttpError, Method, RequestParts, StatusCode, Validate,
        ValidationError,
    };
    pub use bootx_framework::{
        Chain, Endpoint, Middleware, Next, RouteOptions, Skipper, Web, from_fn,
    };
    #[cfg(feature = "multipart")]
    pub use bootx_core::{UploadOptions, UploadedFile};

    // Built-in middleware
    pub use bootx_framework::middleware::{BodyDump, Dump, DumpOptions, RequestId, ValidatePayload};
    #[cfg(feature = "jwt")]
    pub use bootx_framework::middleware::{Jwt, JwtClaims, JwtKey, TokenLookup};

    // Helpers for application and payload types
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
}
