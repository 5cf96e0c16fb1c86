//! HTTP transport.

mod convert;
mod server;

pub use convert::{envelope, from_response, into_parts};
pub use server::{DEFAULT_BODY_LIMIT, HttpServer, HttpServerConfig, router, serve};
