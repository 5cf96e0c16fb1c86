//! # Bootx Transport
//!
//! Puts a [`Web`](bootx_framework::Web) on the network.
//!
//! The transport owns everything the core leaves out: routing, buffering
//! request bodies (with a size limit), remote addresses from connect info and
//! graceful shutdown.
//!
//! ## Features
//!
//! - `http-server` (default): axum-based HTTP server
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Application        │  (registers handlers on Web)
//! ├─────────────────────┤
//! │  bootx-framework    │  (Web, Endpoint)
//! ├─────────────────────┤
//! │  bootx-transport    │  <- This crate (router, body limit, listener)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bootx_transport::http::{HttpServer, HttpServerConfig};
//!
//! let server = HttpServer::new(&web, HttpServerConfig::default())?;
//! server.run(shutdown_token).await?;
//! ```

pub mod error;

#[cfg(feature = "http-server")]
pub mod http;

pub use error::{TransportError, TransportResult};

#[cfg(feature = "http-server")]
pub use self::http::{HttpServer, HttpServerConfig};
