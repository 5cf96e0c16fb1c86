//! # Bootx Framework
//!
//! Turns ordinary async functions into HTTP endpoints.
//!
//! This layer provides:
//! - Signature introspection for the four supported handler shapes
//! - The bind stage (decode + validate) and the invocation step
//! - Middleware chains with a fixed, first-registered-outermost order
//! - Built-in middleware: request ids, dumps, payload validation, JWT
//! - The [`Web`] application context and its tower-compatible [`Endpoint`]s
//!
//! Routing and the network listener are left to the transport layer.

pub mod binding;
pub mod descriptor;
pub mod error;
pub mod handler;
pub mod invoke;
pub mod middleware;
pub mod responder;
pub mod web;

pub use descriptor::{
    DecodeFn, EmptyFn, HandlerDescriptor, HandlerShape, ParamKind, PayloadType, ReturnKind,
    Signature, TypeToken, describe,
};
pub use error::{InvalidTokenLookup, RegistrationError, RegistrationResult};
pub use handler::{Callable, ErasedHandler, Handler, HandlerFuture, HandlerResult, RequestPayload};
pub use middleware::{Chain, Middleware, Next, Skipper, Terminal, from_fn};
pub use web::{Endpoint, Route, RouteOptions, Web, WebBuilder};

pub use bootx_core::{
    BoxError, Context, Error, ErrorEnvelope, HttpError, RequestParts, Validate, ValidationError,
};
