//! # Bootx Core
//!
//! Leaf types shared by every bootx crate.
//!
//! - **Request / response**: the buffered [`RequestParts`] handed over by the
//!   transport and the [`ResponseSink`] written back to it.
//! - **Context**: the per-request [`Context`] with its payload, response,
//!   error, status and principal slots, recycled through a [`ContextPool`].
//! - **Errors**: the request-time [`Error`] taxonomy and the [`ErrorEnvelope`]
//!   every non-2xx response carries.
//! - **Binding and validation**: the pluggable [`Binder`] and [`Validator`]
//!   collaborators and the [`Validate`] trait payload types implement.
//! - **Uploads** (`multipart` feature): [`Context::upload`] reads one file
//!   field from a `multipart/form-data` body.
//!
//! ## Request flow
//!
//! ```text
//! transport ──▶ ContextPool::acquire ──▶ middleware ──▶ bind ──▶ handler
//!                     ▲                                             │
//!                     └──────── PooledContext drop ◀── responder ◀──┘
//! ```

extern crate self as bootx_core;

pub mod bind;
pub mod context;
pub mod error;
pub mod pool;
pub mod request;
pub mod response;
#[cfg(feature = "multipart")]
pub mod upload;
pub mod validate;

pub use bind::{Binder, DecodedPayload, DefaultBinder, bind_value};
pub use context::{Context, ContextEnv};
pub use error::{
    BindError, BoxError, Error, ErrorEnvelope, HttpError, PrincipalAlreadySet, REDACTED_MESSAGE,
    ValidationError, Violation, find_http_error,
};
pub use pool::{ContextPool, DEFAULT_POOL_CAPACITY, PooledContext};
pub use request::{HEADER_FUNC_NAME, HEADER_REQUEST_ID, RequestParts};
pub use response::{MIME_APPLICATION_JSON, MIME_TEXT_PLAIN, ResponseSink, ResponseValue};
#[cfg(feature = "multipart")]
pub use upload::{SIZE_GB, SIZE_KB, SIZE_MB, UploadError, UploadOptions, UploadedFile};
pub use validate::{DefaultValidator, Payload, Validate, Validator, Violations};

#[cfg(feature = "derive")]
pub use bootx_macros::Validate;

pub use bytes::Bytes;
pub use http::{self, HeaderMap, Method, StatusCode, Uri};
