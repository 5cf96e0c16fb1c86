//! Buffered response state and the type-erased response value.

use std::any::Any;
use std::fmt;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

/// `Content-Type` used for every JSON body.
pub const MIME_APPLICATION_JSON: &str = "application/json; charset=UTF-8";
/// `Content-Type` used by [`ResponseSink::write_string`].
pub const MIME_TEXT_PLAIN: &str = "text/plain; charset=UTF-8";

const JSON_INDENT: &[u8] = b"    ";

/// Serializes `value` as pretty JSON with a four-space indent.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(128);
    let formatter = PrettyFormatter::with_indent(JSON_INDENT);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// A handler's declared response value with its concrete type erased.
pub trait ResponseValue: Any + Send + Sync {
    /// Pretty JSON, as written on the wire.
    fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>>;

    /// A JSON tree for logging.
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;

    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;
}

impl<T> ResponseValue for T
where
    T: Serialize + Send + Sync + 'static,
{
    fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        to_pretty_json(self)
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for dyn ResponseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseValue")
            .field("type", &self.type_name())
            .finish()
    }
}

/// The transport-facing response being built for one request.
///
/// Once committed, the responder leaves it untouched.
#[derive(Debug)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    committed: bool,
}

impl Default for ResponseSink {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            committed: false,
        }
    }
}

impl ResponseSink {
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Commits a body with the given status and content type.
    pub fn write(
        &mut self,
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) {
        self.status = status;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.body = body.into();
        self.committed = true;
    }

    pub fn write_string(&mut self, status: StatusCode, body: impl Into<String>) {
        self.write(status, MIME_TEXT_PLAIN, body.into());
    }

    pub fn write_json<T: Serialize + ?Sized>(
        &mut self,
        status: StatusCode,
        value: &T,
    ) -> serde_json::Result<()> {
        let body = to_pretty_json(value)?;
        self.write(status, MIME_APPLICATION_JSON, body);
        Ok(())
    }

    /// Commits an empty body.
    pub fn no_content(&mut self, status: StatusCode) {
        self.status = status;
        self.body = Bytes::new();
        self.committed = true;
    }

    /// Converts into a transport response, leaving an empty sink behind.
    pub fn take(&mut self) -> http::Response<Bytes> {
        let sink = std::mem::take(self);
        let mut response = http::Response::new(sink.body);
        *response.status_mut() = sink.status;
        *response.headers_mut() = sink.headers;
        response
    }
}
