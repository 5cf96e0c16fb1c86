//! The per-request [`Context`].
//!
//! A `Context` is a cheap handle onto pooled state. Every slot lives behind
//! one `parking_lot::Mutex`; accessors lock, copy or move data out, and unlock
//! before returning, so no guard is ever held across an `.await`. The lock is
//! not reentrant: the closures passed to the `with_*` accessors must not call
//! back into the context.
//!
//! Slots:
//!
//! - the inbound [`RequestParts`] and the outbound [`ResponseSink`];
//! - the handler display name;
//! - the principal, set at most once by auth middleware;
//! - the decoded payload and the JSON tree it was decoded from;
//! - the response value returned by the handler;
//! - the error slot;
//! - the status used for success responses (default 200).

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::bind::{Binder, DefaultBinder, bind_value};
use crate::error::{BindError, Error, PrincipalAlreadySet};
use crate::request::{HEADER_FUNC_NAME, RequestParts};
use crate::response::{ResponseSink, ResponseValue};
#[cfg(feature = "multipart")]
use crate::upload::{UploadError, UploadOptions, UploadedFile, read_upload};
use crate::validate::{DefaultValidator, Payload, Validate, Validator};

/// Collaborators shared by every context of one application.
pub struct ContextEnv {
    pub binder: Arc<dyn Binder>,
    pub validator: Arc<dyn Validator>,
    /// Include real error text in 500 responses.
    pub debug: bool,
}

impl Default for ContextEnv {
    fn default() -> Self {
        Self {
            binder: Arc::new(DefaultBinder),
            validator: Arc::new(DefaultValidator),
            debug: false,
        }
    }
}

impl std::fmt::Debug for ContextEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEnv")
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// ContextState: the mutable slots
// =============================================================================

pub(crate) struct ContextState {
    pub(crate) request: RequestParts,
    pub(crate) response: ResponseSink,
    pub(crate) func_name: String,
    pub(crate) principal: Option<Arc<dyn Any + Send + Sync>>,
    pub(crate) payload: Option<Box<dyn Payload>>,
    pub(crate) payload_raw: Option<Value>,
    pub(crate) reply: Option<Box<dyn ResponseValue>>,
    pub(crate) error: Option<Error>,
    pub(crate) status: StatusCode,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            request: RequestParts::default(),
            response: ResponseSink::default(),
            func_name: String::new(),
            principal: None,
            payload: None,
            payload_raw: None,
            reply: None,
            error: None,
            status: StatusCode::OK,
        }
    }
}

impl ContextState {
    /// Clears every slot. The name buffer keeps its allocation.
    pub(crate) fn reset(&mut self) {
        self.request = RequestParts::default();
        self.response = ResponseSink::default();
        self.func_name.clear();
        self.principal = None;
        self.payload = None;
        self.payload_raw = None;
        self.reply = None;
        self.error = None;
        self.status = StatusCode::OK;
    }
}

pub(crate) struct ContextInner {
    pub(crate) env: Arc<ContextEnv>,
    pub(crate) state: Mutex<ContextState>,
}

impl ContextInner {
    pub(crate) fn new(env: Arc<ContextEnv>) -> Self {
        Self {
            env,
            state: Mutex::new(ContextState::default()),
        }
    }
}

// =============================================================================
// Context
// =============================================================================

/// Handle onto the state of one in-flight request.
///
/// Cloning is cheap. Clones must not outlive the request: a context that is
/// still referenced when the request finishes is dropped instead of being
/// returned to the pool.
#[derive(Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Context {
    /// A standalone context outside any pool.
    pub fn new(env: Arc<ContextEnv>, request: RequestParts) -> Self {
        let inner = ContextInner::new(env);
        inner.state.lock().request = request;
        Self {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Self { inner }
    }

    pub fn env(&self) -> &Arc<ContextEnv> {
        &self.inner.env
    }

    pub fn binder(&self) -> &dyn Binder {
        &*self.inner.env.binder
    }

    pub fn validator(&self) -> &dyn Validator {
        &*self.inner.env.validator
    }

    pub fn debug(&self) -> bool {
        self.inner.env.debug
    }

    // ─── Request ─────────────────────────────────────────────────────────────

    /// Runs `f` with the inbound request.
    ///
    /// # Deadlocks
    ///
    /// The context lock is held while `f` runs. `f` must not call any other
    /// method of this context or of one of its clones; copy what it needs out
    /// and make the call after `with_*` returns.
    pub fn with_request<R>(&self, f: impl FnOnce(&RequestParts) -> R) -> R {
        f(&self.inner.state.lock().request)
    }

    pub fn method(&self) -> Method {
        self.with_request(|r| r.method.clone())
    }

    pub fn uri(&self) -> Uri {
        self.with_request(|r| r.uri.clone())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.with_request(|r| r.remote_addr)
    }

    pub fn request_headers(&self) -> HeaderMap {
        self.with_request(|r| r.headers.clone())
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.with_request(|r| r.header_str(name).map(str::to_owned))
    }

    pub fn param(&self, name: &str) -> Option<String> {
        self.with_request(|r| r.param(name).map(str::to_owned))
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.with_request(|r| r.query_param(name))
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.with_request(|r| r.cookie(name).map(str::to_owned))
    }

    /// The buffered request body.
    pub fn body(&self) -> Bytes {
        self.with_request(|r| r.body.clone())
    }

    /// Replaces a request header so that inner layers see the new value.
    pub fn set_request_header(&self, name: HeaderName, value: HeaderValue) {
        self.inner.state.lock().request.headers.insert(name, value);
    }

    /// The correlation id, or an empty string when none was assigned.
    pub fn id(&self) -> String {
        self.with_request(|r| r.request_id().unwrap_or_default().to_owned())
    }

    pub fn func_name(&self) -> String {
        self.inner.state.lock().func_name.clone()
    }

    /// Records the routed handler name and mirrors it into `X-Func-Name`.
    pub fn set_func_name(&self, name: &str) {
        let mut state = self.inner.state.lock();
        state.func_name.clear();
        state.func_name.push_str(name);
        if let Ok(value) = HeaderValue::from_str(name) {
            state
                .request
                .headers
                .insert(HeaderName::from_static(HEADER_FUNC_NAME), value);
        }
    }

    /// Re-binds the raw request into another type.
    pub fn bind<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let binder = self.inner.env.binder.clone();
        self.with_request(|r| bind_value::<T>(&*binder, r).map(|(value, _)| value))
    }

    /// [`bind`](Self::bind) followed by the configured [`Validator`].
    ///
    /// Both failures classify as 400 when returned from a handler.
    pub fn bind_and_validate<T>(&self) -> Result<T, Error>
    where
        T: DeserializeOwned + Validate + Send + Sync + 'static,
    {
        let value: T = self.bind()?;
        self.validator().validate(&value)?;
        Ok(value)
    }

    /// Reads one uploaded file from a `multipart/form-data` body.
    #[cfg(feature = "multipart")]
    pub async fn upload(&self, options: &UploadOptions) -> Result<UploadedFile, UploadError> {
        let (body, content_type) = self.with_request(|r| {
            (
                r.body.clone(),
                r.header_str("content-type").map(str::to_owned),
            )
        });
        read_upload(body, content_type.as_deref(), options).await
    }

    // ─── Response ────────────────────────────────────────────────────────────

    /// Runs `f` with the outbound response.
    ///
    /// # Deadlocks
    ///
    /// The context lock is held while `f` runs. `f` must not call any other
    /// method of this context or of one of its clones; copy what it needs out
    /// and make the call after `with_*` returns.
    pub fn with_response<R>(&self, f: impl FnOnce(&mut ResponseSink) -> R) -> R {
        f(&mut self.inner.state.lock().response)
    }

    pub fn is_committed(&self) -> bool {
        self.with_response(|r| r.is_committed())
    }

    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        self.with_response(|r| {
            r.headers_mut().insert(name, value);
        });
    }

    /// Commits a plain text body.
    pub fn string(&self, status: StatusCode, body: impl Into<String>) {
        self.with_response(|r| r.write_string(status, body));
    }

    /// Commits a pretty JSON body.
    pub fn json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
    ) -> serde_json::Result<()> {
        self.with_response(|r| r.write_json(status, value))
    }

    pub fn no_content(&self, status: StatusCode) {
        self.with_response(|r| r.no_content(status));
    }

    /// Moves the response out, leaving an empty one behind.
    pub fn take_response(&self) -> http::Response<Bytes> {
        self.with_response(ResponseSink::take)
    }

    // ─── Status ──────────────────────────────────────────────────────────────

    pub fn status(&self) -> StatusCode {
        self.inner.state.lock().status
    }

    pub fn set_status(&self, status: StatusCode) {
        self.inner.state.lock().status = status;
    }

    // ─── Principal ───────────────────────────────────────────────────────────

    /// Stores the authenticated principal. Only the first call succeeds.
    pub fn set_principal<T: Send + Sync + 'static>(
        &self,
        value: T,
    ) -> Result<(), PrincipalAlreadySet> {
        self.set_principal_arc(Arc::new(value))
    }

    pub fn set_principal_arc<T: Send + Sync + 'static>(
        &self,
        value: Arc<T>,
    ) -> Result<(), PrincipalAlreadySet> {
        let mut state = self.inner.state.lock();
        if state.principal.is_some() {
            return Err(PrincipalAlreadySet);
        }
        state.principal = Some(value);
        Ok(())
    }

    /// The principal, if one of type `T` was stored.
    pub fn principal<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let principal = self.inner.state.lock().principal.clone()?;
        principal.downcast::<T>().ok()
    }

    pub fn has_principal(&self) -> bool {
        self.inner.state.lock().principal.is_some()
    }

    // ─── Payload ─────────────────────────────────────────────────────────────

    pub fn set_payload(&self, payload: Box<dyn Payload>, raw: Value) {
        let mut state = self.inner.state.lock();
        state.payload = Some(payload);
        state.payload_raw = Some(raw);
    }

    /// Moves the decoded payload out. The raw tree stays for logging.
    pub fn take_payload(&self) -> Option<Box<dyn Payload>> {
        self.inner.state.lock().payload.take()
    }

    pub fn has_payload(&self) -> bool {
        self.inner.state.lock().payload.is_some()
    }

    /// Runs `f` with the decoded payload, if it has not been consumed yet.
    ///
    /// # Deadlocks
    ///
    /// The context lock is held while `f` runs. `f` must not call any other
    /// method of this context or of one of its clones; copy what it needs out
    /// and make the call after `with_*` returns.
    pub fn with_payload<R>(&self, f: impl FnOnce(Option<&dyn Payload>) -> R) -> R {
        f(self.inner.state.lock().payload.as_deref())
    }

    /// The JSON tree the payload was decoded from.
    pub fn payload_json(&self) -> Option<Value> {
        self.inner.state.lock().payload_raw.clone()
    }

    // ─── Response value ──────────────────────────────────────────────────────

    pub fn set_reply(&self, reply: Box<dyn ResponseValue>) {
        self.inner.state.lock().reply = Some(reply);
    }

    pub fn take_reply(&self) -> Option<Box<dyn ResponseValue>> {
        self.inner.state.lock().reply.take()
    }

    pub fn has_reply(&self) -> bool {
        self.inner.state.lock().reply.is_some()
    }

    /// Runs `f` with the handler's response value.
    ///
    /// # Deadlocks
    ///
    /// The context lock is held while `f` runs. `f` must not call any other
    /// method of this context or of one of its clones; copy what it needs out
    /// and make the call after `with_*` returns.
    pub fn with_reply<R>(&self, f: impl FnOnce(Option<&dyn ResponseValue>) -> R) -> R {
        f(self.inner.state.lock().reply.as_deref())
    }

    /// The response value as a JSON tree, for logging.
    pub fn response_json(&self) -> Option<Value> {
        self.with_reply(|reply| reply.and_then(|r| r.to_json().ok()))
    }

    // ─── Error ───────────────────────────────────────────────────────────────

    pub fn set_error(&self, err: impl Into<Error>) {
        self.inner.state.lock().error = Some(err.into());
    }

    pub fn take_error(&self) -> Option<Error> {
        self.inner.state.lock().error.take()
    }

    pub fn clear_error(&self) {
        self.inner.state.lock().error = None;
    }

    pub fn has_error(&self) -> bool {
        self.inner.state.lock().error.is_some()
    }

    /// Runs `f` with the stored error.
    ///
    /// # Deadlocks
    ///
    /// The context lock is held while `f` runs. `f` must not call any other
    /// method of this context or of one of its clones; copy what it needs out
    /// and make the call after `with_*` returns.
    pub fn with_error<R>(&self, f: impl FnOnce(Option<&Error>) -> R) -> R {
        f(self.inner.state.lock().error.as_ref())
    }

    pub fn error_message(&self) -> Option<String> {
        self.with_error(|e| e.map(ToString::to_string))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Context")
            .field("method", &state.request.method)
            .field("uri", &state.request.uri)
            .field("func_name", &state.func_name)
            .field("status", &state.status)
            .field("error", &state.error)
            .finish_non_exhaustive()
    }
}
