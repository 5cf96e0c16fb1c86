//! Request-time error taxonomy.
//!
//! Every failure that reaches a live request ends up as an [`Error`] stored in
//! the request context. The responder turns it into one [`ErrorEnvelope`]:
//!
//! | Variant | Status | Message |
//! |---|---|---|
//! | [`Error::Bind`] | 400 | decode failure reason |
//! | [`Error::Validation`] | 400 | constraint violations |
//! | [`Error::Http`] | carried code, 500 if not 4xx/5xx | carried message |
//! | [`Error::Handler`] | from a nested recognized error, else 500 | redacted unless debug |
//! | [`Error::Panic`] / [`Error::Internal`] | 500 | redacted unless debug |

use std::borrow::Cow;
use std::fmt;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error returned by user handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Message used in place of the real error text when debug output is off.
pub const REDACTED_MESSAGE: &str = "unexpected error";

/// An error carrying an explicit HTTP status.
///
/// This is the "recognized HTTP error" shape: handlers that want a specific
/// status return it directly or wrap it as the source of their own error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HttpError {
    pub code: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Uses the canonical reason phrase as the message.
    pub fn from_status(code: StatusCode) -> Self {
        Self::new(code, code.canonical_reason().unwrap_or("unknown status"))
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// The status the envelope carries. Codes outside 4xx/5xx render as 500.
    pub fn status(&self) -> StatusCode {
        if self.code.is_client_error() || self.code.is_server_error() {
            self.code
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Raw request data could not be decoded into the declared payload type.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("malformed request body: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("invalid request payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("request body is not valid utf-8")]
    InvalidUtf8,

    #[error("cannot merge a non-object body with path or query parameters")]
    NonObjectBody,

    #[error("malformed multipart body: {0}")]
    Multipart(String),
}

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub field: Cow<'static, str>,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

/// A decoded payload failed its declared constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// A single violation not tied to a field.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(vec![Violation::new("", message)])
    }

    pub fn field(field: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::new(vec![Violation::new(field, message)])
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Prefixes every field with `parent.`, used for nested payloads.
    pub fn nest(self, parent: &str) -> Self {
        let violations = self
            .violations
            .into_iter()
            .map(|v| {
                let field = if v.field.is_empty() {
                    Cow::Owned(parent.to_string())
                } else {
                    Cow::Owned(format!("{parent}.{}", v.field))
                };
                Violation { field, ..v }
            })
            .collect();
        Self { violations }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Errors stored in a request context.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Handler(BoxError),

    #[error("handler panicked: {0}")]
    Panic(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Normalizes an error returned by a user handler.
    ///
    /// Boxed [`Error`], [`HttpError`], [`BindError`] and [`ValidationError`]
    /// values are unwrapped so they keep their own classification; anything
    /// else becomes [`Error::Handler`].
    pub fn from_handler(err: BoxError) -> Self {
        let err = match err.downcast::<Error>() {
            Ok(err) => return *err,
            Err(err) => err,
        };
        let err = match err.downcast::<HttpError>() {
            Ok(http) => return Error::Http(*http),
            Err(err) => err,
        };
        let err = match err.downcast::<BindError>() {
            Ok(bind) => return Error::Bind(*bind),
            Err(err) => err,
        };
        match err.downcast::<ValidationError>() {
            Ok(validation) => Error::Validation(*validation),
            Err(err) => Error::Handler(err),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// The HTTP status this error renders with.
    pub fn status(&self) -> StatusCode {
        self.classify()
            .map_or(StatusCode::INTERNAL_SERVER_ERROR, |(code, _)| code)
    }

    /// Returns `true` if no recognized status is attached.
    pub fn is_unknown(&self) -> bool {
        self.classify().is_none()
    }

    /// Renders the normalized `{code, message}` body.
    pub fn envelope(&self, debug: bool) -> ErrorEnvelope {
        match self.classify() {
            Some((code, message)) => ErrorEnvelope::new(code, message),
            None => ErrorEnvelope::unknown(self, debug),
        }
    }

    fn classify(&self) -> Option<(StatusCode, String)> {
        match self {
            Error::Bind(e) => Some((StatusCode::BAD_REQUEST, e.to_string())),
            Error::Validation(e) => Some((StatusCode::BAD_REQUEST, e.to_string())),
            Error::Http(e) => Some((e.status(), e.message.clone())),
            Error::Handler(e) => recognize(&**e),
            Error::Panic(_) | Error::Internal(_) => None,
        }
    }
}

/// Status and message of the first recognized error in a `source()` chain.
fn recognize(err: &(dyn std::error::Error + 'static)) -> Option<(StatusCode, String)> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<HttpError>() {
            return Some((http.status(), http.message.clone()));
        }
        if let Some(bind) = e.downcast_ref::<BindError>() {
            return Some((StatusCode::BAD_REQUEST, bind.to_string()));
        }
        if let Some(validation) = e.downcast_ref::<ValidationError>() {
            return Some((StatusCode::BAD_REQUEST, validation.to_string()));
        }
        #[cfg(feature = "multipart")]
        if let Some(upload) = e.downcast_ref::<crate::upload::UploadError>() {
            return Some((upload.status(), upload.to_string()));
        }
        if let Some(inner) = e.downcast_ref::<Error>() {
            return inner.classify();
        }
        current = e.source();
    }
    None
}

/// Walks the `source()` chain looking for an [`HttpError`].
pub fn find_http_error<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a HttpError> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(http) = e.downcast_ref::<HttpError>() {
            return Some(http);
        }
        if let Some(Error::Http(http)) = e.downcast_ref::<Error>() {
            return Some(http);
        }
        current = e.source();
    }
    None
}

/// The normalized error body: `{"code": <int>, "message": "<string>"}`.
///
/// Field order is fixed by declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
}

impl ErrorEnvelope {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_u16(),
            message: message.into(),
        }
    }

    fn unknown(err: &Error, debug: bool) -> Self {
        let message = if debug {
            err.to_string()
        } else {
            REDACTED_MESSAGE.to_string()
        };
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Pretty JSON with a four-space indent.
    pub fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        crate::response::to_pretty_json(self)
    }
}

/// Returned by [`Context::set_principal`](crate::Context::set_principal)
/// when a principal is already present for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("principal already set for this request")]
pub struct PrincipalAlreadySet;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("lookup failed")]
    struct Wrapped {
        #[source]
        inner: HttpError,
    }

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn test_http_error_found_through_source_chain() {
        let err = Error::from_handler(Box::new(Wrapped {
            inner: HttpError::not_found("no such user"),
        }));
        assert!(!err.is_unknown());
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            err.envelope(false),
            ErrorEnvelope::new(StatusCode::NOT_FOUND, "no such user")
        );
    }

    #[test]
    fn test_boxed_http_error_is_unwrapped() {
        let err = Error::from_handler(Box::new(HttpError::forbidden("nope")));
        assert!(matches!(err, Error::Http(_)));
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_unknown_error_is_redacted_unless_debug() {
        let err = Error::from_handler(Box::new(Boom));
        assert!(err.is_unknown());
        assert_eq!(err.envelope(false).message, REDACTED_MESSAGE);
        assert_eq!(err.envelope(false).code, 500);
        assert_eq!(err.envelope(true).message, "boom");
    }

    #[derive(Debug, Error)]
    #[error("could not read request")]
    struct ReadFailed {
        #[source]
        inner: BindError,
    }

    #[test]
    fn test_boxed_bind_and_validation_errors_keep_400() {
        let err = Error::from_handler(Box::new(BindError::InvalidUtf8));
        assert!(matches!(err, Error::Bind(BindError::InvalidUtf8)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = Error::from_handler(Box::new(ValidationError::field("name", "is required")));
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(err.envelope(false).message, "name: is required");
    }

    #[test]
    fn test_bind_error_found_through_source_chain() {
        let err = Error::from_handler(Box::new(ReadFailed {
            inner: BindError::NonObjectBody,
        }));
        assert!(matches!(err, Error::Handler(_)));
        assert!(!err.is_unknown());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.envelope(false).message,
            "cannot merge a non-object body with path or query parameters"
        );
    }

    #[test]
    fn test_non_error_http_code_renders_as_500() {
        let err = Error::from(HttpError::new(StatusCode::OK, "fine"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.envelope(false),
            ErrorEnvelope::new(StatusCode::INTERNAL_SERVER_ERROR, "fine")
        );

        let err = Error::from_handler(Box::new(Wrapped {
            inner: HttpError::new(StatusCode::FOUND, "moved"),
        }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.envelope(true).code, 500);
    }

    #[test]
    fn test_envelope_pretty_json_field_order() {
        let body = ErrorEnvelope::new(StatusCode::BAD_REQUEST, "bad")
            .to_pretty_json()
            .unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "{\n    \"code\": 400,\n    \"message\": \"bad\"\n}"
        );
    }

    #[test]
    fn test_validation_error_display_and_nest() {
        let err = ValidationError::new(vec![
            Violation::new("name", "is required"),
            Violation::new("age", "must be at least 1"),
        ])
        .nest("user");
        assert_eq!(
            err.to_string(),
            "user.name: is required; user.age: must be at least 1"
        );
    }
}
