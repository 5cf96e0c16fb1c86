//! Request binding: raw request data to a JSON tree to a typed payload.
//!
//! The [`Binder`] only produces a [`serde_json::Value`]; turning that tree
//! into the declared payload type is a plain `serde_json::from_value`, so a
//! custom binder can support new content types without knowing the payload.

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::BindError;
use crate::request::RequestParts;
use crate::validate::Payload;

const MIME_JSON: &str = "application/json";
const MIME_FORM: &str = "application/x-www-form-urlencoded";

/// Pluggable decoder of body, query and path parameters.
pub trait Binder: Send + Sync + 'static {
    fn decode(&self, req: &RequestParts) -> Result<Value, BindError>;
}

/// The binder used when none is configured.
///
/// Sources are merged into one object, later ones overriding earlier ones:
///
/// 1. path parameters, as strings;
/// 2. query parameters, for `GET`, `DELETE` and `HEAD` only;
/// 3. the body, decoded by content type (`application/json`,
///    `application/x-www-form-urlencoded` or, with the `multipart` feature,
///    the text fields of `multipart/form-data`).
///
/// A JSON body that is not an object is accepted as-is when no parameter
/// was collected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBinder;

impl DefaultBinder {
    fn collect_params(req: &RequestParts) -> Map<String, Value> {
        let mut params = Map::new();
        for (name, value) in &req.path_params {
            params.insert(name.clone(), Value::String(value.clone()));
        }
        let binds_query = matches!(req.method, Method::GET | Method::DELETE | Method::HEAD);
        if binds_query && let Some(query) = req.query() {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                params.insert(name.into_owned(), Value::String(value.into_owned()));
            }
        }
        params
    }

    fn decode_body(req: &RequestParts) -> Result<Option<Value>, BindError> {
        if req.body.is_empty() {
            return Ok(None);
        }
        match req.content_type().as_deref() {
            Some(MIME_JSON) => serde_json::from_slice(&req.body)
                .map(Some)
                .map_err(BindError::Syntax),
            Some(MIME_FORM) => {
                std::str::from_utf8(&req.body).map_err(|_| BindError::InvalidUtf8)?;
                let form = url::form_urlencoded::parse(&req.body)
                    .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                    .collect::<Map<_, _>>();
                Ok(Some(Value::Object(form)))
            }
            #[cfg(feature = "multipart")]
            Some(crate::upload::MIME_MULTIPART) => {
                let content_type = req.header_str("content-type").unwrap_or_default();
                crate::upload::form_fields(req.body.clone(), content_type)
                    .map(|form| Some(Value::Object(form)))
            }
            Some(other) => Err(BindError::UnsupportedMediaType(other.to_string())),
            None => Err(BindError::UnsupportedMediaType("none".to_string())),
        }
    }
}

impl Binder for DefaultBinder {
    fn decode(&self, req: &RequestParts) -> Result<Value, BindError> {
        let mut params = Self::collect_params(req);
        match Self::decode_body(req)? {
            None => Ok(Value::Object(params)),
            Some(Value::Object(body)) => {
                params.extend(body);
                Ok(Value::Object(params))
            }
            Some(other) if params.is_empty() => Ok(other),
            Some(_) => Err(BindError::NonObjectBody),
        }
    }
}

/// Decodes `req` into `T` through `binder`, returning the raw tree as well.
pub fn bind_value<T: DeserializeOwned>(
    binder: &dyn Binder,
    req: &RequestParts,
) -> Result<(T, Value), BindError> {
    let raw = binder.decode(req)?;
    let value = T::deserialize(&raw).map_err(BindError::Decode)?;
    Ok((value, raw))
}

/// A payload decoded for a route, with the JSON tree it came from.
#[derive(Debug)]
pub struct DecodedPayload {
    pub value: Box<dyn Payload>,
    pub raw: Value,
}

impl DecodedPayload {
    pub fn decode<T>(binder: &dyn Binder, req: &RequestParts) -> Result<Self, BindError>
    where
        T: Payload + DeserializeOwned,
    {
        let (value, raw) = bind_value::<T>(binder, req)?;
        Ok(Self {
            value: Box::new(value),
            raw,
        })
    }

    /// Builds `T` from an empty object without looking at the request.
    ///
    /// Used by routes that skip the bind stage; `T` must accept `{}`.
    pub fn empty<T>() -> Result<Self, BindError>
    where
        T: Payload + DeserializeOwned,
    {
        let raw = Value::Object(Map::new());
        let value = T::deserialize(&raw).map_err(BindError::Decode)?;
        Ok(Self {
            value: Box::new(value),
            raw,
        })
    }
}
