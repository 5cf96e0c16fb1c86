//! The buffered inbound request handed over by the transport.

use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use serde::Serialize;

/// Correlation id header.
pub const HEADER_REQUEST_ID: &str = "x-request-id";
/// Carries the display name of the handler the request was routed to.
pub const HEADER_FUNC_NAME: &str = "x-func-name";

/// Method, URI, headers, router parameters and the fully buffered body.
#[derive(Debug, Clone)]
pub struct RequestParts {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub path_params: Vec<(String, String)>,
    pub remote_addr: Option<SocketAddr>,
    pub body: Bytes,
}

impl Default for RequestParts {
    fn default() -> Self {
        Self::new(Method::GET, Uri::from_static("/"))
    }
}

impl RequestParts {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            path_params: Vec::new(),
            remote_addr: None,
            body: Bytes::new(),
        }
    }

    /// Adds a header, ignoring names or values that are not valid header text.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.push((name.into(), value.into()));
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and the matching content type.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(self.header("content-type", "application/json").body(body))
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The media type without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Looks a cookie up across every `Cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.trim_matches('"'))
    }

    pub fn request_id(&self) -> Option<&str> {
        self.header_str(HEADER_REQUEST_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_strips_parameters() {
        let req = RequestParts::new(Method::POST, Uri::from_static("/"))
            .header("content-type", "Application/JSON; charset=utf-8");
        assert_eq!(req.content_type().as_deref(), Some("application/json"));
    }

    #[test]
    fn test_cookie_and_query_lookup() {
        let req = RequestParts::new(Method::GET, Uri::from_static("/a?token=q%20v&x=1"))
            .header("cookie", "theme=dark; token=abc")
            .path_param("id", "42");
        assert_eq!(req.cookie("token"), Some("abc"));
        assert_eq!(req.cookie("missing"), None);
        assert_eq!(req.query_param("token").as_deref(), Some("q v"));
        assert_eq!(req.param("id"), Some("42"));
    }
}
