//! JSON Web Token authentication.
//!
//! [`Jwt`] pulls a token out of the request, verifies it and stores the
//! decoded claims as the context's principal:
//!
//! ```rust,ignore
//! web.get("/me", me, Chain::new().with(Jwt::<JwtClaims>::new(JwtKey::secret(b"secret"))));
//!
//! async fn me(ctx: Context) -> Result<Value, HttpError> {
//!     let claims = ctx.principal::<JwtClaims>().ok_or_else(|| HttpError::unauthorized("anonymous"))?;
//!     Ok(Value::Object((*claims).clone()))
//! }
//! ```

use std::collections::HashMap;
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use bootx_core::{Context, HttpError};

use super::{Middleware, Next, Skipper, default_skipper};
use crate::error::InvalidTokenLookup;

/// Claims decoded without a schema.
pub type JwtClaims = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

const MISSING_MESSAGE: &str = "missing or malformed jwt";
const INVALID_MESSAGE: &str = "invalid or expired jwt";

// ============================================================================
// Errors
// ============================================================================

/// Why a request failed authentication.
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("missing or malformed jwt")]
    Missing,

    #[error("no key for token (kid: {kid:?})")]
    UnknownKey { kid: Option<String> },

    #[error(transparent)]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

impl JwtError {
    /// The error rendered to the client.
    pub fn to_http(&self) -> HttpError {
        match self {
            JwtError::Missing => HttpError::new(StatusCode::BAD_REQUEST, MISSING_MESSAGE),
            _ => HttpError::new(StatusCode::UNAUTHORIZED, INVALID_MESSAGE),
        }
    }
}

// ============================================================================
// Token lookup
// ============================================================================

/// Where to look for the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// `<name>: <scheme> <token>`; an empty scheme takes the whole value.
    Header { name: String, scheme: String },
    Query(String),
    Param(String),
    Cookie(String),
}

impl TokenLookup {
    pub fn header(name: impl Into<String>) -> Self {
        TokenLookup::Header {
            name: name.into(),
            scheme: DEFAULT_AUTH_SCHEME.to_string(),
        }
    }

    fn extract(&self, ctx: &Context) -> Option<String> {
        let token = match self {
            TokenLookup::Header { name, scheme } => {
                let value = ctx.header(name)?;
                if scheme.is_empty() {
                    value
                } else {
                    value
                        .strip_prefix(scheme.as_str())
                        .and_then(|rest| rest.strip_prefix(' '))
                        .map(str::to_owned)?
                }
            }
            TokenLookup::Query(name) => ctx.query_param(name)?,
            TokenLookup::Param(name) => ctx.param(name)?,
            TokenLookup::Cookie(name) => ctx.cookie(name)?,
        };
        (!token.is_empty()).then_some(token)
    }
}

impl FromStr for TokenLookup {
    type Err = InvalidTokenLookup;

    /// Parses `header:Authorization`, `query:token`, `param:token` or
    /// `cookie:token`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTokenLookup(s.to_string());
        let (source, name) = s.split_once(':').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(match source.trim() {
            "header" => TokenLookup::header(name),
            "query" => TokenLookup::Query(name.to_string()),
            "param" => TokenLookup::Param(name.to_string()),
            "cookie" => TokenLookup::Cookie(name.to_string()),
            _ => return Err(invalid()),
        })
    }
}

fn default_lookups() -> Vec<TokenLookup> {
    vec![
        TokenLookup::header(http::header::AUTHORIZATION.as_str()),
        TokenLookup::Cookie("token".to_string()),
    ]
}

// ============================================================================
// Keys
// ============================================================================

type KeyResolver = Arc<dyn Fn(&Header) -> Option<DecodingKey> + Send + Sync>;

/// How the verification key is chosen.
#[derive(Clone)]
pub enum JwtKey {
    /// One key for every token.
    Single(DecodingKey),
    /// Keys indexed by the token header's `kid`.
    ByKid(HashMap<String, DecodingKey>),
    /// Arbitrary lookup from the token header.
    Resolver(KeyResolver),
}

impl JwtKey {
    /// An HMAC secret.
    pub fn secret(secret: impl AsRef<[u8]>) -> Self {
        JwtKey::Single(DecodingKey::from_secret(secret.as_ref()))
    }

    /// HMAC secrets indexed by `kid`.
    pub fn secrets<I, K, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = (K, S)>,
        K: Into<String>,
        S: AsRef<[u8]>,
    {
        JwtKey::ByKid(
            secrets
                .into_iter()
                .map(|(kid, s)| (kid.into(), DecodingKey::from_secret(s.as_ref())))
                .collect(),
        )
    }

    pub fn resolver<F>(f: F) -> Self
    where
        F: Fn(&Header) -> Option<DecodingKey> + Send + Sync + 'static,
    {
        JwtKey::Resolver(Arc::new(f))
    }

    fn resolve(&self, token: &str) -> Result<DecodingKey, JwtError> {
        if let JwtKey::Single(key) = self {
            return Ok(key.clone());
        }
        let header = jsonwebtoken::decode_header(token)?;
        let key = match self {
            JwtKey::ByKid(keys) => header.kid.as_ref().and_then(|kid| keys.get(kid)).cloned(),
            JwtKey::Resolver(resolve) => resolve(&header),
            JwtKey::Single(_) => None,
        };
        key.ok_or(JwtError::UnknownKey { kid: header.kid })
    }
}

impl std::fmt::Debug for JwtKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtKey::Single(_) => f.write_str("JwtKey::Single"),
            JwtKey::ByKid(keys) => f
                .debug_tuple("JwtKey::ByKid")
                .field(&keys.keys().collect::<Vec<_>>())
                .finish(),
            JwtKey::Resolver(_) => f.write_str("JwtKey::Resolver"),
        }
    }
}

// ============================================================================
// Middleware
// ============================================================================

type Hook = Arc<dyn Fn(&Context) + Send + Sync>;

/// Decides what happens after a failed authentication.
///
/// `Ok(())` lets the request continue without a principal; `Err` is stored
/// as the request's error and stops the chain.
pub type JwtErrorHandler =
    Arc<dyn Fn(&Context, &JwtError) -> Result<(), HttpError> + Send + Sync>;

/// Authenticates requests with a JSON Web Token.
///
/// `C` is the claims type stored as the principal.
pub struct Jwt<C = JwtClaims> {
    key: JwtKey,
    validation: Validation,
    lookups: Vec<TokenLookup>,
    before: Option<Hook>,
    on_success: Option<Hook>,
    on_error: Option<JwtErrorHandler>,
    skipper: Skipper,
    _claims: PhantomData<fn() -> C>,
}

impl<C> Jwt<C> {
    /// HS256 tokens found in `Authorization: Bearer ...` or the `token` cookie.
    pub fn new(key: JwtKey) -> Self {
        Self {
            key,
            validation: Validation::default(),
            lookups: default_lookups(),
            before: None,
            on_success: None,
            on_error: None,
            skipper: default_skipper(),
            _claims: PhantomData,
        }
        .algorithm(Algorithm::HS256)
    }

    /// Accepts only tokens signed with `alg`. `exp` is checked when present.
    pub fn algorithm(mut self, alg: Algorithm) -> Self {
        let mut validation = Validation::new(alg);
        validation.set_required_spec_claims::<&str>(&[]);
        self.validation = validation;
        self
    }

    /// Replaces the claim checks entirely.
    pub fn validation(mut self, validation: Validation) -> Self {
        self.validation = validation;
        self
    }

    /// Replaces the lookup order. The first lookup that yields a token wins.
    pub fn lookups(mut self, lookups: impl IntoIterator<Item = TokenLookup>) -> Self {
        self.lookups = lookups.into_iter().collect();
        self
    }

    pub fn before<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(f));
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, &JwtError) -> Result<(), HttpError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn skipper<F>(mut self, skipper: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.skipper = Arc::new(skipper);
        self
    }
}

impl<C: DeserializeOwned> Jwt<C> {
    fn authenticate(&self, ctx: &Context) -> Result<C, JwtError> {
        let token = self
            .lookups
            .iter()
            .find_map(|lookup| lookup.extract(ctx))
            .ok_or(JwtError::Missing)?;
        let key = self.key.resolve(&token)?;
        let data = jsonwebtoken::decode::<C>(&token, &key, &self.validation)?;
        Ok(data.claims)
    }
}

impl<C> Clone for Jwt<C> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            validation: self.validation.clone(),
            lookups: self.lookups.clone(),
            before: self.before.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            skipper: self.skipper.clone(),
            _claims: PhantomData,
        }
    }
}

#[async_trait]
impl<C> Middleware for Jwt<C>
where
    C: DeserializeOwned + Send + Sync + 'static,
{
    async fn handle(&self, ctx: &Context, next: Next<'_>) {
        if (self.skipper)(ctx) {
            next.run(ctx).await;
            return;
        }
        if let Some(before) = &self.before {
            before(ctx);
        }

        match self.authenticate(ctx) {
            Ok(claims) => {
                if ctx.set_principal(claims).is_err() {
                    warn!(func = %ctx.func_name(), "principal already set, keeping the first one");
                }
                if let Some(on_success) = &self.on_success {
                    on_success(ctx);
                }
            }
            Err(err) => {
                debug!(func = %ctx.func_name(), error = %err, "jwt authentication failed");
                let outcome = match &self.on_error {
                    Some(on_error) => on_error(ctx, &err),
                    None => Err(err.to_http()),
                };
                if let Err(http) = outcome {
                    ctx.set_error(http);
                    return;
                }
            }
        }
        next.run(ctx).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    use futures::future::BoxFuture;
    use jsonwebtoken::EncodingKey;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use super::*;
    use crate::middleware::{Chain, Terminal};
    use bootx_core::{ContextEnv, Error, RequestParts};

    const SECRET: &[u8] = b"bootx-secret";

    #[derive(Debug, Serialize, Deserialize)]
    struct User {
        sub: String,
    }

    struct Count(Arc<AtomicUsize>);

    impl Terminal for Count {
        fn call<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                self.0.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn token(secret: &[u8], header: Header, exp_offset: i64) -> String {
        let claims = json!({ "sub": "ann", "exp": now() + exp_offset });
        jsonwebtoken::encode(&header, &claims, &EncodingKey::from_secret(secret)).unwrap()
    }

    fn request(header: Option<(&str, String)>) -> Context {
        let mut req = RequestParts::new(http::Method::GET, http::Uri::from_static("/me"));
        if let Some((name, value)) = header {
            req = req.header(name, &value);
        }
        Context::new(Arc::new(ContextEnv::default()), req)
    }

    async fn run<C>(jwt: Jwt<C>, ctx: &Context) -> usize
    where
        C: DeserializeOwned + Send + Sync + 'static,
    {
        let calls = Arc::new(AtomicUsize::new(0));
        Chain::new().with(jwt).run(ctx, &Count(calls.clone())).await;
        calls.load(Ordering::SeqCst)
    }

    fn error_status(ctx: &Context) -> Option<StatusCode> {
        ctx.with_error(|e| e.map(Error::status))
    }

    #[tokio::test]
    async fn test_bearer_token_sets_principal() {
        let bearer = format!("Bearer {}", token(SECRET, Header::default(), 3600));
        let ctx = request(Some(("authorization", bearer)));

        let calls = run(Jwt::<User>::new(JwtKey::secret(SECRET)), &ctx).await;

        assert_eq!(calls, 1);
        assert_eq!(ctx.principal::<User>().unwrap().sub, "ann");
        assert!(!ctx.has_error());
    }

    #[tokio::test]
    async fn test_cookie_fallback_with_map_claims() {
        let cookie = format!("theme=dark; token={}", token(SECRET, Header::default(), 3600));
        let ctx = request(Some(("cookie", cookie)));

        let calls = run(Jwt::<JwtClaims>::new(JwtKey::secret(SECRET)), &ctx).await;

        assert_eq!(calls, 1);
        assert_eq!(ctx.principal::<JwtClaims>().unwrap()["sub"], "ann");
    }

    #[tokio::test]
    async fn test_missing_token_is_bad_request() {
        let ctx = request(None);
        let calls = run(Jwt::<User>::new(JwtKey::secret(SECRET)), &ctx).await;

        assert_eq!(calls, 0);
        assert_eq!(error_status(&ctx), Some(StatusCode::BAD_REQUEST));
        assert_eq!(ctx.error_message().as_deref(), Some(MISSING_MESSAGE));
    }

    #[tokio::test]
    async fn test_wrong_scheme_counts_as_missing() {
        let basic = format!("Basic {}", token(SECRET, Header::default(), 3600));
        let ctx = request(Some(("authorization", basic)));
        run(Jwt::<User>::new(JwtKey::secret(SECRET)), &ctx).await;
        assert_eq!(error_status(&ctx), Some(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_bad_signature_and_expiry_are_unauthorized() {
        for tok in [
            token(b"other-secret", Header::default(), 3600),
            token(SECRET, Header::default(), -3600),
        ] {
            let ctx = request(Some(("authorization", format!("Bearer {tok}"))));
            let calls = run(Jwt::<User>::new(JwtKey::secret(SECRET)), &ctx).await;
            assert_eq!(calls, 0);
            assert_eq!(error_status(&ctx), Some(StatusCode::UNAUTHORIZED));
            assert_eq!(ctx.error_message().as_deref(), Some(INVALID_MESSAGE));
        }
    }

    #[tokio::test]
    async fn test_keys_by_kid() {
        let keys = JwtKey::secrets([("k1", b"one".as_slice()), ("k2", b"two".as_slice())]);
        let header = Header {
            kid: Some("k2".to_string()),
            ..Header::default()
        };
        let ctx = request(Some(("authorization", format!("Bearer {}", token(b"two", header, 60)))));
        assert_eq!(run(Jwt::<User>::new(keys.clone()), &ctx).await, 1);

        let header = Header {
            kid: Some("k3".to_string()),
            ..Header::default()
        };
        let ctx = request(Some(("authorization", format!("Bearer {}", token(b"two", header, 60)))));
        assert_eq!(run(Jwt::<User>::new(keys), &ctx).await, 0);
        assert_eq!(error_status(&ctx), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_query_lookup_and_hooks() {
        let uri = format!("/me?token={}", token(SECRET, Header::default(), 60));
        let req = RequestParts::new(http::Method::GET, uri.parse().unwrap());
        let ctx = Context::new(Arc::new(ContextEnv::default()), req);

        let hooks = Arc::new(AtomicUsize::new(0));
        let (before, success) = (hooks.clone(), hooks.clone());
        let jwt = Jwt::<User>::new(JwtKey::secret(SECRET))
            .lookups(["query:token".parse::<TokenLookup>().unwrap()])
            .before(move |_| {
                before.fetch_add(1, Ordering::SeqCst);
            })
            .on_success(move |_| {
                success.fetch_add(10, Ordering::SeqCst);
            });

        assert_eq!(run(jwt, &ctx).await, 1);
        assert_eq!(hooks.load(Ordering::SeqCst), 11);
    }

    #[tokio::test]
    async fn test_on_error_may_let_request_through() {
        let ctx = request(None);
        let jwt = Jwt::<User>::new(JwtKey::secret(SECRET)).on_error(|_, err| match err {
            JwtError::Missing => Ok(()),
            other => Err(other.to_http()),
        });
        assert_eq!(run(jwt, &ctx).await, 1);
        assert!(!ctx.has_principal());
        assert!(!ctx.has_error());
    }

    #[test]
    fn test_parse_lookup() {
        assert_eq!(
            "header:Authorization".parse::<TokenLookup>().unwrap(),
            TokenLookup::header("Authorization")
        );
        assert_eq!(
            "cookie:token".parse::<TokenLookup>().unwrap(),
            TokenLookup::Cookie("token".into())
        );
        assert!("form:token".parse::<TokenLookup>().is_err());
        assert!("header:".parse::<TokenLookup>().is_err());
        assert!("token".parse::<TokenLookup>().is_err());
    }
}
