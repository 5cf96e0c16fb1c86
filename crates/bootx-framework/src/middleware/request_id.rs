//! Correlation ids.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};

use bootx_core::{Context, HEADER_REQUEST_ID};

use super::{Middleware, Next, Skipper, default_skipper};

type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// Makes sure every request carries an `X-Request-Id`.
///
/// An id sent by the client is kept; otherwise a UUID v4 is generated. The id
/// is written back on the request, so [`Context::id`] sees it, and copied to
/// the response.
#[derive(Clone)]
pub struct RequestId {
    generator: Generator,
    skipper: Skipper,
}

impl Default for RequestId {
    fn default() -> Self {
        Self {
            generator: Arc::new(|| uuid::Uuid::new_v4().to_string()),
            skipper: default_skipper(),
        }
    }
}

impl RequestId {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generator<F>(mut self, generator: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.generator = Arc::new(generator);
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

#[async_trait]
impl Middleware for RequestId {
    async fn handle(&self, ctx: &Context, next: Next<'_>) {
        if !(self.skipper)(ctx) {
            let id = match ctx.header(HEADER_REQUEST_ID).filter(|id| !id.is_empty()) {
                Some(id) => id,
                None => (self.generator)(),
            };
            if let Ok(value) = HeaderValue::from_str(&id) {
                let name = HeaderName::from_static(HEADER_REQUEST_ID);
                ctx.set_request_header(name.clone(), value.clone());
                ctx.set_response_header(name, value);
            }
        }
        next.run(ctx).await;
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;

    use super::*;
    use crate::middleware::{Chain, Terminal};
    use bootx_core::{ContextEnv, RequestParts};

    struct Noop;

    impl Terminal for Noop {
        fn call<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }
    }

    fn ctx(req: RequestParts) -> Context {
        Context::new(Arc::new(ContextEnv::default()), req)
    }

    #[tokio::test]
    async fn test_generates_missing_id() {
        let ctx = ctx(RequestParts::default());
        let chain = Chain::new().with(RequestId::new().generator(|| "gen-1".to_string()));
        chain.run(&ctx, &Noop).await;
        assert_eq!(ctx.id(), "gen-1");
        let response = ctx.take_response();
        assert_eq!(response.headers().get(HEADER_REQUEST_ID).unwrap(), "gen-1");
    }

    #[tokio::test]
    async fn test_keeps_client_id() {
        let ctx = ctx(RequestParts::default().header("X-Request-Id", "client-7"));
        Chain::new().with(RequestId::new()).run(&ctx, &Noop).await;
        assert_eq!(ctx.id(), "client-7");
    }

    #[tokio::test]
    async fn test_default_ids_are_uuids() {
        let ctx = ctx(RequestParts::default());
        Chain::new().with(RequestId::new()).run(&ctx, &Noop).await;
        assert!(uuid::Uuid::parse_str(&ctx.id()).is_ok());
    }
}
