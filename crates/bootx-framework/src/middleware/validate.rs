use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;

use bootx_core::{Context, Error, Validator};

use super::{Middleware, Next, Skipper, default_skipper};

/// Runs an extra [`Validator`] against the decoded payload.
///
/// A failure stores a validation error and stops the chain; requests
/// without a payload pass through untouched.
#[derive(Clone)]
pub struct ValidatePayload {
    validator: Arc<dyn Validator>,
    skipper: Skipper,
}

impl ValidatePayload {
    pub fn new(validator: impl Validator) -> Self {
        Self {
            validator: Arc::new(validator),
            skipper: default_skipper(),
        }
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
impl Middleware for ValidatePayload {
    async fn handle(&self, ctx: &Context, next: Next<'_>) {
        if (self.skipper)(ctx) {
            next.run(ctx).await;
            return;
        }

        let outcome = ctx.with_payload(|payload| payload.map(|p| self.validator.validate(p)));
        if let Some(Err(err)) = outcome {
            ctx.set_status(StatusCode::BAD_REQUEST);
            ctx.set_error(Error::Validation(err));
            return;
        }
        next.run(ctx).await;
    }
}
