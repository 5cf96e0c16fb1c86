//! The innermost step of every route: calling the user function.

use futures::future::BoxFuture;

use bootx_core::{Context, Error};

use crate::handler::{Callable, HandlerResult};
use crate::middleware::Terminal;

/// Calls a handler with the arguments its shape asks for and records the
/// outcome in the context.
///
/// An `Ok` value lands in the response slot, an `Err` in the error slot.
/// Nothing is written to the response here.
#[derive(Clone, Debug)]
pub struct Invoke {
    callable: Callable,
}

impl Invoke {
    pub fn new(callable: Callable) -> Self {
        Self { callable }
    }

    async fn invoke(&self, ctx: &Context) -> HandlerResult {
        match &self.callable {
            Callable::Bare(f) => f().await,
            Callable::Context(f) => f(ctx.clone()).await,
            Callable::Payload(f) => match ctx.take_payload() {
                Some(payload) => f(payload).await,
                None => Err(missing_payload()),
            },
            Callable::ContextPayload(f) => match ctx.take_payload() {
                Some(payload) => f(ctx.clone(), payload).await,
                None => Err(missing_payload()),
            },
        }
    }
}

fn missing_payload() -> bootx_core::BoxError {
    Error::internal("handler expects a payload but none was bound").into()
}

impl Terminal for Invoke {
    fn call<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            match self.invoke(ctx).await {
                Ok(Some(value)) => ctx.set_reply(value),
                Ok(None) => {}
                Err(err) => ctx.set_error(Error::from_handler(err)),
            }
        })
    }
}
