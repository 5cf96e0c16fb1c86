//! Handler adapters.
//!
//! Any async function or closure with one of the four supported parameter
//! shapes implements [`Handler`]:
//!
//! ```rust,ignore
//! async fn ping() -> Result<(), HttpError> { Ok(()) }
//! async fn hello(ctx: Context) -> Result<(), BoxError> { ctx.string(StatusCode::OK, "hi"); Ok(()) }
//! async fn create(req: CreateUser) -> Result<User, AppError> { ... }
//! async fn echo(ctx: Context, req: EchoRequest) -> Result<EchoResponse, anyhow::Error> { ... }
//! ```
//!
//! A handler returning `Result<(), E>` has the error-only shape; any other
//! `Ok` type is the declared response value. The adapter erases the handler
//! into a [`Callable`], one variant per shape, so dispatch is an exhaustive
//! `match` with no per-request introspection.

use std::any::{Any, TypeId};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use bootx_core::{BoxError, Context, Error, Payload, ResponseValue, Validate};

use crate::descriptor::{
    HandlerShape, ParamKind, PayloadType, ReturnKind, Signature, TypeToken, display_name,
};

/// What a handler invocation produced: an optional response value or an error.
pub type HandlerResult = Result<Option<Box<dyn ResponseValue>>, BoxError>;

/// The boxed future of one handler invocation.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// A payload parameter type: decodable from the request and validatable.
pub trait RequestPayload: DeserializeOwned + Validate + Send + Sync + 'static {}

impl<T> RequestPayload for T where T: DeserializeOwned + Validate + Send + Sync + 'static {}

// ============================================================================
// Callable
// ============================================================================

/// A type-erased handler, one variant per parameter shape.
#[derive(Clone)]
pub enum Callable {
    Bare(Arc<dyn Fn() -> HandlerFuture + Send + Sync>),
    Context(Arc<dyn Fn(Context) -> HandlerFuture + Send + Sync>),
    Payload(Arc<dyn Fn(Box<dyn Payload>) -> HandlerFuture + Send + Sync>),
    ContextPayload(Arc<dyn Fn(Context, Box<dyn Payload>) -> HandlerFuture + Send + Sync>),
}

impl Callable {
    pub fn shape(&self) -> HandlerShape {
        match self {
            Callable::Bare(_) => HandlerShape::Bare,
            Callable::Context(_) => HandlerShape::Context,
            Callable::Payload(_) => HandlerShape::Payload,
            Callable::ContextPayload(_) => HandlerShape::ContextPayload,
        }
    }
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Callable").field(&self.shape()).finish()
    }
}

// ============================================================================
// Handler trait
// ============================================================================

/// A function usable as a route handler.
///
/// `T` is a marker distinguishing the blanket implementations; it is always
/// inferred.
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// The handler's parameter and return shape.
    fn signature(&self) -> Signature;

    /// Erases the handler for storage in a route.
    fn into_callable(self) -> Callable;
}

/// Marker for handlers taking only a decoded payload.
pub struct ViaPayload<P>(PhantomData<fn() -> P>);

/// Marker for [`ErasedHandler`].
pub struct Erased;

fn returns_value<R: 'static>() -> bool {
    TypeId::of::<R>() != TypeId::of::<()>()
}

fn outputs<R: 'static>(sig: Signature) -> Signature {
    if returns_value::<R>() {
        sig.output(ReturnKind::Value(TypeToken::of::<R>()))
            .output(ReturnKind::Error)
    } else {
        sig.output(ReturnKind::Error)
    }
}

/// Converts a handler's `Result` into the erased form.
async fn settle<Fut, R, E>(fut: Fut) -> HandlerResult
where
    Fut: Future<Output = Result<R, E>>,
    R: Serialize + Send + Sync + 'static,
    E: Into<BoxError>,
{
    match fut.await {
        Ok(value) if returns_value::<R>() => Ok(Some(Box::new(value))),
        Ok(_) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn downcast_payload<P: 'static>(payload: Box<dyn Payload>) -> Result<P, BoxError> {
    let found = payload.type_name();
    payload
        .into_any()
        .downcast::<P>()
        .map(|p| *p)
        .map_err(|_: Box<dyn Any + Send>| {
            Error::internal(format!(
                "payload type mismatch: expected `{}`, found `{found}`",
                std::any::type_name::<P>()
            ))
            .into()
        })
}

impl<F, Fut, R, E> Handler<()> for F
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize + Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn signature(&self) -> Signature {
        outputs::<R>(Signature::new(display_name(std::any::type_name::<F>())))
    }

    fn into_callable(self) -> Callable {
        Callable::Bare(Arc::new(move || -> HandlerFuture { Box::pin(settle(self())) }))
    }
}

impl<F, Fut, R, E> Handler<(Context,)> for F
where
    F: Fn(Context) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize + Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
{
    fn signature(&self) -> Signature {
        let sig = Signature::new(display_name(std::any::type_name::<F>()))
            .input(ParamKind::Context);
        outputs::<R>(sig)
    }

    fn into_callable(self) -> Callable {
        Callable::Context(Arc::new(move |ctx: Context| -> HandlerFuture {
            Box::pin(settle(self(ctx)))
        }))
    }
}

impl<F, Fut, R, E, P> Handler<ViaPayload<P>> for F
where
    F: Fn(P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize + Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
    P: RequestPayload,
{
    fn signature(&self) -> Signature {
        let sig = Signature::new(display_name(std::any::type_name::<F>()))
            .input(ParamKind::Payload(PayloadType::of::<P>()));
        outputs::<R>(sig)
    }

    fn into_callable(self) -> Callable {
        Callable::Payload(Arc::new(move |payload: Box<dyn Payload>| -> HandlerFuture {
            let handler = self.clone();
            Box::pin(async move {
                let payload = downcast_payload::<P>(payload)?;
                settle(handler(payload)).await
            })
        }))
    }
}

impl<F, Fut, R, E, P> Handler<(Context, P)> for F
where
    F: Fn(Context, P) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Serialize + Send + Sync + 'static,
    E: Into<BoxError> + Send + 'static,
    P: RequestPayload,
{
    fn signature(&self) -> Signature {
        let sig = Signature::new(display_name(std::any::type_name::<F>()))
            .input(ParamKind::Context)
            .input(ParamKind::Payload(PayloadType::of::<P>()));
        outputs::<R>(sig)
    }

    fn into_callable(self) -> Callable {
        Callable::ContextPayload(Arc::new(
            move |ctx: Context, payload: Box<dyn Payload>| -> HandlerFuture {
                let handler = self.clone();
                Box::pin(async move {
                    let payload = downcast_payload::<P>(payload)?;
                    settle(handler(ctx, payload)).await
                })
            },
        ))
    }
}

// ============================================================================
// ErasedHandler
// ============================================================================

/// A handler assembled at runtime from an explicit signature and callable.
///
/// Its signature is checked like any other when registered, so a mismatch
/// between the declared shape and the callable is reported up front.
#[derive(Clone, Debug)]
pub struct ErasedHandler {
    signature: Signature,
    callable: Callable,
}

impl ErasedHandler {
    pub fn new(signature: Signature, callable: Callable) -> Self {
        Self {
            signature,
            callable,
        }
    }
}

impl Handler<Erased> for ErasedHandler {
    fn signature(&self) -> Signature {
        self.signature.clone()
    }

    fn into_callable(self) -> Callable {
        self.callable
    }
}
