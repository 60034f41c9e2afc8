use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::context::Context;
use crate::errors::{ApplicationError, CqrsResult};

use super::envelope::{AnyOutput, Body, Payload, Response};
use super::message::Request;

// ============================================================================
// Handlers and Middleware
// ============================================================================
//
// Typed `Handler`s are erased into a `HandlerFn` at registration. A
// `Middleware` turns one `HandlerFn` into another; a registration's list is
// folded once into a single composed handler, first entry outermost:
//
//   [A, B, C] => A(B(C(handler)))
//
// ============================================================================

pub type BoxedPayload = Payload<Body>;
pub type BoxedResponse = Response<AnyOutput>;

/// Erased, composed handler stored in a bus registry
pub type HandlerFn =
    Arc<dyn Fn(Context, BoxedPayload) -> BoxFuture<'static, CqrsResult<BoxedResponse>> + Send + Sync>;

/// Terminal business handler for one request type
#[async_trait]
pub trait Handler: Send + Sync {
    type Request: Request;

    async fn handle(
        &self,
        ctx: Context,
        payload: Payload<Self::Request>,
    ) -> CqrsResult<Response<<Self::Request as Request>::Output>>;
}

/// `Handler` backed by an async closure
pub struct FnHandler<R, F> {
    f: F,
    _request: PhantomData<fn(R)>,
}

pub fn handler_fn<R, F, Fut>(f: F) -> FnHandler<R, F>
where
    R: Request,
    F: Fn(Context, Payload<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CqrsResult<Response<R::Output>>> + Send + 'static,
{
    FnHandler {
        f,
        _request: PhantomData,
    }
}

#[async_trait]
impl<R, F, Fut> Handler for FnHandler<R, F>
where
    R: Request,
    F: Fn(Context, Payload<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CqrsResult<Response<R::Output>>> + Send + 'static,
{
    type Request = R;

    async fn handle(&self, ctx: Context, payload: Payload<R>) -> CqrsResult<Response<R::Output>> {
        (self.f)(ctx, payload).await
    }
}

/// Build a `HandlerFn` from an async closure over erased envelopes
pub fn from_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Context, BoxedPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CqrsResult<BoxedResponse>> + Send + 'static,
{
    Arc::new(move |ctx: Context, payload: BoxedPayload| f(ctx, payload).boxed())
}

pub trait Middleware: Send + Sync {
    fn wrap(&self, next: HandlerFn) -> HandlerFn;
}

impl<F> Middleware for F
where
    F: Fn(HandlerFn) -> HandlerFn + Send + Sync,
{
    fn wrap(&self, next: HandlerFn) -> HandlerFn {
        self(next)
    }
}

/// Fold right-to-left so the first middleware is the outermost layer
pub fn compose(base: HandlerFn, middleware: &[Arc<dyn Middleware>]) -> HandlerFn {
    middleware
        .iter()
        .rev()
        .fold(base, |next, layer| layer.wrap(next))
}

/// Erase a typed handler. The body is downcast back to the handler's request
/// type exactly once, here.
pub(crate) fn erase<H>(handler: H) -> HandlerFn
where
    H: Handler + 'static,
{
    let handler = Arc::new(handler);
    from_fn(move |ctx, payload| invoke(Arc::clone(&handler), ctx, payload))
}

async fn invoke<H: Handler>(handler: Arc<H>, ctx: Context, payload: BoxedPayload) -> CqrsResult<BoxedResponse> {
    let type_tag = payload.data.type_tag();
    let typed = payload.try_map(|body| {
        body.downcast::<H::Request>().ok_or_else(|| {
            ApplicationError::new(
                "TYPE_MISMATCH",
                format!("handler registered for {type_tag} cannot accept this request type"),
            )
        })
    })?;

    let response = handler.handle(ctx, typed).await?;
    Ok(response.map(|output| Arc::new(output) as AnyOutput))
}
