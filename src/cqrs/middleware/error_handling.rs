use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;

use crate::context::Context;
use crate::cqrs::handler::{from_fn, BoxedPayload, BoxedResponse, HandlerFn, Middleware};
use crate::cqrs::message::RequestKind;
use crate::errors::{ApplicationError, CqrsError, CqrsResult};

// ============================================================================
// Error Handling - panic recovery and error normalisation
// ============================================================================
//
// A panic in an inner layer is logged at error level and turned into
// `ApplicationError{code: "PANIC"}`. The process keeps running. Errors that
// are not one of the known kinds, on either channel, become
// `ApplicationError{code: "REQUEST_FAILED"}` with the original as cause.
//
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorHandlingMiddleware;

impl Middleware for ErrorHandlingMiddleware {
    fn wrap(&self, next: HandlerFn) -> HandlerFn {
        from_fn(move |ctx, payload| guard(next.clone(), ctx, payload))
    }
}

async fn guard(next: HandlerFn, ctx: Context, payload: BoxedPayload) -> CqrsResult<BoxedResponse> {
    let kind = payload.data.kind();
    let type_tag = payload.data.type_tag();
    let inner_ctx = ctx.clone();

    // Panics can surface while building the inner future or while polling it
    let future = match panic::catch_unwind(AssertUnwindSafe(|| next(inner_ctx, payload))) {
        Ok(future) => future,
        Err(cause) => return Err(recovered(&ctx, kind, type_tag, cause)),
    };

    let result = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(cause) => return Err(recovered(&ctx, kind, type_tag, cause)),
    };

    match result {
        Ok(mut response) => {
            response.error = response.error.map(normalize);
            Ok(response)
        }
        Err(err) => Err(normalize(err)),
    }
}

fn recovered(ctx: &Context, kind: RequestKind, type_tag: &str, cause: Box<dyn Any + Send>) -> CqrsError {
    let message = panic_message(&*cause);
    ctx.logger().error(
        "Recovered from panic in request handler",
        &[
            ("kind", kind.to_string()),
            ("type", type_tag.to_string()),
            ("panic", message.clone()),
        ],
    );

    ApplicationError::new("PANIC", format!("{kind} handler for {type_tag} panicked: {message}")).into()
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(message) = cause.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = cause.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn normalize(err: CqrsError) -> CqrsError {
    if err.is_known() {
        return err;
    }

    let message = format!("request failed: {err}");
    ApplicationError::new("REQUEST_FAILED", message)
        .with_cause(err.into_cause())
        .into()
}
