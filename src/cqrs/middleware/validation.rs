use crate::context::Context;
use crate::cqrs::handler::{from_fn, BoxedPayload, BoxedResponse, HandlerFn, Middleware};
use crate::errors::CqrsResult;

/// Runs `Message::validate` first; a failure never reaches the inner handler
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMiddleware;

impl Middleware for ValidationMiddleware {
    fn wrap(&self, next: HandlerFn) -> HandlerFn {
        from_fn(move |ctx, payload| validate_then(next.clone(), ctx, payload))
    }
}

async fn validate_then(next: HandlerFn, ctx: Context, payload: BoxedPayload) -> CqrsResult<BoxedResponse> {
    if let Err(err) = payload.data.message().validate() {
        ctx.logger().warn(
            "Request rejected by validation",
            &[
                ("type", payload.data.type_tag().to_string()),
                ("field", err.field.clone()),
                ("reason", err.message.clone()),
            ],
        );
        return Err(err.into());
    }

    next(ctx, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cqrs::envelope::{AnyOutput, Body, Payload, Response};
    use crate::cqrs::message::{Command, Message, Request};
    use crate::errors::{CqrsError, ValidationError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct Withdraw {
        amount: i64,
    }

    impl Message for Withdraw {
        fn type_tag(&self) -> &'static str {
            "Withdraw"
        }

        fn validate(&self) -> Result<(), ValidationError> {
            if self.amount <= 0 {
                return Err(ValidationError::new("amount", "must be positive"));
            }
            Ok(())
        }
    }

    impl Request for Withdraw {
        type Output = ();
    }

    impl Command for Withdraw {}

    fn counting(calls: Arc<AtomicUsize>) -> HandlerFn {
        ValidationMiddleware.wrap(from_fn(move |_ctx, _payload| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CqrsError>(Response::ok(Arc::new(()) as AnyOutput)) }
        }))
    }

    #[tokio::test]
    async fn test_invalid_request_short_circuits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting(calls.clone());

        let result = handler(Context::new(), Payload::new(Body::command(Withdraw { amount: -5 }))).await;

        match result {
            Err(CqrsError::Validation(err)) => assert_eq!(err.field, "amount"),
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_request_passes_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = counting(calls.clone());

        let result = handler(Context::new(), Payload::new(Body::command(Withdraw { amount: 5 }))).await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
