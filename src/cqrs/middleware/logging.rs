use std::time::Instant;

use crate::context::Context;
use crate::cqrs::handler::{from_fn, BoxedPayload, BoxedResponse, HandlerFn, Middleware};
use crate::errors::CqrsResult;

/// Before/after log lines around the inner handler, through the call's logger
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: HandlerFn) -> HandlerFn {
        from_fn(move |ctx, payload| log_around(next.clone(), ctx, payload))
    }
}

async fn log_around(next: HandlerFn, ctx: Context, payload: BoxedPayload) -> CqrsResult<BoxedResponse> {
    let kind = payload.data.kind().to_string();
    let type_tag = payload.data.type_tag().to_string();
    let trace_id = payload.trace_id.clone();

    ctx.logger().debug(
        "Handling request",
        &[
            ("kind", kind.clone()),
            ("type", type_tag.clone()),
            ("trace_id", trace_id.clone()),
        ],
    );

    let started = Instant::now();
    let result = next(ctx.clone(), payload).await;
    let duration_ms = started.elapsed().as_millis().to_string();

    let failure = match &result {
        Ok(response) => response.error.as_ref(),
        Err(err) => Some(err),
    };

    match failure {
        None => ctx.logger().info(
            "Request handled",
            &[
                ("kind", kind),
                ("type", type_tag),
                ("trace_id", trace_id),
                ("duration_ms", duration_ms),
            ],
        ),
        Some(error) => ctx.logger().error(
            "Request failed",
            &[
                ("kind", kind),
                ("type", type_tag),
                ("trace_id", trace_id),
                ("duration_ms", duration_ms),
                ("error_kind", error.kind().to_string()),
                ("error", error.to_string()),
            ],
        ),
    }

    result
}
