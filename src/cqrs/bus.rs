use std::collections::HashMap;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::{ApplicationError, CqrsResult, HandlerNotFoundError};
use crate::logging::Logger;

use super::envelope::{AnyOutput, Response};
use super::handler::{compose, BoxedPayload, BoxedResponse, HandlerFn, Middleware};
use super::message::RequestKind;

// ============================================================================
// Registry engine shared by CommandBus and QueryBus
// ============================================================================
//
// Registration takes `&mut self`: a bus is populated first, then shared
// (usually behind an `Arc`) and only read while serving requests.
//
// ============================================================================

pub(crate) struct Bus {
    kind: RequestKind,
    handlers: HashMap<String, HandlerFn>,
    global: Vec<Arc<dyn Middleware>>,
}

impl Bus {
    pub(crate) fn new(kind: RequestKind) -> Self {
        Self {
            kind,
            handlers: HashMap::new(),
            global: Vec::new(),
        }
    }

    /// Compose once and store; re-registering a tag replaces the handler
    pub(crate) fn register(
        &mut self,
        type_tag: &str,
        base: HandlerFn,
        middleware: Vec<Arc<dyn Middleware>>,
    ) {
        let chain: Vec<Arc<dyn Middleware>> = self.global.iter().cloned().chain(middleware).collect();
        let composed = compose(base, &chain);

        if self.handlers.insert(type_tag.to_string(), composed).is_some() {
            tracing::warn!(kind = %self.kind, type_tag = %type_tag, "Replaced existing handler");
        }
        tracing::debug!(
            kind = %self.kind,
            type_tag = %type_tag,
            middleware = chain.len(),
            "Registered handler"
        );
    }

    /// Applies to registrations made after this call, as outer layers
    pub(crate) fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.global.push(middleware);
    }

    /// Resolve the composed handler for `type_tag`
    pub(crate) fn lookup(&self, type_tag: &str) -> CqrsResult<HandlerFn> {
        let handler = self.handlers.get(type_tag).cloned().ok_or_else(|| HandlerNotFoundError {
            type_tag: type_tag.to_string(),
            kind: self.kind,
        })?;
        Ok(handler)
    }

    pub(crate) async fn dispatch(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        payload: BoxedPayload,
    ) -> CqrsResult<BoxedResponse> {
        let handler = self.lookup(payload.data.type_tag())?;
        handler(ctx.clone().with_logger(logger), payload).await
    }

    pub(crate) fn has_handler(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(type_tag)
    }

    /// Registered type tags, sorted
    pub(crate) fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Surface `response.error` as the error and recover the typed output
pub(crate) fn into_typed<T>(response: BoxedResponse) -> CqrsResult<Response<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if let Some(error) = response.error {
        return Err(error);
    }

    let data = match response.data {
        Some(output) => Some(downcast_output::<T>(output)?),
        None => None,
    };

    Ok(Response {
        data,
        metadata: response.metadata,
        error: None,
    })
}

fn downcast_output<T>(output: AnyOutput) -> CqrsResult<T>
where
    T: Clone + Send + Sync + 'static,
{
    let typed = output.downcast::<T>().map_err(|_| {
        ApplicationError::new(
            "RESPONSE_TYPE_MISMATCH",
            format!("handler output is not a {}", std::any::type_name::<T>()),
        )
    })?;
    Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone()))
}
