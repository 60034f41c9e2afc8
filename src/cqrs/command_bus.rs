use std::sync::Arc;

use crate::context::Context;
use crate::errors::CqrsResult;
use crate::logging::Logger;
use crate::utils::{retry_on_transient, RetryConfig};

use super::bus::{into_typed, Bus};
use super::envelope::{Body, Payload, Response};
use super::handler::{erase, Handler, Middleware};
use super::message::{Command, RequestKind};

// ============================================================================
// Command Bus
// ============================================================================
//
// Orchestrates: Command → Middleware chain → Handler → Aggregate → Unit of Work
//
// ============================================================================

pub struct CommandBus {
    bus: Bus,
}

impl CommandBus {
    pub fn new() -> Self {
        Self {
            bus: Bus::new(RequestKind::Command),
        }
    }

    /// Register `handler` for `type_tag`, wrapped by `middleware` (first is
    /// outermost). Replaces any earlier registration for the same tag.
    pub fn register<H>(&mut self, type_tag: &str, handler: H, middleware: Vec<Arc<dyn Middleware>>)
    where
        H: Handler + 'static,
        H::Request: Command,
    {
        self.bus.register(type_tag, erase(handler), middleware);
    }

    /// Middleware applied, outermost, to every later registration
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.bus.use_middleware(middleware);
    }

    pub async fn handle<C: Command>(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        command: C,
    ) -> CqrsResult<C::Output> {
        self.handle_payload(ctx, logger, Payload::new(command))
            .await?
            .into_result()
    }

    /// Like `handle`, keeping the response envelope (metadata included)
    pub async fn handle_payload<C: Command>(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        payload: Payload<C>,
    ) -> CqrsResult<Response<C::Output>> {
        let response = self.bus.dispatch(ctx, logger, payload.map(Body::command)).await?;
        into_typed(response)
    }

    /// Re-dispatch while the command fails with a concurrency conflict
    pub async fn handle_with_retry<C: Command>(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        command: C,
        config: RetryConfig,
    ) -> CqrsResult<C::Output> {
        retry_on_transient(config, |_attempt| {
            self.handle(ctx, logger.clone(), command.clone())
        })
        .await
        .into_result()
    }

    pub fn has_handler(&self, type_tag: &str) -> bool {
        self.bus.has_handler(type_tag)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.bus.registered_types()
    }
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}
