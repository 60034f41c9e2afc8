use std::sync::Arc;

use crate::context::Context;
use crate::errors::CqrsResult;
use crate::logging::Logger;

use super::bus::{into_typed, Bus};
use super::envelope::{Body, Payload, Response};
use super::handler::{erase, Handler, Middleware};
use super::message::{Query, RequestKind};

// ============================================================================
// Query Bus
// ============================================================================
//
// Same registry engine as the command bus. Query bodies carry a field
// fingerprint so `CachingMiddleware` can key on them.
//
// ============================================================================

pub struct QueryBus {
    bus: Bus,
}

impl QueryBus {
    pub fn new() -> Self {
        Self {
            bus: Bus::new(RequestKind::Query),
        }
    }

    /// Register `handler` for `type_tag`, wrapped by `middleware` (first is
    /// outermost). Replaces any earlier registration for the same tag.
    pub fn register<H>(&mut self, type_tag: &str, handler: H, middleware: Vec<Arc<dyn Middleware>>)
    where
        H: Handler + 'static,
        H::Request: Query,
    {
        self.bus.register(type_tag, erase(handler), middleware);
    }

    /// Middleware applied, outermost, to every later registration
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.bus.use_middleware(middleware);
    }

    pub async fn handle<Q: Query>(&self, ctx: &Context, logger: Arc<dyn Logger>, query: Q) -> CqrsResult<Q::Output> {
        self.handle_payload(ctx, logger, Payload::new(query))
            .await?
            .into_result()
    }

    /// Like `handle`, keeping the response envelope (metadata included)
    pub async fn handle_payload<Q: Query>(
        &self,
        ctx: &Context,
        logger: Arc<dyn Logger>,
        payload: Payload<Q>,
    ) -> CqrsResult<Response<Q::Output>> {
        // Routing errors win over fingerprinting errors
        let handler = self.bus.lookup(payload.data.type_tag())?;
        let payload = payload.try_map(Body::query)?;
        let response = handler(ctx.clone().with_logger(logger), payload).await?;
        into_typed(response)
    }

    pub fn has_handler(&self, type_tag: &str) -> bool {
        self.bus.has_handler(type_tag)
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.bus.registered_types()
    }
}

impl Default for QueryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cqrs::message::{Message, Request};
    use crate::cqrs::middleware::{CachingMiddleware, QueryCache};
    use crate::errors::CqrsError;
    use crate::logging::TracingLogger;
    use async_trait::async_trait;
    use serde::Serialize;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize)]
    struct FindPrice {
        sku: String,
    }

    impl Message for FindPrice {
        fn type_tag(&self) -> &'static str {
            "FindPrice"
        }
    }

    impl Request for FindPrice {
        type Output = u64;
    }

    impl Query for FindPrice {}

    struct PriceList {
        prices: HashMap<&'static str, u64>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for PriceList {
        type Request = FindPrice;

        async fn handle(&self, _ctx: Context, payload: Payload<FindPrice>) -> CqrsResult<Response<u64>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .prices
                .get(payload.data.sku.as_str())
                .copied()
                .map(Response::ok)
                .unwrap_or_else(|| Response::failed(crate::errors::ValidationError::new("sku", "unknown"))))
        }
    }

    fn price_list(calls: Arc<AtomicUsize>) -> PriceList {
        PriceList {
            prices: HashMap::from([("apple", 3), ("pear", 4)]),
            calls,
        }
    }

    /// Tuple map keys have no JSON form, so this query cannot be fingerprinted
    #[derive(Debug, Clone, Serialize)]
    struct FindRoute {
        legs: HashMap<(u8, u8), u32>,
    }

    impl Message for FindRoute {
        fn type_tag(&self) -> &'static str {
            "FindRoute"
        }
    }

    impl Request for FindRoute {
        type Output = u32;
    }

    impl Query for FindRoute {}

    fn find(sku: &str) -> FindPrice {
        FindPrice { sku: sku.to_string() }
    }

    fn logger() -> Arc<dyn Logger> {
        Arc::new(TracingLogger)
    }

    #[tokio::test]
    async fn test_query_round_trip() {
        let mut bus = QueryBus::new();
        bus.register("FindPrice", price_list(Arc::new(AtomicUsize::new(0))), Vec::new());

        let price = bus.handle(&Context::new(), logger(), find("pear")).await.unwrap();

        assert_eq!(price, 4);
        assert!(bus.has_handler("FindPrice"));
    }

    #[tokio::test]
    async fn test_unregistered_query() {
        let bus = QueryBus::new();

        match bus.handle(&Context::new(), logger(), find("pear")).await {
            Err(CqrsError::HandlerNotFound(err)) => {
                assert_eq!(err.kind, RequestKind::Query);
                assert_eq!(err.type_tag, "FindPrice");
            }
            other => panic!("expected HandlerNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unregistered_query_reported_before_fingerprinting() {
        let bus = QueryBus::new();
        let query = FindRoute {
            legs: HashMap::from([((1, 2), 7)]),
        };

        match bus.handle(&Context::new(), logger(), query).await {
            Err(CqrsError::HandlerNotFound(err)) => {
                assert_eq!(err.kind, RequestKind::Query);
                assert_eq!(err.type_tag, "FindRoute");
            }
            other => panic!("expected HandlerNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unfingerprintable_query_is_serialization_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut bus = QueryBus::new();
        let counted = calls.clone();
        bus.register(
            "FindRoute",
            crate::cqrs::handler::handler_fn(move |_ctx: Context, _payload: Payload<FindRoute>| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, CqrsError>(Response::ok(0u32)) }
            }),
            Vec::new(),
        );
        let query = FindRoute {
            legs: HashMap::from([((1, 2), 7)]),
        };

        match bus.handle(&Context::new(), logger(), query).await {
            Err(CqrsError::Application(err)) => assert_eq!(err.code, "SERIALIZATION"),
            other => panic!("expected SERIALIZATION, got {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cached_query_skips_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(QueryCache::new(Duration::from_secs(60), 8));
        let mut bus = QueryBus::new();
        bus.register(
            "FindPrice",
            price_list(calls.clone()),
            vec![Arc::new(CachingMiddleware::new(cache.clone()))],
        );
        let ctx = Context::new();

        assert_eq!(bus.handle(&ctx, logger(), find("apple")).await.unwrap(), 3);
        assert_eq!(bus.handle(&ctx, logger(), find("apple")).await.unwrap(), 3);
        assert!(bus.handle(&ctx, logger(), find("kiwi")).await.is_err());
        assert!(bus.handle(&ctx, logger(), find("kiwi")).await.is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.len(), 1);
    }
}
