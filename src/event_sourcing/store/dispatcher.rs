use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::context::Context;
use crate::errors::{CqrsResult, ValidationError};
use crate::event_sourcing::core::Event;

use super::event_store::StoredEvent;

// ============================================================================
// Event Dispatcher - fan-out of committed events to subscribers
// ============================================================================

#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    async fn handle(&self, ctx: &Context, event: &StoredEvent<E>) -> CqrsResult<()>;
}

#[async_trait]
pub trait EventDispatcher<E: Event>: Send + Sync {
    async fn dispatch(&self, ctx: &Context, events: &[StoredEvent<E>]) -> CqrsResult<()>;

    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler<E>>) -> CqrsResult<()>;
}

/// Calls the subscribers of each event's type, in subscription order.
/// The first failing subscriber aborts the dispatch.
pub struct InMemoryEventDispatcher<E: Event> {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler<E>>>>>,
}

impl<E: Event> InMemoryEventDispatcher<E> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub fn subscriber_count(&self, event_type: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .map_or(0, Vec::len)
    }

    fn handlers_for(&self, event_type: &str) -> Vec<Arc<dyn EventHandler<E>>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event_type)
            .cloned()
            .unwrap_or_default()
    }
}

impl<E: Event> Default for InMemoryEventDispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E: Event + 'static> EventDispatcher<E> for InMemoryEventDispatcher<E> {
    async fn dispatch(&self, ctx: &Context, events: &[StoredEvent<E>]) -> CqrsResult<()> {
        for record in events {
            let event_type = record.event.event_type();
            // Snapshot so no lock is held while subscribers run
            let handlers = self.handlers_for(event_type);

            for handler in handlers {
                if let Err(err) = handler.handle(ctx, record).await {
                    tracing::error!(
                        event_type = %event_type,
                        aggregate_id = %record.event.aggregate_id(),
                        sequence_no = record.event.sequence_no(),
                        error = %err,
                        "Event subscriber failed"
                    );
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler<E>>) -> CqrsResult<()> {
        if event_type.trim().is_empty() {
            return Err(ValidationError::new("event_type", "must not be empty").into());
        }

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event_type.to_string())
            .or_default()
            .push(handler);

        tracing::debug!(event_type = %event_type, "Subscribed event handler");
        Ok(())
    }
}
