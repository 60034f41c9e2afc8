use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::context::Context;
use crate::errors::CqrsResult;
use crate::event_sourcing::core::Event;

use super::dispatcher::EventDispatcher;
use super::event_store::{EventStore, StoredEvent};

// ============================================================================
// Unit of Work - transactional boundary for persistence and dispatch
// ============================================================================
//
// Handlers register an aggregate's uncommitted events, then commit. A
// successful commit is the signal to mark the aggregate's events committed.
//
// The store write is the commit point. Once it succeeds the events are
// durable, so a failing subscriber is logged and does not fail the commit;
// read models lagging behind the stream are rebuilt from it, not by retrying
// a write that already happened.
//
// ============================================================================

#[async_trait]
pub trait UnitOfWork<E: Event>: Send + Sync {
    fn register_events(&self, events: Vec<Arc<E>>);

    async fn commit(&self, ctx: &Context) -> CqrsResult<Vec<StoredEvent<E>>>;

    fn rollback(&self) -> CqrsResult<()>;
}

pub struct EventStoreUnitOfWork<E: Event> {
    store: Arc<dyn EventStore<E>>,
    dispatcher: Option<Arc<dyn EventDispatcher<E>>>,
    pending: Mutex<Vec<Arc<E>>>,
}

impl<E: Event> EventStoreUnitOfWork<E> {
    pub fn new(store: Arc<dyn EventStore<E>>) -> Self {
        Self {
            store,
            dispatcher: None,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher<E>>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn take_pending(&self) -> Vec<Arc<E>> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Put events back in front of anything registered meanwhile
    fn restore_pending(&self, mut events: Vec<Arc<E>>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        events.append(&mut pending);
        *pending = events;
    }
}

#[async_trait]
impl<E: Event + 'static> UnitOfWork<E> for EventStoreUnitOfWork<E> {
    fn register_events(&self, events: Vec<Arc<E>>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events);
    }

    async fn commit(&self, ctx: &Context) -> CqrsResult<Vec<StoredEvent<E>>> {
        let events = self.take_pending();
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let event_count = events.len();
        let stored = match self.store.save(ctx, events.clone()).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(event_count = event_count, error = %err, "Commit failed, events kept pending");
                self.restore_pending(events);
                return Err(err);
            }
        };

        if let Some(dispatcher) = &self.dispatcher {
            if let Err(err) = dispatcher.dispatch(ctx, &stored).await {
                tracing::error!(
                    event_count = event_count,
                    correlation_id = %ctx.correlation_id(),
                    error = %err,
                    "Events persisted but dispatch failed"
                );
            }
        }

        tracing::debug!(
            event_count = event_count,
            correlation_id = %ctx.correlation_id(),
            "Unit of work committed"
        );
        Ok(stored)
    }

    fn rollback(&self) -> CqrsResult<()> {
        let discarded = self.take_pending();
        tracing::debug!(event_count = discarded.len(), "Unit of work rolled back");
        Ok(())
    }
}
