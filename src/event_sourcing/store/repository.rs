use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::Context;
use crate::errors::CqrsResult;
use crate::event_sourcing::core::AggregateRoot;

use super::event_store::{EventStore, StoredEvent};
use super::unit_of_work::UnitOfWork;

// ============================================================================
// Aggregate Repository - load by replay, save through a unit of work
// ============================================================================

pub struct AggregateRepository<A: AggregateRoot> {
    store: Arc<dyn EventStore<A::Event>>,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> AggregateRepository<A>
where
    A: AggregateRoot,
    A::Event: 'static,
{
    pub fn new(store: Arc<dyn EventStore<A::Event>>) -> Self {
        Self {
            store,
            _aggregate: PhantomData,
        }
    }

    /// Rebuild an aggregate from its stream. `None` when the stream is empty.
    pub async fn load(&self, ctx: &Context, aggregate_id: &str) -> CqrsResult<Option<A>> {
        let history = self.store.load(ctx, aggregate_id).await?;
        if history.is_empty() {
            return Ok(None);
        }

        let mut aggregate = A::with_id(aggregate_id);
        aggregate.load_from_history(history.into_iter().map(|record| record.event).collect());

        tracing::debug!(
            aggregate_type = A::aggregate_type(),
            aggregate_id = %aggregate_id,
            version = aggregate.version(),
            "Aggregate rehydrated"
        );
        Ok(Some(aggregate))
    }

    /// Like `load`, but a missing stream yields a blank aggregate
    pub async fn load_or_new(&self, ctx: &Context, aggregate_id: &str) -> CqrsResult<A> {
        Ok(self
            .load(ctx, aggregate_id)
            .await?
            .unwrap_or_else(|| A::with_id(aggregate_id)))
    }

    /// Commit the aggregate's uncommitted events. They are only marked
    /// committed once the unit of work succeeds, which is as soon as the
    /// store accepted them.
    pub async fn save(
        &self,
        ctx: &Context,
        aggregate: &A,
        uow: &dyn UnitOfWork<A::Event>,
    ) -> CqrsResult<Vec<StoredEvent<A::Event>>> {
        let entity = aggregate.entity();
        let events = entity.uncommitted_events();
        if events.is_empty() {
            return Ok(Vec::new());
        }

        uow.register_events(events);
        let stored = uow.commit(ctx).await?;
        entity.mark_events_as_committed();

        tracing::info!(
            aggregate_type = A::aggregate_type(),
            aggregate_id = %entity.id(),
            event_count = stored.len(),
            version = entity.sequence_no(),
            "Aggregate saved"
        );
        Ok(stored)
    }
}
