use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::errors::{ConcurrencyError, CqrsResult};
use crate::event_sourcing::core::Event;

// ============================================================================
// Event Store - Repository for Events
// ============================================================================
//
// Responsibilities:
// 1. Append events to per-aggregate streams (append-only)
// 2. Load event history for aggregates
// 3. Ensure optimistic concurrency control
//
// The byte layout of persisted events is the store's own concern; the core
// only ever sees `StoredEvent` envelopes.
//
// ============================================================================

/// An event as persisted by a store
#[derive(Debug)]
pub struct StoredEvent<E> {
    /// Position in the store-wide log, starting at 1
    pub position: u64,
    pub stored_at: DateTime<Utc>,
    pub event: Arc<E>,
}

impl<E> Clone for StoredEvent<E> {
    fn clone(&self) -> Self {
        Self {
            position: self.position,
            stored_at: self.stored_at,
            event: Arc::clone(&self.event),
        }
    }
}

#[async_trait]
pub trait EventStore<E: Event>: Send + Sync {
    /// Append events; each aggregate's events must continue its stream
    async fn save(&self, ctx: &Context, events: Vec<Arc<E>>) -> CqrsResult<Vec<StoredEvent<E>>>;

    /// Full history of one aggregate, in sequence order
    async fn load(&self, ctx: &Context, aggregate_id: &str) -> CqrsResult<Vec<StoredEvent<E>>>;

    /// History of one aggregate starting at sequence number `from` (inclusive)
    async fn load_from_sequence(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        from: i64,
    ) -> CqrsResult<Vec<StoredEvent<E>>>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug)]
struct Streams<E> {
    by_aggregate: HashMap<String, Vec<StoredEvent<E>>>,
    last_position: u64,
}

#[derive(Debug)]
pub struct InMemoryEventStore<E> {
    streams: RwLock<Streams<E>>,
}

impl<E: Event> InMemoryEventStore<E> {
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(Streams {
                by_aggregate: HashMap::new(),
                last_position: 0,
            }),
        }
    }

    /// Current version (length) of an aggregate stream
    pub fn stream_version(&self, aggregate_id: &str) -> i64 {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);
        streams
            .by_aggregate
            .get(aggregate_id)
            .map_or(0, |stream| stream.len() as i64)
    }

    /// Total number of events across all streams
    pub fn event_count(&self) -> u64 {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_position
    }
}

impl<E: Event> Default for InMemoryEventStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Every aggregate's slice of the batch must start right after its stream
/// head and stay contiguous.
fn check_batch<E: Event>(streams: &Streams<E>, events: &[Arc<E>]) -> Result<(), ConcurrencyError> {
    let mut heads: HashMap<&str, i64> = HashMap::new();

    for event in events {
        let aggregate_id = event.aggregate_id();
        let head = heads.entry(aggregate_id).or_insert_with(|| {
            streams
                .by_aggregate
                .get(aggregate_id)
                .map_or(0, |stream| stream.len() as i64)
        });

        if event.sequence_no() != *head + 1 {
            return Err(ConcurrencyError {
                aggregate_id: aggregate_id.to_string(),
                expected: event.sequence_no() - 1,
                actual: *head,
            });
        }
        *head += 1;
    }

    Ok(())
}

#[async_trait]
impl<E: Event + 'static> EventStore<E> for InMemoryEventStore<E> {
    async fn save(&self, _ctx: &Context, events: Vec<Arc<E>>) -> CqrsResult<Vec<StoredEvent<E>>> {
        if events.is_empty() {
            return Ok(Vec::new());
        }

        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);

        if let Err(conflict) = check_batch(&streams, &events) {
            tracing::warn!(
                aggregate_id = %conflict.aggregate_id,
                expected = conflict.expected,
                actual = conflict.actual,
                "Rejected stale event batch"
            );
            return Err(conflict.into());
        }

        let stored_at = Utc::now();
        let mut stored = Vec::with_capacity(events.len());

        for event in events {
            streams.last_position += 1;
            let record = StoredEvent {
                position: streams.last_position,
                stored_at,
                event,
            };
            streams
                .by_aggregate
                .entry(record.event.aggregate_id().to_string())
                .or_default()
                .push(record.clone());
            stored.push(record);
        }

        tracing::debug!(
            event_count = stored.len(),
            last_position = streams.last_position,
            "Appended events to in-memory store"
        );

        Ok(stored)
    }

    async fn load(&self, ctx: &Context, aggregate_id: &str) -> CqrsResult<Vec<StoredEvent<E>>> {
        self.load_from_sequence(ctx, aggregate_id, 1).await
    }

    async fn load_from_sequence(
        &self,
        _ctx: &Context,
        aggregate_id: &str,
        from: i64,
    ) -> CqrsResult<Vec<StoredEvent<E>>> {
        let streams = self.streams.read().unwrap_or_else(PoisonError::into_inner);

        let events: Vec<StoredEvent<E>> = streams
            .by_aggregate
            .get(aggregate_id)
            .map(|stream| {
                stream
                    .iter()
                    .filter(|record| record.event.sequence_no() >= from)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        tracing::debug!(aggregate_id = %aggregate_id, from = from, count = events.len(), "Loaded events");
        Ok(events)
    }
}
