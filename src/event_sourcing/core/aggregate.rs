use std::sync::Arc;

use super::entity::Entity;
use super::event::Event;

// ============================================================================
// Aggregate Root Pattern - Event Sourcing Core
// ============================================================================
//
// Key Principles:
// 1. State is derived from events (not stored directly)
// 2. Commands are validated before emitting events
// 3. Events represent facts that have already happened
// 4. Aggregates enforce business invariants
// 5. All state changes flow through events
//
// A concrete aggregate embeds an `Entity` for bookkeeping and only
// implements the domain-specific `apply`.
//
// ============================================================================

pub trait AggregateRoot: Send + Sync {
    type Event: Event;

    /// Blank aggregate with the given identity, before any event
    fn with_id(id: &str) -> Self
    where
        Self: Sized;

    /// Aggregate type name (for logging and storage)
    fn aggregate_type() -> &'static str
    where
        Self: Sized;

    fn entity(&self) -> &Entity<Self::Event>;

    /// Domain state transition for one event. Must not validate: the event
    /// has already happened.
    fn apply(&mut self, event: &Self::Event);

    fn id(&self) -> &str {
        self.entity().id()
    }

    /// Number of events applied so far
    fn version(&self) -> i64 {
        self.entity().sequence_no()
    }

    /// Add a freshly decided event and apply it to domain state
    fn record(&mut self, event: Self::Event) -> Arc<Self::Event> {
        let event = self.entity().add_event(event);
        self.apply(&event);
        event
    }

    /// Rebuild domain state from history, then hand bookkeeping to the entity
    fn load_from_history(&mut self, events: Vec<Arc<Self::Event>>) {
        for event in &events {
            self.apply(event);
        }
        self.entity().load_from_history(events);
    }
}

// ============================================================================
// Tests
// ============================================================================
