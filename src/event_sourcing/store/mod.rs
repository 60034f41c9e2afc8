// ============================================================================
// Event Sourcing Store - Generic Persistence Layer
// ============================================================================
//
// This module contains GENERIC persistence infrastructure for event sourcing.
// All components work with ANY aggregate/event type.
//
// ============================================================================

pub mod dispatcher;
pub mod event_store;
pub mod repository;
pub mod unit_of_work;

pub use dispatcher::{EventDispatcher, EventHandler, InMemoryEventDispatcher};
pub use event_store::{EventStore, InMemoryEventStore, StoredEvent};
pub use repository::AggregateRepository;
pub use unit_of_work::{EventStoreUnitOfWork, UnitOfWork};
