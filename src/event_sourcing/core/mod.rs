// ============================================================================
// Event Sourcing Core - Generic Infrastructure Abstractions
// ============================================================================
//
// This module contains GENERIC, reusable event sourcing infrastructure
// that works with ANY domain aggregate.
//
// Key Principles:
// - No domain-specific code
// - Generic over event types
// - Reusable across all aggregates
//
// ============================================================================

pub mod aggregate;
pub mod entity;
pub mod event;

// Re-export core types for convenience
pub use aggregate::AggregateRoot;
pub use entity::Entity;
pub use event::{DomainEvent, Event, EventEnvelope};
