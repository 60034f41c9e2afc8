// ============================================================================
// cqrs_runtime
// ============================================================================
//
// Event-sourced aggregates plus a command/query bus with per-registration
// middleware.
//
//   event_sourcing  Entity bookkeeping, AggregateRoot, store collaborators
//   cqrs            CommandBus / QueryBus, handlers, standard middleware
//
// ============================================================================

pub mod config;
pub mod context;
pub mod cqrs;
pub mod errors;
pub mod event_sourcing;
pub mod logging;
pub mod metrics;
pub mod utils;

pub use config::RuntimeConfig;
pub use context::Context;
pub use cqrs::{CommandBus, QueryBus};
pub use errors::{CqrsError, CqrsResult};
