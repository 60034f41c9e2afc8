// ============================================================================
// CQRS - command and query dispatch
// ============================================================================
//
// Requests are routed by type tag to a handler composed once, at
// registration, from the handler and its middleware chain.
//
// ============================================================================

mod bus;
pub mod command_bus;
pub mod envelope;
pub mod handler;
pub mod message;
pub mod middleware;
pub mod query_bus;

pub use command_bus::CommandBus;
pub use envelope::{AnyOutput, Body, Payload, Response};
pub use handler::{compose, from_fn, handler_fn, BoxedPayload, BoxedResponse, FnHandler, Handler, HandlerFn, Middleware};
pub use message::{AsAny, Command, Message, Query, Request, RequestKind};
pub use query_bus::QueryBus;
