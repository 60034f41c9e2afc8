use std::error::Error as StdError;
use std::sync::Arc;

use crate::cqrs::RequestKind;

// ============================================================================
// Error Taxonomy
// ============================================================================
//
// Every failure surfaced by the aggregate core, the collaborators and the
// buses is one of the kinds below. `CqrsError` is the crate-wide carrier.
//
// ============================================================================

/// Shared, cloneable cause attached to an `ApplicationError`
pub type ErrorCause = Arc<dyn StdError + Send + Sync + 'static>;

/// A field-level validation or business-rule failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed on {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Optimistic concurrency conflict on an aggregate stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
pub struct ConcurrencyError {
    pub aggregate_id: String,
    pub expected: i64,
    pub actual: i64,
}

/// No handler registered for a type tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no {kind} handler registered for type {type_tag}")]
pub struct HandlerNotFoundError {
    pub type_tag: String,
    pub kind: RequestKind,
}

/// Generic wrapped failure with a stable code
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApplicationError {
    pub code: String,
    pub message: String,
    #[source]
    pub cause: Option<ErrorCause>,
}

impl ApplicationError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: ErrorCause) -> Self {
        self.cause = Some(cause);
        self
    }
}

/// `merge_events_from` was given no source aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot merge events from a missing source aggregate")]
pub struct NilSourceError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CqrsError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    #[error(transparent)]
    HandlerNotFound(#[from] HandlerNotFoundError),

    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error(transparent)]
    NilSource(#[from] NilSourceError),

    /// Anything raised by a handler or collaborator that is not one of the
    /// kinds above
    #[error("{0}")]
    Other(ErrorCause),
}

/// Crate-wide Result type
pub type CqrsResult<T> = Result<T, CqrsError>;

impl CqrsError {
    /// Wrap any foreign error as `Other`
    pub fn other<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        CqrsError::Other(Arc::new(err))
    }

    /// True for every variant of the taxonomy, false for `Other`
    pub fn is_known(&self) -> bool {
        !matches!(self, CqrsError::Other(_))
    }

    /// Stable short name of the error kind (used as a log/metric field)
    pub fn kind(&self) -> &'static str {
        match self {
            CqrsError::Validation(_) => "validation",
            CqrsError::Concurrency(_) => "concurrency",
            CqrsError::HandlerNotFound(_) => "handler_not_found",
            CqrsError::Application(_) => "application",
            CqrsError::NilSource(_) => "nil_source",
            CqrsError::Other(_) => "other",
        }
    }

    /// Shared handle to this error, usable as an `ApplicationError` cause
    pub fn into_cause(self) -> ErrorCause {
        match self {
            CqrsError::Other(cause) => cause,
            known => Arc::new(known),
        }
    }
}

impl From<anyhow::Error> for CqrsError {
    fn from(err: anyhow::Error) -> Self {
        let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
        CqrsError::Other(Arc::from(boxed))
    }
}

impl From<serde_json::Error> for CqrsError {
    fn from(err: serde_json::Error) -> Self {
        CqrsError::Application(
            ApplicationError::new("SERIALIZATION", err.to_string()).with_cause(Arc::new(err)),
        )
    }
}
