use std::any::Any;
use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::Serialize;

use crate::errors::ValidationError;

// ============================================================================
// Messages - commands and queries routed by type tag
// ============================================================================

/// Which bus a request belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Command,
    Query,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Command => "command",
            RequestKind::Query => "query",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upcasting helper so erased messages can be recovered as their concrete type
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Anything that can travel through a bus
pub trait Message: AsAny + Debug {
    /// Routing key the bus resolves the handler by
    fn type_tag(&self) -> &'static str;

    /// Checked by `ValidationMiddleware` before the handler runs
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// A typed request with a typed result
pub trait Request: Message + Clone {
    type Output: Clone + Send + Sync + 'static;
}

/// Intent to change state
pub trait Command: Request {}

/// Read of state. Field values feed the query cache key, hence `Serialize`.
pub trait Query: Request + Serialize {}
