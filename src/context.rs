use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::logging::{Logger, TracingLogger};

// ============================================================================
// Context - correlation id, logger and request-scoped values
// ============================================================================

/// Per-call context threaded through every handler and middleware.
///
/// The bus never inspects it for cancellation; honouring deadlines is up to
/// handlers and the collaborators they call.
#[derive(Clone)]
pub struct Context {
    correlation_id: Uuid,
    logger: Arc<dyn Logger>,
    values: HashMap<String, String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            logger: Arc::new(TracingLogger),
            values: HashMap::new(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("correlation_id", &self.correlation_id)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, RecordingLogger};

    #[test]
    fn test_values_and_correlation_id() {
        let id = Uuid::new_v4();
        let ctx = Context::new()
            .with_correlation_id(id)
            .with_value("tenant", "acme")
            .with_value("tenant", "globex");

        assert_eq!(ctx.correlation_id(), id);
        assert_eq!(ctx.value("tenant"), Some("globex"));
        assert_eq!(ctx.value("region"), None);
        assert_eq!(ctx.clone().value("tenant"), Some("globex"));
    }

    #[test]
    fn test_logger_is_swappable() {
        let logger = Arc::new(RecordingLogger::new());
        let ctx = Context::new().with_logger(logger.clone());

        ctx.logger().warn("careful", &[]);

        assert_eq!(logger.entries_at(LogLevel::Warn).len(), 1);
    }
}
