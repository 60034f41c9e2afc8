// ============================================================================
// Standard Middleware
// ============================================================================
//
// Reusable decorators built on `Middleware`. A typical registration order is
//
//   [ErrorHandling, Logging, Metrics, Validation, Caching]
//
// with error handling outermost, so a panic in any inner layer is recovered.
//
// ============================================================================

pub mod caching;
pub mod error_handling;
pub mod logging;
pub mod metrics;
pub mod validation;

pub use caching::{CachingMiddleware, QueryCache};
pub use error_handling::ErrorHandlingMiddleware;
pub use logging::LoggingMiddleware;
pub use metrics::MetricsMiddleware;
pub use validation::ValidationMiddleware;
