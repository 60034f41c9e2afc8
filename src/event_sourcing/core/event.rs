use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Debug;

// ============================================================================
// Event Contract
// ============================================================================
//
// An event is an immutable fact about one aggregate. The only mutation ever
// performed on it is the sequence number assignment made by the owning
// aggregate when the event is added.
//
// ============================================================================

pub trait Event: Send + Sync + Debug {
    /// Type tag used for routing and subscriptions
    fn event_type(&self) -> &str;

    fn aggregate_id(&self) -> &str;

    /// 0 until the owning aggregate assigns it
    fn sequence_no(&self) -> i64;

    fn set_sequence_no(&mut self, sequence_no: i64);

    fn occurred_at(&self) -> DateTime<Utc>;

    fn metadata(&self) -> Option<&HashMap<String, String>> {
        None
    }
}

/// Domain payload carried by an `EventEnvelope`
pub trait DomainEvent: Send + Sync + Debug {
    fn event_type() -> &'static str where Self: Sized;
    fn event_version() -> i32 where Self: Sized { 1 }
}

// ============================================================================
// Event Envelope - the concrete event type
// ============================================================================
//
// Wraps a domain payload with identity, ordering, tracing and audit data.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: String,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation (for distributed tracing)
    pub causation_id: Option<Uuid>,
    pub correlation_id: Uuid,

    // Actor Information
    pub user_id: Option<String>,

    // Timing
    pub timestamp: DateTime<Utc>,

    // Additional Metadata
    pub metadata: HashMap<String, String>,
}

impl<E> EventEnvelope<E> {
    pub fn new(aggregate_id: impl Into<String>, event_type: impl Into<String>, event_data: E) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            sequence_number: 0,
            event_type: event_type.into(),
            event_version: 1,
            event_data,
            causation_id: None,
            correlation_id: Uuid::new_v4(),
            user_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl<E: DomainEvent> EventEnvelope<E> {
    /// Envelope whose type tag and schema version come from the payload type
    pub fn for_event(aggregate_id: impl Into<String>, event_data: E) -> Self {
        let mut envelope = Self::new(aggregate_id, E::event_type(), event_data);
        envelope.event_version = E::event_version();
        envelope
    }
}

impl<E: Send + Sync + Debug> Event for EventEnvelope<E> {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn sequence_no(&self) -> i64 {
        self.sequence_number
    }

    fn set_sequence_no(&mut self, sequence_no: i64) {
        self.sequence_number = sequence_no;
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn metadata(&self) -> Option<&HashMap<String, String>> {
        Some(&self.metadata)
    }
}

// ============================================================================
// Tests
// ============================================================================
