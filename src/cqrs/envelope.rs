use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::errors::{ApplicationError, CqrsError, CqrsResult};

use super::message::{AsAny, Command, Message, Query, Request, RequestKind};

// ============================================================================
// Envelopes - what actually flows through a composed handler
// ============================================================================
//
// `Body` is the tagged request variant: a kind discriminator, the type tag,
// and the request itself behind `Arc<dyn Message>`. Middleware only ever
// sees the `Body`; the concrete type is recovered once, at the handler.
//
// ============================================================================

/// Type-erased handler output
pub type AnyOutput = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Body {
    kind: RequestKind,
    type_tag: &'static str,
    message: Arc<dyn Message>,
    fingerprint: Option<String>,
}

impl Body {
    pub fn command<C: Command>(command: C) -> Self {
        Self {
            kind: RequestKind::Command,
            type_tag: command.type_tag(),
            message: Arc::new(command),
            fingerprint: None,
        }
    }

    /// Queries carry a fingerprint of their field values: canonical JSON,
    /// object keys sorted.
    pub fn query<Q: Query>(query: Q) -> CqrsResult<Self> {
        let fingerprint = serde_json::to_value(&query)?.to_string();
        Ok(Self {
            kind: RequestKind::Query,
            type_tag: query.type_tag(),
            message: Arc::new(query),
            fingerprint: Some(fingerprint),
        })
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn type_tag(&self) -> &'static str {
        self.type_tag
    }

    pub fn message(&self) -> &dyn Message {
        &*self.message
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Recover the concrete request. `None` if the body holds another type.
    pub fn downcast<R: Request>(&self) -> Option<R> {
        AsAny::as_any(&*self.message).downcast_ref::<R>().cloned()
    }
}

/// Request envelope
#[derive(Debug, Clone)]
pub struct Payload<T> {
    pub data: T,
    pub metadata: HashMap<String, String>,
    pub trace_id: String,
    pub user_id: Option<String>,
}

impl<T> Payload<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            metadata: HashMap::new(),
            trace_id: Uuid::new_v4().to_string(),
            user_id: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = trace_id.into();
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Payload<U> {
        Payload {
            data: f(self.data),
            metadata: self.metadata,
            trace_id: self.trace_id,
            user_id: self.user_id,
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Payload<U>, E> {
        Ok(Payload {
            data: f(self.data)?,
            metadata: self.metadata,
            trace_id: self.trace_id,
            user_id: self.user_id,
        })
    }
}

/// Response envelope. A set `error` means failure even if `data` is present.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub data: Option<T>,
    pub metadata: HashMap<String, String>,
    pub error: Option<CqrsError>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            metadata: HashMap::new(),
            error: None,
        }
    }

    pub fn failed(error: impl Into<CqrsError>) -> Self {
        Self {
            data: None,
            metadata: HashMap::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            data: self.data.map(f),
            metadata: self.metadata,
            error: self.error,
        }
    }

    /// Collapse both failure channels into one `Result`
    pub fn into_result(self) -> CqrsResult<T> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.data.ok_or_else(|| {
            ApplicationError::new("EMPTY_RESPONSE", "handler returned neither data nor error").into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize)]
    struct FindUser {
        name: String,
        active: bool,
    }

    impl Message for FindUser {
        fn type_tag(&self) -> &'static str {
            "FindUser"
        }
    }

    impl Request for FindUser {
        type Output = u32;
    }

    impl Query for FindUser {}

    #[derive(Debug, Clone)]
    struct Rename;

    impl Message for Rename {
        fn type_tag(&self) -> &'static str {
            "Rename"
        }
    }

    impl Request for Rename {
        type Output = ();
    }

    impl Command for Rename {}

    #[test]
    fn test_query_body_fingerprint_has_sorted_keys() {
        let body = Body::query(FindUser {
            name: "ada".to_string(),
            active: true,
        })
        .unwrap();

        assert_eq!(body.kind(), RequestKind::Query);
        assert_eq!(body.type_tag(), "FindUser");
        assert_eq!(body.fingerprint(), Some(r#"{"active":true,"name":"ada"}"#));
        assert_eq!(body.downcast::<FindUser>().unwrap().name, "ada");
        assert!(body.downcast::<Rename>().is_none());
    }

    #[test]
    fn test_command_body_has_no_fingerprint() {
        let body = Body::command(Rename);

        assert_eq!(body.kind(), RequestKind::Command);
        assert!(body.fingerprint().is_none());
        assert!(body.message().validate().is_ok());
    }

    #[test]
    fn test_payload_map_keeps_envelope() {
        let payload = Payload::new(2)
            .with_metadata("source", "test")
            .with_user("u-1")
            .with_trace_id("trace-1");

        let mapped = payload.map(|n| n * 10);

        assert_eq!(mapped.data, 20);
        assert_eq!(mapped.trace_id, "trace-1");
        assert_eq!(mapped.user_id.as_deref(), Some("u-1"));
        assert_eq!(mapped.metadata.get("source").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_response_into_result_checks_both_channels() {
        assert_eq!(Response::ok(5).into_result().unwrap(), 5);

        let mut with_error = Response::ok(5);
        with_error.error = Some(ValidationError::new("amount", "negative").into());
        assert!(matches!(with_error.into_result(), Err(CqrsError::Validation(_))));

        let empty: Response<u32> = Response {
            data: None,
            metadata: HashMap::new(),
            error: None,
        };
        match empty.into_result() {
            Err(CqrsError::Application(err)) => assert_eq!(err.code, "EMPTY_RESPONSE"),
            other => panic!("expected EMPTY_RESPONSE, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_response() {
        let response: Response<u32> =
            Response::failed(ApplicationError::new("NOPE", "no")).with_metadata("attempt", "1");

        assert!(!response.is_success());
        assert_eq!(response.metadata.len(), 1);
    }
}
