//! Control-channel wire envelopes.
//!
//! A request is `{id?, operation, arguments}`; the terminal response is
//! `{id, result}` on success or `{id, error: {kind, message, retryAfter?}}`
//! on failure. Ids are opaque strings, unique per session lifetime,
//! caller-supplied or server-generated when absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{CoreError, ErrorKind};
use crate::ids::RequestId;

/// Argument mapping for an operation call.
pub type JsonMap = serde_json::Map<String, Value>;

/// One inbound call on the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Correlation id; generated server-side when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Operation name, resolved against the method registry.
    pub operation: String,
    /// Named arguments for the operation.
    #[serde(default)]
    pub arguments: JsonMap,
}

impl RequestEnvelope {
    /// Build an envelope with a caller-supplied id.
    #[must_use]
    pub fn new(id: impl Into<RequestId>, operation: impl Into<String>, arguments: JsonMap) -> Self {
        Self {
            id: Some(id.into()),
            operation: operation.into(),
            arguments,
        }
    }
}

/// Terminal outcome for a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// The originating request id.
    pub id: RequestId,
    /// Result payload or structured error.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

/// Either a result payload or a structured error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePayload {
    /// The operation succeeded.
    Result(Value),
    /// The operation failed with a classified error.
    Error(ErrorBody),
}

impl ResponsePayload {
    /// Whether this payload is an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Structured error body on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Taxonomy classification.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// Suggested wait in seconds before retrying, for `RateLimited`.
    #[serde(
        default,
        rename = "retryAfter",
        alias = "retry_after",
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_after: Option<u64>,
}

impl ResponseEnvelope {
    /// Build a success response.
    #[must_use]
    pub fn result(id: RequestId, value: Value) -> Self {
        Self {
            id,
            payload: ResponsePayload::Result(value),
        }
    }

    /// Build an error response from a [`CoreError`].
    #[must_use]
    pub fn error(id: RequestId, err: &CoreError) -> Self {
        Self {
            id,
            payload: ResponsePayload::Error(ErrorBody {
                kind: err.kind(),
                message: err.to_string(),
                retry_after: err.retry_after().map(|d: Duration| d.as_secs()),
            }),
        }
    }

    /// The error body, if this response is an error.
    #[must_use]
    pub fn error_body(&self) -> Option<&ErrorBody> {
        match &self.payload {
            ResponsePayload::Error(body) => Some(body),
            ResponsePayload::Result(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_id_deserializes() {
        let env: RequestEnvelope =
            serde_json::from_str(r#"{"operation": "get_chats", "arguments": {"limit": 10}}"#)
                .unwrap();
        assert!(env.id.is_none());
        assert_eq!(env.operation, "get_chats");
        assert_eq!(env.arguments.get("limit"), Some(&serde_json::json!(10)));
    }

    #[test]
    fn test_missing_arguments_defaults_empty() {
        let env: RequestEnvelope = serde_json::from_str(r#"{"operation": "get_me"}"#).unwrap();
        assert!(env.arguments.is_empty());
    }

    #[test]
    fn test_result_wire_shape() {
        let resp = ResponseEnvelope::result(RequestId::new("1"), serde_json::json!({"ok": true}));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["id"], "1");
        assert_eq!(json["result"]["ok"], true);
    }

    #[test]
    fn test_error_wire_shape() {
        let err = CoreError::RateLimited {
            reason: "flood wait".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        let resp = ResponseEnvelope::error(RequestId::new("7"), &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["kind"], "RateLimited");
        assert_eq!(json["error"]["retryAfter"], 2);
        assert!(resp.payload.is_error());
    }

    #[test]
    fn test_retry_after_snake_alias_accepted() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"kind": "RateLimited", "message": "slow down", "retry_after": 5}"#,
        )
        .unwrap();
        assert_eq!(body.retry_after, Some(5));
    }

    #[test]
    fn test_auth_error_scenario_shape() {
        let err = CoreError::NotAuthenticated {
            reason: "state is unauthenticated".to_string(),
        };
        let resp = ResponseEnvelope::error(RequestId::new("r1"), &err);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["kind"], "AuthError");
        assert!(json["error"].get("retryAfter").is_none());
    }
}
