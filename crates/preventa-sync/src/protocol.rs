//! # Sync Protocol Messages
//!
//! Message types exchanged with the backend over the WebSocket transport.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Sync Protocol Messages                             │
//! │                                                                         │
//! │  HANDSHAKE (sent on every (re)connect)                                 │
//! │  ─────────                                                             │
//! │  DEVICE  ───► Hello { device_id, user_id, protocol_version }           │
//! │                                                                         │
//! │  RECORD OPERATIONS                                                     │
//! │  ─────────────────                                                     │
//! │  DEVICE  ───► Request  { request_id, op: select | insert | update }    │
//! │  BACKEND ◄─── Response { request_id, reply: rows | ack | rejected |    │
//! │                                              conflict | failed }       │
//! │                                                                         │
//! │  KEEPALIVE                                                             │
//! │  ─────────                                                             │
//! │  Both    ◄──► Ping { timestamp } / Pong { timestamp }                  │
//! │                                                                         │
//! │  ERROR (not tied to a request)                                         │
//! │  Both    ◄──► Error { code, message }                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Adjacently tagged JSON:
//! ```json
//! { "type": "Request", "payload": { "request_id": "...", "op": { "kind": "select", ... } } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{RemoteError, RemoteResult};
use crate::remote::Filter;

/// Current protocol version.
pub const PROTOCOL_VERSION: u32 = 1;

// =============================================================================
// Main Message Enum (Tagged Union)
// =============================================================================

/// All sync protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum SyncMessage {
    /// Identifies the device after connecting.
    Hello(HelloPayload),

    /// A record operation.
    Request(Request),

    /// The answer to a [`Request`], matched by `request_id`.
    Response(Response),

    /// Ping for keepalive.
    Ping { timestamp: String },

    /// Pong response for keepalive.
    Pong {
        ping_timestamp: String,
        pong_timestamp: String,
    },

    /// Error message.
    Error { code: String, message: String },
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    pub device_id: String,

    #[serde(default)]
    pub user_id: Option<String>,

    pub protocol_version: u32,
}

/// What a request asks the backend to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    Select { collection: String, filter: Filter },
    Insert { collection: String, record: Value },
    Update { collection: String, id: String, patch: Value },
}

impl Operation {
    pub fn collection(&self) -> &str {
        match self {
            Operation::Select { collection, .. }
            | Operation::Insert { collection, .. }
            | Operation::Update { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub op: Operation,
}

impl Request {
    /// Wraps `op` with a fresh request id.
    pub fn new(op: Operation) -> Self {
        Request {
            request_id: Uuid::new_v4().to_string(),
            op,
        }
    }
}

/// Outcome of a request as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// Select result.
    Rows { rows: Vec<Value> },

    /// Write accepted.
    Ack,

    /// Write refused.
    Rejected { message: String },

    /// Duplicate id on insert.
    Conflict { message: String },

    /// Backend-side failure unrelated to the record.
    Failed { message: String },
}

impl Reply {
    /// Converts a select answer into rows.
    pub fn into_rows(self) -> RemoteResult<Vec<Value>> {
        match self {
            Reply::Rows { rows } => Ok(rows),
            Reply::Ack => Err(RemoteError::Protocol("expected rows, got ack".into())),
            other => Err(other.into_error()),
        }
    }

    /// Converts a write answer into success or failure.
    pub fn into_ack(self) -> RemoteResult<()> {
        match self {
            Reply::Ack => Ok(()),
            Reply::Rows { .. } => Err(RemoteError::Protocol("expected ack, got rows".into())),
            other => Err(other.into_error()),
        }
    }

    fn into_error(self) -> RemoteError {
        match self {
            Reply::Rejected { message } => RemoteError::Rejected(message),
            Reply::Conflict { message } => RemoteError::Conflict(message),
            Reply::Failed { message } => RemoteError::Network(message),
            Reply::Rows { .. } | Reply::Ack => RemoteError::Protocol("unexpected reply".into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: String,
    pub reply: Reply,
}

// =============================================================================
// Helper Functions
// =============================================================================

impl SyncMessage {
    /// Returns the message type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            SyncMessage::Hello(_) => "Hello",
            SyncMessage::Request(_) => "Request",
            SyncMessage::Response(_) => "Response",
            SyncMessage::Ping { .. } => "Ping",
            SyncMessage::Pong { .. } => "Pong",
            SyncMessage::Error { .. } => "Error",
        }
    }

    /// Creates a Hello message.
    pub fn hello(device_id: &str, user_id: Option<&str>) -> Self {
        SyncMessage::Hello(HelloPayload {
            device_id: device_id.to_string(),
            user_id: user_id.map(str::to_string),
            protocol_version: PROTOCOL_VERSION,
        })
    }

    /// Creates a Pong message.
    pub fn pong(ping_timestamp: &str) -> Self {
        SyncMessage::Pong {
            ping_timestamp: ping_timestamp.to_string(),
            pong_timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = Request::new(Operation::Insert {
            collection: "orders".into(),
            record: json!({"id": "o-1"}),
        });
        let id = request.request_id.clone();
        let json = SyncMessage::Request(request).to_json().unwrap();
        assert!(json.contains("\"type\":\"Request\""));
        assert!(json.contains("\"kind\":\"insert\""));
        assert!(json.contains(&id));

        match SyncMessage::from_json(&json).unwrap() {
            SyncMessage::Request(req) => {
                assert_eq!(req.request_id, id);
                assert_eq!(req.op.collection(), "orders");
            }
            other => panic!("Expected Request, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"type":"Response","payload":{"request_id":"r-1","reply":{"status":"conflict","message":"orders/o-1"}}}"#;
        let SyncMessage::Response(resp) = SyncMessage::from_json(json).unwrap() else {
            panic!("Expected Response");
        };
        assert_eq!(resp.request_id, "r-1");
        assert_eq!(
            resp.reply.into_ack(),
            Err(RemoteError::Conflict("orders/o-1".into()))
        );
    }

    #[test]
    fn test_reply_conversions() {
        let rows = Reply::Rows { rows: vec![json!({"id": "c1"})] };
        assert_eq!(rows.clone().into_rows().unwrap().len(), 1);
        assert!(matches!(rows.into_ack(), Err(RemoteError::Protocol(_))));

        assert!(Reply::Ack.into_ack().is_ok());
        assert!(Reply::Failed { message: "db down".into() }
            .into_rows()
            .unwrap_err()
            .is_transient());
    }

    #[test]
    fn test_hello_and_error_messages() {
        let hello = SyncMessage::hello("dev-1", Some("chofer-01")).to_json().unwrap();
        assert!(hello.contains("\"protocol_version\":1"));

        let error = r#"{"type":"Error","payload":{"code":"UNAUTHORIZED","message":"unknown device"}}"#;
        assert!(matches!(
            SyncMessage::from_json(error).unwrap(),
            SyncMessage::Error { ref code, .. } if code == "UNAUTHORIZED"
        ));
    }
}
