// sa-protocol: SocketAPI wire protocol types and serialization.
//
// Every frame is a JSON object with a top-level `type` field used for
// discriminated deserialization.  The server accepts only text frames.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON object payload attached to a frame (`data` fields).
pub type Payload = Map<String, Value>;

// ---------------------------------------------------------------------------
// Client -> Server frames
// ---------------------------------------------------------------------------

/// All frame kinds a client may send.
///
/// `data` defaults to an empty object when omitted on `action` and
/// `subscribe`; `unsubscribe` carries no payload.
///
/// ```json
/// { "type": "action", "channel": "add", "data": { "a": 5, "b": 3 } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Action {
        channel: String,
        #[serde(default)]
        data: Payload,
    },
    Subscribe {
        channel: String,
        #[serde(default)]
        data: Payload,
    },
    Unsubscribe { channel: String },
}

// ---------------------------------------------------------------------------
// Server -> Client frames
// ---------------------------------------------------------------------------

/// Status of a completed action response.  The wire value is frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Completed,
}

/// All frame kinds the server may emit.
///
/// An `action` response omits `data` entirely when the handler returned
/// nothing.  `data` frames are broadcast deliveries to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    Action {
        channel: String,
        status: ActionStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Data { channel: String, data: Value },
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Broadcast ingress (HTTP)
// ---------------------------------------------------------------------------

/// Body of `POST /broadcast`: trigger a fan-out from outside any session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub channel: String,
    #[serde(default)]
    pub data: Payload,
}

/// JSON envelope used by non-2xx ingress responses.  Never reaches
/// WebSocket clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Frozen error message strings
// ---------------------------------------------------------------------------

/// Wire `error` frame messages.  The formats are part of the protocol
/// contract and must not drift.
pub mod messages {
    pub fn action_not_found(name: &str) -> String {
        format!("Action '{}' not found.", name)
    }

    pub fn channel_not_found(name: &str) -> String {
        format!("Channel '{}' not found.", name)
    }

    /// Used verbatim for channels as well as actions.
    pub fn invalid_parameters(name: &str) -> String {
        format!("Invalid parameters for action '{}'", name)
    }

    /// Generic message for a handler that raised; details stay in the log.
    pub const HANDLER_FAULT: &str = "Internal server error.";

    /// Frame that failed top-level decoding (bad JSON, unknown `type`,
    /// missing `channel`).
    pub const MALFORMED_FRAME: &str = "Malformed frame.";
}
