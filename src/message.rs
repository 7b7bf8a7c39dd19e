//! Message envelope definitions
//!
//! JSON-based envelope shared by the server and the client. On the wire an
//! envelope is a flat object tagged by `type`:
//!
//! ```json
//! {"type": "broadcast", "data": {"anything": true}, "timestamp": "2024-01-01T12:00:00.000Z"}
//! ```
//!
//! In Rust the payload is a tagged union ([`Body`]) keyed by that `type`,
//! with [`Body::Application`] as the opaque-JSON fallback for every type the
//! relay itself doesn't define.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::now_timestamp;

/// Diagnostic sent back to a connection whose frame wasn't valid JSON
pub const INVALID_JSON: &str = "Invalid JSON format";

/// Human-readable text of the welcome envelope
pub const WELCOME_MESSAGE: &str = "WebSocket connection established";

/// Handler key that receives every inbound envelope regardless of type
pub const WILDCARD: &str = "message";

/// One message unit on the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEnvelope", into = "RawEnvelope")]
pub struct Envelope {
    /// Type-specific payload
    pub body: Body,
    /// ISO-8601 emission time, set by the sender
    pub timestamp: Option<String>,
}

/// Envelope payload, discriminated by the wire `type`
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Welcome sent by the server right after accepting a connection
    Connected { message: String },
    /// Another connection's payload, fanned out by the server
    Broadcast { data: Value },
    /// The sender's own payload, returned by the server
    Echo { data: Value },
    /// Protocol error reported to the offending sender only
    Error { error: String },
    /// Any application-defined type, payload kept as opaque JSON
    Application { kind: String, data: Value },
}

impl Envelope {
    fn stamped(body: Body) -> Self {
        Self {
            body,
            timestamp: Some(now_timestamp()),
        }
    }

    /// Welcome envelope with the standard greeting
    pub fn connected() -> Self {
        Self::stamped(Body::Connected {
            message: WELCOME_MESSAGE.to_string(),
        })
    }

    pub fn broadcast(data: Value) -> Self {
        Self::stamped(Body::Broadcast { data })
    }

    pub fn echo(data: Value) -> Self {
        Self::stamped(Body::Echo { data })
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::stamped(Body::Error {
            error: error.into(),
        })
    }

    /// Application-defined envelope
    ///
    /// A `kind` that collides with one of the relay's own types is read back
    /// as that type by the receiver.
    pub fn application(kind: impl Into<String>, data: Value) -> Self {
        Self::stamped(Body::Application {
            kind: kind.into(),
            data,
        })
    }

    /// The wire `type` tag
    pub fn kind(&self) -> &str {
        match &self.body {
            Body::Connected { .. } => "connected",
            Body::Broadcast { .. } => "broadcast",
            Body::Echo { .. } => "echo",
            Body::Error { .. } => "error",
            Body::Application { kind, .. } => kind,
        }
    }

    /// The opaque payload, for types that carry one
    pub fn data(&self) -> Option<&Value> {
        match &self.body {
            Body::Broadcast { data } | Body::Echo { data } | Body::Application { data, .. } => {
                Some(data)
            }
            Body::Connected { .. } | Body::Error { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.body, Body::Error { .. })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Extract the payload the server relays for one inbound frame
///
/// The frame must be valid JSON. When it is an envelope object (a string
/// `type` field) the payload is its `data`, or `null` if absent; any other
/// JSON value is relayed whole.
pub fn payload_from_frame(frame: &[u8]) -> Result<Value, serde_json::Error> {
    let value: Value = serde_json::from_slice(frame)?;
    Ok(match value {
        Value::Object(mut map) if map.get("type").is_some_and(Value::is_string) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    })
}

/// Flat wire shape of an envelope
#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl From<RawEnvelope> for Envelope {
    fn from(raw: RawEnvelope) -> Self {
        let data = raw.data.unwrap_or(Value::Null);
        let body = match raw.kind.as_str() {
            "connected" => Body::Connected {
                message: raw.message.unwrap_or_default(),
            },
            "broadcast" => Body::Broadcast { data },
            "echo" => Body::Echo { data },
            "error" => Body::Error {
                error: raw.error.unwrap_or_default(),
            },
            _ => Body::Application {
                kind: raw.kind,
                data,
            },
        };
        Envelope {
            body,
            timestamp: raw.timestamp,
        }
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        let mut raw = RawEnvelope {
            kind: envelope.kind().to_string(),
            message: None,
            data: None,
            error: None,
            timestamp: envelope.timestamp,
        };
        match envelope.body {
            Body::Connected { message } => raw.message = Some(message),
            Body::Broadcast { data } | Body::Echo { data } | Body::Application { data, .. } => {
                raw.data = Some(data)
            }
            Body::Error { error } => raw.error = Some(error),
        }
        raw
    }
}
