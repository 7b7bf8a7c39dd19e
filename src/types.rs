//! Basic type definitions for the relay
//!
//! - `ConnectionId`: UUID-based identity of one accepted socket
//! - `now_timestamp`: ISO-8601 emission time carried by every envelope

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Each accepted socket gets a fresh one, and an id is
/// never handed out twice, so a closed connection can't be confused with
/// a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current UTC time as an ISO-8601 string with millisecond precision
///
/// Matches the `2024-01-01T12:00:00.000Z` shape browsers produce.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
