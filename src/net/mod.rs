pub mod controller;
pub mod reconnect;

pub use controller::{ConnectionController, ConnectionHandle};
pub use reconnect::{ReconnectContext, ReconnectPolicy};

use serde::Serialize;

/// Connection lifecycle state, owned exclusively by the controller task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        }
    }
}

/// An outbound frame; delivery is best-effort and at-most-once
#[derive(Debug, Clone)]
pub enum WireFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Inbound messages published by the controller's receive loop
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Text(String),
    Binary(Vec<u8>),
}

/// Handshake frame sent once immediately after the socket opens
#[derive(Debug, Serialize)]
pub struct StartSessionFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session_id: &'a str,
}

impl<'a> StartSessionFrame<'a> {
    pub fn new(session_id: &'a str) -> Self {
        Self {
            kind: "start_session",
            session_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_session_frame_json() {
        let json = serde_json::to_string(&StartSessionFrame::new("abc")).unwrap();
        assert_eq!(json, r#"{"type":"start_session","session_id":"abc"}"#);
    }

    #[test]
    fn test_state_names() {
        assert_eq!(ConnectionState::Reconnecting.as_str(), "reconnecting");
    }
}
