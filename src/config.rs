//! Configuration for the streaming client
//!
//! Centralizes the endpoint, session identity, trigger phrases and reconnect
//! parameters used across the components.

use crate::net::reconnect::ReconnectPolicy;
use std::path::PathBuf;
use url::Url;

/// Trigger phrases scanned for in the normalized transcript window
#[derive(Clone, Debug)]
pub struct PhraseConfig {
    /// Wake phrases; any match turns the streaming gate on
    pub wake: Vec<String>,

    /// Stop phrase; the only way to turn the gate off
    pub stop: String,

    /// Highlight phrases; any match fires the bookmark side-channel
    pub highlight: Vec<String>,
}

impl Default for PhraseConfig {
    fn default() -> Self {
        Self {
            wake: vec![
                "hey luma".to_string(),
                "hey lu na".to_string(),
                "hey luna".to_string(),
            ],
            stop: "thank you".to_string(),
            highlight: vec![
                "highlight".to_string(),
                "high light".to_string(),
                "high five".to_string(),
            ],
        }
    }
}

/// Configuration for the complete client
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Streaming endpoint, `ws://` or `wss://`
    pub ws_url: Url,

    /// Session identity bound at construction; included in the handshake
    /// frame only if present
    pub session_id: Option<String>,

    /// Requested capture buffer size in frames
    pub capture_buffer_frames: u32,

    /// Trigger phrases
    pub phrases: PhraseConfig,

    /// Reconnect backoff parameters
    pub reconnect: ReconnectPolicy,

    /// Optional WAV played locally when a highlight is bookmarked
    pub notification_wav: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(ws_url: Url) -> Self {
        Self {
            ws_url,
            session_id: None,
            capture_buffer_frames: 1024,
            phrases: PhraseConfig::default(),
            reconnect: ReconnectPolicy::default(),
            notification_wav: None,
        }
    }

    /// Bind a session identity for the handshake and the bookmark signal
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the bookmark notification sound
    pub fn with_notification_wav(mut self, path: impl Into<PathBuf>) -> Self {
        self.notification_wav = Some(path.into());
        self
    }

    /// Override the reconnect backoff parameters
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.ws_url.scheme() {
            "ws" | "wss" => {}
            other => return Err(format!("Unsupported URL scheme: {}", other)),
        }

        if self.capture_buffer_frames == 0 {
            return Err("Capture buffer size must be non-zero".to_string());
        }

        if let Some(path) = &self.notification_wav {
            if !path.exists() {
                return Err(format!("Notification WAV not found: {:?}", path));
            }
        }

        Ok(())
    }
}
