pub mod audio;
pub mod client;
pub mod codec;
pub mod config;
pub mod net;
pub mod pipeline;
pub mod signal;
pub mod speech;
pub mod trigger;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LumaError {
    #[error("Audio device error: {0}")]
    AudioDeviceError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Handshake error: {0}")]
    HandshakeError(String),

    #[error("Codec error: {0}")]
    CodecError(String),

    #[error("Recognizer error: {0}")]
    RecognizerError(String),

    #[error("Signal error: {0}")]
    SignalError(String),

    #[error("IO error: {0}")]
    IOError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<std::io::Error> for LumaError {
    fn from(e: std::io::Error) -> Self {
        LumaError::IOError(e.to_string())
    }
}

impl LumaError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Hardware/device errors may require user intervention
            LumaError::AudioDeviceError(_) => false,
            // Transport errors are absorbed by the reconnect path
            LumaError::TransportError(_) => true,
            // A failed handshake leaves the connection usable for audio
            LumaError::HandshakeError(_) => true,
            LumaError::CodecError(_) => true,
            LumaError::RecognizerError(_) => true,
            LumaError::SignalError(_) => true,
            LumaError::IOError(_) => false,
            LumaError::ConfigError(_) => false,
            LumaError::ChannelError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            LumaError::AudioDeviceError(_) => {
                "Audio device error. Please check your microphone/speakers.".to_string()
            }
            LumaError::TransportError(_) => {
                "Connection to the server was lost. Retrying...".to_string()
            }
            LumaError::HandshakeError(_) => {
                "Session handshake failed. Audio streaming continues.".to_string()
            }
            LumaError::CodecError(_) => {
                "Audio frame decoding failed. Please try again.".to_string()
            }
            LumaError::RecognizerError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            LumaError::SignalError(_) => {
                "Could not reach the bookmark service.".to_string()
            }
            LumaError::IOError(_) => "File system error occurred.".to_string(),
            LumaError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            LumaError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, LumaError>;
