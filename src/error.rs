//! Error types for auravox.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuravoxError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    // Microphone capture errors
    #[error("Microphone access denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio input device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Audio capture failed: {message}")]
    Capture { message: String },

    // Streaming transcription errors
    #[error("Transcription service error: {message}")]
    Transport { message: String },

    // Sentiment collaborator errors (advisory, never fatal to a session)
    #[error("Sentiment analysis failed: {message}")]
    Analysis { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuravoxError {
    /// Whether this error may abort a running session.
    ///
    /// Analysis failures are advisory: the collaborator is consulted
    /// fire-and-forget and its errors must never stop recording.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, AuravoxError::Analysis { .. })
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, AuravoxError>;
