//! auravox - Live captions from your microphone
//!
//! Streams microphone audio to a transcription service and reconciles
//! interim and final results into one stable transcript, with optional
//! sentiment analysis of committed text.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod app;
pub mod audio;
pub mod cli;
pub mod config;
pub mod controller;
pub mod defaults;
pub mod error;
pub mod sentiment;
pub mod session;
pub mod transcript;

// Core seams (capture → session → transcript)
pub use audio::{AudioBlock, CaptureBackend, CaptureFactory, LevelGauge};
pub use session::{ApiKey, LiveOptions, LiveSession, SessionEvent, SessionPhase};
pub use transcript::{TranscriptBuffer, TranscriptSegment};

// Orchestration
pub use controller::{ConnectionState, ControllerEvent, SessionController};

// Sentiment collaborator
pub use sentiment::{SentimentClient, SentimentReport, SentimentSnapshot, SentimentTracker};

// Error handling
pub use error::{AuravoxError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
