//! Default configuration constants for auravox.
//!
//! This module provides shared constants used across different configuration types
//! to ensure consistency and eliminate duplication.

/// Default audio sample rate in Hz.
///
/// 16kHz is the standard for speech recognition and provides a good balance
/// between quality and computational efficiency for voice applications.
pub const SAMPLE_RATE: u32 = 16000;

/// Default capture channel count.
///
/// Speech recognition services expect a single channel; multi-channel devices
/// are folded down to mono before block assembly.
pub const CHANNELS: u16 = 1;

/// Default processing block size in samples.
///
/// 4096 samples is 256ms of audio at 16kHz: large enough to amortize
/// per-frame overhead, small enough for the service to endpoint promptly.
pub const BLOCK_SIZE: usize = 4096;

/// Default linear gain applied to raw microphone samples.
///
/// Browser-grade capture paths deliver conservative levels; a fixed 5.0x
/// boost (re-clamped to [-1.0, 1.0]) brings typical speech into the range
/// the recognition service transcribes best.
pub const GAIN: f32 = 5.0;

/// Default streaming transcription endpoint.
pub const PROVIDER_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Default transcription model identifier.
pub const DEFAULT_MODEL: &str = "nova-2";

/// Default language code for transcription.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default endpointing window in milliseconds.
///
/// How much trailing silence the service waits for before finalizing an
/// utterance. 500ms keeps finals snappy without chopping mid-sentence pauses.
pub const ENDPOINTING_MS: u32 = 500;

/// Default utterance-end timeout in milliseconds.
///
/// A second, longer silence window after which the service emits an
/// utterance-end lifecycle event even without further speech.
pub const UTTERANCE_END_MS: u32 = 2000;

/// Default base URL of the sentiment analysis service.
pub const ANALYSIS_URL: &str = "http://localhost:8000";

/// Default request timeout for the sentiment analysis service, in seconds.
pub const ANALYSIS_TIMEOUT_SECS: u64 = 10;

/// Capacity of the outbound audio frame channel, in blocks.
///
/// 32 blocks is ~8 seconds of audio at the default block size. When the
/// channel is full the newest frame is dropped rather than stalling the
/// audio callback.
pub const OUTBOUND_FRAME_CAPACITY: usize = 32;

/// Capacity of the controller's event channel to the presentation layer.
pub const EVENT_CAPACITY: usize = 256;

/// Upper bound on accumulated sentiment keywords per session.
///
/// Keywords merge across analysis responses for the whole session; without a
/// bound a long session grows the set indefinitely. Past the bound new
/// keywords are ignored.
pub const MAX_TRACKED_KEYWORDS: usize = 128;
