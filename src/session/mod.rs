//! Streaming transcription over a duplex WebSocket.
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!  AudioBlock ──send──▶│ outbound queue ──▶ writer ───┼──▶ binary frames
//!  (linear16)          │                  (task)      │
//!                      │    LiveSession               │      service
//!                      │                              │
//!  SessionEvent ◀──────┼── event queue ◀── reader ◀───┼──── JSON frames
//!  (mpsc)              │                  (task)      │
//!                      └──────────────────────────────┘
//! ```
//!
//! The request declares the PCM format up front (`encoding`, `sample_rate`,
//! `channels` in the URL), so audio frames need no headers. Results come
//! back as typed JSON frames that [`wire`] classifies into events; the
//! receiver ends with exactly one `Closed` or `Errored`.

pub mod live;
pub mod options;
pub mod state;
mod wire;

pub use live::{AudioSink, LiveSession, SessionEvent};
pub use options::{ApiKey, LiveOptions};
pub use state::SessionPhase;
