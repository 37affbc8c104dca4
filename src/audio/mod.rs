//! Microphone capture and block processing.
//!
//! ```text
//! ┌──────────┐   f32 slices   ┌───────────────┐   AudioBlock    ┌──────────┐
//! │  device  │───────────────▶│ BlockAssembler │───────────────▶│ on_block │──▶ session
//! │ callback │  (any length)  │  gain → level  │  (4096 x i16)  │ callback │
//! └──────────┘                │  → transcode   │                └──────────┘
//!                             └───────────────┘
//! ```
//!
//! `CaptureBackend` is the seam between the controller and the hardware;
//! `CpalCapture` is the production implementation, `MockCapture` the
//! scripted one for tests. Both run the same assembler, so block semantics
//! are identical either way.

pub mod backend;
pub mod block;
pub mod capture;
pub mod pcm;

pub use backend::{
    BlockCallback, CaptureBackend, CaptureFactory, MockCapture, MockCaptureFactory,
    MockCaptureHandle,
};
pub use block::{AudioBlock, BlockAssembler, LevelGauge};
pub use capture::{CpalCapture, CpalCaptureFactory, list_devices, suppress_audio_warnings};
