//! Session lifecycle states.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a streaming session.
///
/// Forward path: `Idle` → `Connecting` → `Open` → `Streaming` → `Closing`
/// → `Closed`. `Errored` is entered from any non-terminal state when the
/// transport fails; `Closed` and `Errored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    /// No connection attempted yet.
    Idle = 0,
    /// Handshake in flight.
    Connecting = 1,
    /// Connected, no audio sent yet.
    Open = 2,
    /// Connected and audio has been queued.
    Streaming = 3,
    /// Orderly shutdown in progress.
    Closing = 4,
    /// Connection finished cleanly.
    Closed = 5,
    /// Connection lost to a transport failure.
    Errored = 6,
}

impl SessionPhase {
    /// Terminal phases accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Closed | SessionPhase::Errored)
    }

    /// Whether audio may be queued in this phase.
    pub fn can_send(self) -> bool {
        matches!(self, SessionPhase::Open | SessionPhase::Streaming)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionPhase::Connecting,
            2 => SessionPhase::Open,
            3 => SessionPhase::Streaming,
            4 => SessionPhase::Closing,
            5 => SessionPhase::Closed,
            6 => SessionPhase::Errored,
            _ => SessionPhase::Idle,
        }
    }
}

/// Shared, lock-free view of the current phase.
///
/// Clones share the same cell, so the reader task and the session handle
/// observe one consistent lifecycle.
#[derive(Debug, Clone)]
pub(crate) struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    pub fn new(initial: SessionPhase) -> Self {
        Self(Arc::new(AtomicU8::new(initial as u8)))
    }

    pub fn get(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: SessionPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Move from `from` to `to` only if `from` is still current.
    /// Returns whether the transition happened.
    pub fn advance_if(&self, from: SessionPhase, to: SessionPhase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
