//! Transcript reconciliation.
//!
//! Streaming recognition interleaves two kinds of results: interim
//! hypotheses that may be revised, and finals that are committed forever.
//! The buffer merges them into one coherent transcript:
//! - finals are append-only and never mutated once entered
//! - at most one interim exists; a newer interim replaces it wholesale
//!   (no diffing), and any final consumes it
//! - rendering joins finals with single spaces and appends the interim,
//!   separated only when both sides are non-empty

use std::time::Instant;

/// One transcription result from the streaming session.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    /// Recognized text, non-empty after trimming (enforced at the session
    /// edge; whitespace-only results never reach the buffer).
    pub text: String,
    /// Whether the service has committed this span.
    pub is_final: bool,
    /// Service confidence for the top alternative, in [0, 1].
    pub confidence: f32,
    /// When the segment arrived.
    pub received_at: Instant,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, is_final: bool, confidence: f32) -> Self {
        Self {
            text: text.into(),
            is_final,
            confidence,
            received_at: Instant::now(),
        }
    }
}

/// Merges interim and final segments into a stable transcript.
#[derive(Debug, Default)]
pub struct TranscriptBuffer {
    finals: Vec<String>,
    interim: Option<String>,
}

impl TranscriptBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one segment into the buffer.
    ///
    /// A final segment appends to the committed list and clears the interim,
    /// whether or not the texts match: the service's final for an utterance
    /// supersedes whatever provisional text preceded it. An interim segment
    /// replaces the previous interim wholesale.
    pub fn apply(&mut self, segment: &TranscriptSegment) {
        if segment.is_final {
            self.finals.push(segment.text.clone());
            self.interim = None;
        } else {
            self.interim = Some(segment.text.clone());
        }
    }

    /// Render the current transcript.
    ///
    /// Finals joined with single spaces, then the interim, with one
    /// separating space only when both sides are non-empty. Pure: repeated
    /// calls without `apply` return identical strings.
    pub fn render(&self) -> String {
        let mut rendered = self.finals.join(" ");
        if let Some(interim) = &self.interim {
            if !rendered.is_empty() && !interim.is_empty() {
                rendered.push(' ');
            }
            rendered.push_str(interim);
        }
        rendered
    }

    /// Committed text only, without the interim.
    pub fn final_text(&self) -> String {
        self.finals.join(" ")
    }

    /// The current provisional segment text, if any.
    pub fn interim(&self) -> Option<&str> {
        self.interim.as_deref()
    }

    /// Number of committed segments.
    pub fn final_count(&self) -> usize {
        self.finals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.finals.is_empty() && self.interim.is_none()
    }

    /// Clear all state, committed and provisional.
    pub fn reset(&mut self) {
        self.finals.clear();
        self.interim = None;
    }
}
