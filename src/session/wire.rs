//! JSON frame classification for the live recognition protocol.
//!
//! The service multiplexes several message kinds over one text channel,
//! distinguished by a `type` field. Only the frames the session layer acts
//! on are modelled here; everything else is logged and skipped so protocol
//! additions never break a running session.

use serde::Deserialize;
use tracing::{debug, warn};

use super::live::SessionEvent;
use crate::transcript::TranscriptSegment;

/// Recognition result frame. The fields the session consumes; unknown
/// fields are ignored by serde.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    channel: Channel,
}

#[derive(Debug, Default, Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Map one text frame to a session event.
///
/// Returns `None` for frames the session does not act on: metadata,
/// unknown kinds, unparseable payloads, and results whose transcript is
/// empty after trimming. Empty results are routine keep-alive noise from
/// the service, not errors.
pub(crate) fn classify(payload: &str) -> Option<SessionEvent> {
    let message: InboundMessage = match serde_json::from_str(payload) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "discarding unparseable frame");
            return None;
        }
    };

    match message.kind.as_str() {
        // Some deployments omit the type field on result frames
        "Results" | "" => transcript_event(message),
        "UtteranceEnd" => Some(SessionEvent::UtteranceEnd),
        "SpeechStarted" => Some(SessionEvent::SpeechStarted),
        "Metadata" => {
            debug!("metadata frame received");
            None
        }
        other => {
            debug!(kind = other, "ignoring unrecognized frame");
            None
        }
    }
}

/// First alternative wins: alternatives are ordered by service confidence.
fn transcript_event(message: InboundMessage) -> Option<SessionEvent> {
    let alternative = message.channel.alternatives.into_iter().next()?;
    let text = alternative.transcript.trim();
    if text.is_empty() {
        return None;
    }
    Some(SessionEvent::Transcript(TranscriptSegment::new(
        text,
        message.is_final,
        alternative.confidence,
    )))
}
