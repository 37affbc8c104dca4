//! Live duplex transcription session.
//!
//! One WebSocket carries PCM blocks up and JSON results down. The socket is
//! split into two tasks: a writer draining a bounded outbound queue, and a
//! reader classifying inbound frames into [`SessionEvent`]s. Both queues
//! prefer liveness over completeness: when a consumer falls behind, blocks
//! and events are dropped with a warning instead of stalling the stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use super::options::{ApiKey, LiveOptions};
use super::state::{PhaseCell, SessionPhase};
use super::wire;
use crate::audio::pcm;
use crate::defaults;
use crate::error::{AuravoxError, Result};
use crate::transcript::TranscriptSegment;

/// How long an orderly shutdown waits for the socket tasks to finish
/// before abandoning them.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// What the reader task extracted from the inbound stream.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A recognition result, interim or final.
    Transcript(TranscriptSegment),
    /// The speaker paused long enough to end the utterance.
    UtteranceEnd,
    /// Speech detected after silence.
    SpeechStarted,
    /// The service closed the stream; no more events will follow.
    Closed,
    /// The transport failed; no more events will follow.
    Errored(String),
}

enum OutboundFrame {
    Audio(Vec<u8>),
    Shutdown,
}

/// Cheap clonable handle for queueing audio from the capture callback.
///
/// `send` never blocks and never fails on backpressure: a full queue drops
/// the block and warns, since stale audio is worse than missing audio for
/// live captioning.
#[derive(Debug, Clone)]
pub struct AudioSink {
    phase: PhaseCell,
    outbound: mpsc::Sender<OutboundFrame>,
    dropped: Arc<AtomicU64>,
}

impl AudioSink {
    /// Queue one block of PCM samples for transmission.
    pub fn send(&self, samples: &[i16]) -> Result<()> {
        let phase = self.phase.get();
        if !phase.can_send() {
            return Err(AuravoxError::Transport {
                message: format!("cannot stream audio while {phase:?}"),
            });
        }
        self.phase
            .advance_if(SessionPhase::Open, SessionPhase::Streaming);

        match self
            .outbound
            .try_send(OutboundFrame::Audio(pcm::to_le_bytes(samples)))
        {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "outbound queue full, dropping audio block");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(AuravoxError::Transport {
                message: "audio writer has stopped".to_string(),
            }),
        }
    }

    /// Blocks discarded because the outbound queue was full.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// An open streaming session.
///
/// Created by [`LiveSession::open`] together with the event receiver.
/// Dropping the session aborts its socket tasks; call [`LiveSession::close`]
/// for an orderly shutdown that delivers a close frame first.
#[derive(Debug)]
pub struct LiveSession {
    sink: AudioSink,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

fn build_request(api_key: &ApiKey, options: &LiveOptions) -> Result<Request> {
    let mut request =
        options
            .request_url()
            .into_client_request()
            .map_err(|err| AuravoxError::Transport {
                message: format!("invalid service URL {}: {err}", options.url),
            })?;
    let token = HeaderValue::from_str(&format!("Token {}", api_key.as_str())).map_err(|_| {
        AuravoxError::Configuration {
            message: "API key contains characters not allowed in a header".to_string(),
        }
    })?;
    request.headers_mut().insert(AUTHORIZATION, token);
    Ok(request)
}

impl LiveSession {
    /// Connect to the service and start the socket tasks.
    ///
    /// Credential validation happens in [`ApiKey::new`], so by the time this
    /// runs a missing key has already failed without touching the network.
    /// The returned receiver yields events in arrival order and ends with
    /// exactly one [`SessionEvent::Closed`] or [`SessionEvent::Errored`].
    pub async fn open(
        api_key: &ApiKey,
        options: &LiveOptions,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)> {
        let request = build_request(api_key, options)?;
        let phase = PhaseCell::new(SessionPhase::Connecting);

        info!(url = %options.url, model = %options.model, "connecting to transcription service");
        let (socket, _response) =
            connect_async(request)
                .await
                .map_err(|err| AuravoxError::Transport {
                    message: format!("connection failed: {err}"),
                })?;
        phase.set(SessionPhase::Open);
        debug!("websocket handshake complete");

        let (mut ws_sink, mut ws_stream) = socket.split();
        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<OutboundFrame>(defaults::OUTBOUND_FRAME_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(defaults::EVENT_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    OutboundFrame::Audio(bytes) => {
                        if let Err(err) = ws_sink.send(Message::Binary(bytes.into())).await {
                            warn!(error = %err, "audio frame send failed");
                            return;
                        }
                    }
                    OutboundFrame::Shutdown => break,
                }
            }
            // Shutdown requested or all senders gone: say goodbye
            if let Err(err) = ws_sink.send(Message::Close(None)).await {
                debug!(error = %err, "close frame send failed");
            }
        });

        let reader_phase = phase.clone();
        let reader = tokio::spawn(async move {
            while let Some(incoming) = ws_stream.next().await {
                match incoming {
                    Ok(Message::Text(text)) => {
                        let Some(event) = wire::classify(text.as_str()) else {
                            continue;
                        };
                        match event_tx.try_send(event) {
                            Ok(()) => {}
                            Err(TrySendError::Full(event)) => {
                                warn!(?event, "event queue full, dropping");
                            }
                            // Receiver gone: nobody is listening anymore
                            Err(TrySendError::Closed(_)) => return,
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "service closed the stream");
                        reader_phase.set(SessionPhase::Closed);
                        event_tx.try_send(SessionEvent::Closed).ok();
                        return;
                    }
                    Ok(Message::Binary(_)) => debug!("ignoring binary frame"),
                    Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                    Err(err) => {
                        warn!(error = %err, "transport error");
                        reader_phase.set(SessionPhase::Errored);
                        event_tx.try_send(SessionEvent::Errored(err.to_string())).ok();
                        return;
                    }
                }
            }
            // Stream ended without a close frame; treat as a clean close
            if !reader_phase.get().is_terminal() {
                reader_phase.set(SessionPhase::Closed);
                event_tx.try_send(SessionEvent::Closed).ok();
            }
        });

        let session = Self {
            sink: AudioSink {
                phase,
                outbound: outbound_tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            writer: Some(writer),
            reader: Some(reader),
        };
        Ok((session, event_rx))
    }

    pub fn phase(&self) -> SessionPhase {
        self.sink.phase.get()
    }

    /// Handle for the capture callback. Clones share the phase, queue and
    /// drop counter.
    pub fn audio_sink(&self) -> AudioSink {
        self.sink.clone()
    }

    /// Queue one block of PCM samples for transmission.
    pub fn send(&self, samples: &[i16]) -> Result<()> {
        self.sink.send(samples)
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.sink.dropped_blocks()
    }

    /// Orderly shutdown: deliver a close frame, then wait briefly for both
    /// socket tasks. Infallible and safe to call repeatedly; a second call
    /// is a no-op.
    pub async fn close(&mut self) {
        if !self.sink.phase.get().is_terminal() {
            self.sink.phase.set(SessionPhase::Closing);
        }
        // Wake the writer even after a remote close, so it exits instead of
        // parking on its queue until the grace timeout
        if self.sink.outbound.try_send(OutboundFrame::Shutdown).is_err() {
            debug!("writer already stopped before close");
        }

        if let Some(writer) = self.writer.take() {
            let abort = writer.abort_handle();
            if timeout(CLOSE_GRACE, writer).await.is_err() {
                warn!("writer did not finish in time, aborting");
                abort.abort();
            }
        }
        if let Some(reader) = self.reader.take() {
            let abort = reader.abort_handle();
            if timeout(CLOSE_GRACE, reader).await.is_err() {
                warn!("reader did not finish in time, aborting");
                abort.abort();
            }
        }

        if !self.sink.phase.get().is_terminal() {
            self.sink.phase.set(SessionPhase::Closed);
        }
        debug!(dropped = self.sink.dropped_blocks(), "session closed");
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
