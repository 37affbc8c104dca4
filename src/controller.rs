//! Session orchestration.
//!
//! The controller owns one recording session end to end: it acquires the
//! microphone, opens the streaming session, pumps session events into the
//! transcript buffer and sentiment tracker, and tears everything down in a
//! fixed order. Consumers watch a [`ControllerEvent`] channel and poll
//! [`SessionController::connection_state`].
//!
//! Every start bumps a monotonic session token. Async work spawned for an
//! earlier token (late analysis results, queued session events) checks the
//! token before touching shared state, so results from a superseded
//! session are discarded instead of corrupting the next one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::audio::{AudioBlock, BlockCallback, CaptureBackend, CaptureFactory, LevelGauge};
use crate::config::Config;
use crate::defaults;
use crate::error::{AuravoxError, Result};
use crate::sentiment::{SentimentClient, SentimentSnapshot, SentimentTracker};
use crate::session::{ApiKey, LiveOptions, LiveSession, SessionEvent};
use crate::transcript::{TranscriptBuffer, TranscriptSegment};

/// How long teardown waits for the event pump before abandoning it.
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Connection flags for display surfaces.
///
/// `is_connecting` and `is_connected` are never true together. `error`
/// holds the most recent fatal failure and is cleared when the next start
/// begins.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConnectionState {
    pub is_recording: bool,
    pub is_connected: bool,
    pub is_connecting: bool,
    pub error: Option<String>,
}

/// What the controller reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// A new interim or final recognition result was folded into the
    /// transcript.
    Transcript(TranscriptSegment),
    /// The sentiment picture changed after a final segment was analyzed.
    Sentiment(SentimentSnapshot),
    /// The session failed; matches `ConnectionState.error`.
    Error(String),
    /// The service ended the stream cleanly.
    Closed,
}

/// Everything a running session owns. Torn down in field order: the
/// microphone stops feeding before the stream closes, and the pump drains
/// last.
struct ActiveSession {
    capture: Box<dyn CaptureBackend>,
    session: LiveSession,
    pump: JoinHandle<()>,
    started_at: Instant,
}

/// A poisoned lock only means another thread panicked while holding it;
/// the data itself is still usable.
fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one recording session at a time.
pub struct SessionController {
    config: Config,
    factory: Arc<dyn CaptureFactory>,
    state: Arc<std::sync::Mutex<ConnectionState>>,
    buffer: Arc<std::sync::Mutex<TranscriptBuffer>>,
    tracker: Arc<std::sync::Mutex<SentimentTracker>>,
    gauge: LevelGauge,
    epoch: Arc<AtomicU64>,
    resources: Arc<tokio::sync::Mutex<Option<ActiveSession>>>,
    analysis: Option<Arc<SentimentClient>>,
    events: mpsc::Sender<ControllerEvent>,
}

impl SessionController {
    /// Build a controller and the event stream its consumer reads.
    pub fn new(
        config: Config,
        factory: Arc<dyn CaptureFactory>,
    ) -> Result<(Self, mpsc::Receiver<ControllerEvent>)> {
        let analysis = if config.analysis.enabled {
            Some(Arc::new(SentimentClient::from_config(&config.analysis)?))
        } else {
            None
        };
        let (events, event_rx) = mpsc::channel(defaults::EVENT_CAPACITY);
        let controller = Self {
            config,
            factory,
            state: Arc::new(std::sync::Mutex::new(ConnectionState::default())),
            buffer: Arc::new(std::sync::Mutex::new(TranscriptBuffer::new())),
            tracker: Arc::new(std::sync::Mutex::new(SentimentTracker::new())),
            gauge: LevelGauge::new(),
            epoch: Arc::new(AtomicU64::new(0)),
            resources: Arc::new(tokio::sync::Mutex::new(None)),
            analysis,
            events,
        };
        Ok((controller, event_rx))
    }

    /// Start recording and streaming.
    ///
    /// Sequence: validate the credential, acquire the microphone, open the
    /// streaming session, wire blocks into it, then start the event pump.
    /// A failure at any step tears down what was already built, records the
    /// error in [`ConnectionState`] and returns it. Calling start while a
    /// session is active is a no-op.
    pub async fn start(&self) -> Result<()> {
        let token = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let mut resources = self.resources.lock().await;
        if resources.is_some() {
            debug!("start ignored, session already active");
            return Ok(());
        }

        // Credential check comes before any device or network work
        let api_key = match self.config.provider.require_api_key().and_then(ApiKey::new) {
            Ok(key) => key,
            Err(err) => {
                self.fail_start(&err);
                return Err(err);
            }
        };

        {
            let mut state = lock(&self.state);
            state.error = None;
            state.is_connecting = true;
        }
        info!("starting session");

        let mut capture = match self.factory.acquire(&self.config.audio).await {
            Ok(capture) => capture,
            Err(err) => {
                self.fail_start(&err);
                return Err(err);
            }
        };
        if self.superseded(token) {
            debug!("start superseded during capture acquisition");
            capture.stop().await;
            self.clear_flags();
            return Ok(());
        }

        let options = LiveOptions::from_config(&self.config);
        let (session, session_events) = match LiveSession::open(&api_key, &options).await {
            Ok(opened) => opened,
            Err(err) => {
                capture.stop().await;
                self.fail_start(&err);
                return Err(err);
            }
        };
        if self.superseded(token) {
            debug!("start superseded during connect");
            capture.stop().await;
            let mut session = session;
            session.close().await;
            self.clear_flags();
            return Ok(());
        }

        let sink = session.audio_sink();
        let gauge = self.gauge.clone();
        let on_block: BlockCallback = Box::new(move |block: AudioBlock| {
            gauge.set(block.level);
            if let Err(err) = sink.send(&block.samples) {
                debug!(error = %err, "audio block not forwarded");
            }
        });
        if let Err(err) = capture.start(on_block).await {
            capture.stop().await;
            let mut session = session;
            session.close().await;
            self.fail_start(&err);
            return Err(err);
        }
        if self.superseded(token) {
            debug!("start superseded during capture startup");
            capture.stop().await;
            let mut session = session;
            session.close().await;
            self.clear_flags();
            return Ok(());
        }

        let pump = EventPump {
            token,
            epoch: self.epoch.clone(),
            state: self.state.clone(),
            buffer: self.buffer.clone(),
            tracker: self.tracker.clone(),
            analysis: self.analysis.clone(),
            events: self.events.clone(),
        };
        let pump = tokio::spawn(pump.run(session_events));

        {
            let mut state = lock(&self.state);
            state.is_connecting = false;
            state.is_connected = true;
            state.is_recording = true;
        }
        *resources = Some(ActiveSession {
            capture,
            session,
            pump,
            started_at: Instant::now(),
        });
        info!("session started");
        Ok(())
    }

    /// Stop recording and release everything.
    ///
    /// Infallible: teardown failures are logged and swallowed. Fixed order
    /// so no audio is queued into a closing stream: microphone, then
    /// session, then pump. Safe to call when idle or repeatedly.
    pub async fn stop(&self) {
        // Invalidate in-flight async work before taking the lock, so a
        // start awaiting the network unwinds instead of finishing
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let mut resources = self.resources.lock().await;
        let Some(mut active) = resources.take() else {
            self.clear_flags();
            debug!("stop with no active session");
            return;
        };

        active.capture.stop().await;
        active.session.close().await;
        let abort = active.pump.abort_handle();
        if timeout(STOP_GRACE, active.pump).await.is_err() {
            warn!("event pump did not drain in time, aborting");
            abort.abort();
        }

        self.gauge.reset();
        self.clear_flags();
        info!(
            duration_ms = active.started_at.elapsed().as_millis() as u64,
            "session stopped"
        );
    }

    /// Stop and forget: transcript, keywords and sentiment all clear.
    pub async fn reset(&self) {
        self.stop().await;
        lock(&self.buffer).reset();
        lock(&self.tracker).clear();
        lock(&self.state).error = None;
        info!("session reset");
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.state).clone()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).is_recording
    }

    /// Full transcript: committed segments plus the current hypothesis.
    pub fn transcript(&self) -> String {
        lock(&self.buffer).render()
    }

    /// Committed segments only.
    pub fn final_transcript(&self) -> String {
        lock(&self.buffer).final_text()
    }

    pub fn interim_transcript(&self) -> Option<String> {
        lock(&self.buffer).interim().map(str::to_string)
    }

    /// Microphone level in [0, 1], updated once per processed block.
    pub fn level(&self) -> f32 {
        self.gauge.get()
    }

    pub fn sentiment(&self) -> Option<SentimentSnapshot> {
        lock(&self.tracker).snapshot()
    }

    pub fn keywords(&self) -> Vec<String> {
        lock(&self.tracker).keywords().to_vec()
    }

    pub async fn recording_duration(&self) -> Option<Duration> {
        self.resources
            .lock()
            .await
            .as_ref()
            .map(|active| active.started_at.elapsed())
    }

    fn superseded(&self, token: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) != token
    }

    fn clear_flags(&self) {
        let mut state = lock(&self.state);
        state.is_recording = false;
        state.is_connected = false;
        state.is_connecting = false;
    }

    fn fail_start(&self, err: &AuravoxError) {
        warn!(error = %err, "session start failed");
        let mut state = lock(&self.state);
        state.is_recording = false;
        state.is_connected = false;
        state.is_connecting = false;
        state.error = Some(err.to_string());
    }
}

/// Moves session events into shared state and fans finals out to analysis.
struct EventPump {
    token: u64,
    epoch: Arc<AtomicU64>,
    state: Arc<std::sync::Mutex<ConnectionState>>,
    buffer: Arc<std::sync::Mutex<TranscriptBuffer>>,
    tracker: Arc<std::sync::Mutex<SentimentTracker>>,
    analysis: Option<Arc<SentimentClient>>,
    events: mpsc::Sender<ControllerEvent>,
}

impl EventPump {
    async fn run(self, mut inbound: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = inbound.recv().await {
            if self.stale() {
                debug!("event pump superseded, stopping");
                break;
            }
            match event {
                SessionEvent::Transcript(segment) => self.on_transcript(segment),
                SessionEvent::UtteranceEnd => debug!("utterance ended"),
                SessionEvent::SpeechStarted => debug!("speech started"),
                SessionEvent::Closed => {
                    info!("service closed the stream");
                    let mut state = lock(&self.state);
                    state.is_connected = false;
                    state.is_connecting = false;
                    drop(state);
                    self.emit(ControllerEvent::Closed);
                }
                SessionEvent::Errored(message) => {
                    warn!(error = %message, "session errored");
                    let mut state = lock(&self.state);
                    state.is_recording = false;
                    state.is_connected = false;
                    state.is_connecting = false;
                    state.error = Some(message.clone());
                    drop(state);
                    self.emit(ControllerEvent::Error(message));
                }
            }
        }
        debug!("event pump finished");
    }

    fn stale(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) != self.token
    }

    fn on_transcript(&self, segment: TranscriptSegment) {
        lock(&self.buffer).apply(&segment);
        let is_final = segment.is_final;
        let text = segment.text.clone();
        self.emit(ControllerEvent::Transcript(segment));

        // Finals go to the collaborator fire-and-forget; its outcome never
        // touches the recording path
        if is_final && let Some(client) = &self.analysis {
            let client = client.clone();
            let tracker = self.tracker.clone();
            let events = self.events.clone();
            let epoch = self.epoch.clone();
            let token = self.token;
            tokio::spawn(async move {
                match client.analyze(&text).await {
                    Ok(report) => {
                        if epoch.load(Ordering::SeqCst) != token {
                            debug!("discarding analysis result from superseded session");
                            return;
                        }
                        let snapshot = lock(&tracker).absorb(report);
                        events.try_send(ControllerEvent::Sentiment(snapshot)).ok();
                    }
                    Err(err) => warn!(error = %err, "analysis failed"),
                }
            });
        }
    }

    fn emit(&self, event: ControllerEvent) {
        use mpsc::error::TrySendError;
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!(?event, "event channel full, dropping"),
            Err(TrySendError::Closed(_)) => debug!("event consumer gone"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockCaptureFactory;

    fn config_with_key() -> Config {
        let mut config = Config::default();
        config.provider.api_key = Some("dg_test_key".to_string());
        config.analysis.enabled = false;
        config
    }

    fn controller_with(
        config: Config,
        factory: MockCaptureFactory,
    ) -> (SessionController, mpsc::Receiver<ControllerEvent>) {
        SessionController::new(config, Arc::new(factory)).unwrap()
    }

    #[test]
    fn test_connection_state_defaults() {
        let state = ConnectionState::default();
        assert!(!state.is_recording);
        assert!(!state.is_connected);
        assert!(!state.is_connecting);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_device_access() {
        let mut config = Config::default();
        config.analysis.enabled = false;
        // No scripted backend: if the factory were consulted, the error
        // would be a capture error rather than a configuration error
        let (controller, _events) = controller_with(config, MockCaptureFactory::new());

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AuravoxError::Configuration { .. }));

        let state = controller.connection_state();
        assert!(!state.is_recording);
        assert!(!state.is_connecting);
        assert!(state.error.unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn test_permission_denied_surfaces_in_state() {
        let factory = MockCaptureFactory::new();
        factory.push_error(AuravoxError::PermissionDenied {
            message: "denied by user".to_string(),
        });
        let (controller, _events) = controller_with(config_with_key(), factory);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AuravoxError::PermissionDenied { .. }));

        let state = controller.connection_state();
        assert!(!state.is_recording);
        assert!(!state.is_connecting);
        let message = state.error.unwrap();
        assert!(message.contains("Microphone access denied"));
        assert!(message.contains("denied by user"));
    }

    #[tokio::test]
    async fn test_device_not_found_surfaces_in_state() {
        let factory = MockCaptureFactory::new();
        factory.push_error(AuravoxError::DeviceNotFound {
            device: "usb-mic".to_string(),
        });
        let (controller, _events) = controller_with(config_with_key(), factory);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AuravoxError::DeviceNotFound { .. }));
        assert!(
            controller
                .connection_state()
                .error
                .unwrap()
                .contains("usb-mic")
        );
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_a_noop() {
        let (controller, _events) = controller_with(config_with_key(), MockCaptureFactory::new());
        controller.stop().await;
        controller.stop().await;

        let state = controller.connection_state();
        assert_eq!(state, ConnectionState::default());
    }

    #[tokio::test]
    async fn test_stop_clears_connecting_left_by_failed_start() {
        let factory = MockCaptureFactory::new();
        factory.push_error(AuravoxError::Capture {
            message: "stream died".to_string(),
        });
        let (controller, _events) = controller_with(config_with_key(), factory);

        assert!(controller.start().await.is_err());
        controller.stop().await;

        let state = controller.connection_state();
        assert!(!state.is_connecting);
        // The failure stays visible until the next start
        assert!(state.error.unwrap().contains("stream died"));
    }

    #[tokio::test]
    async fn test_reset_clears_error() {
        let factory = MockCaptureFactory::new();
        factory.push_error(AuravoxError::Capture {
            message: "stream died".to_string(),
        });
        let (controller, _events) = controller_with(config_with_key(), factory);

        assert!(controller.start().await.is_err());
        controller.reset().await;

        let state = controller.connection_state();
        assert_eq!(state, ConnectionState::default());
        assert_eq!(controller.transcript(), "");
        assert!(controller.keywords().is_empty());
    }

    #[tokio::test]
    async fn test_accessors_on_idle_controller() {
        let (controller, _events) = controller_with(config_with_key(), MockCaptureFactory::new());
        assert_eq!(controller.transcript(), "");
        assert_eq!(controller.final_transcript(), "");
        assert_eq!(controller.interim_transcript(), None);
        assert_eq!(controller.level(), 0.0);
        assert!(controller.sentiment().is_none());
        assert!(controller.recording_duration().await.is_none());
        assert!(!controller.is_recording());
    }
}
