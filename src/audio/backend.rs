//! Capture backend seam.
//!
//! The controller talks to microphones through `CaptureBackend` so tests can
//! substitute a scripted source for real hardware. The production backend is
//! `CpalCapture`; `MockCapture` feeds synthetic samples through the same
//! block assembler the real device uses.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::audio::block::{AudioBlock, BlockAssembler};
use crate::config::AudioConfig;
use crate::error::{AuravoxError, Result};

/// Callback invoked with each completed audio block.
///
/// Runs on the capture thread; must only do array math and non-blocking
/// sends.
pub type BlockCallback = Box<dyn FnMut(AudioBlock) + Send + 'static>;

/// Trait for microphone capture backends.
///
/// This trait allows swapping implementations (real audio device vs mock).
#[async_trait]
pub trait CaptureBackend: Send {
    /// Begin capturing, delivering completed blocks to `on_block`.
    async fn start(&mut self, on_block: BlockCallback) -> Result<()>;

    /// Stop capturing and release the device.
    ///
    /// Idempotent; teardown failures are logged, never returned.
    async fn stop(&mut self);

    /// Whether the backend is currently delivering blocks.
    fn is_active(&self) -> bool;
}

impl std::fmt::Debug for dyn CaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn CaptureBackend")
    }
}

/// Factory for capture backends, one per recording session.
#[async_trait]
pub trait CaptureFactory: Send + Sync {
    /// Resolve a device and prepare a backend for it.
    async fn acquire(&self, config: &AudioConfig) -> Result<Box<dyn CaptureBackend>>;
}

/// Failure classes a mock can be scripted to produce.
#[derive(Debug, Clone)]
enum MockFailure {
    PermissionDenied(String),
    DeviceNotFound(String),
    Capture(String),
}

impl MockFailure {
    fn into_error(self) -> AuravoxError {
        match self {
            MockFailure::PermissionDenied(message) => AuravoxError::PermissionDenied { message },
            MockFailure::DeviceNotFound(device) => AuravoxError::DeviceNotFound { device },
            MockFailure::Capture(message) => AuravoxError::Capture { message },
        }
    }
}

/// Mock capture backend for testing.
///
/// Samples pushed through the paired [`MockCaptureHandle`] are run through a
/// real [`BlockAssembler`], so tests exercise the identical gain/level/
/// transcode chain as hardware capture.
pub struct MockCapture {
    block_size: usize,
    gain: f32,
    feed: Option<mpsc::UnboundedReceiver<Vec<f32>>>,
    start_delay: Option<Duration>,
    start_failure: Option<MockFailure>,
    active: Arc<AtomicBool>,
    pump: Option<tokio::task::JoinHandle<()>>,
}

/// Test-side handle for driving a [`MockCapture`].
#[derive(Clone)]
pub struct MockCaptureHandle {
    tx: mpsc::UnboundedSender<Vec<f32>>,
    active: Arc<AtomicBool>,
}

impl MockCaptureHandle {
    /// Queue raw samples for the backend. Returns false once the backend
    /// has been stopped.
    pub fn feed(&self, samples: &[f32]) -> bool {
        self.tx.send(samples.to_vec()).is_ok()
    }

    /// Whether the backend is (still) delivering blocks.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl MockCapture {
    /// Create a mock capture and its driving handle.
    pub fn new(block_size: usize, gain: f32) -> (Self, MockCaptureHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicBool::new(false));
        let capture = Self {
            block_size,
            gain,
            feed: Some(rx),
            start_delay: None,
            start_failure: None,
            active: Arc::clone(&active),
            pump: None,
        };
        (capture, MockCaptureHandle { tx, active })
    }

    /// Delay `start()` by the given duration before resolving.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = Some(delay);
        self
    }

    /// Fail `start()` with a permission-denied error.
    pub fn with_permission_denied(mut self, message: &str) -> Self {
        self.start_failure = Some(MockFailure::PermissionDenied(message.to_string()));
        self
    }

    /// Fail `start()` with a device-not-found error.
    pub fn with_device_not_found(mut self, device: &str) -> Self {
        self.start_failure = Some(MockFailure::DeviceNotFound(device.to_string()));
        self
    }

    /// Fail `start()` with a generic capture error.
    pub fn with_start_failure(mut self, message: &str) -> Self {
        self.start_failure = Some(MockFailure::Capture(message.to_string()));
        self
    }
}

#[async_trait]
impl CaptureBackend for MockCapture {
    async fn start(&mut self, mut on_block: BlockCallback) -> Result<()> {
        if let Some(delay) = self.start_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.start_failure.take() {
            return Err(failure.into_error());
        }
        let mut feed = self.feed.take().ok_or_else(|| AuravoxError::Capture {
            message: "mock capture started twice".to_string(),
        })?;

        let mut assembler = BlockAssembler::new(self.block_size, self.gain);
        let active = Arc::clone(&self.active);
        active.store(true, Ordering::SeqCst);

        self.pump = Some(tokio::spawn(async move {
            while let Some(chunk) = feed.recv().await {
                assembler.push(&chunk, &mut on_block);
            }
            active.store(false, Ordering::SeqCst);
        }));
        Ok(())
    }

    async fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(pump) = self.pump.take() {
            pump.abort();
            debug!("mock capture stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Scripted factory handing out prepared mock backends in order.
#[derive(Default)]
pub struct MockCaptureFactory {
    queue: std::sync::Mutex<std::collections::VecDeque<Result<MockCapture>>>,
}

impl MockCaptureFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a backend for the next `acquire` call.
    pub fn push(&self, capture: MockCapture) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Ok(capture));
        }
    }

    /// Make the next `acquire` call fail with the given error.
    pub fn push_error(&self, error: AuravoxError) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(Err(error));
        }
    }
}

#[async_trait]
impl CaptureFactory for MockCaptureFactory {
    async fn acquire(&self, _config: &AudioConfig) -> Result<Box<dyn CaptureBackend>> {
        let next = self
            .queue
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match next {
            Some(Ok(capture)) => Ok(Box::new(capture)),
            Some(Err(error)) => Err(error),
            None => Err(AuravoxError::Capture {
                message: "mock capture factory has no scripted backend".to_string(),
            }),
        }
    }
}
