//! Real microphone capture using CPAL (Cross-Platform Audio Library).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, info, warn};

use crate::audio::backend::{BlockCallback, CaptureBackend, CaptureFactory};
use crate::audio::block::BlockAssembler;
use crate::audio::pcm;
use crate::config::AudioConfig;
use crate::defaults;
use crate::error::{AuravoxError, Result};

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
#[cfg(unix)]
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

#[cfg(not(unix))]
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    f()
}

/// Suppress noisy JACK/ALSA error messages that occur during audio backend probing.
/// These are harmless but confusing to users.
///
/// # Safety
/// This modifies environment variables which is safe when called before spawning threads.
pub fn suppress_audio_warnings() {
    // SAFETY: Called at startup before any threads are spawned
    unsafe {
        std::env::set_var("JACK_NO_START_SERVER", "1");
        std::env::set_var("JACK_NO_AUDIO_RESERVATION", "1");
        std::env::set_var("PIPEWIRE_DEBUG", "0");
        std::env::set_var("ALSA_DEBUG", "0");
        std::env::set_var("PW_LOG", "0");
    }
}

/// Preferred device names for desktop PipeWire/PulseAudio environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

/// Check if a device name should be filtered out.
fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

/// Check if a device is a preferred device.
fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// Preferred devices are marked with "\[recommended\]"; obviously unusable
/// devices (surround channels, HDMI, S/PDIF) are filtered out.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| AuravoxError::Capture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio.
///
/// Respects the desktop's device selection instead of raw ALSA defaults.
fn best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| AuravoxError::DeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Find a capture device by exact name.
fn find_device(name: &str) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices().map_err(|e| AuravoxError::Capture {
            message: format!("Failed to enumerate input devices: {}", e),
        })?;

        for device in devices {
            if let Ok(device_name) = device.name()
                && device_name == name
            {
                return Ok(device);
            }
        }

        Err(AuravoxError::DeviceNotFound {
            device: name.to_string(),
        })
    })
}

/// Heuristic for backend error strings that indicate an access problem
/// rather than a broken device.
fn permission_like(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed")
}

fn classify_build_error(err: cpal::BuildStreamError, device: &str) -> AuravoxError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => AuravoxError::DeviceNotFound {
            device: device.to_string(),
        },
        other => {
            let message = other.to_string();
            if permission_like(&message) {
                AuravoxError::PermissionDenied { message }
            } else {
                AuravoxError::Capture {
                    message: format!("Failed to build input stream: {}", message),
                }
            }
        }
    }
}

fn classify_play_error(err: cpal::PlayStreamError, device: &str) -> AuravoxError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => AuravoxError::DeviceNotFound {
            device: device.to_string(),
        },
        other => {
            let message = other.to_string();
            if permission_like(&message) {
                AuravoxError::PermissionDenied { message }
            } else {
                AuravoxError::Capture {
                    message: format!("Failed to start audio stream: {}", message),
                }
            }
        }
    }
}

fn classify_config_error(err: cpal::DefaultStreamConfigError, device: &str) -> AuravoxError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => AuravoxError::DeviceNotFound {
            device: device.to_string(),
        },
        other => AuravoxError::Capture {
            message: format!("Failed to query default input config: {}", other),
        },
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: The stream is only touched from one place at a time: built and
/// played inside `start`, paused and dropped inside `stop`, both behind
/// `&mut self`. It never crosses thread boundaries mid-call.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Per-stream processing state shared with the device callback.
///
/// Both the preferred and the native-format stream funnel into the same
/// assembler, so a mid-start fallback keeps partial block data.
struct CallbackState {
    assembler: BlockAssembler,
    on_block: BlockCallback,
}

impl CallbackState {
    fn process(&mut self, samples: &[f32]) {
        self.assembler.push(samples, &mut self.on_block);
    }
}

type SharedCallback = Arc<Mutex<CallbackState>>;

/// Real microphone capture implementation using CPAL.
///
/// Captures mono float audio at the configured rate and runs the block
/// pipeline (gain, level, i16 transcode) inside the device callback. Tries
/// the preferred format first (f32 then i16 at the configured rate), then
/// falls back to the device's native config with software conversion
/// (channel fold-down + resampling), so the rate announced downstream is
/// always the rate actually shipped.
pub struct CpalCapture {
    device: cpal::Device,
    device_label: String,
    sample_rate: u32,
    block_size: usize,
    gain: f32,
    stream: Option<SendableStream>,
    callback_count: Arc<AtomicU64>,
    active: bool,
}

impl CpalCapture {
    /// Resolve the configured device and prepare a capture for it.
    ///
    /// Does not open a stream yet; that happens in `start`. Errors are
    /// classified: missing device → `DeviceNotFound`, refused access →
    /// `PermissionDenied`, anything else → `Capture`.
    pub fn acquire(config: &AudioConfig) -> Result<Self> {
        let device = match config.device.as_deref() {
            Some(name) => find_device(name)?,
            None => best_default_device()?,
        };
        let device_label = device
            .name()
            .unwrap_or_else(|_| "unknown".to_string());
        debug!("acquired input device: {}", device_label);

        Ok(Self {
            device,
            device_label,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
            gain: config.gain,
            stream: None,
            callback_count: Arc::new(AtomicU64::new(0)),
            active: false,
        })
    }

    /// Build a stream at the configured rate and channel count.
    ///
    /// Tries f32 first (native to the pipeline), then i16 with conversion.
    /// PipeWire/PulseAudio transparently resample for either.
    fn build_preferred_stream(&self, shared: &SharedCallback) -> Result<SendableStream> {
        let stream_config = cpal::StreamConfig {
            channels: defaults::CHANNELS,
            sample_rate: self.sample_rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            warn!("audio stream error: {}", err);
        };

        let state = Arc::clone(shared);
        let counter = Arc::clone(&self.callback_count);
        if let Ok(stream) = self.device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut state) = state.lock() {
                    state.process(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(SendableStream(stream));
        }

        let state = Arc::clone(shared);
        let counter = Arc::clone(&self.callback_count);
        self.device
            .build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / 32768.0).collect();
                    if let Ok(mut state) = state.lock() {
                        state.process(&floats);
                    }
                },
                err_callback,
                None,
            )
            .map(SendableStream)
            .map_err(|e| classify_build_error(e, &self.device_label))
    }

    /// Build a stream using the device's default/native config, with software
    /// channel fold-down and resampling to the configured rate.
    fn build_native_stream(&self, shared: &SharedCallback) -> Result<SendableStream> {
        use cpal::SampleFormat;

        let default_config = self
            .device
            .default_input_config()
            .map_err(|e| classify_config_error(e, &self.device_label))?;

        let native_rate = default_config.sample_rate();
        let native_channels = default_config.channels() as usize;
        let target_rate = self.sample_rate;

        let stream_config: cpal::StreamConfig = default_config.clone().into();

        info!(
            "using native audio format ({}ch/{}Hz/{:?}), converting in software",
            native_channels,
            native_rate,
            default_config.sample_format(),
        );

        let err_callback = |err| {
            warn!("audio stream error: {}", err);
        };

        let state = Arc::clone(shared);
        let counter = Arc::clone(&self.callback_count);

        match default_config.sample_format() {
            SampleFormat::F32 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let mono = pcm::fold_to_mono(data, native_channels);
                        let resampled = pcm::resample(&mono, native_rate, target_rate);
                        if let Ok(mut state) = state.lock() {
                            state.process(&resampled);
                        }
                    },
                    err_callback,
                    None,
                )
                .map(SendableStream)
                .map_err(|e| classify_build_error(e, &self.device_label)),
            SampleFormat::I16 => self
                .device
                .build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        counter.fetch_add(1, Ordering::Relaxed);
                        let floats: Vec<f32> =
                            data.iter().map(|&s| s as f32 / 32768.0).collect();
                        let mono = pcm::fold_to_mono(&floats, native_channels);
                        let resampled = pcm::resample(&mono, native_rate, target_rate);
                        if let Ok(mut state) = state.lock() {
                            state.process(&resampled);
                        }
                    },
                    err_callback,
                    None,
                )
                .map(SendableStream)
                .map_err(|e| classify_build_error(e, &self.device_label)),
            fmt => Err(AuravoxError::Capture {
                message: format!(
                    "Unsupported native sample format: {:?}. \
                     Try specifying a different device.",
                    fmt
                ),
            }),
        }
    }
}

#[async_trait]
impl CaptureBackend for CpalCapture {
    async fn start(&mut self, on_block: BlockCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(()); // Already started
        }

        let shared: SharedCallback = Arc::new(Mutex::new(CallbackState {
            assembler: BlockAssembler::new(self.block_size, self.gain),
            on_block,
        }));
        self.callback_count.store(0, Ordering::Relaxed);

        let stream = match self.build_preferred_stream(&shared) {
            Ok(stream) => {
                stream
                    .0
                    .play()
                    .map_err(|e| classify_play_error(e, &self.device_label))?;

                // Some PipeWire-ALSA setups accept the requested config but
                // never deliver data. Probe briefly; if the callback stays
                // silent, rebuild at the device's native format.
                tokio::time::sleep(Duration::from_millis(200)).await;
                if self.callback_count.load(Ordering::Relaxed) == 0 {
                    drop(stream);
                    let native = self.build_native_stream(&shared)?;
                    native
                        .0
                        .play()
                        .map_err(|e| classify_play_error(e, &self.device_label))?;
                    native
                } else {
                    stream
                }
            }
            Err(err) => {
                debug!("preferred capture config rejected ({}), trying native", err);
                let native = self.build_native_stream(&shared)?;
                native
                    .0
                    .play()
                    .map_err(|e| classify_play_error(e, &self.device_label))?;
                native
            }
        };

        self.stream = Some(stream);
        self.active = true;
        info!("microphone capture started on {}", self.device_label);
        Ok(())
    }

    async fn stop(&mut self) {
        self.active = false;
        if let Some(stream) = self.stream.take() {
            // Detach the callback graph before the device handle goes away
            if let Err(e) = stream.0.pause() {
                warn!("failed to pause capture stream: {}", e);
            }
            drop(stream);
            debug!("capture stream released on {}", self.device_label);
        }
    }

    fn is_active(&self) -> bool {
        self.active && self.stream.is_some()
    }
}

/// Factory producing [`CpalCapture`] backends.
///
/// Device probing does blocking I/O, so acquisition runs on the blocking
/// pool.
pub struct CpalCaptureFactory;

#[async_trait]
impl CaptureFactory for CpalCaptureFactory {
    async fn acquire(&self, config: &AudioConfig) -> Result<Box<dyn CaptureBackend>> {
        let config = config.clone();
        let capture = tokio::task::spawn_blocking(move || CpalCapture::acquire(&config))
            .await
            .map_err(|e| AuravoxError::Capture {
                message: format!("capture setup task failed: {}", e),
            })??;
        Ok(Box::new(capture))
    }
}
