//! Credentials and per-session request options.

use std::fmt;

use crate::config::Config;
use crate::defaults;
use crate::error::{AuravoxError, Result};

/// Raw PCM encoding declared to the service; blocks are sent as
/// little-endian signed 16-bit samples.
const ENCODING: &str = "linear16";

/// A validated provider credential.
///
/// Construction rejects blank keys so a session can fail with a
/// configuration error before any network traffic. The inner value never
/// appears in `Debug` output or logs.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(AuravoxError::Configuration {
                message: "API key is not set. Add provider.api_key to the config file \
                          or export AURAVOX_API_KEY."
                    .to_string(),
            });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(redacted)")
    }
}

/// Options for one live transcription request.
///
/// Encoding, sample rate and channel count describe the audio this client
/// actually produces; they are declared in the request URL so the service
/// can decode the binary frames without headers.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveOptions {
    /// WebSocket endpoint, without query parameters.
    pub url: String,
    pub model: String,
    pub language: String,
    /// Request provisional hypotheses in addition to finals.
    pub interim_results: bool,
    pub punctuate: bool,
    pub smart_format: bool,
    /// Request speech-start notifications.
    pub vad_events: bool,
    /// Silence that ends an utterance, in milliseconds.
    pub endpointing_ms: u32,
    /// Gap after the last word before an utterance-end event, in
    /// milliseconds.
    pub utterance_end_ms: u32,
    /// Sample rate of the PCM blocks that will be streamed.
    pub sample_rate: u32,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            url: defaults::PROVIDER_URL.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            interim_results: true,
            punctuate: true,
            smart_format: true,
            vad_events: true,
            endpointing_ms: defaults::ENDPOINTING_MS,
            utterance_end_ms: defaults::UTTERANCE_END_MS,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl LiveOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            url: config.provider.url.clone(),
            model: config.provider.model.clone(),
            language: config.provider.language.clone(),
            interim_results: config.provider.interim_results,
            punctuate: config.provider.punctuate,
            smart_format: config.provider.smart_format,
            vad_events: true,
            endpointing_ms: config.provider.endpointing_ms,
            utterance_end_ms: config.provider.utterance_end_ms,
            sample_rate: config.audio.sample_rate,
        }
    }

    /// Query parameters in the order the service documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("model", self.model.clone()),
            ("language", self.language.clone()),
            ("encoding", ENCODING.to_string()),
            ("sample_rate", self.sample_rate.to_string()),
            ("channels", defaults::CHANNELS.to_string()),
            ("interim_results", self.interim_results.to_string()),
            ("punctuate", self.punctuate.to_string()),
            ("smart_format", self.smart_format.to_string()),
            ("vad_events", self.vad_events.to_string()),
            ("endpointing", self.endpointing_ms.to_string()),
            ("utterance_end_ms", self.utterance_end_ms.to_string()),
        ]
    }

    /// Endpoint URL with all query parameters appended.
    pub fn request_url(&self) -> String {
        let mut url = self.url.clone();
        let mut separator = if url.contains('?') { '&' } else { '?' };
        for (key, value) in self.query_pairs() {
            url.push(separator);
            url.push_str(key);
            url.push('=');
            url.push_str(&value);
            separator = '&';
        }
        url
    }
}
