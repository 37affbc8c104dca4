use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::defaults;
use crate::error::{AuravoxError, Result};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub audio: AudioConfig,
    pub analysis: AnalysisConfig,
}

/// Streaming transcription service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub url: String,
    pub model: String,
    pub language: String,
    pub interim_results: bool,
    pub punctuate: bool,
    pub smart_format: bool,
    pub endpointing_ms: u32,
    pub utterance_end_ms: u32,
}

/// Microphone capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub device: Option<String>,
    pub sample_rate: u32,
    pub block_size: usize,
    pub gain: f32,
}

/// Sentiment analysis service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub url: String,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            url: defaults::PROVIDER_URL.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            interim_results: true,
            punctuate: true,
            smart_format: true,
            endpointing_ms: defaults::ENDPOINTING_MS,
            utterance_end_ms: defaults::UTTERANCE_END_MS,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: defaults::SAMPLE_RATE,
            block_size: defaults::BLOCK_SIZE,
            gain: defaults::GAIN,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: defaults::ANALYSIS_URL.to_string(),
            enabled: true,
            timeout_secs: defaults::ANALYSIS_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Return the configured API key, or a configuration error if it is
    /// missing or blank.
    ///
    /// Checked before any connection attempt so a missing credential never
    /// reaches the network layer.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(AuravoxError::Configuration {
                message: "API key is not set. Add provider.api_key to the config file \
                          or export AURAVOX_API_KEY."
                    .to_string(),
            }),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuravoxError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                AuravoxError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(AuravoxError::ConfigFileNotFound { .. }) => Self::default(),
            Err(e) => {
                // Re-panic on invalid TOML or other errors
                panic!("Failed to load config from {}: {}", path.display(), e);
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AURAVOX_API_KEY → provider.api_key
    /// - AURAVOX_PROVIDER_URL → provider.url
    /// - AURAVOX_MODEL → provider.model
    /// - AURAVOX_LANGUAGE → provider.language
    /// - AURAVOX_AUDIO_DEVICE → audio.device
    /// - AURAVOX_ANALYSIS_URL → analysis.url
    /// - AURAVOX_ANALYSIS_ENABLED → analysis.enabled ("true"/"false"/"1"/"0")
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("AURAVOX_API_KEY")
            && !key.is_empty()
        {
            self.provider.api_key = Some(key);
        }

        if let Ok(url) = std::env::var("AURAVOX_PROVIDER_URL")
            && !url.is_empty()
        {
            self.provider.url = url;
        }

        if let Ok(model) = std::env::var("AURAVOX_MODEL")
            && !model.is_empty()
        {
            self.provider.model = model;
        }

        if let Ok(language) = std::env::var("AURAVOX_LANGUAGE")
            && !language.is_empty()
        {
            self.provider.language = language;
        }

        if let Ok(device) = std::env::var("AURAVOX_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(url) = std::env::var("AURAVOX_ANALYSIS_URL")
            && !url.is_empty()
        {
            self.analysis.url = url;
        }

        if let Ok(enabled) = std::env::var("AURAVOX_ANALYSIS_ENABLED") {
            match enabled.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.analysis.enabled = true,
                "0" | "false" | "no" => self.analysis.enabled = false,
                _ => {}
            }
        }

        self
    }

    /// Check that numeric fields are usable before a session starts.
    pub fn validate(&self) -> Result<()> {
        if self.audio.sample_rate == 0 {
            return Err(AuravoxError::ConfigInvalidValue {
                key: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.block_size == 0 {
            return Err(AuravoxError::ConfigInvalidValue {
                key: "audio.block_size".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if !(self.audio.gain > 0.0) {
            return Err(AuravoxError::ConfigInvalidValue {
                key: "audio.gain".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.provider.utterance_end_ms < self.provider.endpointing_ms {
            return Err(AuravoxError::ConfigInvalidValue {
                key: "provider.utterance_end_ms".to_string(),
                message: "must be at least provider.endpointing_ms".to_string(),
            });
        }
        if self.analysis.timeout_secs == 0 {
            return Err(AuravoxError::ConfigInvalidValue {
                key: "analysis.timeout_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/auravox/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("auravox")
            .join("config.toml")
    }
}
