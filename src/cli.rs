//! Command-line interface for auravox
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::Config;

/// Live captions from your microphone
#[derive(Parser, Debug)]
#[command(name = "auravox", version, about = "Live captions from your microphone")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only print transcripts; no status output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: level meter, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Audio input device name (see `auravox devices`)
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Recognition model (default: nova-2)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Language code for transcription (default: en-US). Examples: en, en-GB, de, es
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Disable the sentiment collaborator for this run
    #[arg(long)]
    pub no_analysis: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List available audio input devices
    Devices,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Cli {
    /// Fold command-line overrides into a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(device) = &self.device {
            config.audio.device = Some(device.clone());
        }
        if let Some(model) = &self.model {
            config.provider.model = model.clone();
        }
        if let Some(language) = &self.language {
            config.provider.language = language.clone();
        }
        if self.no_analysis {
            config.analysis.enabled = false;
        }
    }
}
