//! Live captioning application entry point.
//!
//! Orchestrates the complete captioning flow:
//! capture → stream → reconcile → display (+ sentiment)
//!
//! Finals go to stdout so the transcript survives a pipe; everything else
//! (status, meter, interims, sentiment) goes to stderr.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;

use crate::audio::{CpalCaptureFactory, suppress_audio_warnings};
use crate::config::Config;
use crate::controller::{ControllerEvent, SessionController};
use crate::error::{AuravoxError, Result};
use crate::sentiment::SentimentSnapshot;

const METER_INTERVAL: Duration = Duration::from_millis(100);
const METER_WIDTH: usize = 20;
const MAX_SHOWN_KEYWORDS: usize = 8;

/// Run the caption command: capture audio → stream → print captions.
///
/// Runs until Ctrl+C, the service closes the stream, or the transport
/// fails. The accumulated final transcript is printed to stdout on the way
/// out either way.
pub async fn run_caption_command(mut config: Config, quiet: bool, verbosity: u8) -> Result<()> {
    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();
    config.validate()?;

    let (controller, mut events) = SessionController::new(config, Arc::new(CpalCaptureFactory))?;

    if !quiet {
        eprintln!("Connecting...");
    }
    controller.start().await?;
    if !quiet {
        eprintln!("Listening. Press Ctrl+C to stop.");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut meter = tokio::time::interval(METER_INTERVAL);

    loop {
        tokio::select! {
            signal = &mut ctrl_c => {
                signal.map_err(|err| AuravoxError::Capture {
                    message: format!("failed to wait for Ctrl+C: {err}"),
                })?;
                break;
            }
            event = events.recv() => {
                match event {
                    Some(ControllerEvent::Transcript(segment)) => {
                        if segment.is_final {
                            clear_status_line();
                            println!("{}", segment.text);
                        }
                        draw_status(&controller, quiet, verbosity);
                    }
                    Some(ControllerEvent::Sentiment(snapshot)) => {
                        if !quiet {
                            clear_status_line();
                            eprintln!("{}", format_sentiment(&snapshot).dimmed());
                            draw_status(&controller, quiet, verbosity);
                        }
                    }
                    Some(ControllerEvent::Error(message)) => {
                        clear_status_line();
                        eprintln!("error: {message}");
                        break;
                    }
                    Some(ControllerEvent::Closed) => {
                        clear_status_line();
                        if !quiet {
                            eprintln!("Service closed the stream.");
                        }
                        break;
                    }
                    None => break,
                }
            }
            _ = meter.tick(), if verbosity >= 1 && !quiet => {
                draw_status(&controller, quiet, verbosity);
            }
        }
    }

    clear_status_line();
    if !quiet {
        eprintln!("Shutting down...");
    }
    controller.stop().await;

    // Interims are provisional; only committed text leaves the process
    let transcript = controller.final_transcript();
    if !transcript.is_empty() && !quiet {
        eprintln!("Transcript:");
        println!("{transcript}");
    }
    Ok(())
}

/// Redraw the rewritable status line: meter (when verbose) plus the
/// current interim hypothesis.
fn draw_status(controller: &SessionController, quiet: bool, verbosity: u8) {
    if quiet {
        return;
    }
    let mut line = String::new();
    if verbosity >= 1 {
        line.push_str(&format!("[{}] {:.3} ", level_bar(controller.level()), controller.level()));
    }
    if let Some(interim) = controller.interim_transcript() {
        line.push_str(&format!("{}", interim.dimmed()));
    }
    eprint!("\r\x1b[2K{line}");
    std::io::stderr().flush().ok();
}

fn clear_status_line() {
    eprint!("\r\x1b[2K");
    std::io::stderr().flush().ok();
}

/// Render a level in [0, 1] as a fixed-width bar.
fn level_bar(level: f32) -> String {
    let filled = (level.clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize;
    (0..METER_WIDTH)
        .map(|i| if i < filled { '█' } else { '░' })
        .collect()
}

fn format_sentiment(snapshot: &SentimentSnapshot) -> String {
    let mut line = format!("[{} {:+.2}]", snapshot.sentiment_label, snapshot.sentiment);
    if !snapshot.keywords.is_empty() {
        let shown: Vec<&str> = snapshot
            .keywords
            .iter()
            .take(MAX_SHOWN_KEYWORDS)
            .map(String::as_str)
            .collect();
        line.push_str(" keywords: ");
        line.push_str(&shown.join(", "));
        if snapshot.keywords.len() > MAX_SHOWN_KEYWORDS {
            line.push_str(&format!(" (+{})", snapshot.keywords.len() - MAX_SHOWN_KEYWORDS));
        }
    }
    line
}
