//! Fixed-size block assembly for the capture pipeline.
//!
//! Device callbacks deliver slices of arbitrary length; the transcription
//! service wants steady fixed-size frames. The assembler buffers input,
//! runs the amplify → meter → transcode chain on each complete block, and
//! hands the result to a callback. Partial trailing data is carried into
//! the next push, never emitted short.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::audio::pcm;

/// One processed block of capture audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Transcoded 16-bit PCM samples, exactly one block long.
    pub samples: Vec<i16>,
    /// Mean absolute amplitude of the amplified block, in [0, 1].
    pub level: f32,
    /// When the block was completed.
    pub captured_at: Instant,
}

impl AudioBlock {
    /// Duration of this block at the given sample rate.
    pub fn duration_ms(&self, sample_rate: u32) -> u64 {
        if sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / sample_rate as u64
    }
}

/// Shared loudness cell readable by the presentation layer.
///
/// Stores the latest block level as f32 bits in an atomic so the audio
/// callback can publish without locking. Reads 0.0 when idle.
#[derive(Debug, Clone, Default)]
pub struct LevelGauge(Arc<AtomicU32>);

impl LevelGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, level: f32) {
        self.0.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.set(0.0);
    }
}

/// Accumulates raw float samples into exact fixed-size blocks.
#[derive(Debug)]
pub struct BlockAssembler {
    block_size: usize,
    gain: f32,
    pending: Vec<f32>,
    blocks_emitted: u64,
}

impl BlockAssembler {
    pub fn new(block_size: usize, gain: f32) -> Self {
        Self {
            block_size,
            gain,
            pending: Vec::with_capacity(block_size * 2),
            blocks_emitted: 0,
        }
    }

    /// Append input samples and emit every complete block through `emit`.
    ///
    /// Runs entirely with array math; safe to call from an audio callback
    /// as long as `emit` itself does not block.
    pub fn push(&mut self, input: &[f32], mut emit: impl FnMut(AudioBlock)) {
        if input.is_empty() {
            return;
        }
        self.pending.extend_from_slice(input);

        while self.pending.len() >= self.block_size {
            let mut block: Vec<f32> = self.pending.drain(..self.block_size).collect();
            pcm::amplify_in_place(&mut block, self.gain);
            let level = pcm::mean_abs_level(&block);
            let samples = pcm::transcode(&block);
            self.blocks_emitted += 1;
            emit(AudioBlock {
                samples,
                level,
                captured_at: Instant::now(),
            });
        }
    }

    /// Samples buffered but not yet emitted.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Total complete blocks emitted so far.
    pub fn blocks_emitted(&self) -> u64 {
        self.blocks_emitted
    }
}
