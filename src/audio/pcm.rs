//! Sample-level transforms for the capture pipeline.
//!
//! Every block of microphone audio passes through the same chain before it
//! leaves the process: amplify (with re-clamp), meter, transcode to 16-bit
//! PCM, pack to little-endian bytes. The functions here are pure so the
//! chain can be tested without a device.

/// Amplify samples by a linear gain, re-clamping to [-1.0, 1.0].
///
/// The clamp is not optional: it keeps the level metric in range and
/// prevents integer wraparound in the i16 transcode that follows.
pub fn amplify_in_place(samples: &mut [f32], gain: f32) {
    for sample in samples {
        *sample = (*sample * gain).clamp(-1.0, 1.0);
    }
}

/// Mean absolute amplitude of a block, in [0, 1].
///
/// Computed over the amplified block, so the value tracks what is actually
/// shipped to the transcription service rather than the raw device level.
pub fn mean_abs_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s.abs()).sum();
    sum / samples.len() as f32
}

/// Transcode a single float sample to 16-bit PCM.
///
/// Clamps to [-1.0, 1.0] first, then scales by `i16::MAX`. Full-scale
/// positive maps to 32767, full-scale negative to -32767, silence to 0.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Transcode a float block to 16-bit PCM.
pub fn transcode(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Pack PCM samples into the little-endian byte layout the wire expects.
pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Mix interleaved multi-channel audio down to mono by averaging channels.
pub fn fold_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Simple linear interpolation resampling.
///
/// Used when the device cannot capture at the configured rate: audio is
/// captured at the device's native rate and converted here, so the rate
/// declared to the transcription service always matches the shipped audio.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as f32
            }
        })
        .collect()
}
