//! Loudness envelope extraction for pulse animation

/// Default envelope frame length in milliseconds
pub const FRAME_MS: u32 = 20;

/// Compute a normalized RMS envelope over fixed-length frames
///
/// Samples are split into `frame_ms` frames (a trailing partial frame is
/// dropped), each frame's RMS is taken, and the sequence is divided by its
/// maximum. Silence yields all zeros; fewer samples than one frame yields an
/// empty envelope, which callers treat as "no pulse data".
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn extract(samples: &[f32], sample_rate: u32, frame_ms: u32) -> Vec<f32> {
    let frame_samples = (u64::from(sample_rate) * u64::from(frame_ms) / 1000) as usize;
    if frame_samples == 0 {
        return Vec::new();
    }

    let mut envelope: Vec<f32> = samples
        .chunks_exact(frame_samples)
        .map(|frame| {
            let sum_squares: f32 = frame.iter().map(|s| s * s).sum();
            (sum_squares / frame.len() as f32).sqrt()
        })
        .collect();

    let max = envelope.iter().copied().fold(0.0f32, f32::max);
    if max > 0.0 {
        for value in &mut envelope {
            *value /= max;
        }
    }

    envelope
}

/// Envelope value at a playback progress in `0.0..=1.0`
///
/// Returns zero for an empty envelope.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn sample_at(envelope: &[f32], progress: f32) -> f32 {
    if envelope.is_empty() {
        return 0.0;
    }

    let progress = progress.clamp(0.0, 1.0);
    let index = ((progress * envelope.len() as f32) as usize).min(envelope.len() - 1);
    envelope[index]
}
