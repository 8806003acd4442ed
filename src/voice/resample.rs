//! Sample-rate conversion

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Input frames per resampler call
const CHUNK_SIZE: usize = 1024;

/// FFT sub-chunks per input chunk
const SUB_CHUNKS: usize = 2;

/// Resample mono audio using rubato
///
/// The trailing partial chunk is zero-padded and the output is trimmed back
/// to the exact converted length.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Audio("cannot resample with a zero sample rate".to_string()));
    }

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, SUB_CHUNKS, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    // The resampler may round its chunk size to fit the conversion ratio
    let chunk_size = resampler.input_frames_next();
    let delay = resampler.output_delay();
    let expected = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let mut output = Vec::with_capacity(expected + delay + chunk_size);

    let mut position = 0;
    while output.len() < expected + delay {
        let end = (position + chunk_size).min(samples.len());
        let mut input: Vec<f64> = samples
            .get(position..end)
            .unwrap_or_default()
            .iter()
            .map(|&s| f64::from(s))
            .collect();
        input.resize(chunk_size, 0.0);
        position = end;

        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}

/// Time-compress speech by `rate` (1.5 plays 50% faster)
///
/// The result is meant to be played at `sample_rate`. The target rate is
/// rounded to 100 Hz so the FFT resampler keeps a small conversion ratio.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn apply_speaking_rate(samples: &[f32], sample_rate: u32, rate: f32) -> Result<Vec<f32>> {
    if (rate - 1.0).abs() < f32::EPSILON || rate <= 0.0 {
        return Ok(samples.to_vec());
    }

    let target = ((f64::from(sample_rate) / f64::from(rate)) / 100.0).round() * 100.0;
    let target = (target as u32).max(100);
    resample(samples, sample_rate, target)
}
