use rubato::{FftFixedIn, Resampler};

use crate::audio::{AudioClip, AudioError};

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Convert `clip` to `to_rate`. The output length is exactly
/// `len * to_rate / from_rate` (rounded up).
pub(crate) fn resample(clip: &AudioClip, to_rate: u32) -> Result<AudioClip, AudioError> {
    if clip.sample_rate == to_rate || clip.is_empty() {
        return Ok(AudioClip::new(clip.samples.clone(), to_rate));
    }
    if clip.sample_rate == 0 || to_rate == 0 {
        return Err(AudioError::Resample("sample rate must be positive".into()));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        clip.sample_rate as usize,
        to_rate as usize,
        CHUNK,
        SUB_CHUNKS,
        1,
    )
    .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected_len =
        (clip.samples.len() as u64 * to_rate as u64).div_ceil(clip.sample_rate as u64) as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected_len + delay + CHUNK);

    // Feed whole chunks, zero-padding the tail, until the delayed output covers
    // the expected length.
    let mut pos = 0;
    while out.len() < expected_len + delay {
        let mut chunk = vec![0.0f32; CHUNK];
        if pos < clip.samples.len() {
            let end = (pos + CHUNK).min(clip.samples.len());
            chunk[..end - pos].copy_from_slice(&clip.samples[pos..end]);
        }
        pos += CHUNK;

        let frames = resampler
            .process(&[chunk], None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        out.extend_from_slice(&frames[0]);
    }

    let samples: Vec<f32> = out.into_iter().skip(delay).take(expected_len).collect();
    Ok(AudioClip::new(samples, to_rate))
}
