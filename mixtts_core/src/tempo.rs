//! Pitch-preserving tempo change (WSOLA).
//!
//! Frames are read from the input at `tempo` times the output hop and
//! overlap-added with a Hann window. Each frame's read position is nudged
//! within a small tolerance to the offset that best continues the previous
//! frame's waveform, which avoids phase cancellation at the seams.

const FRAME_MS: usize = 40;

fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let x = std::f32::consts::PI * i as f32 / len as f32;
            x.sin() * x.sin()
        })
        .collect()
}

fn sample_at(samples: &[f32], i: usize) -> f32 {
    samples.get(i).copied().unwrap_or(0.0)
}

/// Position within `nominal ± tolerance` whose next `span` samples correlate
/// best with the samples at `natural`.
fn best_position(samples: &[f32], natural: usize, nominal: usize, tolerance: usize, span: usize) -> usize {
    let lo = nominal.saturating_sub(tolerance);
    let hi = nominal + tolerance;

    let mut best = nominal;
    let mut best_score = f32::NEG_INFINITY;
    for candidate in lo..=hi {
        let score: f32 = (0..span)
            .step_by(2)
            .map(|i| sample_at(samples, natural + i) * sample_at(samples, candidate + i))
            .sum();
        if score > best_score {
            best_score = score;
            best = candidate;
        }
    }
    best
}

/// Speed `samples` up by `tempo` (`> 1.0` is faster) without changing pitch.
/// The result has `len / tempo` samples.
pub(crate) fn change_tempo(samples: &[f32], sample_rate: u32, tempo: f32) -> Vec<f32> {
    if samples.is_empty() || !tempo.is_finite() || tempo <= 0.0 || (tempo - 1.0).abs() < 1e-3 {
        return samples.to_vec();
    }

    let frame = ((sample_rate as usize * FRAME_MS / 1000).max(64)) & !1;
    let hop_out = frame / 2;
    let hop_in = hop_out as f32 * tempo;
    let tolerance = hop_out / 4;
    let window = hann(frame);

    let out_len = (samples.len() as f32 / tempo).round() as usize;
    let mut out = vec![0.0f32; out_len + frame];
    let mut norm = vec![0.0f32; out_len + frame];

    let mut prev_pos = 0usize;
    let mut k = 0usize;
    while k * hop_out < out_len {
        let out_pos = k * hop_out;
        let nominal = (k as f32 * hop_in).round() as usize;
        let pos = if k == 0 {
            0
        } else {
            best_position(samples, prev_pos + hop_out, nominal, tolerance, hop_out)
        };

        for (i, w) in window.iter().enumerate() {
            out[out_pos + i] += sample_at(samples, pos + i) * w;
            norm[out_pos + i] += w;
        }
        prev_pos = pos;
        k += 1;
    }

    for (s, n) in out.iter_mut().zip(&norm) {
        if *n > 1e-3 {
            *s /= n;
        }
    }
    out.truncate(out_len);
    out
}
