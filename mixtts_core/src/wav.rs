use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};

use crate::audio::{AudioClip, AudioError};

/// Encode a clip as 16-bit PCM mono WAV (RIFF).
pub fn encode_wav(clip: &AudioClip) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: clip.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    // WAV header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + clip.samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        const I16_MAX_F32: f32 = i16::MAX as f32;
        for &s in &clip.samples {
            writer.write_sample((s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Base64 text of encoded WAV bytes, for JSON responses.
pub fn wav_base64(wav: &[u8]) -> String {
    general_purpose::STANDARD.encode(wav)
}

/// Decode a WAV file into a mono clip, averaging channels if needed.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip, AudioError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = match spec.bits_per_sample {
                8 => i8::MAX as f32,
                16 => i16::MAX as f32,
                24 => 8_388_607.0,
                32 => i32::MAX as f32,
                bits => {
                    return Err(AudioError::Unsupported(format!("{bits}-bit integer PCM")));
                }
            };
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(AudioClip::new(samples, spec.sample_rate))
}
