use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Encode mono f32 samples in [-1.0, 1.0] as a 16-bit PCM WAV file.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buffer), spec)?;
        for sample in samples {
            writer.write_sample(to_pcm16(*sample))?;
        }
        writer.finalize()?;
    }

    Ok(buffer)
}

fn to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_samples_to_wav_empty() {
        let wav = samples_to_wav(&[], 24000).unwrap();
        // Should produce valid WAV header even for empty audio
        assert!(wav.starts_with(b"RIFF"));
        let reader = WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 0);
    }

    #[test]
    fn test_samples_to_wav_roundtrip_spec() {
        let samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0];
        let wav = samples_to_wav(&samples, 24000).unwrap();
        let mut reader = WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 24000);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![0, 16384, -16384, 32767, -32767]);
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        assert_eq!(to_pcm16(3.0), 32767);
        assert_eq!(to_pcm16(-3.0), -32767);
        assert_eq!(to_pcm16(f32::NAN), 0);
    }
}
