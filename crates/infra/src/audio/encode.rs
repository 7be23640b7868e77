//! 16-bit PCM WAV output with hound

use std::io::Cursor;
use tracing::{debug, info};
use voicebed_core::domain::audio::{AudioError, Encoder, Result};
use voicebed_core::domain::pcm::Pcm16;

/// WAV writer; bitrate requests are logged and otherwise ignored
#[derive(Debug, Clone, Copy, Default)]
pub struct WavEncoder;

impl WavEncoder {
    pub fn new() -> Self {
        Self
    }
}

fn encode_err(e: hound::Error) -> AudioError {
    AudioError::Encode(e.to_string())
}

impl Encoder for WavEncoder {
    fn encode(&self, pcm: &Pcm16, bitrate_kbps: u32) -> Result<Vec<u8>> {
        if pcm.channels == 0 || pcm.sample_rate == 0 {
            return Err(AudioError::Encode(format!(
                "invalid stream shape: {} channels at {} Hz",
                pcm.channels, pcm.sample_rate
            )));
        }
        if pcm.samples.len() % pcm.channels as usize != 0 {
            return Err(AudioError::Encode(format!(
                "{} samples do not divide into {} channels",
                pcm.samples.len(),
                pcm.channels
            )));
        }

        let spec = hound::WavSpec {
            channels: pcm.channels,
            sample_rate: pcm.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm.samples.len() * 2));
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
            let mut samples = writer.get_i16_writer(pcm.samples.len() as u32);
            for &sample in &pcm.samples {
                samples.write_sample(sample);
            }
            samples.flush().map_err(encode_err)?;
            writer.finalize().map_err(encode_err)?;
        }

        debug!(
            requested_kbps = bitrate_kbps,
            "WAV output is uncompressed, bitrate not applied"
        );
        info!(
            frames = pcm.frames(),
            channels = pcm.channels,
            sample_rate = pcm.sample_rate,
            "Encoded WAV"
        );

        Ok(cursor.into_inner())
    }

    fn extension(&self) -> &'static str {
        "wav"
    }
}
