//! Band-limited resampling with rubato's synchronous FFT resampler
//!
//! A fresh resampler is built per call. The input is fed in fixed chunks,
//! zero-padded past the end until the filter delay has been flushed, and
//! the delay is trimmed off so the output lines up with the input.

use rubato::{FftFixedInOut, Resampler};
use tracing::{debug, info};
use voicebed_core::domain::audio::{AudioBuffer, AudioError, ChannelCount, Result};
use voicebed_core::domain::mixer::{resampled_len, Resample};

/// Default input chunk handed to rubato
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct RubatoResampler {
    chunk_size: usize,
}

impl Default for RubatoResampler {
    fn default() -> Self {
        Self::new()
    }
}

impl RubatoResampler {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

fn resample_err(e: impl std::fmt::Display) -> AudioError {
    AudioError::Resample(e.to_string())
}

impl Resample for RubatoResampler {
    fn resample(&self, buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer> {
        if target_rate == 0 {
            return Err(AudioError::InvalidParameter(
                "target sample rate must be positive".to_string(),
            ));
        }

        let source_rate = buffer.sample_rate();
        if source_rate == target_rate {
            debug!(
                "Source and target rates match ({}Hz), bypassing resampling",
                source_rate
            );
            return Ok(buffer.clone());
        }

        let channel_count = buffer.channel_count();
        if buffer.is_empty() {
            return AudioBuffer::silent(ChannelCount::from_count(channel_count)?, 0, target_rate);
        }

        info!(
            "Resampling: {}Hz -> {}Hz, {} channels",
            source_rate, target_rate, channel_count
        );

        let mut resampler = FftFixedInOut::<f32>::new(
            source_rate as usize,
            target_rate as usize,
            self.chunk_size,
            channel_count,
        )
        .map_err(resample_err)?;

        let target_len = resampled_len(buffer.frames(), source_rate, target_rate);
        let delay = resampler.output_delay();
        let needed = delay + target_len;
        let chunk = resampler.input_frames_next();

        let mut scratch = vec![vec![0.0f32; chunk]; channel_count];
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(needed + chunk); channel_count];
        let mut pos = 0;

        while output[0].len() < needed {
            for (ch, block) in scratch.iter_mut().enumerate() {
                block.fill(0.0);
                let input = buffer.channel(ch);
                if pos < input.len() {
                    let end = (pos + chunk).min(input.len());
                    block[..end - pos].copy_from_slice(&input[pos..end]);
                }
            }

            let resampled = resampler.process(&scratch, None).map_err(resample_err)?;
            for (out, data) in output.iter_mut().zip(resampled) {
                out.extend(data);
            }
            pos += chunk;
        }

        let channels = output
            .into_iter()
            .map(|mut ch| {
                ch.drain(..delay);
                ch.truncate(target_len);
                ch
            })
            .collect();

        debug!(delay, chunk, out_frames = target_len, "Resampling complete");
        AudioBuffer::new(channels, target_rate)
    }
}
