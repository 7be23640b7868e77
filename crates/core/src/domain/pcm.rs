//! Interleaved integer PCM <-> planar float conversion
//!
//! Decoders hand over frame-major integer samples; the engine works on
//! planar `f32`. On the way out samples are clipped to [-1.0, 1.0] before
//! scaling, which is the only place the pipeline clips.

use crate::domain::audio::{AudioBuffer, AudioError, ChannelCount, Result, SampleFormat};
use tracing::debug;

/// Interleaved integer PCM as delivered by a decoder
///
/// Samples are stored widened to `i32`; `format` says which width they were
/// decoded at and therefore which divisor normalizes them.
#[derive(Debug, Clone, PartialEq)]
pub struct InterleavedPcm {
    pub samples: Vec<i32>,
    pub format: SampleFormat,
    pub channels: u16,
    pub sample_rate: u32,
}

/// Final interleaved 16-bit PCM handed to an encoder
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm16 {
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl Pcm16 {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Full-scale multiplier for 16-bit output
pub const PCM16_SCALE: f32 = 32767.0;

/// Normalize interleaved integer PCM into a planar buffer
pub fn decode_interleaved(pcm: &InterleavedPcm) -> Result<AudioBuffer> {
    let channels = ChannelCount::from_count(pcm.channels as usize)?.count();

    if pcm.samples.len() % channels != 0 {
        return Err(AudioError::Decode(format!(
            "{} samples do not divide into {} channels",
            pcm.samples.len(),
            channels
        )));
    }

    let scale = pcm.format.max_magnitude();
    let frames = pcm.samples.len() / channels;
    let mut planar = vec![Vec::with_capacity(frames); channels];

    for frame in pcm.samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample as f32 / scale);
        }
    }

    debug!(
        frames,
        channels,
        bits = pcm.format.bits(),
        sample_rate = pcm.sample_rate,
        "Decoded interleaved PCM"
    );

    AudioBuffer::new(planar, pcm.sample_rate)
}

/// Deinterleave float samples that are already normalized
pub fn from_interleaved_f32(
    samples: &[f32],
    channels: u16,
    sample_rate: u32,
) -> Result<AudioBuffer> {
    let channels = ChannelCount::from_count(channels as usize)?.count();
    if samples.len() % channels != 0 {
        return Err(AudioError::Decode(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }

    let mut planar = vec![Vec::with_capacity(samples.len() / channels); channels];
    for frame in samples.chunks_exact(channels) {
        for (ch, &sample) in frame.iter().enumerate() {
            planar[ch].push(sample);
        }
    }
    AudioBuffer::new(planar, sample_rate)
}

/// Convert one float sample to 16-bit: clip, scale, truncate toward zero
#[inline]
pub fn sample_to_i16(sample: f32) -> i16 {
    // NaN clamps to NaN and `as` maps it to 0
    (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16
}

/// Clip, scale and re-interleave a buffer for the encoder
pub fn encode_pcm16(buffer: &AudioBuffer) -> Pcm16 {
    let channels = buffer.channel_count();
    let frames = buffer.frames();
    let mut samples = Vec::with_capacity(frames * channels);

    for frame in 0..frames {
        for ch in 0..channels {
            samples.push(sample_to_i16(buffer.channel(ch)[frame]));
        }
    }

    Pcm16 {
        samples,
        channels: channels as u16,
        sample_rate: buffer.sample_rate(),
    }
}
