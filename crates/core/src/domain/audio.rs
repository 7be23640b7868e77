//! Audio buffer abstractions and collaborator interfaces
//!
//! This module defines the planar buffer every processing stage consumes and
//! produces, plus the traits that container decoders and encoders implement.
//! Concrete decoders/encoders live in the `infra` crate.

use crate::domain::pcm::Pcm16;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio engine
#[derive(Debug, Error)]
pub enum AudioError {
    /// A user-supplied value is outside its domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Buffer shape violates an invariant (channel count, lengths, rate)
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// Input audio could not be read
    #[error("Decode error: {0}")]
    Decode(String),

    /// Output audio could not be written
    #[error("Encode error: {0}")]
    Encode(String),

    /// Sample rate conversion failed
    #[error("Resample error: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Number of audio channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelCount {
    Mono,
    Stereo,
}

impl ChannelCount {
    pub fn count(&self) -> usize {
        match self {
            ChannelCount::Mono => 1,
            ChannelCount::Stereo => 2,
        }
    }

    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(ChannelCount::Mono),
            2 => Ok(ChannelCount::Stereo),
            n => Err(AudioError::InvalidBuffer(format!(
                "unsupported channel count {n} (expected 1 or 2)"
            ))),
        }
    }
}

/// Integer sample widths a decoder may hand over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    I8,
    I16,
    I24,
    I32,
}

impl SampleFormat {
    /// Largest positive value of the format, used as the normalization divisor
    pub fn max_magnitude(&self) -> f32 {
        match self {
            SampleFormat::I8 => i8::MAX as f32,
            SampleFormat::I16 => i16::MAX as f32,
            SampleFormat::I24 => 8_388_607.0,
            SampleFormat::I32 => i32::MAX as f32,
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            SampleFormat::I8 => 8,
            SampleFormat::I16 => 16,
            SampleFormat::I24 => 24,
            SampleFormat::I32 => 32,
        }
    }

    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(SampleFormat::I8),
            16 => Some(SampleFormat::I16),
            24 => Some(SampleFormat::I24),
            32 => Some(SampleFormat::I32),
            _ => None,
        }
    }
}

/// Planar floating-point audio
///
/// One `Vec<f32>` per channel, all of equal length, samples nominally in
/// [-1.0, 1.0]. Stages never mutate a buffer they were handed; they return a
/// new one.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer, validating channel count, equal lengths and rate
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        ChannelCount::from_count(channels.len())?;

        if sample_rate == 0 {
            return Err(AudioError::InvalidBuffer(
                "sample rate must be positive".to_string(),
            ));
        }

        let frames = channels[0].len();
        if channels.iter().any(|ch| ch.len() != frames) {
            return Err(AudioError::InvalidBuffer(
                "all channels must have the same length".to_string(),
            ));
        }

        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Assemble a buffer whose shape the caller already guarantees
    ///
    /// Used by stages that map a valid buffer channel-by-channel without
    /// changing lengths.
    pub(crate) fn from_parts(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        debug_assert!(Self::new(channels.clone(), sample_rate).is_ok());
        Self {
            channels,
            sample_rate,
        }
    }

    /// Single-channel buffer
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Result<Self> {
        Self::new(vec![samples], sample_rate)
    }

    /// Buffer of digital silence
    pub fn silent(channels: ChannelCount, frames: usize, sample_rate: u32) -> Result<Self> {
        Self::new(vec![vec![0.0; frames]; channels.count()], sample_rate)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of samples per channel
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Convert to the given channel layout
    ///
    /// Mono to stereo duplicates the channel, stereo to mono averages.
    pub fn with_channel_count(&self, target: ChannelCount) -> Self {
        match (self.channels.len(), target) {
            (1, ChannelCount::Stereo) => Self {
                channels: vec![self.channels[0].clone(), self.channels[0].clone()],
                sample_rate: self.sample_rate,
            },
            (2, ChannelCount::Mono) => {
                let mixed = self.channels[0]
                    .iter()
                    .zip(self.channels[1].iter())
                    .map(|(l, r)| 0.5 * (l + r))
                    .collect();
                Self {
                    channels: vec![mixed],
                    sample_rate: self.sample_rate,
                }
            }
            _ => self.clone(),
        }
    }

    /// Peak absolute sample across all channels
    pub fn peak(&self) -> f32 {
        self.channels
            .iter()
            .flat_map(|ch| ch.iter())
            .fold(0.0_f32, |acc, s| acc.max(s.abs()))
    }

    /// RMS level across all channels
    pub fn rms(&self) -> f32 {
        let count = self.frames() * self.channel_count();
        if count == 0 {
            return 0.0;
        }
        let sum_sq: f64 = self
            .channels
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum_sq / count as f64).sqrt() as f32
    }
}

/// Turns uploaded container bytes into a planar buffer
///
/// `hint` is a container hint such as a file extension (`"mp3"`, `"wav"`).
pub trait Decoder: Send + Sync {
    fn decode(&self, bytes: &[u8], hint: Option<&str>) -> Result<AudioBuffer>;
}

/// Turns final interleaved 16-bit PCM into a distributable byte stream
pub trait Encoder: Send + Sync {
    fn encode(&self, pcm: &Pcm16, bitrate_kbps: u32) -> Result<Vec<u8>>;

    /// File extension of the produced container
    fn extension(&self) -> &'static str;
}
