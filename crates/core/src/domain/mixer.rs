//! Background bed preparation and overlay
//!
//! A [`MixPlan`] holds the user's timing and level choices in seconds and
//! percent. [`MixPlan::resolve`] turns it into sample positions for one
//! voice buffer, and [`ResolvedMix::prepare_bed`] runs the bed through
//! trim, loop, truncate, gain and fade before [`overlay`] sums it onto the
//! voice.

use crate::domain::audio::{AudioBuffer, AudioError, ChannelCount, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// Gain used for a volume of 0% or less, in place of `log10(0)`
pub const SILENCE_GAIN_DB: f32 = -100.0;
pub const DEFAULT_VOLUME_PERCENT: f32 = 20.0;
pub const DEFAULT_FADE_LEN_S: f64 = 3.0;

/// Background timing and level, as the user gave them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixPlan {
    pub trim_start_s: f64,
    /// End of the trim window; 0 means the end of the track
    pub trim_end_s: f64,
    pub volume_percent: f32,
    /// Start of the fade-out; 0 disables fading
    pub fade_start_s: f64,
    pub fade_len_s: f64,
}

impl Default for MixPlan {
    fn default() -> Self {
        Self {
            trim_start_s: 0.0,
            trim_end_s: 0.0,
            volume_percent: DEFAULT_VOLUME_PERCENT,
            fade_start_s: 0.0,
            fade_len_s: DEFAULT_FADE_LEN_S,
        }
    }
}

/// Convert seconds to a sample position, clamping negatives and NaN to 0
fn seconds_to_samples(seconds: f64, sample_rate: u32) -> usize {
    if seconds.is_nan() || seconds <= 0.0 {
        0
    } else {
        (seconds * sample_rate as f64).round() as usize
    }
}

/// Decibel gain for a 0-100 volume percentage
///
/// `20·log10(p/100)`, with 0% and below mapped to [`SILENCE_GAIN_DB`].
pub fn volume_gain_db(percent: f32) -> f32 {
    if percent.is_nan() || percent <= 0.0 {
        SILENCE_GAIN_DB
    } else {
        20.0 * (percent / 100.0).log10()
    }
}

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

impl MixPlan {
    /// Resolve seconds into sample positions for a voice buffer
    pub fn resolve(&self, sample_rate: u32, voice_frames: usize) -> ResolvedMix {
        let trim_start = seconds_to_samples(self.trim_start_s, sample_rate);
        let trim_end = if self.trim_end_s > 0.0 && self.trim_end_s > self.trim_start_s {
            Some(seconds_to_samples(self.trim_end_s, sample_rate))
        } else {
            None
        };

        let fade = if self.fade_start_s > 0.0 {
            let fade_len_s = if self.fade_len_s.is_nan() {
                0.0
            } else {
                self.fade_len_s.max(0.0)
            };
            Some(FadeWindow {
                end: seconds_to_samples(self.fade_start_s + fade_len_s, sample_rate),
                len: seconds_to_samples(fade_len_s, sample_rate),
            })
        } else {
            None
        };

        let resolved = ResolvedMix {
            sample_rate,
            trim_start,
            trim_end,
            target_duration_samples: voice_frames,
            gain_db: volume_gain_db(self.volume_percent),
            fade,
        };

        trace!(?resolved, "Mix plan resolved");
        resolved
    }
}

/// Fade-out placement in samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeWindow {
    /// Where the faded track ends, if that is before the track's end
    pub end: usize,
    pub len: usize,
}

/// A [`MixPlan`] bound to one sample rate and voice length
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedMix {
    pub sample_rate: u32,
    pub trim_start: usize,
    pub trim_end: Option<usize>,
    /// Length of the voice buffer, which the bed is cut to
    pub target_duration_samples: usize,
    pub gain_db: f32,
    pub fade: Option<FadeWindow>,
}

impl ResolvedMix {
    /// Trim, loop, truncate, level and fade a bed already at `sample_rate`
    ///
    /// Returns `None` when trimming leaves nothing to play.
    pub fn prepare_bed(&self, music: &AudioBuffer) -> Result<Option<AudioBuffer>> {
        if music.sample_rate() != self.sample_rate {
            return Err(AudioError::InvalidBuffer(format!(
                "bed at {} Hz, plan resolved for {} Hz",
                music.sample_rate(),
                self.sample_rate
            )));
        }

        let trimmed = trim(music, self.trim_start, self.trim_end);
        if trimmed.is_empty() {
            warn!(
                trim_start = self.trim_start,
                track_frames = music.frames(),
                "Trimmed background is empty, skipping background"
            );
            return Ok(None);
        }

        let looped = loop_to_cover(&trimmed, self.target_duration_samples);
        let fitted = truncate(&looped, self.target_duration_samples);
        let leveled = apply_gain(&fitted, self.gain_db);

        let bed = match self.fade {
            Some(fade) => {
                let cut = if fade.end < leveled.frames() {
                    truncate(&leveled, fade.end)
                } else {
                    leveled
                };
                fade_out(&cut, fade.len)
            }
            None => leveled,
        };

        debug!(
            trimmed_frames = trimmed.frames(),
            bed_frames = bed.frames(),
            gain_db = self.gain_db,
            fade = ?self.fade,
            "Background bed prepared"
        );

        Ok(Some(bed))
    }
}

// ============================================================================
// BED OPERATIONS
// ============================================================================

/// Cut to `[start, end)`, or `[start, ..)` without an end
///
/// Positions past the end of the buffer are clamped, so the result may be
/// empty.
pub fn trim(buffer: &AudioBuffer, start: usize, end: Option<usize>) -> AudioBuffer {
    let frames = buffer.frames();
    let start = start.min(frames);
    let end = end.unwrap_or(frames).clamp(start, frames);
    let channels = buffer
        .channels()
        .iter()
        .map(|ch| ch[start..end].to_vec())
        .collect();
    AudioBuffer::from_parts(channels, buffer.sample_rate())
}

/// Repeat the whole track end-to-end until it covers `target_frames`
///
/// Uses `floor(target / len) + 1` repetitions, which may overshoot; the
/// caller truncates. Tracks already long enough are returned unchanged.
pub fn loop_to_cover(buffer: &AudioBuffer, target_frames: usize) -> AudioBuffer {
    let frames = buffer.frames();
    if frames == 0 || frames >= target_frames {
        return buffer.clone();
    }

    let loops = target_frames / frames + 1;
    trace!(loops, frames, target_frames, "Looping background");

    let channels = buffer.channels().iter().map(|ch| ch.repeat(loops)).collect();
    AudioBuffer::from_parts(channels, buffer.sample_rate())
}

/// Keep at most the first `frames` samples of each channel
pub fn truncate(buffer: &AudioBuffer, frames: usize) -> AudioBuffer {
    trim(buffer, 0, Some(frames))
}

/// Scale every sample by a dB gain
pub fn apply_gain(buffer: &AudioBuffer, gain_db: f32) -> AudioBuffer {
    let gain = db_to_linear(gain_db);
    let channels = buffer
        .channels()
        .iter()
        .map(|ch| ch.iter().map(|s| s * gain).collect())
        .collect();
    AudioBuffer::from_parts(channels, buffer.sample_rate())
}

/// Linear fade to silence over the last `fade_frames` samples
///
/// The ramp starts at unity and its final sample is exactly zero. A fade
/// longer than the buffer covers the whole buffer.
pub fn fade_out(buffer: &AudioBuffer, fade_frames: usize) -> AudioBuffer {
    let frames = buffer.frames();
    let len = fade_frames.min(frames);
    if len == 0 {
        return buffer.clone();
    }

    let start = frames - len;
    let denom = (len - 1).max(1) as f32;
    let channels = buffer
        .channels()
        .iter()
        .map(|ch| {
            let mut out = ch.clone();
            for (i, sample) in out[start..].iter_mut().enumerate() {
                let gain = if len == 1 {
                    0.0
                } else {
                    (len - 1 - i) as f32 / denom
                };
                *sample *= gain;
            }
            out
        })
        .collect();
    AudioBuffer::from_parts(channels, buffer.sample_rate())
}

/// Sum `bed` onto `voice` from sample 0
///
/// The voice length is kept. The result has as many channels as the wider
/// input (mono is duplicated). No limiting is applied.
pub fn overlay(voice: &AudioBuffer, bed: &AudioBuffer) -> Result<AudioBuffer> {
    if voice.sample_rate() != bed.sample_rate() {
        return Err(AudioError::InvalidBuffer(format!(
            "cannot overlay {} Hz bed onto {} Hz voice",
            bed.sample_rate(),
            voice.sample_rate()
        )));
    }

    let layout = ChannelCount::from_count(voice.channel_count().max(bed.channel_count()))?;
    let voice = voice.with_channel_count(layout);
    let bed = bed.with_channel_count(layout);

    let channels = voice
        .channels()
        .iter()
        .zip(bed.channels())
        .map(|(v, b)| {
            let mut out = v.clone();
            for (o, s) in out.iter_mut().zip(b.iter()) {
                *o += s;
            }
            out
        })
        .collect();

    Ok(AudioBuffer::from_parts(channels, voice.sample_rate()))
}

// ============================================================================
// RESAMPLING
// ============================================================================

/// Sample-rate conversion of a whole buffer
///
/// Output length is `round(frames · target / source)`; equal rates return
/// the input unchanged.
pub trait Resample: Send + Sync {
    fn resample(&self, buffer: &AudioBuffer, target_rate: u32) -> Result<AudioBuffer>;
}

/// Output frame count for a rate change
pub fn resampled_len(frames: usize, source_rate: u32, target_rate: u32) -> usize {
    (frames as f64 * target_rate as f64 / source_rate as f64).round() as usize
}

/// Linear-interpolation resampler
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResampler;

impl LinearResampler {
    fn resample_channel(input: &[f32], step: f64, out_frames: usize) -> Vec<f32> {
        let last = input.len().saturating_sub(1);
        (0..out_frames)
            .map(|j| {
                let position = j as f64 * step;
                let i0 = (position.floor() as usize).min(last);
                let i1 = (i0 + 1).min(last);
                let frac = (position - i0 as f64).clamp(0.0, 1.0) as f32;
                input[i0] + frac * (input[i1] - input[i0])
            })
            .collect()
    }
}

impl Resample for LinearResampler {
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

        debug!(
            "Linear resampling: {}Hz -> {}Hz, {} channels",
            source_rate,
            target_rate,
            buffer.channel_count()
        );

        let out_frames = resampled_len(buffer.frames(), source_rate, target_rate);
        if buffer.is_empty() {
            return AudioBuffer::silent(
                ChannelCount::from_count(buffer.channel_count())?,
                0,
                target_rate,
            );
        }

        let step = source_rate as f64 / target_rate as f64;
        let channels = buffer
            .channels()
            .iter()
            .map(|ch| Self::resample_channel(ch, step, out_frames))
            .collect();
        AudioBuffer::new(channels, target_rate)
    }
}
