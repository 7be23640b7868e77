//! Dynamic range processors: noise gate, compressor, limiter, distortion
//!
//! All processors are single-channel, sample-by-sample and deterministic.
//! Time constants are turned into one-pole smoothing coefficients once at
//! construction.

use crate::domain::dsp::Effect;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Parameter constraints for dynamics processors
///
/// Parameters are clamped to these ranges to keep envelopes and gain
/// curves finite.
pub mod params {
    /// Floor used when converting silence to dB
    pub const DB_MIN: f32 = -120.0;
    /// Highest threshold accepted (dBFS)
    pub const THRESHOLD_MAX: f32 = 0.0;

    /// Compressor ratio range
    pub const RATIO_MIN: f32 = 1.0;
    pub const RATIO_MAX: f32 = 100.0;

    /// Attack/release time range in milliseconds
    pub const TIME_MIN_MS: f32 = 0.0;
    pub const TIME_MAX_MS: f32 = 5000.0;

    /// Window of the gate's RMS detector
    pub const GATE_RMS_WINDOW_MS: f32 = 5.0;

    /// Distortion drive range (dB)
    pub const DRIVE_MIN_DB: f32 = 0.0;
    pub const DRIVE_MAX_DB: f32 = 60.0;
}

/// Convert a time constant to a one-pole smoothing coefficient
///
/// Zero time gives an instantaneous follower (coefficient 0).
#[inline]
pub fn time_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_ms = time_ms.clamp(params::TIME_MIN_MS, params::TIME_MAX_MS);
    if time_ms <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_ms * 0.001 * sample_rate)).exp()
    }
}

/// Convert linear amplitude to dB (with minimum floor)
#[inline]
pub fn to_db(level: f32) -> f32 {
    if level <= 1e-6 {
        params::DB_MIN
    } else {
        20.0 * level.log10()
    }
}

#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn clamp_threshold(threshold_db: f32) -> f32 {
    threshold_db.clamp(params::DB_MIN, params::THRESHOLD_MAX)
}

fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() {
        return params::RATIO_MIN;
    }
    ratio.clamp(params::RATIO_MIN, params::RATIO_MAX)
}

// ============================================================================
// NOISE GATE
// ============================================================================

/// Noise gate parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseGateParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for NoiseGateParams {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            ratio: 4.0,
            attack_ms: 1.0,
            release_ms: 200.0,
        }
    }
}

/// Downward-expanding noise gate
///
/// The gate opens as soon as the RMS envelope reaches the threshold and
/// closes once the envelope has stayed below it for `release_ms`. While
/// closed the signal is attenuated along `(env / threshold)^(ratio - 1)`.
#[derive(Debug, Clone)]
pub struct NoiseGate {
    params: NoiseGateParams,
    threshold: f32,
    rms_coeff: f32,
    gain_coeff: f32,
    hold_samples: u32,
    // Detector / gate state
    mean_square: f32,
    gain: f32,
    hold_counter: u32,
    open: bool,
}

impl NoiseGate {
    pub fn new(params: NoiseGateParams, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let params = NoiseGateParams {
            threshold_db: clamp_threshold(params.threshold_db),
            ratio: clamp_ratio(params.ratio),
            attack_ms: params.attack_ms.clamp(params::TIME_MIN_MS, params::TIME_MAX_MS),
            release_ms: params.release_ms.clamp(params::TIME_MIN_MS, params::TIME_MAX_MS),
        };

        let gate = Self {
            params,
            threshold: db_to_gain(params.threshold_db),
            rms_coeff: time_coeff(params::GATE_RMS_WINDOW_MS, sr),
            gain_coeff: time_coeff(params.attack_ms, sr),
            hold_samples: (params.release_ms * 0.001 * sr).round() as u32,
            mean_square: 0.0,
            gain: 0.0,
            hold_counter: 0,
            open: false,
        };

        trace!(?params, hold_samples = gate.hold_samples, "Noise gate configured");
        gate
    }

    pub fn params(&self) -> NoiseGateParams {
        self.params
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    #[inline]
    fn closed_gain(&self, envelope: f32) -> f32 {
        if envelope <= 0.0 {
            0.0
        } else {
            (envelope / self.threshold).powf(self.params.ratio - 1.0)
        }
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.mean_square = self.rms_coeff * self.mean_square + (1.0 - self.rms_coeff) * x * x;
        let envelope = self.mean_square.sqrt();

        if envelope >= self.threshold {
            self.open = true;
            self.hold_counter = self.hold_samples;
        } else if self.open {
            if self.hold_counter > 0 {
                self.hold_counter -= 1;
            } else {
                self.open = false;
            }
        }

        let target = if self.open {
            1.0
        } else {
            self.closed_gain(envelope)
        };

        // Smooth gain transition
        self.gain = self.gain_coeff * self.gain + (1.0 - self.gain_coeff) * target;
        x * self.gain
    }
}

impl Effect for NoiseGate {
    fn process(&mut self, channel: &mut [f32]) {
        for sample in channel.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        self.mean_square = 0.0;
        self.gain = 0.0;
        self.hold_counter = 0;
        self.open = false;
    }

    fn name(&self) -> &'static str {
        "NoiseGate"
    }
}

// ============================================================================
// DYNAMIC RANGE COMPRESSOR
// ============================================================================

/// Compressor parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -16.0,
            ratio: 4.0,
            attack_ms: 1.0,
            release_ms: 100.0,
        }
    }
}

/// Feed-forward dynamic range compressor
///
/// Reduces the dynamic range of audio signals by attenuating
/// signals above a threshold. The peak envelope rises with the attack
/// coefficient and falls with the release coefficient, so gain reduction
/// engages and relaxes at those rates.
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    // Coefficients (pre-computed for performance)
    attack_coeff: f32,
    release_coeff: f32,
    // Envelope follower state
    envelope: f32,
}

impl Compressor {
    pub fn new(params: CompressorParams, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let params = CompressorParams {
            threshold_db: clamp_threshold(params.threshold_db),
            ratio: clamp_ratio(params.ratio),
            attack_ms: params.attack_ms.clamp(params::TIME_MIN_MS, params::TIME_MAX_MS),
            release_ms: params.release_ms.clamp(params::TIME_MIN_MS, params::TIME_MAX_MS),
        };

        trace!(?params, "Compressor configured");

        Self {
            params,
            attack_coeff: time_coeff(params.attack_ms, sr),
            release_coeff: time_coeff(params.release_ms, sr),
            envelope: 0.0,
        }
    }

    pub fn params(&self) -> CompressorParams {
        self.params
    }

    /// Calculate gain reduction for a given input level
    ///
    /// Returns the linear gain to apply (1.0 = no reduction)
    #[inline]
    pub fn calculate_gain(&self, input_level_db: f32) -> f32 {
        if input_level_db <= self.params.threshold_db {
            return 1.0;
        }

        let over_threshold = input_level_db - self.params.threshold_db;
        let gain_reduction_db = over_threshold * (1.0 - 1.0 / self.params.ratio);

        db_to_gain(-gain_reduction_db)
    }

    /// Update envelope follower (peak detection with smoothing)
    #[inline]
    fn update_envelope(&mut self, input_sample: f32) {
        let input_level = input_sample.abs();

        // Use attack coefficient for rising, release for falling
        let coeff = if input_level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };

        self.envelope = coeff * self.envelope + (1.0 - coeff) * input_level;
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.update_envelope(x);
        x * self.calculate_gain(to_db(self.envelope))
    }
}

impl Effect for Compressor {
    fn process(&mut self, channel: &mut [f32]) {
        for sample in channel.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }

    fn name(&self) -> &'static str {
        "Compressor"
    }
}

// ============================================================================
// LIMITER
// ============================================================================

/// Limiter parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterParams {
    pub threshold_db: f32,
    pub release_ms: f32,
}

impl Default for LimiterParams {
    fn default() -> Self {
        Self {
            threshold_db: -1.0,
            release_ms: 100.0,
        }
    }
}

/// Peak limiter: a compressor with infinite ratio and instant attack
///
/// The envelope jumps to any peak above it, so `|x| <= envelope` holds for
/// every sample and the output never exceeds the threshold.
#[derive(Debug, Clone)]
pub struct Limiter {
    params: LimiterParams,
    threshold: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Limiter {
    pub fn new(params: LimiterParams, sample_rate: u32) -> Self {
        let params = LimiterParams {
            threshold_db: clamp_threshold(params.threshold_db),
            release_ms: params.release_ms.clamp(params::TIME_MIN_MS, params::TIME_MAX_MS),
        };

        trace!(?params, "Limiter configured");

        Self {
            params,
            threshold: db_to_gain(params.threshold_db),
            release_coeff: time_coeff(params.release_ms, sample_rate as f32),
            envelope: 0.0,
        }
    }

    pub fn params(&self) -> LimiterParams {
        self.params
    }

    /// Linear ceiling
    pub fn ceiling(&self) -> f32 {
        self.threshold
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let level = x.abs();
        self.envelope = if level > self.envelope {
            level
        } else {
            self.release_coeff * self.envelope + (1.0 - self.release_coeff) * level
        };

        if self.envelope > self.threshold {
            x * (self.threshold / self.envelope)
        } else {
            x
        }
    }
}

impl Effect for Limiter {
    fn process(&mut self, channel: &mut [f32]) {
        for sample in channel.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }

    fn name(&self) -> &'static str {
        "Limiter"
    }
}

// ============================================================================
// DISTORTION
// ============================================================================

/// Soft-clipping distortion: `tanh(x * drive)`
#[derive(Debug, Clone)]
pub struct Distortion {
    drive_db: f32,
    pre_gain: f32,
}

impl Distortion {
    pub fn new(drive_db: f32) -> Self {
        let drive_db = if drive_db.is_nan() {
            params::DRIVE_MIN_DB
        } else {
            drive_db.clamp(params::DRIVE_MIN_DB, params::DRIVE_MAX_DB)
        };
        Self {
            drive_db,
            pre_gain: db_to_gain(drive_db),
        }
    }

    pub fn drive_db(&self) -> f32 {
        self.drive_db
    }

    #[inline]
    pub fn process_sample(&self, x: f32) -> f32 {
        (x * self.pre_gain).tanh()
    }
}

impl Effect for Distortion {
    fn process(&mut self, channel: &mut [f32]) {
        for sample in channel.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "Distortion"
    }
}
