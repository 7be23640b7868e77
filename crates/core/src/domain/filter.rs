//! Filter bank: first-order high/low-pass and biquad shelving filters
//!
//! Every filter keeps its own delay elements, so one instance must be used
//! per channel. State starts at zero and persists for the whole buffer.

use crate::domain::dsp::Effect;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;
use tracing::trace;

/// Lowest cutoff accepted by any filter (Hz)
pub const MIN_CUTOFF_HZ: f32 = 1.0;
/// Highest cutoff as a fraction of the sample rate
pub const MAX_CUTOFF_RATIO: f32 = 0.49;
/// Shelf gain range (dB)
pub const SHELF_GAIN_LIMIT_DB: f32 = 12.0;
/// Q used for every shelf (Butterworth)
pub const SHELF_Q: f32 = 0.707;

/// Keep a cutoff strictly inside (0, Nyquist) so coefficients stay finite
#[inline]
pub fn clamp_cutoff(cutoff_hz: f32, sample_rate: f32) -> f32 {
    let max = (sample_rate * MAX_CUTOFF_RATIO).max(MIN_CUTOFF_HZ);
    if cutoff_hz.is_nan() {
        return max;
    }
    cutoff_hz.clamp(MIN_CUTOFF_HZ, max)
}

// ============================================================================
// FIRST-ORDER SECTION
// ============================================================================

/// One-pole/one-zero coefficients from the bilinear transform
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OnePoleCoeffs {
    pub b0: f32,
    pub b1: f32,
    pub a1: f32,
}

impl OnePoleCoeffs {
    /// First-order high-pass, -3 dB at `cutoff_hz`
    #[must_use]
    pub fn high_pass(sample_rate: f32, cutoff_hz: f32) -> Self {
        let n = (PI * clamp_cutoff(cutoff_hz, sample_rate) / sample_rate).tan();
        let norm = 1.0 / (1.0 + n);
        Self {
            b0: norm,
            b1: -norm,
            a1: (n - 1.0) * norm,
        }
    }

    /// First-order low-pass, -3 dB at `cutoff_hz`
    #[must_use]
    pub fn low_pass(sample_rate: f32, cutoff_hz: f32) -> Self {
        let n = (PI * clamp_cutoff(cutoff_hz, sample_rate) / sample_rate).tan();
        let norm = 1.0 / (1.0 + n);
        Self {
            b0: n * norm,
            b1: n * norm,
            a1: (n - 1.0) * norm,
        }
    }
}

/// Stateful first-order section
#[derive(Debug, Clone, PartialEq)]
pub struct OnePoleFilter {
    coeffs: OnePoleCoeffs,
    x1: f32,
    y1: f32,
}

impl OnePoleFilter {
    pub fn new(coeffs: OnePoleCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            y1: 0.0,
        }
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 - self.coeffs.a1 * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

// ============================================================================
// BIQUAD SECTION
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed to avoid per-sample calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Calculate coefficients for a low shelf filter
    ///
    /// Boosts or cuts frequencies below the corner frequency.
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Corner frequency in Hz
    /// - `gain_db`: Boost/cut in decibels (clamped to +/- 12dB)
    /// - `q`: Q factor (resonance), typically 0.5-1.0
    #[must_use]
    pub fn low_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(-SHELF_GAIN_LIMIT_DB, SHELF_GAIN_LIMIT_DB);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * clamp_cutoff(freq, sample_rate) / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        // Normalize by a0
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Calculate coefficients for a high shelf filter
    ///
    /// Boosts or cuts frequencies above the corner frequency.
    #[must_use]
    pub fn high_shelf(sample_rate: f32, freq: f32, gain_db: f32, q: f32) -> Self {
        let gain_db = gain_db.clamp(-SHELF_GAIN_LIMIT_DB, SHELF_GAIN_LIMIT_DB);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * clamp_cutoff(freq, sample_rate) / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha);

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + 2.0 * a.sqrt() * alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - 2.0 * a.sqrt() * alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

/// Stateful biquad filter using Direct Form I
#[derive(Debug, Clone, PartialEq)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl BiquadFilter {
    /// Create a new biquad filter with given coefficients
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x
            + self.coeffs.b1 * self.x1
            + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// FILTER STAGE
// ============================================================================

/// Which response a [`Filter`] realizes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FilterResponse {
    HighPass { cutoff_hz: f32 },
    LowPass { cutoff_hz: f32 },
    HighShelf { cutoff_hz: f32, gain_db: f32 },
    LowShelf { cutoff_hz: f32, gain_db: f32 },
}

#[derive(Debug, Clone, PartialEq)]
enum Section {
    FirstOrder(OnePoleFilter),
    Biquad(BiquadFilter),
}

/// One filter stage of the bank, for a single channel
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    response: FilterResponse,
    section: Section,
}

impl Filter {
    /// Compute coefficients once for the given response and rate
    pub fn new(response: FilterResponse, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let section = match response {
            FilterResponse::HighPass { cutoff_hz } => {
                Section::FirstOrder(OnePoleFilter::new(OnePoleCoeffs::high_pass(sr, cutoff_hz)))
            }
            FilterResponse::LowPass { cutoff_hz } => {
                Section::FirstOrder(OnePoleFilter::new(OnePoleCoeffs::low_pass(sr, cutoff_hz)))
            }
            FilterResponse::HighShelf { cutoff_hz, gain_db } => Section::Biquad(BiquadFilter::new(
                BiquadCoeffs::high_shelf(sr, cutoff_hz, gain_db, SHELF_Q),
            )),
            FilterResponse::LowShelf { cutoff_hz, gain_db } => Section::Biquad(BiquadFilter::new(
                BiquadCoeffs::low_shelf(sr, cutoff_hz, gain_db, SHELF_Q),
            )),
        };

        trace!(?response, sample_rate, "Filter coefficients computed");

        Self { response, section }
    }

    pub fn response(&self) -> FilterResponse {
        self.response
    }

    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        match &mut self.section {
            Section::FirstOrder(f) => f.process_sample(x),
            Section::Biquad(f) => f.process_sample(x),
        }
    }
}

impl Effect for Filter {
    fn process(&mut self, channel: &mut [f32]) {
        for sample in channel.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        match &mut self.section {
            Section::FirstOrder(f) => f.reset(),
            Section::Biquad(f) => f.reset(),
        }
    }

    fn name(&self) -> &'static str {
        match self.response {
            FilterResponse::HighPass { .. } => "HighPass",
            FilterResponse::LowPass { .. } => "LowPass",
            FilterResponse::HighShelf { .. } => "HighShelf",
            FilterResponse::LowShelf { .. } => "LowShelf",
        }
    }
}
