//! Stationary spectral-gating noise reduction
//!
//! The whole channel is treated as one stationary noise class. Per
//! frequency bin, the dB magnitude statistics over every STFT frame give a
//! threshold (mean + 1.5 std). Bins above it are signal; everything else is
//! attenuated by `intensity`. The binary mask is smoothed over frequency
//! and time before it is applied, and phase is left untouched.
//!
//! The channel is analysed in several streaming passes so that only the
//! binary mask (one byte per time-frequency bin) is held in memory.

use crate::domain::audio::AudioBuffer;
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::{debug, trace};

pub const N_FFT: usize = 1024;
pub const HOP: usize = N_FFT / 4;
/// Standard deviations above the mean a bin must reach to count as signal
pub const N_STD_THRESHOLD: f32 = 1.5;
/// Dynamic range kept below each bin's peak
pub const TOP_DB: f32 = 80.0;
pub const FREQ_SMOOTH_HZ: f32 = 500.0;
pub const TIME_SMOOTH_MS: f32 = 50.0;

const AMPLITUDE_FLOOR: f32 = 1e-10;

/// Whether and how hard to reduce noise
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseReductionConfig {
    pub enabled: bool,
    /// Fraction of estimated noise removed, 0.0..=1.0
    pub intensity: f32,
}

impl Default for NoiseReductionConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

impl NoiseReductionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            intensity: 0.0,
        }
    }

    /// Build from a user percentage (0-100)
    pub fn from_percent(enabled: bool, percent: f32) -> Self {
        Self {
            enabled,
            intensity: (percent / 100.0).clamp(0.0, 1.0),
        }
    }

    /// The reducer only runs when enabled with a positive intensity
    pub fn is_active(&self) -> bool {
        self.enabled && self.intensity > 0.0
    }
}

/// Short-time Fourier transform with a periodic Hann window
struct Stft {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frame: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,
}

impl Stft {
    fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(N_FFT);
        let ifft = planner.plan_fft_inverse(N_FFT);
        let fft_scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let ifft_scratch = vec![Complex::new(0.0, 0.0); ifft.get_inplace_scratch_len()];
        let window = (0..N_FFT)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / N_FFT as f32).cos()))
            .collect();

        Self {
            fft,
            ifft,
            window,
            frame: vec![Complex::new(0.0, 0.0); N_FFT],
            fft_scratch,
            ifft_scratch,
        }
    }

    /// Signal centre-padded with `N_FFT / 2` zeros on both sides
    fn pad(signal: &[f32]) -> Vec<f32> {
        let mut padded = vec![0.0; signal.len() + N_FFT];
        padded[N_FFT / 2..N_FFT / 2 + signal.len()].copy_from_slice(signal);
        padded
    }

    fn frame_count(signal_len: usize) -> usize {
        1 + signal_len / HOP
    }

    /// Analyse every frame, handing the full spectrum to `f`
    fn analyse<F>(&mut self, padded: &[f32], frames: usize, mut f: F)
    where
        F: FnMut(usize, &[Complex<f32>]),
    {
        for t in 0..frames {
            self.load_frame(padded, t);
            f(t, &self.frame);
        }
    }

    /// Analyse, let `f` modify each spectrum, then resynthesize by weighted
    /// overlap-add
    fn transform<F>(&mut self, padded: &[f32], frames: usize, mut f: F) -> Vec<f32>
    where
        F: FnMut(usize, &mut [Complex<f32>]),
    {
        let mut out = vec![0.0f32; padded.len()];
        let mut norm = vec![0.0f32; padded.len()];
        let scale = 1.0 / N_FFT as f32;

        for t in 0..frames {
            self.load_frame(padded, t);
            f(t, &mut self.frame);
            self.ifft
                .process_with_scratch(&mut self.frame, &mut self.ifft_scratch);

            let start = t * HOP;
            for (i, bin) in self.frame.iter().enumerate() {
                let w = self.window[i];
                out[start + i] += bin.re * scale * w;
                norm[start + i] += w * w;
            }
        }

        for (sample, &weight) in out.iter_mut().zip(norm.iter()) {
            if weight > 1e-8 {
                *sample /= weight;
            } else {
                *sample = 0.0;
            }
        }
        out
    }

    fn load_frame(&mut self, padded: &[f32], t: usize) {
        let start = t * HOP;
        for (i, bin) in self.frame.iter_mut().enumerate() {
            *bin = Complex::new(padded[start + i] * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.frame, &mut self.fft_scratch);
    }
}

#[inline]
fn amplitude_db(bin: &Complex<f32>) -> f32 {
    20.0 * bin.norm().max(AMPLITUDE_FLOOR).log10()
}

/// Triangular kernel `1 - |d| / (half + 1)` for `d` in `-half..=half`, unit sum
fn triangular_kernel(half: usize) -> Vec<f32> {
    let weights: Vec<f32> = (0..=2 * half)
        .map(|i| {
            let d = (i as isize - half as isize).unsigned_abs() as f32;
            1.0 - d / (half as f32 + 1.0)
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Stationary spectral-gating noise reducer
pub struct SpectralNoiseReducer {
    intensity: f32,
    bins: usize,
    freq_kernel: Vec<f32>,
    time_kernel: Vec<f32>,
    stft: Stft,
}

impl SpectralNoiseReducer {
    /// Create a reducer; `intensity` is clamped to 0.0..=1.0
    pub fn new(intensity: f32, sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let freq_half = (FREQ_SMOOTH_HZ / (sr / (N_FFT as f32 / 2.0))).floor().max(0.0) as usize;
        let time_half = (TIME_SMOOTH_MS / (HOP as f32 / sr * 1000.0)).floor().max(0.0) as usize;

        trace!(freq_half, time_half, sample_rate, "Noise reducer smoothing kernel");

        Self {
            intensity: if intensity.is_nan() {
                0.0
            } else {
                intensity.clamp(0.0, 1.0)
            },
            bins: N_FFT / 2 + 1,
            freq_kernel: triangular_kernel(freq_half),
            time_kernel: triangular_kernel(time_half),
            stft: Stft::new(),
        }
    }

    /// Denoise every channel independently
    pub fn process(&mut self, buffer: &AudioBuffer) -> AudioBuffer {
        debug!(
            intensity = self.intensity,
            channels = buffer.channel_count(),
            frames = buffer.frames(),
            "Spectral noise reduction"
        );

        let channels = buffer
            .channels()
            .iter()
            .map(|samples| self.process_channel(samples))
            .collect();
        AudioBuffer::from_parts(channels, buffer.sample_rate())
    }

    /// Denoise one channel; output length equals input length
    pub fn process_channel(&mut self, signal: &[f32]) -> Vec<f32> {
        if signal.is_empty() {
            return Vec::new();
        }

        let bins = self.bins;
        let padded = Stft::pad(signal);
        let frames = Stft::frame_count(signal.len());

        // Pass 1: per-bin peak
        let mut peak_db = vec![f32::NEG_INFINITY; bins];
        self.stft.analyse(&padded, frames, |_, spectrum| {
            for (peak, bin) in peak_db.iter_mut().zip(&spectrum[..bins]) {
                *peak = peak.max(amplitude_db(bin));
            }
        });
        let floor_db: Vec<f32> = peak_db.iter().map(|p| p - TOP_DB).collect();

        // Pass 2: mean and population std of the floored dB (Welford)
        let mut mean = vec![0.0f64; bins];
        let mut m2 = vec![0.0f64; bins];
        self.stft.analyse(&padded, frames, |t, spectrum| {
            let n = (t + 1) as f64;
            for k in 0..bins {
                let x = amplitude_db(&spectrum[k]).max(floor_db[k]) as f64;
                let delta = x - mean[k];
                mean[k] += delta / n;
                m2[k] += delta * (x - mean[k]);
            }
        });
        let threshold: Vec<f32> = mean
            .iter()
            .zip(m2.iter())
            .map(|(&mu, &m)| (mu + N_STD_THRESHOLD as f64 * (m / frames as f64).sqrt()) as f32)
            .collect();

        // Pass 3: binary signal mask
        let mut mask = vec![false; frames * bins];
        self.stft.analyse(&padded, frames, |t, spectrum| {
            let row = &mut mask[t * bins..(t + 1) * bins];
            for k in 0..bins {
                row[k] = amplitude_db(&spectrum[k]).max(floor_db[k]) > threshold[k];
            }
        });

        let signal_bins = mask.iter().filter(|&&m| m).count();
        debug!(
            frames,
            signal_fraction = signal_bins as f32 / mask.len() as f32,
            "Noise profile estimated"
        );

        // Pass 4: smooth the mask and apply it
        let intensity = self.intensity;
        let freq_kernel = &self.freq_kernel;
        let time_kernel = &self.time_kernel;
        let time_half = time_kernel.len() / 2;

        let mut rows: VecDeque<Vec<f32>> = VecDeque::with_capacity(time_kernel.len());
        let mut first_row = 0usize;
        let mut smoothed = vec![0.0f32; bins];

        let out = self.stft.transform(&padded, frames, |t, spectrum| {
            let hi = (t + time_half).min(frames - 1);
            while first_row + rows.len() <= hi {
                let r = first_row + rows.len();
                rows.push_back(smooth_row(&mask[r * bins..(r + 1) * bins], freq_kernel));
            }
            let lo = t.saturating_sub(time_half);
            while first_row < lo {
                rows.pop_front();
                first_row += 1;
            }

            smoothed.iter_mut().for_each(|s| *s = 0.0);
            for (offset, row) in rows.iter().enumerate() {
                let r = first_row + offset;
                let w = time_kernel[r + time_half - t];
                for (s, &m) in smoothed.iter_mut().zip(row.iter()) {
                    *s += w * m;
                }
            }

            for k in 0..bins {
                let gain = smoothed[k] * intensity + (1.0 - intensity);
                spectrum[k] *= gain;
                // Mirror bins keep the spectrum Hermitian
                if k != 0 && k != N_FFT / 2 {
                    spectrum[N_FFT - k] *= gain;
                }
            }
        });

        out[N_FFT / 2..N_FFT / 2 + signal.len()].to_vec()
    }
}

/// Smooth one mask row over frequency with zero padding at the edges
fn smooth_row(row: &[bool], kernel: &[f32]) -> Vec<f32> {
    let half = kernel.len() / 2;
    let len = row.len();
    (0..len)
        .map(|k| {
            let lo = k.saturating_sub(half);
            let hi = (k + half).min(len - 1);
            (lo..=hi)
                .filter(|&j| row[j])
                .map(|j| kernel[j + half - k])
                .sum()
        })
        .collect()
}
