//! Shared signal generators for the integration suites

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Sine tone at `amplitude`, `duration_secs` long
pub fn generate_sine_wave(
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    duration_secs: f32,
) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs).round() as usize;
    (0..num_samples)
        .map(|i| 2.0 * std::f32::consts::PI * frequency * i as f32 / sample_rate as f32)
        .map(|phase| amplitude * phase.sin())
        .collect()
}

pub fn generate_silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

/// Uniform white noise in `[-amplitude, amplitude]` from a fixed seed
pub fn generate_noise(num_samples: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    if amplitude <= 0.0 {
        return generate_silence(num_samples);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..num_samples)
        .map(|_| rng.gen_range(-amplitude..=amplitude))
        .collect()
}

/// A track whose every sample encodes its own index, for position checks
pub fn generate_ramp(num_samples: usize, scale: f32) -> Vec<f32> {
    (0..num_samples).map(|i| i as f32 * scale).collect()
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
}

pub fn to_db(linear: f32) -> f32 {
    20.0 * linear.max(1e-12).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_is_deterministic_and_bounded() {
        let a = generate_noise(1000, 0.5, 7);
        assert_eq!(a, generate_noise(1000, 0.5, 7));
        assert_ne!(a, generate_noise(1000, 0.5, 8));
        assert!(a.iter().all(|s| s.abs() <= 0.5));
    }

    #[test]
    fn test_sine_rms() {
        let tone = generate_sine_wave(100.0, 1.0, 8000, 1.0);
        assert_eq!(tone.len(), 8000);
        assert!((rms(&tone) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
    }
}
