//! Audio collaborators backed by third-party crates
//!
//! - `decode`: symphonia, every container and codec it ships with
//! - `encode`: hound, 16-bit PCM WAV
//! - `resample`: rubato FFT resampler

pub mod decode;
pub mod encode;
pub mod resample;

pub use decode::SymphoniaDecoder;
pub use encode::WavEncoder;
pub use resample::RubatoResampler;
