//! Voicebed infrastructure: container codecs and the FFT resampler
//!
//! Adapters for the collaborator traits defined in `voicebed-core`.

pub mod audio;

pub use audio::{RubatoResampler, SymphoniaDecoder, WavEncoder};
