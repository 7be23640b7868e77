//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod dynamics;
pub mod engine;
pub mod filter;
pub mod mixer;
pub mod pcm;
pub mod presets;
pub mod spectral;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioBuffer, AudioError, ChannelCount, Decoder, Encoder, SampleFormat};
pub use config::{ConfigError, PresetManager, RenderSettings};
pub use dsp::{EffectChain, EffectStageSpec};
pub use engine::{mix_background, process_voice, VoiceEngine};
pub use mixer::{LinearResampler, MixPlan, Resample, ResolvedMix};
pub use pcm::{InterleavedPcm, Pcm16};
pub use presets::PresetSelection;
pub use spectral::{NoiseReductionConfig, SpectralNoiseReducer};
