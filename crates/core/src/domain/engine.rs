//! Render pipeline: voice processing and background mixing
//!
//! Every call builds its own filters, envelopes and STFT plans and drops
//! them on return, so one engine can serve any number of threads.

use crate::domain::audio::{AudioBuffer, Result};
use crate::domain::config::RenderSettings;
use crate::domain::dsp::EffectChain;
use crate::domain::mixer::{overlay, LinearResampler, MixPlan, Resample};
use crate::domain::spectral::{NoiseReductionConfig, SpectralNoiseReducer};
use tracing::{debug, info};

/// Denoise (when active) and run the effect chain over a voice buffer
///
/// With noise reduction off and an empty chain the input is returned
/// unchanged.
pub fn process_voice(
    buffer: &AudioBuffer,
    noise_reduction: &NoiseReductionConfig,
    chain: &EffectChain,
) -> AudioBuffer {
    let cleaned = if noise_reduction.is_active() {
        SpectralNoiseReducer::new(noise_reduction.intensity, buffer.sample_rate()).process(buffer)
    } else {
        debug!("Noise reduction skipped");
        buffer.clone()
    };

    chain.apply(&cleaned)
}

/// Fit `music` to `voice` per `plan` and sum it in, using linear resampling
pub fn mix_background(
    voice: &AudioBuffer,
    music: &AudioBuffer,
    plan: &MixPlan,
) -> Result<AudioBuffer> {
    mix_background_with(voice, music, plan, &LinearResampler)
}

fn mix_background_with(
    voice: &AudioBuffer,
    music: &AudioBuffer,
    plan: &MixPlan,
    resampler: &dyn Resample,
) -> Result<AudioBuffer> {
    // Length-based steps below count samples at the voice rate
    let music = resampler.resample(music, voice.sample_rate())?;
    let resolved = plan.resolve(voice.sample_rate(), voice.frames());

    match resolved.prepare_bed(&music)? {
        Some(bed) => overlay(voice, &bed),
        None => Ok(voice.clone()),
    }
}

/// Stateless render engine parameterized by its resampler
#[derive(Debug, Clone, Default)]
pub struct VoiceEngine<R: Resample> {
    resampler: R,
}

impl VoiceEngine<LinearResampler> {
    pub fn linear() -> Self {
        Self::new(LinearResampler)
    }
}

impl<R: Resample> VoiceEngine<R> {
    pub fn new(resampler: R) -> Self {
        Self { resampler }
    }

    pub fn process_voice(
        &self,
        buffer: &AudioBuffer,
        noise_reduction: &NoiseReductionConfig,
        chain: &EffectChain,
    ) -> AudioBuffer {
        process_voice(buffer, noise_reduction, chain)
    }

    pub fn mix_background(
        &self,
        voice: &AudioBuffer,
        music: &AudioBuffer,
        plan: &MixPlan,
    ) -> Result<AudioBuffer> {
        mix_background_with(voice, music, plan, &self.resampler)
    }

    /// Full request: voice processing, then the optional background
    pub fn render(
        &self,
        voice: &AudioBuffer,
        music: Option<&AudioBuffer>,
        settings: &RenderSettings,
    ) -> Result<AudioBuffer> {
        let chain = settings.effect_chain();
        info!(
            frames = voice.frames(),
            sample_rate = voice.sample_rate(),
            channels = voice.channel_count(),
            stages = ?chain.stage_names(),
            background = music.is_some(),
            "Rendering"
        );

        let processed = self.process_voice(voice, &settings.noise_reduction_config(), &chain);

        let output = match music {
            Some(music) => self.mix_background(&processed, music, &settings.mix_plan())?,
            None => processed,
        };

        info!(
            frames = output.frames(),
            channels = output.channel_count(),
            peak = output.peak(),
            "Render complete"
        );
        Ok(output)
    }
}
