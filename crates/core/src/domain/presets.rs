//! Named voice presets and the chain builder
//!
//! Three presets contribute stages in a fixed order: vintage, then mic
//! simulation, then podcast. Intensities are user percentages (0-100).

use crate::domain::dsp::{EffectChain, EffectStageSpec};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Podcast noise gate threshold (dBFS)
pub const PODCAST_GATE_THRESHOLD_DB: f32 = -40.0;
pub const PODCAST_GATE_RATIO: f32 = 4.0;
pub const PODCAST_GATE_ATTACK_MS: f32 = 1.0;
pub const PODCAST_GATE_RELEASE_MS: f32 = 200.0;

pub const PODCAST_COMP_THRESHOLD_DB: f32 = -16.0;
pub const PODCAST_COMP_ATTACK_MS: f32 = 1.0;
pub const PODCAST_COMP_RELEASE_MS: f32 = 100.0;

pub const PODCAST_LIMITER_THRESHOLD_DB: f32 = -1.0;
pub const PODCAST_LIMITER_RELEASE_MS: f32 = 100.0;

/// Which presets are enabled, with their intensity percentages
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PresetSelection {
    /// Vintage radio intensity, `None` when disabled
    pub vintage: Option<f32>,
    /// Microphone proximity simulation (no intensity)
    pub mic_sim: bool,
    /// Podcast dynamics intensity, `None` when disabled
    pub podcast: Option<f32>,
}

impl PresetSelection {
    pub fn is_empty(&self) -> bool {
        self.vintage.is_none() && !self.mic_sim && self.podcast.is_none()
    }

    /// Assemble the effect chain for this selection
    pub fn build_chain(&self) -> EffectChain {
        let mut chain = EffectChain::new();

        if let Some(percent) = self.vintage {
            for stage in vintage_stages(percent / 100.0) {
                chain.push(stage);
            }
        }
        if self.mic_sim {
            for stage in mic_sim_stages() {
                chain.push(stage);
            }
        }
        if let Some(percent) = self.podcast {
            for stage in podcast_stages(percent / 100.0) {
                chain.push(stage);
            }
        }

        debug!(selection = ?self, stages = ?chain.stage_names(), "Built effect chain");
        chain
    }
}

/// Band-limited, driven "old radio" tone; `v` is intensity in 0..=1
pub fn vintage_stages(v: f32) -> [EffectStageSpec; 3] {
    [
        EffectStageSpec::HighPass {
            cutoff_hz: 300.0 + 200.0 * v,
        },
        EffectStageSpec::LowPass {
            cutoff_hz: 3500.0 - 2000.0 * v,
        },
        EffectStageSpec::Distortion { drive_db: 20.0 * v },
    ]
}

/// Rumble cut plus presence and proximity shelves
pub fn mic_sim_stages() -> [EffectStageSpec; 3] {
    [
        EffectStageSpec::HighPass { cutoff_hz: 80.0 },
        EffectStageSpec::HighShelf {
            cutoff_hz: 4000.0,
            gain_db: 3.0,
        },
        EffectStageSpec::LowShelf {
            cutoff_hz: 200.0,
            gain_db: 2.0,
        },
    ]
}

/// Gate, compress, limit; `p` is intensity in 0..=1 and sets the ratio
pub fn podcast_stages(p: f32) -> [EffectStageSpec; 3] {
    [
        EffectStageSpec::NoiseGate {
            threshold_db: PODCAST_GATE_THRESHOLD_DB,
            ratio: PODCAST_GATE_RATIO,
            attack_ms: PODCAST_GATE_ATTACK_MS,
            release_ms: PODCAST_GATE_RELEASE_MS,
        },
        EffectStageSpec::Compressor {
            threshold_db: PODCAST_COMP_THRESHOLD_DB,
            ratio: 2.0 + 4.0 * p,
            attack_ms: PODCAST_COMP_ATTACK_MS,
            release_ms: PODCAST_COMP_RELEASE_MS,
        },
        EffectStageSpec::Limiter {
            threshold_db: PODCAST_LIMITER_THRESHOLD_DB,
            release_ms: PODCAST_LIMITER_RELEASE_MS,
        },
    ]
}
