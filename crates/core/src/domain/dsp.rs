//! Effect stages and the serial effect chain
//!
//! An [`EffectChain`] is pure configuration: an ordered list of
//! [`EffectStageSpec`]. Applying it builds one processor per call and resets
//! it at the start of every channel, so no filter or envelope state outlives
//! a channel or a call.

use crate::domain::audio::AudioBuffer;
use crate::domain::dynamics::{
    Compressor, CompressorParams, Distortion, Limiter, LimiterParams, NoiseGate, NoiseGateParams,
};
use crate::domain::filter::{Filter, FilterResponse};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Core trait for all per-channel audio effects
///
/// All effects process one channel in-place on f32 samples nominally in
/// [-1.0, 1.0]. State carries over between calls until `reset`.
pub trait Effect: Send {
    /// Process a block of samples in-place
    fn process(&mut self, channel: &mut [f32]);

    /// Reset effect state to initial conditions
    fn reset(&mut self);

    /// Get effect name for debugging/display
    fn name(&self) -> &'static str;
}

/// One stage of an effect chain with its parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectStageSpec {
    HighPass {
        cutoff_hz: f32,
    },
    LowPass {
        cutoff_hz: f32,
    },
    HighShelf {
        cutoff_hz: f32,
        gain_db: f32,
    },
    LowShelf {
        cutoff_hz: f32,
        gain_db: f32,
    },
    Distortion {
        drive_db: f32,
    },
    NoiseGate {
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
    },
    Compressor {
        threshold_db: f32,
        ratio: f32,
        attack_ms: f32,
        release_ms: f32,
    },
    Limiter {
        threshold_db: f32,
        release_ms: f32,
    },
}

impl EffectStageSpec {
    /// Get the stage name
    pub fn name(&self) -> &'static str {
        match self {
            EffectStageSpec::HighPass { .. } => "HighPass",
            EffectStageSpec::LowPass { .. } => "LowPass",
            EffectStageSpec::HighShelf { .. } => "HighShelf",
            EffectStageSpec::LowShelf { .. } => "LowShelf",
            EffectStageSpec::Distortion { .. } => "Distortion",
            EffectStageSpec::NoiseGate { .. } => "NoiseGate",
            EffectStageSpec::Compressor { .. } => "Compressor",
            EffectStageSpec::Limiter { .. } => "Limiter",
        }
    }

    /// Build the runtime processor for one channel
    pub fn create_processor(&self, sample_rate: u32) -> StageProcessor {
        match *self {
            EffectStageSpec::HighPass { cutoff_hz } => StageProcessor::Filter(Filter::new(
                FilterResponse::HighPass { cutoff_hz },
                sample_rate,
            )),
            EffectStageSpec::LowPass { cutoff_hz } => StageProcessor::Filter(Filter::new(
                FilterResponse::LowPass { cutoff_hz },
                sample_rate,
            )),
            EffectStageSpec::HighShelf { cutoff_hz, gain_db } => StageProcessor::Filter(
                Filter::new(FilterResponse::HighShelf { cutoff_hz, gain_db }, sample_rate),
            ),
            EffectStageSpec::LowShelf { cutoff_hz, gain_db } => StageProcessor::Filter(
                Filter::new(FilterResponse::LowShelf { cutoff_hz, gain_db }, sample_rate),
            ),
            EffectStageSpec::Distortion { drive_db } => {
                StageProcessor::Distortion(Distortion::new(drive_db))
            }
            EffectStageSpec::NoiseGate {
                threshold_db,
                ratio,
                attack_ms,
                release_ms,
            } => StageProcessor::NoiseGate(NoiseGate::new(
                NoiseGateParams {
                    threshold_db,
                    ratio,
                    attack_ms,
                    release_ms,
                },
                sample_rate,
            )),
            EffectStageSpec::Compressor {
                threshold_db,
                ratio,
                attack_ms,
                release_ms,
            } => StageProcessor::Compressor(Compressor::new(
                CompressorParams {
                    threshold_db,
                    ratio,
                    attack_ms,
                    release_ms,
                },
                sample_rate,
            )),
            EffectStageSpec::Limiter {
                threshold_db,
                release_ms,
            } => StageProcessor::Limiter(Limiter::new(
                LimiterParams {
                    threshold_db,
                    release_ms,
                },
                sample_rate,
            )),
        }
    }
}

/// Runtime state of one stage
///
/// The stage set is closed, so dispatch is a plain match.
#[derive(Debug, Clone)]
pub enum StageProcessor {
    Filter(Filter),
    Distortion(Distortion),
    NoiseGate(NoiseGate),
    Compressor(Compressor),
    Limiter(Limiter),
}

impl Effect for StageProcessor {
    fn process(&mut self, channel: &mut [f32]) {
        match self {
            StageProcessor::Filter(f) => f.process(channel),
            StageProcessor::Distortion(d) => d.process(channel),
            StageProcessor::NoiseGate(g) => g.process(channel),
            StageProcessor::Compressor(c) => c.process(channel),
            StageProcessor::Limiter(l) => l.process(channel),
        }
    }

    fn reset(&mut self) {
        match self {
            StageProcessor::Filter(f) => f.reset(),
            StageProcessor::Distortion(d) => d.reset(),
            StageProcessor::NoiseGate(g) => g.reset(),
            StageProcessor::Compressor(c) => c.reset(),
            StageProcessor::Limiter(l) => l.reset(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            StageProcessor::Filter(f) => f.name(),
            StageProcessor::Distortion(d) => d.name(),
            StageProcessor::NoiseGate(g) => g.name(),
            StageProcessor::Compressor(c) => c.name(),
            StageProcessor::Limiter(l) => l.name(),
        }
    }
}

// ============================================================================
// EFFECT CHAIN
// ============================================================================

/// Serial effect chain
///
/// Stages run in the order they were pushed. An empty chain is an exact
/// passthrough.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectChain {
    stages: Vec<EffectStageSpec>,
}

impl EffectChain {
    /// Create a new empty effect chain
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Add a stage to the end of the chain
    pub fn push(&mut self, stage: EffectStageSpec) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[EffectStageSpec] {
        &self.stages
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(EffectStageSpec::name).collect()
    }

    /// Create a runtime processor for one channel
    pub fn create_processor(&self, sample_rate: u32) -> ChainProcessor {
        ChainProcessor {
            stages: self
                .stages
                .iter()
                .map(|stage| stage.create_processor(sample_rate))
                .collect(),
        }
    }

    /// Run every channel of `buffer` through the chain
    ///
    /// Delay lines and envelopes are cleared at the start of each channel.
    pub fn apply(&self, buffer: &AudioBuffer) -> AudioBuffer {
        if self.stages.is_empty() {
            return buffer.clone();
        }

        debug!(
            stages = ?self.stage_names(),
            channels = buffer.channel_count(),
            frames = buffer.frames(),
            "Applying effect chain"
        );

        let mut processor = self.create_processor(buffer.sample_rate());
        let channels = buffer
            .channels()
            .iter()
            .map(|samples| {
                processor.reset();
                let mut out = samples.clone();
                processor.process(&mut out);
                out
            })
            .collect();

        AudioBuffer::from_parts(channels, buffer.sample_rate())
    }
}

impl FromIterator<EffectStageSpec> for EffectChain {
    fn from_iter<I: IntoIterator<Item = EffectStageSpec>>(iter: I) -> Self {
        Self {
            stages: iter.into_iter().collect(),
        }
    }
}

/// Runtime processor for an effect chain, for a single channel
///
/// Holds the actual stage instances with their state.
/// Create from an [`EffectChain`] configuration.
#[derive(Debug, Clone)]
pub struct ChainProcessor {
    stages: Vec<StageProcessor>,
}

impl ChainProcessor {
    /// Process a channel through all stages in order
    pub fn process(&mut self, channel: &mut [f32]) {
        for stage in &mut self.stages {
            stage.process(channel);
        }
    }

    /// Reset all stages in the chain
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
