//! Render jobs: read, decode, process, encode, write

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;
use tracing::{debug, error, info};
use voicebed_core::domain::audio::{AudioBuffer, Decoder, Encoder};
use voicebed_core::domain::pcm::encode_pcm16;
use voicebed_core::{PresetManager, RenderSettings, VoiceEngine};
use voicebed_infra::{RubatoResampler, SymphoniaDecoder, WavEncoder};

/// One render request, as given on the command line or in a batch file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub voice: PathBuf,
    #[serde(default)]
    pub music: Option<PathBuf>,
    pub out: PathBuf,
    #[serde(default)]
    pub settings: Option<RenderSettings>,
    #[serde(default)]
    pub preset: Option<String>,
    /// Form-style overrides, `key=value`
    #[serde(default)]
    pub set: Vec<String>,
}

/// Batch file layout: `[[jobs]]` tables
#[derive(Debug, Deserialize)]
pub struct BatchFile {
    pub jobs: Vec<RenderJob>,
}

#[derive(Debug, Serialize)]
pub struct RenderReport {
    pub voice: PathBuf,
    pub music: Option<PathBuf>,
    pub output: PathBuf,
    pub sample_rate: u32,
    pub channels: usize,
    pub voice_duration_secs: f64,
    pub output_duration_secs: f64,
    pub noise_reduction: Option<f32>,
    pub stages: Vec<&'static str>,
    pub bitrate_kbps: u32,
}

pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

impl RenderJob {
    /// Resolve relative paths against `base` (the batch file's directory)
    pub fn rebase(mut self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.voice = join(self.voice);
        self.music = self.music.map(join);
        self.out = join(self.out);
        self
    }

    /// Settings precedence: inline settings or preset, then overrides
    pub async fn resolve_settings(
        &self,
        presets: &PresetManager,
    ) -> anyhow::Result<RenderSettings> {
        let mut settings = match (&self.settings, &self.preset) {
            (Some(_), Some(_)) => bail!("a job may name a preset or inline settings, not both"),
            (Some(settings), None) => {
                settings.validate()?;
                *settings
            }
            (None, Some(name)) => presets
                .load_preset(name)
                .await
                .with_context(|| format!("loading preset {name:?}"))?,
            (None, None) => RenderSettings::default(),
        };

        let overrides = self
            .set
            .iter()
            .map(|raw| parse_key_value(raw).map_err(anyhow::Error::msg))
            .collect::<anyhow::Result<Vec<_>>>()?;
        settings.apply_form(overrides);

        debug!(settings = ?settings, "Resolved settings");
        Ok(settings)
    }
}

fn extension_hint(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

async fn read_input(path: &Path) -> anyhow::Result<(Vec<u8>, Option<String>)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok((bytes, extension_hint(path)))
}

/// Run one job; the output file is written only if every step succeeded
pub async fn run_job(job: RenderJob, settings: RenderSettings) -> anyhow::Result<RenderReport> {
    let voice_input = read_input(&job.voice).await?;
    let music_input = match &job.music {
        Some(path) => Some(read_input(path).await?),
        None => None,
    };

    let voice_path = job.voice.clone();
    let music_path = job.music.clone();

    let (voice, output, bytes) = tokio::task::spawn_blocking(move || {
        render_blocking(&settings, voice_input, music_input, &voice_path, music_path.as_deref())
    })
    .await
    .context("render task panicked")??;

    if let Some(parent) = job.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&job.out, &bytes)
        .await
        .with_context(|| format!("writing {}", job.out.display()))?;

    info!(
        output = %job.out.display(),
        bytes = bytes.len(),
        "Wrote render"
    );

    let nr = settings.noise_reduction_config();
    Ok(RenderReport {
        voice: job.voice,
        music: job.music,
        output: job.out,
        sample_rate: output.sample_rate(),
        channels: output.channel_count(),
        voice_duration_secs: voice.duration_secs(),
        output_duration_secs: output.duration_secs(),
        noise_reduction: nr.is_active().then_some(nr.intensity),
        stages: settings.effect_chain().stage_names(),
        bitrate_kbps: settings.output.bitrate_kbps,
    })
}

/// Reports of the jobs that succeeded, in job order, and the failure count
#[derive(Debug)]
pub struct BatchOutcome {
    pub reports: Vec<RenderReport>,
    pub failures: usize,
}

async fn resolve_and_run(job: RenderJob, presets: &PresetManager) -> anyhow::Result<RenderReport> {
    let settings = job.resolve_settings(presets).await?;
    run_job(job, settings).await
}

/// Run every job concurrently; a failing job never stops the others
pub async fn run_batch(jobs: Vec<RenderJob>, base: &Path, presets: &PresetManager) -> BatchOutcome {
    info!(jobs = jobs.len(), "Starting batch");

    let mut tasks = JoinSet::new();
    for (index, job) in jobs.into_iter().enumerate() {
        let job = job.rebase(base);
        let presets = presets.clone();
        tasks.spawn(async move { (index, resolve_and_run(job, &presets).await) });
    }

    let mut reports = Vec::new();
    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(report))) => reports.push((index, report)),
            Ok((index, Err(e))) => {
                failures += 1;
                error!(job = index, error = ?e, "Job failed");
            }
            Err(e) => {
                failures += 1;
                error!(error = %e, "Batch task panicked");
            }
        }
    }
    reports.sort_by_key(|(index, _)| *index);

    info!(succeeded = reports.len(), failed = failures, "Batch complete");
    BatchOutcome {
        reports: reports.into_iter().map(|(_, report)| report).collect(),
        failures,
    }
}

fn render_blocking(
    settings: &RenderSettings,
    voice_input: (Vec<u8>, Option<String>),
    music_input: Option<(Vec<u8>, Option<String>)>,
    voice_path: &Path,
    music_path: Option<&Path>,
) -> anyhow::Result<(AudioBuffer, AudioBuffer, Vec<u8>)> {
    let decoder = SymphoniaDecoder::new();
    let encoder = WavEncoder::new();
    let engine = VoiceEngine::new(RubatoResampler::new());

    let voice = decoder
        .decode(&voice_input.0, voice_input.1.as_deref())
        .with_context(|| format!("decoding voice {}", voice_path.display()))?;

    let music = match (music_input, music_path) {
        (Some((bytes, hint)), Some(path)) => Some(
            decoder
                .decode(&bytes, hint.as_deref())
                .with_context(|| format!("decoding music {}", path.display()))?,
        ),
        _ => None,
    };

    let output = engine.render(&voice, music.as_ref(), settings)?;
    let bytes = encoder.encode(&encode_pcm16(&output), settings.output.bitrate_kbps)?;

    Ok((voice, output, bytes))
}
