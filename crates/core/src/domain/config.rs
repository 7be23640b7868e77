//! Render settings and named presets
//!
//! This module provides:
//! - `RenderSettings`, the complete set of user choices for one render
//! - Form-style `key=value` parsing with per-field fallbacks
//! - TOML load/save and a directory-backed preset store

use crate::domain::dsp::EffectChain;
use crate::domain::mixer::{MixPlan, DEFAULT_FADE_LEN_S, DEFAULT_VOLUME_PERCENT};
use crate::domain::presets::PresetSelection;
use crate::domain::spectral::NoiseReductionConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Form field names accepted by [`RenderSettings::apply_form`]
pub mod keys {
    pub const ENABLE_NR: &str = "enable_nr";
    pub const VAL_NR: &str = "val_nr";
    pub const ENABLE_VINTAGE: &str = "enable_vintage";
    pub const VAL_VINTAGE: &str = "val_vintage";
    pub const ENABLE_MIC: &str = "enable_mic";
    pub const ENABLE_PODCAST: &str = "enable_podcast";
    pub const VAL_PODCAST: &str = "val_podcast";
    pub const BG_START: &str = "bg_start";
    pub const BG_END: &str = "bg_end";
    pub const BG_VOL: &str = "bg_vol";
    pub const BG_FADE_START: &str = "bg_fade_start";
    pub const BG_FADE_LEN: &str = "bg_fade_len";
    pub const BITRATE: &str = "bitrate";

    pub const ALL: &[&str] = &[
        ENABLE_NR,
        VAL_NR,
        ENABLE_VINTAGE,
        VAL_VINTAGE,
        ENABLE_MIC,
        ENABLE_PODCAST,
        VAL_PODCAST,
        BG_START,
        BG_END,
        BG_VOL,
        BG_FADE_START,
        BG_FADE_LEN,
        BITRATE,
    ];
}

/// A toggle with an intensity percentage (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IntensitySettings {
    pub enabled: bool,
    pub percent: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToggleSettings {
    pub enabled: bool,
}

/// Background bed timing and level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    pub start_s: f64,
    /// 0 = play to the end of the track
    pub end_s: f64,
    pub volume_percent: f32,
    /// 0 = no fade
    pub fade_start_s: f64,
    pub fade_len_s: f64,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            start_s: 0.0,
            end_s: 0.0,
            volume_percent: DEFAULT_VOLUME_PERCENT,
            fade_start_s: 0.0,
            fade_len_s: DEFAULT_FADE_LEN_S,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub bitrate_kbps: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
        }
    }
}

/// Everything one render needs besides the audio itself
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RenderSettings {
    pub noise_reduction: IntensitySettings,
    pub vintage: IntensitySettings,
    pub mic_sim: ToggleSettings,
    pub podcast: IntensitySettings,
    pub background: BackgroundSettings,
    pub output: OutputSettings,
}

// ============================================================================
// FORM PARSING
// ============================================================================

/// Parse a finite number, `None` on anything else
fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_percent(field: &str, raw: &str, default: f32) -> f32 {
    match parse_number(raw) {
        Some(v) if (0.0..=100.0).contains(&v) => v as f32,
        Some(v) => {
            let clamped = v.clamp(0.0, 100.0) as f32;
            warn!(field, value = v, clamped, "Percentage out of range, clamping");
            clamped
        }
        None => {
            warn!(field, raw, default, "Non-numeric value, using default");
            default
        }
    }
}

/// Parse a pair of numbers that fall back together
fn parse_pair(
    fields: (&str, &str),
    raw: (Option<&str>, Option<&str>),
    current: (f64, f64),
    default: (f64, f64),
) -> (f64, f64) {
    let first = raw.0.map(parse_number);
    let second = raw.1.map(parse_number);

    if matches!(first, Some(None)) || matches!(second, Some(None)) {
        warn!(
            fields = ?fields,
            raw = ?raw,
            default = ?default,
            "Non-numeric value, using defaults for the pair"
        );
        return default;
    }

    (
        first.flatten().unwrap_or(current.0),
        second.flatten().unwrap_or(current.1),
    )
}

impl RenderSettings {
    /// Build settings from form-style fields
    ///
    /// Missing fields keep their defaults; `enable_*` is only on for the
    /// literal `"true"`.
    pub fn from_form<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();
        settings.apply_form(pairs);
        settings
    }

    /// Overlay form-style fields onto these settings
    ///
    /// Only the fields present are touched. Malformed values fall back to
    /// their defaults with a warning; unknown keys are ignored with a
    /// warning.
    pub fn apply_form<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let form: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().trim().to_string(), v.as_ref().to_string()))
            .collect();
        let get = |key: &str| form.get(key).map(String::as_str);

        for key in form.keys() {
            if !keys::ALL.contains(&key.as_str()) {
                warn!(key = key.as_str(), "Unknown setting ignored");
            }
        }

        if let Some(v) = get(keys::ENABLE_NR) {
            self.noise_reduction.enabled = v == "true";
        }
        if let Some(v) = get(keys::VAL_NR) {
            self.noise_reduction.percent = parse_percent(keys::VAL_NR, v, 0.0);
        }
        if let Some(v) = get(keys::ENABLE_VINTAGE) {
            self.vintage.enabled = v == "true";
        }
        if let Some(v) = get(keys::VAL_VINTAGE) {
            self.vintage.percent = parse_percent(keys::VAL_VINTAGE, v, 0.0);
        }
        if let Some(v) = get(keys::ENABLE_MIC) {
            self.mic_sim.enabled = v == "true";
        }
        if let Some(v) = get(keys::ENABLE_PODCAST) {
            self.podcast.enabled = v == "true";
        }
        if let Some(v) = get(keys::VAL_PODCAST) {
            self.podcast.percent = parse_percent(keys::VAL_PODCAST, v, 0.0);
        }

        let bg = &mut self.background;
        (bg.start_s, bg.end_s) = parse_pair(
            (keys::BG_START, keys::BG_END),
            (get(keys::BG_START), get(keys::BG_END)),
            (bg.start_s, bg.end_s),
            (0.0, 0.0),
        );
        if let Some(v) = get(keys::BG_VOL) {
            bg.volume_percent = parse_percent(keys::BG_VOL, v, DEFAULT_VOLUME_PERCENT);
        }
        (bg.fade_start_s, bg.fade_len_s) = parse_pair(
            (keys::BG_FADE_START, keys::BG_FADE_LEN),
            (get(keys::BG_FADE_START), get(keys::BG_FADE_LEN)),
            (bg.fade_start_s, bg.fade_len_s),
            (0.0, DEFAULT_FADE_LEN_S),
        );

        if let Some(v) = get(keys::BITRATE) {
            self.output.bitrate_kbps = match v.trim().parse::<u32>() {
                Ok(kbps) if kbps > 0 => kbps,
                _ => {
                    warn!(
                        raw = v,
                        default = DEFAULT_BITRATE_KBPS,
                        "Invalid bitrate, using default"
                    );
                    DEFAULT_BITRATE_KBPS
                }
            };
        }

        debug!(settings = ?self, "Applied form fields");
    }

    /// Check values loaded from a file
    pub fn validate(&self) -> Result<()> {
        let percents = [
            ("noise_reduction.percent", self.noise_reduction.percent),
            ("vintage.percent", self.vintage.percent),
            ("podcast.percent", self.podcast.percent),
            ("background.volume_percent", self.background.volume_percent),
        ];
        for (name, value) in percents {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within 0-100, got {value}"
                )));
            }
        }

        let seconds = [
            ("background.start_s", self.background.start_s),
            ("background.end_s", self.background.end_s),
            ("background.fade_start_s", self.background.fade_start_s),
            ("background.fade_len_s", self.background.fade_len_s),
        ];
        for (name, value) in seconds {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }

        if self.output.bitrate_kbps == 0 {
            return Err(ConfigError::Invalid(
                "output.bitrate_kbps must be positive".to_string(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Engine inputs
    // ------------------------------------------------------------------------

    pub fn noise_reduction_config(&self) -> NoiseReductionConfig {
        NoiseReductionConfig::from_percent(
            self.noise_reduction.enabled,
            self.noise_reduction.percent,
        )
    }

    pub fn preset_selection(&self) -> PresetSelection {
        PresetSelection {
            vintage: self.vintage.enabled.then_some(self.vintage.percent),
            mic_sim: self.mic_sim.enabled,
            podcast: self.podcast.enabled.then_some(self.podcast.percent),
        }
    }

    pub fn effect_chain(&self) -> EffectChain {
        self.preset_selection().build_chain()
    }

    pub fn mix_plan(&self) -> MixPlan {
        MixPlan {
            trim_start_s: self.background.start_s,
            trim_end_s: self.background.end_s,
            volume_percent: self.background.volume_percent,
            fade_start_s: self.background.fade_start_s,
            fade_len_s: self.background.fade_len_s,
        }
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Load settings from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading settings");

        let contents = fs::read_to_string(path).await?;
        let settings: Self = toml::from_str(&contents)?;
        settings.validate()?;

        debug!("Settings loaded successfully");
        Ok(settings)
    }

    /// Save settings to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving settings");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(path, self.to_toml()?).await?;

        debug!("Settings saved successfully");
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

// ============================================================================
// PRESET STORE
// ============================================================================

/// Named settings files (`<name>.toml`) in one directory
#[derive(Debug, Clone)]
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    /// Create a new preset manager
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    /// Get the default preset directory
    ///
    /// `~/.config/voicebed/presets` on Linux, the platform config dir elsewhere
    pub fn default_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("voicebed").join("presets"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn preset_dir(&self) -> &Path {
        &self.preset_dir
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(ConfigError::Invalid(format!(
                "preset name {name:?} may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        if !self.preset_dir.exists() {
            debug!(path = %self.preset_dir.display(), "Preset directory missing");
            return Ok(presets);
        }

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<RenderSettings> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        RenderSettings::load_from_file(&path).await
    }

    /// Save a preset by name
    #[instrument(skip(self, settings))]
    pub async fn save_preset(&self, name: &str, settings: &RenderSettings) -> Result<()> {
        settings.validate()?;
        let path = self.preset_path(name)?;
        settings.save_to_file(&path).await
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dsp::EffectStageSpec;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = RenderSettings::default();
        assert_eq!(settings.background.volume_percent, 20.0);
        assert_eq!(settings.background.fade_len_s, 3.0);
        assert_eq!(settings.background.fade_start_s, 0.0);
        assert_eq!(settings.output.bitrate_kbps, 192);
        assert!(settings.effect_chain().is_empty());
        assert!(!settings.noise_reduction_config().is_active());
    }

    #[test]
    fn test_settings_serialization() {
        let mut settings = RenderSettings::default();
        settings.podcast = IntensitySettings {
            enabled: true,
            percent: 40.0,
        };

        let toml_str = settings.to_toml().unwrap();
        let parsed: RenderSettings = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, settings);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: RenderSettings = toml::from_str("[podcast]\nenabled = true\n").unwrap();
        assert!(parsed.podcast.enabled);
        assert_eq!(parsed.podcast.percent, 0.0);
        assert_eq!(parsed.background.volume_percent, 20.0);
    }

    #[test]
    fn test_from_form_maps_fields() {
        let settings = RenderSettings::from_form([
            ("enable_nr", "true"),
            ("val_nr", "35"),
            ("enable_vintage", "false"),
            ("val_vintage", "80"),
            ("enable_mic", "true"),
            ("enable_podcast", "true"),
            ("val_podcast", "50"),
            ("bg_start", "1.5"),
            ("bg_end", "12"),
            ("bg_vol", "50"),
            ("bg_fade_start", "5"),
            ("bg_fade_len", "2"),
        ]);

        assert!(settings.noise_reduction.enabled);
        assert_eq!(settings.noise_reduction_config().intensity, 0.35);
        assert!(!settings.vintage.enabled);
        assert!(settings.mic_sim.enabled);

        let plan = settings.mix_plan();
        assert_eq!(plan.trim_start_s, 1.5);
        assert_eq!(plan.trim_end_s, 12.0);
        assert_eq!(plan.volume_percent, 50.0);
        assert_eq!(plan.fade_start_s, 5.0);
        assert_eq!(plan.fade_len_s, 2.0);

        assert_eq!(
            settings.effect_chain().stage_names(),
            vec!["HighPass", "HighShelf", "LowShelf", "NoiseGate", "Compressor", "Limiter"]
        );
    }

    #[test]
    fn test_enable_requires_literal_true() {
        for value in ["True", "1", "yes", "on", ""] {
            let settings = RenderSettings::from_form([("enable_podcast", value)]);
            assert!(!settings.podcast.enabled, "{value:?} must not enable");
        }
    }

    #[test]
    fn test_non_numeric_trim_falls_back_together() {
        let settings = RenderSettings::from_form([("bg_start", "abc"), ("bg_end", "10")]);
        assert_eq!(settings.background.start_s, 0.0);
        assert_eq!(settings.background.end_s, 0.0);
    }

    #[test]
    fn test_non_numeric_fade_falls_back_together() {
        let settings = RenderSettings::from_form([("bg_fade_start", "4"), ("bg_fade_len", "x")]);
        assert_eq!(settings.background.fade_start_s, 0.0);
        assert_eq!(settings.background.fade_len_s, 3.0);
    }

    #[test]
    fn test_percent_fallback_and_clamp() {
        let settings = RenderSettings::from_form([
            ("val_podcast", "150"),
            ("val_vintage", "-5"),
            ("bg_vol", "loud"),
            ("val_nr", "NaN"),
        ]);
        assert_eq!(settings.podcast.percent, 100.0);
        assert_eq!(settings.vintage.percent, 0.0);
        assert_eq!(settings.background.volume_percent, 20.0);
        assert_eq!(settings.noise_reduction.percent, 0.0);
    }

    #[test]
    fn test_apply_form_only_touches_present_fields() {
        let mut settings = RenderSettings::default();
        settings.podcast.enabled = true;
        settings.background.end_s = 9.0;

        settings.apply_form([("bg_start", "2"), ("bitrate", "128")]);

        assert!(settings.podcast.enabled);
        assert_eq!(settings.background.start_s, 2.0);
        assert_eq!(settings.background.end_s, 9.0);
        assert_eq!(settings.output.bitrate_kbps, 128);
    }

    #[test]
    fn test_vintage_chain_from_settings() {
        let settings =
            RenderSettings::from_form([("enable_vintage", "true"), ("val_vintage", "100")]);
        assert_eq!(
            settings.effect_chain().stages()[0],
            EffectStageSpec::HighPass { cutoff_hz: 500.0 }
        );
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut settings = RenderSettings::default();
        settings.background.volume_percent = 120.0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        let mut settings = RenderSettings::default();
        settings.background.fade_len_s = -1.0;
        assert!(settings.validate().is_err());

        let mut settings = RenderSettings::default();
        settings.output.bitrate_kbps = 0;
        assert!(settings.validate().is_err());
    }

    #[tokio::test]
    async fn test_save_and_load_settings() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.toml");

        let settings =
            RenderSettings::from_form([("enable_podcast", "true"), ("val_podcast", "75")]);
        settings.save_to_file(&path).await.unwrap();

        assert!(path.exists());

        let loaded = RenderSettings::load_from_file(&path).await.unwrap();
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        tokio::fs::write(&path, "[background]\nvolume_percent = 500.0\n")
            .await
            .unwrap();

        let result = RenderSettings::load_from_file(&path).await;
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_preset_manager() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().join("presets"));

        // Missing directory lists as empty
        assert!(manager.list_presets().await.unwrap().is_empty());

        let settings = RenderSettings::from_form([("enable_mic", "true")]);

        // Save preset
        manager.save_preset("warm_voice", &settings).await.unwrap();

        // Check it exists
        assert!(manager.preset_exists("warm_voice").await);

        // List presets
        let presets = manager.list_presets().await.unwrap();
        assert_eq!(presets, vec!["warm_voice"]);

        // Load preset
        let loaded = manager.load_preset("warm_voice").await.unwrap();
        assert_eq!(loaded, settings);

        // Delete preset
        manager.delete_preset("warm_voice").await.unwrap();
        assert!(!manager.preset_exists("warm_voice").await);

        assert!(matches!(
            manager.load_preset("warm_voice").await,
            Err(ConfigError::PresetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preset_name_validation() {
        let temp_dir = TempDir::new().unwrap();
        let manager = PresetManager::new(temp_dir.path().to_path_buf());

        let result = manager
            .save_preset("../escape", &RenderSettings::default())
            .await;
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert!(!manager.preset_exists("").await);
    }
}
