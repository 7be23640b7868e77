//! Example demonstrating render settings, presets and an in-memory render
//!
//! Run with: cargo run --package voicebed-core --example settings_demo

use voicebed_core::{AudioBuffer, PresetManager, RenderSettings, VoiceEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("voicebed_core=debug,info")
        .init();

    println!("=== Voicebed Settings Demo ===\n");

    // 1. Build settings from form-style fields
    println!("1. Parsing form fields...");
    let settings = RenderSettings::from_form([
        ("enable_podcast", "true"),
        ("val_podcast", "50"),
        ("enable_mic", "true"),
        ("bg_vol", "loud"),
        ("bg_fade_start", "2"),
    ]);
    println!(
        "   Chain: {:?}, background volume {}%",
        settings.effect_chain().stage_names(),
        settings.background.volume_percent
    );

    // 2. Store it as a preset
    println!("\n2. Saving preset...");
    let dir = std::env::temp_dir().join("voicebed-demo-presets");
    let presets = PresetManager::new(dir.clone());
    presets.save_preset("podcast_mic", &settings).await?;
    println!("   Presets in {}: {:?}", dir.display(), presets.list_presets().await?);

    // 3. Load it back
    let loaded = presets.load_preset("podcast_mic").await?;
    assert_eq!(loaded, settings);
    println!("\n3. Loaded preset:\n{}", loaded.to_toml()?);

    // 4. Render a synthetic voice over a short bed
    println!("4. Rendering...");
    let sample_rate = 16000;
    let voice: Vec<f32> = (0..sample_rate * 3)
        .map(|i| 0.6 * (2.0 * std::f32::consts::PI * 180.0 * i as f32 / sample_rate as f32).sin())
        .collect();
    let music: Vec<f32> = (0..sample_rate)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
        .collect();

    let output = VoiceEngine::linear().render(
        &AudioBuffer::mono(voice, sample_rate as u32)?,
        Some(&AudioBuffer::mono(music, sample_rate as u32)?),
        &loaded,
    )?;
    println!(
        "   {:.2}s, peak {:.3}, rms {:.3}",
        output.duration_secs(),
        output.peak(),
        output.rms()
    );

    // 5. Clean up
    presets.delete_preset("podcast_mic").await?;
    println!("\n=== Demo Complete ===");

    Ok(())
}
