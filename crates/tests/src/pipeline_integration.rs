//! Integration tests for the render pipeline
//!
//! These tests drive settings -> voice processing -> background mixing the
//! way the CLI does, and check the behaviors users depend on: passthrough,
//! loop and fade placement, level matching and determinism.

use voicebed_core::domain::dsp::{EffectChain, EffectStageSpec};
use voicebed_core::domain::mixer::{volume_gain_db, SILENCE_GAIN_DB};
use voicebed_core::{
    mix_background, process_voice, AudioBuffer, ChannelCount, MixPlan, NoiseReductionConfig,
    RenderSettings, VoiceEngine,
};
use voicebed_infra::RubatoResampler;
use voicebed_tests::{
    generate_noise, generate_ramp, generate_silence, generate_sine_wave, rms, to_db,
};

const SAMPLE_RATE: u32 = 1000;

fn mono(samples: Vec<f32>, sample_rate: u32) -> AudioBuffer {
    AudioBuffer::mono(samples, sample_rate).unwrap()
}

fn full_volume_plan() -> MixPlan {
    MixPlan {
        volume_percent: 100.0,
        ..MixPlan::default()
    }
}

// ============================================================================
// PASSTHROUGH
// ============================================================================

#[test]
fn test_all_toggles_off_is_bit_exact_passthrough() {
    let voice = mono(generate_sine_wave(220.0, 0.7, 44100, 1.0), 44100);
    let settings = RenderSettings::from_form([
        ("enable_nr", "false"),
        ("val_nr", "80"),
        ("enable_vintage", "false"),
        ("enable_mic", "false"),
        ("enable_podcast", "false"),
    ]);

    let out = VoiceEngine::linear().render(&voice, None, &settings).unwrap();
    assert_eq!(out, voice);

    let out = process_voice(&voice, &NoiseReductionConfig::disabled(), &EffectChain::new());
    assert_eq!(out, voice);
}

#[test]
fn test_limiter_on_silence_stays_silent() {
    let silence = AudioBuffer::silent(ChannelCount::Stereo, 4410, 44100).unwrap();
    let chain: EffectChain = [EffectStageSpec::Limiter {
        threshold_db: -1.0,
        release_ms: 100.0,
    }]
    .into_iter()
    .collect();

    let out = chain.apply(&silence);
    assert!(out.channels().iter().flatten().all(|&s| s == 0.0));
}

// ============================================================================
// LEVEL MATCHING
// ============================================================================

#[test]
fn test_background_gain_db() {
    assert!((volume_gain_db(50.0) - (-6.0206)).abs() < 1e-3);
    assert_eq!(volume_gain_db(100.0), 0.0);
    assert_eq!(volume_gain_db(0.0), SILENCE_GAIN_DB);
}

#[test]
fn test_zero_volume_is_near_silence() {
    let voice = mono(generate_silence(2000), SAMPLE_RATE);
    let music = mono(vec![0.5; 2000], SAMPLE_RATE);
    let plan = MixPlan {
        volume_percent: 0.0,
        ..MixPlan::default()
    };

    let out = mix_background(&voice, &music, &plan).unwrap();
    assert!(out.channels().iter().flatten().all(|s| s.is_finite()));
    assert!(out.peak() < 0.5 * 1e-4);
}

// ============================================================================
// LOOP, TRIM AND FADE PLACEMENT
// ============================================================================

#[test]
fn test_loop_coverage_three_into_ten_seconds() {
    let track = generate_ramp(3 * SAMPLE_RATE as usize, 1e-4);
    let voice = mono(generate_silence(10 * SAMPLE_RATE as usize), SAMPLE_RATE);
    let music = mono(track.clone(), SAMPLE_RATE);

    let out = mix_background(&voice, &music, &full_volume_plan()).unwrap();

    assert_eq!(out.frames(), voice.frames());
    for (i, &s) in out.channel(0).iter().enumerate() {
        assert_eq!(s, track[i % track.len()], "sample {i}");
    }
}

#[test]
fn test_fade_five_plus_two_on_eight_second_track() {
    let sr = SAMPLE_RATE as usize;
    let voice = mono(generate_silence(8 * sr), SAMPLE_RATE);
    let music = mono(vec![0.5; 8 * sr], SAMPLE_RATE);
    let settings = RenderSettings::from_form([
        ("bg_vol", "100"),
        ("bg_fade_start", "5"),
        ("bg_fade_len", "2"),
    ]);

    let out = mix_background(&voice, &music, &settings.mix_plan()).unwrap();
    let out = out.channel(0);
    assert_eq!(out.len(), 8 * sr);

    // Untouched before the fade
    assert!(out[..5 * sr].iter().all(|&s| s == 0.5));

    // Linear ramp to silence at 7 s
    let fade_len = 2 * sr;
    for i in 0..fade_len {
        let expected = 0.5 * (fade_len - 1 - i) as f32 / (fade_len - 1) as f32;
        assert!((out[5 * sr + i] - expected).abs() < 1e-6, "fade sample {i}");
    }
    assert_eq!(out[7 * sr - 1], 0.0);

    // Silent after the fade ends
    assert!(out[7 * sr..].iter().all(|&s| s == 0.0));
}

#[test]
fn test_non_numeric_trim_uses_full_track() {
    let sr = SAMPLE_RATE as usize;
    let track = generate_ramp(3 * sr, 1e-4);
    let voice = mono(generate_silence(3 * sr), SAMPLE_RATE);
    let music = mono(track.clone(), SAMPLE_RATE);

    let settings =
        RenderSettings::from_form([("bg_start", "soon"), ("bg_end", "2"), ("bg_vol", "100")]);
    let out = VoiceEngine::linear().render(&voice, Some(&music), &settings).unwrap();

    assert_eq!(out.channel(0), track.as_slice());
}

#[test]
fn test_trim_window_selects_segment() {
    let sr = SAMPLE_RATE as usize;
    let track = generate_ramp(4 * sr, 1e-4);
    let voice = mono(generate_silence(sr), SAMPLE_RATE);
    let music = mono(track.clone(), SAMPLE_RATE);

    let settings =
        RenderSettings::from_form([("bg_start", "1"), ("bg_end", "2"), ("bg_vol", "100")]);
    let out = mix_background(&voice, &music, &settings.mix_plan()).unwrap();

    assert_eq!(out.channel(0), &track[sr..2 * sr]);
}

#[test]
fn test_trim_past_end_skips_background() {
    let voice = mono(generate_sine_wave(50.0, 0.3, SAMPLE_RATE, 2.0), SAMPLE_RATE);
    let music = mono(vec![0.5; 1000], SAMPLE_RATE);
    let settings = RenderSettings::from_form([("bg_start", "30")]);

    let out = VoiceEngine::linear().render(&voice, Some(&music), &settings).unwrap();
    assert_eq!(out, voice);
}

// ============================================================================
// END-TO-END
// ============================================================================

fn speech_like_voice(sample_rate: u32, seconds: f32) -> AudioBuffer {
    // 300 ms tone bursts separated by low-level room noise
    let tone = generate_sine_wave(180.0, 0.8, sample_rate, seconds);
    let noise = generate_noise(tone.len(), 0.003, 42);
    let burst = (0.3 * sample_rate as f32) as usize;
    let samples = tone
        .iter()
        .zip(&noise)
        .enumerate()
        .map(|(i, (t, n))| if (i / burst) % 2 == 0 { t + n } else { *n })
        .collect();
    mono(samples, sample_rate)
}

#[test]
fn test_podcast_render_with_looped_bed() {
    let sr = 44100;
    let voice = speech_like_voice(sr, 5.0);
    let music = mono(generate_sine_wave(440.0, 0.5, sr, 2.0), sr);
    let settings = RenderSettings::from_form([
        ("enable_podcast", "true"),
        ("val_podcast", "50"),
        ("bg_vol", "20"),
        ("bg_fade_start", "0"),
    ]);

    let chain = settings.effect_chain();
    assert_eq!(
        chain.stage_names(),
        vec!["NoiseGate", "Compressor", "Limiter"]
    );
    assert_eq!(
        chain.stages()[1],
        EffectStageSpec::Compressor {
            threshold_db: -16.0,
            ratio: 4.0,
            attack_ms: 1.0,
            release_ms: 100.0,
        }
    );

    let engine = VoiceEngine::linear();
    let out = engine.render(&voice, Some(&music), &settings).unwrap();
    assert_eq!(out.sample_rate(), sr);
    assert_eq!(out.frames(), 5 * sr as usize);

    // Voice dynamics alone stay under the limiter ceiling
    let processed = process_voice(&voice, &settings.noise_reduction_config(), &chain);
    let ceiling = 10f32.powf(-1.0 / 20.0);
    assert!(processed.peak() <= ceiling + 1e-6);

    // The bed is the 2 s track looped three times, 20% below original level
    let silent = AudioBuffer::silent(ChannelCount::Mono, voice.frames(), sr).unwrap();
    let bed = mix_background(&silent, &music, &settings.mix_plan()).unwrap();
    let drop_db = to_db(rms(bed.channel(0))) - to_db(rms(music.channel(0)));
    assert!((drop_db - 20.0 * 0.2f32.log10()).abs() < 0.05, "drop {drop_db} dB");

    let two_seconds = 2 * sr as usize;
    let first = &bed.channel(0)[..two_seconds];
    assert_eq!(&bed.channel(0)[two_seconds..2 * two_seconds], first);
    assert_eq!(&bed.channel(0)[2 * two_seconds..], &first[..sr as usize]);
}

#[test]
fn test_music_at_other_rate_is_resampled_first() {
    let voice = mono(generate_silence(44100), 44100);
    let music = mono(generate_sine_wave(300.0, 0.5, 22050, 0.5), 22050);
    let engine = VoiceEngine::new(RubatoResampler::new());

    let out = engine.mix_background(&voice, &music, &full_volume_plan()).unwrap();
    assert_eq!(out.sample_rate(), 44100);
    assert_eq!(out.frames(), 44100);
    // Level survives the rate change
    assert!((rms(out.channel(0)) - rms(music.channel(0))).abs() < 0.02);
}

#[test]
fn test_stereo_music_under_mono_voice() {
    let voice = mono(vec![0.1; 500], SAMPLE_RATE);
    let music = AudioBuffer::new(vec![vec![0.2; 500], vec![-0.2; 500]], SAMPLE_RATE).unwrap();

    let out = mix_background(&voice, &music, &full_volume_plan()).unwrap();
    assert_eq!(out.channel_count(), 2);
    assert!(out.channel(0).iter().all(|&s| (s - 0.3).abs() < 1e-6));
    assert!(out.channel(1).iter().all(|&s| (s + 0.1).abs() < 1e-6));
}

#[test]
fn test_noise_reduction_lowers_noise_floor() {
    let sr = 16000;
    let voice = speech_like_voice(sr, 2.0);
    let settings = RenderSettings::from_form([("enable_nr", "true"), ("val_nr", "100")]);

    let out = VoiceEngine::linear().render(&voice, None, &settings).unwrap();
    assert_eq!(out.frames(), voice.frames());

    // Second burst slot is noise only
    let gap = (0.35 * sr as f32) as usize..(0.55 * sr as f32) as usize;
    let before = rms(&voice.channel(0)[gap.clone()]);
    let after = rms(&out.channel(0)[gap]);
    assert!(after < before * 0.5, "noise {before} -> {after}");
}

#[test]
fn test_every_preset_enabled_is_finite_and_deterministic() {
    let sr = 22050;
    let voice = speech_like_voice(sr, 1.5);
    let music = mono(generate_noise(sr as usize, 0.4, 3), sr);
    let settings = RenderSettings::from_form([
        ("enable_nr", "true"),
        ("val_nr", "60"),
        ("enable_vintage", "true"),
        ("val_vintage", "100"),
        ("enable_mic", "true"),
        ("enable_podcast", "true"),
        ("val_podcast", "100"),
        ("bg_vol", "35"),
        ("bg_fade_start", "1"),
        ("bg_fade_len", "0.25"),
    ]);
    assert_eq!(settings.effect_chain().len(), 9);

    let engine = VoiceEngine::linear();
    let a = engine.render(&voice, Some(&music), &settings).unwrap();
    let b = engine.render(&voice, Some(&music), &settings).unwrap();
    assert_eq!(a, b);
    assert!(a.channels().iter().flatten().all(|s| s.is_finite()));
}

#[test]
fn test_concurrent_renders_do_not_interfere() {
    let sr = 16000;
    let voice = speech_like_voice(sr, 1.0);
    let music = mono(generate_sine_wave(90.0, 0.4, sr, 0.3), sr);
    let settings = RenderSettings::from_form([
        ("enable_podcast", "true"),
        ("val_podcast", "70"),
        ("enable_nr", "true"),
        ("val_nr", "50"),
    ]);
    let engine = VoiceEngine::linear();
    let expected = engine.render(&voice, Some(&music), &settings).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.render(&voice, Some(&music), &settings).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}
