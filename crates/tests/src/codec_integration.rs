//! Integration tests for the decode -> render -> encode boundary
//!
//! WAV is the only container both written and read here, so these tests
//! cover the format round-trip and the single clipping point.

use tempfile::TempDir;
use voicebed_core::domain::pcm::{encode_pcm16, PCM16_SCALE};
use voicebed_core::{AudioBuffer, AudioError, Decoder, Encoder, RenderSettings, VoiceEngine};
use voicebed_infra::{RubatoResampler, SymphoniaDecoder, WavEncoder};
use voicebed_tests::{generate_noise, generate_sine_wave};

fn quantized(samples: Vec<f32>) -> Vec<f32> {
    // Values that survive 16-bit encoding exactly
    samples
        .into_iter()
        .map(|s| (s * PCM16_SCALE).trunc() / PCM16_SCALE)
        .collect()
}

fn wav_of(buffer: &AudioBuffer) -> Vec<u8> {
    WavEncoder::new().encode(&encode_pcm16(buffer), 192).unwrap()
}

#[test]
fn test_wav_passthrough_is_byte_identical() {
    let voice = AudioBuffer::mono(generate_sine_wave(330.0, 0.6, 44100, 0.5), 44100).unwrap();
    let input = wav_of(&voice);

    let decoded = SymphoniaDecoder::new().decode(&input, Some("wav")).unwrap();
    let rendered = VoiceEngine::linear()
        .render(&decoded, None, &RenderSettings::default())
        .unwrap();
    let output = wav_of(&rendered);

    assert_eq!(output, input);
}

#[test]
fn test_decode_recovers_quantized_samples() {
    let left = quantized(generate_sine_wave(200.0, 0.9, 22050, 0.25));
    let right = quantized(generate_noise(left.len(), 0.5, 11));
    let buffer = AudioBuffer::new(vec![left, right], 22050).unwrap();

    let decoded = SymphoniaDecoder::new()
        .decode(&wav_of(&buffer), Some("wav"))
        .unwrap();

    assert_eq!(decoded.sample_rate(), 22050);
    assert_eq!(decoded.channel_count(), 2);
    for (a, b) in decoded.channels().iter().flatten().zip(buffer.channels().iter().flatten()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn test_clipping_happens_only_at_encode() {
    let hot = AudioBuffer::mono(vec![1.5, -2.0, 0.25, f32::NAN], 8000).unwrap();
    let pcm = encode_pcm16(&hot);
    assert_eq!(pcm.samples, vec![32767, -32767, 8191, 0]);

    let decoded = SymphoniaDecoder::new().decode(&wav_of(&hot), Some("wav")).unwrap();
    assert_eq!(decoded.channel(0)[0], 1.0);
    assert_eq!(decoded.channel(0)[1], -1.0);
}

#[test]
fn test_loud_mix_is_clipped_not_wrapped() {
    let voice = AudioBuffer::mono(vec![0.9; 1000], 8000).unwrap();
    let music = AudioBuffer::mono(vec![0.9; 1000], 8000).unwrap();
    let settings = RenderSettings::from_form([("bg_vol", "100")]);

    let mixed = VoiceEngine::linear().render(&voice, Some(&music), &settings).unwrap();
    assert!(mixed.peak() > 1.0);

    let pcm = encode_pcm16(&mixed);
    assert!(pcm.samples.iter().all(|&s| s == 32767));
}

#[test]
fn test_corrupt_input_is_decode_error() {
    let mut bytes = wav_of(&AudioBuffer::mono(vec![0.1; 100], 8000).unwrap());
    bytes.truncate(12);
    let result = SymphoniaDecoder::new().decode(&bytes, Some("wav"));
    assert!(matches!(result, Err(AudioError::Decode(_))));
}

#[tokio::test]
async fn test_file_round_trip_with_resampled_bed() {
    let temp_dir = TempDir::new().unwrap();
    let voice_path = temp_dir.path().join("voice.wav");
    let music_path = temp_dir.path().join("bed.wav");

    let voice = AudioBuffer::mono(generate_sine_wave(200.0, 0.5, 44100, 1.0), 44100).unwrap();
    let music = AudioBuffer::new(
        vec![
            generate_sine_wave(500.0, 0.4, 32000, 0.4),
            generate_sine_wave(600.0, 0.4, 32000, 0.4),
        ],
        32000,
    )
    .unwrap();
    tokio::fs::write(&voice_path, wav_of(&voice)).await.unwrap();
    tokio::fs::write(&music_path, wav_of(&music)).await.unwrap();

    let voice_bytes = tokio::fs::read(&voice_path).await.unwrap();
    let music_bytes = tokio::fs::read(&music_path).await.unwrap();

    let output = tokio::task::spawn_blocking(move || {
        let decoder = SymphoniaDecoder::new();
        let voice = decoder.decode(&voice_bytes, Some("wav")).unwrap();
        let music = decoder.decode(&music_bytes, Some("wav")).unwrap();
        let settings =
            RenderSettings::from_form([("enable_podcast", "true"), ("val_podcast", "30")]);
        VoiceEngine::new(RubatoResampler::new())
            .render(&voice, Some(&music), &settings)
            .unwrap()
    })
    .await
    .unwrap();

    assert_eq!(output.sample_rate(), 44100);
    assert_eq!(output.frames(), 44100);
    assert_eq!(output.channel_count(), 2);

    let out_path = temp_dir.path().join("out.wav");
    tokio::fs::write(&out_path, wav_of(&output)).await.unwrap();
    let reread = SymphoniaDecoder::new()
        .decode(&tokio::fs::read(&out_path).await.unwrap(), Some("wav"))
        .unwrap();
    assert_eq!(reread.frames(), 44100);
}
