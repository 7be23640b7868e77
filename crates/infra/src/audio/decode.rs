//! Container decoding with symphonia
//!
//! Integer sources are widened to `i32`, narrowed back to their native
//! width and normalized through the core PCM path, so a 16-bit sample of
//! 32767 lands on exactly 1.0. Float sources (MP3, AAC, Vorbis) are already
//! normalized and are only deinterleaved.

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};
use voicebed_core::domain::audio::{AudioBuffer, AudioError, Decoder, Result, SampleFormat};
use voicebed_core::domain::pcm::{decode_interleaved, from_interleaved_f32, InterleavedPcm};

/// Sample width of a decoded packet, `None` for float packets
fn packet_format(decoded: &AudioBufferRef<'_>) -> Option<SampleFormat> {
    match decoded {
        AudioBufferRef::U8(_) | AudioBufferRef::S8(_) => Some(SampleFormat::I8),
        AudioBufferRef::U16(_) | AudioBufferRef::S16(_) => Some(SampleFormat::I16),
        AudioBufferRef::U24(_) | AudioBufferRef::S24(_) => Some(SampleFormat::I24),
        AudioBufferRef::U32(_) | AudioBufferRef::S32(_) => Some(SampleFormat::I32),
        AudioBufferRef::F32(_) | AudioBufferRef::F64(_) => None,
    }
}

/// Samples gathered across packets, in the representation of the first one
enum Collected {
    Integer {
        format: SampleFormat,
        samples: Vec<i32>,
    },
    Float(Vec<f32>),
}

/// Decoder for every format symphonia was built with
///
/// WAV, FLAC, MP3, Ogg Vorbis, and AAC either as ADTS or inside MP4/M4A.
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8], hint: Option<&str>) -> Result<AudioBuffer> {
        let source = std::io::Cursor::new(bytes.to_vec());
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        // Hint from file extension
        let mut probe_hint = Hint::new();
        if let Some(ext) = hint {
            probe_hint.with_extension(ext.trim_start_matches('.'));
        }

        let probed = symphonia::default::get_probe()
            .format(
                &probe_hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Decode(format!("unrecognized container: {e}")))?;

        let mut format = probed.format;

        // First audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let declared_format = codec_params.bits_per_sample.and_then(SampleFormat::from_bits);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decode(format!("unsupported codec: {e}")))?;

        let mut channels = codec_params.channels.map(|c| c.count());
        let mut sample_rate = codec_params.sample_rate;
        let mut collected: Option<Collected> = None;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = e, "Skipping corrupt packet");
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            channels.get_or_insert(spec.channels.count());
            sample_rate.get_or_insert(spec.rate);
            let capacity = decoded.capacity() as u64;

            let sink = collected.get_or_insert_with(|| match packet_format(&decoded) {
                Some(native) => Collected::Integer {
                    format: declared_format.unwrap_or(native),
                    samples: Vec::new(),
                },
                None => Collected::Float(Vec::new()),
            });

            match sink {
                Collected::Integer { format, samples } => {
                    let mut buf = SampleBuffer::<i32>::new(capacity, spec);
                    buf.copy_interleaved_ref(decoded);
                    // Widening left-aligns the sample; shift back to native width
                    let shift = 32 - u32::from(format.bits());
                    samples.extend(buf.samples().iter().map(|&s| s >> shift));
                }
                Collected::Float(samples) => {
                    let mut buf = SampleBuffer::<f32>::new(capacity, spec);
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
            }
        }

        let channels = channels
            .ok_or_else(|| AudioError::Decode("unknown channel layout".to_string()))?;
        let sample_rate =
            sample_rate.ok_or_else(|| AudioError::Decode("unknown sample rate".to_string()))?;

        if channels == 0 || channels > 2 {
            return Err(AudioError::Decode(format!(
                "{channels} channels are not supported (expected mono or stereo)"
            )));
        }

        let buffer = match collected {
            Some(Collected::Integer { format, samples }) if !samples.is_empty() => {
                decode_interleaved(&InterleavedPcm {
                    samples,
                    format,
                    channels: channels as u16,
                    sample_rate,
                })?
            }
            Some(Collected::Float(samples)) if !samples.is_empty() => {
                from_interleaved_f32(&samples, channels as u16, sample_rate)?
            }
            _ => return Err(AudioError::Decode("stream contains no audio".to_string())),
        };

        info!(
            frames = buffer.frames(),
            channels,
            sample_rate,
            duration_secs = buffer.duration_secs(),
            "Decoded audio"
        );
        debug!(hint, bits = ?codec_params.bits_per_sample, "Decoder details");

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(samples: &[i16], channels: u16, sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_normalizes_16_bit() {
        let bytes = wav_bytes(&[32767, -32767, 0, 16384], 1, 8000);
        let buffer = SymphoniaDecoder::new().decode(&bytes, Some("wav")).unwrap();

        assert_eq!(buffer.sample_rate(), 8000);
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.channel(0)[0], 1.0);
        assert_eq!(buffer.channel(0)[1], -1.0);
        assert_eq!(buffer.channel(0)[2], 0.0);
        assert!((buffer.channel(0)[3] - 16384.0 / 32767.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_wav_stereo_deinterleaves() {
        let bytes = wav_bytes(&[100, -100, 200, -200, 300, -300], 2, 44100);
        let buffer = SymphoniaDecoder::new().decode(&bytes, Some(".wav")).unwrap();

        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 3);
        assert!(buffer.channel(0).iter().all(|&s| s > 0.0));
        assert!(buffer.channel(1).iter().all(|&s| s < 0.0));
    }

    #[test]
    fn test_decode_without_hint() {
        let bytes = wav_bytes(&[1000; 64], 1, 16000);
        let buffer = SymphoniaDecoder::new().decode(&bytes, None).unwrap();
        assert_eq!(buffer.frames(), 64);
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result = SymphoniaDecoder::new().decode(b"definitely not audio", Some("mp3"));
        match result {
            Err(AudioError::Decode(msg)) => assert!(msg.contains("no suitable format reader")),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_mp4_container_is_recognized() {
        // `ftyp` box of an M4A file with no movie box after it
        let mut bytes = 20u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"ftypM4A ");
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"isom");

        match SymphoniaDecoder::new().decode(&bytes, Some("m4a")) {
            Err(AudioError::Decode(msg)) => {
                assert!(!msg.contains("no suitable format reader"), "{msg}")
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_empty_stream_is_error() {
        let bytes = wav_bytes(&[], 1, 8000);
        let result = SymphoniaDecoder::new().decode(&bytes, Some("wav"));
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }

    #[test]
    fn test_decode_rejects_surround() {
        let bytes = wav_bytes(&[0; 6 * 10], 6, 48000);
        let result = SymphoniaDecoder::new().decode(&bytes, Some("wav"));
        assert!(matches!(result, Err(AudioError::Decode(_))));
    }
}
