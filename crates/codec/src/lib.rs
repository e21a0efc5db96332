//! Encoding of captured audio into blobs and decoding of blobs back into
//! sample buffers.

mod encode;

use std::io::Cursor;

use studio_transport::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub use encode::{ChunkEncoder, EncodeError, EncodedBlob, EncodedChunk};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unreadable audio data: {0}")]
    Format(#[from] symphonia::core::errors::Error),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("recording contains no audio")]
    Empty,

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Decode an encoded recording into interleaved float samples.
pub fn decode_blob(blob: &EncodedBlob) -> Result<AudioArc, DecodeError> {
    if blob.is_empty() {
        return Err(DecodeError::Empty);
    }

    let source = Cursor::new(blob.as_bytes().to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    hint.with_extension(blob.extension());

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoTrack)?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1) as u16;
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() || channels == 0 {
        return Err(DecodeError::Empty);
    }

    let audio = AudioArc::new(samples, sample_rate, channels);
    log::debug!("decoded {audio:?}");
    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn record(sample_rate: u32, channels: u16, frames: usize, chunk_frames: usize) -> EncodedBlob {
        let mut encoder = ChunkEncoder::new(sample_rate, channels);
        let samples: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let v = ((i as f32) * 0.01).sin() * 0.8;
                std::iter::repeat_n(v, channels as usize)
            })
            .collect();

        let chunks: Vec<_> = samples
            .chunks(chunk_frames * channels as usize)
            .filter_map(|chunk| encoder.encode(chunk))
            .collect();
        encoder.finalize(&chunks).unwrap()
    }

    #[test]
    fn test_decode_recording() {
        let blob = record(8000, 1, 4000, 512);
        let audio = decode_blob(&blob).unwrap();

        assert_eq!(audio.sample_rate(), 8000);
        assert_eq!(audio.channels(), 1);
        assert_eq!(audio.frames(), 4000);
        assert_abs_diff_eq!(audio.duration_secs(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_decoded_values_match_within_quantization() {
        let blob = record(8000, 1, 100, 30);
        let audio = decode_blob(&blob).unwrap();

        for (i, sample) in audio.samples().iter().enumerate() {
            let expected = ((i as f32) * 0.01).sin() * 0.8;
            assert_abs_diff_eq!(*sample, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_decode_stereo() {
        let blob = record(44100, 2, 2205, 256);
        let audio = decode_blob(&blob).unwrap();
        assert_eq!(audio.channels(), 2);
        assert_eq!(audio.frames(), 2205);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let blob = EncodedBlob::from_bytes(vec![0x13; 512], "wav");
        assert!(decode_blob(&blob).is_err());
    }

    #[test]
    fn test_empty_blob() {
        let blob = EncodedBlob::from_bytes(Vec::new(), "wav");
        assert!(matches!(decode_blob(&blob), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_recording_without_frames_is_rejected() {
        let encoder = ChunkEncoder::new(8000, 1);
        let blob = encoder.finalize(&[]).unwrap();
        assert!(decode_blob(&blob).is_err());
    }
}
