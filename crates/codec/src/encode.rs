use std::io::Cursor;

/// A slice of captured audio as 16-bit little-endian interleaved PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    bytes: Vec<u8>,
}

impl EncodedChunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// A complete encoded recording, ready to be handed to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    bytes: Vec<u8>,
    extension: &'static str,
}

impl EncodedBlob {
    pub fn from_bytes(bytes: Vec<u8>, extension: &'static str) -> Self {
        Self { bytes, extension }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// File extension used as a format hint when probing.
    pub fn extension(&self) -> &'static str {
        self.extension
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("failed to write WAV data: {0}")]
    Wav(#[from] hound::Error),
}

/// Turns captured float frames into chunks while recording, and the chunks
/// into a WAV blob when recording stops.
#[derive(Debug)]
pub struct ChunkEncoder {
    sample_rate: u32,
    channels: u16,
    /// Samples of an incomplete trailing frame, kept for the next call.
    carry: Vec<f32>,
}

impl ChunkEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            carry: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Encode whole frames from `samples`. Returns `None` when there is not
    /// yet a full frame to emit.
    pub fn encode(&mut self, samples: &[f32]) -> Option<EncodedChunk> {
        self.carry.extend_from_slice(samples);
        let channels = self.channels as usize;
        let whole = self.carry.len() - self.carry.len() % channels;
        if whole == 0 {
            return None;
        }

        let mut bytes = Vec::with_capacity(whole * 2);
        for sample in self.carry.drain(..whole) {
            bytes.extend_from_slice(&to_pcm16(sample).to_le_bytes());
        }
        Some(EncodedChunk { bytes })
    }

    /// Wrap the chunks of one recording into a WAV blob.
    pub fn finalize(&self, chunks: &[EncodedChunk]) -> Result<EncodedBlob, EncodeError> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut bytes = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)?;
            for chunk in chunks {
                for pair in chunk.bytes.chunks_exact(2) {
                    writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
                }
            }
            writer.finalize()?;
        }

        log::debug!(
            "encoded {} chunks into {} bytes of WAV",
            chunks.len(),
            bytes.len()
        );
        Ok(EncodedBlob::from_bytes(bytes, "wav"))
    }
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
