//! Encoder and PCM source boundaries
//!
//! The compression algorithms are opaque: an application plugs in a
//! [`MediaEncoder`] that knows how to turn one input quantum of PCM into codec
//! bytes, and a [`PcmSource`] that produces interleaved 16-bit audio.

use crate::A2dpError;
use crate::a2dp::{CodecFamily, CodecSelection};

/// Encoder failure carrying the codec library's error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderError(pub u8);

impl From<EncoderError> for A2dpError {
    fn from(err: EncoderError) -> Self {
        Self::Encoder(err.0)
    }
}

/// Interleaved PCM handed to the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pcm<'a> {
    /// Signed 16-bit samples
    S16(&'a [i16]),
    /// Packed signed 24-bit little-endian samples, 3 bytes each
    S24Le(&'a [u8]),
}

/// Result of one encode call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncodeOutcome {
    /// Bytes written to the output slice
    pub written: usize,
    /// Complete codec frames contained in the written bytes
    pub frames: u8,
}

/// Opaque codec encoder
pub trait MediaEncoder {
    /// Whether this encoder can produce `family`
    fn supports(&self, family: CodecFamily) -> bool;

    /// Prepare for a new stream configuration
    ///
    /// # Errors
    /// Returns the codec error code if the configuration cannot be encoded
    fn configure(&mut self, selection: &CodecSelection) -> Result<(), EncoderError>;

    /// Encode one input quantum into `out`
    ///
    /// Writing more than `out.len()` bytes is impossible through the slice;
    /// reporting more is a bug and trips an assertion in the adapter.
    ///
    /// # Errors
    /// Returns the codec error code; the quantum is dropped
    fn encode(&mut self, pcm: Pcm<'_>, out: &mut [u8]) -> Result<EncodeOutcome, EncoderError>;
}

/// Producer of interleaved 16-bit PCM
pub trait PcmSource {
    /// Fill `out` completely with interleaved samples for `channels` channels
    fn read(&mut self, out: &mut [i16], channels: u8);
}

/// One period of a 441 Hz sine at 44.1 kHz
const SINE_441HZ: [i16; 100] = [
    0, 2057, 4107, 6140, 8149, 10126, 12062, 13952, 15786, 17557, 19260, 20886, 22431, 23886,
    25247, 26509, 27666, 28714, 29648, 30466, 31163, 31738, 32187, 32509, 32702, 32767, 32702,
    32509, 32187, 31738, 31163, 30466, 29648, 28714, 27666, 26509, 25247, 23886, 22431, 20886,
    19260, 17557, 15786, 13952, 12062, 10126, 8149, 6140, 4107, 2057, 0, -2057, -4107, -6140,
    -8149, -10126, -12062, -13952, -15786, -17557, -19260, -20886, -22431, -23886, -25247, -26509,
    -27666, -28714, -29648, -30466, -31163, -31738, -32187, -32509, -32702, -32767, -32702, -32509,
    -32187, -31738, -31163, -30466, -29648, -28714, -27666, -26509, -25247, -23886, -22431, -20886,
    -19260, -17557, -15786, -13952, -12062, -10126, -8149, -6140, -4107, -2057,
];

/// Test tone generator, every channel carries the same sample
#[derive(Debug, Clone, Default)]
pub struct SineSource {
    phase: usize,
}

impl SineSource {
    /// Attenuation applied to the table, in bits
    pub const VOLUME_REDUCTION: u32 = 2;

    /// Create a generator at phase zero
    #[must_use]
    pub const fn new() -> Self {
        Self { phase: 0 }
    }
}

impl PcmSource for SineSource {
    fn read(&mut self, out: &mut [i16], channels: u8) {
        let channels = usize::from(channels.max(1));
        for frame in out.chunks_mut(channels) {
            frame.fill(SINE_441HZ[self.phase] >> Self::VOLUME_REDUCTION);
            self.phase = (self.phase + 1) % SINE_441HZ.len();
        }
    }
}

/// Cycles through a caller-owned buffer of interleaved samples
///
/// Used for audio captured elsewhere (e.g. a USB audio ring) that the
/// capture side keeps rewriting in place.
#[derive(Debug)]
pub struct LoopSource<'a> {
    samples: &'a [i16],
    position: usize,
}

impl<'a> LoopSource<'a> {
    /// Wrap `samples`
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidParameter`] if `samples` is empty
    pub fn new(samples: &'a [i16]) -> Result<Self, A2dpError> {
        if samples.is_empty() {
            return Err(A2dpError::InvalidParameter);
        }
        Ok(Self {
            samples,
            position: 0,
        })
    }

    /// Read position in the buffer
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }
}

impl PcmSource for LoopSource<'_> {
    fn read(&mut self, out: &mut [i16], _channels: u8) {
        let mut filled = 0;
        while filled < out.len() {
            let available = &self.samples[self.position..];
            let n = available.len().min(out.len() - filled);
            out[filled..filled + n].copy_from_slice(&available[..n]);
            filled += n;
            self.position = (self.position + n) % self.samples.len();
        }
    }
}

/// Widen 16-bit samples to packed 24-bit little-endian
///
/// Returns the number of bytes written.
///
/// # Panics
/// Panics if `out` holds fewer than `3 * pcm.len()` bytes
pub fn widen_to_s24le(pcm: &[i16], out: &mut [u8]) -> usize {
    assert!(out.len() >= pcm.len() * 3, "24-bit buffer too small");
    for (sample, bytes) in pcm.iter().zip(out.chunks_exact_mut(3)) {
        let [lo, hi] = sample.to_le_bytes();
        bytes.copy_from_slice(&[0, lo, hi]);
    }
    pcm.len() * 3
}
