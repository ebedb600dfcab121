//! aptX and aptX HD packing
//!
//! Every call turns four samples per channel into a fixed number of bytes.
//! Payloads carry no header byte and no RTP header. aptX HD takes packed
//! 24-bit input.

use super::adapter::{
    EncodeAdapter, MAX_CHANNELS, PayloadLayout, check_written, report_encoder_error,
};
use super::context::MediaSendingContext;
use super::encoder::{MediaEncoder, Pcm, PcmSource, widen_to_s24le};
use crate::A2dpError;
use crate::a2dp::CodecFamily;
use crate::constants::{
    APTX_BYTES_PER_QUANTUM, APTX_HD_BYTES_PER_QUANTUM, APTX_SAMPLES_PER_QUANTUM,
};

const QUANTUM_SAMPLES: usize = APTX_SAMPLES_PER_QUANTUM * MAX_CHANNELS;

/// Quantum geometry of the configured aptX stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxAdapter {
    channels: u8,
    hd: bool,
}

impl AptxAdapter {
    /// Create the adapter, `hd` selecting aptX HD
    ///
    /// # Errors
    /// Returns [`A2dpError::BufferTooSmall`] if one quantum exceeds the payload budget
    pub fn new(channels: u8, hd: bool, max_media_payload_size: usize) -> Result<Self, A2dpError> {
        let adapter = Self { channels, hd };
        if adapter.bytes_per_quantum() > max_media_payload_size {
            return Err(A2dpError::BufferTooSmall);
        }
        Ok(adapter)
    }

    /// Whether this is aptX HD
    #[must_use]
    pub const fn is_hd(&self) -> bool {
        self.hd
    }

    /// Encoded bytes per quantum, scaled from the stereo size by channel count
    #[must_use]
    pub const fn bytes_per_quantum(&self) -> usize {
        let stereo = if self.hd {
            APTX_HD_BYTES_PER_QUANTUM
        } else {
            APTX_BYTES_PER_QUANTUM
        };
        stereo / MAX_CHANNELS * self.channels as usize
    }

    const fn family(&self) -> CodecFamily {
        if self.hd {
            CodecFamily::AptxHd
        } else {
            CodecFamily::Aptx
        }
    }
}

impl EncodeAdapter for AptxAdapter {
    fn encode_step<E, P>(
        &mut self,
        ctx: &mut MediaSendingContext,
        encoder: &mut E,
        pcm: &mut P,
    ) -> usize
    where
        E: MediaEncoder + ?Sized,
        P: PcmSource + ?Sized,
    {
        let quantum = self.bytes_per_quantum();
        let mut pcm16 = [0i16; QUANTUM_SAMPLES];
        let mut pcm24 = [0u8; QUANTUM_SAMPLES * 3];
        let input = &mut pcm16[..APTX_SAMPLES_PER_QUANTUM * usize::from(self.channels)];
        let mut consumed = 0;

        while ctx.samples_ready >= APTX_SAMPLES_PER_QUANTUM && ctx.remaining_budget() >= quantum {
            pcm.read(input, self.channels);
            ctx.samples_ready -= APTX_SAMPLES_PER_QUANTUM;
            consumed += APTX_SAMPLES_PER_QUANTUM;

            let start = ctx.codec_storage_count;
            let out = &mut ctx.codec_storage[start..start + quantum];
            let result = if self.hd {
                let len = widen_to_s24le(input, &mut pcm24);
                encoder.encode(Pcm::S24Le(&pcm24[..len]), out)
            } else {
                encoder.encode(Pcm::S16(input), out)
            };
            match result {
                Ok(outcome) => {
                    check_written(outcome.written, quantum);
                    ctx.codec_storage_count += outcome.written;
                }
                Err(err) => {
                    report_encoder_error(self.family(), err);
                    break;
                }
            }
        }
        consumed
    }

    fn is_full(&self, ctx: &MediaSendingContext) -> bool {
        ctx.codec_storage_count + self.bytes_per_quantum() > ctx.max_media_payload_size
    }

    fn frame_header(&self, ctx: &mut MediaSendingContext) -> PayloadLayout {
        PayloadLayout {
            rtp_timestamp: None,
            range: 0..ctx.codec_storage_count,
        }
    }

    fn complete_send(&self, ctx: &mut MediaSendingContext, sent: usize) {
        ctx.advance_timestamp(sent / self.bytes_per_quantum() * APTX_SAMPLES_PER_QUANTUM);
        ctx.codec_storage_count = 0;
    }
}
