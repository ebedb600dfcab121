//! SBC packing
//!
//! Fixed-size frames behind one header byte carrying the frame count. A
//! payload is sent once another frame would not fit the budget.

use super::adapter::{
    EncodeAdapter, MAX_CHANNELS, PayloadLayout, check_written, report_encoder_error,
};
use super::context::MediaSendingContext;
use super::encoder::{MediaEncoder, Pcm, PcmSource};
use crate::A2dpError;
use crate::a2dp::{CodecFamily, SbcConfiguration};

/// Largest SBC frame in samples per channel (16 blocks, 8 subbands)
const SBC_MAX_SAMPLES_PER_FRAME: usize = 128;

/// Frame geometry of the configured SBC stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcAdapter {
    frame_length: usize,
    samples_per_frame: usize,
    channels: u8,
}

impl SbcAdapter {
    /// Create the adapter for `config`
    ///
    /// # Errors
    /// Returns [`A2dpError::BufferTooSmall`] if one frame exceeds the payload budget
    pub fn new(config: &SbcConfiguration, max_media_payload_size: usize) -> Result<Self, A2dpError> {
        let frame_length = config.frame_length();
        let samples_per_frame = config.samples_per_frame();
        if frame_length == 0 || frame_length > max_media_payload_size {
            warn!(
                "[STREAM] SBC frame of {} bytes exceeds payload budget {}",
                frame_length,
                max_media_payload_size
            );
            return Err(A2dpError::BufferTooSmall);
        }
        if samples_per_frame == 0 || samples_per_frame > SBC_MAX_SAMPLES_PER_FRAME {
            return Err(A2dpError::InvalidParameter);
        }
        Ok(Self {
            frame_length,
            samples_per_frame,
            channels: config.num_channels(),
        })
    }

    /// Encoded frame size in bytes
    #[must_use]
    pub const fn frame_length(&self) -> usize {
        self.frame_length
    }

    /// PCM samples per channel in one frame
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        self.samples_per_frame
    }

    fn buffered_frames(&self, ctx: &MediaSendingContext) -> usize {
        ctx.codec_storage_count / self.frame_length
    }
}

impl EncodeAdapter for SbcAdapter {
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
        let mut scratch = [0i16; SBC_MAX_SAMPLES_PER_FRAME * MAX_CHANNELS];
        let input = &mut scratch[..self.samples_per_frame * usize::from(self.channels)];
        let mut consumed = 0;

        while ctx.samples_ready >= self.samples_per_frame
            && ctx.remaining_budget() >= self.frame_length
        {
            pcm.read(input, self.channels);
            ctx.samples_ready -= self.samples_per_frame;
            consumed += self.samples_per_frame;

            // byte 0 is the header
            let start = 1 + ctx.codec_storage_count;
            let out = &mut ctx.codec_storage[start..start + self.frame_length];
            match encoder.encode(Pcm::S16(input), out) {
                Ok(outcome) => {
                    check_written(outcome.written, self.frame_length);
                    ctx.codec_storage_count += outcome.written;
                    ctx.codec_num_frames = ctx.codec_num_frames.saturating_add(1);
                }
                Err(err) => {
                    report_encoder_error(CodecFamily::Sbc, err);
                    break;
                }
            }
        }
        consumed
    }

    fn is_full(&self, ctx: &MediaSendingContext) -> bool {
        ctx.codec_storage_count + self.frame_length > ctx.max_media_payload_size
    }

    fn frame_header(&self, ctx: &mut MediaSendingContext) -> PayloadLayout {
        ctx.codec_storage[0] = u8::try_from(self.buffered_frames(ctx)).unwrap_or(u8::MAX);
        PayloadLayout {
            rtp_timestamp: Some(ctx.rtp_timestamp),
            range: 0..ctx.codec_storage_count + 1,
        }
    }

    fn complete_send(&self, ctx: &mut MediaSendingContext, _sent: usize) {
        let frames = self.buffered_frames(ctx);
        ctx.advance_timestamp(frames * self.samples_per_frame);
        ctx.codec_storage_count = 0;
        ctx.codec_num_frames = 0;
    }
}
