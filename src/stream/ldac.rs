//! LDAC packing
//!
//! Byte 0 carries the running frame count. The encoder buffers internally
//! and often produces nothing for a unit, so each tick feeds units until
//! one call yields output.

use super::adapter::{
    EncodeAdapter, MAX_CHANNELS, PayloadLayout, check_written, report_encoder_error,
};
use super::context::MediaSendingContext;
use super::encoder::{MediaEncoder, Pcm, PcmSource};
use crate::a2dp::CodecFamily;
use crate::constants::LDAC_SAMPLES_PER_UNIT;

/// Unit staging for the configured LDAC stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacAdapter {
    channels: u8,
}

impl LdacAdapter {
    /// Create the adapter for `channels` interleaved channels
    #[must_use]
    pub const fn new(channels: u8) -> Self {
        Self { channels }
    }
}

impl EncodeAdapter for LdacAdapter {
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
        if ctx.codec_storage_count == 0 {
            ctx.codec_storage_count = 1;
        }

        let mut scratch = [0i16; LDAC_SAMPLES_PER_UNIT * MAX_CHANNELS];
        let input = &mut scratch[..LDAC_SAMPLES_PER_UNIT * usize::from(self.channels)];
        let mut consumed = 0;
        let mut encoded = 0;

        while encoded == 0
            && ctx.samples_ready >= LDAC_SAMPLES_PER_UNIT
            && ctx.codec_storage_count < ctx.max_media_payload_size
        {
            pcm.read(input, self.channels);
            ctx.samples_ready -= LDAC_SAMPLES_PER_UNIT;
            consumed += LDAC_SAMPLES_PER_UNIT;

            let out = &mut ctx.codec_storage[ctx.codec_storage_count..ctx.max_media_payload_size];
            let available = out.len();
            match encoder.encode(Pcm::S16(input), out) {
                Ok(outcome) => {
                    check_written(outcome.written, available);
                    ctx.codec_storage_count += outcome.written;
                    ctx.codec_num_frames = ctx.codec_num_frames.saturating_add(outcome.frames);
                    encoded = outcome.written;
                }
                Err(err) => {
                    report_encoder_error(CodecFamily::Ldac, err);
                    break;
                }
            }
        }
        consumed
    }

    fn is_full(&self, ctx: &MediaSendingContext) -> bool {
        ctx.codec_storage_count > 1
    }

    fn frame_header(&self, ctx: &mut MediaSendingContext) -> PayloadLayout {
        ctx.codec_storage[0] = ctx.codec_num_frames;
        PayloadLayout {
            rtp_timestamp: Some(ctx.rtp_timestamp),
            range: 0..ctx.codec_storage_count,
        }
    }

    fn complete_send(&self, ctx: &mut MediaSendingContext, _sent: usize) {
        ctx.advance_timestamp(usize::from(ctx.codec_num_frames) * LDAC_SAMPLES_PER_UNIT);
        ctx.codec_storage_count = 0;
        ctx.codec_num_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{SampleClock, SineSource};
    use crate::testing::FakeEncoder;

    fn context() -> MediaSendingContext {
        MediaSendingContext::new(1, 2, SampleClock::new(44_100, 3), 0x290)
    }

    #[test]
    fn test_one_productive_call_per_step() {
        let mut adapter = LdacAdapter::new(2);
        let mut ctx = context();
        ctx.samples_ready = 1024;
        let mut encoder = FakeEncoder::with_output(110);
        encoder.silent_calls = 2;
        encoder.frames_per_call = 2;

        let consumed = adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new());
        assert_eq!(consumed, 3 * 128);
        assert_eq!(encoder.calls, 3);
        assert_eq!(ctx.codec_storage_count, 111);
        assert_eq!(ctx.codec_num_frames, 2);
        assert!(adapter.is_full(&ctx));

        let layout = adapter.frame_header(&mut ctx);
        assert_eq!(ctx.codec_storage[0], 2);
        assert_eq!(layout.range, 0..111);
        adapter.complete_send(&mut ctx, 111);
        assert_eq!(ctx.rtp_timestamp, 256);
        assert_eq!(ctx.codec_storage_count, 0);
    }

    #[test]
    fn test_silent_step_reserves_header_only() {
        let mut adapter = LdacAdapter::new(2);
        let mut ctx = context();
        ctx.samples_ready = 200;
        let mut encoder = FakeEncoder::with_output(110);
        encoder.silent_calls = 5;

        assert_eq!(adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new()), 128);
        assert_eq!(ctx.codec_storage_count, 1);
        assert!(!adapter.is_full(&ctx));
        assert_eq!(ctx.samples_ready, 72);
    }

    #[test]
    fn test_storage_never_exceeds_budget() {
        let mut adapter = LdacAdapter::new(2);
        let mut ctx = context();
        let mut encoder = FakeEncoder::new();
        ctx.samples_ready = 128;
        adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new());
        assert_eq!(ctx.codec_storage_count, 0x290);
        ctx.samples_ready = 128;
        assert_eq!(adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new()), 0);
        assert!(ctx.codec_storage_count <= ctx.max_media_payload_size);
    }
}
