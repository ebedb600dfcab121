//! AAC packing
//!
//! Access units are encoded only into an empty buffer and sent raw. When a
//! burst exceeds the payload budget the tail stays buffered and goes out in
//! the next payload.

use super::adapter::{
    EncodeAdapter, MAX_CHANNELS, PayloadLayout, check_written, report_encoder_error,
};
use super::context::MediaSendingContext;
use super::encoder::{MediaEncoder, Pcm, PcmSource};
use crate::a2dp::CodecFamily;
use crate::constants::{AAC_SAMPLES_PER_FRAME, CODEC_STORAGE_SIZE};

/// Access unit staging for the configured AAC stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacAdapter {
    channels: u8,
}

impl AacAdapter {
    /// Create the adapter for `channels` interleaved channels
    #[must_use]
    pub const fn new(channels: u8) -> Self {
        Self { channels }
    }
}

impl EncodeAdapter for AacAdapter {
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
        // a fragment is still waiting
        if ctx.codec_storage_count != 0 {
            return 0;
        }

        let mut scratch = [0i16; AAC_SAMPLES_PER_FRAME * MAX_CHANNELS];
        let input = &mut scratch[..AAC_SAMPLES_PER_FRAME * usize::from(self.channels)];
        let mut consumed = 0;

        while ctx.samples_ready >= AAC_SAMPLES_PER_FRAME
            && ctx.codec_storage_count < ctx.max_media_payload_size
        {
            pcm.read(input, self.channels);
            ctx.samples_ready -= AAC_SAMPLES_PER_FRAME;
            consumed += AAC_SAMPLES_PER_FRAME;

            let out = &mut ctx.codec_storage[ctx.codec_storage_count..CODEC_STORAGE_SIZE];
            let available = out.len();
            match encoder.encode(Pcm::S16(input), out) {
                Ok(outcome) => {
                    check_written(outcome.written, available);
                    ctx.codec_storage_count += outcome.written;
                    if outcome.written > 0 {
                        ctx.codec_num_frames = ctx.codec_num_frames.saturating_add(1);
                    }
                }
                Err(err) => {
                    report_encoder_error(CodecFamily::Aac, err);
                    break;
                }
            }
        }
        consumed
    }

    fn is_full(&self, ctx: &MediaSendingContext) -> bool {
        ctx.codec_storage_count > 0
    }

    fn frame_header(&self, ctx: &mut MediaSendingContext) -> PayloadLayout {
        PayloadLayout {
            rtp_timestamp: Some(ctx.rtp_timestamp),
            range: 0..ctx.codec_storage_count.min(ctx.max_media_payload_size),
        }
    }

    fn complete_send(&self, ctx: &mut MediaSendingContext, sent: usize) {
        let leftover = ctx.codec_storage_count - sent;
        ctx.codec_storage.copy_within(sent..sent + leftover, 0);
        ctx.codec_storage_count = leftover;
        // the clock moves once every buffered access unit has left
        if leftover == 0 {
            ctx.advance_timestamp(usize::from(ctx.codec_num_frames) * AAC_SAMPLES_PER_FRAME);
            ctx.codec_num_frames = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{SampleClock, SineSource};
    use crate::testing::FakeEncoder;

    fn context() -> MediaSendingContext {
        MediaSendingContext::new(1, 2, SampleClock::new(44_100, 5), 0x290)
    }

    #[test]
    fn test_small_units_sent_whole() {
        let mut adapter = AacAdapter::new(2);
        let mut ctx = context();
        ctx.samples_ready = 2048;
        let mut encoder = FakeEncoder::with_output(300);

        assert_eq!(adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new()), 2048);
        assert_eq!(ctx.codec_storage_count, 600);
        assert_eq!(encoder.last_pcm.len(), 2048);
        assert!(adapter.is_full(&ctx));

        let layout = adapter.frame_header(&mut ctx);
        assert_eq!(layout.range, 0..600);
        adapter.complete_send(&mut ctx, 600);
        assert_eq!(ctx.codec_storage_count, 0);
        assert_eq!(ctx.rtp_timestamp, 2048);
    }

    #[test]
    fn test_overflow_tail_is_deferred() {
        let mut adapter = AacAdapter::new(2);
        let mut ctx = context();
        ctx.samples_ready = 3072;
        let mut encoder = FakeEncoder::with_output(400);

        assert_eq!(adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new()), 2048);
        assert_eq!(ctx.codec_storage_count, 800);
        assert_eq!(ctx.codec_storage[799], 2);

        let layout = adapter.frame_header(&mut ctx);
        assert_eq!(layout.range, 0..0x290);
        adapter.complete_send(&mut ctx, 0x290);
        assert_eq!(ctx.codec_storage_count, 800 - 0x290);
        assert_eq!(ctx.codec_storage[0], 2);
        assert_eq!(ctx.rtp_timestamp, 0);
        assert!(adapter.is_full(&ctx));

        // no encoding while the fragment is buffered
        assert_eq!(adapter.encode_step(&mut ctx, &mut encoder, &mut SineSource::new()), 0);

        let layout = adapter.frame_header(&mut ctx);
        assert_eq!(layout.range, 0..800 - 0x290);
        adapter.complete_send(&mut ctx, 800 - 0x290);
        assert_eq!(ctx.rtp_timestamp, 2048);
        assert!(!adapter.is_full(&ctx));
    }
}
