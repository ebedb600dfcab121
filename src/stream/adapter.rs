//! Per-codec encode adapters
//!
//! An adapter knows one codec's packing rules: how much PCM makes an input
//! quantum, where encoded bytes go in the shared storage, when the storage is
//! full enough to send, which header byte (if any) leads the payload, and how
//! the RTP clock advances once a payload left. The scheduler is written
//! against [`EncodeAdapter`] only.

use core::ops::Range;

use super::aac::AacAdapter;
use super::aptx::AptxAdapter;
use super::context::MediaSendingContext;
use super::encoder::{EncoderError, MediaEncoder, PcmSource};
use super::ldac::LdacAdapter;
use super::sbc::SbcAdapter;
use crate::A2dpError;
use crate::a2dp::{CodecFamily, CodecParameters, CodecSelection};

/// Highest channel count any adapter stages PCM for
pub(crate) const MAX_CHANNELS: usize = 2;

/// Where the next payload lives in storage and how it is stamped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLayout {
    /// RTP timestamp, `None` for codecs sent without an RTP header
    pub rtp_timestamp: Option<u32>,
    /// Byte range of `codec_storage` to transmit
    pub range: Range<usize>,
}

/// Packing rules of one codec family
pub trait EncodeAdapter {
    /// Encode as much of `samples_ready` as the packing rules allow
    ///
    /// Returns the number of samples per channel taken from `samples_ready`.
    /// Encoder errors are absorbed: the quantum is dropped and the step ends.
    fn encode_step<E, P>(
        &mut self,
        ctx: &mut MediaSendingContext,
        encoder: &mut E,
        pcm: &mut P,
    ) -> usize
    where
        E: MediaEncoder + ?Sized,
        P: PcmSource + ?Sized;

    /// Whether storage should be sent before encoding more
    fn is_full(&self, ctx: &MediaSendingContext) -> bool;

    /// Write the payload header into storage and describe the payload
    fn frame_header(&self, ctx: &mut MediaSendingContext) -> PayloadLayout;

    /// Account for a transmitted payload of `sent` bytes
    fn complete_send(&self, ctx: &mut MediaSendingContext, sent: usize);
}

/// The adapter of the configured codec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamAdapter {
    /// SBC
    Sbc(SbcAdapter),
    /// AAC
    Aac(AacAdapter),
    /// LDAC
    Ldac(LdacAdapter),
    /// aptX and aptX HD
    Aptx(AptxAdapter),
}

impl StreamAdapter {
    /// Build the adapter for `selection`
    ///
    /// # Errors
    /// Returns [`A2dpError::BufferTooSmall`] if one encoded unit cannot fit
    /// in `max_media_payload_size`, [`A2dpError::InvalidParameter`] for a
    /// channel count above two
    pub fn for_selection(
        selection: &CodecSelection,
        max_media_payload_size: usize,
    ) -> Result<Self, A2dpError> {
        let channels = selection.num_channels();
        if channels == 0 || usize::from(channels) > MAX_CHANNELS {
            return Err(A2dpError::InvalidParameter);
        }
        Ok(match selection.parameters {
            CodecParameters::Sbc(config) => {
                Self::Sbc(SbcAdapter::new(&config, max_media_payload_size)?)
            }
            CodecParameters::Aac(_) => Self::Aac(AacAdapter::new(channels)),
            CodecParameters::Ldac(_) => Self::Ldac(LdacAdapter::new(channels)),
            CodecParameters::Aptx(_) => {
                Self::Aptx(AptxAdapter::new(channels, false, max_media_payload_size)?)
            }
            CodecParameters::AptxHd(_) => {
                Self::Aptx(AptxAdapter::new(channels, true, max_media_payload_size)?)
            }
        })
    }

    /// Codec family served
    #[must_use]
    pub const fn family(&self) -> CodecFamily {
        match self {
            Self::Sbc(_) => CodecFamily::Sbc,
            Self::Aac(_) => CodecFamily::Aac,
            Self::Ldac(_) => CodecFamily::Ldac,
            Self::Aptx(a) if a.is_hd() => CodecFamily::AptxHd,
            Self::Aptx(_) => CodecFamily::Aptx,
        }
    }
}

impl EncodeAdapter for StreamAdapter {
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
        match self {
            Self::Sbc(a) => a.encode_step(ctx, encoder, pcm),
            Self::Aac(a) => a.encode_step(ctx, encoder, pcm),
            Self::Ldac(a) => a.encode_step(ctx, encoder, pcm),
            Self::Aptx(a) => a.encode_step(ctx, encoder, pcm),
        }
    }

    fn is_full(&self, ctx: &MediaSendingContext) -> bool {
        match self {
            Self::Sbc(a) => a.is_full(ctx),
            Self::Aac(a) => a.is_full(ctx),
            Self::Ldac(a) => a.is_full(ctx),
            Self::Aptx(a) => a.is_full(ctx),
        }
    }

    fn frame_header(&self, ctx: &mut MediaSendingContext) -> PayloadLayout {
        match self {
            Self::Sbc(a) => a.frame_header(ctx),
            Self::Aac(a) => a.frame_header(ctx),
            Self::Ldac(a) => a.frame_header(ctx),
            Self::Aptx(a) => a.frame_header(ctx),
        }
    }

    fn complete_send(&self, ctx: &mut MediaSendingContext, sent: usize) {
        match self {
            Self::Sbc(a) => a.complete_send(ctx, sent),
            Self::Aac(a) => a.complete_send(ctx, sent),
            Self::Ldac(a) => a.complete_send(ctx, sent),
            Self::Aptx(a) => a.complete_send(ctx, sent),
        }
    }
}

/// Log an encoder failure; the caller drops the quantum
pub(crate) fn report_encoder_error(family: CodecFamily, err: EncoderError) {
    warn!("[STREAM] {} encoder error {}, dropping quantum", family, err.0);
}

/// Check what the encoder claims against the slice it was given
pub(crate) fn check_written(written: usize, available: usize) {
    assert!(
        written <= available,
        "encoder reported more bytes than its output slice"
    );
}
