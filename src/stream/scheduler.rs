//! Send scheduling
//!
//! [`StreamSession`] ties the context to the configured adapter. On every
//! tick it credits due samples, encodes, and asks the transport for a send
//! opportunity once the adapter reports full storage. The request is
//! latched: while one is outstanding neither encoding nor another request
//! happens, and the grant emits exactly one payload.

use super::adapter::{EncodeAdapter, StreamAdapter};
use super::clock::SampleClock;
use super::context::MediaSendingContext;
use super::encoder::{MediaEncoder, PcmSource};
use crate::A2dpError;
use crate::a2dp::{AvdtpTransport, CodecSelection, MediaPacket, SignalingChannelId};

/// The live stream: sending context plus codec adapter
#[derive(Debug, Clone)]
pub struct StreamSession {
    context: MediaSendingContext,
    adapter: StreamAdapter,
}

impl StreamSession {
    /// Create a session for `selection`
    ///
    /// # Errors
    /// Returns error if the codec cannot be packed into `max_media_payload_size`
    pub fn new(selection: &CodecSelection, max_media_payload_size: usize) -> Result<Self, A2dpError> {
        let adapter = StreamAdapter::for_selection(selection, max_media_payload_size)?;
        let clock = SampleClock::new(selection.sample_rate(), selection.tick_interval_ms());
        Ok(Self {
            context: MediaSendingContext::new(
                selection.local_seid,
                selection.remote_seid,
                clock,
                max_media_payload_size,
            ),
            adapter,
        })
    }

    /// Sending context
    #[must_use]
    pub const fn context(&self) -> &MediaSendingContext {
        &self.context
    }

    /// Active adapter
    #[must_use]
    pub const fn adapter(&self) -> &StreamAdapter {
        &self.adapter
    }

    /// Continue the RTP clock of a previous session
    pub fn resume_from(&mut self, rtp_timestamp: u32) {
        self.context.rtp_timestamp = rtp_timestamp;
    }

    /// Drop buffered audio, keeping the RTP clock
    pub fn suspend(&mut self) {
        self.context.clear_buffers();
    }

    /// Credit the samples due at `now_ms` and encode
    ///
    /// Returns the samples per channel encoded this tick.
    ///
    /// # Errors
    /// Returns [`A2dpError::Transport`] if the send opportunity request fails
    pub fn on_tick<T, E, P>(
        &mut self,
        now_ms: u32,
        cid: SignalingChannelId,
        transport: &mut T,
        encoder: &mut E,
        pcm: &mut P,
    ) -> Result<usize, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
        P: PcmSource + ?Sized,
    {
        let due = self.context.clock.tick(now_ms);
        self.context.samples_ready = self.context.samples_ready.saturating_add(due);
        if self.context.codec_ready_to_send {
            trace!("[STREAM] send pending, skipping encode");
            return Ok(0);
        }

        let consumed = self.adapter.encode_step(&mut self.context, encoder, pcm);
        if self.adapter.is_full(&self.context) {
            self.request_send(cid, transport)?;
        }
        Ok(consumed)
    }

    /// Ask for a send opportunity unless one is already outstanding
    ///
    /// # Errors
    /// Returns [`A2dpError::Transport`] if the request fails; the latch is
    /// left clear so the next tick retries
    pub fn request_send<T>(&mut self, cid: SignalingChannelId, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        if self.context.codec_ready_to_send {
            return Ok(());
        }
        self.context.codec_ready_to_send = true;
        if let Err(err) = transport.request_can_send_now(cid, self.context.local_seid) {
            warn!("[STREAM] send opportunity request failed: {}", err.0);
            self.context.codec_ready_to_send = false;
            return Err(err.into());
        }
        Ok(())
    }

    /// Emit one payload for a granted send opportunity
    ///
    /// Returns whether a payload was sent; a grant without an outstanding
    /// request is ignored.
    ///
    /// # Errors
    /// Returns [`A2dpError::Transport`] if the transport refuses the payload.
    /// The payload is dropped either way.
    pub fn on_can_send_now<T>(&mut self, cid: SignalingChannelId, transport: &mut T) -> Result<bool, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        if !self.context.codec_ready_to_send {
            debug!("[STREAM] unsolicited send opportunity");
            return Ok(false);
        }

        let layout = self.adapter.frame_header(&mut self.context);
        let sent = layout.range.len();
        let result = transport.send_media_payload(
            cid,
            self.context.local_seid,
            MediaPacket {
                rtp_timestamp: layout.rtp_timestamp,
                payload: &self.context.codec_storage[layout.range],
            },
        );
        self.adapter.complete_send(&mut self.context, sent);
        self.context.codec_ready_to_send = false;

        match result {
            Ok(()) => {
                trace!("[STREAM] sent {} bytes", sent);
                Ok(true)
            }
            Err(err) => {
                warn!("[STREAM] payload of {} bytes dropped: {}", sent, err.0);
                Err(err.into())
            }
        }
    }
}
