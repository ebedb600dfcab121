//! State of the one live media stream

use super::clock::SampleClock;
use crate::a2dp::StreamEndpointId;
use crate::constants::CODEC_STORAGE_SIZE;

/// Buffers, counters and the RTP clock of the active stream
///
/// Only the tick handler and the send handler touch this, one at a time.
#[derive(Debug, Clone)]
pub struct MediaSendingContext {
    /// Local SEID
    pub local_seid: StreamEndpointId,
    /// Remote SEID
    pub remote_seid: StreamEndpointId,
    /// RTP timestamp of the next payload, in samples
    pub rtp_timestamp: u32,
    /// PCM samples per channel due but not yet encoded
    pub samples_ready: usize,
    /// Tick-to-sample converter
    pub clock: SampleClock,
    /// Encoded bytes awaiting transmission
    pub codec_storage: [u8; CODEC_STORAGE_SIZE],
    /// Bytes buffered in `codec_storage`
    pub codec_storage_count: usize,
    /// A send opportunity was requested and not yet served
    pub codec_ready_to_send: bool,
    /// Frames buffered for the payload header
    pub codec_num_frames: u8,
    /// Payload budget negotiated for this stream
    pub max_media_payload_size: usize,
}

impl MediaSendingContext {
    /// Create an empty context
    ///
    /// `max_media_payload_size` must leave room for a header byte in storage.
    #[must_use]
    pub fn new(
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        clock: SampleClock,
        max_media_payload_size: usize,
    ) -> Self {
        assert!(max_media_payload_size < CODEC_STORAGE_SIZE);
        Self {
            local_seid,
            remote_seid,
            rtp_timestamp: 0,
            samples_ready: 0,
            clock,
            codec_storage: [0; CODEC_STORAGE_SIZE],
            codec_storage_count: 0,
            codec_ready_to_send: false,
            codec_num_frames: 0,
            max_media_payload_size,
        }
    }

    /// Drop buffered audio and pending samples, keeping the RTP timestamp
    pub fn clear_buffers(&mut self) {
        self.samples_ready = 0;
        self.codec_storage_count = 0;
        self.codec_ready_to_send = false;
        self.codec_num_frames = 0;
        self.clock.reset();
    }

    /// Return to the state right after creation
    pub fn reset(&mut self) {
        self.clear_buffers();
        self.rtp_timestamp = 0;
    }

    /// Bytes still free within the payload budget
    #[must_use]
    pub const fn remaining_budget(&self) -> usize {
        self.max_media_payload_size
            .saturating_sub(self.codec_storage_count)
    }

    /// Advance the RTP clock by `samples`
    #[allow(clippy::cast_possible_truncation)]
    pub fn advance_timestamp(&mut self, samples: usize) {
        // RTP timestamps wrap at 32 bits
        self.rtp_timestamp = self.rtp_timestamp.wrapping_add(samples as u32);
    }
}
