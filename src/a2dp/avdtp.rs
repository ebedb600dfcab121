//! AVDTP (Audio/Video Distribution Transport Protocol) boundary
//!
//! The AVDTP wire protocol itself lives in the host stack. This module
//! defines what crosses the boundary: the parsed signaling events the source
//! reacts to, and the [`AvdtpTransport`] requests it issues in return.

use heapless::Vec;

use super::{A2dpError, Role, SignalingChannelId, StreamEndpointId};
use crate::BluetoothAddress;
use crate::constants::MAX_MEDIA_CODEC_INFO_LEN;

/// HCI/L2CAP status code reported for a successful operation
pub const STATUS_SUCCESS: u8 = 0x00;

/// AVDTP Signal Identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SignalId {
    /// Discover available stream endpoints
    Discover = 0x01,
    /// Get capabilities of a stream endpoint
    GetCapabilities = 0x02,
    /// Set configuration for a stream endpoint
    SetConfiguration = 0x03,
    /// Get current configuration
    GetConfiguration = 0x04,
    /// Reconfigure stream endpoint
    Reconfigure = 0x05,
    /// Open stream
    Open = 0x06,
    /// Start streaming
    Start = 0x07,
    /// Close stream
    Close = 0x08,
    /// Suspend stream
    Suspend = 0x09,
    /// Abort stream
    Abort = 0x0A,
    /// Get all capabilities, including delay reporting
    GetAllCapabilities = 0x0C,
    /// Sink delay report
    DelayReport = 0x0D,
}

impl TryFrom<u8> for SignalId {
    type Error = A2dpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x01 => Self::Discover,
            0x02 => Self::GetCapabilities,
            0x03 => Self::SetConfiguration,
            0x04 => Self::GetConfiguration,
            0x05 => Self::Reconfigure,
            0x06 => Self::Open,
            0x07 => Self::Start,
            0x08 => Self::Close,
            0x09 => Self::Suspend,
            0x0A => Self::Abort,
            0x0C => Self::GetAllCapabilities,
            0x0D => Self::DelayReport,
            _ => return Err(A2dpError::InvalidParameter),
        })
    }
}

/// Media types carried by AVDTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MediaType {
    /// Audio media
    Audio = 0x00,
    /// Video media
    Video = 0x01,
    /// Multimedia media
    Multimedia = 0x02,
}

/// Media codec type of a media codec service capability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MediaCodecType {
    /// SBC (Sub-Band Coding), mandatory for A2DP
    Sbc = 0x00,
    /// MPEG-1,2 Audio
    Mpeg12Audio = 0x01,
    /// MPEG-2,4 AAC
    Mpeg24Aac = 0x02,
    /// ATRAC family
    Atrac = 0x04,
    /// Vendor specific, identified by the vendor header in the codec info
    NonA2dp = 0xFF,
}

impl TryFrom<u8> for MediaCodecType {
    type Error = A2dpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Sbc),
            0x01 => Ok(Self::Mpeg12Audio),
            0x02 => Ok(Self::Mpeg24Aac),
            0x04 => Ok(Self::Atrac),
            0xFF => Ok(Self::NonA2dp),
            _ => Err(A2dpError::UnsupportedCodec),
        }
    }
}

/// Raw media codec information element as reported by the remote
pub type MediaCodecInfo = Vec<u8, MAX_MEDIA_CODEC_INFO_LEN>;

/// Parsed AVDTP signaling event delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvdtpEvent {
    /// Signaling channel to the remote is up (or failed to come up)
    SignalingConnectionEstablished {
        /// Connection status, [`STATUS_SUCCESS`] on success
        status: u8,
        /// Signaling channel identifier
        cid: SignalingChannelId,
    },
    /// Signaling channel was released
    SignalingConnectionReleased,
    /// A remote stream endpoint was reported by DISCOVER
    SepFound {
        /// Remote SEID
        seid: StreamEndpointId,
        /// Whether the remote endpoint is already in use
        in_use: bool,
        /// Media type of the endpoint
        media_type: MediaType,
        /// Role of the remote endpoint
        role: Role,
    },
    /// DISCOVER finished
    DiscoveryDone,
    /// Media codec capability of a remote endpoint
    CapabilityReceived {
        /// Remote SEID the capability belongs to
        seid: StreamEndpointId,
        /// Codec type of the capability
        codec_type: MediaCodecType,
        /// Raw codec information bytes
        info: MediaCodecInfo,
    },
    /// A non-codec service capability (delay reporting, content protection, ...)
    ServiceCapabilityReceived {
        /// Remote SEID the capability belongs to
        seid: StreamEndpointId,
        /// Service category
        category: u8,
    },
    /// All capabilities of the queried endpoint were reported
    CapabilitiesDone,
    /// The remote accepted a request
    Accept {
        /// Signal being accepted
        signal: SignalId,
    },
    /// The remote rejected a request
    Reject {
        /// Signal being rejected
        signal: SignalId,
    },
    /// The remote answered with a general reject
    GeneralReject {
        /// Signal being rejected
        signal: SignalId,
    },
    /// Media transport channel is up (or failed to come up)
    StreamingConnectionEstablished {
        /// Connection status, [`STATUS_SUCCESS`] on success
        status: u8,
        /// Local SEID of the stream
        local_seid: StreamEndpointId,
        /// Remote SEID of the stream
        remote_seid: StreamEndpointId,
        /// Maximum media payload size, if the transport knows it
        max_media_payload_size: Option<u16>,
    },
    /// Media transport channel was released
    StreamingConnectionReleased,
    /// The sink reported its playback delay
    DelayReport {
        /// Delay in 1/10 milliseconds
        delay_100us: u16,
        /// Local SEID the report applies to
        local_seid: StreamEndpointId,
    },
    /// The transport granted one send opportunity
    CanSendMediaNow,
}

/// Transport request failure carrying the stack's status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportError(pub u8);

impl From<TransportError> for A2dpError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.0)
    }
}

/// One media payload handed to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPacket<'a> {
    /// RTP timestamp; `None` sends the payload without an RTP header
    pub rtp_timestamp: Option<u32>,
    /// Payload bytes, including any codec header byte
    pub payload: &'a [u8],
}

/// Requests the source issues to the AVDTP stack
///
/// Every request is fire-and-forget: the outcome arrives later as an
/// [`AvdtpEvent`].
pub trait AvdtpTransport {
    /// Open the signaling channel to `addr`
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn connect(&mut self, addr: BluetoothAddress) -> Result<(), TransportError>;

    /// Release the signaling channel
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn disconnect(&mut self, cid: SignalingChannelId) -> Result<(), TransportError>;

    /// Send DISCOVER
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn discover_stream_endpoints(&mut self, cid: SignalingChannelId) -> Result<(), TransportError>;

    /// Send GET_ALL_CAPABILITIES for `remote_seid`
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn get_all_capabilities(
        &mut self,
        cid: SignalingChannelId,
        remote_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Send SET_CONFIGURATION with one media codec capability
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn set_configuration(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        codec_type: MediaCodecType,
        configuration: &[u8],
    ) -> Result<(), TransportError>;

    /// Send RECONFIGURE with one media codec capability
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn reconfigure(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        codec_type: MediaCodecType,
        configuration: &[u8],
    ) -> Result<(), TransportError>;

    /// Send OPEN
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn open_stream(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Send START
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn start_stream(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Send SUSPEND
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn suspend_stream(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Send ABORT
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn abort_stream(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Send CLOSE
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn stop_stream(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Ask for one send opportunity, answered by [`AvdtpEvent::CanSendMediaNow`]
    ///
    /// # Errors
    /// Returns the stack status if the request could not be queued
    fn request_can_send_now(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError>;

    /// Transmit one media payload
    ///
    /// # Errors
    /// Returns the stack status if the payload could not be sent
    fn send_media_payload(
        &mut self,
        cid: SignalingChannelId,
        local_seid: StreamEndpointId,
        packet: MediaPacket<'_>,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_id_from_u8() {
        assert_eq!(SignalId::try_from(0x03), Ok(SignalId::SetConfiguration));
        assert_eq!(SignalId::try_from(0x0D), Ok(SignalId::DelayReport));
        assert!(SignalId::try_from(0x0B).is_err());
    }

    #[test]
    fn test_media_codec_type_from_u8() {
        assert_eq!(MediaCodecType::try_from(0x02), Ok(MediaCodecType::Mpeg24Aac));
        assert_eq!(MediaCodecType::try_from(0xFF), Ok(MediaCodecType::NonA2dp));
        assert_eq!(
            MediaCodecType::try_from(0x03),
            Err(A2dpError::UnsupportedCodec)
        );
    }
}
