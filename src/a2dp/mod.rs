//! A2DP source-side signaling
//!
//! This module holds everything that happens before audio flows: the codec
//! information byte layouts, the record of remote stream endpoints, the local
//! endpoint advertisements, codec selection, and the negotiation state
//! machine that drives AVDTP through discovery, configuration and start.
//!
//! ## Architecture
//!
//! - **AVDTP events**: already-parsed signaling milestones delivered by the transport
//! - **Codec info**: SBC/AAC bitmaps and vendor (LDAC, aptX, aptX HD) layouts
//! - **Registry**: remote sink endpoints and their capability blobs
//! - **Profile**: local endpoints, one per codec family
//! - **Selection**: candidate order, retry cursor and per-parameter choice
//! - **Negotiation**: the state machine reacting to accept/reject events
//!
//! ## Usage
//!
//! ```rust
//! use a2dp_source::a2dp::{A2dpProfile, CodecFamily};
//!
//! let profile = A2dpProfile::with_default_endpoints().unwrap();
//! assert!(profile.endpoint_for(CodecFamily::Sbc).is_some());
//! ```

pub mod avdtp;
pub mod codec;
pub mod negotiation;
pub mod profile;
pub mod registry;
pub mod selection;
pub mod vendor;

pub use avdtp::*;
pub use codec::*;
pub use negotiation::*;
pub use profile::*;
pub use registry::*;
pub use selection::*;
pub use vendor::*;

/// Stream Endpoint Identifier (SEID) type
pub type StreamEndpointId = u8;

/// AVDTP signaling channel identifier handed out by the transport
pub type SignalingChannelId = u16;

/// A2DP endpoint roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    /// Audio source (sends audio)
    Source,
    /// Audio sink (receives audio)
    Sink,
}

/// A2DP errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum A2dpError {
    /// Invalid or unknown stream endpoint
    InvalidEndpoint,
    /// Codec not supported locally or by the remote
    UnsupportedCodec,
    /// Stream configuration failed
    ConfigurationFailed,
    /// Capability bytes are malformed or carry no usable value
    InvalidCapability,
    /// Invalid parameter
    InvalidParameter,
    /// Output buffer is too small
    BufferTooSmall,
    /// A bounded collection is full
    RegistryFull,
    /// None of the candidate codecs could be configured
    NoCompatibleCodec,
    /// Operation not valid in the current state
    InvalidState,
    /// A transport request failed with the given status
    Transport(u8),
    /// The codec encoder reported the given error code
    Encoder(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversions() {
        assert_eq!(A2dpError::from(TransportError(0x12)), A2dpError::Transport(0x12));
        assert_eq!(
            A2dpError::from(crate::stream::EncoderError(3)),
            A2dpError::Encoder(3)
        );
    }
}
