//! Remote stream endpoint registry
//!
//! Records the sink endpoints reported during discovery together with the
//! media codec capability each one advertises. The registry is cleared on a
//! new discovery and on disconnect.

use heapless::Vec;

use super::avdtp::{MediaCodecInfo, MediaCodecType, MediaType};
use super::codec::CodecFamily;
use super::vendor::VendorCodecId;
use super::{A2dpError, StreamEndpointId};
use crate::constants::MAX_REMOTE_SEPS;

/// A remote stream endpoint and its media codec capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Remote SEID
    pub seid: StreamEndpointId,
    /// Whether the remote reported the endpoint as in use
    pub in_use: bool,
    /// Media type of the endpoint
    pub media_type: MediaType,
    /// Codec type of the reported media codec capability
    pub codec_type: Option<MediaCodecType>,
    /// Raw media codec information bytes
    pub media_codec_info: MediaCodecInfo,
    /// Vendor header, for vendor-specific codecs
    pub vendor: Option<VendorCodecId>,
    /// Whether a media codec capability has been received
    pub has_media_codec_capabilities: bool,
}

impl RemoteEndpoint {
    /// Create an endpoint with no capabilities yet
    #[must_use]
    pub fn new(seid: StreamEndpointId, in_use: bool, media_type: MediaType) -> Self {
        Self {
            seid,
            in_use,
            media_type,
            codec_type: None,
            media_codec_info: MediaCodecInfo::new(),
            vendor: None,
            has_media_codec_capabilities: false,
        }
    }

    /// Codec family this endpoint offers, if the source implements it
    #[must_use]
    pub fn family(&self) -> Option<CodecFamily> {
        let codec_type = self.codec_type?;
        CodecFamily::identify(codec_type, &self.media_codec_info)
    }
}

/// Discovered remote sink endpoints
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    endpoints: Vec<RemoteEndpoint, MAX_REMOTE_SEPS>,
    selected: Option<usize>,
}

impl CapabilityRegistry {
    /// Create an empty registry
    #[must_use]
    pub const fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            selected: None,
        }
    }

    /// Forget every endpoint and the selection
    pub fn clear(&mut self) {
        self.endpoints.clear();
        self.selected = None;
    }

    /// Record a discovered sink endpoint, returning its index
    ///
    /// A SEID reported twice keeps its first index.
    ///
    /// # Errors
    /// Returns [`A2dpError::RegistryFull`] when the registry is at capacity
    pub fn add_sink(
        &mut self,
        seid: StreamEndpointId,
        in_use: bool,
        media_type: MediaType,
    ) -> Result<usize, A2dpError> {
        if let Some(index) = self.index_of(seid) {
            return Ok(index);
        }
        self.endpoints
            .push(RemoteEndpoint::new(seid, in_use, media_type))
            .map_err(|_| A2dpError::RegistryFull)?;
        Ok(self.endpoints.len() - 1)
    }

    /// Store the media codec capability reported for `seid`
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidEndpoint`] if `seid` was never discovered
    pub fn record_capability(
        &mut self,
        seid: StreamEndpointId,
        codec_type: MediaCodecType,
        info: &MediaCodecInfo,
    ) -> Result<usize, A2dpError> {
        let index = self.index_of(seid).ok_or(A2dpError::InvalidEndpoint)?;
        let endpoint = &mut self.endpoints[index];
        endpoint.codec_type = Some(codec_type);
        endpoint.media_codec_info.clone_from(info);
        endpoint.vendor = match codec_type {
            MediaCodecType::NonA2dp => VendorCodecId::read(info).ok(),
            _ => None,
        };
        endpoint.has_media_codec_capabilities = true;
        Ok(index)
    }

    /// Index of the endpoint with `seid`
    #[must_use]
    pub fn index_of(&self, seid: StreamEndpointId) -> Option<usize> {
        self.endpoints.iter().position(|ep| ep.seid == seid)
    }

    /// Endpoint at `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RemoteEndpoint> {
        self.endpoints.get(index)
    }

    /// All endpoints in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &RemoteEndpoint> {
        self.endpoints.iter()
    }

    /// Number of discovered endpoints
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Whether no endpoint was discovered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Pin the endpoint at `index` as the preferred stream target
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidEndpoint`] if `index` is out of range
    pub fn select(&mut self, index: usize) -> Result<(), A2dpError> {
        if index >= self.endpoints.len() {
            return Err(A2dpError::InvalidEndpoint);
        }
        self.selected = Some(index);
        Ok(())
    }

    /// Index of the pinned endpoint
    #[must_use]
    pub const fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Index of an endpoint offering `family`
    ///
    /// The pinned endpoint wins if it offers the family; otherwise the first
    /// endpoint in discovery order that does.
    #[must_use]
    pub fn find_family(&self, family: CodecFamily) -> Option<usize> {
        if let Some(index) = self.selected {
            if self.endpoints[index].family() == Some(family) {
                return Some(index);
            }
        }
        self.endpoints
            .iter()
            .position(|ep| ep.family() == Some(family))
    }
}
