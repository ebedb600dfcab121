//! Local A2DP source endpoints
//!
//! One local stream endpoint is registered per codec family. Each carries the
//! capability bytes it advertises and a configuration buffer rewritten on
//! every negotiation.

use heapless::Vec;

use super::avdtp::MediaCodecInfo;
use super::codec::{AacCapabilities, AacObjectType, CodecConfigBytes, CodecFamily, SbcCapabilities};
use super::vendor::{AptxCapabilities, LdacCapabilities};
use super::{A2dpError, Role, StreamEndpointId};
use crate::constants::{DEFAULT_SBC_MAX_BITPOOL, MAX_LOCAL_SEPS, SBC_MIN_BITPOOL};

/// A local stream endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEndpoint {
    /// Local SEID
    pub seid: StreamEndpointId,
    /// Codec family served by this endpoint
    pub family: CodecFamily,
    /// Advertised media codec capability
    pub capabilities: MediaCodecInfo,
    /// Last configuration sent or accepted
    pub configuration: CodecConfigBytes,
}

/// Local endpoint set of the source
#[derive(Debug)]
pub struct A2dpProfile {
    endpoints: Vec<LocalEndpoint, MAX_LOCAL_SEPS>,
    next_seid: StreamEndpointId,
}

impl Default for A2dpProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl A2dpProfile {
    /// Create a profile with no endpoints
    #[must_use]
    pub const fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            next_seid: 1,
        }
    }

    /// Local role, always [`Role::Source`]
    #[must_use]
    pub const fn role(&self) -> Role {
        Role::Source
    }

    /// Create a profile with one endpoint for every codec family
    ///
    /// # Errors
    /// Returns error if the endpoint table overflows
    pub fn with_default_endpoints() -> Result<Self, A2dpError> {
        let mut profile = Self::new();
        profile.add_endpoint(
            CodecFamily::Sbc,
            &SbcCapabilities::all(SBC_MIN_BITPOOL, DEFAULT_SBC_MAX_BITPOOL).to_bytes(),
        )?;
        profile.add_endpoint(CodecFamily::Aac, &default_aac_capabilities().to_bytes())?;
        profile.add_endpoint(
            CodecFamily::Ldac,
            &LdacCapabilities {
                sampling_frequencies: 0x20,
                channel_modes: 0x01,
            }
            .to_bytes(),
        )?;
        let aptx = AptxCapabilities {
            sampling_frequencies: 0xF0,
            channel_modes: 0x0F,
        };
        profile.add_endpoint(CodecFamily::Aptx, &aptx.to_aptx_bytes())?;
        profile.add_endpoint(CodecFamily::AptxHd, &aptx.to_aptx_hd_bytes())?;
        Ok(profile)
    }

    /// Register an endpoint for `family`, returning its SEID
    ///
    /// # Errors
    /// Returns error if the family is already registered, the capability
    /// does not fit, or the endpoint table is full
    pub fn add_endpoint(
        &mut self,
        family: CodecFamily,
        capabilities: &[u8],
    ) -> Result<StreamEndpointId, A2dpError> {
        if self.endpoint_for(family).is_some() {
            return Err(A2dpError::ConfigurationFailed);
        }
        let capabilities =
            MediaCodecInfo::from_slice(capabilities).map_err(|()| A2dpError::BufferTooSmall)?;
        let seid = self.next_seid;
        self.endpoints
            .push(LocalEndpoint {
                seid,
                family,
                capabilities,
                configuration: CodecConfigBytes::new(),
            })
            .map_err(|_| A2dpError::RegistryFull)?;
        self.next_seid += 1;
        Ok(seid)
    }

    /// Endpoint serving `family`
    #[must_use]
    pub fn endpoint_for(&self, family: CodecFamily) -> Option<&LocalEndpoint> {
        self.endpoints.iter().find(|ep| ep.family == family)
    }

    /// Endpoint with `seid`
    #[must_use]
    pub fn endpoint(&self, seid: StreamEndpointId) -> Option<&LocalEndpoint> {
        self.endpoints.iter().find(|ep| ep.seid == seid)
    }

    /// Store the configuration of the endpoint with `seid`
    ///
    /// # Errors
    /// Returns error if no such endpoint exists or the bytes do not fit
    pub fn set_configuration(
        &mut self,
        seid: StreamEndpointId,
        configuration: &[u8],
    ) -> Result<(), A2dpError> {
        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|ep| ep.seid == seid)
            .ok_or(A2dpError::InvalidEndpoint)?;
        endpoint.configuration =
            CodecConfigBytes::from_slice(configuration).map_err(|()| A2dpError::BufferTooSmall)?;
        Ok(())
    }

    /// All endpoints in registration order
    pub fn endpoints(&self) -> impl Iterator<Item = &LocalEndpoint> {
        self.endpoints.iter()
    }
}

/// MPEG-2 AAC LC, 44.1/48 kHz, mono and stereo, VBR
fn default_aac_capabilities() -> AacCapabilities {
    AacCapabilities {
        object_types: AacObjectType::MPEG2_LC,
        sampling_frequencies: (1 << 4) | (1 << 3),
        channels: 0x0C,
        vbr: true,
        bitrate: 320_000,
    }
}
