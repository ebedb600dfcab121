//! Codec selection
//!
//! [`CodecSelector`] walks an ordered candidate list with a round-robin
//! cursor, trying each family at most once per pass. [`configure_codec`]
//! derives one concrete configuration for a family from the local and remote
//! capabilities, choosing one set bit per parameter and preferring the
//! configured default.

use core::ops::BitAnd;

use heapless::Vec;

use super::avdtp::MediaCodecType;
use super::codec::{
    AAC_CHANNELS, AAC_OBJECT_TYPES, AAC_SAMPLE_RATES, AacCapabilities, AacConfiguration,
    AacObjectType, AllocationMethod, ChannelMode, CodecConfigBytes, CodecFamily, CodecParameters,
    SBC_ALLOCATION_METHODS, SBC_BLOCK_LENGTHS, SBC_CHANNEL_MODES, SBC_SAMPLE_RATES, SBC_SUBBANDS,
    SbcCapabilities, SbcConfiguration,
};
use super::vendor::{
    APTX_CHANNEL_MODES, APTX_SAMPLE_RATES, AptxCapabilities, AptxConfiguration,
    LDAC_CHANNEL_MODES, LDAC_SAMPLE_RATES, LdacCapabilities, LdacConfiguration, VendorCodecId,
};
use super::{A2dpError, StreamEndpointId};
use crate::constants::{
    DEFAULT_AAC_BITRATE, DEFAULT_SBC_MAX_BITPOOL, MAX_LOCAL_SEPS, SBC_MIN_BITPOOL,
};

/// Preferred parameter values used when the remote offers several
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecPreferences {
    /// Preferred sampling frequency in Hz
    pub sample_rate: u32,
    /// Preferred SBC channel mode
    pub sbc_channel_mode: ChannelMode,
    /// Upper bound for the SBC bitpool
    pub sbc_max_bitpool: u8,
    /// AAC bitrate in bits per second
    pub aac_bitrate: u32,
}

impl Default for CodecPreferences {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            sbc_channel_mode: ChannelMode::Stereo,
            sbc_max_bitpool: DEFAULT_SBC_MAX_BITPOOL,
            aac_bitrate: DEFAULT_AAC_BITRATE,
        }
    }
}

/// The codec chosen for the stream, with the endpoints it connects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CodecSelection {
    /// Local SEID
    pub local_seid: StreamEndpointId,
    /// Remote SEID
    pub remote_seid: StreamEndpointId,
    /// Registry index of the remote endpoint
    pub remote_index: usize,
    /// Resolved codec parameters
    pub parameters: CodecParameters,
}

impl CodecSelection {
    /// Codec family
    #[must_use]
    pub const fn family(&self) -> CodecFamily {
        self.parameters.family()
    }

    /// Sampling frequency in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.parameters.sample_rate()
    }

    /// Number of PCM channels
    #[must_use]
    pub const fn num_channels(&self) -> u8 {
        self.parameters.num_channels()
    }

    /// Media codec type for SET_CONFIGURATION
    #[must_use]
    pub const fn media_codec_type(&self) -> MediaCodecType {
        self.family().media_codec_type()
    }

    /// Sample clock period
    #[must_use]
    pub const fn tick_interval_ms(&self) -> u32 {
        self.family().tick_interval_ms()
    }

    /// Configuration bytes
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a parameter has no encoding
    pub fn config_bytes(&self) -> Result<CodecConfigBytes, A2dpError> {
        self.parameters.to_config_bytes()
    }
}

/// Pick one value whose bit is set in `available`
///
/// `preferred` wins if available; otherwise the first available entry of
/// `table`, which is ordered by priority.
pub fn choose<T, B>(table: &[(T, B)], available: B, preferred: T) -> Option<T>
where
    T: Copy + PartialEq,
    B: Copy + PartialEq + Default + BitAnd<Output = B>,
{
    let is_set = |bit: B| available & bit != B::default();
    table
        .iter()
        .find(|(value, bit)| *value == preferred && is_set(*bit))
        .or_else(|| table.iter().find(|(_, bit)| is_set(*bit)))
        .map(|(value, _)| *value)
}

/// Derive a configuration for `family` from both sides' capabilities
///
/// # Errors
/// Returns [`A2dpError::InvalidCapability`] if the capabilities are malformed
/// or share no value for some parameter, [`A2dpError::UnsupportedCodec`] if
/// a vendor header does not match `family`
pub fn configure_codec(
    family: CodecFamily,
    local: &[u8],
    remote: &[u8],
    preferences: &CodecPreferences,
) -> Result<CodecParameters, A2dpError> {
    match family {
        CodecFamily::Sbc => configure_sbc(local, remote, preferences).map(CodecParameters::Sbc),
        CodecFamily::Aac => configure_aac(local, remote, preferences).map(CodecParameters::Aac),
        CodecFamily::Ldac => {
            let local = LdacCapabilities::parse(local)?;
            let remote = LdacCapabilities::parse(remote)?;
            Ok(CodecParameters::Ldac(LdacConfiguration {
                sample_rate: choose(
                    &LDAC_SAMPLE_RATES,
                    local.sampling_frequencies & remote.sampling_frequencies,
                    preferences.sample_rate,
                )
                .ok_or(A2dpError::InvalidCapability)?,
                channel_mode: choose(
                    &LDAC_CHANNEL_MODES,
                    local.channel_modes & remote.channel_modes,
                    ChannelMode::Stereo,
                )
                .ok_or(A2dpError::InvalidCapability)?,
            }))
        }
        CodecFamily::Aptx => {
            configure_aptx(VendorCodecId::APTX, local, remote, preferences).map(CodecParameters::Aptx)
        }
        CodecFamily::AptxHd => configure_aptx(VendorCodecId::APTX_HD, local, remote, preferences)
            .map(CodecParameters::AptxHd),
    }
}

fn configure_sbc(
    local: &[u8],
    remote: &[u8],
    preferences: &CodecPreferences,
) -> Result<SbcConfiguration, A2dpError> {
    let common = SbcCapabilities::parse(local)?.intersect(&SbcCapabilities::parse(remote)?);
    let min_bitpool = common.min_bitpool.max(SBC_MIN_BITPOOL);
    let max_bitpool = common.max_bitpool.min(preferences.sbc_max_bitpool);
    if min_bitpool > max_bitpool {
        return Err(A2dpError::InvalidCapability);
    }
    Ok(SbcConfiguration {
        sample_rate: choose(&SBC_SAMPLE_RATES, common.sampling_frequencies, preferences.sample_rate)
            .ok_or(A2dpError::InvalidCapability)?,
        channel_mode: choose(
            &SBC_CHANNEL_MODES,
            common.channel_modes,
            preferences.sbc_channel_mode,
        )
        .ok_or(A2dpError::InvalidCapability)?,
        block_length: choose(&SBC_BLOCK_LENGTHS, common.block_lengths, 16)
            .ok_or(A2dpError::InvalidCapability)?,
        subbands: choose(&SBC_SUBBANDS, common.subbands, 8).ok_or(A2dpError::InvalidCapability)?,
        allocation_method: choose(
            &SBC_ALLOCATION_METHODS,
            common.allocation_methods,
            AllocationMethod::Loudness,
        )
        .ok_or(A2dpError::InvalidCapability)?,
        min_bitpool,
        max_bitpool,
    })
}

fn configure_aac(
    local: &[u8],
    remote: &[u8],
    preferences: &CodecPreferences,
) -> Result<AacConfiguration, A2dpError> {
    let local = AacCapabilities::parse(local)?;
    let remote = AacCapabilities::parse(remote)?;
    let bitrate = match remote.bitrate {
        0 => preferences.aac_bitrate,
        peak => preferences.aac_bitrate.min(peak),
    };
    Ok(AacConfiguration {
        object_type: choose(
            &AAC_OBJECT_TYPES,
            local.object_types & remote.object_types,
            AacObjectType::MPEG2_LC,
        )
        .ok_or(A2dpError::InvalidCapability)?,
        sample_rate: choose(
            &AAC_SAMPLE_RATES,
            local.sampling_frequencies & remote.sampling_frequencies,
            preferences.sample_rate,
        )
        .ok_or(A2dpError::InvalidCapability)?,
        channels: choose(&AAC_CHANNELS, local.channels & remote.channels, 2)
            .ok_or(A2dpError::InvalidCapability)?,
        vbr: local.vbr && remote.vbr,
        bitrate,
    })
}

fn configure_aptx(
    id: VendorCodecId,
    local: &[u8],
    remote: &[u8],
    preferences: &CodecPreferences,
) -> Result<AptxConfiguration, A2dpError> {
    let local = AptxCapabilities::parse(id, local)?;
    let remote = AptxCapabilities::parse(id, remote)?;
    Ok(AptxConfiguration {
        sample_rate: choose(
            &APTX_SAMPLE_RATES,
            local.sampling_frequencies & remote.sampling_frequencies,
            preferences.sample_rate,
        )
        .ok_or(A2dpError::InvalidCapability)?,
        channel_mode: choose(
            &APTX_CHANNEL_MODES,
            local.channel_modes & remote.channel_modes,
            ChannelMode::Stereo,
        )
        .ok_or(A2dpError::InvalidCapability)?,
    })
}

/// Round-robin walk over the candidate codec families
#[derive(Debug, Clone)]
pub struct CodecSelector {
    candidates: Vec<CodecFamily, MAX_LOCAL_SEPS>,
    cursor: usize,
    tried: u8,
    current: Option<usize>,
}

impl CodecSelector {
    /// Create a selector over `candidates`, tried in the given order
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidParameter`] if the list is empty, too long,
    /// or names a family twice
    pub fn new(candidates: &[CodecFamily]) -> Result<Self, A2dpError> {
        if candidates.is_empty() {
            return Err(A2dpError::InvalidParameter);
        }
        let mut list = Vec::new();
        for &family in candidates {
            if list.contains(&family) {
                return Err(A2dpError::InvalidParameter);
            }
            list.push(family).map_err(|_| A2dpError::InvalidParameter)?;
        }
        Ok(Self {
            candidates: list,
            cursor: 0,
            tried: 0,
            current: None,
        })
    }

    /// Candidate list in try order
    #[must_use]
    pub fn candidates(&self) -> &[CodecFamily] {
        &self.candidates
    }

    /// Candidate at `index`
    #[must_use]
    pub fn candidate(&self, index: usize) -> Option<CodecFamily> {
        self.candidates.get(index).copied()
    }

    /// Start a new pass: every candidate may be tried once more
    pub fn begin_pass(&mut self) {
        self.tried = 0;
    }

    /// Next untried candidate index, walking from the cursor and wrapping
    #[must_use]
    pub fn next_untried(&self) -> Option<usize> {
        let len = self.candidates.len();
        (0..len)
            .map(|step| (self.cursor + step) % len)
            .find(|&index| self.tried & (1 << index) == 0)
    }

    /// Record that `index` was tried in this pass
    pub fn mark_tried(&mut self, index: usize) {
        self.tried |= 1 << index;
    }

    /// Whether `index` was tried in this pass
    #[must_use]
    pub const fn was_tried(&self, index: usize) -> bool {
        self.tried & (1 << index) != 0
    }

    /// The remote accepted the candidate at `index`
    pub fn confirm(&mut self, index: usize) {
        self.current = Some(index);
        self.cursor = index;
    }

    /// Index of the accepted candidate
    #[must_use]
    pub const fn current(&self) -> Option<usize> {
        self.current
    }

    /// Move the cursor past the accepted candidate
    pub fn advance(&mut self) {
        let from = self.current.take().unwrap_or(self.cursor);
        self.cursor = (from + 1) % self.candidates.len();
    }

    /// Forget the cursor and the tried set
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.tried = 0;
        self.current = None;
    }
}
