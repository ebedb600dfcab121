//! Audio codec definitions for A2DP
//!
//! Capability and configuration layouts for the two standard codecs (SBC and
//! MPEG-2,4 AAC), the [`CodecFamily`] tag shared by signaling and streaming,
//! and the [`CodecParameters`] variant that carries one resolved
//! configuration. Vendor codec layouts live in [`super::vendor`].
//!
//! Bitmaps use the on-air bit positions, so a capability byte read from the
//! remote can be masked directly against the constants below.

use heapless::Vec;

use super::A2dpError;
use super::avdtp::MediaCodecType;
use super::vendor::{AptxConfiguration, LdacConfiguration, VendorCodecId};
use crate::constants::{
    DEFAULT_TICK_INTERVAL_MS, LDAC_TICK_INTERVAL_MS, MAX_MEDIA_CODEC_CONFIG_LEN, SBC_MAX_BITPOOL,
    SBC_MIN_BITPOOL, SBC_TICK_INTERVAL_MS,
};

/// Codec families the source can stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecFamily {
    /// SBC (Sub-Band Coding), the mandatory baseline
    Sbc,
    /// MPEG-2,4 AAC
    Aac,
    /// Sony LDAC
    Ldac,
    /// aptX
    Aptx,
    /// aptX HD
    AptxHd,
}

impl CodecFamily {
    /// Default candidate order, highest quality first
    pub const PREFERENCE: [Self; 5] = [Self::Ldac, Self::AptxHd, Self::Aptx, Self::Aac, Self::Sbc];

    /// Media codec type used in SET_CONFIGURATION
    #[must_use]
    pub const fn media_codec_type(self) -> MediaCodecType {
        match self {
            Self::Sbc => MediaCodecType::Sbc,
            Self::Aac => MediaCodecType::Mpeg24Aac,
            Self::Ldac | Self::Aptx | Self::AptxHd => MediaCodecType::NonA2dp,
        }
    }

    /// Vendor/codec id pair for vendor codecs
    #[must_use]
    pub const fn vendor_codec_id(self) -> Option<VendorCodecId> {
        match self {
            Self::Sbc | Self::Aac => None,
            Self::Ldac => Some(VendorCodecId::LDAC),
            Self::Aptx => Some(VendorCodecId::APTX),
            Self::AptxHd => Some(VendorCodecId::APTX_HD),
        }
    }

    /// Identify the family of a media codec capability
    ///
    /// Returns `None` for codecs this source does not implement.
    #[must_use]
    pub fn identify(codec_type: MediaCodecType, info: &[u8]) -> Option<Self> {
        match codec_type {
            MediaCodecType::Sbc => Some(Self::Sbc),
            MediaCodecType::Mpeg24Aac => Some(Self::Aac),
            MediaCodecType::NonA2dp => {
                let id = VendorCodecId::read(info).ok()?;
                Self::from_vendor_codec_id(id)
            }
            MediaCodecType::Mpeg12Audio | MediaCodecType::Atrac => None,
        }
    }

    /// Family registered for a vendor/codec id pair
    #[must_use]
    pub fn from_vendor_codec_id(id: VendorCodecId) -> Option<Self> {
        [Self::Ldac, Self::Aptx, Self::AptxHd]
            .into_iter()
            .find(|family| family.vendor_codec_id() == Some(id))
    }

    /// Sample clock period for streams of this family
    #[must_use]
    pub const fn tick_interval_ms(self) -> u32 {
        match self {
            Self::Sbc => SBC_TICK_INTERVAL_MS,
            Self::Ldac => LDAC_TICK_INTERVAL_MS,
            Self::Aac | Self::Aptx | Self::AptxHd => DEFAULT_TICK_INTERVAL_MS,
        }
    }
}

/// Channel mode shared by the codec layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelMode {
    /// Mono
    Mono,
    /// Dual channel
    DualChannel,
    /// Stereo
    Stereo,
    /// Joint stereo
    JointStereo,
}

impl ChannelMode {
    /// Number of PCM channels fed to the encoder
    #[must_use]
    pub const fn num_channels(self) -> u8 {
        match self {
            Self::Mono => 1,
            Self::DualChannel | Self::Stereo | Self::JointStereo => 2,
        }
    }
}

/// SBC bit allocation method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllocationMethod {
    /// SNR allocation
    Snr,
    /// Loudness allocation
    Loudness,
}

/// Bit assigned to `value` in a `(value, bit)` table
pub(crate) fn bit_for<T: PartialEq + Copy, B: Copy>(table: &[(T, B)], value: T) -> Option<B> {
    table.iter().find(|(v, _)| *v == value).map(|(_, bit)| *bit)
}

/// Value assigned to `bit` in a `(value, bit)` table
pub(crate) fn value_for<T: Copy, B: PartialEq + Copy>(table: &[(T, B)], bit: B) -> Option<T> {
    table.iter().find(|(_, b)| *b == bit).map(|(value, _)| *value)
}

/// SBC sampling frequencies, in selection priority order
pub const SBC_SAMPLE_RATES: [(u32, u8); 4] =
    [(44_100, 0x20), (48_000, 0x10), (32_000, 0x40), (16_000, 0x80)];

/// SBC channel modes, in selection priority order
pub const SBC_CHANNEL_MODES: [(ChannelMode, u8); 4] = [
    (ChannelMode::JointStereo, 0x01),
    (ChannelMode::Stereo, 0x02),
    (ChannelMode::DualChannel, 0x04),
    (ChannelMode::Mono, 0x08),
];

/// SBC block lengths, in selection priority order
pub const SBC_BLOCK_LENGTHS: [(u8, u8); 4] = [(16, 0x10), (12, 0x20), (8, 0x40), (4, 0x80)];

/// SBC subbands, in selection priority order
pub const SBC_SUBBANDS: [(u8, u8); 2] = [(8, 0x04), (4, 0x08)];

/// SBC allocation methods, in selection priority order
pub const SBC_ALLOCATION_METHODS: [(AllocationMethod, u8); 2] =
    [(AllocationMethod::Loudness, 0x01), (AllocationMethod::Snr, 0x02)];

/// SBC codec capabilities (4 bytes of media codec information)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcCapabilities {
    /// Sampling frequency bitmap (high nibble of byte 0)
    pub sampling_frequencies: u8,
    /// Channel mode bitmap (low nibble of byte 0)
    pub channel_modes: u8,
    /// Block length bitmap (high nibble of byte 1)
    pub block_lengths: u8,
    /// Subbands bitmap (bits 2-3 of byte 1)
    pub subbands: u8,
    /// Allocation method bitmap (bits 0-1 of byte 1)
    pub allocation_methods: u8,
    /// Minimum bitpool value (2-250)
    pub min_bitpool: u8,
    /// Maximum bitpool value (2-250)
    pub max_bitpool: u8,
}

impl SbcCapabilities {
    /// Length of the SBC media codec information element
    pub const LEN: usize = 4;

    /// Everything SBC allows, with the given bitpool range
    #[must_use]
    pub const fn all(min_bitpool: u8, max_bitpool: u8) -> Self {
        Self {
            sampling_frequencies: 0xF0,
            channel_modes: 0x0F,
            block_lengths: 0xF0,
            subbands: 0x0C,
            allocation_methods: 0x03,
            min_bitpool,
            max_bitpool,
        }
    }

    /// Decode SBC media codec information
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if fewer than 4 bytes are given
    pub fn parse(info: &[u8]) -> Result<Self, A2dpError> {
        let [b0, b1, min_bitpool, max_bitpool, ..] = *info else {
            return Err(A2dpError::InvalidCapability);
        };
        Ok(Self {
            sampling_frequencies: b0 & 0xF0,
            channel_modes: b0 & 0x0F,
            block_lengths: b1 & 0xF0,
            subbands: b1 & 0x0C,
            allocation_methods: b1 & 0x03,
            min_bitpool,
            max_bitpool,
        })
    }

    /// Encode as media codec information
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; 4] {
        [
            self.sampling_frequencies | self.channel_modes,
            self.block_lengths | self.subbands | self.allocation_methods,
            self.min_bitpool,
            self.max_bitpool,
        ]
    }

    /// Validate SBC capabilities
    ///
    /// # Errors
    /// Returns error if a bitmap is empty or the bitpool range is invalid
    pub const fn validate(&self) -> Result<(), A2dpError> {
        if self.sampling_frequencies == 0
            || self.channel_modes == 0
            || self.block_lengths == 0
            || self.subbands == 0
            || self.allocation_methods == 0
        {
            return Err(A2dpError::InvalidCapability);
        }
        if self.min_bitpool < SBC_MIN_BITPOOL || self.max_bitpool > SBC_MAX_BITPOOL {
            return Err(A2dpError::InvalidCapability);
        }
        if self.min_bitpool > self.max_bitpool {
            return Err(A2dpError::InvalidCapability);
        }
        Ok(())
    }

    /// Capabilities supported by both sides
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            sampling_frequencies: self.sampling_frequencies & other.sampling_frequencies,
            channel_modes: self.channel_modes & other.channel_modes,
            block_lengths: self.block_lengths & other.block_lengths,
            subbands: self.subbands & other.subbands,
            allocation_methods: self.allocation_methods & other.allocation_methods,
            min_bitpool: self.min_bitpool.max(other.min_bitpool),
            max_bitpool: self.max_bitpool.min(other.max_bitpool),
        }
    }
}

/// One resolved SBC configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SbcConfiguration {
    /// Sampling frequency in Hz
    pub sample_rate: u32,
    /// Channel mode
    pub channel_mode: ChannelMode,
    /// Blocks per frame (4, 8, 12 or 16)
    pub block_length: u8,
    /// Subbands per block (4 or 8)
    pub subbands: u8,
    /// Bit allocation method
    pub allocation_method: AllocationMethod,
    /// Minimum bitpool
    pub min_bitpool: u8,
    /// Maximum bitpool, used by the encoder
    pub max_bitpool: u8,
}

impl SbcConfiguration {
    /// Decode a SET_CONFIGURATION payload (exactly one bit per field)
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a field has no or several bits set
    pub fn parse(info: &[u8]) -> Result<Self, A2dpError> {
        let caps = SbcCapabilities::parse(info)?;
        Ok(Self {
            sample_rate: value_for(&SBC_SAMPLE_RATES, caps.sampling_frequencies)
                .ok_or(A2dpError::InvalidCapability)?,
            channel_mode: value_for(&SBC_CHANNEL_MODES, caps.channel_modes)
                .ok_or(A2dpError::InvalidCapability)?,
            block_length: value_for(&SBC_BLOCK_LENGTHS, caps.block_lengths)
                .ok_or(A2dpError::InvalidCapability)?,
            subbands: value_for(&SBC_SUBBANDS, caps.subbands)
                .ok_or(A2dpError::InvalidCapability)?,
            allocation_method: value_for(&SBC_ALLOCATION_METHODS, caps.allocation_methods)
                .ok_or(A2dpError::InvalidCapability)?,
            min_bitpool: caps.min_bitpool,
            max_bitpool: caps.max_bitpool,
        })
    }

    /// Encode as SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a value has no SBC encoding
    pub fn to_bytes(&self) -> Result<[u8; 4], A2dpError> {
        let caps = SbcCapabilities {
            sampling_frequencies: bit_for(&SBC_SAMPLE_RATES, self.sample_rate)
                .ok_or(A2dpError::InvalidCapability)?,
            channel_modes: bit_for(&SBC_CHANNEL_MODES, self.channel_mode)
                .ok_or(A2dpError::InvalidCapability)?,
            block_lengths: bit_for(&SBC_BLOCK_LENGTHS, self.block_length)
                .ok_or(A2dpError::InvalidCapability)?,
            subbands: bit_for(&SBC_SUBBANDS, self.subbands).ok_or(A2dpError::InvalidCapability)?,
            allocation_methods: bit_for(&SBC_ALLOCATION_METHODS, self.allocation_method)
                .ok_or(A2dpError::InvalidCapability)?,
            min_bitpool: self.min_bitpool,
            max_bitpool: self.max_bitpool,
        };
        Ok(caps.to_bytes())
    }

    /// Number of PCM channels
    #[must_use]
    pub const fn num_channels(&self) -> u8 {
        self.channel_mode.num_channels()
    }

    /// PCM samples per channel in one SBC frame
    #[must_use]
    pub const fn samples_per_frame(&self) -> usize {
        self.block_length as usize * self.subbands as usize
    }

    /// Encoded SBC frame length in bytes at the maximum bitpool
    #[must_use]
    pub const fn frame_length(&self) -> usize {
        let channels = self.num_channels() as usize;
        let subbands = self.subbands as usize;
        let blocks = self.block_length as usize;
        let bitpool = self.max_bitpool as usize;
        let header = 4 + (4 * subbands * channels) / 8;
        let data_bits = match self.channel_mode {
            ChannelMode::Mono | ChannelMode::DualChannel => blocks * channels * bitpool,
            ChannelMode::Stereo => blocks * bitpool,
            ChannelMode::JointStereo => subbands + blocks * bitpool,
        };
        header + data_bits.div_ceil(8)
    }
}

/// AAC object type bits (byte 0)
pub struct AacObjectType;

impl AacObjectType {
    /// MPEG-2 AAC LC
    pub const MPEG2_LC: u8 = 0x80;
    /// MPEG-4 AAC LC
    pub const MPEG4_LC: u8 = 0x40;
    /// MPEG-4 AAC LTP
    pub const MPEG4_LTP: u8 = 0x20;
    /// MPEG-4 AAC scalable
    pub const MPEG4_SCALABLE: u8 = 0x10;
}

/// AAC sampling frequencies (12-bit field spanning bytes 1-2), in selection priority order
pub const AAC_SAMPLE_RATES: [(u32, u16); 12] = [
    (44_100, 1 << 4),
    (48_000, 1 << 3),
    (96_000, 1 << 0),
    (88_200, 1 << 1),
    (64_000, 1 << 2),
    (32_000, 1 << 5),
    (24_000, 1 << 6),
    (22_050, 1 << 7),
    (16_000, 1 << 8),
    (12_000, 1 << 9),
    (11_025, 1 << 10),
    (8_000, 1 << 11),
];

/// AAC channel counts (bits 2-3 of byte 2), in selection priority order
pub const AAC_CHANNELS: [(u8, u8); 2] = [(2, 0x04), (1, 0x08)];

/// Object types in selection priority order
pub const AAC_OBJECT_TYPES: [(u8, u8); 4] = [
    (AacObjectType::MPEG2_LC, AacObjectType::MPEG2_LC),
    (AacObjectType::MPEG4_LC, AacObjectType::MPEG4_LC),
    (AacObjectType::MPEG4_LTP, AacObjectType::MPEG4_LTP),
    (AacObjectType::MPEG4_SCALABLE, AacObjectType::MPEG4_SCALABLE),
];

/// MPEG-2,4 AAC capabilities (6 bytes of media codec information)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacCapabilities {
    /// Object type bitmap
    pub object_types: u8,
    /// Sampling frequency bitmap, 8000 Hz in bit 11 down to 96000 Hz in bit 0
    pub sampling_frequencies: u16,
    /// Channel bitmap
    pub channels: u8,
    /// Variable bitrate supported
    pub vbr: bool,
    /// Peak bitrate in bits per second (23 bits)
    pub bitrate: u32,
}

impl AacCapabilities {
    /// Length of the AAC media codec information element
    pub const LEN: usize = 6;

    /// Decode AAC media codec information
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if fewer than 6 bytes are given
    pub fn parse(info: &[u8]) -> Result<Self, A2dpError> {
        let [b0, b1, b2, b3, b4, b5, ..] = *info else {
            return Err(A2dpError::InvalidCapability);
        };
        Ok(Self {
            object_types: b0,
            sampling_frequencies: (u16::from(b1) << 4) | u16::from(b2 >> 4),
            channels: b2 & 0x0C,
            vbr: b3 & 0x80 != 0,
            bitrate: (u32::from(b3 & 0x7F) << 16) | (u32::from(b4) << 8) | u32::from(b5),
        })
    }

    /// Encode as media codec information
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; 6] {
        let sf = self.sampling_frequencies;
        let vbr = if self.vbr { 0x80 } else { 0x00 };
        [
            self.object_types,
            (sf >> 4) as u8,
            (((sf & 0x0F) as u8) << 4) | (self.channels & 0x0C),
            vbr | ((self.bitrate >> 16) & 0x7F) as u8,
            (self.bitrate >> 8) as u8,
            self.bitrate as u8,
        ]
    }
}

/// One resolved AAC configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AacConfiguration {
    /// Object type bit
    pub object_type: u8,
    /// Sampling frequency in Hz
    pub sample_rate: u32,
    /// Number of channels (1 or 2)
    pub channels: u8,
    /// Variable bitrate
    pub vbr: bool,
    /// Bitrate in bits per second
    pub bitrate: u32,
}

impl AacConfiguration {
    /// Decode a SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a field has no or several bits set
    pub fn parse(info: &[u8]) -> Result<Self, A2dpError> {
        let caps = AacCapabilities::parse(info)?;
        Ok(Self {
            object_type: value_for(&AAC_OBJECT_TYPES, caps.object_types)
                .ok_or(A2dpError::InvalidCapability)?,
            sample_rate: value_for(&AAC_SAMPLE_RATES, caps.sampling_frequencies)
                .ok_or(A2dpError::InvalidCapability)?,
            channels: value_for(&AAC_CHANNELS, caps.channels).ok_or(A2dpError::InvalidCapability)?,
            vbr: caps.vbr,
            bitrate: caps.bitrate,
        })
    }

    /// Encode as SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a value has no AAC encoding
    pub fn to_bytes(&self) -> Result<[u8; 6], A2dpError> {
        let caps = AacCapabilities {
            object_types: self.object_type,
            sampling_frequencies: bit_for(&AAC_SAMPLE_RATES, self.sample_rate)
                .ok_or(A2dpError::InvalidCapability)?,
            channels: bit_for(&AAC_CHANNELS, self.channels).ok_or(A2dpError::InvalidCapability)?,
            vbr: self.vbr,
            bitrate: self.bitrate,
        };
        Ok(caps.to_bytes())
    }
}

/// Configuration bytes as sent in SET_CONFIGURATION / RECONFIGURE
pub type CodecConfigBytes = Vec<u8, MAX_MEDIA_CODEC_CONFIG_LEN>;

/// The resolved parameters of one configured codec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CodecParameters {
    /// SBC
    Sbc(SbcConfiguration),
    /// MPEG-2,4 AAC
    Aac(AacConfiguration),
    /// LDAC
    Ldac(LdacConfiguration),
    /// aptX
    Aptx(AptxConfiguration),
    /// aptX HD
    AptxHd(AptxConfiguration),
}

impl CodecParameters {
    /// Decode a configuration for `family`
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if the bytes do not describe one configuration
    pub fn parse(family: CodecFamily, info: &[u8]) -> Result<Self, A2dpError> {
        Ok(match family {
            CodecFamily::Sbc => Self::Sbc(SbcConfiguration::parse(info)?),
            CodecFamily::Aac => Self::Aac(AacConfiguration::parse(info)?),
            CodecFamily::Ldac => Self::Ldac(LdacConfiguration::parse(info)?),
            CodecFamily::Aptx => Self::Aptx(AptxConfiguration::parse(VendorCodecId::APTX, info)?),
            CodecFamily::AptxHd => {
                Self::AptxHd(AptxConfiguration::parse(VendorCodecId::APTX_HD, info)?)
            }
        })
    }

    /// Codec family
    #[must_use]
    pub const fn family(&self) -> CodecFamily {
        match self {
            Self::Sbc(_) => CodecFamily::Sbc,
            Self::Aac(_) => CodecFamily::Aac,
            Self::Ldac(_) => CodecFamily::Ldac,
            Self::Aptx(_) => CodecFamily::Aptx,
            Self::AptxHd(_) => CodecFamily::AptxHd,
        }
    }

    /// Sampling frequency in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        match self {
            Self::Sbc(c) => c.sample_rate,
            Self::Aac(c) => c.sample_rate,
            Self::Ldac(c) => c.sample_rate,
            Self::Aptx(c) | Self::AptxHd(c) => c.sample_rate,
        }
    }

    /// Number of PCM channels
    #[must_use]
    pub const fn num_channels(&self) -> u8 {
        match self {
            Self::Sbc(c) => c.num_channels(),
            Self::Aac(c) => c.channels,
            Self::Ldac(c) => c.channel_mode.num_channels(),
            Self::Aptx(c) | Self::AptxHd(c) => c.channel_mode.num_channels(),
        }
    }

    /// Serialize into the codec's configuration byte layout
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a value has no encoding
    pub fn to_config_bytes(&self) -> Result<CodecConfigBytes, A2dpError> {
        let mut out = CodecConfigBytes::new();
        let result = match self {
            Self::Sbc(c) => out.extend_from_slice(&c.to_bytes()?),
            Self::Aac(c) => out.extend_from_slice(&c.to_bytes()?),
            Self::Ldac(c) => out.extend_from_slice(&c.to_bytes()?),
            Self::Aptx(c) => out.extend_from_slice(&c.to_aptx_bytes()?),
            Self::AptxHd(c) => out.extend_from_slice(&c.to_aptx_hd_bytes()?),
        };
        result.map_err(|()| A2dpError::BufferTooSmall)?;
        Ok(out)
    }
}
