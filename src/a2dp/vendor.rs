//! Vendor-specific codec information
//!
//! Every non-A2DP codec starts its media codec information with the same
//! 6-byte header: the 32-bit Bluetooth SIG company id of the vendor followed
//! by the vendor's 16-bit codec id, both little-endian. Codec parameters
//! follow from byte 6.

use super::A2dpError;
use super::codec::{ChannelMode, bit_for, value_for};
use crate::constants::{
    CODEC_ID_APTX, CODEC_ID_APTX_HD, CODEC_ID_LDAC, VENDOR_ID_APT, VENDOR_ID_QUALCOMM,
    VENDOR_ID_SONY,
};

/// Length of the vendor id + codec id header
pub const VENDOR_HEADER_LEN: usize = 6;

/// Vendor id / codec id pair identifying a vendor codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VendorCodecId {
    /// Bluetooth SIG company identifier
    pub vendor_id: u32,
    /// Vendor-assigned codec identifier
    pub codec_id: u16,
}

impl VendorCodecId {
    /// Sony LDAC
    pub const LDAC: Self = Self::new(VENDOR_ID_SONY, CODEC_ID_LDAC);
    /// aptX
    pub const APTX: Self = Self::new(VENDOR_ID_APT, CODEC_ID_APTX);
    /// aptX HD
    pub const APTX_HD: Self = Self::new(VENDOR_ID_QUALCOMM, CODEC_ID_APTX_HD);

    /// Create a vendor/codec id pair
    #[must_use]
    pub const fn new(vendor_id: u32, codec_id: u16) -> Self {
        Self {
            vendor_id,
            codec_id,
        }
    }

    /// Read the header from the start of a media codec information element
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if fewer than 6 bytes are given
    pub fn read(info: &[u8]) -> Result<Self, A2dpError> {
        let [v0, v1, v2, v3, c0, c1, ..] = *info else {
            return Err(A2dpError::InvalidCapability);
        };
        Ok(Self {
            vendor_id: u32::from_le_bytes([v0, v1, v2, v3]),
            codec_id: u16::from_le_bytes([c0, c1]),
        })
    }

    /// Write the header to the start of `out`
    ///
    /// # Errors
    /// Returns [`A2dpError::BufferTooSmall`] if `out` is shorter than 6 bytes
    pub fn write(&self, out: &mut [u8]) -> Result<usize, A2dpError> {
        let header = out
            .get_mut(..VENDOR_HEADER_LEN)
            .ok_or(A2dpError::BufferTooSmall)?;
        header.copy_from_slice(&self.to_bytes());
        Ok(VENDOR_HEADER_LEN)
    }

    /// The 6 header bytes
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; VENDOR_HEADER_LEN] {
        let v = self.vendor_id.to_le_bytes();
        let c = self.codec_id.to_le_bytes();
        [v[0], v[1], v[2], v[3], c[0], c[1]]
    }
}

/// Read the header and check it matches `expected`
fn expect_vendor(expected: VendorCodecId, info: &[u8]) -> Result<(), A2dpError> {
    if VendorCodecId::read(info)? == expected {
        Ok(())
    } else {
        Err(A2dpError::UnsupportedCodec)
    }
}

/// LDAC sampling frequencies (byte 6), in selection priority order
pub const LDAC_SAMPLE_RATES: [(u32, u8); 6] = [
    (44_100, 0x20),
    (48_000, 0x10),
    (88_200, 0x08),
    (96_000, 0x04),
    (176_400, 0x02),
    (192_000, 0x01),
];

/// LDAC channel modes (byte 7), in selection priority order
pub const LDAC_CHANNEL_MODES: [(ChannelMode, u8); 3] = [
    (ChannelMode::Stereo, 0x01),
    (ChannelMode::DualChannel, 0x02),
    (ChannelMode::Mono, 0x04),
];

/// LDAC capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacCapabilities {
    /// Sampling frequency bitmap
    pub sampling_frequencies: u8,
    /// Channel mode bitmap
    pub channel_modes: u8,
}

impl LdacCapabilities {
    /// Length of the LDAC media codec information element
    pub const LEN: usize = 10;

    /// Decode LDAC media codec information
    ///
    /// # Errors
    /// Returns an error if the header is not LDAC or the element is truncated
    pub fn parse(info: &[u8]) -> Result<Self, A2dpError> {
        expect_vendor(VendorCodecId::LDAC, info)?;
        let (Some(&sampling_frequencies), Some(&channel_modes)) =
            (info.get(VENDOR_HEADER_LEN), info.get(VENDOR_HEADER_LEN + 1))
        else {
            return Err(A2dpError::InvalidCapability);
        };
        Ok(Self {
            sampling_frequencies: sampling_frequencies & 0x3F,
            channel_modes: channel_modes & 0x07,
        })
    }

    /// Encode as media codec information, reserved bytes zeroed
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; Self::LEN] {
        let h = VendorCodecId::LDAC.to_bytes();
        [
            h[0],
            h[1],
            h[2],
            h[3],
            h[4],
            h[5],
            self.sampling_frequencies,
            self.channel_modes,
            0,
            0,
        ]
    }
}

/// One resolved LDAC configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LdacConfiguration {
    /// Sampling frequency in Hz
    pub sample_rate: u32,
    /// Channel mode
    pub channel_mode: ChannelMode,
}

impl LdacConfiguration {
    /// Decode a SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns an error if the header is not LDAC or a field is not a single bit
    pub fn parse(info: &[u8]) -> Result<Self, A2dpError> {
        let caps = LdacCapabilities::parse(info)?;
        Ok(Self {
            sample_rate: value_for(&LDAC_SAMPLE_RATES, caps.sampling_frequencies)
                .ok_or(A2dpError::InvalidCapability)?,
            channel_mode: value_for(&LDAC_CHANNEL_MODES, caps.channel_modes)
                .ok_or(A2dpError::InvalidCapability)?,
        })
    }

    /// Encode as SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a value has no LDAC encoding
    pub fn to_bytes(&self) -> Result<[u8; LdacCapabilities::LEN], A2dpError> {
        let caps = LdacCapabilities {
            sampling_frequencies: bit_for(&LDAC_SAMPLE_RATES, self.sample_rate)
                .ok_or(A2dpError::InvalidCapability)?,
            channel_modes: bit_for(&LDAC_CHANNEL_MODES, self.channel_mode)
                .ok_or(A2dpError::InvalidCapability)?,
        };
        Ok(caps.to_bytes())
    }
}

/// aptX / aptX HD sampling frequencies (high nibble of byte 6), in selection priority order
pub const APTX_SAMPLE_RATES: [(u32, u8); 4] =
    [(44_100, 0x20), (48_000, 0x10), (32_000, 0x40), (16_000, 0x80)];

/// aptX / aptX HD channel modes (low nibble of byte 6), in selection priority order
pub const APTX_CHANNEL_MODES: [(ChannelMode, u8); 4] = [
    (ChannelMode::Stereo, 0x02),
    (ChannelMode::JointStereo, 0x01),
    (ChannelMode::DualChannel, 0x04),
    (ChannelMode::Mono, 0x08),
];

/// aptX / aptX HD capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxCapabilities {
    /// Sampling frequency bitmap (high nibble)
    pub sampling_frequencies: u8,
    /// Channel mode bitmap (low nibble)
    pub channel_modes: u8,
}

impl AptxCapabilities {
    /// Length of the aptX media codec information element
    pub const APTX_LEN: usize = 7;
    /// Length of the aptX HD media codec information element
    pub const APTX_HD_LEN: usize = 12;
    /// aptX HD bits-per-sample indicator (16-bit PCM input)
    pub const APTX_HD_BITS_PER_SAMPLE: u8 = 0x01;

    /// Decode aptX or aptX HD media codec information
    ///
    /// # Errors
    /// Returns an error if the header is not `expected` or the element is truncated
    pub fn parse(expected: VendorCodecId, info: &[u8]) -> Result<Self, A2dpError> {
        expect_vendor(expected, info)?;
        let byte = *info
            .get(VENDOR_HEADER_LEN)
            .ok_or(A2dpError::InvalidCapability)?;
        Ok(Self {
            sampling_frequencies: byte & 0xF0,
            channel_modes: byte & 0x0F,
        })
    }

    /// Encode as aptX media codec information
    #[must_use]
    pub const fn to_aptx_bytes(&self) -> [u8; Self::APTX_LEN] {
        let h = VendorCodecId::APTX.to_bytes();
        [
            h[0],
            h[1],
            h[2],
            h[3],
            h[4],
            h[5],
            self.sampling_frequencies | self.channel_modes,
        ]
    }

    /// Encode as aptX HD media codec information
    #[must_use]
    pub const fn to_aptx_hd_bytes(&self) -> [u8; Self::APTX_HD_LEN] {
        let h = VendorCodecId::APTX_HD.to_bytes();
        [
            h[0],
            h[1],
            h[2],
            h[3],
            h[4],
            h[5],
            self.sampling_frequencies | self.channel_modes,
            0,
            0,
            0,
            0,
            Self::APTX_HD_BITS_PER_SAMPLE,
        ]
    }
}

/// One resolved aptX / aptX HD configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AptxConfiguration {
    /// Sampling frequency in Hz
    pub sample_rate: u32,
    /// Channel mode
    pub channel_mode: ChannelMode,
}

impl AptxConfiguration {
    /// Decode a SET_CONFIGURATION payload for aptX (`APTX`) or aptX HD (`APTX_HD`)
    ///
    /// # Errors
    /// Returns an error if the header does not match or a field is not a single bit
    pub fn parse(expected: VendorCodecId, info: &[u8]) -> Result<Self, A2dpError> {
        let caps = AptxCapabilities::parse(expected, info)?;
        Ok(Self {
            sample_rate: value_for(&APTX_SAMPLE_RATES, caps.sampling_frequencies)
                .ok_or(A2dpError::InvalidCapability)?,
            channel_mode: value_for(&APTX_CHANNEL_MODES, caps.channel_modes)
                .ok_or(A2dpError::InvalidCapability)?,
        })
    }

    fn capabilities(&self) -> Result<AptxCapabilities, A2dpError> {
        Ok(AptxCapabilities {
            sampling_frequencies: bit_for(&APTX_SAMPLE_RATES, self.sample_rate)
                .ok_or(A2dpError::InvalidCapability)?,
            channel_modes: bit_for(&APTX_CHANNEL_MODES, self.channel_mode)
                .ok_or(A2dpError::InvalidCapability)?,
        })
    }

    /// Encode as aptX SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a value has no aptX encoding
    pub fn to_aptx_bytes(&self) -> Result<[u8; AptxCapabilities::APTX_LEN], A2dpError> {
        Ok(self.capabilities()?.to_aptx_bytes())
    }

    /// Encode as aptX HD SET_CONFIGURATION payload
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidCapability`] if a value has no aptX encoding
    pub fn to_aptx_hd_bytes(&self) -> Result<[u8; AptxCapabilities::APTX_HD_LEN], A2dpError> {
        Ok(self.capabilities()?.to_aptx_hd_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_header_round_trip() {
        let ids = [
            VendorCodecId::new(0, 0),
            VendorCodecId::new(u32::MAX, u16::MAX),
            VendorCodecId::new(0x1234_5678, 0x9ABC),
            VendorCodecId::LDAC,
            VendorCodecId::APTX_HD,
        ];
        for id in ids {
            let mut buf = [0u8; 8];
            assert_eq!(id.write(&mut buf).unwrap(), VENDOR_HEADER_LEN);
            assert_eq!(VendorCodecId::read(&buf).unwrap(), id);
        }
        let vendor_ids = (0..32)
            .map(|shift| 1u32 << shift)
            .chain([0x0000_00FF, 0x0000_FF00, 0x00FF_0000, 0xFF00_0000, 0x0000_0100]);
        for vendor_id in vendor_ids {
            let codec_ids = (0..16)
                .map(|shift| 1u16 << shift)
                .chain([0, 0x00FF, 0xFF00, 0x0100, 0xFFFF]);
            for codec_id in codec_ids {
                let id = VendorCodecId::new(vendor_id, codec_id);
                assert_eq!(VendorCodecId::read(&id.to_bytes()).unwrap(), id);
            }
        }
    }

    #[test]
    fn test_vendor_header_bit_positions() {
        for shift in 0..32 {
            let bytes = VendorCodecId::new(1 << shift, 0).to_bytes();
            let mut expected = [0u8; VENDOR_HEADER_LEN];
            expected[shift / 8] = 1 << (shift % 8);
            assert_eq!(bytes, expected, "vendor id bit {shift}");
        }
        for shift in 0..16 {
            let bytes = VendorCodecId::new(0, 1 << shift).to_bytes();
            let mut expected = [0u8; VENDOR_HEADER_LEN];
            expected[4 + shift / 8] = 1 << (shift % 8);
            assert_eq!(bytes, expected, "codec id bit {shift}");
        }
    }

    #[test]
    fn test_vendor_header_layout() {
        assert_eq!(VendorCodecId::LDAC.to_bytes(), [0x2D, 0x01, 0x00, 0x00, 0xAA, 0x00]);
        assert_eq!(VendorCodecId::APTX.to_bytes(), [0x4F, 0x00, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(VendorCodecId::APTX_HD.to_bytes(), [0xD7, 0x00, 0x00, 0x00, 0x24, 0x00]);
    }

    #[test]
    fn test_vendor_header_short_buffers() {
        assert_eq!(
            VendorCodecId::read(&[0x2D, 0x01, 0x00, 0x00, 0xAA]),
            Err(A2dpError::InvalidCapability)
        );
        let mut short = [0u8; 5];
        assert_eq!(
            VendorCodecId::LDAC.write(&mut short),
            Err(A2dpError::BufferTooSmall)
        );
    }

    #[test]
    fn test_ldac_capabilities() {
        let info = [0x2D, 0x01, 0x00, 0x00, 0xAA, 0x00, 0x3C, 0x07];
        let caps = LdacCapabilities::parse(&info).unwrap();
        assert_eq!(caps.sampling_frequencies, 0x3C);
        assert_eq!(caps.channel_modes, 0x07);

        let aptx = [0x4F, 0x00, 0x00, 0x00, 0x01, 0x00, 0xFF];
        assert_eq!(LdacCapabilities::parse(&aptx), Err(A2dpError::UnsupportedCodec));
        assert_eq!(
            LdacCapabilities::parse(&info[..7]),
            Err(A2dpError::InvalidCapability)
        );
    }

    #[test]
    fn test_ldac_configuration_bytes() {
        let config = LdacConfiguration {
            sample_rate: 96_000,
            channel_mode: ChannelMode::Stereo,
        };
        let bytes = config.to_bytes().unwrap();
        assert_eq!(bytes, [0x2D, 0x01, 0x00, 0x00, 0xAA, 0x00, 0x04, 0x01, 0x00, 0x00]);
        assert_eq!(LdacConfiguration::parse(&bytes).unwrap(), config);
    }

    #[test]
    fn test_aptx_configuration_bytes() {
        let config = AptxConfiguration {
            sample_rate: 44_100,
            channel_mode: ChannelMode::Stereo,
        };
        assert_eq!(
            config.to_aptx_bytes().unwrap(),
            [0x4F, 0x00, 0x00, 0x00, 0x01, 0x00, 0x22]
        );
        assert_eq!(
            config.to_aptx_hd_bytes().unwrap(),
            [0xD7, 0x00, 0x00, 0x00, 0x24, 0x00, 0x22, 0, 0, 0, 0, 0x01]
        );
        let parsed =
            AptxConfiguration::parse(VendorCodecId::APTX_HD, &config.to_aptx_hd_bytes().unwrap())
                .unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_aptx_channel_nibble() {
        let info = [0x4F, 0x00, 0x00, 0x00, 0x01, 0x00, 0x18];
        let config = AptxConfiguration::parse(VendorCodecId::APTX, &info).unwrap();
        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.channel_mode.num_channels(), 1);
    }
}
