//! A2DP Source Constants
//!
//! This module contains the constants used throughout the crate: Bluetooth
//! assigned numbers for vendor codecs, buffer limits, and the streaming
//! timing defaults.

/// Maximum number of remote stream endpoints kept from one discovery
pub const MAX_REMOTE_SEPS: usize = 10;

/// Maximum number of local stream endpoints (one per codec family)
pub const MAX_LOCAL_SEPS: usize = 5;

/// Maximum length of a raw media codec information element kept per endpoint
pub const MAX_MEDIA_CODEC_INFO_LEN: usize = 32;

/// Maximum length of a media codec configuration element
pub const MAX_MEDIA_CODEC_CONFIG_LEN: usize = 16;

/// Size of the codec output storage shared by all encode adapters
pub const CODEC_STORAGE_SIZE: usize = 1030;

/// Media payload size used when the transport was not queried
pub const DEFAULT_MAX_MEDIA_PAYLOAD_SIZE: usize = 0x290;

/// Nominal sample clock period in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u32 = 5;

/// Sample clock period for SBC streams
pub const SBC_TICK_INTERVAL_MS: u32 = 10;

/// Sample clock period for LDAC streams
pub const LDAC_TICK_INTERVAL_MS: u32 = 3;

/// Sony Corporation vendor id
pub const VENDOR_ID_SONY: u32 = 0x0000_012D;

/// LDAC codec id (Sony)
pub const CODEC_ID_LDAC: u16 = 0x00AA;

/// APT Ltd. vendor id
pub const VENDOR_ID_APT: u32 = 0x0000_004F;

/// aptX codec id (APT Ltd.)
pub const CODEC_ID_APTX: u16 = 0x0001;

/// Qualcomm Technologies vendor id
pub const VENDOR_ID_QUALCOMM: u32 = 0x0000_00D7;

/// aptX HD codec id (Qualcomm)
pub const CODEC_ID_APTX_HD: u16 = 0x0024;

/// PCM samples per channel consumed by one LDAC encode unit
pub const LDAC_SAMPLES_PER_UNIT: usize = 128;

/// PCM samples per channel consumed by one aptX encode call
pub const APTX_SAMPLES_PER_QUANTUM: usize = 4;

/// Bytes produced by one aptX encode call (stereo)
pub const APTX_BYTES_PER_QUANTUM: usize = 4;

/// Bytes produced by one aptX HD encode call (stereo)
pub const APTX_HD_BYTES_PER_QUANTUM: usize = 6;

/// PCM samples per channel in one AAC access unit
pub const AAC_SAMPLES_PER_FRAME: usize = 1024;

/// Default AAC bitrate in bits per second
pub const DEFAULT_AAC_BITRATE: u32 = 300_000;

/// Default upper bound for the SBC bitpool
pub const DEFAULT_SBC_MAX_BITPOOL: u8 = 53;

/// Lowest SBC bitpool allowed by A2DP
pub const SBC_MIN_BITPOOL: u8 = 2;

/// Highest SBC bitpool allowed by A2DP
pub const SBC_MAX_BITPOOL: u8 = 250;

/// Depth of the processor input channel
pub const PROCESSOR_QUEUE_DEPTH: usize = 8;
