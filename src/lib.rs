#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

#[macro_use]
mod fmt;

pub mod a2dp;
mod address;
pub mod api;
pub mod constants;
pub mod processor;
mod source;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

use crate::a2dp::{CodecFamily, CodecPreferences, CodecSelector};
use crate::constants::{CODEC_STORAGE_SIZE, DEFAULT_MAX_MEDIA_PAYLOAD_SIZE, MAX_LOCAL_SEPS};
use heapless::Vec;

pub use a2dp::A2dpError;
pub use address::BluetoothAddress;
pub use source::A2dpSource;

/// Application commands accepted by [`A2dpSource::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SourceCommand {
    /// Open signaling to the configured remote
    Connect,
    /// Release signaling, closing any stream
    Disconnect,
    /// Start (or resume) the configured stream
    Start,
    /// Suspend the running stream
    Suspend,
    /// Abort the stream
    Abort,
    /// Close the stream
    Stop,
    /// Configure a specific codec family, bypassing the candidate order
    SelectCodec(CodecFamily),
    /// Close the stream and configure the next usable candidate
    NextCodec,
    /// Prefer the remote endpoint at the given registry index
    SelectRemote(usize),
    /// Toggle a suspended SBC or AAC stream between 44.1 and 48 kHz
    Reconfigure,
    /// Connect when idle, otherwise move on to the next codec
    ConnectOrNextCodec,
}

/// Configuration options for an [`A2dpSource`]
///
/// # Example
/// ```rust
/// use a2dp_source::A2dpSourceOptions;
/// use a2dp_source::a2dp::CodecFamily;
///
/// let options = A2dpSourceOptions {
///     remote_addr: "00:1B:DC:07:32:EF".parse().unwrap(),
///     candidates: heapless::Vec::from_slice(&[CodecFamily::Aac, CodecFamily::Sbc]).unwrap(),
///     ..A2dpSourceOptions::default()
/// };
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A2dpSourceOptions {
    /// Address of the remote sink
    pub remote_addr: BluetoothAddress,
    /// Codec families to try, best first
    ///
    /// Defaults to LDAC, aptX HD, aptX, AAC, SBC.
    pub candidates: Vec<CodecFamily, MAX_LOCAL_SEPS>,
    /// Largest media payload handed to the transport in one send
    ///
    /// Replaced by the value the transport reports once the media channel
    /// is up. Must be below the codec storage size.
    pub max_media_payload_size: usize,
    /// Parameter values preferred when the remote offers several
    pub preferences: CodecPreferences,
}

impl A2dpSourceOptions {
    /// Check the options for consistency
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidParameter`] if the payload size is zero or
    /// does not fit codec storage, or the candidate list is empty or repeats
    /// a family
    pub fn validate(&self) -> Result<(), A2dpError> {
        if self.max_media_payload_size == 0 || self.max_media_payload_size >= CODEC_STORAGE_SIZE {
            return Err(A2dpError::InvalidParameter);
        }
        CodecSelector::new(&self.candidates).map(|_| ())
    }
}

impl Default for A2dpSourceOptions {
    fn default() -> Self {
        let mut candidates = Vec::new();
        for family in CodecFamily::PREFERENCE {
            // capacity equals the preference list length
            let _ = candidates.push(family);
        }
        Self {
            remote_addr: BluetoothAddress::default(),
            candidates,
            max_media_payload_size: DEFAULT_MAX_MEDIA_PAYLOAD_SIZE,
            preferences: CodecPreferences::default(),
        }
    }
}
