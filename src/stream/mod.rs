//! Media data path
//!
//! Everything that happens once a stream is started: the sample clock turns
//! timer ticks into due PCM samples, the codec adapter encodes them into the
//! sending context, and the scheduler hands full payloads to the transport
//! when it grants a send opportunity.
//!
//! ```text
//! tick ─▶ SampleClock ─▶ samples_ready ─▶ EncodeAdapter ─▶ codec_storage
//!                                                              │ full
//!                                                              ▼
//!              send_media_payload ◀─ CanSendMediaNow ◀─ request_can_send_now
//! ```

pub mod aac;
pub mod adapter;
pub mod aptx;
pub mod clock;
pub mod context;
pub mod encoder;
pub mod ldac;
pub mod sbc;
pub mod scheduler;

pub use aac::AacAdapter;
pub use adapter::{EncodeAdapter, PayloadLayout, StreamAdapter};
pub use aptx::AptxAdapter;
pub use clock::SampleClock;
pub use context::MediaSendingContext;
pub use encoder::{
    EncodeOutcome, EncoderError, LoopSource, MediaEncoder, Pcm, PcmSource, SineSource,
    widen_to_s24le,
};
pub use ldac::LdacAdapter;
pub use sbc::SbcAdapter;
pub use scheduler::StreamSession;
