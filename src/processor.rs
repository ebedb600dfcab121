//! Source worker - AVDTP events, application commands and timer ticks
//!
//! One persistent task owns the [`A2dpSource`] and serializes everything
//! that touches it: transport events and application commands arrive on a
//! [`SourceChannel`], sample clock ticks on a [`TickSignal`]. Queued inputs
//! are served before a pending tick.
//!
//! # Usage
//!
//! ```rust,no_run
//! use a2dp_source::processor::{SourceChannel, TickSignal};
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//!
//! static INPUTS: SourceChannel<CriticalSectionRawMutex> = SourceChannel::new();
//! static TICKS: TickSignal<CriticalSectionRawMutex> = TickSignal::new();
//!
//! // In your Embassy task:
//! // processor::run(source, &INPUTS, &TICKS).await;
//! ```
//!
//! The transport glue posts [`SourceInput::Event`]s, the application sends
//! commands through [`SourceApi`](crate::api::SourceApi), and a timer calls
//! [`SourceApi::tick`](crate::api::SourceApi::tick) every
//! [`A2dpSource::tick_interval_ms`] while the source is streaming.

use crate::a2dp::{AvdtpEvent, AvdtpTransport};
use crate::constants::PROCESSOR_QUEUE_DEPTH;
use crate::stream::{MediaEncoder, PcmSource};
use crate::{A2dpError, A2dpSource, SourceCommand};
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;

/// Input served by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceInput {
    /// Event delivered by the AVDTP transport
    Event(AvdtpEvent),
    /// Application command
    Command(SourceCommand),
}

/// Queue of events and commands feeding the worker
pub type SourceChannel<M> = Channel<M, SourceInput, PROCESSOR_QUEUE_DEPTH>;

/// Latest tick time in milliseconds; newer ticks overwrite unserved ones
pub type TickSignal<M> = Signal<M, u32>;

/// Serve the next input or tick
///
/// # Errors
/// Returns the error of the event, command or tick served
pub async fn process_one<M, T, E, P, const N: usize>(
    source: &mut A2dpSource<T, E, P>,
    inputs: &Channel<M, SourceInput, N>,
    ticks: &Signal<M, u32>,
) -> Result<(), A2dpError>
where
    M: RawMutex,
    T: AvdtpTransport,
    E: MediaEncoder,
    P: PcmSource,
{
    match select(inputs.receive(), ticks.wait()).await {
        Either::First(SourceInput::Event(event)) => {
            trace!("[PROCESSOR] event");
            source.handle_event(&event)
        }
        Either::First(SourceInput::Command(command)) => source.execute(command),
        Either::Second(now_ms) => source.tick(now_ms).map(|_| ()),
    }
}

/// Run the worker forever
pub async fn run<M, T, E, P, const N: usize>(
    mut source: A2dpSource<T, E, P>,
    inputs: &Channel<M, SourceInput, N>,
    ticks: &Signal<M, u32>,
) -> !
where
    M: RawMutex,
    T: AvdtpTransport,
    E: MediaEncoder,
    P: PcmSource,
{
    info!("[PROCESSOR] source worker started");
    loop {
        if let Err(err) = process_one(&mut source, inputs, ticks).await {
            warn!("[PROCESSOR] {}", err);
        }
    }
}
