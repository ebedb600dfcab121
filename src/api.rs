//! Source API
//!
//! [`SourceApi`] is the handle application code and transport glue use to
//! reach the [worker](crate::processor). Commands and events are queued on
//! the worker's channel; the call returns once the input is queued, and the
//! worker logs the outcome. Ticks go through the worker's signal and never
//! block.
//!
//! # Usage
//!
//! ```rust,no_run
//! use a2dp_source::api::SourceApi;
//! use a2dp_source::a2dp::CodecFamily;
//! use a2dp_source::processor::{SourceChannel, TickSignal};
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
//!
//! static INPUTS: SourceChannel<CriticalSectionRawMutex> = SourceChannel::new();
//! static TICKS: TickSignal<CriticalSectionRawMutex> = TickSignal::new();
//!
//! # async fn example() {
//! let api = SourceApi::new(&INPUTS, &TICKS);
//! api.connect().await;
//! // later: switch the running stream to AAC
//! api.select_codec(CodecFamily::Aac).await;
//! # }
//! ```

use crate::SourceCommand;
use crate::a2dp::{AvdtpEvent, CodecFamily};
use crate::processor::SourceInput;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Sender, TrySendError};
use embassy_sync::signal::Signal;

/// Handle queuing inputs for the source worker
pub struct SourceApi<'a, M: RawMutex, const N: usize> {
    sender: Sender<'a, M, SourceInput, N>,
    ticks: &'a Signal<M, u32>,
}

impl<M: RawMutex, const N: usize> Clone for SourceApi<'_, M, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, const N: usize> Copy for SourceApi<'_, M, N> {}

impl<'a, M: RawMutex, const N: usize> SourceApi<'a, M, N> {
    /// Create a handle on the worker's channel and tick signal
    #[must_use]
    pub fn new(inputs: &'a Channel<M, SourceInput, N>, ticks: &'a Signal<M, u32>) -> Self {
        Self {
            sender: inputs.sender(),
            ticks,
        }
    }

    /// Queue a command
    pub async fn command(&self, command: SourceCommand) {
        self.sender.send(SourceInput::Command(command)).await;
    }

    /// Connect to the configured remote
    pub async fn connect(&self) {
        self.command(SourceCommand::Connect).await;
    }

    /// Disconnect from the remote
    pub async fn disconnect(&self) {
        self.command(SourceCommand::Disconnect).await;
    }

    /// Start or resume the stream
    pub async fn start_stream(&self) {
        self.command(SourceCommand::Start).await;
    }

    /// Suspend the stream
    pub async fn suspend_stream(&self) {
        self.command(SourceCommand::Suspend).await;
    }

    /// Abort the stream
    pub async fn abort_stream(&self) {
        self.command(SourceCommand::Abort).await;
    }

    /// Close the stream
    pub async fn stop_stream(&self) {
        self.command(SourceCommand::Stop).await;
    }

    /// Configure `family` on the remote, closing the running stream first
    pub async fn select_codec(&self, family: CodecFamily) {
        self.command(SourceCommand::SelectCodec(family)).await;
    }

    /// Move on to the next usable codec
    pub async fn next_codec(&self) {
        self.command(SourceCommand::NextCodec).await;
    }

    /// Prefer the remote endpoint at `index`
    pub async fn select_remote(&self, index: usize) {
        self.command(SourceCommand::SelectRemote(index)).await;
    }

    /// Toggle the sampling frequency of a suspended SBC or AAC stream
    pub async fn reconfigure(&self) {
        self.command(SourceCommand::Reconfigure).await;
    }

    /// Connect when idle, otherwise switch to the next codec
    pub async fn connect_or_next_codec(&self) {
        self.command(SourceCommand::ConnectOrNextCodec).await;
    }

    /// Queue a transport event, waiting for room
    pub async fn post_event(&self, event: AvdtpEvent) {
        self.sender.send(SourceInput::Event(event)).await;
    }

    /// Queue a transport event from a context that cannot wait
    ///
    /// # Errors
    /// Hands the event back if the queue is full
    pub fn try_post_event(&self, event: AvdtpEvent) -> Result<(), AvdtpEvent> {
        match self.sender.try_send(SourceInput::Event(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(SourceInput::Event(event))) => {
                warn!("[PROCESSOR] input queue full, event refused");
                Err(event)
            }
            // only events are sent here
            Err(TrySendError::Full(SourceInput::Command(_))) => Ok(()),
        }
    }

    /// Signal a sample clock tick at `now_ms`
    pub fn tick(&self, now_ms: u32) {
        self.ticks.signal(now_ms);
    }
}
