//! Negotiation state machine
//!
//! [`Negotiator`] reacts to AVDTP events and drives the remote through
//! discovery, capability queries, codec selection, configuration, open and
//! start. It never polls: every transition is caused either by an event or
//! by an explicit command, and every outbound request goes through the
//! [`AvdtpTransport`] passed in with it.
//!
//! A rejected configuration moves on to the next untried candidate of the
//! current pass. Once every candidate was tried the pass ends with
//! [`A2dpError::NoCompatibleCodec`] and the machine waits in
//! [`NegotiationState::SignalingUp`] for the next command.

use super::avdtp::{AvdtpEvent, AvdtpTransport, STATUS_SUCCESS, SignalId, TransportError};
use super::codec::{CodecFamily, CodecParameters};
use super::profile::A2dpProfile;
use super::registry::CapabilityRegistry;
use super::selection::{CodecPreferences, CodecSelection, CodecSelector, configure_codec};
use super::{A2dpError, Role, SignalingChannelId, StreamEndpointId};
use crate::BluetoothAddress;
use crate::constants::CODEC_STORAGE_SIZE;
use crate::stream::MediaEncoder;

/// Negotiation progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NegotiationState {
    /// No signaling channel
    Idle,
    /// Signaling channel up, no stream configured
    SignalingUp,
    /// DISCOVER in flight
    Discovering,
    /// Capabilities of the endpoint at this registry index requested
    QueryingCapabilities(usize),
    /// Picking the codec to configure
    SelectingCodec,
    /// SET_CONFIGURATION in flight
    Configuring,
    /// Configuration accepted, stream being opened and started
    Opening,
    /// Media is flowing
    Streaming,
    /// Stream suspended by either side
    Suspended,
    /// Stream being closed or aborted
    Closing,
}

/// What the data path must do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamDirective {
    /// Build the stream session and arm the sample clock
    Start,
    /// Disarm the clock and drop buffered audio
    Suspend,
    /// Disarm the clock and discard the session
    Release,
}

/// Selection to run once the open stream is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FollowUp {
    Next,
    Select(CodecFamily),
}

/// Configuration awaiting the remote's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingConfiguration {
    selection: CodecSelection,
    candidate: Option<usize>,
    forced: bool,
}

/// AVDTP negotiation for one remote sink
#[derive(Debug)]
pub struct Negotiator {
    state: NegotiationState,
    cid: Option<SignalingChannelId>,
    registry: CapabilityRegistry,
    profile: A2dpProfile,
    selector: CodecSelector,
    preferences: CodecPreferences,
    selection: Option<CodecSelection>,
    pending: Option<PendingConfiguration>,
    pending_reconfigure: Option<CodecParameters>,
    follow_up: Option<FollowUp>,
    default_payload_size: usize,
    max_media_payload_size: usize,
    is_connected: bool,
}

impl Negotiator {
    /// Create a negotiator over `profile`, trying `candidates` in order
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidParameter`] for a bad candidate list or a
    /// payload size that does not fit codec storage
    pub fn new(
        profile: A2dpProfile,
        candidates: &[CodecFamily],
        preferences: CodecPreferences,
        max_media_payload_size: usize,
    ) -> Result<Self, A2dpError> {
        if max_media_payload_size == 0 || max_media_payload_size >= CODEC_STORAGE_SIZE {
            return Err(A2dpError::InvalidParameter);
        }
        Ok(Self {
            state: NegotiationState::Idle,
            cid: None,
            registry: CapabilityRegistry::new(),
            profile,
            selector: CodecSelector::new(candidates)?,
            preferences,
            selection: None,
            pending: None,
            pending_reconfigure: None,
            follow_up: None,
            default_payload_size: max_media_payload_size,
            max_media_payload_size,
            is_connected: false,
        })
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> NegotiationState {
        self.state
    }

    /// Signaling channel, while connected
    #[must_use]
    pub const fn cid(&self) -> Option<SignalingChannelId> {
        self.cid
    }

    /// Discovered remote endpoints
    #[must_use]
    pub const fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Local endpoints
    #[must_use]
    pub const fn profile(&self) -> &A2dpProfile {
        &self.profile
    }

    /// Candidate walk
    #[must_use]
    pub const fn selector(&self) -> &CodecSelector {
        &self.selector
    }

    /// The accepted codec configuration
    #[must_use]
    pub const fn selection(&self) -> Option<&CodecSelection> {
        self.selection.as_ref()
    }

    /// Payload budget of the current stream
    #[must_use]
    pub const fn max_media_payload_size(&self) -> usize {
        self.max_media_payload_size
    }

    /// Whether a media transport channel is up
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.is_connected
    }

    /// Feed one AVDTP event
    ///
    /// [`AvdtpEvent::CanSendMediaNow`] belongs to the data path and is
    /// ignored here.
    ///
    /// # Errors
    /// Returns [`A2dpError::Transport`] if a follow-up request fails,
    /// [`A2dpError::NoCompatibleCodec`] when a selection pass runs out of
    /// candidates, and [`A2dpError::ConfigurationFailed`] when a manually
    /// selected codec is rejected
    pub fn handle_event<T, E>(
        &mut self,
        event: &AvdtpEvent,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<Option<StreamDirective>, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        match *event {
            AvdtpEvent::SignalingConnectionEstablished { status, cid } => {
                if status != STATUS_SUCCESS {
                    warn!("[AVDTP] signaling connection failed, status {}", status);
                    self.set_state(NegotiationState::Idle);
                    return Ok(None);
                }
                info!("[AVDTP] signaling connection established, cid {}", cid);
                self.cid = Some(cid);
                self.set_state(NegotiationState::SignalingUp);
                self.discover(transport)?;
                Ok(None)
            }
            AvdtpEvent::SepFound {
                seid,
                in_use,
                media_type,
                role,
            } => {
                if role != Role::Sink {
                    debug!("[AVDTP] ignoring source endpoint {}", seid);
                    return Ok(None);
                }
                debug!("[AVDTP] sink endpoint {} found, in use {}", seid, in_use);
                if let Err(err) = self.registry.add_sink(seid, in_use, media_type) {
                    warn!("[AVDTP] dropping endpoint {}: {}", seid, err);
                    return Err(err);
                }
                Ok(None)
            }
            AvdtpEvent::DiscoveryDone => {
                if self.state != NegotiationState::Discovering {
                    return Ok(None);
                }
                match self.registry.len() {
                    0 => {
                        warn!("[AVDTP] remote exposes no sink endpoint");
                        self.set_state(NegotiationState::SignalingUp);
                        return Ok(None);
                    }
                    1 => self.registry.select(0)?,
                    _ => {}
                }
                self.query_capabilities(0, transport)?;
                Ok(None)
            }
            AvdtpEvent::CapabilityReceived {
                seid,
                codec_type,
                ref info,
            } => {
                let recorded = self.registry.record_capability(seid, codec_type, info);
                assert!(recorded.is_ok(), "capability for an undiscovered endpoint");
                debug!("[AVDTP] endpoint {} offers codec type {}", seid, codec_type);
                Ok(None)
            }
            AvdtpEvent::ServiceCapabilityReceived { seid, category } => {
                debug!("[AVDTP] endpoint {} service category {}", seid, category);
                Ok(None)
            }
            AvdtpEvent::CapabilitiesDone => {
                let NegotiationState::QueryingCapabilities(index) = self.state else {
                    return Ok(None);
                };
                let next = index + 1;
                if next < self.registry.len() {
                    self.query_capabilities(next, transport)?;
                    return Ok(None);
                }
                self.start_selection(transport, encoder)
            }
            AvdtpEvent::Accept { signal } => self.on_accept(signal, transport, encoder),
            AvdtpEvent::Reject { signal } | AvdtpEvent::GeneralReject { signal } => {
                warn!("[AVDTP] remote rejected {}", signal);
                self.on_reject(signal, transport, encoder)
            }
            AvdtpEvent::StreamingConnectionEstablished {
                status,
                local_seid,
                remote_seid,
                max_media_payload_size,
            } => {
                if status != STATUS_SUCCESS {
                    warn!("[AVDTP] streaming connection failed, status {}", status);
                    self.set_state(NegotiationState::SignalingUp);
                    return Ok(None);
                }
                self.is_connected = true;
                self.max_media_payload_size = max_media_payload_size
                    .map(usize::from)
                    .filter(|&size| size > 0)
                    .map_or(self.default_payload_size, |size| {
                        size.min(CODEC_STORAGE_SIZE - 1)
                    });
                info!(
                    "[AVDTP] streaming connection {} -> {} up, payload {}",
                    local_seid,
                    remote_seid,
                    self.max_media_payload_size
                );
                let cid = self.require_cid()?;
                request(transport.start_stream(cid, local_seid), "start")?;
                Ok(None)
            }
            AvdtpEvent::StreamingConnectionReleased => {
                info!("[AVDTP] streaming connection released");
                self.is_connected = false;
                if self.state == NegotiationState::Idle {
                    return Ok(Some(StreamDirective::Release));
                }
                self.set_state(NegotiationState::Closing);
                self.set_state(NegotiationState::SignalingUp);
                if let Some(follow_up) = self.follow_up.take() {
                    if let Err(err) = self.run_follow_up(follow_up, transport, encoder) {
                        warn!("[AVDTP] codec change failed: {}", err);
                    }
                }
                Ok(Some(StreamDirective::Release))
            }
            AvdtpEvent::SignalingConnectionReleased => {
                info!("[AVDTP] signaling connection released");
                self.cid = None;
                self.is_connected = false;
                self.registry.clear();
                self.selector.reset();
                self.selection = None;
                self.pending = None;
                self.pending_reconfigure = None;
                self.follow_up = None;
                self.max_media_payload_size = self.default_payload_size;
                self.set_state(NegotiationState::Idle);
                Ok(Some(StreamDirective::Release))
            }
            AvdtpEvent::DelayReport {
                delay_100us,
                local_seid,
            } => {
                info!(
                    "[AVDTP] endpoint {} delay {}.{} ms",
                    local_seid,
                    delay_100us / 10,
                    delay_100us % 10
                );
                Ok(None)
            }
            AvdtpEvent::CanSendMediaNow => Ok(None),
        }
    }

    /// Open a signaling channel to `addr`
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] unless idle, or the transport error
    pub fn connect<T>(&mut self, addr: BluetoothAddress, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        if self.state != NegotiationState::Idle {
            return Err(A2dpError::InvalidState);
        }
        info!("[AVDTP] connecting");
        request(transport.connect(addr), "connect")
    }

    /// Release the signaling channel
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] without a signaling channel, or the transport error
    pub fn disconnect<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        let cid = self.require_cid()?;
        self.follow_up = None;
        request(transport.disconnect(cid), "disconnect")
    }

    /// Start (or resume) the opened stream
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] unless the stream is open and not
    /// streaming, or the transport error
    pub fn start<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        match self.state {
            NegotiationState::Suspended => {}
            NegotiationState::Opening if self.is_connected => {}
            _ => return Err(A2dpError::InvalidState),
        }
        let (cid, local_seid) = self.stream_ids()?;
        request(transport.start_stream(cid, local_seid), "start")
    }

    /// Suspend the running stream
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] unless streaming, or the transport error
    pub fn suspend<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        if self.state != NegotiationState::Streaming {
            return Err(A2dpError::InvalidState);
        }
        let (cid, local_seid) = self.stream_ids()?;
        request(transport.suspend_stream(cid, local_seid), "suspend")
    }

    /// Abort the configured stream
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] without a configured stream, or the transport error
    pub fn abort<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        let local_seid = match self.state {
            NegotiationState::Configuring => self
                .pending
                .map(|pending| pending.selection.local_seid)
                .ok_or(A2dpError::InvalidState)?,
            NegotiationState::Opening
            | NegotiationState::Streaming
            | NegotiationState::Suspended => self.stream_ids()?.1,
            _ => return Err(A2dpError::InvalidState),
        };
        let cid = self.require_cid()?;
        request(transport.abort_stream(cid, local_seid), "abort")
    }

    /// Close the opened stream
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] without an open stream, or the transport error
    pub fn stop<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        if !self.stream_open() {
            return Err(A2dpError::InvalidState);
        }
        let (cid, local_seid) = self.stream_ids()?;
        request(transport.stop_stream(cid, local_seid), "stop")
    }

    /// Configure `family` on the first remote endpoint offering it
    ///
    /// An open stream is closed first and the configuration follows its
    /// release.
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] while negotiation is in progress,
    /// or the reason `family` cannot be configured
    pub fn select_codec<T, E>(
        &mut self,
        family: CodecFamily,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        if self.stream_open() {
            self.stop(transport)?;
            self.follow_up = Some(FollowUp::Select(family));
            return Ok(());
        }
        if !self.is_settled() {
            return Err(A2dpError::InvalidState);
        }
        self.configure_forced(family, transport, encoder)
    }

    /// Move on to the next candidate after the current codec
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] while negotiation is in progress,
    /// or the outcome of the selection pass
    pub fn next_codec<T, E>(&mut self, transport: &mut T, encoder: &mut E) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        if self.stream_open() {
            self.stop(transport)?;
            self.follow_up = Some(FollowUp::Next);
            return Ok(());
        }
        if !self.is_settled() {
            return Err(A2dpError::InvalidState);
        }
        self.selector.advance();
        self.start_selection(transport, encoder).map(|_| ())
    }

    /// Prefer the remote endpoint at `index` for future configurations
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidEndpoint`] if `index` is out of range
    pub fn select_remote(&mut self, index: usize) -> Result<(), A2dpError> {
        self.registry.select(index)?;
        info!("[AVDTP] remote endpoint {} selected", index);
        Ok(())
    }

    /// Switch a suspended SBC or AAC stream between 44.1 and 48 kHz
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] unless suspended,
    /// [`A2dpError::UnsupportedCodec`] for other codecs,
    /// [`A2dpError::InvalidCapability`] if the remote lacks the other rate,
    /// or the transport error
    pub fn reconfigure<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        if self.state != NegotiationState::Suspended {
            return Err(A2dpError::InvalidState);
        }
        let selection = self.selection.ok_or(A2dpError::InvalidState)?;
        let family = selection.family();
        if !matches!(family, CodecFamily::Sbc | CodecFamily::Aac) {
            return Err(A2dpError::UnsupportedCodec);
        }
        let sample_rate = if selection.sample_rate() == 44_100 {
            48_000
        } else {
            44_100
        };
        let local = self
            .profile
            .endpoint(selection.local_seid)
            .ok_or(A2dpError::InvalidEndpoint)?;
        let remote = self
            .registry
            .get(selection.remote_index)
            .ok_or(A2dpError::InvalidEndpoint)?;
        let preferences = CodecPreferences {
            sample_rate,
            ..self.preferences
        };
        let parameters = configure_codec(
            family,
            &local.capabilities,
            &remote.media_codec_info,
            &preferences,
        )?;
        if parameters.sample_rate() != sample_rate {
            warn!("[CODEC] remote does not support {} Hz", sample_rate);
            return Err(A2dpError::InvalidCapability);
        }
        let config = parameters.to_config_bytes()?;
        let cid = self.require_cid()?;
        request(
            transport.reconfigure(
                cid,
                selection.local_seid,
                selection.remote_seid,
                selection.media_codec_type(),
                &config,
            ),
            "reconfigure",
        )?;
        self.pending_reconfigure = Some(parameters);
        Ok(())
    }

    fn on_accept<T, E>(
        &mut self,
        signal: SignalId,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<Option<StreamDirective>, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        match signal {
            SignalId::SetConfiguration => {
                let Some(pending) = self.pending.take() else {
                    debug!("[AVDTP] unexpected configuration accept");
                    return Ok(None);
                };
                let selection = pending.selection;
                self.profile
                    .set_configuration(selection.local_seid, &selection.config_bytes()?)?;
                if let Some(index) = pending.candidate {
                    self.selector.confirm(index);
                }
                self.selection = Some(selection);
                info!(
                    "[CODEC] {} configured at {} Hz",
                    selection.family(),
                    selection.sample_rate()
                );
                let cid = self.require_cid()?;
                request(transport.open_stream(cid, selection.local_seid), "open")?;
                self.set_state(NegotiationState::Opening);
                Ok(None)
            }
            SignalId::Start => match self.state {
                NegotiationState::Opening | NegotiationState::Suspended => {
                    info!("[AVDTP] stream started");
                    self.set_state(NegotiationState::Streaming);
                    Ok(Some(StreamDirective::Start))
                }
                _ => Ok(None),
            },
            SignalId::Suspend => {
                if self.state != NegotiationState::Streaming {
                    return Ok(None);
                }
                info!("[AVDTP] stream suspended");
                self.set_state(NegotiationState::Suspended);
                Ok(Some(StreamDirective::Suspend))
            }
            SignalId::Close | SignalId::Abort => {
                info!("[AVDTP] stream closing");
                self.set_state(NegotiationState::Closing);
                Ok(Some(StreamDirective::Release))
            }
            SignalId::Reconfigure => {
                let Some(parameters) = self.pending_reconfigure.take() else {
                    return Ok(None);
                };
                let mut selection = self.selection.ok_or(A2dpError::InvalidState)?;
                selection.parameters = parameters;
                encoder.configure(&selection)?;
                self.profile
                    .set_configuration(selection.local_seid, &selection.config_bytes()?)?;
                self.preferences.sample_rate = selection.sample_rate();
                self.selection = Some(selection);
                info!(
                    "[CODEC] {} reconfigured to {} Hz",
                    selection.family(),
                    selection.sample_rate()
                );
                Ok(None)
            }
            _ => {
                debug!("[AVDTP] {} accepted", signal);
                Ok(None)
            }
        }
    }

    fn on_reject<T, E>(
        &mut self,
        signal: SignalId,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<Option<StreamDirective>, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        match signal {
            SignalId::SetConfiguration => {
                let Some(pending) = self.pending.take() else {
                    return Ok(None);
                };
                if pending.forced {
                    self.set_state(NegotiationState::SignalingUp);
                    return Err(A2dpError::ConfigurationFailed);
                }
                self.try_next_candidate(transport, encoder)?;
                Ok(None)
            }
            SignalId::Reconfigure => {
                self.pending_reconfigure = None;
                Ok(None)
            }
            SignalId::Discover | SignalId::GetAllCapabilities | SignalId::GetCapabilities => {
                self.set_state(NegotiationState::SignalingUp);
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    fn discover<T>(&mut self, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        let cid = self.require_cid()?;
        self.registry.clear();
        request(transport.discover_stream_endpoints(cid), "discover")?;
        self.set_state(NegotiationState::Discovering);
        Ok(())
    }

    fn query_capabilities<T>(&mut self, index: usize, transport: &mut T) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
    {
        let cid = self.require_cid()?;
        let seid = self
            .registry
            .get(index)
            .map(|ep| ep.seid)
            .ok_or(A2dpError::InvalidEndpoint)?;
        request(
            transport.get_all_capabilities(cid, seid),
            "get all capabilities",
        )?;
        self.set_state(NegotiationState::QueryingCapabilities(index));
        Ok(())
    }

    fn start_selection<T, E>(
        &mut self,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<Option<StreamDirective>, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        self.set_state(NegotiationState::SelectingCodec);
        self.selector.begin_pass();
        self.try_next_candidate(transport, encoder)?;
        Ok(None)
    }

    fn try_next_candidate<T, E>(&mut self, transport: &mut T, encoder: &mut E) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        while let Some(index) = self.selector.next_untried() {
            self.selector.mark_tried(index);
            let family = self.selector.candidate(index).ok_or(A2dpError::InvalidState)?;
            match self.attempt(family, transport, encoder) {
                Ok(selection) => {
                    self.pending = Some(PendingConfiguration {
                        selection,
                        candidate: Some(index),
                        forced: false,
                    });
                    return Ok(());
                }
                Err(err @ A2dpError::Transport(_)) => {
                    self.set_state(NegotiationState::SignalingUp);
                    return Err(err);
                }
                Err(err) => debug!("[CODEC] skipping {}: {}", family, err),
            }
        }
        warn!("[CODEC] no candidate codec could be configured");
        self.set_state(NegotiationState::SignalingUp);
        Err(A2dpError::NoCompatibleCodec)
    }

    fn configure_forced<T, E>(
        &mut self,
        family: CodecFamily,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        self.set_state(NegotiationState::SelectingCodec);
        match self.attempt(family, transport, encoder) {
            Ok(selection) => {
                let candidate = self.selector.candidates().iter().position(|&f| f == family);
                self.pending = Some(PendingConfiguration {
                    selection,
                    candidate,
                    forced: true,
                });
                Ok(())
            }
            Err(err) => {
                warn!("[CODEC] cannot configure {}: {}", family, err);
                self.set_state(NegotiationState::SignalingUp);
                Err(err)
            }
        }
    }

    /// Derive a configuration for `family` and send SET_CONFIGURATION
    fn attempt<T, E>(
        &mut self,
        family: CodecFamily,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<CodecSelection, A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        let remote_index = self
            .registry
            .find_family(family)
            .ok_or(A2dpError::UnsupportedCodec)?;
        let remote = self
            .registry
            .get(remote_index)
            .ok_or(A2dpError::InvalidEndpoint)?;
        let local = self
            .profile
            .endpoint_for(family)
            .ok_or(A2dpError::UnsupportedCodec)?;
        if !encoder.supports(family) {
            return Err(A2dpError::UnsupportedCodec);
        }
        let parameters = configure_codec(
            family,
            &local.capabilities,
            &remote.media_codec_info,
            &self.preferences,
        )?;
        let selection = CodecSelection {
            local_seid: local.seid,
            remote_seid: remote.seid,
            remote_index,
            parameters,
        };
        encoder.configure(&selection)?;
        let config = selection.config_bytes()?;
        let cid = self.require_cid()?;
        request(
            transport.set_configuration(
                cid,
                selection.local_seid,
                selection.remote_seid,
                selection.media_codec_type(),
                &config,
            ),
            "set configuration",
        )?;
        debug!(
            "[CODEC] offering {} to endpoint {}",
            family, selection.remote_seid
        );
        self.set_state(NegotiationState::Configuring);
        Ok(selection)
    }

    fn run_follow_up<T, E>(
        &mut self,
        follow_up: FollowUp,
        transport: &mut T,
        encoder: &mut E,
    ) -> Result<(), A2dpError>
    where
        T: AvdtpTransport + ?Sized,
        E: MediaEncoder + ?Sized,
    {
        match follow_up {
            FollowUp::Next => {
                self.selector.advance();
                self.start_selection(transport, encoder).map(|_| ())
            }
            FollowUp::Select(family) => self.configure_forced(family, transport, encoder),
        }
    }

    fn stream_open(&self) -> bool {
        self.is_connected
            && matches!(
                self.state,
                NegotiationState::Opening
                    | NegotiationState::Streaming
                    | NegotiationState::Suspended
            )
    }

    fn is_settled(&self) -> bool {
        matches!(
            self.state,
            NegotiationState::SignalingUp | NegotiationState::Closing
        )
    }

    fn require_cid(&self) -> Result<SignalingChannelId, A2dpError> {
        self.cid.ok_or(A2dpError::InvalidState)
    }

    fn stream_ids(&self) -> Result<(SignalingChannelId, StreamEndpointId), A2dpError> {
        let selection = self.selection.ok_or(A2dpError::InvalidState)?;
        Ok((self.require_cid()?, selection.local_seid))
    }

    fn set_state(&mut self, state: NegotiationState) {
        if self.state != state {
            debug!("[AVDTP] {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

/// Map a failed transport request, logging which one
fn request(result: Result<(), TransportError>, what: &'static str) -> Result<(), A2dpError> {
    result.map_err(|err| {
        warn!("[AVDTP] {} request failed, status {}", what, err.0);
        A2dpError::from(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2dp::{MediaCodecInfo, MediaCodecType, MediaType, StreamEndpointId};
    use crate::constants::DEFAULT_MAX_MEDIA_PAYLOAD_SIZE;
    use crate::testing::{FakeEncoder, MockTransport, Request};

    const CID: SignalingChannelId = 0x41;
    const SBC_CAPS: [u8; 4] = [0xFF, 0xFF, 2, 53];
    const LDAC_CAPS: [u8; 10] = [0x2D, 0x01, 0x00, 0x00, 0xAA, 0x00, 0x3C, 0x07, 0, 0];

    struct Sink {
        seid: StreamEndpointId,
        codec_type: MediaCodecType,
        info: &'static [u8],
    }

    const SBC_SINK: Sink = Sink {
        seid: 1,
        codec_type: MediaCodecType::Sbc,
        info: &SBC_CAPS,
    };
    const LDAC_SINK: Sink = Sink {
        seid: 2,
        codec_type: MediaCodecType::NonA2dp,
        info: &LDAC_CAPS,
    };

    fn negotiator(candidates: &[CodecFamily]) -> Negotiator {
        Negotiator::new(
            A2dpProfile::with_default_endpoints().unwrap(),
            candidates,
            CodecPreferences::default(),
            DEFAULT_MAX_MEDIA_PAYLOAD_SIZE,
        )
        .unwrap()
    }

    fn feed(
        n: &mut Negotiator,
        t: &mut MockTransport,
        e: &mut FakeEncoder,
        event: AvdtpEvent,
    ) -> Result<Option<StreamDirective>, A2dpError> {
        n.handle_event(&event, t, e)
    }

    /// Connect, discover `sinks` plus one source endpoint, report capabilities
    fn discover(
        n: &mut Negotiator,
        t: &mut MockTransport,
        e: &mut FakeEncoder,
        sinks: &[Sink],
    ) -> Result<Option<StreamDirective>, A2dpError> {
        feed(n, t, e, AvdtpEvent::SignalingConnectionEstablished { status: 0, cid: CID }).unwrap();
        feed(
            n,
            t,
            e,
            AvdtpEvent::SepFound {
                seid: 9,
                in_use: false,
                media_type: MediaType::Audio,
                role: Role::Source,
            },
        )
        .unwrap();
        for sink in sinks {
            feed(
                n,
                t,
                e,
                AvdtpEvent::SepFound {
                    seid: sink.seid,
                    in_use: false,
                    media_type: MediaType::Audio,
                    role: Role::Sink,
                },
            )
            .unwrap();
        }
        feed(n, t, e, AvdtpEvent::DiscoveryDone).unwrap();
        let mut last = Ok(None);
        for sink in sinks {
            feed(
                n,
                t,
                e,
                AvdtpEvent::CapabilityReceived {
                    seid: sink.seid,
                    codec_type: sink.codec_type,
                    info: MediaCodecInfo::from_slice(sink.info).unwrap(),
                },
            )
            .unwrap();
            last = feed(n, t, e, AvdtpEvent::CapabilitiesDone);
        }
        last
    }

    fn configured_families(t: &MockTransport) -> std::vec::Vec<MediaCodecType> {
        t.requests
            .iter()
            .filter_map(|r| match r {
                Request::SetConfiguration { codec_type, .. } => Some(*codec_type),
                _ => None,
            })
            .collect()
    }

    /// Accept configuration, bring up the media channel and accept START
    fn open_and_start(n: &mut Negotiator, t: &mut MockTransport, e: &mut FakeEncoder) {
        feed(n, t, e, AvdtpEvent::Accept { signal: SignalId::SetConfiguration }).unwrap();
        let local_seid = n.selection().unwrap().local_seid;
        let remote_seid = n.selection().unwrap().remote_seid;
        feed(
            n,
            t,
            e,
            AvdtpEvent::StreamingConnectionEstablished {
                status: 0,
                local_seid,
                remote_seid,
                max_media_payload_size: None,
            },
        )
        .unwrap();
        assert_eq!(
            feed(n, t, e, AvdtpEvent::Accept { signal: SignalId::Start }),
            Ok(Some(StreamDirective::Start))
        );
    }

    #[test]
    fn test_full_sbc_flow() {
        let mut n = negotiator(&CodecFamily::PREFERENCE);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        assert_eq!(discover(&mut n, &mut t, &mut e, &[SBC_SINK]), Ok(None));
        assert_eq!(n.registry().len(), 1);
        assert_eq!(n.registry().selected(), Some(0));
        assert_eq!(n.state(), NegotiationState::Configuring);
        assert_eq!(
            t.take(),
            vec![
                Request::Discover,
                Request::GetAllCapabilities(1),
                Request::SetConfiguration {
                    local_seid: 1,
                    remote_seid: 1,
                    codec_type: MediaCodecType::Sbc,
                    config: vec![0x22, 0x15, 2, 53],
                },
            ]
        );

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::SetConfiguration })
            .unwrap();
        assert_eq!(n.state(), NegotiationState::Opening);
        assert_eq!(t.take(), vec![Request::Open(1)]);
        assert_eq!(e.configured.unwrap().sample_rate(), 44_100);
        assert_eq!(
            &n.profile().endpoint(1).unwrap().configuration[..],
            &[0x22, 0x15, 2, 53]
        );

        feed(
            &mut n,
            &mut t,
            &mut e,
            AvdtpEvent::StreamingConnectionEstablished {
                status: 0,
                local_seid: 1,
                remote_seid: 1,
                max_media_payload_size: Some(0x2A0),
            },
        )
        .unwrap();
        assert!(n.is_connected());
        assert_eq!(n.max_media_payload_size(), 0x2A0);
        assert_eq!(t.take(), vec![Request::Start(1)]);

        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::Start }),
            Ok(Some(StreamDirective::Start))
        );
        assert_eq!(n.state(), NegotiationState::Streaming);

        n.suspend(&mut t).unwrap();
        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::Suspend }),
            Ok(Some(StreamDirective::Suspend))
        );
        assert_eq!(n.state(), NegotiationState::Suspended);

        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::StreamingConnectionReleased),
            Ok(Some(StreamDirective::Release))
        );
        assert!(!n.is_connected());
        assert_eq!(n.state(), NegotiationState::SignalingUp);

        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::SignalingConnectionReleased),
            Ok(Some(StreamDirective::Release))
        );
        assert_eq!(n.state(), NegotiationState::Idle);
        assert!(n.registry().is_empty());
        assert_eq!(n.cid(), None);
    }

    #[test]
    fn test_reject_then_accept_never_retries_first() {
        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[SBC_SINK, LDAC_SINK]).unwrap();
        assert_eq!(n.registry().selected(), None);
        assert_eq!(configured_families(&t), vec![MediaCodecType::NonA2dp]);

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Reject { signal: SignalId::SetConfiguration })
            .unwrap();
        assert_eq!(
            configured_families(&t),
            vec![MediaCodecType::NonA2dp, MediaCodecType::Sbc]
        );
        assert!(n.selector().was_tried(0));

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::SetConfiguration })
            .unwrap();
        assert_eq!(n.state(), NegotiationState::Opening);
        assert_eq!(n.selection().unwrap().family(), CodecFamily::Sbc);
        assert_eq!(n.selector().current(), Some(1));
        assert_eq!(configured_families(&t).len(), 2);
    }

    #[test]
    fn test_exhausted_candidates() {
        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[SBC_SINK, LDAC_SINK]).unwrap();
        feed(&mut n, &mut t, &mut e, AvdtpEvent::Reject { signal: SignalId::SetConfiguration })
            .unwrap();
        assert_eq!(
            feed(
                &mut n,
                &mut t,
                &mut e,
                AvdtpEvent::GeneralReject { signal: SignalId::SetConfiguration }
            ),
            Err(A2dpError::NoCompatibleCodec)
        );
        assert_eq!(n.state(), NegotiationState::SignalingUp);
        assert_eq!(configured_families(&t).len(), 2);
    }

    #[test]
    fn test_no_sinks_stays_signaling_up() {
        let mut n = negotiator(&CodecFamily::PREFERENCE);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[]).unwrap();
        assert_eq!(n.state(), NegotiationState::SignalingUp);
        assert_eq!(t.take(), vec![Request::Discover]);
    }

    #[test]
    fn test_signaling_failure_returns_idle() {
        let mut n = negotiator(&CodecFamily::PREFERENCE);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        feed(
            &mut n,
            &mut t,
            &mut e,
            AvdtpEvent::SignalingConnectionEstablished { status: 0x04, cid: CID },
        )
        .unwrap();
        assert_eq!(n.state(), NegotiationState::Idle);
        assert!(t.requests.is_empty());
    }

    #[test]
    fn test_encoder_support_filters_candidates() {
        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();
        e.supported = vec![CodecFamily::Sbc];

        discover(&mut n, &mut t, &mut e, &[SBC_SINK, LDAC_SINK]).unwrap();
        assert_eq!(configured_families(&t), vec![MediaCodecType::Sbc]);

        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();
        e.reject_configure = vec![CodecFamily::Ldac];
        discover(&mut n, &mut t, &mut e, &[SBC_SINK, LDAC_SINK]).unwrap();
        assert_eq!(configured_families(&t), vec![MediaCodecType::Sbc]);
    }

    #[test]
    fn test_transport_failure_aborts_pass() {
        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        feed(&mut n, &mut t, &mut e, AvdtpEvent::SignalingConnectionEstablished { status: 0, cid: CID })
            .unwrap();
        feed(
            &mut n,
            &mut t,
            &mut e,
            AvdtpEvent::SepFound {
                seid: 1,
                in_use: false,
                media_type: MediaType::Audio,
                role: Role::Sink,
            },
        )
        .unwrap();
        feed(&mut n, &mut t, &mut e, AvdtpEvent::DiscoveryDone).unwrap();
        feed(
            &mut n,
            &mut t,
            &mut e,
            AvdtpEvent::CapabilityReceived {
                seid: 1,
                codec_type: MediaCodecType::Sbc,
                info: MediaCodecInfo::from_slice(&SBC_CAPS).unwrap(),
            },
        )
        .unwrap();
        t.fail_with = Some(0x0C);
        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::CapabilitiesDone),
            Err(A2dpError::Transport(0x0C))
        );
        assert_eq!(n.state(), NegotiationState::SignalingUp);
    }

    #[test]
    fn test_next_codec_restarts_after_release() {
        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[SBC_SINK, LDAC_SINK]).unwrap();
        open_and_start(&mut n, &mut t, &mut e);
        assert_eq!(n.selection().unwrap().family(), CodecFamily::Ldac);
        t.take();

        n.next_codec(&mut t, &mut e).unwrap();
        assert_eq!(t.take(), vec![Request::Stop(3)]);
        assert_eq!(n.state(), NegotiationState::Streaming);

        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::Close }),
            Ok(Some(StreamDirective::Release))
        );
        assert_eq!(n.state(), NegotiationState::Closing);
        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::StreamingConnectionReleased),
            Ok(Some(StreamDirective::Release))
        );
        assert_eq!(configured_families(&t), vec![MediaCodecType::Sbc]);
        assert_eq!(n.state(), NegotiationState::Configuring);

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::SetConfiguration })
            .unwrap();
        assert_eq!(n.selection().unwrap().family(), CodecFamily::Sbc);
    }

    #[test]
    fn test_forced_selection_rejected() {
        let mut n = negotiator(&[CodecFamily::Ldac, CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[SBC_SINK, LDAC_SINK]).unwrap();
        assert_eq!(
            n.select_codec(CodecFamily::Sbc, &mut t, &mut e),
            Err(A2dpError::InvalidState)
        );

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Reject { signal: SignalId::SetConfiguration })
            .unwrap();
        feed(&mut n, &mut t, &mut e, AvdtpEvent::Reject { signal: SignalId::SetConfiguration })
            .unwrap_err();
        assert_eq!(n.state(), NegotiationState::SignalingUp);

        n.select_codec(CodecFamily::Ldac, &mut t, &mut e).unwrap();
        assert_eq!(n.state(), NegotiationState::Configuring);
        assert_eq!(
            feed(&mut n, &mut t, &mut e, AvdtpEvent::Reject { signal: SignalId::SetConfiguration }),
            Err(A2dpError::ConfigurationFailed)
        );
        assert_eq!(n.state(), NegotiationState::SignalingUp);

        assert_eq!(
            n.select_codec(CodecFamily::Aac, &mut t, &mut e),
            Err(A2dpError::UnsupportedCodec)
        );
    }

    #[test]
    fn test_reconfigure_toggles_sample_rate() {
        let mut n = negotiator(&[CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[SBC_SINK]).unwrap();
        open_and_start(&mut n, &mut t, &mut e);
        assert_eq!(n.reconfigure(&mut t), Err(A2dpError::InvalidState));

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::Suspend }).unwrap();
        t.take();
        n.reconfigure(&mut t).unwrap();
        assert_eq!(
            t.take(),
            vec![Request::Reconfigure {
                local_seid: 1,
                remote_seid: 1,
                codec_type: MediaCodecType::Sbc,
                config: vec![0x12, 0x15, 2, 53],
            }]
        );

        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::Reconfigure })
            .unwrap();
        assert_eq!(n.selection().unwrap().sample_rate(), 48_000);
        assert_eq!(e.configured.unwrap().sample_rate(), 48_000);

        n.reconfigure(&mut t).unwrap();
        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::Reconfigure })
            .unwrap();
        assert_eq!(n.selection().unwrap().sample_rate(), 44_100);
    }

    #[test]
    fn test_payload_size_is_clamped() {
        let mut n = negotiator(&[CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();

        discover(&mut n, &mut t, &mut e, &[SBC_SINK]).unwrap();
        feed(&mut n, &mut t, &mut e, AvdtpEvent::Accept { signal: SignalId::SetConfiguration })
            .unwrap();
        feed(
            &mut n,
            &mut t,
            &mut e,
            AvdtpEvent::StreamingConnectionEstablished {
                status: 0,
                local_seid: 1,
                remote_seid: 1,
                max_media_payload_size: Some(4000),
            },
        )
        .unwrap();
        assert_eq!(n.max_media_payload_size(), CODEC_STORAGE_SIZE - 1);
    }

    #[test]
    #[should_panic(expected = "undiscovered endpoint")]
    fn test_capability_for_unknown_endpoint() {
        let mut n = negotiator(&[CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();
        let _ = feed(
            &mut n,
            &mut t,
            &mut e,
            AvdtpEvent::CapabilityReceived {
                seid: 5,
                codec_type: MediaCodecType::Sbc,
                info: MediaCodecInfo::from_slice(&SBC_CAPS).unwrap(),
            },
        );
    }

    #[test]
    fn test_connect_only_from_idle() {
        let mut n = negotiator(&[CodecFamily::Sbc]);
        let mut t = MockTransport::new();
        let mut e = FakeEncoder::new();
        let addr = BluetoothAddress::new([1, 2, 3, 4, 5, 6]);

        n.connect(addr, &mut t).unwrap();
        assert_eq!(t.take(), vec![Request::Connect(addr)]);
        discover(&mut n, &mut t, &mut e, &[SBC_SINK]).unwrap();
        assert_eq!(n.connect(addr, &mut t), Err(A2dpError::InvalidState));
        n.disconnect(&mut t).unwrap();
        assert_eq!(t.requests.last(), Some(&Request::Disconnect(CID)));
    }
}
