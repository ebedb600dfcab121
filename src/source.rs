//! The A2DP source session
//!
//! [`A2dpSource`] owns everything one outgoing audio stream needs: the
//! transport it talks through, the codec encoder, the PCM source, the
//! negotiation state machine and, while a stream is started, the
//! [`StreamSession`]. All entry points run on one execution context; the
//! async [`processor`](crate::processor) feeds it events, commands and ticks
//! in order.

use crate::a2dp::{
    A2dpProfile, AvdtpEvent, AvdtpTransport, CodecSelection, NegotiationState, Negotiator,
    StreamDirective,
};
use crate::stream::{MediaEncoder, PcmSource, StreamSession};
use crate::{A2dpError, A2dpSourceOptions, SourceCommand};

/// One A2DP source talking to one remote sink
#[derive(Debug)]
pub struct A2dpSource<T, E, P> {
    transport: T,
    encoder: E,
    pcm: P,
    options: A2dpSourceOptions,
    negotiator: Negotiator,
    session: Option<StreamSession>,
}

impl<T, E, P> A2dpSource<T, E, P>
where
    T: AvdtpTransport,
    E: MediaEncoder,
    P: PcmSource,
{
    /// Create a source advertising one endpoint per codec family
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidParameter`] if `options` do not validate
    pub fn new(transport: T, encoder: E, pcm: P, options: A2dpSourceOptions) -> Result<Self, A2dpError> {
        Self::with_profile(
            transport,
            encoder,
            pcm,
            options,
            A2dpProfile::with_default_endpoints()?,
        )
    }

    /// Create a source advertising the endpoints of `profile`
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidParameter`] if `options` do not validate
    pub fn with_profile(
        transport: T,
        encoder: E,
        pcm: P,
        options: A2dpSourceOptions,
        profile: A2dpProfile,
    ) -> Result<Self, A2dpError> {
        options.validate()?;
        let negotiator = Negotiator::new(
            profile,
            &options.candidates,
            options.preferences,
            options.max_media_payload_size,
        )?;
        Ok(Self {
            transport,
            encoder,
            pcm,
            options,
            negotiator,
            session: None,
        })
    }

    /// Negotiation state
    #[must_use]
    pub const fn state(&self) -> NegotiationState {
        self.negotiator.state()
    }

    /// Negotiation details
    #[must_use]
    pub const fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    /// Codec of the configured stream
    #[must_use]
    pub const fn selection(&self) -> Option<&CodecSelection> {
        self.negotiator.selection()
    }

    /// The started stream
    #[must_use]
    pub const fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    /// Whether a media transport channel is up
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.negotiator.is_connected()
    }

    /// Whether the sample clock should be ticking
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.session.is_some() && self.negotiator.state() == NegotiationState::Streaming
    }

    /// Tick period of the running stream
    #[must_use]
    pub fn tick_interval_ms(&self) -> Option<u32> {
        if self.is_streaming() {
            self.selection().map(CodecSelection::tick_interval_ms)
        } else {
            None
        }
    }

    /// Source configuration
    #[must_use]
    pub const fn options(&self) -> &A2dpSourceOptions {
        &self.options
    }

    /// The transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The encoder
    pub fn encoder_mut(&mut self) -> &mut E {
        &mut self.encoder
    }

    /// The PCM source
    pub fn pcm_mut(&mut self) -> &mut P {
        &mut self.pcm
    }

    /// Feed one AVDTP event
    ///
    /// # Errors
    /// Returns the negotiation error, or the transport error of a payload send
    pub fn handle_event(&mut self, event: &AvdtpEvent) -> Result<(), A2dpError> {
        if let AvdtpEvent::CanSendMediaNow = event {
            return self.on_can_send_now();
        }
        let directive =
            self.negotiator
                .handle_event(event, &mut self.transport, &mut self.encoder)?;
        if let Some(directive) = directive {
            self.apply(directive)?;
        }
        Ok(())
    }

    /// Execute one application command
    ///
    /// # Errors
    /// Returns [`A2dpError::InvalidState`] if the command does not apply in
    /// the current state, or the error of the request it issues
    pub fn execute(&mut self, command: SourceCommand) -> Result<(), A2dpError> {
        debug!("[AVDTP] command {}", command);
        let transport = &mut self.transport;
        match command {
            SourceCommand::Connect => self.negotiator.connect(self.options.remote_addr, transport),
            SourceCommand::Disconnect => {
                // audio stops before signaling goes down
                if self.session.take().is_some() {
                    info!("[STREAM] stream stopped for disconnect");
                }
                self.negotiator.disconnect(transport)
            }
            SourceCommand::Start => self.negotiator.start(transport),
            SourceCommand::Suspend => self.negotiator.suspend(transport),
            SourceCommand::Abort => self.negotiator.abort(transport),
            SourceCommand::Stop => self.negotiator.stop(transport),
            SourceCommand::SelectCodec(family) => {
                self.negotiator
                    .select_codec(family, transport, &mut self.encoder)
            }
            SourceCommand::NextCodec => self.negotiator.next_codec(transport, &mut self.encoder),
            SourceCommand::SelectRemote(index) => self.negotiator.select_remote(index),
            SourceCommand::Reconfigure => self.negotiator.reconfigure(transport),
            SourceCommand::ConnectOrNextCodec => {
                if self.negotiator.state() == NegotiationState::Idle {
                    self.negotiator.connect(self.options.remote_addr, transport)
                } else {
                    self.negotiator.next_codec(transport, &mut self.encoder)
                }
            }
        }
    }

    /// Run the sample clock at `now_ms`
    ///
    /// Returns the samples per channel encoded; zero when no stream runs.
    ///
    /// # Errors
    /// Returns the transport error of a send opportunity request
    pub fn tick(&mut self, now_ms: u32) -> Result<usize, A2dpError> {
        if self.negotiator.state() != NegotiationState::Streaming {
            return Ok(0);
        }
        let (Some(session), Some(cid)) = (self.session.as_mut(), self.negotiator.cid()) else {
            return Ok(0);
        };
        session.on_tick(
            now_ms,
            cid,
            &mut self.transport,
            &mut self.encoder,
            &mut self.pcm,
        )
    }

    fn on_can_send_now(&mut self) -> Result<(), A2dpError> {
        let (Some(session), Some(cid)) = (self.session.as_mut(), self.negotiator.cid()) else {
            debug!("[STREAM] send opportunity without a stream");
            return Ok(());
        };
        session.on_can_send_now(cid, &mut self.transport).map(|_| ())
    }

    fn apply(&mut self, directive: StreamDirective) -> Result<(), A2dpError> {
        match directive {
            StreamDirective::Start => {
                let selection = *self.negotiator.selection().ok_or(A2dpError::InvalidState)?;
                let previous = self.session.take();
                let mut session =
                    match StreamSession::new(&selection, self.negotiator.max_media_payload_size()) {
                        Ok(session) => session,
                        Err(err) => {
                            warn!(
                                "[STREAM] {} does not fit the media channel, aborting: {}",
                                selection.family(),
                                err
                            );
                            if let Err(abort_err) = self.negotiator.abort(&mut self.transport) {
                                warn!("[STREAM] abort failed: {}", abort_err);
                            }
                            return Err(err);
                        }
                    };
                // a resume keeps the RTP clock running
                if let Some(previous) = previous {
                    session.resume_from(previous.context().rtp_timestamp);
                }
                info!(
                    "[STREAM] {} stream running, {} Hz, tick {} ms",
                    selection.family(),
                    selection.sample_rate(),
                    selection.tick_interval_ms()
                );
                self.session = Some(session);
            }
            StreamDirective::Suspend => {
                if let Some(session) = self.session.as_mut() {
                    session.suspend();
                }
                info!("[STREAM] stream suspended");
            }
            StreamDirective::Release => {
                if self.session.take().is_some() {
                    info!("[STREAM] stream released");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BluetoothAddress;
    use crate::a2dp::{CodecFamily, MediaCodecInfo, MediaCodecType, MediaType, Role, SignalId};
    use crate::stream::SineSource;
    use crate::testing::{FakeEncoder, MockTransport, Request};

    type TestSource = A2dpSource<MockTransport, FakeEncoder, SineSource>;

    fn source(candidates: &[CodecFamily]) -> TestSource {
        let options = A2dpSourceOptions {
            remote_addr: BluetoothAddress::new([0x00, 0x1B, 0xDC, 0x07, 0x32, 0xEF]),
            candidates: heapless::Vec::from_slice(candidates).unwrap(),
            ..A2dpSourceOptions::default()
        };
        A2dpSource::new(MockTransport::new(), FakeEncoder::new(), SineSource::new(), options)
            .unwrap()
    }

    /// Drive a connecting source to an opened SBC stream on remote SEID 1
    fn open_sbc(src: &mut TestSource, max_media_payload_size: Option<u16>) {
        let events = [
            AvdtpEvent::SignalingConnectionEstablished { status: 0, cid: 0x41 },
            AvdtpEvent::SepFound {
                seid: 1,
                in_use: false,
                media_type: MediaType::Audio,
                role: Role::Sink,
            },
            AvdtpEvent::DiscoveryDone,
            AvdtpEvent::CapabilityReceived {
                seid: 1,
                codec_type: MediaCodecType::Sbc,
                info: MediaCodecInfo::from_slice(&[0xFF, 0xFF, 2, 53]).unwrap(),
            },
            AvdtpEvent::CapabilitiesDone,
            AvdtpEvent::Accept {
                signal: SignalId::SetConfiguration,
            },
            AvdtpEvent::StreamingConnectionEstablished {
                status: 0,
                local_seid: 1,
                remote_seid: 1,
                max_media_payload_size,
            },
        ];
        for event in &events {
            src.handle_event(event).unwrap();
        }
    }

    fn start_sbc(src: &mut TestSource) {
        open_sbc(src, None);
        src.handle_event(&AvdtpEvent::Accept {
            signal: SignalId::Start,
        })
        .unwrap();
    }

    #[test]
    fn test_stream_lifecycle() {
        let mut src = source(&CodecFamily::PREFERENCE);
        assert_eq!(src.tick(0), Ok(0));

        src.execute(SourceCommand::Connect).unwrap();
        start_sbc(&mut src);
        assert!(src.is_connected());
        assert!(src.is_streaming());
        assert_eq!(src.tick_interval_ms(), Some(10));

        // 44.1 kHz stereo SBC frames are 118 bytes; 5 fit in 0x290
        let mut now = 0;
        while !src.session().unwrap().context().codec_ready_to_send {
            src.tick(now).unwrap();
            now += 10;
        }
        assert_eq!(
            src.transport_mut()
                .count(|r| matches!(r, Request::RequestCanSendNow(1))),
            1
        );
        src.handle_event(&AvdtpEvent::CanSendMediaNow).unwrap();
        let payloads = src.transport_mut().payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].1[0], 5);
        assert_eq!(payloads[0].1.len(), 5 * 118 + 1);
        assert_eq!(src.session().unwrap().context().rtp_timestamp, 640);

        src.execute(SourceCommand::Suspend).unwrap();
        src.handle_event(&AvdtpEvent::Accept {
            signal: SignalId::Suspend,
        })
        .unwrap();
        assert!(!src.is_streaming());
        assert_eq!(src.tick(now), Ok(0));
        assert_eq!(src.session().unwrap().context().codec_storage_count, 0);

        src.execute(SourceCommand::Start).unwrap();
        src.handle_event(&AvdtpEvent::Accept {
            signal: SignalId::Start,
        })
        .unwrap();
        assert_eq!(src.session().unwrap().context().rtp_timestamp, 640);

        src.handle_event(&AvdtpEvent::StreamingConnectionReleased)
            .unwrap();
        assert!(src.session().is_none());
        assert!(!src.is_connected());
    }

    #[test]
    fn test_unsolicited_send_opportunity() {
        let mut src = source(&[CodecFamily::Sbc]);
        src.handle_event(&AvdtpEvent::CanSendMediaNow).unwrap();
        src.execute(SourceCommand::Connect).unwrap();
        start_sbc(&mut src);
        src.handle_event(&AvdtpEvent::CanSendMediaNow).unwrap();
        assert!(src.transport_mut().payloads().is_empty());
    }

    #[test]
    fn test_connect_or_next_codec() {
        let mut src = source(&[CodecFamily::Sbc]);
        src.execute(SourceCommand::ConnectOrNextCodec).unwrap();
        assert_eq!(
            src.transport_mut().take(),
            vec![Request::Connect(src.options().remote_addr)]
        );
        start_sbc(&mut src);
        src.transport_mut().take();
        src.execute(SourceCommand::ConnectOrNextCodec).unwrap();
        assert_eq!(src.transport_mut().take(), vec![Request::Stop(1)]);
    }

    #[test]
    fn test_disconnect_stops_audio() {
        let mut src = source(&[CodecFamily::Sbc]);
        src.execute(SourceCommand::Connect).unwrap();
        start_sbc(&mut src);
        src.tick(0).unwrap();
        src.transport_mut().take();

        src.execute(SourceCommand::Disconnect).unwrap();
        assert!(!src.is_streaming());
        assert!(src.session().is_none());
        assert_eq!(src.tick_interval_ms(), None);
        for step in 1..=5 {
            assert_eq!(src.tick(step * 10), Ok(0));
        }
        assert_eq!(src.transport_mut().take(), vec![Request::Disconnect(0x41)]);

        src.handle_event(&AvdtpEvent::SignalingConnectionReleased)
            .unwrap();
        assert_eq!(src.state(), NegotiationState::Idle);
    }

    #[test]
    fn test_oversized_frame_aborts_stream() {
        let mut src = source(&[CodecFamily::Sbc]);
        src.execute(SourceCommand::Connect).unwrap();
        // 44.1 kHz stereo SBC frames are 118 bytes
        open_sbc(&mut src, Some(100));
        src.transport_mut().take();

        assert_eq!(
            src.handle_event(&AvdtpEvent::Accept {
                signal: SignalId::Start,
            }),
            Err(A2dpError::BufferTooSmall)
        );
        assert!(src.session().is_none());
        assert!(!src.is_streaming());
        assert_eq!(src.tick(10), Ok(0));
        assert_eq!(src.transport_mut().take(), vec![Request::Abort(1)]);

        src.handle_event(&AvdtpEvent::Accept {
            signal: SignalId::Abort,
        })
        .unwrap();
        assert_eq!(src.state(), NegotiationState::Closing);
        src.handle_event(&AvdtpEvent::StreamingConnectionReleased)
            .unwrap();
        assert_eq!(src.state(), NegotiationState::SignalingUp);
    }

    #[test]
    fn test_invalid_options() {
        let options = A2dpSourceOptions {
            max_media_payload_size: 0,
            ..A2dpSourceOptions::default()
        };
        assert_eq!(
            A2dpSource::new(MockTransport::new(), FakeEncoder::new(), SineSource::new(), options)
                .err(),
            Some(A2dpError::InvalidParameter)
        );
    }
}
