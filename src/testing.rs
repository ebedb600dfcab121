//! Test doubles shared by the unit tests

use std::vec::Vec;

use crate::BluetoothAddress;
use crate::a2dp::{
    AvdtpTransport, CodecFamily, CodecSelection, MediaCodecType, MediaPacket, SignalingChannelId,
    StreamEndpointId, TransportError,
};
use crate::stream::{EncodeOutcome, EncoderError, MediaEncoder, Pcm};

/// One request seen by [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    Connect(BluetoothAddress),
    Disconnect(SignalingChannelId),
    Discover,
    GetAllCapabilities(StreamEndpointId),
    SetConfiguration {
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        codec_type: MediaCodecType,
        config: Vec<u8>,
    },
    Reconfigure {
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        codec_type: MediaCodecType,
        config: Vec<u8>,
    },
    Open(StreamEndpointId),
    Start(StreamEndpointId),
    Suspend(StreamEndpointId),
    Abort(StreamEndpointId),
    Stop(StreamEndpointId),
    RequestCanSendNow(StreamEndpointId),
    SendMedia {
        rtp_timestamp: Option<u32>,
        payload: Vec<u8>,
    },
}

/// Records every request; fails all of them while `fail_with` is set
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    pub requests: Vec<Request>,
    pub fail_with: Option<u8>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Vec<Request> {
        std::mem::take(&mut self.requests)
    }

    pub fn count(&self, pred: impl Fn(&Request) -> bool) -> usize {
        self.requests.iter().filter(|r| pred(r)).count()
    }

    pub fn payloads(&self) -> Vec<(Option<u32>, Vec<u8>)> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::SendMedia {
                    rtp_timestamp,
                    payload,
                } => Some((*rtp_timestamp, payload.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&mut self, request: Request) -> Result<(), TransportError> {
        if let Some(status) = self.fail_with {
            return Err(TransportError(status));
        }
        self.requests.push(request);
        Ok(())
    }
}

impl AvdtpTransport for MockTransport {
    fn connect(&mut self, addr: BluetoothAddress) -> Result<(), TransportError> {
        self.record(Request::Connect(addr))
    }

    fn disconnect(&mut self, cid: SignalingChannelId) -> Result<(), TransportError> {
        self.record(Request::Disconnect(cid))
    }

    fn discover_stream_endpoints(&mut self, _cid: SignalingChannelId) -> Result<(), TransportError> {
        self.record(Request::Discover)
    }

    fn get_all_capabilities(
        &mut self,
        _cid: SignalingChannelId,
        remote_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::GetAllCapabilities(remote_seid))
    }

    fn set_configuration(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        codec_type: MediaCodecType,
        configuration: &[u8],
    ) -> Result<(), TransportError> {
        self.record(Request::SetConfiguration {
            local_seid,
            remote_seid,
            codec_type,
            config: configuration.to_vec(),
        })
    }

    fn reconfigure(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
        remote_seid: StreamEndpointId,
        codec_type: MediaCodecType,
        configuration: &[u8],
    ) -> Result<(), TransportError> {
        self.record(Request::Reconfigure {
            local_seid,
            remote_seid,
            codec_type,
            config: configuration.to_vec(),
        })
    }

    fn open_stream(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::Open(local_seid))
    }

    fn start_stream(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::Start(local_seid))
    }

    fn suspend_stream(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::Suspend(local_seid))
    }

    fn abort_stream(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::Abort(local_seid))
    }

    fn stop_stream(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::Stop(local_seid))
    }

    fn request_can_send_now(
        &mut self,
        _cid: SignalingChannelId,
        local_seid: StreamEndpointId,
    ) -> Result<(), TransportError> {
        self.record(Request::RequestCanSendNow(local_seid))
    }

    fn send_media_payload(
        &mut self,
        _cid: SignalingChannelId,
        _local_seid: StreamEndpointId,
        packet: MediaPacket<'_>,
    ) -> Result<(), TransportError> {
        self.record(Request::SendMedia {
            rtp_timestamp: packet.rtp_timestamp,
            payload: packet.payload.to_vec(),
        })
    }
}

/// Deterministic encoder
///
/// Each call writes `output` bytes (the whole slice when `None`) filled with
/// the call number, after `silent_calls` calls that produce nothing.
#[derive(Debug)]
pub(crate) struct FakeEncoder {
    pub supported: Vec<CodecFamily>,
    pub reject_configure: Vec<CodecFamily>,
    pub configured: Option<CodecSelection>,
    pub output: Option<usize>,
    pub frames_per_call: u8,
    pub silent_calls: usize,
    pub fail_calls: Vec<usize>,
    pub calls: usize,
    pub last_pcm: Vec<i16>,
    pub last_s24: Vec<u8>,
}

impl FakeEncoder {
    pub fn new() -> Self {
        Self {
            supported: CodecFamily::PREFERENCE.to_vec(),
            reject_configure: Vec::new(),
            configured: None,
            output: None,
            frames_per_call: 1,
            silent_calls: 0,
            fail_calls: Vec::new(),
            calls: 0,
            last_pcm: Vec::new(),
            last_s24: Vec::new(),
        }
    }

    pub fn with_output(bytes: usize) -> Self {
        Self {
            output: Some(bytes),
            ..Self::new()
        }
    }
}

impl MediaEncoder for FakeEncoder {
    fn supports(&self, family: CodecFamily) -> bool {
        self.supported.contains(&family)
    }

    fn configure(&mut self, selection: &CodecSelection) -> Result<(), EncoderError> {
        if self.reject_configure.contains(&selection.family()) {
            return Err(EncoderError(0x20));
        }
        self.configured = Some(*selection);
        Ok(())
    }

    fn encode(&mut self, pcm: Pcm<'_>, out: &mut [u8]) -> Result<EncodeOutcome, EncoderError> {
        self.calls += 1;
        match pcm {
            Pcm::S16(samples) => self.last_pcm = samples.to_vec(),
            Pcm::S24Le(bytes) => self.last_s24 = bytes.to_vec(),
        }
        if self.fail_calls.contains(&self.calls) {
            return Err(EncoderError(0x10));
        }
        if self.calls <= self.silent_calls {
            return Ok(EncodeOutcome::default());
        }
        let written = self.output.unwrap_or(out.len()).min(out.len());
        out[..written].fill(self.calls as u8);
        Ok(EncodeOutcome {
            written,
            frames: self.frames_per_call,
        })
    }
}
