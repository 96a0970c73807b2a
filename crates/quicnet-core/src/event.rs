//! Events delivered by the transport engine

use bytes::Bytes;
use smallvec::SmallVec;

use crate::status::QuicStatus;

/// Receive buffers as delivered by one engine event
pub type ReceiveBuffers = SmallVec<[Bytes; 4]>;

// ----------------------------------------------------------------------------
// Connection Events
// ----------------------------------------------------------------------------

/// Connection event kinds, with payload where the binding layer reads it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { session_resumed: bool },
    ShutdownInitiatedByTransport { status: QuicStatus, error_code: u64 },
    ShutdownInitiatedByPeer { error_code: u64 },
    ShutdownComplete,
    LocalAddressChanged,
    PeerAddressChanged,
    PeerStreamStarted,
    StreamsAvailable { bidirectional: u16, unidirectional: u16 },
    PeerNeedsStreams,
    IdealProcessorChanged,
    DatagramStateChanged,
    DatagramReceived,
    DatagramSendStateChanged,
    Resumed,
    ResumptionTicketReceived,
    PeerCertificateReceived,
    /// A kind this binding does not know about
    Unknown { kind: u32 },
}

impl ConnectionEvent {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionEvent::Connected { .. } => "CONNECTED",
            ConnectionEvent::ShutdownInitiatedByTransport { .. } => "SHUTDOWN_INITIATED_BY_TRANSPORT",
            ConnectionEvent::ShutdownInitiatedByPeer { .. } => "SHUTDOWN_INITIATED_BY_PEER",
            ConnectionEvent::ShutdownComplete => "SHUTDOWN_COMPLETE",
            ConnectionEvent::LocalAddressChanged => "LOCAL_ADDRESS_CHANGED",
            ConnectionEvent::PeerAddressChanged => "PEER_ADDRESS_CHANGED",
            ConnectionEvent::PeerStreamStarted => "PEER_STREAM_STARTED",
            ConnectionEvent::StreamsAvailable { .. } => "STREAMS_AVAILABLE",
            ConnectionEvent::PeerNeedsStreams => "PEER_NEEDS_STREAMS",
            ConnectionEvent::IdealProcessorChanged => "IDEAL_PROCESSOR_CHANGED",
            ConnectionEvent::DatagramStateChanged => "DATAGRAM_STATE_CHANGED",
            ConnectionEvent::DatagramReceived => "DATAGRAM_RECEIVED",
            ConnectionEvent::DatagramSendStateChanged => "DATAGRAM_SEND_STATE_CHANGED",
            ConnectionEvent::Resumed => "RESUMED",
            ConnectionEvent::ResumptionTicketReceived => "RESUMPTION_TICKET_RECEIVED",
            ConnectionEvent::PeerCertificateReceived => "PEER_CERTIFICATE_RECEIVED",
            ConnectionEvent::Unknown { .. } => "UNKNOWN",
        }
    }
}

// ----------------------------------------------------------------------------
// Stream Events
// ----------------------------------------------------------------------------

/// Stream event kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    StartComplete { status: QuicStatus, peer_accepted: bool },
    /// Zero or more byte chunks, in arrival order
    Receive { buffers: ReceiveBuffers },
    /// `context` is the value passed to the matching send call
    SendComplete { context: u64, canceled: bool },
    PeerSendShutdown,
    PeerSendAborted { error_code: u64 },
    PeerReceiveAborted { error_code: u64 },
    SendShutdownComplete { graceful: bool },
    ShutdownComplete,
    IdealSendBufferSize { byte_count: u64 },
    PeerAccepted,
    Unknown { kind: u32 },
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::StartComplete { .. } => "START_COMPLETE",
            StreamEvent::Receive { .. } => "RECEIVE",
            StreamEvent::SendComplete { .. } => "SEND_COMPLETE",
            StreamEvent::PeerSendShutdown => "PEER_SEND_SHUTDOWN",
            StreamEvent::PeerSendAborted { .. } => "PEER_SEND_ABORTED",
            StreamEvent::PeerReceiveAborted { .. } => "PEER_RECEIVE_ABORTED",
            StreamEvent::SendShutdownComplete { .. } => "SEND_SHUTDOWN_COMPLETE",
            StreamEvent::ShutdownComplete => "SHUTDOWN_COMPLETE",
            StreamEvent::IdealSendBufferSize { .. } => "IDEAL_SEND_BUFFER_SIZE",
            StreamEvent::PeerAccepted => "PEER_ACCEPTED",
            StreamEvent::Unknown { .. } => "UNKNOWN",
        }
    }

    /// Build a receive event from a list of chunks
    pub fn receive<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        StreamEvent::Receive {
            buffers: chunks.into_iter().map(Into::into).collect(),
        }
    }
}
