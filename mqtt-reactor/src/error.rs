use std::error::Error as StdError;

use derive_more::Display;

use mqtt_codec::ConnectReturnCode;

/// Cause of a reactor abort.
///
/// Available from `Reactor::error` while the reactor is in
/// `ReactorState::Error`.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum ReactorError {
    /// Name resolution failed or returned no usable address.
    #[display(fmt = "address error: {}", _0)]
    Address(String),
    /// Transport syscall failure, carrying the OS error code.
    #[display(fmt = "socket error (errno={})", _0)]
    Socket(i32),
    /// Peer closed its write stream at an unexpected point.
    #[display(fmt = "peer unexpectedly closed its write stream")]
    MutePeer,
    /// Server rejected the CONNECT packet.
    #[display(fmt = "connect failed: {}", _0)]
    Connect(ConnectReturnCode),
    /// No bytes received within the receive-idle abort period.
    #[display(fmt = "keepalive timeout")]
    KeepaliveTimeout,
    /// Peer wrote a sequence of bytes that could not be interpreted as an
    /// MQTT packet.
    #[display(fmt = "decode error: {}", _0)]
    Decode(String),
    /// Legal packet at an illegal time, or an ordering violation.
    #[display(fmt = "protocol violation: {}", _0)]
    Protocol(String),
}

impl StdError for ReactorError {}

/// No free send-path packet identifiers remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(fmt = "send-path packet identifiers exhausted")]
pub struct PacketIdExhausted;

impl StdError for PacketIdExhausted {}
