use derive_more::Display;
use num_enum::TryFromPrimitive;

/// Control packet type, carried in the high nibble of the first byte of
/// the fixed header.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, TryFromPrimitive)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

/// The two-to-five bytes that start every control packet.
#[derive(Clone, Debug, PartialEq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    /// Flag nibble; only PUBLISH carries meaningful bits here.
    pub packet_flags: u8,
    /// Byte count of the variable header and payload that follow.
    pub remaining_length: usize,
}

/// Protocol name prefix of every CONNECT packet, length field included.
pub const PROTOCOL_NAME: &[u8] = b"\x00\x04MQTT";

/// Protocol level byte identifying version 3.1.1.
pub const PROTOCOL_LEVEL: u8 = 4;

/// Upper bound of the remaining-length varint (four encoded bytes).
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// Delivery guarantee for an application message.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, TryFromPrimitive)]
pub enum QoS {
    /// Fire and forget: no acknowledgement, no retransmission.
    AtMostOnce = 0,
    /// Acknowledged with a PUBACK; the receiver may see duplicates.
    AtLeastOnce = 1,
    /// Full PUBREC/PUBREL/PUBCOMP exchange; neither loss nor duplication.
    ExactlyOnce = 2,
}

/// Packet identifier pairing an acknowledgement with the request it
/// answers.
pub type PacketId = u16;

/// A decoded MQTT 3.1.1 control packet.
///
/// Topic names and payloads borrow from the buffer the packet was decoded
/// from.
#[derive(Clone, Debug, PartialEq)]
pub enum Packet<'a> {
    Connect(Connect<'a>),
    ConnectAck(ConnectAck),
    Publish(Publish<'a>),
    PublishAck(PublishAck),
    PublishReceived(PublishReceived),
    PublishRelease(PublishRelease),
    PublishComplete(PublishComplete),
    Subscribe(Subscribe<'a>),
    SubscribeAck(SubscribeAck),
    Unsubscribe(Unsubscribe<'a>),
    UnsubscribeAck(UnsubscribeAck),
    Ping,
    Pong,
    Disconnect,
}

impl Packet<'_> {
    /// The packet identifier in the variable header, for the packet types
    /// that have one.
    pub fn packet_id(&self) -> Option<PacketId> {
        match self {
            Packet::Publish(publish) => publish.packet_id,
            Packet::PublishAck(p) => Some(p.packet_id),
            Packet::PublishReceived(p) => Some(p.packet_id),
            Packet::PublishRelease(p) => Some(p.packet_id),
            Packet::PublishComplete(p) => Some(p.packet_id),
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::SubscribeAck(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::UnsubscribeAck(p) => Some(p.packet_id),
            _ => None,
        }
    }
}

/// Session request sent by the client as the first packet of a
/// connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Connect<'a> {
    /// Discard any session state the server holds for this client id.
    pub clean_session: bool,
    /// Maximum send-idle interval in seconds; 0 turns keepalive off.
    pub keep_alive: u16,
    pub client_id: &'a str,
    /// Message for the server to publish should the connection drop
    /// without a DISCONNECT.
    pub last_will: Option<LastWill<'a>>,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
}

bitflags! {
    /// Connect flag byte of the CONNECT variable header.
    #[derive(Default)]
    pub struct ConnectFlags: u8 {
        const USERNAME      = 0x80;
        const PASSWORD      = 0x40;
        const WILL_RETAIN   = 0x20;
        const WILL_QOS      = 0x18;
        const LAST_WILL     = 0x04;
        const CLEAN_SESSION = 0x02;
    }
}

pub(crate) const WILL_QOS_SHIFT: usize = 3;

impl From<QoS> for ConnectFlags {
    fn from(qos: QoS) -> Self {
        Self::from_bits_truncate((qos as u8) << WILL_QOS_SHIFT)
    }
}

/// Will message registered with the server at connect time.
#[derive(Clone, Debug, PartialEq)]
pub struct LastWill<'a> {
    pub qos: QoS,
    pub retain: bool,
    pub topic: &'a str,
    pub message: &'a [u8],
}

/// Server's answer to a CONNECT.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectAck {
    /// True when the server resumed stored session state for this client.
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

bitflags! {
    /// Connect acknowledge flag byte of the CONNACK variable header.
    #[derive(Default)]
    pub struct ConnectAckFlags: u8 {
        const SESSION_PRESENT = 0x01;
    }
}

/// CONNACK status byte.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, TryFromPrimitive)]
pub enum ConnectReturnCode {
    #[display(fmt = "connection accepted")]
    ConnectionAccepted = 0,
    /// The server does not speak the requested protocol revision.
    #[display(fmt = "connection refused: unacceptable protocol version")]
    UnacceptableProtocolVersion = 1,
    /// Well-formed client identifier that this server will not accept.
    #[display(fmt = "connection refused: identifier rejected")]
    IdentifierRejected = 2,
    /// The MQTT service is not taking connections right now.
    #[display(fmt = "connection refused: server unavailable")]
    ServiceUnavailable = 3,
    #[display(fmt = "connection refused: bad user name or password")]
    BadUserNameOrPassword = 4,
    #[display(fmt = "connection refused: not authorized")]
    NotAuthorized = 5,
}

/// Application message, in either direction.
#[derive(Clone, Debug, PartialEq)]
pub struct Publish<'a> {
    /// Set on retransmission of a packet the receiver may already have
    /// seen.
    pub dup: bool,
    pub qos: QoS,
    /// Ask the server to keep the message for delivery to future
    /// subscribers of the topic.
    pub retain: bool,
    pub topic: &'a str,
    /// Present exactly when `qos` is 1 or 2.
    pub packet_id: Option<PacketId>,
    pub payload: &'a [u8],
}

bitflags! {
    /// PUBLISH flag nibble of the fixed header.
    #[derive(Default)]
    pub struct PublishFlags: u8 {
        const DUP = 0x08;
        const QOS = 0x06;
        const RETAIN = 0x01;
    }
}

pub(crate) const PUBLISH_QOS_SHIFT: usize = 1;

impl From<QoS> for PublishFlags {
    fn from(qos: QoS) -> Self {
        Self::from_bits_truncate((qos as u8) << PUBLISH_QOS_SHIFT)
    }
}

impl Publish<'_> {
    pub fn flags(&self) -> PublishFlags {
        let mut flags = PublishFlags::from(self.qos);
        if self.dup {
            flags |= PublishFlags::DUP;
        }
        if self.retain {
            flags |= PublishFlags::RETAIN;
        }
        flags
    }
}

// Packets whose variable header is nothing but a packet identifier.
macro_rules! packet_id_header {
    ($($(#[$attr:meta])* $name:ident,)*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, Eq, PartialEq)]
            pub struct $name {
                pub packet_id: PacketId,
            }
        )*
    };
}

packet_id_header! {
    /// QoS 1 publish acknowledgement.
    PublishAck,
    /// Receiver half of the QoS 2 exchange, step one.
    PublishReceived,
    /// Sender half of the QoS 2 exchange, step two.
    PublishRelease,
    /// Final packet of a QoS 2 exchange.
    PublishComplete,
    /// Unsubscribe acknowledgement.
    UnsubscribeAck,
}

/// Subscription request: one packet id covering a list of topic filters.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscribe<'a> {
    pub packet_id: PacketId,
    /// Topic filters paired with the maximum QoS wanted for each.
    pub subscriptions: Vec<(&'a str, QoS)>,
}

/// Per-filter results answering a SUBSCRIBE, in request order.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeAck {
    pub packet_id: PacketId,
    pub status: Vec<SubscribeReturnCode>,
}

/// Grant or refusal for one topic filter of a SUBSCRIBE.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SubscribeReturnCode {
    /// Granted, possibly at a lower QoS than requested.
    Success(QoS),
    Failure,
}

impl SubscribeReturnCode {
    pub const FAILURE: u8 = 0x80;
}

impl From<SubscribeReturnCode> for u8 {
    fn from(code: SubscribeReturnCode) -> u8 {
        match code {
            SubscribeReturnCode::Success(qos) => qos as u8,
            SubscribeReturnCode::Failure => SubscribeReturnCode::FAILURE,
        }
    }
}

/// Request to drop a list of topic filters from the session.
#[derive(Clone, Debug, PartialEq)]
pub struct Unsubscribe<'a> {
    pub packet_id: PacketId,
    pub topic_filters: Vec<&'a str>,
}
