//! MQTT 3.1.1 wire protocol model.
//!
//! `Packet` borrows topic names and payloads from the buffer it was decoded
//! from; encode goes through [`WriteTo`] into any [`bytes::BufMut`].

#[macro_use]
extern crate bitflags;

mod decode;
mod encode;
mod error;
mod packet;

pub use crate::decode::{decode_packet, decode_variable_length};
pub use crate::encode::WriteTo;
pub use crate::error::DecodeError;
pub use crate::packet::{
    Connect, ConnectAck, ConnectAckFlags, ConnectFlags, ConnectReturnCode, FixedHeader, LastWill,
    Packet, PacketId, PacketType, Publish, PublishAck, PublishComplete, PublishFlags,
    PublishReceived, PublishRelease, QoS, Subscribe, SubscribeAck, SubscribeReturnCode,
    Unsubscribe, UnsubscribeAck, MAX_REMAINING_LENGTH, PROTOCOL_LEVEL, PROTOCOL_NAME,
};
