use std::fmt;

use mqtt_codec::{self as codec, Packet, WriteTo};

use crate::reactor::Will;
use crate::ticket::{PublishTicket, SubscribeTicket, UnsubscribeTicket};

/// CONNECT parameters snapshotted at queue time.
#[derive(Debug)]
pub(crate) struct ConnectRecord {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub will: Option<Will>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

/// A packet queued for transmission or awaiting acknowledgement.
///
/// Send-path records (publish, pubrel, subscribe, unsubscribe) carry the
/// caller's ticket; receive-path acknowledgements carry only the peer's
/// packet id.
#[derive(Debug)]
pub(crate) enum Record {
    Connect(Box<ConnectRecord>),
    Publish(PublishTicket),
    Pubrel(PublishTicket),
    Subscribe(SubscribeTicket),
    Unsubscribe(UnsubscribeTicket),
    Puback { packet_id: u16 },
    Pubrec { packet_id: u16 },
    Pubcomp { packet_id: u16 },
    Pingreq,
    Pingresp,
    Disconnect,
}

impl Record {
    pub(crate) fn packet_id(&self) -> Option<u16> {
        match self {
            Record::Publish(ticket) | Record::Pubrel(ticket) => Some(ticket.packet_id()),
            Record::Subscribe(ticket) => Some(ticket.packet_id()),
            Record::Unsubscribe(ticket) => Some(ticket.packet_id()),
            Record::Puback { packet_id }
            | Record::Pubrec { packet_id }
            | Record::Pubcomp { packet_id } => Some(*packet_id),
            Record::Connect(_) | Record::Pingreq | Record::Pingresp | Record::Disconnect => None,
        }
    }

    /// The send-path packet id this record reserves in the allocator, if
    /// any.  Receive-path acknowledgements echo the peer's ids and reserve
    /// nothing.
    pub(crate) fn reserved_packet_id(&self) -> Option<u16> {
        match self {
            Record::Publish(ticket) | Record::Pubrel(ticket) => Some(ticket.packet_id()),
            Record::Subscribe(ticket) => Some(ticket.packet_id()),
            Record::Unsubscribe(ticket) => Some(ticket.packet_id()),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Record::Connect(connect) => {
                Packet::Connect(codec::Connect {
                    clean_session: connect.clean_session,
                    keep_alive: connect.keep_alive,
                    client_id: &connect.client_id,
                    last_will: connect.will.as_ref().map(|will| codec::LastWill {
                        qos: will.qos,
                        retain: will.retain,
                        topic: &will.topic,
                        message: &will.message,
                    }),
                    username: connect.username.as_deref(),
                    password: connect.password.as_deref(),
                })
                .write_to(buf);
            }
            Record::Publish(ticket) => ticket.encode(buf),
            Record::Pubrel(ticket) => {
                Packet::PublishRelease(codec::PublishRelease {
                    packet_id: ticket.packet_id(),
                })
                .write_to(buf);
            }
            Record::Subscribe(ticket) => ticket.encode(buf),
            Record::Unsubscribe(ticket) => ticket.encode(buf),
            Record::Puback { packet_id } => {
                Packet::PublishAck(codec::PublishAck {
                    packet_id: *packet_id,
                })
                .write_to(buf);
            }
            Record::Pubrec { packet_id } => {
                Packet::PublishReceived(codec::PublishReceived {
                    packet_id: *packet_id,
                })
                .write_to(buf);
            }
            Record::Pubcomp { packet_id } => {
                Packet::PublishComplete(codec::PublishComplete {
                    packet_id: *packet_id,
                })
                .write_to(buf);
            }
            Record::Pingreq => Packet::Ping.write_to(buf),
            Record::Pingresp => Packet::Pong.write_to(buf),
            Record::Disconnect => Packet::Disconnect.write_to(buf),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Record::Connect(connect) => write!(
                f,
                "CONNECT(client_id={:?}, clean_session={})",
                connect.client_id, connect.clean_session
            ),
            Record::Publish(ticket) => write!(
                f,
                "PUBLISH(packet_id={}, qos={}, dupe={})",
                ticket.packet_id(),
                ticket.qos() as u8,
                ticket.dupe()
            ),
            Record::Pubrel(ticket) => write!(f, "PUBREL(packet_id={})", ticket.packet_id()),
            Record::Subscribe(ticket) => write!(f, "SUBSCRIBE(packet_id={})", ticket.packet_id()),
            Record::Unsubscribe(ticket) => {
                write!(f, "UNSUBSCRIBE(packet_id={})", ticket.packet_id())
            }
            Record::Puback { packet_id } => write!(f, "PUBACK(packet_id={})", packet_id),
            Record::Pubrec { packet_id } => write!(f, "PUBREC(packet_id={})", packet_id),
            Record::Pubcomp { packet_id } => write!(f, "PUBCOMP(packet_id={})", packet_id),
            Record::Pingreq => write!(f, "PINGREQ()"),
            Record::Pingresp => write!(f, "PINGRESP()"),
            Record::Disconnect => write!(f, "DISCONNECT()"),
        }
    }
}

/// Insertion-ordered collection of in-flight records, addressable by packet
/// id.
///
/// Publish acknowledgements must match the oldest in-flight publish
/// [MQTT-4.6.0-2], [MQTT-4.6.0-3] and PUBCOMPs the oldest in-flight PUBREL
/// [MQTT-4.6.0-4]; the head accessors expose exactly those records.
#[derive(Debug, Default)]
pub(crate) struct InflightQueue {
    records: Vec<Record>,
}

impl InflightQueue {
    pub fn new() -> Self {
        InflightQueue {
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: Record) {
        debug_assert!(record.packet_id().is_some());
        debug_assert!(record
            .packet_id()
            .map_or(false, |id| self.get(id).is_none()));
        self.records.push(record);
    }

    pub fn get(&self, packet_id: u16) -> Option<&Record> {
        self.records
            .iter()
            .find(|record| record.packet_id() == Some(packet_id))
    }

    pub fn remove(&mut self, packet_id: u16) -> Option<Record> {
        let index = self
            .records
            .iter()
            .position(|record| record.packet_id() == Some(packet_id))?;
        Some(self.records.remove(index))
    }

    /// The oldest in-flight publish.
    pub fn head_publish(&self) -> Option<&PublishTicket> {
        self.records.iter().find_map(|record| match record {
            Record::Publish(ticket) => Some(ticket),
            _ => None,
        })
    }

    pub fn contains_publish(&self, packet_id: u16) -> bool {
        self.records.iter().any(|record| {
            matches!(record, Record::Publish(ticket) if ticket.packet_id() == packet_id)
        })
    }

    /// The oldest in-flight PUBREL.
    pub fn head_pubrel(&self) -> Option<&PublishTicket> {
        self.records.iter().find_map(|record| match record {
            Record::Pubrel(ticket) => Some(ticket),
            _ => None,
        })
    }

    pub fn contains_pubrel(&self, packet_id: u16) -> bool {
        self.records.iter().any(|record| {
            matches!(record, Record::Pubrel(ticket) if ticket.packet_id() == packet_id)
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn drain(&mut self) -> Vec<Record> {
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use mqtt_codec::QoS;

    use super::*;
    use crate::ticket::PublishTicket;

    fn publish(packet_id: u16, qos: QoS) -> Record {
        Record::Publish(PublishTicket::new(
            packet_id,
            "topic".into(),
            b"payload".to_vec(),
            qos,
            false,
        ))
    }

    fn pubrel(packet_id: u16) -> Record {
        Record::Pubrel(PublishTicket::new(
            packet_id,
            "topic".into(),
            b"payload".to_vec(),
            QoS::ExactlyOnce,
            false,
        ))
    }

    #[test]
    fn preserves_insertion_order() {
        let mut queue = InflightQueue::new();
        queue.push(publish(3, QoS::AtLeastOnce));
        queue.push(publish(1, QoS::AtLeastOnce));
        queue.push(publish(2, QoS::AtLeastOnce));

        let order: Vec<u16> = queue.iter().filter_map(Record::packet_id).collect();
        assert_eq!(order, vec![3, 1, 2]);
        assert_eq!(queue.head_publish().map(|t| t.packet_id()), Some(3));
    }

    #[test]
    fn head_accessors_skip_other_kinds() {
        let mut queue = InflightQueue::new();
        queue.push(pubrel(9));
        queue.push(publish(4, QoS::ExactlyOnce));
        queue.push(pubrel(5));

        assert_eq!(queue.head_publish().map(|t| t.packet_id()), Some(4));
        assert_eq!(queue.head_pubrel().map(|t| t.packet_id()), Some(9));
        assert!(queue.contains_pubrel(5));
        assert!(!queue.contains_publish(5));
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let mut queue = InflightQueue::new();
        queue.push(publish(1, QoS::AtLeastOnce));
        queue.push(publish(2, QoS::AtLeastOnce));
        queue.push(publish(3, QoS::AtLeastOnce));

        assert!(queue.remove(2).is_some());
        assert!(queue.remove(2).is_none());
        let order: Vec<u16> = queue.iter().filter_map(Record::packet_id).collect();
        assert_eq!(order, vec![1, 3]);
    }
}
