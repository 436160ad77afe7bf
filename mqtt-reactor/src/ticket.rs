use std::cell::RefCell;
use std::rc::Rc;

use mqtt_codec::{self as codec, Packet, QoS, WriteTo};

/// Subscription request entry: topic filter plus maximum QoS.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub name: String,
    pub qos: QoS,
}

impl Topic {
    pub fn new<S: Into<String>>(name: S, qos: QoS) -> Self {
        Topic {
            name: name.into(),
            qos,
        }
    }
}

/// Progress of a subscribe or unsubscribe exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStatus {
    /// Queued, bytes not yet fully on the wire.
    Preflight,
    /// Fully flushed, awaiting acknowledgement.
    Ack,
    /// Acknowledged.
    Done,
}

/// Progress of an outgoing publish exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    /// Queued, bytes not yet fully on the wire.
    Preflight,
    /// Fully flushed, awaiting PUBACK (QoS 1).
    Puback,
    /// Fully flushed, awaiting PUBREC (QoS 2).
    Pubrec,
    /// Completed.
    Done,
}

/// Handle returned by `Reactor::subscribe`.
///
/// Cheap to clone; the reactor advances `status` as the exchange
/// progresses.
#[derive(Debug, Clone)]
pub struct SubscribeTicket {
    inner: Rc<RefCell<SubscribeInner>>,
}

#[derive(Debug)]
struct SubscribeInner {
    packet_id: u16,
    topics: Vec<Topic>,
    status: SubscribeStatus,
}

impl SubscribeTicket {
    pub(crate) fn new(packet_id: u16, topics: Vec<Topic>) -> Self {
        SubscribeTicket {
            inner: Rc::new(RefCell::new(SubscribeInner {
                packet_id,
                topics,
                status: SubscribeStatus::Preflight,
            })),
        }
    }

    pub fn packet_id(&self) -> u16 {
        self.inner.borrow().packet_id
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.inner.borrow().topics.clone()
    }

    pub fn topic_count(&self) -> usize {
        self.inner.borrow().topics.len()
    }

    pub fn status(&self) -> SubscribeStatus {
        self.inner.borrow().status
    }

    pub(crate) fn set_status(&self, status: SubscribeStatus) {
        self.inner.borrow_mut().status = status;
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let inner = self.inner.borrow();
        let subscriptions = inner
            .topics
            .iter()
            .map(|topic| (topic.name.as_str(), topic.qos))
            .collect();
        Packet::Subscribe(codec::Subscribe {
            packet_id: inner.packet_id,
            subscriptions,
        })
        .write_to(buf);
    }
}

/// Handle returned by `Reactor::unsubscribe`.
#[derive(Debug, Clone)]
pub struct UnsubscribeTicket {
    inner: Rc<RefCell<UnsubscribeInner>>,
}

#[derive(Debug)]
struct UnsubscribeInner {
    packet_id: u16,
    topics: Vec<String>,
    status: SubscribeStatus,
}

impl UnsubscribeTicket {
    pub(crate) fn new(packet_id: u16, topics: Vec<String>) -> Self {
        UnsubscribeTicket {
            inner: Rc::new(RefCell::new(UnsubscribeInner {
                packet_id,
                topics,
                status: SubscribeStatus::Preflight,
            })),
        }
    }

    pub fn packet_id(&self) -> u16 {
        self.inner.borrow().packet_id
    }

    pub fn topics(&self) -> Vec<String> {
        self.inner.borrow().topics.clone()
    }

    pub fn status(&self) -> SubscribeStatus {
        self.inner.borrow().status
    }

    pub(crate) fn set_status(&self, status: SubscribeStatus) {
        self.inner.borrow_mut().status = status;
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let inner = self.inner.borrow();
        let topic_filters = inner.topics.iter().map(String::as_str).collect();
        Packet::Unsubscribe(codec::Unsubscribe {
            packet_id: inner.packet_id,
            topic_filters,
        })
        .write_to(buf);
    }
}

/// Handle returned by `Reactor::publish`.
///
/// A QoS 0 publish completes when its bytes are flushed; QoS 1 on the
/// matching PUBACK; QoS 2 on the matching PUBCOMP.  The dupe flag is set
/// when the publish survives a session resume and will be retransmitted.
#[derive(Debug, Clone)]
pub struct PublishTicket {
    inner: Rc<RefCell<PublishInner>>,
}

#[derive(Debug)]
struct PublishInner {
    packet_id: u16,
    topic: String,
    payload: Vec<u8>,
    qos: QoS,
    retain: bool,
    dupe: bool,
    status: PublishStatus,
}

impl PublishTicket {
    pub(crate) fn new(packet_id: u16, topic: String, payload: Vec<u8>, qos: QoS, retain: bool) -> Self {
        PublishTicket {
            inner: Rc::new(RefCell::new(PublishInner {
                packet_id,
                topic,
                payload,
                qos,
                retain,
                dupe: false,
                status: PublishStatus::Preflight,
            })),
        }
    }

    pub fn packet_id(&self) -> u16 {
        self.inner.borrow().packet_id
    }

    pub fn topic(&self) -> String {
        self.inner.borrow().topic.clone()
    }

    pub fn payload(&self) -> Vec<u8> {
        self.inner.borrow().payload.clone()
    }

    pub fn qos(&self) -> QoS {
        self.inner.borrow().qos
    }

    pub fn retain(&self) -> bool {
        self.inner.borrow().retain
    }

    pub fn dupe(&self) -> bool {
        self.inner.borrow().dupe
    }

    pub fn status(&self) -> PublishStatus {
        self.inner.borrow().status
    }

    pub(crate) fn set_status(&self, status: PublishStatus) {
        self.inner.borrow_mut().status = status;
    }

    pub(crate) fn set_dupe(&self) {
        self.inner.borrow_mut().dupe = true;
    }

    pub(crate) fn encode(&self, buf: &mut Vec<u8>) {
        let inner = self.inner.borrow();
        let packet_id = if inner.qos > QoS::AtMostOnce {
            Some(inner.packet_id)
        } else {
            None
        };
        Packet::Publish(codec::Publish {
            dup: inner.dupe,
            qos: inner.qos,
            retain: inner.retain,
            topic: &inner.topic,
            packet_id,
            payload: &inner.payload,
        })
        .write_to(buf);
    }
}
