//! Non-blocking, single-threaded MQTT 3.1.1 client protocol engine.
//!
//! The [`Reactor`] drives the full client-side state machine — name
//! resolution, TCP connect, optional TLS handshake, MQTT CONNECT/CONNACK,
//! steady-state publish/subscribe exchange, and orderly or abrupt
//! termination — over a caller-provided non-blocking byte transport.  The
//! host supplies the I/O selector, socket factory, name resolver and clock
//! through [`Properties`] and drives progress with `read`, `write` and
//! `poll_scheduler`.

#[macro_use]
extern crate log;

pub extern crate mqtt_codec as codec;

mod clock;
mod error;
mod packet_ids;
mod queue;
mod reactor;
mod scheduler;
mod selector;
mod ticket;
mod transport;

pub use crate::clock::{Clock, SettableClock, SystemClock};
pub use crate::error::{PacketIdExhausted, ReactorError};
pub use crate::packet_ids::PacketIdAllocator;
pub use crate::reactor::{
    MqttState, NullHandler, Properties, Reactor, ReactorHandler, ReactorState, SocketState, Will,
    DEFAULT_KEEPALIVE_PERIOD,
};
pub use crate::scheduler::{Deadline, Scheduler};
pub use crate::selector::{ReadinessAdapter, Selector, Token};
pub use crate::ticket::{
    PublishStatus, PublishTicket, SubscribeStatus, SubscribeTicket, Topic, UnsubscribeTicket,
};
pub use crate::transport::{
    ConnectStatus, HandshakeStatus, NameResolver, ResolutionFuture, SocketFactory, Transport,
};
