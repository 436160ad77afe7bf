use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use hexplay::HexViewBuilder;

use mqtt_codec::{
    self as codec, ConnectAck, ConnectReturnCode, FixedHeader, Packet, Publish, PublishAck,
    PublishComplete, PublishReceived, PublishRelease, QoS, SubscribeAck, UnsubscribeAck,
};

use crate::clock::{Clock, SystemClock};
use crate::error::{PacketIdExhausted, ReactorError};
use crate::packet_ids::PacketIdAllocator;
use crate::queue::{ConnectRecord, InflightQueue, Record};
use crate::scheduler::{Deadline, Scheduler};
use crate::selector::{ReadinessAdapter, Selector};
use crate::ticket::{
    PublishStatus, PublishTicket, SubscribeStatus, SubscribeTicket, Topic, UnsubscribeTicket,
};
use crate::transport::{
    ConnectStatus, HandshakeStatus, NameResolver, ResolutionFuture, SocketFactory, Transport,
};

/// Reactor lifecycle state.
///
/// Inactive states are those where there are no active deadlines, no
/// transport is owned and there is no pending I/O; active states are those
/// where any of these holds resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorState {
    Init,
    Starting,
    Started,
    Stopping,
    Stopped,
    Error,
}

impl ReactorState {
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ReactorState::Starting | ReactorState::Started | ReactorState::Stopping
        )
    }

    pub fn is_inactive(self) -> bool {
        !self.is_active()
    }
}

/// Transport-layer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Stopped,
    NameResolution,
    Connecting,
    Handshake,
    Connected,
    /// Local has stopped reading; writes continue.  Reserved: not produced
    /// by the standard flow.
    Deaf,
    /// Local has sent DISCONNECT and half-closed writing; inbound packets
    /// are still accepted.
    Mute,
}

impl SocketState {
    pub fn is_active(self) -> bool {
        self != SocketState::Stopped
    }

    pub fn is_inactive(self) -> bool {
        !self.is_active()
    }
}

/// MQTT protocol handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttState {
    Stopped,
    /// CONNECT sent or queued; waiting for CONNACK.
    Connack,
    Connected,
    /// Reserved: not produced by the standard flow.
    Mute,
}

impl MqttState {
    pub fn is_active(self) -> bool {
        self != MqttState::Stopped
    }

    pub fn is_inactive(self) -> bool {
        !self.is_active()
    }
}

/// Last will and testament carried in the CONNECT packet.
#[derive(Debug, Clone)]
pub struct Will {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Construction-time reactor configuration.
pub struct Properties {
    /// CONNECT client identifier.
    pub client_id: String,
    /// Target `(host, port)`.
    pub endpoint: (String, u16),
    /// Keepalive period in seconds; 0 disables send-side pings.
    pub keepalive_period: u16,
    /// Seconds without received bytes before the reactor aborts with
    /// `KeepaliveTimeout`.  Defaults to `⌊1.5 * keepalive_period⌋`; when the
    /// keepalive period is zero the default derives from
    /// `DEFAULT_KEEPALIVE_PERIOD` so the receive-idle abort stays armed.
    pub recv_idle_abort_period: Option<u16>,
    /// With clean session set the reactor clears all message buffers on
    /// start without regard to QoS; otherwise unacknowledged messages are
    /// retransmitted after a re-connect.
    pub clean_session: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<Will>,
    pub name_resolver: Box<dyn NameResolver>,
    pub socket_factory: Box<dyn SocketFactory>,
    pub clock: Rc<dyn Clock>,
    pub selector: Box<dyn Selector>,
}

/// Default keepalive period in seconds.
pub const DEFAULT_KEEPALIVE_PERIOD: u16 = 10 * 60;

impl Properties {
    pub fn new<S: Into<String>>(
        client_id: S,
        endpoint: (String, u16),
        name_resolver: Box<dyn NameResolver>,
        socket_factory: Box<dyn SocketFactory>,
        selector: Box<dyn Selector>,
    ) -> Self {
        Properties {
            client_id: client_id.into(),
            endpoint,
            keepalive_period: DEFAULT_KEEPALIVE_PERIOD,
            recv_idle_abort_period: None,
            clean_session: true,
            username: None,
            password: None,
            will: None,
            name_resolver,
            socket_factory,
            clock: Rc::new(SystemClock),
            selector,
        }
    }
}

/// Host callbacks.
///
/// Every method receives the reactor so the handler may re-enter it, e.g.
/// submit a publish from `on_connack` or call `stop` from `on_publish`.
/// Each callback fires once per corresponding event.
pub trait ReactorHandler: Sized {
    /// The reactor gave up before the MQTT handshake completed.
    fn on_connect_fail(&mut self, reactor: &mut Reactor<Self>) {
        let _ = reactor;
    }

    /// The reactor shut down after the MQTT handshake had completed.
    fn on_disconnect(&mut self, reactor: &mut Reactor<Self>) {
        let _ = reactor;
    }

    fn on_connack(&mut self, reactor: &mut Reactor<Self>, connack: &ConnectAck) {
        let _ = (reactor, connack);
    }

    fn on_suback(&mut self, reactor: &mut Reactor<Self>, suback: &SubscribeAck) {
        let _ = (reactor, suback);
    }

    fn on_unsuback(&mut self, reactor: &mut Reactor<Self>, unsuback: &UnsubscribeAck) {
        let _ = (reactor, unsuback);
    }

    /// An application message arrived (QoS 0, 1 and 2 receive paths).
    fn on_publish(&mut self, reactor: &mut Reactor<Self>, publish: &Publish) {
        let _ = (reactor, publish);
    }

    /// QoS 1 send path completion.
    fn on_puback(&mut self, reactor: &mut Reactor<Self>, puback: &PublishAck) {
        let _ = (reactor, puback);
    }

    /// QoS 2 send path, first acknowledgement.
    fn on_pubrec(&mut self, reactor: &mut Reactor<Self>, pubrec: &PublishReceived) {
        let _ = (reactor, pubrec);
    }

    /// QoS 2 send path completion.
    fn on_pubcomp(&mut self, reactor: &mut Reactor<Self>, pubcomp: &PublishComplete) {
        let _ = (reactor, pubcomp);
    }

    /// QoS 2 receive path release.
    fn on_pubrel(&mut self, reactor: &mut Reactor<Self>, pubrel: &PublishRelease) {
        let _ = (reactor, pubrel);
    }
}

/// Handler that ignores every event.
#[derive(Debug, Default)]
pub struct NullHandler;

impl ReactorHandler for NullHandler {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    KeepaliveDue,
    KeepaliveAbort,
}

#[derive(Debug, Clone, Copy)]
enum LifecycleNotice {
    ConnectFail,
    Disconnect,
}

const RECV_CHUNK_SIZE: usize = 4096;

// Must accommodate the largest legal MQTT packet.
const TX_BUF_CEILING: usize = 5 + codec::MAX_REMAINING_LENGTH;

/// Non-blocking, single-threaded MQTT 3.1.1 client protocol engine.
///
/// The host drives progress by calling `read` when the transport is
/// readable, `write` when it is writable, `poll_scheduler` to advance
/// deadlines, and the submission operations.  After every call the reactor
/// recomputes `want_read`/`want_write` and republishes readiness through
/// the configured selector.
pub struct Reactor<H: ReactorHandler> {
    handler: Option<H>,
    deferred: Vec<LifecycleNotice>,

    client_id: String,
    host: String,
    port: u16,
    keepalive_period: u16,
    recv_idle_abort_period: Duration,
    clean_session: bool,
    username: Option<String>,
    password: Option<Vec<u8>>,
    will: Option<Will>,

    clock: Rc<dyn Clock>,
    scheduler: Scheduler<TimerEvent>,
    keepalive_due: Option<Deadline>,
    keepalive_abort: Option<Deadline>,

    name_resolver: Box<dyn NameResolver>,
    resolution: Option<Box<dyn ResolutionFuture>>,
    socket_factory: Box<dyn SocketFactory>,
    socket: Option<Box<dyn Transport>>,
    selector: Box<dyn Selector>,
    adapter: ReadinessAdapter,
    hs_want_read: bool,
    hs_want_write: bool,

    state: ReactorState,
    sock_state: SocketState,
    mqtt_state: MqttState,
    error: Option<ReactorError>,

    packet_ids: PacketIdAllocator,
    preflight: VecDeque<Record>,
    inflight: InflightQueue,

    rbuf: Vec<u8>,
    wbuf: Vec<u8>,
    // End offsets within `wbuf` of encoded-but-not-fully-flushed preflight
    // records; entry i belongs to preflight[i].
    pending_ends: VecDeque<usize>,

    pingreq_active: bool,
}

impl<H: ReactorHandler> Reactor<H> {
    pub fn new(properties: Properties, handler: H) -> Reactor<H> {
        let Properties {
            client_id,
            endpoint: (host, port),
            keepalive_period,
            recv_idle_abort_period,
            clean_session,
            username,
            password,
            will,
            name_resolver,
            socket_factory,
            clock,
            selector,
        } = properties;

        let abort_secs = match recv_idle_abort_period {
            Some(secs) => u64::from(secs),
            None if keepalive_period > 0 => u64::from(keepalive_period) * 3 / 2,
            None => u64::from(DEFAULT_KEEPALIVE_PERIOD) * 3 / 2,
        };

        Reactor {
            handler: Some(handler),
            deferred: Vec::new(),
            client_id,
            host,
            port,
            keepalive_period,
            recv_idle_abort_period: Duration::from_secs(abort_secs),
            clean_session,
            username,
            password,
            will,
            clock,
            scheduler: Scheduler::new(),
            keepalive_due: None,
            keepalive_abort: None,
            name_resolver,
            resolution: None,
            socket_factory,
            socket: None,
            selector,
            adapter: ReadinessAdapter::new(),
            hs_want_read: false,
            hs_want_write: false,
            state: ReactorState::Init,
            sock_state: SocketState::Stopped,
            mqtt_state: MqttState::Stopped,
            error: None,
            packet_ids: PacketIdAllocator::new(),
            preflight: VecDeque::new(),
            inflight: InflightQueue::new(),
            rbuf: Vec::new(),
            wbuf: Vec::new(),
            pending_ends: VecDeque::new(),
            pingreq_active: false,
        }
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    pub fn mqtt_state(&self) -> MqttState {
        self.mqtt_state
    }

    pub fn sock_state(&self) -> SocketState {
        self.sock_state
    }

    /// The abort cause while `state` is `ReactorState::Error`; `None`
    /// otherwise.
    pub fn error(&self) -> Option<&ReactorError> {
        self.error.as_ref()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// If this period elapses without the client sending a control packet
    /// to the server then a PINGREQ is generated.
    pub fn keepalive_period(&self) -> u16 {
        self.keepalive_period
    }

    /// If no bytes are received for this long the reactor aborts with
    /// `KeepaliveTimeout` [MQTT-3.1.2-24].
    pub fn recv_idle_abort_period(&self) -> Duration {
        self.recv_idle_abort_period
    }

    /// Active send-path packet ids.
    pub fn send_packet_ids(&self) -> BTreeSet<u16> {
        self.packet_ids.iter().collect()
    }

    pub fn preflight_len(&self) -> usize {
        self.preflight.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    /// True if the reactor is ready to process incoming transport data.
    pub fn want_read(&self) -> bool {
        match self.sock_state {
            SocketState::Handshake => self.hs_want_read,
            SocketState::Connected | SocketState::Mute => true,
            SocketState::Stopped
            | SocketState::NameResolution
            | SocketState::Connecting
            | SocketState::Deaf => false,
        }
    }

    /// True if the reactor has data ready to write to the transport.
    pub fn want_write(&self) -> bool {
        match self.sock_state {
            SocketState::Stopped | SocketState::NameResolution | SocketState::Mute => false,
            SocketState::Connecting => true,
            SocketState::Handshake => self.hs_want_write,
            SocketState::Connected | SocketState::Deaf => {
                !self.wbuf.is_empty() || !self.preflight.is_empty()
            }
        }
    }

    /// Attempts to connect with the remote if in one of the inactive
    /// states.  Has no effect in an active state.
    pub fn start(&mut self) {
        self.assert_state_rules();

        match self.state {
            ReactorState::Init | ReactorState::Stopped | ReactorState::Error => {
                self.start_internal()
            }
            ReactorState::Starting => {
                warn!("Start while already starting; taking no additional action.")
            }
            ReactorState::Started => warn!("Start while already started; taking no action."),
            ReactorState::Stopping => {
                warn!("Start while already stopping; ignoring start and continuing to stop.")
            }
        }

        self.assert_state_rules();
        self.update_io_notification();
    }

    /// Begins an orderly shutdown: a DISCONNECT is queued and the write
    /// side half-closed once it is flushed.  The reactor remains
    /// `Stopping` until peer EOF or the keepalive abort terminates it.
    /// Before the transport is established the shutdown is immediate.
    pub fn stop(&mut self) {
        self.assert_state_rules();

        match self.state {
            ReactorState::Init => {
                info!("Stopped.");
                self.state = ReactorState::Stopped;
            }
            ReactorState::Starting | ReactorState::Started => {
                info!("Stopping.");
                match self.sock_state {
                    SocketState::NameResolution
                    | SocketState::Connecting
                    | SocketState::Handshake => {
                        self.terminate_to(ReactorState::Stopped, None);
                    }
                    _ => {
                        self.state = ReactorState::Stopping;
                        self.preflight.push_back(Record::Disconnect);
                    }
                }
            }
            ReactorState::Stopping => warn!("Stop while already stopping."),
            ReactorState::Stopped => warn!("Stop while already stopped."),
            ReactorState::Error => warn!("Stop while reactor in error."),
        }

        self.update_io_notification();
        self.assert_state_rules();
    }

    /// Unconditional abrupt shutdown: closes the transport, cancels all
    /// deadlines and drops both queues' buffers.  No effect in an inactive
    /// state.
    pub fn terminate(&mut self) {
        self.assert_state_rules();

        info!("Terminating.");

        if self.state.is_active() {
            self.terminate_to(ReactorState::Stopped, None);
        }

        self.update_io_notification();
        self.assert_state_rules();
    }

    /// Places a SUBSCRIBE on the preflight queue.
    pub fn subscribe(&mut self, topics: Vec<Topic>) -> Result<SubscribeTicket, PacketIdExhausted> {
        self.assert_state_rules();

        let ticket = SubscribeTicket::new(self.packet_ids.acquire()?, topics);
        self.preflight.push_back(Record::Subscribe(ticket.clone()));

        self.assert_state_rules();
        self.update_io_notification();
        Ok(ticket)
    }

    /// Places an UNSUBSCRIBE on the preflight queue.
    pub fn unsubscribe(
        &mut self,
        topics: Vec<String>,
    ) -> Result<UnsubscribeTicket, PacketIdExhausted> {
        self.assert_state_rules();

        let ticket = UnsubscribeTicket::new(self.packet_ids.acquire()?, topics);
        self.preflight.push_back(Record::Unsubscribe(ticket.clone()));

        self.assert_state_rules();
        self.update_io_notification();
        Ok(ticket)
    }

    /// Places a PUBLISH on the preflight queue.  May be called in any
    /// state; the packet is transmitted once the connection reaches the
    /// connected state.
    pub fn publish(
        &mut self,
        topic: String,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<PublishTicket, PacketIdExhausted> {
        self.assert_state_rules();

        let ticket = PublishTicket::new(self.packet_ids.acquire()?, topic, payload, qos, retain);
        self.preflight.push_back(Record::Publish(ticket.clone()));

        self.assert_state_rules();
        self.update_io_notification();
        Ok(ticket)
    }

    /// Calls recv on the transport exactly once and processes any complete
    /// packets.  Returns the number of bytes read; zero on would-block.
    pub fn read(&mut self) -> usize {
        self.assert_state_rules();

        let mut num_bytes_read = 0;
        match self.sock_state {
            SocketState::Stopped | SocketState::Connecting | SocketState::Deaf => {}
            SocketState::NameResolution => self.poll_name_resolution(),
            SocketState::Handshake => self.step_handshake(),
            SocketState::Connected | SocketState::Mute => {
                let mut chunk = [0u8; RECV_CHUNK_SIZE];
                let result = match self.socket.as_mut() {
                    Some(socket) => Some(socket.recv(&mut chunk)),
                    None => None,
                };
                match result {
                    Some(Ok(0)) => self.on_muted_remote(),
                    Some(Ok(n)) => {
                        num_bytes_read = n;
                        let bytes = chunk[..n].to_vec();
                        self.on_recv_bytes(&bytes);
                    }
                    Some(Err(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                    Some(Err(e)) => self.abort_socket_error(&e),
                    None => {}
                }
            }
        }

        self.update_io_notification();
        self.assert_state_rules();
        num_bytes_read
    }

    /// Makes progress on the write side: completes a pending connect,
    /// advances a handshake, or flushes queued packets with a single send.
    pub fn write(&mut self) {
        self.assert_state_rules();

        match self.sock_state {
            SocketState::Connecting => {
                let result = match self.socket.as_mut() {
                    Some(socket) => Some(socket.take_error()),
                    None => None,
                };
                match result {
                    Some(Ok(None)) => self.on_connect(),
                    Some(Ok(Some(e))) => self.abort_socket_error(&e),
                    Some(Err(e)) => self.abort_socket_error(&e),
                    None => {}
                }
            }
            SocketState::Handshake => self.step_handshake(),
            SocketState::Connected | SocketState::Deaf => {
                self.feed_wbuf();
            }
            SocketState::NameResolution => self.poll_name_resolution(),
            SocketState::Stopped | SocketState::Mute => {}
        }

        self.update_io_notification();
        self.assert_state_rules();
    }

    /// Fires every deadline that has expired against the configured clock.
    /// Deadline callbacks re-enter the reactor exactly like host calls.
    pub fn poll_scheduler(&mut self) {
        self.poll_name_resolution();

        let now = self.clock.now();
        while let Some((id, event)) = self.scheduler.next_expired(now) {
            match event {
                TimerEvent::KeepaliveDue => {
                    if self.keepalive_due.as_ref().map(Deadline::id) == Some(id) {
                        self.keepalive_due = None;
                        self.keepalive_due_timeout();
                    }
                }
                TimerEvent::KeepaliveAbort => {
                    if self.keepalive_abort.as_ref().map(Deadline::id) == Some(id) {
                        self.keepalive_abort = None;
                        self.keepalive_abort_timeout();
                    }
                }
            }
        }

        self.update_io_notification();
        self.assert_state_rules();
    }

    fn start_internal(&mut self) {
        debug_assert!(self.sock_state.is_inactive());
        debug_assert!(self.mqtt_state.is_inactive());
        debug_assert!(self.state.is_inactive());

        info!("Starting.");

        self.error = None;
        self.hs_want_read = false;
        self.hs_want_write = false;
        self.pingreq_active = false;
        self.resolution = None;

        self.rebuild_queues();

        self.wbuf.clear();
        self.rbuf.clear();
        self.pending_ends.clear();

        self.state = ReactorState::Starting;
        self.sock_state = SocketState::NameResolution;
        self.mqtt_state = MqttState::Connack;

        info!("Looking up host {}:{}.", self.host, self.port);
        let future = self.name_resolver.resolve(&self.host, self.port);
        self.resolution = Some(future);
        self.poll_name_resolution();
    }

    /// Session-resume rebuild: surviving publish and PUBREL records become
    /// the new preflight prefix, in original order, with the dupe flag set
    /// on re-transmitted publishes [MQTT-3.3.1-1].  With clean session set
    /// the previous session's state is discarded wholesale; submissions
    /// that never reached the wire are not session state and survive in
    /// either mode.  Every dropped record releases its packet id.
    fn rebuild_queues(&mut self) {
        let inflight = self.inflight.drain();
        let old_preflight: Vec<Record> = self.preflight.drain(..).collect();
        let mut preflight = VecDeque::new();

        for record in inflight.into_iter().chain(old_preflight) {
            let keep = match record {
                Record::Publish(ref ticket) => {
                    !self.clean_session || ticket.status() == PublishStatus::Preflight
                }
                Record::Pubrel(_) => !self.clean_session,
                _ => false,
            };
            if keep {
                if let Record::Publish(ref ticket) = record {
                    match ticket.status() {
                        PublishStatus::Puback | PublishStatus::Pubrec => ticket.set_dupe(),
                        PublishStatus::Preflight | PublishStatus::Done => {}
                    }
                }
                preflight.push_back(record);
            } else if let Some(id) = record.reserved_packet_id() {
                self.packet_ids.release(id);
            }
        }

        self.preflight = preflight;
    }

    fn poll_name_resolution(&mut self) {
        if self.sock_state != SocketState::NameResolution {
            return;
        }

        let result = match self.resolution.as_mut() {
            Some(future) => future.poll(),
            None => None,
        };
        let result = match result {
            Some(result) => result,
            None => return,
        };
        self.resolution = None;

        match result {
            Err(e) => {
                error!("{}.  Aborting.", e);
                self.abort(ReactorError::Address(e.to_string()));
            }
            Ok(ref addrs) if addrs.is_empty() => {
                error!("No hostname entries found.  Aborting.");
                self.abort(ReactorError::Address("no hostname entries found".into()));
            }
            Ok(addrs) => {
                info!("Found addr={} (chosen)", addrs[0]);
                for addr in &addrs[1..] {
                    info!("Found addr={}", addr);
                }
                self.connect_to(addrs[0]);
            }
        }
    }

    fn connect_to(&mut self, addr: SocketAddr) {
        debug_assert_eq!(SocketState::NameResolution, self.sock_state);
        debug_assert_eq!(ReactorState::Starting, self.state);

        self.sock_state = SocketState::Connecting;
        match self.socket_factory.connect(&addr) {
            Ok(ConnectStatus::InProgress(socket)) => {
                self.socket = Some(socket);
                info!("Connecting.");
                self.update_io_notification();
            }
            Ok(ConnectStatus::Ready(socket)) => {
                self.socket = Some(socket);
                self.on_connect();
            }
            Err(e) => self.abort_socket_error(&e),
        }
    }

    /// Called when the transport becomes connected.
    fn on_connect(&mut self) {
        debug_assert_eq!(SocketState::Connecting, self.sock_state);
        debug_assert_eq!(ReactorState::Starting, self.state);

        info!("Connected.");
        self.schedule_keepalive_abort();

        let needs_handshake = self
            .socket
            .as_ref()
            .map_or(false, |socket| socket.needs_handshake());
        if needs_handshake {
            self.step_handshake();
        } else {
            self.set_connack();
        }
    }

    fn step_handshake(&mut self) {
        debug_assert!(matches!(
            self.sock_state,
            SocketState::Connecting | SocketState::Handshake
        ));
        debug_assert_eq!(ReactorState::Starting, self.state);

        self.sock_state = SocketState::Handshake;
        self.hs_want_read = false;
        self.hs_want_write = false;

        let result = match self.socket.as_mut() {
            Some(socket) => Some(socket.handshake()),
            None => None,
        };
        match result {
            Some(Ok(HandshakeStatus::Done)) => self.set_connack(),
            Some(Ok(HandshakeStatus::WantRead)) => self.hs_want_read = true,
            Some(Ok(HandshakeStatus::WantWrite)) => self.hs_want_write = true,
            Some(Err(e)) => self.abort_socket_error(&e),
            None => {}
        }
    }

    /// Transport is ready for MQTT: queue the CONNECT at the head of the
    /// line and wait for the CONNACK.
    fn set_connack(&mut self) {
        debug_assert!(matches!(
            self.sock_state,
            SocketState::Connecting | SocketState::Handshake
        ));
        debug_assert_eq!(MqttState::Connack, self.mqtt_state);
        debug_assert_eq!(ReactorState::Starting, self.state);
        debug_assert!(self.inflight.is_empty());
        debug_assert!(self.wbuf.is_empty());

        self.sock_state = SocketState::Connected;

        let connect = ConnectRecord {
            client_id: self.client_id.clone(),
            clean_session: self.clean_session,
            keep_alive: self.keepalive_period,
            will: self.will.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        };
        self.preflight.push_front(Record::Connect(Box::new(connect)));

        self.schedule_keepalive_due();
        self.feed_wbuf();
        self.update_io_notification();
    }

    /// Feeds the transport write buffer if the socket is in a state where
    /// packets can be sent.
    fn feed_wbuf(&mut self) -> usize {
        match self.sock_state {
            SocketState::Connected | SocketState::Deaf => self.launch_packets(),
            SocketState::Stopped
            | SocketState::Mute
            | SocketState::NameResolution
            | SocketState::Connecting
            | SocketState::Handshake => 0,
        }
    }

    /// Encodes preflight packets into the tx buffer up to the ceiling,
    /// flushes once, and moves every record whose last byte has been
    /// transmitted into the in-flight queue.
    fn launch_packets(&mut self) -> usize {
        let mut index = self.pending_ends.len();

        // Nothing may follow a DISCONNECT onto the wire.
        let disconnect_encoded = self
            .preflight
            .iter()
            .take(index)
            .any(|record| matches!(record, Record::Disconnect));

        if !disconnect_encoded {
            while index < self.preflight.len() {
                let start = self.wbuf.len();
                self.preflight[index].encode(&mut self.wbuf);
                if self.wbuf.len() > TX_BUF_CEILING {
                    self.wbuf.truncate(start);
                    break;
                }
                self.pending_ends.push_back(self.wbuf.len());
                let is_disconnect = matches!(self.preflight[index], Record::Disconnect);
                index += 1;
                if is_disconnect {
                    break;
                }
            }
        }

        let num_bytes_flushed = self.flush();
        if !self.state.is_active() {
            return 0;
        }
        if num_bytes_flushed > 0 {
            trace!(
                "send {} bytes:\n{}",
                num_bytes_flushed,
                HexViewBuilder::new(&self.wbuf[..num_bytes_flushed]).finish()
            );
        }

        let mut num_launched = 0;
        while let Some(&end) = self.pending_ends.front() {
            if num_bytes_flushed >= end {
                self.pending_ends.pop_front();
                num_launched += 1;
            } else {
                break;
            }
        }
        for end in self.pending_ends.iter_mut() {
            *end -= num_bytes_flushed;
        }
        self.wbuf.drain(..num_bytes_flushed);

        for _ in 0..num_launched {
            let record = match self.preflight.pop_front() {
                Some(record) => record,
                None => break,
            };
            info!("Launching message {}.", record);

            match record {
                Record::Publish(ticket) => match ticket.qos() {
                    QoS::AtMostOnce => {
                        self.packet_ids.release(ticket.packet_id());
                        ticket.set_status(PublishStatus::Done);
                    }
                    QoS::AtLeastOnce => {
                        ticket.set_status(PublishStatus::Puback);
                        self.inflight.push(Record::Publish(ticket));
                    }
                    QoS::ExactlyOnce => {
                        ticket.set_status(PublishStatus::Pubrec);
                        self.inflight.push(Record::Publish(ticket));
                    }
                },
                Record::Pubrel(ticket) => self.inflight.push(Record::Pubrel(ticket)),
                Record::Subscribe(ticket) => {
                    ticket.set_status(SubscribeStatus::Ack);
                    self.inflight.push(Record::Subscribe(ticket));
                }
                Record::Unsubscribe(ticket) => self.inflight.push(Record::Unsubscribe(ticket)),
                Record::Disconnect => {
                    debug_assert_eq!(ReactorState::Stopping, self.state);
                    info!("Shutting down outgoing stream.");
                    let result = match self.socket.as_mut() {
                        Some(socket) => Some(socket.shutdown_write()),
                        None => None,
                    };
                    if let Some(Err(e)) = result {
                        self.abort_socket_error(&e);
                        return 0;
                    }
                    self.sock_state = SocketState::Mute;
                    self.pingreq_active = false;
                    if let Some(deadline) = self.keepalive_due.take() {
                        self.scheduler.cancel(deadline);
                    }
                    debug_assert!(self.keepalive_abort.is_some());
                }
                Record::Connect(_)
                | Record::Puback { .. }
                | Record::Pubrec { .. }
                | Record::Pubcomp { .. }
                | Record::Pingreq
                | Record::Pingresp => {}
            }
        }

        // Keepalive-due measures idle time since the last sent byte.
        if num_bytes_flushed > 0
            && matches!(self.sock_state, SocketState::Connected | SocketState::Deaf)
        {
            self.schedule_keepalive_due();
        }

        num_bytes_flushed
    }

    /// Calls send on the transport exactly once.
    fn flush(&mut self) -> usize {
        let mut num_bytes_written = 0;
        if !self.wbuf.is_empty() {
            let result = match self.socket.as_mut() {
                Some(socket) => Some(socket.send(&self.wbuf)),
                None => None,
            };
            match result {
                Some(Ok(n)) => num_bytes_written = n,
                Some(Err(ref e)) if e.kind() == io::ErrorKind::WouldBlock => {}
                Some(Err(ref e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    error!("Remote unexpectedly closed the connection; Aborting.");
                    self.abort(ReactorError::Socket(e.raw_os_error().unwrap_or(0)));
                }
                Some(Err(e)) => self.abort_socket_error(&e),
                None => {}
            }
        }

        num_bytes_written
    }

    fn on_recv_bytes(&mut self, bytes: &[u8]) {
        debug_assert!(matches!(
            self.sock_state,
            SocketState::Connected | SocketState::Mute
        ));
        debug_assert!(!bytes.is_empty());

        trace!(
            "recv {} bytes:\n{}",
            bytes.len(),
            HexViewBuilder::new(bytes).finish()
        );

        // Every inbound byte pushes back the receive-idle abort.
        self.schedule_keepalive_abort();

        self.rbuf.extend_from_slice(bytes);

        while self.state.is_active() {
            let (header_len, header) = match FixedHeader::decode(&self.rbuf) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    error!("Error decoding message ({}).", e);
                    self.abort(ReactorError::Decode(e.to_string()));
                    break;
                }
            };
            let packet_len = header_len + header.remaining_length;
            if self.rbuf.len() < packet_len {
                break;
            }

            let packet_bytes: Vec<u8> = self.rbuf.drain(..packet_len).collect();
            match codec::decode_packet(&packet_bytes) {
                Ok(Some((_, packet))) => self.on_packet(packet),
                Ok(None) => break,
                Err(e) => {
                    error!("Error decoding message ({}).", e);
                    self.abort(ReactorError::Decode(e.to_string()));
                    break;
                }
            }
        }
    }

    fn on_packet(&mut self, packet: Packet) {
        match packet {
            Packet::ConnectAck(connack) => self.on_connack(connack),
            Packet::SubscribeAck(suback) => self.on_suback(suback),
            Packet::UnsubscribeAck(unsuback) => self.on_unsuback(unsuback),
            Packet::Publish(publish) => self.on_publish(&publish),
            Packet::PublishAck(puback) => self.on_puback(puback),
            Packet::PublishReceived(pubrec) => self.on_pubrec(pubrec),
            Packet::PublishRelease(pubrel) => self.on_pubrel(pubrel),
            Packet::PublishComplete(pubcomp) => self.on_pubcomp(pubcomp),
            Packet::Ping => self.on_pingreq(),
            Packet::Pong => self.on_pingresp(),
            Packet::Connect(_) | Packet::Subscribe(_) | Packet::Unsubscribe(_)
            | Packet::Disconnect => {
                let m = format!(
                    "Received unsupported message type {:?}.",
                    packet.packet_type()
                );
                error!("{}", m);
                self.abort(ReactorError::Decode(m));
            }
        }
    }

    fn on_connack(&mut self, connack: ConnectAck) {
        match self.mqtt_state {
            MqttState::Connack => {
                info!("Received {:?}.", connack);
                match connack.return_code {
                    ConnectReturnCode::ConnectionAccepted => self.on_connack_accepted(connack),
                    return_code => {
                        error!("Connect failed: {}.", return_code);
                        self.abort(ReactorError::Connect(return_code));
                    }
                }
            }
            MqttState::Connected | MqttState::Mute => self.abort_protocol_violation(
                "Received connack at an inappropriate time. [MQTT-3.2.0-1]".into(),
            ),
            MqttState::Stopped => {}
        }
    }

    fn on_connack_accepted(&mut self, connack: ConnectAck) {
        debug_assert_eq!(MqttState::Connack, self.mqtt_state);

        if connack.session_present && self.clean_session {
            self.abort_protocol_violation(
                "Server indicates a session is present when none was requested. [MQTT-3.2.2-1]"
                    .into(),
            );
        } else {
            match self.state {
                ReactorState::Starting => self.state = ReactorState::Started,
                ReactorState::Stopping => {}
                _ => debug_assert!(false, "connack in state {:?}", self.state),
            }
            self.mqtt_state = MqttState::Connected;

            self.notify(|handler, reactor| handler.on_connack(reactor, &connack));

            self.feed_wbuf();
        }
    }

    fn on_suback(&mut self, suback: SubscribeAck) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("SUBACK"),
            MqttState::Connected | MqttState::Mute => {
                let subscribe = match self.inflight.get(suback.packet_id) {
                    Some(Record::Subscribe(ticket)) => Some(ticket.clone()),
                    _ => None,
                };
                match subscribe {
                    None => self.abort_protocol_violation(format!(
                        "Received {:?} for a packet id that is not in-flight; aborting.",
                        suback
                    )),
                    Some(subscribe) => {
                        if suback.status.len() == subscribe.topic_count() {
                            info!("Received {:?}.", suback);
                            subscribe.set_status(SubscribeStatus::Done);
                            self.packet_ids.release(suback.packet_id);
                            self.inflight.remove(suback.packet_id);
                            self.notify(|handler, reactor| handler.on_suback(reactor, &suback));
                        } else {
                            self.abort_protocol_violation(format!(
                                "Received {:?} but the number of subscribe results does not \
                                 equal the number of requested topics; aborting.",
                                suback
                            ));
                        }
                    }
                }
            }
            MqttState::Stopped => {}
        }
    }

    fn on_unsuback(&mut self, unsuback: UnsubscribeAck) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("UNSUBACK"),
            MqttState::Connected | MqttState::Mute => {
                let unsubscribe = match self.inflight.get(unsuback.packet_id) {
                    Some(Record::Unsubscribe(ticket)) => Some(ticket.clone()),
                    _ => None,
                };
                match unsubscribe {
                    None => self.abort_protocol_violation(format!(
                        "Received {:?} for a packet id that is not in-flight; aborting.",
                        unsuback
                    )),
                    Some(unsubscribe) => {
                        info!("Received {:?}.", unsuback);
                        unsubscribe.set_status(SubscribeStatus::Done);
                        self.packet_ids.release(unsuback.packet_id);
                        self.inflight.remove(unsuback.packet_id);
                        self.notify(|handler, reactor| handler.on_unsuback(reactor, &unsuback));
                    }
                }
            }
            MqttState::Stopped => {}
        }
    }

    fn on_publish(&mut self, publish: &Publish) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PUBLISH"),
            MqttState::Connected | MqttState::Mute => {
                info!("Received {:?}.", publish);
                self.notify(|handler, reactor| handler.on_publish(reactor, publish));

                match self.sock_state {
                    SocketState::Connected | SocketState::Deaf => match publish.qos {
                        QoS::AtMostOnce => {}
                        QoS::AtLeastOnce => {
                            if let Some(packet_id) = publish.packet_id {
                                self.preflight.push_back(Record::Puback { packet_id });
                            }
                        }
                        QoS::ExactlyOnce => {
                            if let Some(packet_id) = publish.packet_id {
                                self.preflight.push_back(Record::Pubrec { packet_id });
                            }
                        }
                    },
                    SocketState::Mute => match publish.qos {
                        QoS::AtMostOnce => {}
                        QoS::AtLeastOnce => {
                            info!("No puback will be published because reactor is stopping.")
                        }
                        QoS::ExactlyOnce => {
                            info!("No pubrec will be published because reactor is stopping.")
                        }
                    },
                    _ => {}
                }
            }
            MqttState::Stopped => {}
        }
    }

    fn on_puback(&mut self, puback: PublishAck) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PUBACK"),
            MqttState::Connected | MqttState::Mute => {
                let head = self.inflight.head_publish().cloned();
                match head {
                    Some(publish) if publish.packet_id() == puback.packet_id => {
                        if publish.qos() == QoS::AtLeastOnce {
                            self.inflight.remove(puback.packet_id);
                            self.packet_ids.release(puback.packet_id);
                            info!("Received {:?}.", puback);
                            publish.set_status(PublishStatus::Done);
                            self.notify(|handler, reactor| handler.on_puback(reactor, &puback));
                        } else {
                            self.abort_protocol_violation(format!(
                                "Received {:?}, an inappropriate response to a qos={} publish; \
                                 aborting.",
                                puback,
                                publish.qos() as u8
                            ));
                        }
                    }
                    Some(publish) if self.inflight.contains_publish(puback.packet_id) => self
                        .abort_protocol_violation(format!(
                            "Received {:?} instead of puback for next-in-flight packet_id={}; \
                             aborting.",
                            puback,
                            publish.packet_id()
                        )),
                    _ => self.abort_protocol_violation(format!(
                        "Received {:?} when packet_id={} was not in-flight; aborting.",
                        puback, puback.packet_id
                    )),
                }
            }
            MqttState::Stopped => {}
        }
    }

    fn on_pubrec(&mut self, pubrec: PublishReceived) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PUBREC"),
            MqttState::Connected | MqttState::Mute => {
                let head = self.inflight.head_publish().cloned();
                match head {
                    Some(publish) if publish.packet_id() == pubrec.packet_id => {
                        if publish.qos() == QoS::ExactlyOnce {
                            self.inflight.remove(pubrec.packet_id);
                            info!("Received {:?}.", pubrec);

                            // Queued before the callback runs so the PUBREL
                            // keeps the PUBREC arrival position ahead of
                            // anything the callback submits [MQTT-4.6.0-4].
                            self.preflight.push_back(Record::Pubrel(publish));
                            self.notify(|handler, reactor| handler.on_pubrec(reactor, &pubrec));
                        } else {
                            self.abort_protocol_violation(format!(
                                "Received unexpected {:?} in response to a qos={} publish; \
                                 aborting.",
                                pubrec,
                                publish.qos() as u8
                            ));
                        }
                    }
                    Some(publish) if self.inflight.contains_publish(pubrec.packet_id) => self
                        .abort_protocol_violation(format!(
                            "Received unexpected {:?} when packet_id={} was next-in-flight; \
                             aborting.",
                            pubrec,
                            publish.packet_id()
                        )),
                    _ => self.abort_protocol_violation(format!(
                        "Received unexpected {:?} when packet_id={} was not in-flight; aborting.",
                        pubrec, pubrec.packet_id
                    )),
                }
            }
            MqttState::Stopped => {}
        }
    }

    fn on_pubcomp(&mut self, pubcomp: PublishComplete) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PUBCOMP"),
            MqttState::Connected | MqttState::Mute => {
                let head = self.inflight.head_pubrel().cloned();
                match head {
                    Some(pubrel) if pubrel.packet_id() == pubcomp.packet_id => {
                        self.inflight.remove(pubcomp.packet_id);
                        self.packet_ids.release(pubcomp.packet_id);
                        info!("Received {:?}.", pubcomp);
                        pubrel.set_status(PublishStatus::Done);
                        self.notify(|handler, reactor| handler.on_pubcomp(reactor, &pubcomp));
                    }
                    Some(pubrel) if self.inflight.contains_pubrel(pubcomp.packet_id) => self
                        .abort_protocol_violation(format!(
                            "Received {:?} when packet_id={} was the next pubrel in flight; \
                             aborting.",
                            pubcomp,
                            pubrel.packet_id()
                        )),
                    _ => self.abort_protocol_violation(format!(
                        "Received {:?} when no pubrel for packet_id={} was in-flight; aborting.",
                        pubcomp, pubcomp.packet_id
                    )),
                }
            }
            MqttState::Stopped => {}
        }
    }

    /// QoS 2 receive path.
    fn on_pubrel(&mut self, pubrel: PublishRelease) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PUBREL"),
            MqttState::Connected | MqttState::Mute => {
                info!("Received {:?}.", pubrel);
                self.notify(|handler, reactor| handler.on_pubrel(reactor, &pubrel));
                self.preflight.push_back(Record::Pubcomp {
                    packet_id: pubrel.packet_id,
                });
            }
            MqttState::Stopped => {}
        }
    }

    fn on_pingreq(&mut self) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PINGREQ"),
            MqttState::Connected | MqttState::Mute => match self.sock_state {
                SocketState::Connected => {
                    info!("Received PINGREQ().");
                    self.preflight.push_back(Record::Pingresp);
                }
                SocketState::Mute => info!("Received PINGREQ(); ignoring because muted."),
                _ => {}
            },
            MqttState::Stopped => {}
        }
    }

    fn on_pingresp(&mut self) {
        match self.mqtt_state {
            MqttState::Connack => self.abort_early_packet("PINGRESP"),
            MqttState::Connected | MqttState::Mute => {
                info!("Received PINGRESP().");
                self.pingreq_active = false;
            }
            MqttState::Stopped => {}
        }
    }

    fn on_muted_remote(&mut self) {
        match self.sock_state {
            SocketState::Handshake | SocketState::Connected => {
                warn!("Remote has unexpectedly closed remote->local writes; Aborting.");
                self.abort(ReactorError::MutePeer);
            }
            SocketState::Mute => {
                // Local writes were already shut down; the peer closing its
                // side completes the orderly disconnect.
                warn!("Remote has gracefully closed remote->local writes; Stopped.");
                self.terminate_to(ReactorState::Stopped, None);
            }
            _ => {}
        }
    }

    fn keepalive_due_timeout(&mut self) {
        self.assert_state_rules();
        debug_assert!(matches!(
            self.sock_state,
            SocketState::Connected | SocketState::Deaf
        ));

        if !self.pingreq_active {
            self.pingreq_active = true;
            self.preflight.push_back(Record::Pingreq);
        }

        self.update_io_notification();
        self.assert_state_rules();
    }

    fn keepalive_abort_timeout(&mut self) {
        self.assert_state_rules();
        debug_assert!(matches!(
            self.sock_state,
            SocketState::Handshake | SocketState::Connected | SocketState::Mute | SocketState::Deaf
        ));

        warn!(
            "More than abort period ({:?}) has passed since last bytes received.  Aborting.",
            self.recv_idle_abort_period
        );
        self.abort(ReactorError::KeepaliveTimeout);

        self.update_io_notification();
        self.assert_state_rules();
    }

    fn schedule_keepalive_due(&mut self) {
        if self.keepalive_period == 0 {
            return;
        }
        if let Some(deadline) = self.keepalive_due.take() {
            self.scheduler.cancel(deadline);
        }
        let due = self.clock.now() + Duration::from_secs(u64::from(self.keepalive_period));
        self.keepalive_due = Some(self.scheduler.add(due, TimerEvent::KeepaliveDue));
    }

    fn schedule_keepalive_abort(&mut self) {
        if let Some(deadline) = self.keepalive_abort.take() {
            self.scheduler.cancel(deadline);
        }
        let due = self.clock.now() + self.recv_idle_abort_period;
        self.keepalive_abort = Some(self.scheduler.add(due, TimerEvent::KeepaliveAbort));
    }

    /// Cleans up all transport-related resources.
    fn terminate_socket(&mut self) {
        if let Some(mut future) = self.resolution.take() {
            future.cancel();
        }

        if let Some(socket) = self.socket.take() {
            self.adapter
                .update(&mut *self.selector, false, false, socket.token());
        }

        self.sock_state = SocketState::Stopped;
    }

    fn terminate_to(&mut self, state: ReactorState, error: Option<ReactorError>) {
        debug_assert!(state.is_inactive());

        self.terminate_socket();

        let notice = match self.mqtt_state {
            MqttState::Connack => Some(LifecycleNotice::ConnectFail),
            MqttState::Connected | MqttState::Mute => Some(LifecycleNotice::Disconnect),
            MqttState::Stopped => None,
        };

        self.pingreq_active = false;

        self.wbuf.clear();
        self.rbuf.clear();
        self.pending_ends.clear();

        if let Some(deadline) = self.keepalive_abort.take() {
            self.scheduler.cancel(deadline);
        }
        if let Some(deadline) = self.keepalive_due.take() {
            self.scheduler.cancel(deadline);
        }

        self.state = state;
        self.error = error;
        self.mqtt_state = MqttState::Stopped;

        if let Some(notice) = notice {
            self.notify_lifecycle(notice);
        }
    }

    /// Immediately terminates all active resources and parks the reactor
    /// in the final state `ReactorState::Error`.
    fn abort(&mut self, e: ReactorError) {
        self.terminate_to(ReactorState::Error, Some(e));
    }

    fn abort_socket_error(&mut self, e: &io::Error) {
        let errno = e.raw_os_error().unwrap_or(0);
        error!("{} (errno={}).  Aborting.", e, errno);
        self.abort(ReactorError::Socket(errno));
    }

    fn abort_protocol_violation(&mut self, m: String) {
        error!("{}", m);
        self.abort(ReactorError::Protocol(m));
    }

    fn abort_early_packet(&mut self, packet_type: &str) {
        self.abort_protocol_violation(format!(
            "Received {} before connack. [MQTT-3.2.0-1]",
            packet_type
        ));
    }

    fn update_io_notification(&mut self) {
        let token = match self.socket.as_ref() {
            Some(socket) => socket.token(),
            None => return,
        };
        let want_read = self.want_read();
        let want_write = self.want_write();
        self.adapter
            .update(&mut *self.selector, want_read, want_write, token);
    }

    fn notify<F>(&mut self, f: F)
    where
        F: FnOnce(&mut H, &mut Self),
    {
        match self.handler.take() {
            Some(mut handler) => {
                f(&mut handler, self);
                self.handler = Some(handler);
                self.flush_deferred();
            }
            None => debug!("Handler re-entered; dropping nested event."),
        }
    }

    fn notify_lifecycle(&mut self, notice: LifecycleNotice) {
        if self.handler.is_none() {
            // terminate() reached from inside a callback; deliver once the
            // running callback returns.
            self.deferred.push(notice);
            return;
        }
        match notice {
            LifecycleNotice::ConnectFail => {
                self.notify(|handler, reactor| handler.on_connect_fail(reactor))
            }
            LifecycleNotice::Disconnect => {
                self.notify(|handler, reactor| handler.on_disconnect(reactor))
            }
        }
    }

    fn flush_deferred(&mut self) {
        while !self.deferred.is_empty() {
            let mut handler = match self.handler.take() {
                Some(handler) => handler,
                None => return,
            };
            let notice = self.deferred.remove(0);
            match notice {
                LifecycleNotice::ConnectFail => handler.on_connect_fail(self),
                LifecycleNotice::Disconnect => handler.on_disconnect(self),
            }
            self.handler = Some(handler);
        }
    }

    /// Cross-state invariants, verified on every public transition.
    fn assert_state_rules(&self) {
        if self.mqtt_state.is_inactive()
            || self.sock_state.is_inactive()
            || self.state.is_inactive()
        {
            assert!(self.mqtt_state.is_inactive());
            assert!(self.sock_state.is_inactive());
            assert!(self.state.is_inactive());
        }

        if matches!(
            self.sock_state,
            SocketState::NameResolution | SocketState::Connecting | SocketState::Handshake
        ) {
            assert_eq!(ReactorState::Starting, self.state);
            assert_eq!(MqttState::Connack, self.mqtt_state);
        }

        if self.want_read() || self.want_write() {
            assert!(self.socket.is_some());
        }

        if !matches!(self.sock_state, SocketState::Connected | SocketState::Deaf) {
            assert!(!self.pingreq_active);
        }

        match self.sock_state {
            SocketState::Handshake
            | SocketState::Connected
            | SocketState::Mute
            | SocketState::Deaf => assert!(self.keepalive_abort.is_some()),
            SocketState::NameResolution | SocketState::Connecting | SocketState::Stopped => {
                assert!(self.keepalive_abort.is_none())
            }
        }

        if !matches!(self.sock_state, SocketState::Connected | SocketState::Deaf) {
            assert!(self.keepalive_due.is_none());
        }

        if self.sock_state.is_inactive() {
            self.adapter.assert_closed();
        }

        if self.state == ReactorState::Error {
            assert!(self.error.is_some());
        }

        self.assert_packet_id_rules();
    }

    /// Allocator membership equals the ids reserved by queued records.
    fn assert_packet_id_rules(&self) {
        let mut reserved = BTreeSet::new();
        for record in self.preflight.iter().chain(self.inflight.iter()) {
            if let Some(id) = record.reserved_packet_id() {
                reserved.insert(id);
            }
        }
        let allocated: BTreeSet<u16> = self.packet_ids.iter().collect();
        assert_eq!(reserved, allocated);
    }
}
