//! Subscribes to topics on an MQTT broker and prints received messages.
//!
//!     cargo run --example mqtt_sub -- test.mosquitto.org --topic '#'

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token as PollToken};
use structopt::StructOpt;

use mqtt_reactor::codec::{ConnectAck, Publish, QoS, SubscribeAck};
use mqtt_reactor::{
    ConnectStatus, NameResolver, Properties, Reactor, ReactorHandler, ResolutionFuture, Selector,
    SocketFactory, Token, Topic, Transport,
};

#[derive(StructOpt)]
#[structopt(name = "mqtt_sub")]
struct Opt {
    /// Broker host
    host: String,

    /// Broker port
    #[structopt(default_value = "1883")]
    port: u16,

    /// Client identifier
    #[structopt(long, default_value = "mqttreactorsub")]
    client_id: String,

    /// Keepalive period in seconds
    #[structopt(long, default_value = "30")]
    keepalive: u16,

    /// Topic filters to subscribe to
    #[structopt(long = "topic", required = true)]
    topics: Vec<String>,
}

/// Synchronous resolver presented through the asynchronous contract: the
/// future is already complete when it is handed over.
struct BlockingResolver;

struct ReadyResolution {
    result: Option<io::Result<Vec<SocketAddr>>>,
}

impl NameResolver for BlockingResolver {
    fn resolve(&mut self, host: &str, port: u16) -> Box<dyn ResolutionFuture> {
        let result = (host, port)
            .to_socket_addrs()
            .map(|addrs| addrs.collect::<Vec<_>>());
        Box::new(ReadyResolution {
            result: Some(result),
        })
    }
}

impl ResolutionFuture for ReadyResolution {
    fn poll(&mut self) -> Option<io::Result<Vec<SocketAddr>>> {
        self.result.take()
    }
}

struct MioTransport {
    token: Token,
    stream: TcpStream,
}

impl Transport for MioTransport {
    fn token(&self) -> Token {
        self.token
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn take_error(&mut self) -> io::Result<Option<io::Error>> {
        self.stream.take_error()
    }

    fn shutdown_write(&mut self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Write)
    }
}

struct MioFactory {
    registry: Registry,
    next_token: usize,
}

impl SocketFactory for MioFactory {
    fn connect(&mut self, addr: &SocketAddr) -> io::Result<ConnectStatus> {
        let mut stream = TcpStream::connect(*addr)?;
        let token = Token(self.next_token);
        self.next_token += 1;
        self.registry.register(
            &mut stream,
            PollToken(token.0),
            Interest::READABLE | Interest::WRITABLE,
        )?;
        Ok(ConnectStatus::InProgress(Box::new(MioTransport {
            token,
            stream,
        })))
    }
}

/// Transports are registered for both interests up front; the event loop
/// filters deliveries against `want_read`/`want_write`, so the readiness
/// deltas need no selector round-trip.
struct StaticInterestSelector;

impl Selector for StaticInterestSelector {
    fn add_read(&mut self, _token: Token) {}
    fn del_read(&mut self, _token: Token) {}
    fn add_write(&mut self, _token: Token) {}
    fn del_write(&mut self, _token: Token) {}
}

struct SubHandler {
    topics: Vec<String>,
}

impl ReactorHandler for SubHandler {
    fn on_connect_fail(&mut self, _reactor: &mut Reactor<Self>) {
        eprintln!("connect failed");
    }

    fn on_disconnect(&mut self, _reactor: &mut Reactor<Self>) {
        eprintln!("disconnected");
    }

    fn on_connack(&mut self, reactor: &mut Reactor<Self>, _connack: &ConnectAck) {
        let topics = self
            .topics
            .iter()
            .map(|name| Topic::new(name.as_str(), QoS::AtMostOnce))
            .collect();
        if let Err(e) = reactor.subscribe(topics) {
            eprintln!("subscribe failed: {}", e);
            reactor.stop();
        }
    }

    fn on_suback(&mut self, _reactor: &mut Reactor<Self>, suback: &SubscribeAck) {
        println!("subscribed: {:?}", suback.status);
    }

    fn on_publish(&mut self, _reactor: &mut Reactor<Self>, publish: &Publish) {
        println!(
            "{} {}",
            publish.topic,
            String::from_utf8_lossy(publish.payload)
        );
    }
}

fn main() -> io::Result<()> {
    pretty_env_logger::init();

    let opt = Opt::from_args();

    let mut poll = Poll::new()?;
    let factory = MioFactory {
        registry: poll.registry().try_clone()?,
        next_token: 0,
    };

    let mut properties = Properties::new(
        opt.client_id,
        (opt.host, opt.port),
        Box::new(BlockingResolver),
        Box::new(factory),
        Box::new(StaticInterestSelector),
    );
    properties.keepalive_period = opt.keepalive;

    let mut reactor = Reactor::new(properties, SubHandler { topics: opt.topics });
    reactor.start();

    let mut events = Events::with_capacity(64);
    while reactor.state().is_active() {
        poll.poll(&mut events, Some(Duration::from_millis(500)))?;

        for event in events.iter() {
            if event.is_readable() && reactor.want_read() {
                while reactor.read() > 0 {}
            }
            if event.is_writable() && reactor.want_write() {
                reactor.write();
            }
        }

        reactor.poll_scheduler();
        if reactor.want_write() {
            reactor.write();
        }
    }

    match reactor.error() {
        Some(error) => {
            eprintln!("{}", error);
            std::process::exit(1);
        }
        None => Ok(()),
    }
}
