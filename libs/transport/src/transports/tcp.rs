//! Socket Stream Transport
//!
//! The producer is a server: it listens, accepts workers as they come
//! and go, and watches every connection with one poll-based multiplexer
//! from a single thread. Workers hold exactly one outbound connection,
//! used for the READY/WORK handshake and finally for the one-shot
//! STATISTICS report.
//!
//! Wire framing: `[tag:u32][length:u64][payload]` for WORK and
//! STATISTICS, a bare `[tag:u32]` for READY and SHUTDOWN. Big-endian.
//!
//! Dispatch order is a soft round-robin: connections are scanned in
//! reverse and the connection that takes a message is swapped to the
//! front, so the next reverse scan tries the others first. This
//! LIFO-ish tie-break is a documented protocol property, not an
//! accident.
//!
//! Writer support does not exist here; only the collective backend
//! carries writers.

use config::Args;
use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{Result, TransportError};
use crate::message::{Message, Tag};
use crate::select::Select;
use crate::statistics::{Stopwatch, TransportStatistics};
use crate::transports::{PeerReports, Transport};
use crate::PeerId;

pub const DEFAULT_PORT: u16 = 7777;

/// How long one readiness poll blocks before logging progress and
/// polling again. The wait itself is never abandoned.
const POLL_INTERVAL: Duration = Duration::from_secs(30);

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bytes of framing around a payload: tag word plus length word.
const FRAME_OVERHEAD: usize = 4 + 8;

/// One accepted/established socket plus its liveness flag.
struct Connection {
    stream: TcpStream,
    id: PeerId,
    active: bool,
}

impl Connection {
    fn new(select: &mut Select, stream: TcpStream, id: PeerId) -> Self {
        stream.set_nodelay(true).ok();
        select.add(&stream);
        Self {
            stream,
            id,
            active: true,
        }
    }

    fn id(&self) -> PeerId {
        self.id
    }

    fn active(&self) -> bool {
        self.active
    }

    fn ready(&self, select: &Select) -> bool {
        self.active && select.set(&self.stream)
    }

    fn disconnect(&mut self, select: &mut Select) {
        self.active = false;
        select.remove(&self.stream);
        let _ = self.stream.shutdown(Shutdown::Both);
    }

    fn remote(&self) -> String {
        self.stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    fn write_tag(&mut self, tag: Tag) -> Result<()> {
        self.stream.write_all(&tag.as_u32().to_be_bytes())?;
        self.stream.flush()?;
        Ok(())
    }

    fn write_frame(&mut self, tag: Tag, payload: &[u8]) -> Result<()> {
        self.stream.write_all(&tag.as_u32().to_be_bytes())?;
        self.stream.write_all(&(payload.len() as u64).to_be_bytes())?;
        self.stream.write_all(payload)?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_tag(&mut self) -> Result<Tag> {
        let mut buf = [0u8; 4];
        self.stream.read_exact(&mut buf)?;
        Tag::from_wire(u32::from_be_bytes(buf))
    }

    fn read_length(&mut self) -> Result<usize> {
        let mut buf = [0u8; 8];
        self.stream.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf) as usize)
    }

    fn read_payload(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream.read_exact(buf)?;
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.active {
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
}

fn connect_with_retry(host: &str, port: u16) -> Result<TcpStream> {
    let mut last_error = None;
    for attempt in 1..=CONNECT_ATTEMPTS {
        match TcpStream::connect((host, port)) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!(host, port, attempt, error = %e, "cannot reach producer, retrying");
                last_error = Some(e);
                std::thread::sleep(CONNECT_RETRY_DELAY);
            }
        }
    }
    Err(TransportError::connection_with_source(
        format!("cannot reach producer at {}:{}", host, port),
        None,
        last_error.expect("at least one connect attempt"),
    ))
}

pub struct TcpTransport {
    statistics: TransportStatistics,
    select: Select,
    listener: Option<TcpListener>,
    accepting: bool,
    connections: Vec<Connection>,
    producer_link: Option<Connection>,
    next_id: PeerId,
    title: String,
    id: String,
}

impl TcpTransport {
    pub fn new(args: &Args) -> Result<Self> {
        let port: u16 = args.get_or("port", DEFAULT_PORT);
        let hostname = hostname();
        let pid = std::process::id();

        let mut select = Select::new();
        let mut listener = None;
        let mut producer_link = None;
        let title;

        if let Some(host) = args.get::<String>("host") {
            // A "host" argument makes this process a consumer.
            let stream = connect_with_retry(&host, port)?;
            producer_link = Some(Connection::new(&mut select, stream, 0));
            title = format!("Consumer-{}@{}", pid, hostname);
        } else {
            let bound = TcpListener::bind(("0.0.0.0", port))?;
            select.add(&bound);
            listener = Some(bound);
            title = format!("Producer-{}@{}", pid, hostname);
        }

        info!(title = %title, "transport starting");

        Ok(Self {
            statistics: TransportStatistics::new(),
            select,
            accepting: listener.is_some(),
            listener,
            connections: Vec::new(),
            producer_link,
            next_id: 0,
            title,
            id: format!("{}@{}", hostname, pid),
        })
    }

    pub fn from_args(args: &Args) -> Result<Box<dyn Transport>> {
        Ok(Box::new(Self::new(args)?))
    }

    /// Actual listening port (useful with a configured port of 0).
    pub fn local_port(&self) -> Option<u16> {
        self.listener
            .as_ref()
            .and_then(|listener| listener.local_addr().ok())
            .map(|addr| addr.port())
    }

    fn accept_one(&mut self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| TransportError::protocol("accept on a consumer transport"))?;

        let (stream, _) = listener.accept()?;
        self.next_id += 1;
        let connection = Connection::new(&mut self.select, stream, self.next_id);
        info!(
            title = %self.title,
            remote = %connection.remote(),
            worker = connection.id(),
            "got connection"
        );
        self.connections.push(connection);
        Ok(())
    }

    /// Drop connections already flagged inactive.
    fn purge(&mut self) {
        self.connections.retain(|connection| connection.active());
    }

    fn disconnect_at(&mut self, index: usize) {
        let worker = self.connections[index].id();
        error!(title = %self.title, worker, "lost connection with worker");
        self.connections[index].disconnect(&mut self.select);
    }

    /// Block until a connection is readable, accepting new workers
    /// eagerly while waiting. Logs on every poll expiry but never gives
    /// up.
    fn wait_and_accept(&mut self) -> Result<()> {
        loop {
            while !self.select.ready(POLL_INTERVAL)? {
                info!(
                    title = %self.title,
                    workers = self.connections.len(),
                    "waiting for a ready worker"
                );
            }

            let listener_ready = match &self.listener {
                Some(listener) if self.accepting => self.select.set(listener),
                _ => false,
            };
            if listener_ready {
                self.accept_one()?;
                continue;
            }
            return Ok(());
        }
    }

    /// READY handshake with one worker, then the frame.
    fn offer(&mut self, index: usize, message: &Message) -> Result<()> {
        let watch = Stopwatch::start();
        let tag = self.connections[index].read_tag()?;
        self.statistics.record_receive(4, watch.elapsed());

        if tag != Tag::Ready {
            return Err(TransportError::protocol(format!(
                "expected READY handshake, got {:?} from worker {}",
                tag,
                self.connections[index].id()
            )));
        }

        let watch = Stopwatch::start();
        self.connections[index].write_frame(message.tag(), message.payload())?;
        self.statistics
            .record_send(FRAME_OVERHEAD + message.message_size(), watch.elapsed());
        Ok(())
    }

    /// One dispatch pass. Returns whether some worker took the message.
    fn dispatch(&mut self, message: &Message) -> Result<bool> {
        self.purge();
        self.wait_and_accept()?;

        // Most-recently-used is tried last: reverse scan plus the swap
        // below give a soft round-robin.
        for index in (0..self.connections.len()).rev() {
            if !self.connections[index].ready(&self.select) {
                continue;
            }

            match self.offer(index, message) {
                Ok(()) => {
                    self.connections.swap(index, 0);
                    return Ok(true);
                }
                Err(e) if e.is_retryable() => {
                    warn!(title = %self.title, error = %e, "worker failed mid-handshake");
                    self.disconnect_at(index);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    fn producer_link(&mut self) -> Result<&mut Connection> {
        self.producer_link
            .as_mut()
            .ok_or_else(|| TransportError::protocol("not connected to a producer"))
    }

    /// Drain one ready connection during shutdown.
    fn drain_one(&mut self, index: usize, reports: &mut dyn PeerReports) -> Result<()> {
        let peer = self.connections[index].id();

        let watch = Stopwatch::start();
        let tag = self.connections[index].read_tag()?;
        self.statistics.record_receive(4, watch.elapsed());

        match tag {
            Tag::Ready => {
                info!(title = %self.title, worker = peer, "shutting down worker");
                let watch = Stopwatch::start();
                self.connections[index].write_tag(Tag::Shutdown)?;
                self.statistics.record_send(4, watch.elapsed());
                Ok(())
            }
            Tag::Statistics => {
                let mut message = Message::default();

                let watch = Stopwatch::start();
                let size = self.connections[index].read_length()?;
                message.reserve(size);
                self.connections[index].read_payload(&mut message.buffer_mut()[..size])?;
                self.statistics
                    .record_receive(FRAME_OVERHEAD + size, watch.elapsed());

                message.rewind();
                message.message_received(Tag::Statistics, peer);
                reports.message_from_worker(&mut message, peer)?;

                info!(title = %self.title, worker = peer, "statistics from worker");
                self.disconnect_at(index);
                Ok(())
            }
            other => Err(TransportError::protocol(format!(
                "expected READY or STATISTICS during shutdown, got {:?} from worker {}",
                other, peer
            ))),
        }
    }
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TcpTransport[{}]", self.title)
    }
}

impl Transport for TcpTransport {
    fn send_message_to_next_worker(&mut self, message: &Message) -> Result<()> {
        while !self.dispatch(message)? {
            self.purge();
            info!(title = %self.title, "resending");
            if self.connections.is_empty() {
                return Err(TransportError::exhausted("workers", "no more workers"));
            }
        }
        Ok(())
    }

    fn get_next_work_message(&mut self, message: &mut Message) -> Result<()> {
        let watch = Stopwatch::start();
        let link = self.producer_link()?;
        link.write_tag(Tag::Ready)?;

        let tag = link.read_tag()?;
        let source = link.id();
        let received = match tag {
            Tag::Work => {
                let size = link.read_length()?;
                if size > message.buffer_size() {
                    return Err(TransportError::protocol(format!(
                        "work payload of {} bytes exceeds the {} byte receive buffer",
                        size,
                        message.buffer_size()
                    )));
                }
                link.read_payload(&mut message.buffer_mut()[..size])?;
                FRAME_OVERHEAD + size
            }
            Tag::Shutdown => 4,
            other => {
                return Err(TransportError::protocol(format!(
                    "expected WORK or SHUTDOWN from the producer, got {:?}",
                    other
                )))
            }
        };

        self.statistics.record_send(4, Duration::ZERO);
        self.statistics.record_receive(received, watch.elapsed());

        message.rewind();
        message.message_received(tag, source);
        Ok(())
    }

    fn send_statistics_to_producer(&mut self, message: &Message) -> Result<()> {
        let watch = Stopwatch::start();
        let link = self.producer_link()?;
        link.write_frame(Tag::Statistics, message.payload())?;
        self.statistics
            .record_send(FRAME_OVERHEAD + message.message_size(), watch.elapsed());

        // The worker connection is one-shot: statistics are the last
        // bytes it will ever carry.
        if let Some(mut link) = self.producer_link.take() {
            link.disconnect(&mut self.select);
        }
        Ok(())
    }

    fn send_to_writer(&mut self, _writer: usize, _message: &Message) -> Result<()> {
        Err(TransportError::not_implemented("send_to_writer", "tcp"))
    }

    fn get_next_write_message(&mut self, _message: &mut Message) -> Result<()> {
        Err(TransportError::not_implemented("get_next_write_message", "tcp"))
    }

    fn send_shutdown_message(&mut self, reports: &mut dyn PeerReports) -> Result<()> {
        let watch = Stopwatch::start();

        // Stop accepting: late arrivals have no work to get.
        if let Some(listener) = &self.listener {
            self.select.remove(listener);
        }
        self.accepting = false;

        while !self.connections.is_empty() {
            while !self.select.ready(POLL_INTERVAL)? {
                info!(
                    title = %self.title,
                    workers = self.connections.len(),
                    "waiting for workers to drain"
                );
            }
            info!(
                title = %self.title,
                workers = self.connections.len(),
                "workers remaining"
            );

            for index in 0..self.connections.len() {
                if !self.connections[index].ready(&self.select) {
                    continue;
                }
                match self.drain_one(index, reports) {
                    Ok(()) => {}
                    Err(e) if e.is_retryable() => {
                        warn!(title = %self.title, error = %e, "worker failed during drain");
                        self.disconnect_at(index);
                    }
                    Err(e) => return Err(e),
                }
            }
            self.purge();
        }

        self.statistics.shutdown_time += watch.elapsed();
        Ok(())
    }

    fn initialise(&mut self) -> Result<()> {
        if self.listener.is_some() {
            // Block for the first worker so production has someone to
            // talk to.
            info!(title = %self.title, "waiting for a connection");
            self.accept_one()?;
        }
        Ok(())
    }

    fn abort(&mut self) {
        for index in 0..self.connections.len() {
            if self.connections[index].active() {
                self.connections[index].disconnect(&mut self.select);
            }
        }
        self.connections.clear();
        if let Some(mut link) = self.producer_link.take() {
            link.disconnect(&mut self.select);
        }
    }

    fn synchronise(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_producer(&self) -> bool {
        self.listener.is_some()
    }

    fn is_single(&self) -> bool {
        unimplemented!("is_single is not meaningful for the tcp transport")
    }

    fn is_writer(&self) -> bool {
        false
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn statistics(&self) -> &TransportStatistics {
        &self.statistics
    }

    fn statistics_mut(&mut self) -> &mut TransportStatistics {
        &mut self.statistics
    }
}
