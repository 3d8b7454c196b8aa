//! Collective Cluster Transport (registry name "mpi")
//!
//! Rank 0 is always the producer. A requested writer count selects
//! writer ranks by an even stride from the top rank downward; every
//! other nonzero rank is a worker. Work dispatch is a READY handshake:
//! workers announce themselves, the producer replies to whichever rank
//! spoke first. Writers are addressed directly by logical index, no
//! handshake.
//!
//! The collective substrate itself lives behind
//! [`Communicator`](crate::cluster::Communicator); this module is pure
//! protocol.

use config::Args;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::cluster::{self, Communicator};
use crate::error::{Result, TransportError};
use crate::logging;
use crate::message::{Message, Tag};
use crate::statistics::{Stopwatch, TransportStatistics};
use crate::transports::{PeerReports, Transport};
use crate::PeerId;

const PRODUCER_RANK: PeerId = 0;

pub struct MpiTransport {
    comm: Arc<dyn Communicator>,
    statistics: TransportStatistics,
    rank: usize,
    total_ranks: usize,
    ranks_to_writers: BTreeMap<PeerId, usize>,
    writers_to_ranks: BTreeMap<usize, PeerId>,
    writer_lock: Arc<Mutex<()>>,
    title: String,
    id: String,
}

/// Even-stride writer selection: start at the top rank, step back by
/// `total_ranks / writers`, clamp at rank 1. Precondition (not defended
/// beyond the stride check): `writers` small relative to `total_ranks`.
fn select_writers(
    total_ranks: usize,
    writers: usize,
) -> Result<(BTreeMap<PeerId, usize>, BTreeMap<usize, PeerId>)> {
    let mut ranks_to_writers = BTreeMap::new();
    let mut writers_to_ranks = BTreeMap::new();

    if writers == 0 {
        return Ok((ranks_to_writers, writers_to_ranks));
    }

    let stride = total_ranks / writers;
    if stride <= 1 {
        return Err(TransportError::configuration(
            format!(
                "{} writers cannot be placed across {} ranks",
                writers, total_ranks
            ),
            Some("writers"),
        ));
    }

    let mut rank = total_ranks as i64 - 1;
    for writer in 1..=writers {
        if rank <= 0 {
            rank = 1;
        }
        let selected = rank as PeerId;
        if ranks_to_writers.insert(selected, writer).is_some() {
            return Err(TransportError::consistency(format!(
                "rank {} selected as a writer twice",
                selected
            )));
        }
        writers_to_ranks.insert(writer, selected);
        rank -= stride as i64;
    }

    Ok((ranks_to_writers, writers_to_ranks))
}

impl MpiTransport {
    /// Construct over an explicit communicator (tests, embedded worlds).
    pub fn with_comm(args: &Args, comm: Arc<dyn Communicator>) -> Result<Self> {
        let rank = comm.rank();
        let total_ranks = comm.size();
        let hostname = comm.processor_name();

        let writers: usize = args.get_or("writers", 0);
        let (ranks_to_writers, writers_to_ranks) = select_writers(total_ranks, writers)?;

        let title = if rank == PRODUCER_RANK {
            format!("Producer-0@{}", hostname)
        } else if ranks_to_writers.contains_key(&rank) {
            format!("Writer-{}@{}", rank, hostname)
        } else {
            format!("Worker-{}@{}", rank, hostname)
        };

        if let Some(base) = args.get::<String>("split-logs") {
            logging::split_logs(&base, &rank.to_string());
        }

        info!(
            title = %title,
            pid = std::process::id(),
            ranks = total_ranks,
            "transport starting"
        );

        Ok(Self {
            comm,
            statistics: TransportStatistics::new(),
            rank,
            total_ranks,
            ranks_to_writers,
            writers_to_ranks,
            writer_lock: Arc::new(Mutex::new(())),
            title,
            id: rank.to_string(),
        })
    }

    /// Registry constructor: requires a world communicator installed via
    /// [`cluster::install_world`].
    pub fn from_args(args: &Args) -> Result<Box<dyn Transport>> {
        let comm = cluster::world().ok_or_else(|| {
            TransportError::configuration(
                "transport 'mpi' requires a world communicator (cluster::install_world)",
                Some("transport"),
            )
        })?;
        Ok(Box::new(Self::with_comm(args, comm)?))
    }

    fn is_writer_rank(&self, rank: PeerId) -> bool {
        self.ranks_to_writers.contains_key(&rank)
    }

    fn send(&mut self, message: &Message, target: PeerId, tag: Tag) -> Result<()> {
        if message.message_size() == 0 {
            return Err(TransportError::consistency(
                "refusing to send an empty message",
            ));
        }

        let watch = Stopwatch::start();
        let result = self
            .comm
            .send(message.payload(), target, tag.as_u32() as i32);
        let elapsed = watch.elapsed();

        match result {
            Ok(()) => {
                self.statistics.record_send(message.message_size(), elapsed);
                Ok(())
            }
            Err(e) => {
                self.statistics.send_time += elapsed;
                Err(e)
            }
        }
    }

    /// Probe, size the buffer, then receive. Returns the actual source
    /// and decoded tag.
    fn receive(
        &mut self,
        message: &mut Message,
        source: Option<PeerId>,
        tag: Option<Tag>,
    ) -> Result<(PeerId, Tag)> {
        let watch = Stopwatch::start();

        let envelope = self
            .comm
            .probe(source, tag.map(|t| t.as_u32() as i32))?;
        message.reserve(envelope.size);
        self.comm
            .receive(message.buffer_mut(), envelope.source, envelope.tag)?;

        self.statistics
            .record_receive(envelope.size, watch.elapsed());

        Ok((envelope.source, Tag::from_wire(envelope.tag as u32)?))
    }
}

impl fmt::Debug for MpiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MpiTransport[{}]", self.title)
    }
}

impl Transport for MpiTransport {
    fn send_message_to_next_worker(&mut self, message: &Message) -> Result<()> {
        let mut request = Message::default();
        let (worker, tag) = self.receive(&mut request, None, None)?;

        if self.is_writer_rank(worker) {
            return Err(TransportError::protocol(format!(
                "work request from writer rank {}",
                worker
            )));
        }
        if tag != Tag::Ready {
            return Err(TransportError::protocol(format!(
                "expected READY from a worker, got {:?} from rank {}",
                tag, worker
            )));
        }

        self.send(message, worker, message.tag())
    }

    fn get_next_work_message(&mut self, message: &mut Message) -> Result<()> {
        self.send(Message::ready_message(), PRODUCER_RANK, Tag::Ready)?;

        let (source, tag) = self.receive(message, Some(PRODUCER_RANK), None)?;
        if tag != Tag::Work && tag != Tag::Shutdown {
            return Err(TransportError::protocol(format!(
                "expected WORK or SHUTDOWN from the producer, got {:?}",
                tag
            )));
        }

        message.rewind();
        message.message_received(tag, source);
        Ok(())
    }

    fn send_statistics_to_producer(&mut self, message: &Message) -> Result<()> {
        self.send(message, PRODUCER_RANK, Tag::Statistics)
    }

    fn send_to_writer(&mut self, writer: usize, message: &Message) -> Result<()> {
        let lock = Arc::clone(&self.writer_lock);
        let _guard = lock.lock();

        let rank = *self.writers_to_ranks.get(&writer).ok_or_else(|| {
            TransportError::consistency(format!("no writer with index {}", writer))
        })?;
        self.send(message, rank, message.tag())
    }

    fn get_next_write_message(&mut self, message: &mut Message) -> Result<()> {
        let (source, tag) = self.receive(message, None, None)?;

        if self.is_writer_rank(source) {
            return Err(TransportError::protocol(format!(
                "write message from writer rank {}",
                source
            )));
        }

        message.rewind();
        message.message_received(tag, source);

        match tag {
            Tag::Write | Tag::Open | Tag::Close | Tag::Shutdown => Ok(()),
            other => Err(TransportError::protocol(format!(
                "expected OPEN, WRITE, CLOSE or SHUTDOWN, got {:?}",
                other
            ))),
        }
    }

    fn send_shutdown_message(&mut self, reports: &mut dyn PeerReports) -> Result<()> {
        let watch = Stopwatch::start();

        // Phase 1: drain the workers. Each worker gets SHUTDOWN as a
        // reply to its READY and is accounted for when its STATISTICS
        // arrives.
        let mut outstanding = self.total_ranks - self.ranks_to_writers.len() - 1;
        let mut remaining: BTreeSet<PeerId> = (1..self.total_ranks).collect();
        info!(workers = outstanding, "shutting down workers");

        while outstanding > 0 {
            let mut message = Message::default();
            let (peer, tag) = self.receive(&mut message, None, None)?;

            if self.is_writer_rank(peer) {
                return Err(TransportError::protocol(format!(
                    "message from writer rank {} while draining workers",
                    peer
                )));
            }

            match tag {
                Tag::Ready => {
                    info!(worker = peer, left = outstanding, "shutting down worker");
                    self.send(Message::shutdown_message(), peer, Tag::Shutdown)?;
                }
                Tag::Statistics => {
                    message.rewind();
                    message.message_received(Tag::Statistics, peer);
                    reports.message_from_worker(&mut message, peer)?;
                    remaining.remove(&peer);
                    outstanding -= 1;
                    info!(
                        worker = peer,
                        left = outstanding,
                        remaining = ?remaining,
                        "statistics from worker"
                    );
                }
                other => {
                    return Err(TransportError::protocol(format!(
                        "expected READY or STATISTICS while draining workers, got {:?}",
                        other
                    )))
                }
            }
        }

        // Phase 2: writers get SHUTDOWN directly, then report back.
        let mut outstanding = self.ranks_to_writers.len();
        info!(writers = outstanding, "shutting down writers");

        let writer_ranks: Vec<PeerId> = self.writers_to_ranks.values().copied().collect();
        for rank in writer_ranks {
            self.send(Message::shutdown_message(), rank, Tag::Shutdown)?;
        }

        while outstanding > 0 {
            let mut message = Message::default();
            let (peer, tag) = self.receive(&mut message, None, None)?;

            if !self.is_writer_rank(peer) {
                return Err(TransportError::protocol(format!(
                    "message from non-writer rank {} while draining writers",
                    peer
                )));
            }

            match tag {
                Tag::Statistics => {
                    message.rewind();
                    message.message_received(Tag::Statistics, peer);
                    reports.message_from_writer(&mut message, peer)?;
                    remaining.remove(&peer);
                    outstanding -= 1;
                    info!(
                        writer = peer,
                        left = outstanding,
                        remaining = ?remaining,
                        "statistics from writer"
                    );
                }
                other => {
                    return Err(TransportError::protocol(format!(
                        "expected STATISTICS while draining writers, got {:?}",
                        other
                    )))
                }
            }
        }

        self.statistics.shutdown_time += watch.elapsed();
        Ok(())
    }

    fn initialise(&mut self) -> Result<()> {
        Ok(())
    }

    fn abort(&mut self) {
        self.comm.abort(1);
    }

    fn synchronise(&mut self) -> Result<()> {
        let watch = Stopwatch::start();
        self.comm.barrier()?;
        self.statistics.barrier_time += watch.elapsed();
        Ok(())
    }

    fn is_producer(&self) -> bool {
        self.rank == PRODUCER_RANK
    }

    fn is_single(&self) -> bool {
        self.total_ranks == 1
    }

    fn is_writer(&self) -> bool {
        self.is_writer_rank(self.rank)
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
