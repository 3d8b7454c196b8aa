//! In-Process Communicator
//!
//! A complete world of N peers over in-memory mailboxes. Each rank runs
//! on its own thread; each mailbox is a mutex/condvar queue with
//! probe-without-consume semantics, which is exactly the contract the
//! cluster transport needs from a real collective backend.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use tracing::error;

use super::{Communicator, Envelope};
use crate::error::{Result, TransportError};
use crate::PeerId;

struct Packet {
    source: PeerId,
    tag: i32,
    data: Vec<u8>,
}

#[derive(Default)]
struct Mailbox {
    queue: Mutex<VecDeque<Packet>>,
    arrived: Condvar,
}

struct World {
    mailboxes: Vec<Mailbox>,
    barrier: Barrier,
    aborted: AtomicBool,
}

/// One rank's handle onto an in-process world.
pub struct ChannelCommunicator {
    world: Arc<World>,
    rank: usize,
}

impl ChannelCommunicator {
    /// Build a world of `size` peers; one communicator per rank.
    pub fn world(size: usize) -> Vec<Self> {
        assert!(size > 0, "a world needs at least one peer");
        let world = Arc::new(World {
            mailboxes: (0..size).map(|_| Mailbox::default()).collect(),
            barrier: Barrier::new(size),
            aborted: AtomicBool::new(false),
        });
        (0..size)
            .map(|rank| Self {
                world: Arc::clone(&world),
                rank,
            })
            .collect()
    }

    fn check_alive(&self) -> Result<()> {
        if self.world.aborted.load(Ordering::Acquire) {
            return Err(TransportError::connection("world aborted", None));
        }
        Ok(())
    }

    fn matches(packet: &Packet, source: Option<PeerId>, tag: Option<i32>) -> bool {
        source.map_or(true, |s| packet.source == s) && tag.map_or(true, |t| packet.tag == t)
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.mailboxes.len()
    }

    fn processor_name(&self) -> String {
        "local".to_string()
    }

    fn send(&self, data: &[u8], target: PeerId, tag: i32) -> Result<()> {
        self.check_alive()?;
        let mailbox = self
            .world
            .mailboxes
            .get(target)
            .ok_or_else(|| TransportError::connection("no such rank", Some(target)))?;

        let mut queue = mailbox.queue.lock();
        queue.push_back(Packet {
            source: self.rank,
            tag,
            data: data.to_vec(),
        });
        mailbox.arrived.notify_all();
        Ok(())
    }

    fn probe(&self, source: Option<PeerId>, tag: Option<i32>) -> Result<Envelope> {
        let mailbox = &self.world.mailboxes[self.rank];
        let mut queue = mailbox.queue.lock();
        loop {
            self.check_alive()?;
            if let Some(packet) = queue.iter().find(|p| Self::matches(p, source, tag)) {
                return Ok(Envelope {
                    source: packet.source,
                    tag: packet.tag,
                    size: packet.data.len(),
                });
            }
            mailbox.arrived.wait(&mut queue);
        }
    }

    fn receive(&self, buf: &mut [u8], source: PeerId, tag: i32) -> Result<usize> {
        let mailbox = &self.world.mailboxes[self.rank];
        let mut queue = mailbox.queue.lock();
        loop {
            self.check_alive()?;
            if let Some(index) = queue
                .iter()
                .position(|p| Self::matches(p, Some(source), Some(tag)))
            {
                let packet = queue.remove(index).expect("indexed packet present");
                if buf.len() < packet.data.len() {
                    return Err(TransportError::consistency(format!(
                        "receive buffer of {} bytes cannot hold {} byte payload",
                        buf.len(),
                        packet.data.len()
                    )));
                }
                buf[..packet.data.len()].copy_from_slice(&packet.data);
                return Ok(packet.data.len());
            }
            mailbox.arrived.wait(&mut queue);
        }
    }

    fn barrier(&self) -> Result<()> {
        self.check_alive()?;
        self.world.barrier.wait();
        Ok(())
    }

    fn abort(&self, code: i32) {
        error!(code, rank = self.rank, "aborting in-process world");
        self.world.aborted.store(true, Ordering::Release);
        for mailbox in &self.world.mailboxes {
            // Wake every blocked peer so it observes the aborted flag.
            let _queue = mailbox.queue.lock();
            mailbox.arrived.notify_all();
        }
    }
}
