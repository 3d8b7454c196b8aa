//! Collective Communication Substrate
//!
//! The cluster transport does not talk to a network library directly; it
//! drives a [`Communicator`]: blocking point-to-point send/receive with
//! probe and a collective barrier, addressed by integer peer rank and
//! integer tag, with any-source/any-tag wildcards. An MPI binding slots
//! in behind this trait without touching the protocol code; the
//! in-process [`ChannelCommunicator`] serves tests and single-node
//! worlds.

pub mod channel;

pub use channel::ChannelCommunicator;

use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::error::{Result, TransportError};
use crate::PeerId;

/// Metadata of a pending message, as reported by `probe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub source: PeerId,
    pub tag: i32,
    pub size: usize,
}

/// Blocking peer-messaging substrate.
///
/// Delivery order is FIFO per (source, tag) pair; the protocol layer
/// depends on that and on nothing more.
pub trait Communicator: Send + Sync {
    /// This peer's rank, `0..size()`.
    fn rank(&self) -> usize;

    /// Total number of peers in the world.
    fn size(&self) -> usize;

    /// Human-readable host identification for titles and logs.
    fn processor_name(&self) -> String;

    /// Blocking send of a byte payload to `target`.
    fn send(&self, data: &[u8], target: PeerId, tag: i32) -> Result<()>;

    /// Block until a message matching the filters is pending and return
    /// its envelope without consuming it. `None` = wildcard.
    fn probe(&self, source: Option<PeerId>, tag: Option<i32>) -> Result<Envelope>;

    /// Blocking receive of the next message from `source` with `tag`
    /// into `buf`. Returns the payload size.
    fn receive(&self, buf: &mut [u8], source: PeerId, tag: i32) -> Result<usize>;

    /// Collective barrier across every peer in the world.
    fn barrier(&self) -> Result<()>;

    /// Tear the world down; peers blocked in this substrate fail.
    fn abort(&self, code: i32);
}

static WORLD: OnceCell<Arc<dyn Communicator>> = OnceCell::new();

/// Install the process-wide world communicator consumed by the "mpi"
/// registry factory. May be called once per process.
pub fn install_world(comm: Arc<dyn Communicator>) -> Result<()> {
    WORLD
        .set(comm)
        .map_err(|_| TransportError::configuration("world communicator already installed", None))
}

/// The installed world communicator, if any.
pub fn world() -> Option<Arc<dyn Communicator>> {
    WORLD.get().cloned()
}
