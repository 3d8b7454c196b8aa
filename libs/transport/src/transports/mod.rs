//! Unified Transport Layer
//!
//! One abstraction over three structurally different ways of moving work
//! between peers: a single-process stub, a rank-based collective backend
//! and a socket backend where the producer is a server. Role loops only
//! ever see this trait.

use crate::error::Result;
use crate::message::Message;
use crate::statistics::TransportStatistics;
use crate::PeerId;
use std::fmt;

pub mod mpi;
pub mod none;
pub mod tcp;

// Re-export transport types
pub use mpi::MpiTransport;
pub use none::NoTransport;
pub use tcp::TcpTransport;

/// Receiver of the per-peer reports drained during shutdown.
///
/// `send_shutdown_message` forwards every STATISTICS payload through
/// this hook exactly once per peer; the defaults just log the short
/// acknowledgement the stock shutdown hook writes.
pub trait PeerReports {
    fn message_from_worker(&mut self, message: &mut Message, worker: PeerId) -> Result<()> {
        let _ = message;
        tracing::debug!(worker, "report from worker");
        Ok(())
    }

    fn message_from_writer(&mut self, message: &mut Message, writer: PeerId) -> Result<()> {
        let _ = message;
        tracing::debug!(writer, "report from writer");
        Ok(())
    }
}

/// Strategy interface every backend implements.
///
/// All operations block the calling thread; there is exactly one thread
/// per peer, so implementations take `&mut self` and need no internal
/// synchronization to protect protocol state.
pub trait Transport: fmt::Debug {
    /// Producer: hand `message` to whichever worker announces READY next.
    fn send_message_to_next_worker(&mut self, message: &Message) -> Result<()>;

    /// Worker: announce READY and block for a WORK or SHUTDOWN reply.
    fn get_next_work_message(&mut self, message: &mut Message) -> Result<()>;

    /// Worker: deliver the final STATISTICS payload to the producer.
    fn send_statistics_to_producer(&mut self, message: &Message) -> Result<()>;

    /// Send a write-session message to the writer with logical index
    /// `writer` (no READY handshake).
    fn send_to_writer(&mut self, writer: usize, message: &Message) -> Result<()>;

    /// Writer: block for the next write-session message.
    fn get_next_write_message(&mut self, message: &mut Message) -> Result<()>;

    /// Producer: drain every worker and writer. Returns only after each
    /// outstanding peer has been sent SHUTDOWN and its STATISTICS report
    /// has been forwarded to `reports` exactly once.
    fn send_shutdown_message(&mut self, reports: &mut dyn PeerReports) -> Result<()>;

    fn initialise(&mut self) -> Result<()>;

    /// Tear down backend state unconditionally.
    fn abort(&mut self);

    /// Global barrier; a no-op outside the collective backend.
    fn synchronise(&mut self) -> Result<()>;

    fn is_producer(&self) -> bool;
    fn is_single(&self) -> bool;
    fn is_writer(&self) -> bool;

    /// Human-readable role title, e.g. `Worker-3@node7`.
    fn title(&self) -> &str;

    /// Stable peer identifier for logs and report files.
    fn id(&self) -> &str;

    fn statistics(&self) -> &TransportStatistics;
    fn statistics_mut(&mut self) -> &mut TransportStatistics;
}
