//! # Taskfarm Transport Layer
//!
//! Work distribution between one producer process, a pool of worker
//! processes and (on the collective backend) a pool of writer
//! processes, behind one blocking [`Transport`] abstraction.
//!
//! ## Architecture Role
//!
//! ```text
//! config → [transport] ← codec
//!              ↑
//!           actors
//! ```
//!
//! Three backends share the trait and the tag vocabulary:
//! - `none` — single-process stub, every exchange unimplemented
//! - `mpi`  — rank-based collective backend over a [`cluster::Communicator`]
//! - `tcp`  — socket backend where the producer is a server
//!
//! Backends are selected by name at startup through the
//! [`registry`]; unknown names fail fast listing the valid ones.
//!
//! ## Protocol sketch
//!
//! Workers announce READY and block; the producer replies WORK to
//! whichever worker spoke first, or SHUTDOWN once production ends.
//! Shutdown completes only after every peer's STATISTICS report has
//! been observed exactly once. Writers skip the handshake entirely:
//! OPEN/WRITE/CLOSE frames go to a logical writer index.

pub mod cluster;
pub mod error;
pub mod logging;
pub mod message;
pub mod registry;
pub mod select;
pub mod statistics;
pub mod transports;

// Re-export key types for convenience
pub use error::{Result, TransportError};
pub use message::{Message, Tag, BUFFER_ROUNDING};
pub use registry::create;
pub use select::Select;
pub use statistics::{Stopwatch, TransportStatistics};
pub use transports::{MpiTransport, NoTransport, PeerReports, TcpTransport, Transport};

/// Opaque peer identity assigned by the transport: a rank on the
/// collective backend, a connection sequence number on the socket
/// backend.
pub type PeerId = usize;
