//! # Taskfarm Actor Roles
//!
//! The three roles of the work-distribution protocol as free functions
//! over a [`Transport`](transport::Transport) capability object — no
//! actor class hierarchy:
//!
//! - [`run_producer`]: Init → Producing → Draining → Done
//! - [`run_consumer`]: Ready → {Consuming | ShuttingDown} loop
//! - [`run_writer`]: write-session loop (collective backend only)
//!
//! Domain logic plugs in through the [`Produce`], [`Consume`] and
//! [`Store`] traits. The consumer loop is the only place where a
//! domain failure is absorbed: a `TaskError::Failed` costs one work
//! item and a `failure()` callback, nothing more.

pub mod consumer;
pub mod error;
pub mod producer;
pub mod writer;

pub use consumer::{run_consumer, Consume};
pub use error::TaskError;
pub use producer::{run_producer, Produce};
pub use writer::{run_writer, Store};

// The reports hook lives with the transport (shutdown drains through
// it); re-exported here because producer tasks implement it.
pub use transport::PeerReports;
