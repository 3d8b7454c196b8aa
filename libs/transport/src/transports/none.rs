//! Single-Process Stub Transport
//!
//! Degenerate backend for one-process configurations and tests: it is
//! its own producer, there are no peers, and every message-exchange
//! operation is a hard "not implemented".

use config::Args;
use std::fmt;

use crate::error::{Result, TransportError};
use crate::message::Message;
use crate::statistics::TransportStatistics;
use crate::transports::{PeerReports, Transport};

pub struct NoTransport {
    statistics: TransportStatistics,
    title: String,
    id: String,
}

impl NoTransport {
    pub fn new(_args: &Args) -> Self {
        let pid = std::process::id();
        Self {
            statistics: TransportStatistics::new(),
            title: format!("Single-{}", pid),
            id: pid.to_string(),
        }
    }

    pub fn from_args(args: &Args) -> Result<Box<dyn Transport>> {
        Ok(Box::new(Self::new(args)))
    }

    fn unimplemented(&self, feature: &str) -> TransportError {
        TransportError::not_implemented(feature, "none")
    }
}

impl fmt::Debug for NoTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoTransport[{}]", self.title)
    }
}

impl Transport for NoTransport {
    fn send_message_to_next_worker(&mut self, _message: &Message) -> Result<()> {
        Err(self.unimplemented("send_message_to_next_worker"))
    }

    fn get_next_work_message(&mut self, _message: &mut Message) -> Result<()> {
        Err(self.unimplemented("get_next_work_message"))
    }

    fn send_statistics_to_producer(&mut self, _message: &Message) -> Result<()> {
        Err(self.unimplemented("send_statistics_to_producer"))
    }

    fn send_to_writer(&mut self, _writer: usize, _message: &Message) -> Result<()> {
        Err(self.unimplemented("send_to_writer"))
    }

    fn get_next_write_message(&mut self, _message: &mut Message) -> Result<()> {
        Err(self.unimplemented("get_next_write_message"))
    }

    fn send_shutdown_message(&mut self, _reports: &mut dyn PeerReports) -> Result<()> {
        Err(self.unimplemented("send_shutdown_message"))
    }

    fn initialise(&mut self) -> Result<()> {
        Ok(())
    }

    fn abort(&mut self) {}

    fn synchronise(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_producer(&self) -> bool {
        true
    }

    fn is_single(&self) -> bool {
        true
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
