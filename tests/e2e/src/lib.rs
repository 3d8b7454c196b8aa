//! Shared harness for the end-to-end farm tests.
//!
//! One "process" per thread: the producer thread drives
//! `run_producer`, each worker thread drives `run_consumer`, writers
//! drive `run_writer`. Observable state lives behind `Arc` so the test
//! body can assert after joining.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use actors::{Consume, PeerReports, Produce, Store, TaskError};
use codec::{ReadStream, WriteStream};
use transport::{Message, PeerId, Result, Tag, Transport, TransportError};

/// Everything the worker side records, shared across threads.
#[derive(Debug, Default)]
pub struct FarmState {
    pub consumed: Mutex<Vec<String>>,
    pub failures: Mutex<u32>,
    pub shutdowns: Mutex<u32>,
    pub opens: Mutex<u32>,
    pub writes: Mutex<Vec<String>>,
    pub closes: Mutex<u32>,
}

impl FarmState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sorted_consumed(&self) -> Vec<String> {
        let mut items = self.consumed.lock().clone();
        items.sort();
        items
    }
}

/// Producer task emitting `items` work messages, counting the reports
/// that come back during the shutdown drain.
pub struct ItemSource {
    pub items: u32,
    emitted: u32,
    /// Sleep between items, to stretch production over a test window.
    pub pause: Option<std::time::Duration>,
    pub worker_reports: BTreeMap<PeerId, u32>,
    pub writer_reports: BTreeMap<PeerId, u32>,
}

impl ItemSource {
    pub fn new(items: u32) -> Self {
        Self {
            items,
            emitted: 0,
            pause: None,
            worker_reports: BTreeMap::new(),
            writer_reports: BTreeMap::new(),
        }
    }
}

impl PeerReports for ItemSource {
    fn message_from_worker(&mut self, message: &mut Message, worker: PeerId) -> Result<()> {
        let ack = message.read_string().map_err(TransportError::from)?;
        tracing::debug!(worker, %ack, "worker report");
        *self.worker_reports.entry(worker).or_insert(0) += 1;
        Ok(())
    }

    fn message_from_writer(&mut self, message: &mut Message, writer: PeerId) -> Result<()> {
        let ack = message.read_string().map_err(TransportError::from)?;
        tracing::debug!(writer, %ack, "writer report");
        *self.writer_reports.entry(writer).or_insert(0) += 1;
        Ok(())
    }
}

impl Produce for ItemSource {
    fn produce(&mut self, message: &mut Message) -> std::result::Result<bool, TransportError> {
        if self.emitted == self.items {
            return Ok(false);
        }
        if let Some(pause) = self.pause {
            std::thread::sleep(pause);
        }
        self.emitted += 1;
        message
            .write_string(&format!("item-{}", self.emitted))
            .map_err(TransportError::from)?;
        Ok(true)
    }
}

/// Worker task recording what it processes into shared [`FarmState`].
pub struct FarmWorker {
    pub state: Arc<FarmState>,
    /// Item payload that fails with a recoverable error.
    pub fail_on: Option<String>,
    /// Stream each item through an OPEN/WRITE/CLOSE session to this
    /// writer index.
    pub write_to: Option<usize>,
}

impl FarmWorker {
    pub fn new(state: Arc<FarmState>) -> Self {
        Self {
            state,
            fail_on: None,
            write_to: None,
        }
    }

    fn send_session(
        &self,
        transport: &mut dyn Transport,
        writer: usize,
        item: &str,
    ) -> std::result::Result<(), TaskError> {
        let mut frame = Message::new(Tag::Open, 64);
        frame.write_string(item).map_err(TransportError::from)?;
        transport.send_to_writer(writer, &frame)?;

        let mut frame = Message::new(Tag::Write, 64);
        frame.write_string(item).map_err(TransportError::from)?;
        transport.send_to_writer(writer, &frame)?;

        let mut frame = Message::new(Tag::Close, 64);
        frame.write_string(item).map_err(TransportError::from)?;
        transport.send_to_writer(writer, &frame)?;

        Ok(())
    }
}

impl Consume for FarmWorker {
    fn consume(
        &mut self,
        transport: &mut dyn Transport,
        message: &mut Message,
    ) -> std::result::Result<(), TaskError> {
        let item = message
            .read_string()
            .map_err(|e| TaskError::failed_with_source("undecodable work item", e))?;

        if self.fail_on.as_deref() == Some(item.as_str()) {
            return Err(TaskError::failed(format!("cannot process {}", item)));
        }

        if let Some(writer) = self.write_to {
            self.send_session(transport, writer, &item)?;
        }

        self.state.consumed.lock().push(item);
        Ok(())
    }

    fn failure(&mut self, _message: &mut Message) {
        *self.state.failures.lock() += 1;
    }

    fn shutdown(&mut self, message: &mut Message) -> Result<()> {
        *self.state.shutdowns.lock() += 1;
        message.write_string("OK").map_err(TransportError::from)?;
        Ok(())
    }
}

/// Writer task recording session frames into shared [`FarmState`].
pub struct FarmWriter {
    pub state: Arc<FarmState>,
}

impl Store for FarmWriter {
    fn open(&mut self, message: &mut Message) -> std::result::Result<(), TaskError> {
        message
            .read_string()
            .map_err(|e| TaskError::failed_with_source("undecodable open frame", e))?;
        *self.state.opens.lock() += 1;
        Ok(())
    }

    fn write(&mut self, message: &mut Message) -> std::result::Result<(), TaskError> {
        let item = message
            .read_string()
            .map_err(|e| TaskError::failed_with_source("undecodable write frame", e))?;
        self.state.writes.lock().push(item);
        Ok(())
    }

    fn close(&mut self, message: &mut Message) -> std::result::Result<(), TaskError> {
        message
            .read_string()
            .map_err(|e| TaskError::failed_with_source("undecodable close frame", e))?;
        *self.state.closes.lock() += 1;
        Ok(())
    }
}

/// The payloads a farm of `items` work items should have consumed.
pub fn expected_items(items: u32) -> Vec<String> {
    let mut expected: Vec<String> = (1..=items).map(|i| format!("item-{}", i)).collect();
    expected.sort();
    expected
}
