//! Consumer Role
//!
//! The worker loop: announce READY, block for WORK or SHUTDOWN,
//! dispatch to the domain task. A failed task loses one work item, not
//! the worker — only `TaskError::Failed` is absorbed; everything else
//! terminates the loop.

use codec::WriteStream;
use tracing::{info, warn};
use transport::{Message, Tag, Transport, TransportError};

use crate::error::TaskError;

/// Domain side of a worker.
///
/// `consume` receives the transport capability object so that tasks can
/// stream output to writers (`send_to_writer`) while processing.
pub trait Consume {
    /// Process one work item.
    fn consume(
        &mut self,
        transport: &mut dyn Transport,
        message: &mut Message,
    ) -> Result<(), TaskError>;

    /// Called once per absorbed `TaskError::Failed`, with the message
    /// that failed. Default: nothing.
    fn failure(&mut self, message: &mut Message) {
        let _ = message;
    }

    /// Fill the final report sent back as the STATISTICS payload.
    fn shutdown(&mut self, message: &mut Message) -> Result<(), TransportError> {
        message.write_string("OK")?;
        Ok(())
    }
}

/// Drive a full worker lifetime over `transport`.
pub fn run_consumer<C: Consume>(
    transport: &mut dyn Transport,
    task: &mut C,
) -> Result<(), TransportError> {
    let mut message = Message::new(Tag::Work, transport::BUFFER_ROUNDING);

    loop {
        message.rewind();
        transport.get_next_work_message(&mut message)?;

        if message.shutdown_requested() {
            info!(title = %transport.title(), "shutdown requested");
            task.shutdown(&mut message)?;
            transport.send_statistics_to_producer(&message)?;
            break;
        }

        match task.consume(&mut *transport, &mut message) {
            Ok(()) => {}
            Err(TaskError::Failed { reason, .. }) => {
                // The worker survives a bad task.
                warn!(title = %transport.title(), %reason, "task failed, continuing");
                task.failure(&mut message);
            }
            Err(TaskError::Fatal(e)) => return Err(e),
        }
    }

    transport.synchronise()?;
    info!(title = %transport.title(), "worker finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::{PeerReports, Result, TransportStatistics};

    /// Feeds a fixed script of work payloads, then SHUTDOWN.
    struct ScriptedTransport {
        work: Vec<Vec<u8>>,
        delivered: usize,
        reported: Vec<Vec<u8>>,
        synchronised: bool,
        statistics: TransportStatistics,
        title: String,
    }

    impl ScriptedTransport {
        fn with_work(work: Vec<Vec<u8>>) -> Self {
            Self {
                work,
                delivered: 0,
                reported: Vec::new(),
                synchronised: false,
                statistics: TransportStatistics::new(),
                title: "Worker-test".to_string(),
            }
        }
    }

    impl std::fmt::Debug for ScriptedTransport {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "ScriptedTransport[{}]", self.title)
        }
    }

    impl Transport for ScriptedTransport {
        fn send_message_to_next_worker(&mut self, _message: &Message) -> Result<()> {
            unreachable!("worker never dispatches")
        }

        fn get_next_work_message(&mut self, message: &mut Message) -> Result<()> {
            if self.delivered < self.work.len() {
                let payload = self.work[self.delivered].clone();
                self.delivered += 1;
                message.rewind();
                message.write(&payload);
                message.rewind();
                message.message_received(Tag::Work, 0);
            } else {
                message.rewind();
                message.message_received(Tag::Shutdown, 0);
            }
            Ok(())
        }

        fn send_statistics_to_producer(&mut self, message: &Message) -> Result<()> {
            self.reported.push(message.payload().to_vec());
            Ok(())
        }

        fn send_to_writer(&mut self, _writer: usize, _message: &Message) -> Result<()> {
            unreachable!()
        }

        fn get_next_write_message(&mut self, _message: &mut Message) -> Result<()> {
            unreachable!()
        }

        fn send_shutdown_message(&mut self, _reports: &mut dyn PeerReports) -> Result<()> {
            unreachable!("worker never drains")
        }

        fn initialise(&mut self) -> Result<()> {
            Ok(())
        }

        fn abort(&mut self) {}

        fn synchronise(&mut self) -> Result<()> {
            self.synchronised = true;
            Ok(())
        }

        fn is_producer(&self) -> bool {
            false
        }

        fn is_single(&self) -> bool {
            false
        }

        fn is_writer(&self) -> bool {
            false
        }

        fn title(&self) -> &str {
            &self.title
        }

        fn id(&self) -> &str {
            "1"
        }

        fn statistics(&self) -> &TransportStatistics {
            &self.statistics
        }

        fn statistics_mut(&mut self) -> &mut TransportStatistics {
            &mut self.statistics
        }
    }

    #[derive(Default)]
    struct RecordingConsumer {
        consumed: Vec<String>,
        failures: u32,
        fail_on: Option<usize>,
    }

    impl Consume for RecordingConsumer {
        fn consume(
            &mut self,
            _transport: &mut dyn Transport,
            message: &mut Message,
        ) -> std::result::Result<(), TaskError> {
            let mut buf = [0u8; 6];
            let n = message.read(&mut buf);
            let item = String::from_utf8_lossy(&buf[..n]).to_string();

            let index = self.consumed.len() + self.failures as usize + 1;
            if self.fail_on == Some(index) {
                return Err(TaskError::failed(format!("cannot process {}", item)));
            }
            self.consumed.push(item);
            Ok(())
        }

        fn failure(&mut self, _message: &mut Message) {
            self.failures += 1;
        }
    }

    fn items(n: usize) -> Vec<Vec<u8>> {
        (1..=n).map(|i| format!("item-{}", i).into_bytes()).collect()
    }

    #[test]
    fn test_consume_until_shutdown() {
        let mut transport = ScriptedTransport::with_work(items(3));
        let mut task = RecordingConsumer::default();

        run_consumer(&mut transport, &mut task).unwrap();

        assert_eq!(task.consumed, vec!["item-1", "item-2", "item-3"]);
        assert_eq!(task.failures, 0);
        assert!(transport.synchronised);
    }

    #[test]
    fn test_default_shutdown_reports_ok() {
        let mut transport = ScriptedTransport::with_work(items(1));
        let mut task = RecordingConsumer::default();

        run_consumer(&mut transport, &mut task).unwrap();

        // Exactly one report, carrying the default length-prefixed "OK".
        assert_eq!(transport.reported.len(), 1);
        let payload = &transport.reported[0];
        assert_eq!(&payload[4..6], b"OK");
    }

    #[test]
    fn test_failed_task_does_not_kill_the_worker() {
        // Item 3 of 5 fails; 4 and 5 are still processed.
        let mut transport = ScriptedTransport::with_work(items(5));
        let mut task = RecordingConsumer {
            fail_on: Some(3),
            ..Default::default()
        };

        run_consumer(&mut transport, &mut task).unwrap();

        assert_eq!(task.consumed, vec!["item-1", "item-2", "item-4", "item-5"]);
        assert_eq!(task.failures, 1);
        assert_eq!(transport.reported.len(), 1);
    }

    #[test]
    fn test_fatal_error_terminates_the_worker() {
        struct FatalConsumer;
        impl Consume for FatalConsumer {
            fn consume(
                &mut self,
                _transport: &mut dyn Transport,
                _message: &mut Message,
            ) -> std::result::Result<(), TaskError> {
                Err(TransportError::protocol("broken invariant").into())
            }
        }

        let mut transport = ScriptedTransport::with_work(items(3));
        let err = run_consumer(&mut transport, &mut FatalConsumer).unwrap_err();

        assert_eq!(err.category(), "protocol");
        // Shutdown never happened, so nothing was reported.
        assert!(transport.reported.is_empty());
    }
}
