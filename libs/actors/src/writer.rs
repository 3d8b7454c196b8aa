//! Writer Role
//!
//! Writers never take part in the READY handshake: workers address them
//! directly by logical index with OPEN/WRITE/CLOSE frames, and the
//! producer shuts them down last, after every worker has drained. Only
//! the collective backend carries writers.

use codec::WriteStream;
use tracing::{info, warn};
use transport::{Message, Tag, Transport, TransportError};

use crate::error::TaskError;

/// Domain side of a writer: one output session per OPEN/CLOSE pair.
pub trait Store {
    fn open(&mut self, message: &mut Message) -> Result<(), TaskError>;

    fn write(&mut self, message: &mut Message) -> Result<(), TaskError>;

    fn close(&mut self, message: &mut Message) -> Result<(), TaskError>;

    /// Fill the final report sent back as the STATISTICS payload.
    fn shutdown(&mut self, message: &mut Message) -> Result<(), TransportError> {
        message.write_string("OK")?;
        Ok(())
    }
}

/// Drive a full writer lifetime over `transport`.
pub fn run_writer<S: Store>(
    transport: &mut dyn Transport,
    task: &mut S,
) -> Result<(), TransportError> {
    let mut message = Message::new(Tag::Write, transport::BUFFER_ROUNDING);

    loop {
        message.rewind();
        transport.get_next_write_message(&mut message)?;

        if message.shutdown_requested() {
            info!(title = %transport.title(), "shutdown requested");
            task.shutdown(&mut message)?;
            transport.send_statistics_to_producer(&message)?;
            break;
        }

        let outcome = match message.tag() {
            Tag::Open => task.open(&mut message),
            Tag::Write => task.write(&mut message),
            Tag::Close => task.close(&mut message),
            other => {
                return Err(TransportError::protocol(format!(
                    "unexpected {:?} in the write loop",
                    other
                )))
            }
        };

        match outcome {
            Ok(()) => {}
            Err(TaskError::Failed { reason, .. }) => {
                warn!(title = %transport.title(), %reason, "write step failed, continuing");
            }
            Err(TaskError::Fatal(e)) => return Err(e),
        }
    }

    transport.synchronise()?;
    info!(title = %transport.title(), "writer finished");
    Ok(())
}
