//! Producer Role
//!
//! State machine: Init → Producing → Draining → Done. The domain task
//! fills messages one at a time; dispatch goes to whichever worker is
//! ready, not to a chosen target. Errors out of `produce` are fatal by
//! design — there is no half-produced recovery.

use tracing::info;
use transport::{Message, PeerReports, Tag, Transport, TransportError};

/// Domain side of the producer: fill the next work message, and receive
/// the per-peer reports collected during the shutdown drain.
pub trait Produce: PeerReports {
    /// Fill `message` with the next work item. Return `false` when
    /// production is over; the message is not sent in that case.
    fn produce(&mut self, message: &mut Message) -> Result<bool, TransportError>;
}

/// Drive a full producer lifetime over `transport`.
pub fn run_producer<P: Produce>(
    transport: &mut dyn Transport,
    task: &mut P,
) -> Result<(), TransportError> {
    transport.initialise()?;

    let mut message = Message::new(Tag::Work, transport::BUFFER_ROUNDING);
    let mut produced = 0u64;

    while task.produce(&mut message)? {
        transport.send_message_to_next_worker(&message)?;
        message.rewind();
        produced += 1;
    }

    info!(
        title = %transport.title(),
        produced,
        "production complete, draining peers"
    );
    transport.send_shutdown_message(task)?;

    transport.synchronise()?;
    info!(title = %transport.title(), "producer finished");
    Ok(())
}
