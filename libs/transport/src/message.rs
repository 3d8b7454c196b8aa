//! Reusable Message Buffer
//!
//! One `Message` travels through an actor's whole life: the producer
//! fills it, sends it, rewinds it and fills it again; a worker receives
//! into it, decodes it and hands it back to the loop. The buffer only
//! ever grows, in fixed 1 MiB units, so steady-state traffic allocates
//! nothing.
//!
//! The `blob` escape hatch hands out the raw unread tail for callers
//! that frame their own payload. It is one-way: after `blob()` the
//! typed cursor is no longer meaningful, so any structured read or
//! write before the next `rewind()` is a programming error and panics.

use bytes::BytesMut;
use num_enum::TryFromPrimitive;
use once_cell::sync::Lazy;

use crate::error::{Result, TransportError};
use crate::PeerId;

/// Buffer capacity is rounded up to multiples of this unit.
pub const BUFFER_ROUNDING: usize = 1024 * 1024;

/// Protocol message tags. The integer values are a stable wire contract
/// shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
pub enum Tag {
    Ready = 0,
    Work = 1,
    Shutdown = 2,
    Open = 3,
    Write = 4,
    Close = 5,
    Statistics = 6,
    Bye = 7,
}

impl Tag {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Decode a wire tag; out-of-range values are a protocol error.
    pub fn from_wire(value: u32) -> Result<Self> {
        Tag::try_from(value)
            .map_err(|_| TransportError::protocol(format!("unknown wire tag {}", value)))
    }
}

/// Growable byte buffer with a tag, a source peer and a read/write cursor.
#[derive(Debug)]
pub struct Message {
    tag: Tag,
    source: Option<PeerId>,
    buffer: BytesMut,
    position: usize,
    blob: bool,
}

fn rounded(size: usize) -> usize {
    size.max(1).div_ceil(BUFFER_ROUNDING) * BUFFER_ROUNDING
}

static READY_MESSAGE: Lazy<Message> = Lazy::new(|| Message::sentinel(Tag::Ready));
static SHUTDOWN_MESSAGE: Lazy<Message> = Lazy::new(|| Message::sentinel(Tag::Shutdown));

impl Message {
    /// Allocate a message with at least `size` bytes of capacity.
    pub fn new(tag: Tag, size: usize) -> Self {
        Self {
            tag,
            source: None,
            buffer: BytesMut::zeroed(rounded(size)),
            position: 0,
            blob: false,
        }
    }

    fn sentinel(tag: Tag) -> Self {
        let mut message = Message::new(tag, 1);
        message.write(&[tag.as_u32() as u8]);
        message
    }

    /// Shared READY sentinel: short fixed payload, allocated once.
    pub fn ready_message() -> &'static Message {
        &READY_MESSAGE
    }

    /// Shared SHUTDOWN sentinel: short fixed payload, allocated once.
    pub fn shutdown_message() -> &'static Message {
        &SHUTDOWN_MESSAGE
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn set_tag(&mut self, tag: Tag) {
        self.tag = tag;
    }

    /// Peer the message was received from; `None` until a receive.
    pub fn source(&self) -> Option<PeerId> {
        self.source
    }

    /// Bytes written so far (the payload length for a send).
    pub fn message_size(&self) -> usize {
        self.position
    }

    /// Total capacity of the underlying buffer.
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// The payload to put on the wire.
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.position]
    }

    /// Full-capacity view for transports receiving straight off the wire.
    pub(crate) fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Reset the cursor and leave blob mode.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.blob = false;
    }

    /// Grow the buffer (in rounding units) so that capacity >= `size`.
    /// Never shrinks.
    pub fn reserve(&mut self, size: usize) {
        if self.buffer.len() < size {
            self.buffer.resize(rounded(size), 0);
        }
    }

    /// Append bytes at the cursor, growing as needed.
    pub fn write(&mut self, data: &[u8]) {
        assert!(
            !self.blob,
            "structured write on a message in blob mode (missing rewind?)"
        );
        let end = self.position + data.len();
        self.reserve(end);
        assert!(
            end <= self.buffer.len(),
            "message buffer cannot hold {} bytes after growth",
            end
        );
        self.buffer[self.position..end].copy_from_slice(data);
        self.position = end;
    }

    /// Copy up to `out.len()` bytes from the cursor, bounded by the
    /// remaining capacity. Returns how many bytes were copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        assert!(
            !self.blob,
            "structured read on a message in blob mode (missing rewind?)"
        );
        let n = out.len().min(self.buffer.len() - self.position);
        out[..n].copy_from_slice(&self.buffer[self.position..self.position + n]);
        self.position += n;
        n
    }

    /// Raw unread tail of the buffer. Enters blob mode: structured
    /// read/write is forbidden until the next `rewind()`.
    pub fn blob(&mut self) -> &[u8] {
        self.blob = true;
        &self.buffer[self.position..]
    }

    /// Whether the message is in blob mode.
    pub fn is_blob(&self) -> bool {
        self.blob
    }

    /// Book-keeping after a transport receive: reset the cursor and
    /// record where the payload came from.
    pub fn message_received(&mut self, tag: Tag, source: PeerId) {
        self.position = 0;
        self.tag = tag;
        self.source = Some(source);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.tag == Tag::Shutdown
    }
}

impl Default for Message {
    /// Scratch receive buffer of one rounding unit.
    fn default() -> Self {
        Message::new(Tag::Ready, BUFFER_ROUNDING)
    }
}

impl codec::WriteStream for Message {
    fn write_bytes(&mut self, data: &[u8]) -> codec::Result<()> {
        self.write(data);
        Ok(())
    }
}

impl codec::ReadStream for Message {
    fn read_bytes(&mut self, out: &mut [u8]) -> codec::Result<usize> {
        Ok(self.read(out))
    }
}
