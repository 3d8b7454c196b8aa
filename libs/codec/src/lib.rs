//! # Taskfarm Byte-Stream Codec
//!
//! Sequential typed encode/decode of primitive values and raw buffers over
//! any byte sink/source. This is the wire vocabulary every payload in the
//! system is built from: work items, statistics reports and control frames
//! all encode through these two traits.
//!
//! ## Design
//!
//! - All integers are big-endian (network order).
//! - Strings and raw buffers carry a `u32` length prefix.
//! - `WriteStream`/`ReadStream` have a single primitive method each
//!   (`write_bytes`/`read_bytes`); every typed method is provided on top,
//!   so a new stream type implements exactly one function per direction.
//!
//! ## What This Crate Does NOT Contain
//! - Message framing or tags (belongs in transport)
//! - Socket management or connection handling

pub mod error;

pub use error::{CodecError, Result};

use byteorder::{BigEndian, ByteOrder};

/// Decoded fields announcing more than this many bytes are rejected rather
/// than allocated.
pub const MAX_FIELD_SIZE: usize = 1024 * 1024 * 1024;

/// Sequential typed writer over a byte sink.
pub trait WriteStream {
    /// Append raw bytes to the stream.
    fn write_bytes(&mut self, data: &[u8]) -> Result<()>;

    fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    fn write_u32(&mut self, v: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, v);
        self.write_bytes(&buf)
    }

    fn write_u64(&mut self, v: u64) -> Result<()> {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, v);
        self.write_bytes(&buf)
    }

    fn write_i64(&mut self, v: i64) -> Result<()> {
        let mut buf = [0u8; 8];
        BigEndian::write_i64(&mut buf, v);
        self.write_bytes(&buf)
    }

    fn write_f64(&mut self, v: f64) -> Result<()> {
        let mut buf = [0u8; 8];
        BigEndian::write_f64(&mut buf, v);
        self.write_bytes(&buf)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(v as u8)
    }

    /// Length-prefixed UTF-8 string.
    fn write_string(&mut self, v: &str) -> Result<()> {
        self.write_raw(v.as_bytes())
    }

    /// Length-prefixed raw buffer.
    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.write_u32(data.len() as u32)?;
        self.write_bytes(data)
    }
}

/// Sequential typed reader over a byte source.
pub trait ReadStream {
    /// Copy up to `out.len()` bytes from the stream, returning how many
    /// were actually copied. A short count signals the end of the stream.
    fn read_bytes(&mut self, out: &mut [u8]) -> Result<usize>;

    /// Fill `out` completely or fail with `ShortRead`.
    fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let got = self.read_bytes(out)?;
        if got != out.len() {
            return Err(CodecError::ShortRead {
                wanted: out.len(),
                got,
            });
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u32(&buf))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_u64(&buf))
    }

    fn read_i64(&mut self) -> Result<i64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(BigEndian::read_f64(&buf))
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    /// Length-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let raw = self.read_raw()?;
        String::from_utf8(raw).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Length-prefixed raw buffer.
    fn read_raw(&mut self) -> Result<Vec<u8>> {
        let size = self.read_u32()? as usize;
        if size > MAX_FIELD_SIZE {
            return Err(CodecError::Oversize {
                size,
                limit: MAX_FIELD_SIZE,
            });
        }
        let mut out = vec![0u8; size];
        self.read_exact(&mut out)?;
        Ok(out)
    }
}

impl WriteStream for Vec<u8> {
    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Cursor-style reader over a borrowed byte slice.
pub struct Reader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

impl ReadStream for Reader<'_> {
    fn read_bytes(&mut self, out: &mut [u8]) -> Result<usize> {
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}
