//! Per-Peer Transport Statistics
//!
//! Every transport owns one accumulator; workers encode theirs into the
//! STATISTICS payload at shutdown and the producer folds them together.
//! Combination is associative (`+=`), and `/=` turns a folded total into
//! a per-peer average. Note the asymmetric division policy: message
//! counters round to the nearest integer, byte and time fields divide
//! exactly. Averages of counters are only indicative; byte/time totals
//! must reconstruct exactly.

use codec::{ReadStream, WriteStream};
use std::fmt;
use std::ops::{AddAssign, DivAssign};
use std::time::{Duration, Instant};

/// Simple elapsed-time helper for phase timings.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Counters and phase timings for one peer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransportStatistics {
    pub send_count: u64,
    pub receive_count: u64,

    /// Bytes sent/received. Kept as floats so that averaging across
    /// peers divides exactly.
    pub send_size: f64,
    pub receive_size: f64,

    pub send_time: Duration,
    pub receive_time: Duration,
    pub barrier_time: Duration,
    pub shutdown_time: Duration,
}

fn div_round(count: u64, n: u32) -> u64 {
    (count as f64 / n as f64).round() as u64
}

impl TransportStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_send(&mut self, bytes: usize, elapsed: Duration) {
        self.send_count += 1;
        self.send_size += bytes as f64;
        self.send_time += elapsed;
    }

    pub fn record_receive(&mut self, bytes: usize, elapsed: Duration) {
        self.receive_count += 1;
        self.receive_size += bytes as f64;
        self.receive_time += elapsed;
    }

    /// Serialize into a byte stream (the STATISTICS payload).
    pub fn encode<W: WriteStream>(&self, out: &mut W) -> codec::Result<()> {
        out.write_u64(self.send_count)?;
        out.write_u64(self.receive_count)?;
        out.write_f64(self.send_size)?;
        out.write_f64(self.receive_size)?;
        out.write_f64(self.send_time.as_secs_f64())?;
        out.write_f64(self.receive_time.as_secs_f64())?;
        out.write_f64(self.barrier_time.as_secs_f64())?;
        out.write_f64(self.shutdown_time.as_secs_f64())?;
        Ok(())
    }

    /// Decode a statistics payload produced by [`encode`](Self::encode).
    pub fn decode<R: ReadStream>(input: &mut R) -> codec::Result<Self> {
        Ok(Self {
            send_count: input.read_u64()?,
            receive_count: input.read_u64()?,
            send_size: input.read_f64()?,
            receive_size: input.read_f64()?,
            send_time: Duration::from_secs_f64(input.read_f64()?),
            receive_time: Duration::from_secs_f64(input.read_f64()?),
            barrier_time: Duration::from_secs_f64(input.read_f64()?),
            shutdown_time: Duration::from_secs_f64(input.read_f64()?),
        })
    }

    /// Column names, matching [`csv_row`](Self::csv_row) field for field.
    pub fn csv_header() -> String {
        [
            "send_count",
            "send_bytes",
            "send_seconds",
            "receive_count",
            "receive_bytes",
            "receive_seconds",
            "barrier_seconds",
            "shutdown_seconds",
        ]
        .join(",")
    }

    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.send_count,
            self.send_size,
            self.send_time.as_secs_f64(),
            self.receive_count,
            self.receive_size,
            self.receive_time.as_secs_f64(),
            self.barrier_time.as_secs_f64(),
            self.shutdown_time.as_secs_f64(),
        )
    }
}

impl AddAssign<&TransportStatistics> for TransportStatistics {
    fn add_assign(&mut self, other: &TransportStatistics) {
        self.send_count += other.send_count;
        self.receive_count += other.receive_count;
        self.send_size += other.send_size;
        self.receive_size += other.receive_size;
        self.send_time += other.send_time;
        self.receive_time += other.receive_time;
        self.barrier_time += other.barrier_time;
        self.shutdown_time += other.shutdown_time;
    }
}

impl DivAssign<u32> for TransportStatistics {
    /// Average across `n` peers. Counters round, byte/time fields divide
    /// exactly.
    fn div_assign(&mut self, n: u32) {
        self.send_count = div_round(self.send_count, n);
        self.receive_count = div_round(self.receive_count, n);
        self.send_size /= n as f64;
        self.receive_size /= n as f64;
        self.send_time = self.send_time.div_f64(n as f64);
        self.receive_time = self.receive_time.div_f64(n as f64);
        self.barrier_time = self.barrier_time.div_f64(n as f64);
        self.shutdown_time = self.shutdown_time.div_f64(n as f64);
    }
}

fn rate(bytes: f64, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        format!(", {:.1} bytes/s", bytes / secs)
    } else {
        String::new()
    }
}

impl fmt::Display for TransportStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "sent {} messages, {} bytes in {:?}{}",
            self.send_count,
            self.send_size,
            self.send_time,
            rate(self.send_size, self.send_time)
        )?;
        writeln!(
            f,
            "received {} messages, {} bytes in {:?}{}",
            self.receive_count,
            self.receive_size,
            self.receive_time,
            rate(self.receive_size, self.receive_time)
        )?;
        writeln!(f, "barrier {:?}, shutdown {:?}", self.barrier_time, self.shutdown_time)
    }
}
