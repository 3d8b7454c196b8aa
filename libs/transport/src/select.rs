//! Socket Readiness Multiplexer
//!
//! Thin poll(2) wrapper used by the TCP producer to watch the listening
//! socket and every worker connection from a single thread. `ready()`
//! blocks up to the timeout; `set()` then answers "was this descriptor
//! readable in the last poll".

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::collections::HashSet;
use std::os::fd::BorrowedFd;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

use crate::error::{Result, TransportError};

#[derive(Debug, Default)]
pub struct Select {
    watched: Vec<RawFd>,
    readable: HashSet<RawFd>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a descriptor.
    pub fn add(&mut self, fd: &impl AsRawFd) {
        let raw = fd.as_raw_fd();
        if !self.watched.contains(&raw) {
            self.watched.push(raw);
        }
    }

    /// Stop watching a descriptor.
    pub fn remove(&mut self, fd: &impl AsRawFd) {
        let raw = fd.as_raw_fd();
        self.watched.retain(|watched| *watched != raw);
        self.readable.remove(&raw);
    }

    /// Block until at least one watched descriptor is readable or the
    /// timeout expires. Returns whether anything became ready.
    pub fn ready(&mut self, timeout: Duration) -> Result<bool> {
        self.readable.clear();

        if self.watched.is_empty() {
            std::thread::sleep(timeout);
            return Ok(false);
        }

        // poll(2) takes millisecond timeouts; cap at what PollTimeout
        // can carry (~65 s), far above the dispatch poll interval.
        let millis = timeout.as_millis().min(u16::MAX as u128) as u16;

        let ready_count = loop {
            let mut fds: Vec<PollFd> = self
                .watched
                .iter()
                .map(|raw| {
                    PollFd::new(unsafe { BorrowedFd::borrow_raw(*raw) }, PollFlags::POLLIN)
                })
                .collect();

            match poll(&mut fds, PollTimeout::from(millis)) {
                Ok(n) => {
                    let interesting =
                        PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
                    for (raw, fd) in self.watched.iter().zip(fds.iter()) {
                        if fd
                            .revents()
                            .map(|revents| revents.intersects(interesting))
                            .unwrap_or(false)
                        {
                            self.readable.insert(*raw);
                        }
                    }
                    break n;
                }
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(TransportError::Io {
                        message: format!("poll failed: {}", errno),
                        source: std::io::Error::from_raw_os_error(errno as i32),
                    })
                }
            }
        };

        Ok(ready_count > 0)
    }

    /// Whether `fd` was readable in the last `ready()` pass.
    pub fn set(&self, fd: &impl AsRawFd) -> bool {
        self.readable.contains(&fd.as_raw_fd())
    }
}
