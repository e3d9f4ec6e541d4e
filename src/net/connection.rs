//! Connection state machine (C5) over a raw non-blocking socket. Grounded on
//! the `DoRead`/`DoWrite` read/write loops of the lineage's non-blocking
//! multi-threaded connection, restated against the abstract `Parser`/
//! `Command` traits from [`super::parser`] instead of a fixed protocol.

use std::collections::VecDeque;
use std::os::unix::io::RawFd;
use std::sync::Arc;

use crate::storage::Storage;

use super::parser::{Command, Parser, TextCommand};

const READ_BUF_SIZE: usize = 4096;
const OUTPUT_BACKPRESSURE: usize = 64;

/// Event-mask bits a [`super::reactor::Reactor`] should arm for this
/// connection; mirrors `EPOLLIN`/`EPOLLOUT`/`EPOLLRDHUP`/`EPOLLERR`.
pub struct Interest {
    pub readable: bool,
    pub writable: bool,
}

struct PendingCommand {
    command: TextCommand,
    arg_remaining: usize,
    argument: Vec<u8>,
}

pub struct Connection {
    fd: RawFd,
    storage: Arc<dyn Storage>,
    parser: Box<dyn Parser>,
    read_buf: Vec<u8>,
    read_pos: usize,
    pending: Option<PendingCommand>,
    output: VecDeque<Vec<u8>>,
    output_offset: usize,
    running: bool,
    read_enabled: bool,
}

impl Connection {
    pub fn new(fd: RawFd, storage: Arc<dyn Storage>, parser: Box<dyn Parser>) -> Self {
        Self {
            fd,
            storage,
            parser,
            read_buf: vec![0u8; READ_BUF_SIZE],
            read_pos: 0,
            pending: None,
            output: VecDeque::new(),
            output_offset: 0,
            running: true,
            read_enabled: true,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn is_alive(&self) -> bool {
        self.running
    }

    pub fn output_empty(&self) -> bool {
        self.output.is_empty()
    }

    pub fn interest(&self) -> Interest {
        Interest {
            readable: self.read_enabled,
            writable: !self.output.is_empty(),
        }
    }

    /// Drains readable bytes from the socket, framing and executing as many
    /// complete commands as the buffered data allows.
    pub fn do_read(&mut self) {
        loop {
            if self.read_pos == self.read_buf.len() {
                // Buffer saturated with no complete command: per the framing
                // contract we must stop reading here to avoid livelock.
                break;
            }
            let n = unsafe {
                libc::read(
                    self.fd,
                    self.read_buf[self.read_pos..].as_mut_ptr() as *mut libc::c_void,
                    self.read_buf.len() - self.read_pos,
                )
            };
            if n > 0 {
                self.read_pos += n as usize;
                self.drain_buffer();
                continue;
            }
            if n == 0 {
                self.running = false;
                break;
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                break;
            }
            tracing::warn!(component = "connection", event = "read_error", fd = self.fd, error = %err);
            self.running = false;
            break;
        }
    }

    fn drain_buffer(&mut self) {
        loop {
            if let Some(mut pending) = self.pending.take() {
                if pending.arg_remaining > 0 {
                    let take = pending.arg_remaining.min(self.read_pos);
                    if take == 0 {
                        self.pending = Some(pending);
                        break;
                    }
                    pending.argument.extend_from_slice(&self.read_buf[..take]);
                    self.compact(take);
                    pending.arg_remaining -= take;
                    if pending.arg_remaining > 0 {
                        self.pending = Some(pending);
                        break;
                    }
                }
                // Argument bytes (if any) are followed by a trailing \r\n,
                // already accounted for in arg_remaining by the caller.
                let argument = strip_trailing_crlf(&pending.argument);
                let mut response = Vec::new();
                pending.command.execute(&*self.storage, argument, &mut response);
                self.enqueue_response(response);
                continue;
            }

            let (consumed, header) = self.parser.parse(&self.read_buf[..self.read_pos]);
            if consumed == 0 && header.is_none() {
                break;
            }
            self.compact(consumed);
            let Some(header) = header else {
                continue;
            };
            if header.arg_length == 0 {
                let mut response = Vec::new();
                header.command.execute(&*self.storage, &[], &mut response);
                self.enqueue_response(response);
                continue;
            }
            self.pending = Some(PendingCommand {
                command: header.command,
                // +2 for the trailing \r\n after the argument bytes.
                arg_remaining: header.arg_length + 2,
                argument: Vec::with_capacity(header.arg_length + 2),
            });
        }
    }

    fn compact(&mut self, consumed: usize) {
        if consumed == 0 {
            return;
        }
        self.read_buf.copy_within(consumed..self.read_pos, 0);
        self.read_pos -= consumed;
    }

    fn enqueue_response(&mut self, mut response: Vec<u8>) {
        response.extend_from_slice(b"\r\n");
        self.output.push_back(response);
        if self.output.len() > OUTPUT_BACKPRESSURE {
            self.read_enabled = false;
        }
    }

    /// Issues a vectored write of the queued responses, advancing the queue
    /// and re-asserting read readiness once backpressure clears.
    pub fn do_write(&mut self) {
        while !self.output.is_empty() {
            let batch = self.output.len().min(OUTPUT_BACKPRESSURE);
            let mut iovecs: Vec<libc::iovec> = Vec::with_capacity(batch);
            for (i, chunk) in self.output.iter().take(batch).enumerate() {
                let base = if i == 0 { self.output_offset } else { 0 };
                iovecs.push(libc::iovec {
                    iov_base: chunk[base..].as_ptr() as *mut libc::c_void,
                    iov_len: chunk.len() - base,
                });
            }
            let n = unsafe { libc::writev(self.fd, iovecs.as_ptr(), iovecs.len() as i32) };
            if n < 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    break;
                }
                tracing::warn!(component = "connection", event = "write_error", fd = self.fd, error = %err);
                self.running = false;
                break;
            }
            let mut written = n as usize;
            while written > 0 {
                let front_len = self.output[0].len() - self.output_offset;
                if written < front_len {
                    self.output_offset += written;
                    written = 0;
                } else {
                    written -= front_len;
                    self.output.pop_front();
                    self.output_offset = 0;
                }
            }
            if (n as usize) < iovecs.iter().map(|v| v.iov_len).sum::<usize>() {
                // Partial write: stop until the next writable event.
                break;
            }
        }
        if self.output.len() <= OUTPUT_BACKPRESSURE {
            self.read_enabled = true;
        }
    }

    pub fn on_error(&mut self) {
        self.running = false;
    }

    pub fn on_close(&mut self) {
        self.running = false;
    }
}

fn strip_trailing_crlf(buf: &[u8]) -> &[u8] {
    buf.strip_suffix(b"\r\n").unwrap_or(buf)
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod connection_test;
