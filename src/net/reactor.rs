//! Event-driven reactor (C6) built on raw epoll. Grounded on the listener/
//! connection readiness loop of the lineage's multi-threaded network layer,
//! restated over `libc` epoll syscalls (the only ecosystem-grounded option
//! in the absence of an `mio`/`tokio`-reactor dependency) instead of that
//! lineage's async runtime.

use std::collections::HashMap;
use std::io;
use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::executor::Executor;
use crate::storage::Storage;

use super::connection::Connection;
use super::parser::LineParser;

const MAX_EVENTS: usize = 1024;

/// Owns a listening socket and the set of live connections. `executor` being
/// `Some` selects the multi-threaded deployment (connection callbacks
/// dispatched to the pool); `None` runs everything inline on this thread.
pub struct Reactor {
    epoll_fd: RawFd,
    listener: TcpListener,
    wake_fd: RawFd,
    storage: Arc<dyn Storage>,
    executor: Option<Arc<Executor>>,
    connections: Mutex<HashMap<RawFd, Arc<Mutex<Connection>>>>,
    cancel: CancellationToken,
}

impl Reactor {
    pub fn bind(
        addr: &str,
        storage: Arc<dyn Storage>,
        executor: Option<Arc<Executor>>,
        cancel: CancellationToken,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let epoll_fd = unsafe { libc::epoll_create1(0) };
        if epoll_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let wake_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
        if wake_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let reactor = Self {
            epoll_fd,
            listener,
            wake_fd,
            storage,
            executor,
            connections: Mutex::new(HashMap::new()),
            cancel,
        };
        reactor.epoll_add(reactor.listener.as_raw_fd(), libc::EPOLLIN as u32)?;
        reactor.epoll_add(reactor.wake_fd, libc::EPOLLIN as u32)?;
        Ok(reactor)
    }

    fn epoll_add(&self, fd: RawFd, events: u32) -> io::Result<()> {
        let mut ev = libc::epoll_event { events, u64: fd as u64 };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_ADD, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn epoll_mod(&self, fd: RawFd, events: u32) -> io::Result<()> {
        let mut ev = libc::epoll_event { events, u64: fd as u64 };
        let rc = unsafe { libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_MOD, fd, &mut ev) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn epoll_del(&self, fd: RawFd) {
        unsafe {
            libc::epoll_ctl(self.epoll_fd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Runs the readiness loop until the cancellation token fires or an
    /// eventfd wakeup is observed. Blocks only on `epoll_wait`.
    ///
    /// Takes `self` wrapped in an `Arc` (rather than `&self`) because the
    /// multi-threaded deployment hands connection callbacks to the executor;
    /// the dispatched closure needs its own owned handle back to the reactor
    /// so it can re-arm epoll itself once the callback finishes, from
    /// whichever thread actually ran it.
    pub fn run(self: Arc<Self>) {
        let mut events: Vec<libc::epoll_event> = vec![unsafe { std::mem::zeroed() }; MAX_EVENTS];
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let n = unsafe { libc::epoll_wait(self.epoll_fd, events.as_mut_ptr(), MAX_EVENTS as i32, 1000) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(component = "reactor", event = "epoll_wait_error", error = %err);
                break;
            }
            for ev in &events[..n as usize] {
                let fd = ev.u64 as RawFd;
                if fd == self.wake_fd {
                    self.drain_wake_fd();
                    continue;
                }
                if fd == self.listener.as_raw_fd() {
                    self.accept_all();
                    continue;
                }
                self.dispatch(fd, ev.events, &self);
            }
        }
        self.close_all();
    }

    fn drain_wake_fd(&self) {
        let mut buf = [0u8; 8];
        unsafe {
            libc::read(self.wake_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
        }
    }

    /// Breaks a blocked `epoll_wait` so `run` can observe cancellation.
    pub fn wake(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(self.wake_fd, &one as *const u64 as *const libc::c_void, 8);
        }
    }

    fn accept_all(&self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let fd = stream.as_raw_fd();
                    std::mem::forget(stream); // Connection now owns the fd.
                    let conn = Connection::new(fd, self.storage.clone(), Box::new(LineParser));
                    self.connections.lock().insert(fd, Arc::new(Mutex::new(conn)));
                    if self
                        .epoll_add(
                            fd,
                            (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLERR | libc::EPOLLET | libc::EPOLLONESHOT) as u32,
                        )
                        .is_err()
                    {
                        self.connections.lock().remove(&fd);
                        unsafe {
                            libc::close(fd);
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(component = "reactor", event = "accept_error", error = %e);
                    break;
                }
            }
        }
    }

    /// Dispatches a readiness event for `fd`, re-arming only once the
    /// callback has actually run (inline, or - in the multi-threaded
    /// deployment - on whichever executor worker picked it up). Re-arming
    /// before the callback completes would race the worker's own state
    /// updates, so it lives inside `run_callback`, not after `execute`
    /// returns.
    fn dispatch(&self, fd: RawFd, events: u32, arc_self: &Arc<Self>) {
        let Some(conn) = self.connections.lock().get(&fd).cloned() else {
            return;
        };
        let reactor = arc_self.clone();
        let run_callback = move || {
            {
                let mut c = conn.lock();
                if events as i32 & (libc::EPOLLERR | libc::EPOLLRDHUP) != 0 {
                    c.on_error();
                }
                if events as i32 & libc::EPOLLIN != 0 {
                    c.do_read();
                }
                if events as i32 & libc::EPOLLOUT != 0 {
                    c.do_write();
                }
            }
            reactor.rearm_or_reap(fd);
        };
        match &self.executor {
            Some(executor) => {
                if !executor.execute(Box::new(run_callback)) {
                    tracing::warn!(component = "reactor", event = "executor_queue_full", fd);
                    // The closure (and the re-arm it would have performed) was
                    // dropped unrun. The fd is still armed one-shot, so without
                    // this it would never see another readiness event. Re-arm
                    // here so the event is retried on the next epoll_wait.
                    self.rearm_or_reap(fd);
                }
            }
            None => run_callback(),
        }
    }

    /// Re-arms `fd` with its connection's current interest, or deregisters
    /// and destroys the connection once it is dead and fully drained.
    fn rearm_or_reap(&self, fd: RawFd) {
        let mut connections = self.connections.lock();
        let Some(conn_arc) = connections.get(&fd).cloned() else {
            return;
        };
        let conn = conn_arc.lock();
        let interest = conn.interest();
        let alive = conn.is_alive();
        let drained = conn.output_empty();
        drop(conn);
        if !alive && drained {
            connections.remove(&fd);
            drop(connections);
            self.epoll_del(fd);
            unsafe {
                libc::close(fd);
            }
            return;
        }
        drop(connections);
        let mut mask = (libc::EPOLLRDHUP | libc::EPOLLERR | libc::EPOLLET | libc::EPOLLONESHOT) as u32;
        if interest.readable {
            mask |= libc::EPOLLIN as u32;
        }
        if interest.writable {
            mask |= libc::EPOLLOUT as u32;
        }
        let _ = self.epoll_mod(fd, mask);
    }

    fn close_all(&self) {
        let mut connections = self.connections.lock();
        for (fd, _) in connections.drain() {
            self.epoll_del(fd);
            unsafe {
                libc::close(fd);
            }
        }
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
            libc::close(self.wake_fd);
        }
    }
}
