//! Kernel-asynchronous file reads, delivered through an `eventfd` the event
//! loop's `epoll` instance can watch directly.
//!
//! One `AsyncRead` is owned per connection, created lazily on the first
//! dynamic-resource read and torn down with the connection. Sharing a ring
//! across connections would be a concurrency hazard (two connections racing
//! to drain the same completion queue) and is deliberately not done here --
//! see the design notes on this in `DESIGN.md`.

use std::io;
use std::os::unix::io::RawFd;

use io_uring::{opcode, types, IoUring};

/// A single connection's private `io_uring` instance plus the `eventfd`
/// the kernel signals through when a submitted read completes.
pub struct AsyncRead {
    ring: IoUring,
    notify_fd: RawFd,
}

impl AsyncRead {
    /// Creates a ring sized for exactly one in-flight read (the state
    /// machine never submits a second read before draining the first) and
    /// registers an eventfd with it so completions surface through `epoll`.
    pub fn new() -> io::Result<AsyncRead> {
        let ring = IoUring::new(1)?;
        let notify_fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK) };
        if notify_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        if let Err(e) = ring.submitter().register_eventfd(notify_fd) {
            unsafe { libc::close(notify_fd) };
            return Err(e);
        }
        Ok(AsyncRead { ring, notify_fd })
    }

    /// The descriptor to register with the readiness multiplexer.
    pub fn notify_fd(&self) -> RawFd {
        self.notify_fd
    }

    /// Submits a read of up to `buf.len()` bytes from `file_fd` at
    /// `offset`. `user_data` is an opaque tag returned unchanged on the
    /// matching completion queue entry; this server only ever has one read
    /// in flight per ring, so the value is unused beyond sanity.
    pub fn submit_read(
        &mut self,
        file_fd: RawFd,
        buf: &mut [u8],
        offset: u64,
        user_data: u64,
    ) -> io::Result<()> {
        let entry = opcode::Read::new(types::Fd(file_fd), buf.as_mut_ptr(), buf.len() as u32)
            .offset(offset)
            .build()
            .user_data(user_data);
        unsafe {
            self.ring.submission().push(&entry).map_err(|_| {
                io::Error::new(io::ErrorKind::Other, "io_uring submission queue full")
            })?;
        }
        self.ring.submit()?;
        Ok(())
    }

    /// Drains the eventfd counter. A value of zero means the wake-up was
    /// spurious (shouldn't happen with a correctly armed ring, but would-block
    /// on the read is handled the same way: no completion yet).
    pub fn notified(&self) -> io::Result<bool> {
        let mut counter: u64 = 0;
        let ret = unsafe {
            libc::read(self.notify_fd, &mut counter as *mut u64 as *mut libc::c_void, 8)
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(counter > 0)
    }

    /// Pops the completion queue entry for the in-flight read, if the ring
    /// has one ready. Returns the raw result: non-negative is bytes read,
    /// negative is `-errno`.
    pub fn completion(&mut self) -> Option<i32> {
        self.ring.completion().next().map(|cqe| cqe.result())
    }
}

impl Drop for AsyncRead {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.notify_fd);
        }
    }
}
