//! A thin, owned wrapper around a single `epoll` instance.
//!
//! This is the only readiness multiplexer the event loop talks to; there is
//! no intermediate reactor crate between this module and the kernel. Every
//! registration carries an opaque `u64` token chosen by the caller -- the
//! connection lookup it refers to lives in the event loop, not here.

use std::io;
use std::os::unix::io::RawFd;

/// One readiness event: which token it's for, and whether it was readable,
/// writable, or signals the descriptor has hung up / errored.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub token: u64,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
}

/// Owns one `epoll` file descriptor for the lifetime of the process.
pub struct Mux {
    epfd: RawFd,
}

impl Mux {
    /// Creates a new epoll instance. Fatal-setup: failure here means the
    /// process cannot run at all.
    pub fn new() -> io::Result<Mux> {
        let epfd = unsafe { libc::epoll_create1(0) };
        if epfd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Mux { epfd })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32, token: u64) -> io::Result<()> {
        let mut ev = libc::epoll_event {
            events,
            u64: token,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, op, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Registers `fd` for read readiness, tagged with `token`.
    pub fn add_read(&self, fd: RawFd, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, libc::EPOLLIN as u32, token)
    }

    /// Registers `fd` for write readiness, tagged with `token`.
    pub fn add_write(&self, fd: RawFd, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, libc::EPOLLOUT as u32, token)
    }

    /// Switches an already-registered `fd` to read interest.
    pub fn update_to_read(&self, fd: RawFd, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, libc::EPOLLIN as u32, token)
    }

    /// Switches an already-registered `fd` to write interest.
    pub fn update_to_write(&self, fd: RawFd, token: u64) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, libc::EPOLLOUT as u32, token)
    }

    /// Deregisters `fd`. Must be called before the descriptor is closed --
    /// the kernel will otherwise happily keep a stale registration around
    /// until the next `epoll_wait` tells you about a descriptor you've
    /// already forgotten.
    pub fn remove(&self, fd: RawFd) -> io::Result<()> {
        // The event argument is ignored for EPOLL_CTL_DEL on Linux kernels
        // since 2.6.9, but older epoll_ctl(2) man pages ask for a non-null
        // pointer, so pass a zeroed one for portability with old kernels.
        let mut ev = libc::epoll_event { events: 0, u64: 0 };
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, &mut ev) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Blocks until at least one descriptor is ready, and appends the
    /// resulting events to `out`. This is the event loop's sole suspension
    /// point.
    pub fn wait(&self, out: &mut Vec<Event>) -> io::Result<()> {
        self.wait_timeout(out, -1)
    }

    /// As `wait`, but with an explicit `epoll_wait` timeout in
    /// milliseconds (`-1` blocks forever). Used by tests that need the
    /// loop to give up rather than hang if an expected event never shows.
    pub fn wait_timeout(&self, out: &mut Vec<Event>, timeout_ms: i32) -> io::Result<()> {
        let mut raw = [libc::epoll_event { events: 0, u64: 0 }; 128];
        let n = unsafe {
            libc::epoll_wait(self.epfd, raw.as_mut_ptr(), raw.len() as libc::c_int, timeout_ms)
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }
        for ev in &raw[..n as usize] {
            let events = ev.events as i32;
            out.push(Event {
                token: ev.u64,
                readable: events & libc::EPOLLIN != 0,
                writable: events & libc::EPOLLOUT != 0,
                error: events & (libc::EPOLLERR | libc::EPOLLHUP) != 0,
            });
        }
        Ok(())
    }
}

impl Drop for Mux {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}
