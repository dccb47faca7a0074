//! The per-connection state machine: the heart of the server.
//!
//! A `Connection` owns every descriptor associated with one client -- the
//! socket, the optional open resource file, and (for dynamic resources)
//! the async-read context and its notification descriptor. It advances by
//! reacting to exactly one readiness event at a time, handed to it by the
//! event loop in `server.rs`, and reports back what it now wants to be
//! woken up for.

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::SystemTime;

use async_io::AsyncRead;
use classify::{self, Kind};
use config::Config;
use http;
use mux::Mux;
use response;

/// Where in the transition table (§4.2) a connection currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initial,
    ReceivingData,
    RequestReceived,
    SendingHeader,
    SendingData,
    AsyncOngoing,
    Sending404,
    Closed,
}

/// What the connection wants registered with the multiplexer right now.
/// `sync_registration` diffs this against what's actually registered and
/// issues the minimal number of `Mux` calls to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interest {
    None,
    ReadSocket,
    WriteSocket,
    ReadNotify,
}

/// The descriptor and direction currently registered with the mux, so
/// `sync_registration` can tell an unchanged registration from one that
/// needs an `EPOLL_CTL_MOD`, or a switch to the other descriptor that
/// needs a remove-then-add.
#[derive(Debug, Clone, Copy)]
struct Registration {
    fd: RawFd,
    read: bool,
}

pub struct Connection {
    id: u64,
    config: Arc<Config>,
    socket: TcpStream,
    state: State,

    recv_buf: Vec<u8>,
    recv_len: usize,

    send_buf: Vec<u8>,
    send_pos: usize,
    send_len: usize,

    path: Option<String>,
    kind: Kind,

    file: Option<File>,
    file_size: u64,
    file_offset: u64,

    async_read: Option<AsyncRead>,
    registration: Option<Registration>,
}

impl Connection {
    /// Zero-initializes a new record for `socket`, just accepted. Per the
    /// resource-lifecycle component: phase `Initial`, every optional
    /// descriptor absent.
    pub fn new(id: u64, socket: TcpStream, config: Arc<Config>) -> Connection {
        let buffer_size = config.buffer_size_value();
        Connection {
            id,
            config,
            socket,
            state: State::Initial,
            recv_buf: vec![0; buffer_size],
            recv_len: 0,
            send_buf: vec![0; buffer_size],
            send_pos: 0,
            send_len: 0,
            path: None,
            kind: Kind::None,
            file: None,
            file_size: 0,
            file_offset: 0,
            async_read: None,
            registration: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Even tokens identify the client socket, odd tokens the notification
    /// descriptor -- see the event loop's token decoding in `server.rs`.
    pub fn socket_token(&self) -> u64 {
        self.id << 1
    }

    pub fn notify_token(&self) -> u64 {
        (self.id << 1) | 1
    }

    /// Registers this connection's starting interest (read on the socket)
    /// right after `accept`.
    pub fn register_initial(&mut self, mux: &Mux) -> io::Result<()> {
        self.sync_registration(mux)
    }

    /// Drives the state machine in response to one readiness event.
    /// `is_notify` distinguishes an event on the notification descriptor
    /// from one on the client socket -- the only two descriptors this
    /// connection is ever registered on.
    pub fn on_event(&mut self, readable: bool, writable: bool, is_notify: bool) {
        if self.state == State::Closed {
            return;
        }
        match (self.state, is_notify) {
            (State::Initial, false) | (State::ReceivingData, false) if readable => self.receive(),
            (State::AsyncOngoing, true) if readable => self.drain_async(),
            (State::SendingHeader, false) if writable => self.advance_after_header(),
            (State::Sending404, false) if writable => self.advance_after_404(),
            (State::SendingData, false) if writable => match self.kind {
                Kind::Static => self.send_static(),
                Kind::Dynamic => self.advance_after_dynamic_chunk(),
                Kind::None => unreachable!("SendingData is never entered for an unclassified path"),
            },
            _ => {
                // Spurious wake-up (e.g. a late EPOLLHUP on a descriptor
                // we've already moved off of): ignored, interest is
                // re-synced unchanged below.
            }
        }
    }

    /// Computes the registration this connection currently wants and
    /// issues whatever `Mux` calls are needed to reach it from whatever is
    /// currently registered. Switching between the socket and the
    /// notification descriptor is a remove-then-add; switching direction
    /// on the same descriptor is an `EPOLL_CTL_MOD`.
    pub fn sync_registration(&mut self, mux: &Mux) -> io::Result<()> {
        let want = match self.desired_interest() {
            Interest::None => None,
            Interest::ReadSocket => Some((self.socket.as_raw_fd(), self.socket_token(), true)),
            Interest::WriteSocket => Some((self.socket.as_raw_fd(), self.socket_token(), false)),
            Interest::ReadNotify => {
                let fd = self
                    .async_read
                    .as_ref()
                    .expect("ReadNotify interest implies an async context")
                    .notify_fd();
                Some((fd, self.notify_token(), true))
            }
        };

        match (self.registration, want) {
            (None, None) => {}
            (None, Some((fd, token, read))) => {
                if read {
                    mux.add_read(fd, token)?;
                } else {
                    mux.add_write(fd, token)?;
                }
                self.registration = Some(Registration { fd, read });
            }
            (Some(cur), None) => {
                mux.remove(cur.fd)?;
                self.registration = None;
            }
            (Some(cur), Some((fd, token, read))) => {
                if cur.fd == fd {
                    if cur.read != read {
                        if read {
                            mux.update_to_read(fd, token)?;
                        } else {
                            mux.update_to_write(fd, token)?;
                        }
                    }
                } else {
                    mux.remove(cur.fd)?;
                    if read {
                        mux.add_read(fd, token)?;
                    } else {
                        mux.add_write(fd, token)?;
                    }
                }
                self.registration = Some(Registration { fd, read });
            }
        }
        Ok(())
    }

    /// Deregisters from `mux` and reports whatever descriptor was
    /// registered, so the event loop can remove it before dropping the
    /// connection -- remove-then-close, per §9.
    pub fn deregister(&mut self, mux: &Mux) {
        if let Some(cur) = self.registration.take() {
            let _ = mux.remove(cur.fd);
        }
    }

    fn desired_interest(&self) -> Interest {
        match self.state {
            State::Closed => Interest::None,
            State::Initial | State::ReceivingData => Interest::ReadSocket,
            State::AsyncOngoing => Interest::ReadNotify,
            State::RequestReceived
            | State::SendingHeader
            | State::SendingData
            | State::Sending404 => Interest::WriteSocket,
        }
    }

    fn close(&mut self) {
        self.state = State::Closed;
    }

    // -- RECEIVING_DATA ----------------------------------------------------

    fn receive(&mut self) {
        match self.socket.read(&mut self.recv_buf[self.recv_len..]) {
            Ok(0) => self.close(),
            Ok(n) => {
                self.recv_len += n;
                self.state = State::ReceivingData;
                if http::headers_terminated(&self.recv_buf[..self.recv_len])
                    || self.recv_len == self.recv_buf.len()
                {
                    // REQUEST_RECEIVED is a pure-compute bridge state: parsing,
                    // classification and opening the file need no further
                    // readiness wait, so we run straight through to the next
                    // I/O-relevant phase within this same wake-up.
                    self.state = State::RequestReceived;
                    self.handle_request();
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(_) => self.close(),
        }
    }

    fn handle_request(&mut self) {
        let parsed = match http::parse(&self.recv_buf[..self.recv_len]) {
            Ok(parsed) => parsed,
            Err(_) => {
                self.prepare_404();
                return;
            }
        };
        self.path = Some(parsed.path.clone());

        let (kind, resolved) = classify::classify(
            &parsed.path,
            self.config.static_prefix_str(),
            self.config.dynamic_prefix_str(),
        );
        self.kind = kind;
        match kind {
            Kind::None => self.prepare_404(),
            Kind::Static | Kind::Dynamic => match self.open_resource(&resolved) {
                Ok(()) => self.prepare_header_200(),
                Err(_) => self.prepare_404(),
            },
        }
    }

    fn open_resource(&mut self, resolved: &str) -> io::Result<()> {
        let file = File::open(resolved)?;
        let meta = file.metadata()?;
        self.file_size = meta.len();
        self.file_offset = 0;
        self.file = Some(file);
        Ok(())
    }

    fn prepare_header_200(&mut self) {
        let modified = self
            .file
            .as_ref()
            .and_then(|f| f.metadata().ok())
            .and_then(|m| m.modified().ok())
            .unwrap_or_else(SystemTime::now);
        let header = response::header_200(self.file_size, modified);
        self.stage(header.as_bytes());
        self.state = State::SendingHeader;
    }

    fn prepare_404(&mut self) {
        let header = response::header_404();
        self.stage(header.as_bytes());
        self.state = State::Sending404;
    }

    fn stage(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= self.send_buf.len(), "response header exceeds buffer capacity");
        self.send_buf[..bytes.len()].copy_from_slice(bytes);
        self.send_pos = 0;
        self.send_len = bytes.len();
    }

    // -- SENDING_HEADER / SENDING_404 / buffered SENDING_DATA --------------

    /// Sends one chunk of `send_buf[send_pos..send_pos+send_len)`. A
    /// would-block leaves `send_len` untouched and is not an error; only a
    /// genuine I/O failure propagates.
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.send_len == 0 {
            return Ok(());
        }
        match self.socket.write(&self.send_buf[self.send_pos..self.send_pos + self.send_len]) {
            Ok(0) => Err(io::Error::new(io::ErrorKind::WriteZero, "peer closed mid-send")),
            Ok(n) => {
                self.send_pos += n;
                self.send_len -= n;
                if self.send_len == 0 {
                    self.send_pos = 0;
                }
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn advance_after_header(&mut self) {
        if self.send_buffered().is_err() {
            self.close();
            return;
        }
        if self.send_len != 0 {
            return;
        }
        match self.kind {
            Kind::Static => self.state = State::SendingData,
            Kind::Dynamic if self.file_size == 0 => self.close(),
            Kind::Dynamic => self.start_async(),
            Kind::None => unreachable!("a 404 never stages a 200 header"),
        }
    }

    fn advance_after_404(&mut self) {
        if self.send_buffered().is_err() {
            self.close();
            return;
        }
        if self.send_len == 0 {
            self.close();
        }
    }

    fn advance_after_dynamic_chunk(&mut self) {
        if self.send_buffered().is_err() {
            self.close();
            return;
        }
        if self.send_len != 0 {
            return;
        }
        if self.file_offset >= self.file_size {
            self.async_read = None;
            self.close();
        } else {
            self.start_async();
        }
    }

    // -- SENDING_DATA (static, zero-copy) -----------------------------------

    fn send_static(&mut self) {
        let file_fd = self.file.as_ref().expect("static send without an open file").as_raw_fd();
        let remaining = self.file_size - self.file_offset;
        let mut offset = self.file_offset as libc::off_t;
        let ret = unsafe {
            libc::sendfile(
                self.socket.as_raw_fd(),
                file_fd,
                &mut offset,
                remaining as usize,
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return;
            }
            self.close();
            return;
        }
        self.file_offset = offset as u64;
        if self.file_offset >= self.file_size {
            self.close();
        }
    }

    // -- ASYNC_ONGOING (dynamic, buffered) ----------------------------------

    fn start_async(&mut self) {
        self.state = State::AsyncOngoing;
        if self.try_submit_read().is_err() {
            // Tear down and retry once with a fresh context; a second
            // failure is treated as fatal.
            self.async_read = None;
            if self.try_submit_read().is_err() {
                self.close();
            }
        }
    }

    fn try_submit_read(&mut self) -> io::Result<()> {
        if self.async_read.is_none() {
            self.async_read = Some(AsyncRead::new()?);
        }
        let to_read = std::cmp::min(
            self.send_buf.len() as u64,
            self.file_size - self.file_offset,
        ) as usize;
        let file_fd = self.file.as_ref().expect("async read without an open file").as_raw_fd();
        let offset = self.file_offset;
        let id = self.id;
        let buf = &mut self.send_buf[..to_read];
        let async_read = self.async_read.as_mut().expect("just ensured above");
        async_read.submit_read(file_fd, buf, offset, id)?;
        self.send_len = 0;
        self.send_pos = 0;
        Ok(())
    }

    fn drain_async(&mut self) {
        let notified = match self.async_read.as_ref().map(|a| a.notified()) {
            Some(Ok(notified)) => notified,
            Some(Err(_)) | None => {
                self.close();
                return;
            }
        };
        if !notified {
            return;
        }
        let result = self.async_read.as_mut().and_then(|a| a.completion());
        let n = match result {
            Some(n) if n >= 0 => n as usize,
            _ => {
                self.close();
                return;
            }
        };
        self.send_pos = 0;
        self.send_len = n;
        self.file_offset += n as u64;
        self.state = State::SendingData;
    }
}
