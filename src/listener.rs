//! Creates, binds, and listens on the TCP port. Kept as a minimal wrapper
//! over `std::net::TcpListener` rather than hand-rolled `socket(2)`/`bind(2)`
//! calls -- the standard library's listener already gives us an owned,
//! non-blocking-capable raw descriptor, and there is nothing this server
//! needs from the setup path that it doesn't already provide.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use config::Config;
use error::SetupError;

/// Owns the listening socket for the lifetime of the process.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Binds and starts listening per `config`. Fatal-setup: the caller
    /// should log and abort on failure, per the error taxonomy.
    pub fn bind(config: &Config) -> Result<Listener, SetupError> {
        let inner = bind_with_backlog(config.listen_addr_value(), config.backlog_value())
            .map_err(SetupError::Listener)?;
        inner.set_nonblocking(true).map_err(SetupError::Listener)?;
        Ok(Listener { inner })
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }

    /// The address actually bound, including the real port when `config`
    /// asked for port `0`. Used by tests that need an unused port.
    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }

    /// Accepts one pending connection, setting it non-blocking before
    /// handing it back. Returns `Ok(None)` on a would-block, which the
    /// event loop treats as "nothing to do this iteration" rather than an
    /// error -- spurious listener readiness is normal under level-triggered
    /// epoll when multiple connections arrive in one batch.
    pub fn accept(&self) -> io::Result<Option<TcpStream>> {
        match self.inner.accept() {
            Ok((stream, _addr)) => {
                stream.set_nonblocking(true)?;
                Ok(Some(stream))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn bind_with_backlog(addr: std::net::SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    // `TcpListener::bind` always uses a kernel-default backlog; reach for
    // `listen(2)` directly when the caller asked for a specific one.
    use std::net::ToSocketAddrs;
    let addr = addr.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "no socket address resolved")
    })?;

    let domain = if addr.is_ipv4() {
        libc::AF_INET
    } else {
        libc::AF_INET6
    };
    let fd = unsafe { libc::socket(domain, libc::SOCK_STREAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    let listener: TcpListener = unsafe { FromRawFd::from_raw_fd(fd) };
    set_reuseaddr(&listener)?;
    bind_raw(&listener, addr)?;
    listen_raw(&listener, backlog)?;
    Ok(listener)
}

fn set_reuseaddr(listener: &TcpListener) -> io::Result<()> {
    let yes: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            listener.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &yes as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn bind_raw(listener: &TcpListener, addr: std::net::SocketAddr) -> io::Result<()> {
    let (sockaddr, len) = sockaddr_of(addr);
    let ret = unsafe {
        libc::bind(
            listener.as_raw_fd(),
            &sockaddr as *const libc::sockaddr_in as *const libc::sockaddr,
            len,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn listen_raw(listener: &TcpListener, backlog: i32) -> io::Result<()> {
    let ret = unsafe { libc::listen(listener.as_raw_fd(), backlog) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn sockaddr_of(addr: std::net::SocketAddr) -> (libc::sockaddr_in, libc::socklen_t) {
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => unreachable!("IPv6 is an open question, not implemented"),
    };
    let sockaddr = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(ip.octets()),
        },
        sin_zero: [0; 8],
    };
    (sockaddr, std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
}
