//! The event loop: accepts new connections, dispatches readiness events to
//! the per-connection state machine, and retires connections that reach
//! `CLOSED`.
//!
//! This bundles the listener, the multiplexer and the configuration into
//! one explicit `Server` value rather than process-wide globals -- see the
//! "Global state" design note resolved in `DESIGN.md`.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;

use config::Config;
use connection::Connection;
use error::SetupError;
use listener::Listener;
use mux::{Event, Mux};

/// Sentinel token reserved for the listening socket; connection tokens
/// start at `2` (`id << 1` with `id >= 1`), so this never collides.
const LISTENER_TOKEN: u64 = 0;

pub struct Server {
    config: Arc<Config>,
    listener: Listener,
    mux: Mux,
    connections: HashMap<u64, Connection>,
    next_id: u64,
    events: Vec<Event>,
}

impl Server {
    /// Binds the listener and creates the multiplexer. Both are
    /// fatal-setup failures per the error taxonomy: the caller should log
    /// and abort the process rather than attempt to recover.
    pub fn bind(config: Arc<Config>) -> Result<Server, SetupError> {
        let listener = Listener::bind(&config)?;
        let mux = Mux::new().map_err(SetupError::Reactor)?;
        mux.add_read(listener.as_raw_fd(), LISTENER_TOKEN)
            .map_err(SetupError::Reactor)?;
        info!("listening on {}", config.listen_addr_value());
        Ok(Server {
            config,
            listener,
            mux,
            connections: HashMap::new(),
            next_id: 1,
            events: Vec::with_capacity(128),
        })
    }

    /// Runs forever. The only suspension point is `Mux::wait` -- every
    /// other operation below either makes progress or returns immediately.
    pub fn run(&mut self) -> ! {
        loop {
            if let Err(e) = self.turn(-1) {
                error!("multiplexer wait failed: {}", e);
            }
        }
    }

    /// Services exactly the events a single `Mux::wait` call reported.
    /// Split out from `run` so tests can drive one iteration at a time with
    /// a bounded `timeout_ms` instead of blocking forever.
    fn turn(&mut self, timeout_ms: i32) -> std::io::Result<()> {
        self.events.clear();
        self.mux.wait_timeout(&mut self.events, timeout_ms)?;
        // Drained into a local `Vec` up front so the loop body below can
        // freely borrow `self` mutably per event.
        let events = std::mem::replace(&mut self.events, Vec::new());
        for event in &events {
            if event.token == LISTENER_TOKEN {
                self.accept_ready();
            } else {
                self.dispatch(event);
            }
        }
        self.events = events;
        Ok(())
    }

    fn accept_ready(&mut self) {
        loop {
            if let Some(max) = self.config.max_connections_value() {
                if self.connections.len() >= max {
                    warn!("at max_connections ({}), pausing accept", max);
                    break;
                }
            }
            match self.listener.accept() {
                Ok(Some(stream)) => self.spawn(stream),
                Ok(None) => break,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    fn spawn(&mut self, stream: TcpStream) {
        let id = self.next_id;
        self.next_id += 1;
        let mut conn = Connection::new(id, stream, self.config.clone());
        match conn.register_initial(&self.mux) {
            Ok(()) => {
                debug!("accepted connection {}", id);
                self.connections.insert(id, conn);
            }
            Err(e) => {
                warn!("failed to register accepted connection {}: {}", id, e);
            }
        }
    }

    fn dispatch(&mut self, event: &Event) {
        let id = event.token >> 1;
        let is_notify = event.token & 1 == 1;
        let readable = event.readable || event.error;
        let writable = event.writable || event.error;

        let closed = if let Some(conn) = self.connections.get_mut(&id) {
            conn.on_event(readable, writable, is_notify);
            if conn.is_closed() {
                conn.deregister(&self.mux);
                true
            } else if let Err(e) = conn.sync_registration(&self.mux) {
                warn!("connection {} failed to re-arm interest: {}", id, e);
                conn.deregister(&self.mux);
                true
            } else {
                false
            }
        } else {
            false
        };

        if closed {
            debug!("closing connection {}", id);
            self.connections.remove(&id);
        }
    }

    /// The address actually bound -- useful when `Config` was given port
    /// `0` and the caller needs to know which port the kernel picked.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Pumps the event loop, with a bounded `epoll_wait` per iteration,
    /// until every connection has closed or `deadline` passes. Exposed for
    /// integration tests, which need to drive the loop without the
    /// `!`-returning `run`.
    #[cfg(test)]
    pub fn run_until_idle(&mut self, deadline: std::time::Instant) {
        while !self.connections.is_empty() && std::time::Instant::now() < deadline {
            if self.turn(50).is_err() {
                break;
            }
        }
    }

    /// Pumps the event loop with a bounded `epoll_wait` until at least one
    /// connection has been accepted or `deadline` passes.
    #[cfg(test)]
    pub fn run_until_accepted(&mut self, deadline: std::time::Instant) {
        self.run_until_at_least(1, deadline)
    }

    /// As `run_until_accepted`, but for a specific connection count -- used
    /// by the concurrent-clients test, which needs both connections
    /// accepted before it starts servicing either one.
    #[cfg(test)]
    pub fn run_until_at_least(&mut self, count: usize, deadline: std::time::Instant) {
        while self.connections.len() < count && std::time::Instant::now() < deadline {
            if self.turn(50).is_err() {
                break;
            }
        }
    }

    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
