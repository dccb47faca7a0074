use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

/// Size of the fixed receive and send buffers, in bytes: one standard I/O
/// buffer per connection, per direction.
pub const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_BACKLOG: i32 = 128;

/// Runtime configuration for the server.
///
/// Built with a mutable builder and finished with `done()` into an `Arc`
/// shared by the event loop and every connection record it creates.
#[derive(Debug, Clone)]
pub struct Config {
    listen_addr: SocketAddr,
    backlog: i32,
    static_prefix: String,
    dynamic_prefix: String,
    buffer_size: usize,
    max_connections: Option<usize>,
}

impl Config {
    /// Builds a config with the defaults: port 8080, backlog 128, `/static`
    /// and `/dynamic` prefixes, one buffer-size I/O buffer, and no cap on
    /// concurrent connections.
    pub fn new() -> Config {
        Config {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            backlog: DEFAULT_BACKLOG,
            static_prefix: "/static".to_string(),
            dynamic_prefix: "/dynamic".to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_connections: None,
        }
    }

    /// Sets the full listen address, including the port.
    pub fn listen_addr(&mut self, value: SocketAddr) -> &mut Self {
        self.listen_addr = value;
        self
    }

    /// Overrides just the port of the listen address.
    pub fn port(&mut self, value: u16) -> &mut Self {
        self.listen_addr.set_port(value);
        self
    }

    /// Backlog passed to `listen(2)`.
    pub fn backlog(&mut self, value: i32) -> &mut Self {
        self.backlog = value;
        self
    }

    /// Substring a request path must contain to be classified `Static`.
    pub fn static_prefix<S: Into<String>>(&mut self, value: S) -> &mut Self {
        self.static_prefix = value.into();
        self
    }

    /// Substring a request path must contain to be classified `Dynamic`.
    pub fn dynamic_prefix<S: Into<String>>(&mut self, value: S) -> &mut Self {
        self.dynamic_prefix = value.into();
        self
    }

    /// Capacity of the per-connection receive and send buffers.
    pub fn buffer_size(&mut self, value: usize) -> &mut Self {
        self.buffer_size = value;
        self
    }

    /// Caps the number of connections served concurrently. Once reached the
    /// event loop stops polling the listener until a connection closes.
    pub fn max_connections(&mut self, value: usize) -> &mut Self {
        self.max_connections = Some(value);
        self
    }

    /// Wraps the config in an `Arc` for sharing with the server. A
    /// convenience method so call sites can build and hand off in one
    /// expression.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    pub fn listen_addr_value(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn backlog_value(&self) -> i32 {
        self.backlog
    }

    pub fn static_prefix_str(&self) -> &str {
        &self.static_prefix
    }

    pub fn dynamic_prefix_str(&self) -> &str {
        &self.dynamic_prefix
    }

    pub fn buffer_size_value(&self) -> usize {
        self.buffer_size
    }

    pub fn max_connections_value(&self) -> Option<usize> {
        self.max_connections
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new()
    }
}
