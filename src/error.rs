use std::io;

quick_error! {
    /// Failures that can keep the server from starting at all.
    ///
    /// Once the event loop is running, every other failure mode is encoded
    /// as a phase transition on the affected connection rather than
    /// propagated through an error type -- see `connection::Connection`.
    #[derive(Debug)]
    pub enum SetupError {
        Listener(err: io::Error) {
            description("failed to create or bind the listening socket")
            display("failed to create or bind the listening socket: {}", err)
        }
        Reactor(err: io::Error) {
            description("failed to create the readiness multiplexer")
            display("failed to create the readiness multiplexer: {}", err)
        }
    }
}

quick_error! {
    /// Failures the connection state machine classifies before collapsing
    /// them into a phase transition (`SENDING_404` or `CLOSED`).
    ///
    /// This type never crosses a connection boundary and is never matched
    /// on by the event loop; it exists so that the classification logic
    /// itself reads like ordinary `Result`-returning Rust rather than a
    /// pile of `bool`s, per the ambient error-handling conventions the rest
    /// of this crate follows.
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        Parse {
            description("request line or headers failed to parse")
        }
    }
}
