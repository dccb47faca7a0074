//! A single-threaded HTTP/1.0-style file server that interleaves `epoll`
//! readiness, `io_uring` asynchronous file reads, and zero-copy `sendfile`
//! on one event loop.
//!
//! The server has exactly two jobs: serve a file from `./static/...` with
//! a kernel zero-copy transfer, or serve one from `./dynamic/...` through
//! a buffered async-read pipeline. Every connection serves exactly one
//! request and then closes -- see `connection` for the state machine that
//! drives that.

#[macro_use]
extern crate log;
#[macro_use(quick_error)]
extern crate quick_error;
extern crate httparse;
extern crate httpdate;
extern crate io_uring;
extern crate libc;

pub mod async_io;
pub mod classify;
pub mod config;
pub mod connection;
pub mod date;
pub mod error;
pub mod http;
pub mod listener;
pub mod mux;
pub mod response;
pub mod server;

pub use config::Config;
pub use error::{Error, SetupError};
pub use server::Server;
