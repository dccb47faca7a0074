//! Binary entry point: no flags, no arguments -- the listener port is a
//! build-time constant, per the CLI surface this server exposes.

#[macro_use]
extern crate log;
extern crate env_logger;
extern crate picoserve;

use std::process;

use picoserve::{Config, Server};

/// The port the shipped binary always listens on. The library's `Config`
/// can still be constructed with a different port programmatically (e.g.
/// by tests); only the binary's command line is fixed.
const DEFAULT_PORT: u16 = 8080;

fn main() {
    env_logger::init();

    let config = Config::new().port(DEFAULT_PORT).done();

    let mut server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            error!("fatal setup error: {}", e);
            process::exit(1);
        }
    };

    server.run();
}
