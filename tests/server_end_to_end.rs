//! End-to-end scenarios from the specification's testable-properties
//! section: static and dynamic hits, missing/unclassified resources,
//! fragmented requests, and the buffer-size boundary cases.
//!
//! All of these hinge on the server's file classification being resolved
//! relative to the process's current directory (`./static/...`,
//! `./dynamic/...`), and `cargo test` runs `#[test]` functions on multiple
//! threads of the same process by default. Every test below takes
//! `CWD_LOCK` before touching the current directory so no two of them
//! race to `chdir` each other out from under themselves.

extern crate picoserve;

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use picoserve::{Config, Server};

static CWD_LOCK: Mutex<()> = Mutex::new(());

fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("picoserve-e2e-{}-{}", name, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("static")).unwrap();
    fs::create_dir_all(dir.join("dynamic")).unwrap();
    dir
}

fn deadline() -> Instant {
    Instant::now() + Duration::from_secs(5)
}

/// Connects, writes `request` (optionally in two fragments with a short
/// gap), then reads the full response until the server closes its end.
fn roundtrip(addr: std::net::SocketAddr, request: &[u8], split_at: Option<usize>) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).unwrap();
    match split_at {
        None => stream.write_all(request).unwrap(),
        Some(at) => {
            stream.write_all(&request[..at]).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            stream.write_all(&request[at..]).unwrap();
        }
    }
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    response
}

fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let marker = b"\r\n\r\n";
    let pos = raw
        .windows(marker.len())
        .position(|w| w == marker)
        .expect("response missing header terminator");
    let header = String::from_utf8_lossy(&raw[..pos]).into_owned();
    let body = raw[pos + marker.len()..].to_vec();
    (header, body)
}

#[test]
fn static_dynamic_missing_unclassified_and_fragmented() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = scratch_dir("main");
    std::env::set_current_dir(&dir).unwrap();

    fs::write(dir.join("static/index.html"), b"<html/>").unwrap();
    let dynamic_body = vec![b'A'; 10_000];
    fs::write(dir.join("dynamic/big.dat"), &dynamic_body).unwrap();

    let config = Config::new().port(0).done();
    let mut server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();

    // Scenario 1: static hit.
    {
        let client = std::thread::spawn(move || {
            roundtrip(
                addr,
                b"GET /static/index.html HTTP/1.1\r\nHost: x\r\n\r\n",
                None,
            )
        });
        server.run_until_accepted(deadline());
        server.run_until_idle(deadline());
        let raw = client.join().unwrap();
        let (header, body) = split_response(&raw);
        assert!(header.starts_with("HTTP/1.1 200 OK"));
        assert!(header.contains("Content-Length: 7"));
        assert!(header.contains("Connection: close"));
        assert_eq!(body, b"<html/>");
    }

    // Scenario 2: dynamic hit.
    {
        let client = std::thread::spawn(move || {
            roundtrip(
                addr,
                b"GET /dynamic/big.dat HTTP/1.1\r\nHost: x\r\n\r\n",
                None,
            )
        });
        server.run_until_accepted(deadline());
        server.run_until_idle(deadline());
        let raw = client.join().unwrap();
        let (header, body) = split_response(&raw);
        assert!(header.starts_with("HTTP/1.1 200 OK"));
        assert!(header.contains("Content-Length: 10000"));
        assert_eq!(body, dynamic_body);
    }

    // Scenario 3: missing resource under a known prefix -> 404.
    {
        let client = std::thread::spawn(move || {
            roundtrip(
                addr,
                b"GET /static/nope.html HTTP/1.1\r\nHost: x\r\n\r\n",
                None,
            )
        });
        server.run_until_accepted(deadline());
        server.run_until_idle(deadline());
        let raw = client.join().unwrap();
        assert_eq!(
            raw,
            b"HTTP/1.1 404 Not Found\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n"
        );
    }

    // Scenario 4: unclassified path -> 404, no file opened outside the
    // configured directories.
    {
        let client = std::thread::spawn(move || {
            roundtrip(addr, b"GET /etc/passwd HTTP/1.1\r\nHost: x\r\n\r\n", None)
        });
        server.run_until_accepted(deadline());
        server.run_until_idle(deadline());
        let raw = client.join().unwrap();
        assert!(raw.starts_with(b"HTTP/1.1 404 Not Found"));
    }

    // Scenario 6: fragmented request, path split mid-token.
    {
        let request = b"GET /static/index.html HTTP/1.1\r\nHost: x\r\n\r\n";
        let split_at = "GET /static/ind".len();
        let client =
            std::thread::spawn(move || roundtrip(addr, request, Some(split_at)));
        server.run_until_accepted(deadline());
        server.run_until_idle(deadline());
        let raw = client.join().unwrap();
        let (header, body) = split_response(&raw);
        assert!(header.starts_with("HTTP/1.1 200 OK"));
        assert_eq!(body, b"<html/>");
    }
}

#[test]
fn concurrent_static_and_dynamic_clients() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = scratch_dir("concurrent");
    std::env::set_current_dir(&dir).unwrap();

    fs::write(dir.join("static/a.html"), b"static-body").unwrap();
    let dynamic_body = vec![b'B'; 5_000];
    fs::write(dir.join("dynamic/b.dat"), &dynamic_body).unwrap();

    let config = Config::new().port(0).done();
    let mut server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();

    let static_client = std::thread::spawn(move || {
        roundtrip(addr, b"GET /static/a.html HTTP/1.1\r\nHost: x\r\n\r\n", None)
    });
    let dynamic_client = std::thread::spawn(move || {
        roundtrip(addr, b"GET /dynamic/b.dat HTTP/1.1\r\nHost: x\r\n\r\n", None)
    });

    let deadline = deadline();
    server.run_until_at_least(2, deadline);
    server.run_until_idle(deadline);

    let (_, static_body) = split_response(&static_client.join().unwrap());
    let (_, dynamic_body_got) = split_response(&dynamic_client.join().unwrap());
    assert_eq!(static_body, b"static-body");
    assert_eq!(dynamic_body_got, dynamic_body);
}

#[test]
fn dynamic_file_spanning_exactly_two_buffers() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = scratch_dir("two-buffers");
    std::env::set_current_dir(&dir).unwrap();

    // Must stay large enough for the ~233-byte `200 OK` header to fit in
    // the same fixed buffer that later holds dynamic-read chunks.
    let buffer_size = 512;
    let body = vec![b'C'; buffer_size + 1];
    fs::write(dir.join("dynamic/spanning.dat"), &body).unwrap();

    let config = Config::new().port(0).buffer_size(buffer_size).done();
    let mut server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();

    let client = std::thread::spawn(move || {
        roundtrip(
            addr,
            b"GET /dynamic/spanning.dat HTTP/1.1\r\nHost: x\r\n\r\n",
            None,
        )
    });
    server.run_until_accepted(deadline());
    server.run_until_idle(deadline());

    let (header, got_body) = split_response(&client.join().unwrap());
    assert!(header.contains(&format!("Content-Length: {}", buffer_size + 1)));
    assert_eq!(got_body, body);
}

#[test]
fn empty_static_file_closes_with_no_body() {
    let _guard = CWD_LOCK.lock().unwrap();
    let dir = scratch_dir("empty");
    std::env::set_current_dir(&dir).unwrap();
    fs::write(dir.join("static/empty.html"), b"").unwrap();

    let config = Config::new().port(0).done();
    let mut server = Server::bind(config).unwrap();
    let addr = server.local_addr().unwrap();

    let client = std::thread::spawn(move || {
        roundtrip(addr, b"GET /static/empty.html HTTP/1.1\r\nHost: x\r\n\r\n", None)
    });
    server.run_until_accepted(deadline());
    server.run_until_idle(deadline());

    let (header, body) = split_response(&client.join().unwrap());
    assert!(header.contains("Content-Length: 0"));
    assert!(body.is_empty());
}
