//! Thin adapter over `httparse` that the connection state machine uses to
//! pull a request path out of a fully-buffered request.
//!
//! This server only ever looks at the request line; headers are parsed (so
//! that `httparse` can validate the request and tell us how many bytes it
//! consumed) but never inspected beyond that.

use error::Error;

const MAX_HEADERS: usize = 32;

/// Result of parsing a buffered request.
///
/// Unlike `httparse::Status`, there is no `Partial` case here: by the time
/// `parse` is called the caller has already established that the receive
/// buffer holds a complete `CR LF CR LF`-terminated request (or gave up and
/// is parsing whatever is in the buffer as-is, per the "buffer full" edge
/// case in the state machine).
pub struct ParsedRequest {
    /// Request-target as it appeared on the wire, e.g. `/static/index.html`.
    pub path: String,
    /// Number of bytes of `buf` the parser consumed.
    pub consumed: usize,
}

/// Parses the request line and headers out of `buf`.
///
/// Returns `Error::Parse` on any parse failure, or if the parser did not
/// consume every byte of `buf` -- the state machine treats both as
/// equivalent to a missing resource and responds 404.
pub fn parse(buf: &[u8]) -> Result<ParsedRequest, Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);
    match req.parse(buf) {
        Ok(httparse::Status::Complete(consumed)) => {
            if consumed != buf.len() {
                return Err(Error::Parse);
            }
            let path = req.path.ok_or(Error::Parse)?.to_string();
            Ok(ParsedRequest { path, consumed })
        }
        Ok(httparse::Status::Partial) => Err(Error::Parse),
        Err(_) => Err(Error::Parse),
    }
}

/// Scans for the `CR LF CR LF` end-of-headers marker in `buf`.
pub fn headers_terminated(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let raw = b"GET /static/index.html HTTP/1.1\r\nHost: x\r\n\r\n";
        let parsed = parse(raw).expect("should parse");
        assert_eq!(parsed.path, "/static/index.html");
        assert_eq!(parsed.consumed, raw.len());
    }

    #[test]
    fn rejects_trailing_garbage() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\ntrailing";
        assert!(parse(raw).is_err());
    }

    #[test]
    fn rejects_partial_request() {
        let raw = b"GET /static/index";
        assert!(parse(raw).is_err());
    }

    #[test]
    fn detects_header_terminator() {
        assert!(!headers_terminated(b"GET / HTTP/1.1\r\nHost: x\r\n"));
        assert!(headers_terminated(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
    }

    #[test]
    fn terminator_split_across_reads_is_not_falsely_detected() {
        assert!(!headers_terminated(b"GET / HTTP/1.1\r\n\r"));
    }
}
