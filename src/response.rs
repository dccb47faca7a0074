//! Response header formatting for the two shapes this server ever sends:
//! a 200 over a just-opened file, and an empty-bodied 404.
//!
//! Bodies are never formatted here -- they are streamed by the connection
//! state machine directly from the file, via zero-copy or the async-read
//! pipeline.

use std::time::SystemTime;

use date;

const SERVER_TOKEN: &str = "Apache/2.2.9";

/// Formats the literal header block the spec mandates for a 200 response,
/// in the fixed order: status line, `Date`, `Server`, `Last-Modified`,
/// `Accept-Ranges`, `Vary`, `Connection`, `Content-Type`, `Content-Length`,
/// blank line.
pub fn header_200(content_length: u64, last_modified: SystemTime) -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Date: {date}\r\n\
         Server: {server}\r\n\
         Last-Modified: {last_modified}\r\n\
         Accept-Ranges: bytes\r\n\
         Vary: Accept-Encoding\r\n\
         Connection: close\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {len}\r\n\
         \r\n",
        date = date::now(),
        server = SERVER_TOKEN,
        last_modified = date::format_http_date(last_modified),
        len = content_length,
    )
}

/// The minimal 404 response: no `Date`, no body, just enough for the
/// client to know the request failed.
pub fn header_404() -> &'static str {
    "HTTP/1.1 404 Not Found\r\n\
     Content-Type: text/html\r\n\
     Connection: close\r\n\
     \r\n"
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn header_200_has_expected_lines_in_order() {
        let when = UNIX_EPOCH + Duration::from_secs(784111777);
        let header = header_200(7, when);
        let lines: Vec<&str> = header.split("\r\n").collect();
        assert_eq!(lines[0], "HTTP/1.1 200 OK");
        assert!(lines[1].starts_with("Date: "));
        assert_eq!(lines[2], "Server: Apache/2.2.9");
        assert_eq!(lines[3], "Last-Modified: Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(lines[4], "Accept-Ranges: bytes");
        assert_eq!(lines[5], "Vary: Accept-Encoding");
        assert_eq!(lines[6], "Connection: close");
        assert_eq!(lines[7], "Content-Type: text/html");
        assert_eq!(lines[8], "Content-Length: 7");
        assert_eq!(lines[9], "");
        assert_eq!(lines[10], "");
    }

    #[test]
    fn header_404_is_minimal() {
        let header = header_404();
        assert!(header.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(header.ends_with("\r\n\r\n"));
        assert!(!header.contains("Content-Length"));
    }
}
