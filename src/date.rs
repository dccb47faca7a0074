//! RFC 1123 date formatting for the `Date` and `Last-Modified` headers.

use std::time::SystemTime;

/// Formats `when` as an RFC 1123 / HTTP-date string in GMT, e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(when: SystemTime) -> String {
    httpdate::fmt_http_date(when)
}

/// The current wall-clock time, formatted the same way.
pub fn now() -> String {
    format_http_date(SystemTime::now())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn formats_known_instant() {
        // 1994-11-06T08:49:37Z, the example date from RFC 7231.
        let when = UNIX_EPOCH + Duration::from_secs(784111777);
        assert_eq!(format_http_date(when), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn now_round_trips_through_parse() {
        let formatted = now();
        let parsed = httpdate::parse_http_date(&formatted).unwrap();
        let drift = parsed
            .duration_since(SystemTime::now())
            .unwrap_or_else(|e| e.duration());
        assert!(drift < Duration::from_secs(2));
    }
}
