//! Decides, from a request path, which of the two served directories (if
//! either) a resource belongs to, and resolves the on-disk path to open.

/// What a request path resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Neither configured prefix matched; the resource is not served.
    None,
    /// Served via zero-copy `sendfile`.
    Static,
    /// Served via buffered asynchronous reads.
    Dynamic,
}

/// Classifies `path` against the configured prefixes and, if it matches,
/// resolves the filesystem path the server should open.
///
/// Classification is a substring match, checked static-prefix first: a path
/// containing both prefixes (nonsensical in practice, but not excluded by
/// the wire protocol) resolves as `Static`. The resolved path is always the
/// request path prefixed with `.`, anchoring it at the process's working
/// directory -- this server does not otherwise sanitize `..` components,
/// matching the source's substring-only classification.
pub fn classify(path: &str, static_prefix: &str, dynamic_prefix: &str) -> (Kind, String) {
    if path.contains(static_prefix) {
        (Kind::Static, resolve(path))
    } else if path.contains(dynamic_prefix) {
        (Kind::Dynamic, resolve(path))
    } else {
        (Kind::None, String::new())
    }
}

fn resolve(path: &str) -> String {
    format!(".{}", path)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_static() {
        let (kind, resolved) = classify("/static/index.html", "/static", "/dynamic");
        assert_eq!(kind, Kind::Static);
        assert_eq!(resolved, "./static/index.html");
    }

    #[test]
    fn classifies_dynamic() {
        let (kind, resolved) = classify("/dynamic/big.dat", "/static", "/dynamic");
        assert_eq!(kind, Kind::Dynamic);
        assert_eq!(resolved, "./dynamic/big.dat");
    }

    #[test]
    fn classifies_unmatched_as_none() {
        let (kind, resolved) = classify("/etc/passwd", "/static", "/dynamic");
        assert_eq!(kind, Kind::None);
        assert_eq!(resolved, "");
    }

    #[test]
    fn static_prefix_wins_when_both_present() {
        let (kind, _) = classify("/static/dynamic/x", "/static", "/dynamic");
        assert_eq!(kind, Kind::Static);
    }
}
