//! Endpoint candidate validation.
//!
//! The stream announces where RPC requests should be POSTed. The announcement
//! is only honoured if it stays on the same origin as the stream itself, so a
//! compromised or misbehaving server cannot redirect calls elsewhere.

use url::Url;

/// Whether a stream line looks like an endpoint announcement at all.
pub fn looks_like_candidate(data: &str) -> bool {
    data.starts_with('/') || data.starts_with("http")
}

/// Resolve `candidate` against `base_url` and accept it only if it is an
/// http(s) URL on the same scheme, host and port.
///
/// Paths beginning with `/` are resolved against the base's scheme and
/// authority. Malformed input yields `None`.
pub fn resolve_candidate(candidate: &str, base_url: &Url) -> Option<Url> {
    let resolved = if candidate.starts_with('/') {
        base_url.join(candidate).ok()?
    } else {
        Url::parse(candidate).ok()?
    };

    if !matches!(resolved.scheme(), "http" | "https") {
        tracing::warn!(candidate, scheme = resolved.scheme(), "endpoint scheme not allowed");
        return None;
    }

    if resolved.origin() != base_url.origin() {
        tracing::warn!(
            candidate,
            expected = %base_url.origin().ascii_serialization(),
            "endpoint host mismatch"
        );
        return None;
    }

    Some(resolved)
}

/// String form of [`resolve_candidate`]; never panics on malformed input.
pub fn is_valid_candidate(candidate: &str, base_url: &str) -> bool {
    match Url::parse(base_url) {
        Ok(base) => resolve_candidate(candidate, &base).is_some(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://api.example.com/open/sse";

    fn base() -> Url {
        Url::parse(BASE).unwrap()
    }

    #[test]
    fn relative_path_resolves_against_origin() {
        let url = resolve_candidate("/rpc/endpoint123", &base()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/rpc/endpoint123");
        assert!(is_valid_candidate("/rpc/endpoint123", BASE));
    }

    #[test]
    fn relative_path_drops_base_query() {
        let signed = Url::parse("https://api.example.com/open/sse?secret_id=id&sign=abc").unwrap();
        let url = resolve_candidate("/rpc/x?session=1", &signed).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/rpc/x?session=1");
    }

    #[test]
    fn same_host_absolute_accepted() {
        assert!(is_valid_candidate("https://api.example.com/rpc/endpoint", BASE));
    }

    #[test]
    fn http_allowed_when_base_is_http() {
        assert!(is_valid_candidate(
            "http://api.example.com/rpc/endpoint",
            "http://api.example.com/open/sse"
        ));
    }

    #[test]
    fn cross_host_rejected() {
        assert!(!is_valid_candidate("https://evil.example/rpc", BASE));
    }

    #[test]
    fn protocol_relative_path_cannot_escape_host() {
        assert!(!is_valid_candidate("//evil.example/rpc", BASE));
    }

    #[test]
    fn scheme_downgrade_rejected() {
        assert!(!is_valid_candidate("http://api.example.com/rpc", BASE));
    }

    #[test]
    fn non_http_scheme_rejected() {
        assert!(!is_valid_candidate("ftp://api.example.com/rpc", BASE));
    }

    #[test]
    fn port_mismatch_rejected() {
        assert!(!is_valid_candidate("https://api.example.com:8443/rpc", BASE));
    }

    #[test]
    fn malformed_input_is_false() {
        assert!(!is_valid_candidate("not-a-valid-url", BASE));
        assert!(!is_valid_candidate("", BASE));
        assert!(!is_valid_candidate("/rpc", "not a base"));
    }

    #[test]
    fn candidate_shape() {
        assert!(looks_like_candidate("/rpc/endpoint"));
        assert!(looks_like_candidate("https://api.example.com/rpc"));
        assert!(!looks_like_candidate("{\"jsonrpc\":\"2.0\"}"));
        assert!(!looks_like_candidate("ping"));
    }
}
