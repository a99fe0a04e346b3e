//! Small shared helpers that don't deserve their own module.

use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use std::fmt;

/// Encode a `username`/`password` pair as a `Basic` auth header value.
pub(crate) fn basic_auth<U, P>(username: U, password: Option<P>) -> HeaderValue
where
    U: fmt::Display,
    P: fmt::Display,
{
    use base64::prelude::{BASE64_STANDARD, Engine as _};
    use std::io::Write;

    let mut buf = b"Basic ".to_vec();
    {
        let mut encoder = base64::write::EncoderWriter::new(&mut buf, &BASE64_STANDARD);
        let _ = write!(encoder, "{username}:");
        if let Some(password) = password {
            let _ = write!(encoder, "{password}");
        }
    }
    let mut value = HeaderValue::from_bytes(&buf).expect("base64 is always valid header value");
    value.set_sensitive(true);
    value
}

/// Merge `src` into `dst`, appending every header it carries.
pub(crate) fn merge_headers(dst: &mut HeaderMap, src: HeaderMap) {
    for (name, value) in src {
        if let Some(name) = name {
            dst.append(name, value);
        }
    }
}

pub(crate) const fn is_default_port(scheme: &str, port: u16) -> bool {
    matches!((scheme.as_bytes(), port), (b"https", 443) | (b"http", 80))
}

#[allow(dead_code)]
pub(crate) fn authorization_header_name() -> http::HeaderName {
    AUTHORIZATION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_rule_is_scheme_specific() {
        // The corrected rule from the Open Question in the spec: each
        // branch must check its own scheme, not `tls` twice.
        assert!(is_default_port("https", 443));
        assert!(is_default_port("http", 80));
        assert!(!is_default_port("https", 80));
        assert!(!is_default_port("http", 443));
        assert!(!is_default_port("https", 8443));
    }

    #[test]
    fn basic_auth_encodes_user_pass() {
        let header = basic_auth("alice", Some("secret"));
        assert!(header.is_sensitive());
        assert_eq!(header.to_str().unwrap(), "Basic YWxpY2U6c2VjcmV0");
    }
}
