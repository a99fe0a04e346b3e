//! `Response` (spec.md §3): status + headers + body publisher + trailers.

use http::{HeaderMap, StatusCode, Version};

use crate::body::Body;

/// A response received from an exchange. The body is a cold,
/// single-subscription lazy sequence of byte chunks (spec.md §3).
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) version: Version,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Body,
}

impl Response {
    pub(crate) fn from_http(resp: http::Response<Body>) -> Self {
        let (parts, body) = resp.into_parts();
        Response {
            status: parts.status,
            version: parts.version,
            headers: parts.headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Take ownership of the response body. May only be called once; the
    /// body is a single-subscription stream.
    pub fn into_body(self) -> Body {
        self.body
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }
}

/// Builds a [`Response`] from a raw `http::Response<Body>`, the
/// construction path an [`crate::interceptor::ExchangeInterceptor`] needs to
/// synthesize a response and short-circuit the chain (spec.md §4.5).
impl From<http::Response<Body>> for Response {
    fn from(resp: http::Response<Body>) -> Self {
        Response::from_http(resp)
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("headers", &self.headers)
            .finish()
    }
}
