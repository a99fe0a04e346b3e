//! The error taxonomy for the client.
//!
//! Every failure mode named in the specification's error handling design is
//! a variant of [`Kind`]. [`Error`] wraps a `Kind` with an optional boxed
//! cause and, where relevant, the address of the connection the error
//! occurred on.

use std::{error::Error as StdError, fmt, io, net::SocketAddr, time::Duration};

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// A specialized `Result` type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for all fallible operations in this crate.
pub struct Error {
    kind: Kind,
    source: Option<BoxError>,
    remote: Option<SocketAddr>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// `ConnectionPoolExhausted` — the wait queue was full.
    PoolExhausted,
    /// `ConnectionAcquisitionTimeout` — `pool_connect_timeout` elapsed.
    AcquisitionTimeout,
    /// `TransportConnectFailed` — DNS/TCP/TLS failure. Retryable at pool level.
    TransportConnect,
    /// `ProtocolNegotiationFailed` — ALPN or H2C upgrade refused.
    ProtocolNegotiation,
    /// `RequestTimeout` — the end-to-end `request_timeout` elapsed.
    RequestTimeout(Duration),
    /// `IdleTimeout` — a pooled connection's `idle_timeout` elapsed.
    IdleTimeout,
    /// `StreamReset` — an HTTP/2 stream was reset, locally or by the peer.
    StreamReset(Option<h2::Reason>),
    /// `ConnectionClosedPrematurely` — the transport closed mid-exchange.
    ConnectionClosed,
    /// `HeadersInvalid` — framing or header encoding violation.
    HeadersInvalid,
    /// `BodyInvalid` — body framing or encoding violation.
    BodyInvalid,
    /// `WebSocketHandshake` — the upgrade handshake failed.
    WebSocketHandshake,
    /// `Cancelled` — local cancellation by the application.
    Cancelled,
    /// `Shutdown` — the endpoint is shutting down.
    Shutdown,
    /// A malformed request as constructed by the caller (bad URI, header, etc).
    Builder,
    /// Any other transport-level I/O error without a more specific kind.
    Io,
    /// Decoding the response body (e.g. decompression) failed.
    Decode,
    /// The request or response did not satisfy a protocol upgrade precondition.
    Upgrade,
}

impl Error {
    pub(crate) fn new(kind: Kind, source: Option<BoxError>) -> Self {
        Error {
            kind,
            source,
            remote: None,
        }
    }

    pub(crate) fn with_remote(mut self, remote: SocketAddr) -> Self {
        self.remote = Some(remote);
        self
    }

    pub(crate) fn pool_exhausted() -> Self {
        Error::new(Kind::PoolExhausted, None)
    }

    pub(crate) fn acquisition_timeout() -> Self {
        Error::new(Kind::AcquisitionTimeout, None)
    }

    pub(crate) fn transport_connect<E: Into<BoxError>>(e: E) -> Self {
        Error::new(Kind::TransportConnect, Some(e.into()))
    }

    pub(crate) fn protocol_negotiation(msg: impl Into<String>) -> Self {
        Error::new(Kind::ProtocolNegotiation, Some(msg.into().into()))
    }

    pub(crate) fn request_timeout(d: Duration) -> Self {
        Error::new(Kind::RequestTimeout(d), None)
    }

    pub(crate) fn idle_timeout() -> Self {
        Error::new(Kind::IdleTimeout, None)
    }

    pub(crate) fn stream_reset(reason: Option<h2::Reason>) -> Self {
        Error::new(Kind::StreamReset(reason), None)
    }

    pub(crate) fn connection_closed() -> Self {
        Error::new(Kind::ConnectionClosed, None)
    }

    pub(crate) fn headers_invalid(msg: impl Into<String>) -> Self {
        Error::new(Kind::HeadersInvalid, Some(msg.into().into()))
    }

    pub(crate) fn body_invalid<E: Into<BoxError>>(e: E) -> Self {
        Error::new(Kind::BodyInvalid, Some(e.into()))
    }

    pub(crate) fn websocket_handshake(msg: impl Into<String>) -> Self {
        Error::new(Kind::WebSocketHandshake, Some(msg.into().into()))
    }

    pub(crate) fn cancelled() -> Self {
        Error::new(Kind::Cancelled, None)
    }

    pub(crate) fn shutdown() -> Self {
        Error::new(Kind::Shutdown, None)
    }

    pub(crate) fn builder<E: Into<BoxError>>(e: E) -> Self {
        Error::new(Kind::Builder, Some(e.into()))
    }

    pub(crate) fn io(e: io::Error) -> Self {
        Error::new(Kind::Io, Some(Box::new(e)))
    }

    pub(crate) fn decode<E: Into<BoxError>>(e: E) -> Self {
        Error::new(Kind::Decode, Some(e.into()))
    }

    pub(crate) fn upgrade(msg: impl Into<String>) -> Self {
        Error::new(Kind::Upgrade, Some(msg.into().into()))
    }

    /// The remote address of the connection this error occurred on, if known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Returns `true` if this is a `ConnectionPoolExhausted` error.
    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self.kind, Kind::PoolExhausted)
    }

    /// Returns `true` if this is a `ConnectionAcquisitionTimeout` error.
    pub fn is_acquisition_timeout(&self) -> bool {
        matches!(self.kind, Kind::AcquisitionTimeout)
    }

    /// Returns `true` if this is a `RequestTimeout` or `IdleTimeout` error.
    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, Kind::RequestTimeout(_) | Kind::IdleTimeout)
    }

    /// Returns `true` if this is a local `Cancelled` error.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, Kind::Cancelled)
    }

    /// Returns `true` if this is a `Shutdown` error.
    pub fn is_shutdown(&self) -> bool {
        matches!(self.kind, Kind::Shutdown)
    }

    /// Returns `true` if the failure occurred while establishing a new
    /// transport connection (and is therefore eligible for the pool's
    /// single-retry policy).
    pub fn is_transport_connect(&self) -> bool {
        matches!(self.kind, Kind::TransportConnect)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("Error");
        f.field("kind", &self.kind);
        if let Some(ref source) = self.source {
            f.field("source", source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::PoolExhausted => write!(f, "connection pool exhausted"),
            Kind::AcquisitionTimeout => write!(f, "timed out waiting for a pooled connection"),
            Kind::TransportConnect => write!(f, "failed to establish transport connection"),
            Kind::ProtocolNegotiation => write!(f, "protocol negotiation failed"),
            Kind::RequestTimeout(d) => write!(f, "request timed out after {d:?}"),
            Kind::IdleTimeout => write!(f, "connection idle timeout elapsed"),
            Kind::StreamReset(reason) => write!(f, "stream reset ({reason:?})"),
            Kind::ConnectionClosed => write!(f, "connection closed prematurely"),
            Kind::HeadersInvalid => write!(f, "invalid headers"),
            Kind::BodyInvalid => write!(f, "invalid body"),
            Kind::WebSocketHandshake => write!(f, "websocket handshake failed"),
            Kind::Cancelled => write!(f, "request cancelled"),
            Kind::Shutdown => write!(f, "endpoint is shutting down"),
            Kind::Builder => write!(f, "error building request"),
            Kind::Io => write!(f, "i/o error"),
            Kind::Decode => write!(f, "body decode error"),
            Kind::Upgrade => write!(f, "protocol upgrade error"),
        }?;
        if let Some(ref source) = self.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| &**e as _)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::builder(e)
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(e: http::uri::InvalidUri) -> Self {
        Error::builder(e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::builder(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::io(e)
    }
}

#[cfg(feature = "websocket")]
impl From<async_tungstenite::tungstenite::Error> for Error {
    fn from(e: async_tungstenite::tungstenite::Error) -> Self {
        Error::body_invalid(e)
    }
}
