//! Per-connection transports: an HTTP/1.1 pipeline or an HTTP/2 stream
//! table, each wrapping a `hyper::client::conn` handshake. Spec.md §3's
//! `PooledConnection` and §4.4's exchange dispatch live here.
//!
//! Grounded in the teacher's `core::client::mod.rs` (`PoolClient`/`PoolTx`
//! enum distinguishing an HTTP/1 `SendRequest` from an HTTP/2 one) and its
//! `core::proto::h2::client` module for HTTP/2 stream accounting.

pub(crate) mod http1;
pub(crate) mod http2;

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use http_body::Body as _;

use crate::body::Body;
use crate::error::BoxError;
use crate::pool::PoolableConnection;

/// A pooled connection: negotiated to HTTP/1.1 or HTTP/2, or still deciding
/// via the H2C upgrade probe (see `crate::negotiation::PendingH2c`).
pub(crate) enum Connection {
    Http1(http1::Connection),
    Http2(http2::Connection),
    PendingH2c(crate::negotiation::PendingH2c),
}

impl Connection {
    pub(crate) async fn send(
        &self,
        req: http::Request<Body>,
    ) -> crate::error::Result<http::Response<Body>> {
        match self {
            Connection::Http1(c) => c.send(req).await,
            Connection::Http2(c) => c.send(req).await,
            Connection::PendingH2c(c) => c.send(req).await,
        }
    }

    pub(crate) fn negotiated_protocol(&self) -> &'static str {
        match self {
            Connection::Http1(_) => "http/1.1",
            Connection::Http2(_) => "h2",
            Connection::PendingH2c(_) => "h2c (pending)",
        }
    }

    /// `true` once the connection has settled on HTTP/1.1 (directly, or
    /// after the H2C probe declined the upgrade) — the protocol for which
    /// mid-stream cancellation cannot be handled by a stream-level RST and
    /// must close the whole connection (spec.md §4.4).
    pub(crate) fn is_pipelined(&self) -> bool {
        matches!(self, Connection::Http1(_))
    }

    pub(crate) fn remote_addr(&self) -> std::net::SocketAddr {
        match self {
            Connection::Http1(c) => c.remote_addr(),
            Connection::Http2(c) => c.remote_addr(),
            Connection::PendingH2c(c) => c.remote_addr(),
        }
    }

    /// Force the connection closed without waiting for the transport to
    /// notice, per spec.md §4.4's "HTTP/1.1 cancellation mid-stream closes
    /// the connection (pipelining cannot safely continue)" rule.
    pub(crate) fn poison(&self) {
        match self {
            Connection::Http1(c) => c.poison(),
            Connection::Http2(_) => {}
            Connection::PendingH2c(c) => c.poison(),
        }
    }
}

impl PoolableConnection for Connection {
    fn in_flight(&self) -> usize {
        match self {
            Connection::Http1(c) => c.in_flight(),
            Connection::Http2(c) => c.in_flight(),
            Connection::PendingH2c(c) => c.in_flight(),
        }
    }

    fn max_concurrent(&self) -> usize {
        match self {
            Connection::Http1(c) => c.max_concurrent(),
            Connection::Http2(c) => c.max_concurrent(),
            Connection::PendingH2c(c) => c.max_concurrent(),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            Connection::Http1(c) => c.is_closed(),
            Connection::Http2(c) => c.is_closed(),
            Connection::PendingH2c(c) => c.is_closed(),
        }
    }

    fn note_acquired(&self) {
        match self {
            Connection::Http1(c) => c.note_acquired(),
            Connection::Http2(c) => c.note_acquired(),
            Connection::PendingH2c(c) => c.note_acquired(),
        }
    }

    fn note_released(&self) {
        match self {
            Connection::Http1(c) => c.note_released(),
            Connection::Http2(c) => c.note_released(),
            Connection::PendingH2c(c) => c.note_released(),
        }
    }
}

/// Adapts a `hyper::Body` (always the response body type `hyper::client::
/// conn` hands back) into this crate's own [`Body`], so callers above the
/// connection layer never see a hyper type.
pub(crate) fn wrap_hyper_body(body: hyper::Body) -> Body {
    Body::wrap_stream(HyperBodyStream(body))
}

struct HyperBodyStream(hyper::Body);

impl Stream for HyperBodyStream {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.0)
            .poll_data(cx)
            .map(|opt| opt.map(|r| r.map_err(|e| Box::new(e) as BoxError)))
    }
}
