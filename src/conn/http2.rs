//! An HTTP/2 connection: a cloneable `SendRequest` backing concurrent
//! streams, with `in_flight` tracking the open stream count against the
//! server-negotiated (or configured) `max_concurrent_streams`.
//!
//! Grounded in the teacher's `core::proto::h2::client` (`SendRequest`
//! cloned per stream, `Config::max_concurrent_streams`).
//!
//! As with HTTP/1.1, the counter is pool-driven: `note_acquired`/
//! `note_released` bracket a `pool::Lease`'s full lifetime, not `send`'s —
//! `send_request(req).await` on a cloned h2 `SendRequest` resolves once
//! response headers arrive, well before the response body (a still-open
//! stream) finishes.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::body::Body;
use crate::error::{Error, Result};

pub(crate) struct Connection {
    send_request: hyper::client::conn::SendRequest<Body>,
    in_flight: Arc<AtomicUsize>,
    max_concurrent: usize,
    closed: Arc<AtomicBool>,
    remote_addr: SocketAddr,
}

impl Connection {
    pub(crate) async fn handshake<T>(
        io: T,
        remote_addr: SocketAddr,
        initial_stream_window: u32,
        initial_conn_window: u32,
        max_concurrent: Option<u32>,
    ) -> Result<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (send_request, conn) = hyper::client::conn::Builder::new()
            .http2_only(true)
            .http2_initial_stream_window_size(initial_stream_window)
            .http2_initial_connection_window_size(initial_conn_window)
            .handshake(io)
            .await
            .map_err(Error::transport_connect)?;

        let closed = Arc::new(AtomicBool::new(false));
        let closed_task = Arc::clone(&closed);
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!("http/2 connection driver ended with error: {err}");
            }
            closed_task.store(true, Ordering::SeqCst);
        });

        Ok(Connection {
            send_request,
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_concurrent: max_concurrent.unwrap_or(100) as usize,
            closed,
            remote_addr,
        })
    }

    pub(crate) fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn note_acquired(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn note_released(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Each exchange gets its own stream over a cloned `SendRequest`; h2
    /// multiplexes internally, so no lock is needed here unlike HTTP/1.1's
    /// single pipelined `SendRequest`.
    pub(crate) async fn send(&self, req: http::Request<Body>) -> Result<http::Response<Body>> {
        let mut send_request = self.send_request.clone();
        send_request
            .ready()
            .await
            .map_err(Error::transport_connect)?;
        let resp = send_request
            .send_request(req)
            .await
            .map_err(Error::transport_connect)?;
        let (parts, body) = resp.into_parts();
        Ok(http::Response::from_parts(
            parts,
            crate::conn::wrap_hyper_body(body),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn handshaked_connection(max_concurrent: Option<u32>) -> Connection {
        let (client_io, server_io) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let _ = hyper::server::conn::Http::new()
                .http2_only(true)
                .serve_connection(
                    server_io,
                    hyper::service::service_fn(|_req| async move {
                        Ok::<_, std::convert::Infallible>(hyper::Response::new(hyper::Body::empty()))
                    }),
                )
                .await;
        });
        let remote = "127.0.0.1:0".parse().unwrap();
        Connection::handshake(client_io, remote, 65535, 1 << 20, max_concurrent)
            .await
            .expect("h2 handshake over an in-memory duplex pair")
    }

    #[tokio::test]
    async fn fresh_connection_has_configured_max_concurrent() {
        let conn = handshaked_connection(Some(10)).await;
        assert_eq!(conn.max_concurrent(), 10);
        assert_eq!(conn.in_flight(), 0);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn note_acquired_and_released_are_independent_of_send() {
        let conn = handshaked_connection(Some(10)).await;
        conn.note_acquired();
        conn.note_acquired();
        conn.note_acquired();
        assert_eq!(conn.in_flight(), 3);
        conn.note_released();
        assert_eq!(conn.in_flight(), 2);
        conn.note_released();
        conn.note_released();
        assert_eq!(conn.in_flight(), 0);
    }

    #[tokio::test]
    async fn default_max_concurrent_when_server_does_not_negotiate_one() {
        let conn = handshaked_connection(None).await;
        assert_eq!(conn.max_concurrent(), 100);
    }
}
