//! Protocol negotiation and the H2C cleartext upgrade (spec.md §4.3).
//!
//! ALPN: grounded in the teacher's `Alpn` selection in
//! `core/client/connect/mod.rs`, generalized from BoringSSL to `rustls`
//! (see DESIGN.md). H2C: there is no direct teacher analogue (the teacher
//! always runs with TLS for its impersonation use case), so the
//! upgrade-then-replay state machine below is grounded in `hyper`'s own
//! documented upgrade mechanism (`hyper::upgrade`, the same primitive this
//! crate's WebSocket path in `websocket/mod.rs` builds on) applied to the
//! RFC 7540 §3.2 handshake this spec names.

use std::net::SocketAddr;

use http::{HeaderValue, Request};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use crate::body::Body;
use crate::config::{HttpVersion, NetConfig};
use crate::conn::{self, Connection};
use crate::dns;
use crate::error::{Error, Result};
use crate::pool;
use crate::tls::TlsConfig;

/// Opens new transport connections for one endpoint and negotiates the
/// protocol, per spec.md §4.3.
pub(crate) struct Connector {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) versions: Vec<HttpVersion>,
    pub(crate) tls: TlsConfig,
    pub(crate) net: NetConfig,
    pub(crate) http1_max_concurrent: usize,
    pub(crate) http2_initial_stream_window: u32,
    pub(crate) http2_initial_conn_window: u32,
    pub(crate) http2_max_concurrent_streams: Option<u32>,
}

#[async_trait::async_trait]
impl pool::Connector<Connection> for Connector {
    async fn connect(&self) -> Result<Connection> {
        let addr = dns::resolve(&self.host, self.port, self.net.dns_resolution_timeout()).await?;
        let tcp = dns::connect_tcp(addr, &self.net).await?;

        if self.tls.enabled {
            self.connect_tls(tcp, addr).await
        } else {
            self.connect_cleartext(tcp, addr).await
        }
    }
}

impl Connector {
    #[cfg(feature = "__rustls")]
    async fn connect_tls(&self, tcp: TcpStream, addr: SocketAddr) -> Result<Connection> {
        use tokio_rustls::rustls::ServerName;
        use tokio_rustls::TlsConnector;

        let client_config = crate::tls::connector::build_client_config(&self.tls)?;
        let connector = TlsConnector::from(client_config);
        let server_name = ServerName::try_from(self.host.as_str())
            .map_err(|_| Error::protocol_negotiation("invalid server name for TLS"))?;

        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(Error::io)?;

        let negotiated_h2 = {
            let (_, session) = tls_stream.get_ref();
            session.alpn_protocol() == Some(b"h2".as_ref())
        };

        if negotiated_h2 {
            if !self.versions.contains(&HttpVersion::Http2) {
                return Err(Error::protocol_negotiation(
                    "server selected h2 but it was not offered",
                ));
            }
            let conn = conn::http2::Connection::handshake(
                tls_stream,
                addr,
                self.http2_initial_stream_window,
                self.http2_initial_conn_window,
                self.http2_max_concurrent_streams,
            )
            .await?;
            Ok(Connection::Http2(conn))
        } else {
            if !self.versions.contains(&HttpVersion::Http1) {
                return Err(Error::protocol_negotiation(
                    "server did not select h2 and http/1.1 was not offered",
                ));
            }
            let conn =
                conn::http1::Connection::handshake(tls_stream, addr, self.http1_max_concurrent)
                    .await?;
            Ok(Connection::Http1(conn))
        }
    }

    #[cfg(not(feature = "__rustls"))]
    async fn connect_tls(&self, _tcp: TcpStream, _addr: SocketAddr) -> Result<Connection> {
        Err(Error::protocol_negotiation(
            "tls_enabled requires a rustls-tls* feature to be compiled in",
        ))
    }

    async fn connect_cleartext(&self, tcp: TcpStream, addr: SocketAddr) -> Result<Connection> {
        let wants_h2 = self.versions.contains(&HttpVersion::Http2);
        let wants_h1 = self.versions.contains(&HttpVersion::Http1);

        match (wants_h2, wants_h1) {
            (true, false) => {
                // Prior-knowledge HTTP/2: no upgrade dance, speak h2
                // directly on the cleartext socket.
                let conn = conn::http2::Connection::handshake(
                    tcp,
                    addr,
                    self.http2_initial_stream_window,
                    self.http2_initial_conn_window,
                    self.http2_max_concurrent_streams,
                )
                .await?;
                Ok(Connection::Http2(conn))
            }
            (false, true) => {
                let conn =
                    conn::http1::Connection::handshake(tcp, addr, self.http1_max_concurrent)
                        .await?;
                Ok(Connection::Http1(conn))
            }
            (true, true) => Ok(Connection::PendingH2c(PendingH2c::new(
                tcp,
                addr,
                self.http1_max_concurrent,
                self.http2_initial_stream_window,
                self.http2_initial_conn_window,
                self.http2_max_concurrent_streams,
            ))),
            (false, false) => Err(Error::protocol_negotiation(
                "no http version configured for a cleartext endpoint",
            )),
        }
    }
}

pub(crate) trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

struct UnresolvedIo {
    io: Box<dyn IoStream>,
    http1_max_concurrent: usize,
    http2_initial_stream_window: u32,
    http2_initial_conn_window: u32,
    http2_max_concurrent_streams: Option<u32>,
}

enum H2cState {
    Unresolved(Option<UnresolvedIo>),
    Resolved(Connection),
}

/// A cleartext connection that hasn't yet decided between HTTP/1.1 and
/// H2C. The decision rides on the *first request* dispatched: it is sent
/// with `Connection: Upgrade` and an `HTTP2-Settings` header; a `101`
/// response means the rest of the connection's life is HTTP/2, anything
/// else means plain HTTP/1.1 from here on. The mutex simply serializes the
/// (one-time) resolution — once `Resolved`, every later `send` only takes
/// the lock long enough to read the variant.
pub(crate) struct PendingH2c {
    state: AsyncMutex<H2cState>,
    addr: SocketAddr,
    /// The pool's own exchange-scoped in-flight count (see
    /// `pool::PoolableConnection::note_acquired`/`note_released`). Tracked
    /// here rather than delegated to the eventually-resolved inner
    /// connection, since the outer `Connection::PendingH2c` wrapper is what
    /// the pool's `Slot` holds for the life of the connection — it never
    /// gets swapped out once `H2cState` resolves.
    in_flight: std::sync::atomic::AtomicUsize,
}

impl PendingH2c {
    fn new(
        tcp: TcpStream,
        addr: SocketAddr,
        http1_max_concurrent: usize,
        http2_initial_stream_window: u32,
        http2_initial_conn_window: u32,
        http2_max_concurrent_streams: Option<u32>,
    ) -> Self {
        PendingH2c {
            state: AsyncMutex::new(H2cState::Unresolved(Some(UnresolvedIo {
                io: Box::new(tcp),
                http1_max_concurrent,
                http2_initial_stream_window,
                http2_initial_conn_window,
                http2_max_concurrent_streams,
            }))),
            addr,
            in_flight: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(std::sync::atomic::Ordering::SeqCst)
    }

    pub(crate) fn note_acquired(&self) {
        self.in_flight.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn note_released(&self) {
        self.in_flight.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
    }

    pub(crate) fn max_concurrent(&self) -> usize {
        match self.state.try_lock() {
            Ok(guard) => match &*guard {
                H2cState::Resolved(c) => c.max_concurrent(),
                H2cState::Unresolved(_) => 1,
            },
            Err(_) => 1,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        match self.state.try_lock() {
            Ok(guard) => match &*guard {
                H2cState::Resolved(c) => c.is_closed(),
                H2cState::Unresolved(_) => false,
            },
            Err(_) => false,
        }
    }

    pub(crate) fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn poison(&self) {
        if let Ok(guard) = self.state.try_lock() {
            if let H2cState::Resolved(conn) = &*guard {
                conn.poison();
            }
        }
    }

    pub(crate) async fn send(&self, req: Request<Body>) -> Result<http::Response<Body>> {
        let mut guard = self.state.lock().await;
        if let H2cState::Resolved(conn) = &*guard {
            return conn.send(req).await;
        }
        let (conn, response) = self.resolve_with_first_request(&mut guard, req).await?;
        *guard = H2cState::Resolved(conn);
        Ok(response)
    }

    async fn resolve_with_first_request(
        &self,
        guard: &mut H2cState,
        mut req: Request<Body>,
    ) -> Result<(Connection, http::Response<Body>)> {
        let unresolved = match guard {
            H2cState::Unresolved(slot) => slot
                .take()
                .expect("resolve_with_first_request called twice on the same slot"),
            H2cState::Resolved(_) => unreachable!("send() already handled the resolved case"),
        };

        let replay_method = req.method().clone();
        let replay_uri = req.uri().clone();
        let replay_headers = req.headers().clone();
        upgrade_headers(&mut req);

        let (mut send_request, h1_conn) = hyper::client::conn::Builder::new()
            .http2_only(false)
            .handshake(unresolved.io)
            .await
            .map_err(Error::transport_connect)?;

        // Drive the connection in the background, exactly as the teacher's
        // own upgrade path (`core/client/upgrade.rs`'s `CanUpgrade`) expects
        // callers to: the driver notices the 101 and parks, handing the raw
        // I/O to `hyper::upgrade::on` once we ask for it below.
        let closed = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let closed_task = std::sync::Arc::clone(&closed);
        tokio::spawn(async move {
            if let Err(err) = h1_conn.await {
                if !err.is_closed() {
                    debug!("h2c probe connection driver ended with error: {err}");
                }
            }
            closed_task.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        send_request
            .ready()
            .await
            .map_err(Error::transport_connect)?;
        let mut resp = send_request
            .send_request(req)
            .await
            .map_err(Error::transport_connect)?;

        if resp.status() == http::StatusCode::SWITCHING_PROTOCOLS {
            let upgraded = hyper::upgrade::on(&mut resp)
                .await
                .map_err(|e| Error::upgrade(e.to_string()))?;
            let conn = conn::http2::Connection::handshake(
                upgraded,
                self.addr,
                unresolved.http2_initial_stream_window,
                unresolved.http2_initial_conn_window,
                unresolved.http2_max_concurrent_streams,
            )
            .await?;

            let mut replay = Request::builder().method(replay_method).uri(replay_uri);
            *replay.headers_mut().expect("builder headers available") = replay_headers;
            let replay = replay.body(Body::empty()).map_err(Error::from)?;

            let response = conn.send(replay).await?;
            Ok((Connection::Http2(conn), response))
        } else {
            let (parts, body) = resp.into_parts();
            let response = http::Response::from_parts(parts, conn::wrap_hyper_body(body));
            let http1_conn = conn::http1::Connection::from_parts(
                send_request,
                self.addr,
                unresolved.http1_max_concurrent,
                closed,
            );
            Ok((Connection::Http1(http1_conn), response))
        }
    }
}

#[cfg(test)]
impl PendingH2c {
    fn new_with_io(io: Box<dyn IoStream>, addr: SocketAddr) -> Self {
        PendingH2c {
            state: AsyncMutex::new(H2cState::Unresolved(Some(UnresolvedIo {
                io,
                http1_max_concurrent: 100,
                http2_initial_stream_window: 65535,
                http2_initial_conn_window: 1 << 20,
                http2_max_concurrent_streams: None,
            }))),
            addr,
            in_flight: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn is_resolved(&self) -> bool {
        matches!(&*self.state.try_lock().expect("uncontended in test"), H2cState::Resolved(_))
    }
}

fn upgrade_headers(req: &mut Request<Body>) {
    let headers = req.headers_mut();
    headers.insert(
        http::header::CONNECTION,
        HeaderValue::from_static("Upgrade, HTTP2-Settings"),
    );
    headers.insert(http::header::UPGRADE, HeaderValue::from_static("h2c"));
    // An empty SETTINGS frame, base64url-encoded with no padding, per
    // RFC 7540 §3.2.1 — the client advertises no non-default settings.
    headers.insert("http2-settings", HeaderValue::from_static("AAAAAAAAAAA"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn test_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn unresolved_state_reports_max_concurrent_one_and_not_closed() {
        let (client_io, _server_io) = tokio::io::duplex(64);
        let pending = PendingH2c::new_with_io(Box::new(client_io), test_addr());

        assert_eq!(pending.max_concurrent(), 1);
        assert!(!pending.is_closed());
        assert!(!pending.is_resolved());
    }

    #[tokio::test]
    async fn in_flight_tracks_acquire_and_release_independent_of_state() {
        let (client_io, _server_io) = tokio::io::duplex(64);
        let pending = PendingH2c::new_with_io(Box::new(client_io), test_addr());

        assert_eq!(pending.in_flight(), 0);
        pending.note_acquired();
        pending.note_acquired();
        assert_eq!(pending.in_flight(), 2);
        pending.note_released();
        assert_eq!(pending.in_flight(), 1);
        assert!(!pending.is_resolved());
    }

    /// Drives `H2cState` from `Unresolved` to `Resolved` via the plain
    /// HTTP/1.1 fallback path: the fake server never answers with `101`, so
    /// `resolve_with_first_request` must settle on `Connection::Http1`
    /// rather than attempting the h2 replay.
    #[tokio::test]
    async fn resolves_to_http1_when_server_does_not_switch_protocols() {
        let (client_io, mut server_io) = tokio::io::duplex(8192);
        let pending = PendingH2c::new_with_io(Box::new(client_io), test_addr());

        let server = tokio::spawn(async move {
            let mut buf = vec![0u8; 8192];
            let mut total = 0;
            loop {
                let n = server_io.read(&mut buf[total..]).await.expect("read request");
                assert!(n > 0, "client closed before sending a full request");
                total += n;
                if buf[..total].windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
            server_io
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n")
                .await
                .expect("write response");
        });

        let req = Request::builder()
            .method(http::Method::GET)
            .uri("/")
            .body(Body::empty())
            .expect("request builds");

        let response = pending.send(req).await.expect("h2c probe resolves");
        assert_eq!(response.status(), http::StatusCode::OK);
        assert!(pending.is_resolved());

        server.await.expect("fake server task did not panic");
    }
}
