//! `Endpoint` (spec.md §3, §4.1): a process-lifetime object bound to
//! `(scheme, host, port, HttpClientConfig, NetConfig)`, owning one
//! [`ConnectionPool`] and driving every exchange's acquisition, dispatch and
//! release.
//!
//! Grounded in the teacher's `Client` (`src/client/client/mod.rs`): a
//! cheaply-cloneable handle wrapping an `Arc`'d inner state, with
//! `get`/`post`/`request` sugar over a single `execute` path. vortex-http
//! narrows "one client, many hosts" into "one endpoint, one host" per
//! spec.md §3's `Endpoint` lifecycle, and threads an application-typed
//! `Ctx` through per DESIGN NOTES §9.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::Method;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;

use crate::body::Body;
use crate::config::HttpClientConfig;
use crate::conn::Connection;
use crate::error::{Error, Result};
use crate::exchange::{self, Exchange, ReleasingBody};
use crate::interceptor::{self, InterceptableExchange};
use crate::negotiation;
use crate::pool::{ConnectionPool, PoolSnapshot};
use crate::request::{Request, RequestBuilder};
use crate::response::Response;
use crate::util;

/// The scheme an [`Endpoint`] was built for. Determines the default port
/// rule (spec.md §4.1) and whether TLS is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    fn is_tls(self) -> bool {
        matches!(self, Scheme::Https)
    }
}

/// A process-lifetime object bound to one `(scheme, host, port)` triple.
/// Build once, use concurrently, shut down once — idempotently (spec.md
/// §3's `Endpoint` lifecycle: build → serve → shutdown).
pub struct Endpoint<Ctx = ()> {
    scheme: Scheme,
    host: String,
    port: u16,
    config: HttpClientConfig,
    pool: Arc<ConnectionPool<Connection>>,
    last_remote_addr: Mutex<Option<SocketAddr>>,
    shutting_down: Arc<AtomicBool>,
    janitor: Mutex<Option<tokio::task::JoinHandle<()>>>,
    _ctx: std::marker::PhantomData<fn() -> Ctx>,
}

impl<Ctx> Endpoint<Ctx> {
    /// Build an endpoint for `host:port`, using `config` for pool sizing,
    /// protocol negotiation, timeouts and the ambient connector knobs.
    pub fn builder(scheme: Scheme, host: impl Into<String>, port: u16) -> EndpointBuilder<Ctx> {
        EndpointBuilder {
            scheme,
            host: host.into(),
            port,
            config: HttpClientConfig::default(),
            _ctx: std::marker::PhantomData,
        }
    }

    pub(crate) fn default_authority(&self) -> http::uri::Authority {
        let host = &self.host;
        let port = self.port;
        let raw = if util::is_default_port(self.scheme.as_str(), port) {
            host.clone()
        } else {
            format!("{host}:{port}")
        };
        raw.parse()
            .unwrap_or_else(|_| http::uri::Authority::from_static("localhost"))
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// The remote address of the most recently used connection, once at
    /// least one connection has been established (spec.md §4.1
    /// `getRemoteAddress`).
    pub fn remote_address(&self) -> Option<SocketAddr> {
        *self.last_remote_addr.lock()
    }

    /// Number of exchanges currently dispatched across every pooled
    /// connection (spec.md §4.1 `getActiveRequests`).
    pub fn active_requests(&self) -> u64 {
        self.pool.snapshot().in_flight as u64
    }

    /// Normalized saturation in `[0, 1]` (spec.md §4.1 `getLoadFactor`,
    /// §4.2's load factor formula).
    pub fn load_factor(&self) -> f32 {
        self.pool.snapshot().load_factor
    }

    /// A full occupancy snapshot, backing both of the above plus
    /// diagnostics.
    pub fn pool_snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Pure, no I/O: start building a request against this endpoint
    /// (spec.md §4.1 `request`).
    pub fn request(&self, method: Method, target: impl crate::into_uri::IntoTarget) -> RequestBuilder<'_, Ctx>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        RequestBuilder::new(self, method, target, None)
    }

    /// As [`Endpoint::request`], but carrying an application-typed context
    /// through interceptors and the resulting [`Exchange`].
    pub fn request_with_context(
        &self,
        method: Method,
        target: impl crate::into_uri::IntoTarget,
        context: Ctx,
    ) -> RequestBuilder<'_, Ctx>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        RequestBuilder::new(self, method, target, Some(context))
    }

    pub fn get(&self, target: impl crate::into_uri::IntoTarget) -> RequestBuilder<'_, Ctx>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        self.request(Method::GET, target)
    }

    pub fn post(&self, target: impl crate::into_uri::IntoTarget) -> RequestBuilder<'_, Ctx>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        self.request(Method::POST, target)
    }

    pub fn put(&self, target: impl crate::into_uri::IntoTarget) -> RequestBuilder<'_, Ctx>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        self.request(Method::PUT, target)
    }

    pub fn delete(&self, target: impl crate::into_uri::IntoTarget) -> RequestBuilder<'_, Ctx>
    where
        Ctx: Clone + Send + Sync + 'static,
    {
        self.request(Method::DELETE, target)
    }

    /// Hot trigger: acquiring a connection begins the moment this future is
    /// polled (spec.md §4.1 `send`'s "subscribing starts acquisition").
    pub(crate) async fn send(&self, request: Request<Ctx>) -> Result<Exchange<Ctx>>
    where
        Ctx: Send + Sync + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(Error::shutdown());
        }

        let Request {
            method,
            target,
            authority,
            headers,
            body,
            context,
            timeout,
            interceptors,
        } = request;

        let ie = InterceptableExchange {
            request: Request {
                method: method.clone(),
                target: target.clone(),
                authority: authority.clone(),
                headers,
                body,
                context,
                timeout,
                interceptors: Vec::new(),
            },
            synthesized_response: None,
        };
        let ie = interceptor::run_chain(&interceptors, ie).await?;

        if let Some(response) = ie.synthesized_response {
            return Ok(Exchange::new(method, target, ie.request.context, response));
        }
        let request = ie.request;

        let request_timeout = request.timeout.or(self.config.request_timeout());
        let deadline = request_timeout.map(|d| Instant::now() + d);

        let authority = request
            .authority
            .clone()
            .unwrap_or_else(|| self.default_authority());

        let acquire_and_dispatch = async {
            let lease = self.pool.acquire().await?;
            *self.last_remote_addr.lock() = Some(lease.conn.remote_addr());

            let mut headers = request.headers.clone();
            #[cfg(any(
                feature = "gzip",
                feature = "brotli",
                feature = "zstd",
                feature = "deflate"
            ))]
            crate::decode::maybe_set_accept_encoding(&mut headers, &self.config);
            let body = request.body.unwrap_or_else(Body::empty);
            #[cfg(any(
                feature = "gzip",
                feature = "brotli",
                feature = "zstd",
                feature = "deflate"
            ))]
            let body = crate::decode::maybe_compress(&mut headers, body, &self.config);
            let body = body.sequenced();

            let mut builder = http::Request::builder()
                .method(request.method.clone())
                .uri(
                    http::uri::Builder::new()
                        .scheme(self.scheme.as_str())
                        .authority(authority.clone())
                        .path_and_query(request.target.clone())
                        .build()
                        .map_err(Error::from)?,
                );
            *builder.headers_mut().expect("builder headers available") = headers;
            let wire_request = builder.body(body).map_err(Error::from)?;

            let response = lease.conn.send(wire_request).await;
            Ok::<_, Error>((lease, response))
        };

        let (lease, response) = match deadline {
            Some(d) => match tokio::time::timeout_at(tokio::time::Instant::from_std(d), acquire_and_dispatch).await {
                Ok(result) => result?,
                Err(_) => return Err(Error::request_timeout(request_timeout.unwrap())),
            },
            None => acquire_and_dispatch.await?,
        };

        match response {
            Ok(resp) => {
                let (mut parts, wire_body) = resp.into_parts();
                #[cfg(any(
                    feature = "gzip",
                    feature = "brotli",
                    feature = "zstd",
                    feature = "deflate"
                ))]
                let stream = crate::decode::maybe_decompress(
                    &mut parts.headers,
                    Box::pin(BodyStream(wire_body)),
                    &self.config,
                );
                #[cfg(not(any(
                    feature = "gzip",
                    feature = "brotli",
                    feature = "zstd",
                    feature = "deflate"
                )))]
                let stream: std::pin::Pin<
                    Box<dyn futures_core::Stream<Item = Result<bytes::Bytes, crate::error::BoxError>> + Send>,
                > = Box::pin(BodyStream(wire_body));
                let releasing = ReleasingBody::new(stream, lease, request_timeout);
                let body = exchange::body_from_releasing(releasing);
                let response = Response::from_http(http::Response::from_parts(parts, body));
                Ok(Exchange::new(method, target, request.context, response))
            }
            Err(err) => {
                let outcome = if err.is_transport_connect() {
                    crate::pool::Outcome::TransportFailed
                } else {
                    crate::pool::Outcome::Ok
                };
                lease.release(outcome);
                Err(err)
            }
        }
    }

    /// Pure, no I/O: start building a WebSocket upgrade request against
    /// this endpoint (spec.md §4.1 `webSocketRequest`).
    #[cfg(feature = "websocket")]
    pub fn websocket_request(
        &self,
        target: impl crate::into_uri::IntoTarget,
    ) -> crate::websocket::WebSocketRequestBuilder<'_, Ctx> {
        crate::websocket::WebSocketRequestBuilder::new(self, target, None)
    }

    /// As [`Endpoint::websocket_request`], carrying an application-typed
    /// context through to the resulting [`crate::websocket::WebSocketExchange`].
    #[cfg(feature = "websocket")]
    pub fn websocket_request_with_context(
        &self,
        target: impl crate::into_uri::IntoTarget,
        context: Ctx,
    ) -> crate::websocket::WebSocketRequestBuilder<'_, Ctx> {
        crate::websocket::WebSocketRequestBuilder::new(self, target, Some(context))
    }

    /// Hard shutdown: close every connection, fail every in-flight exchange
    /// and queued waiter with `Shutdown` (spec.md §4.2).
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.pool.shutdown_immediate();
        if let Some(handle) = self.janitor.lock().take() {
            handle.abort();
        }
    }

    /// Soft shutdown: stop admitting new acquisitions, let in-flight
    /// exchanges complete, then behave as [`Endpoint::shutdown`]. A timeout
    /// forces the hard path (spec.md §4.2). Idempotent: a second call sees
    /// `shutting_down` already set and completes immediately.
    pub async fn shutdown_gracefully(&self) {
        self.pool.mark_shutting_down();
        let deadline = Instant::now() + self.config.graceful_shutdown_timeout();
        while Instant::now() < deadline {
            if self.pool.is_idle() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.shutdown().await;
    }
}

struct BodyStream(crate::body::Body);

impl futures_core::Stream for BodyStream {
    type Item = Result<bytes::Bytes, crate::error::BoxError>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        use http_body::Body as _;
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.0)
            .poll_data(cx)
            .map(|opt| opt.map(|r| r.map_err(|e| Box::new(e) as crate::error::BoxError)))
    }
}

/// Builds an [`Endpoint`], wiring its connector and connection pool
/// (spec.md §3's `Endpoint` construction: "created once").
pub struct EndpointBuilder<Ctx = ()> {
    scheme: Scheme,
    host: String,
    port: u16,
    config: HttpClientConfig,
    _ctx: std::marker::PhantomData<fn() -> Ctx>,
}

impl<Ctx> EndpointBuilder<Ctx> {
    pub fn config(mut self, config: HttpClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Arc<Endpoint<Ctx>> {
        let mut tls = self.config.tls().clone();
        if self.scheme.is_tls() {
            tls.enabled = true;
        }

        let connector = Arc::new(negotiation::Connector {
            host: self.host.clone(),
            port: self.port,
            versions: self.config.versions().to_vec(),
            tls,
            net: self.config.net().clone(),
            http1_max_concurrent: self.config.http1().max_concurrent_requests(),
            http2_initial_stream_window: self.config.http2().initial_stream_window_size(),
            http2_initial_conn_window: self.config.http2().initial_connection_window_size(),
            http2_max_concurrent_streams: self.config.http2().max_concurrent_streams(),
        });

        let pool = ConnectionPool::new(self.config.pool().clone(), connector);
        let clean_period = self.config.pool().clean_period();
        let janitor_pool = Arc::clone(&pool);
        let janitor = tokio::spawn(async move {
            let mut interval = tokio::time::interval(clean_period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                janitor_pool.clean();
            }
        });

        Arc::new(Endpoint {
            scheme: self.scheme,
            host: self.host,
            port: self.port,
            config: self.config,
            pool,
            last_remote_addr: Mutex::new(None),
            shutting_down: Arc::new(AtomicBool::new(false)),
            janitor: Mutex::new(Some(janitor)),
            _ctx: std::marker::PhantomData,
        })
    }
}
