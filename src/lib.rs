#![deny(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # vortex-http
//!
//! A reactive, connection-pooled, multi-protocol HTTP client: HTTP/1.1,
//! HTTP/2 (including the H2C cleartext upgrade), and WebSocket, built on
//! `hyper` 0.14 and `tokio`.
//!
//! The entry point is [`HttpClient`], which hands out [`Endpoint`]s bound
//! to a `(scheme, host, port)` triple. An `Endpoint` owns its own
//! connection pool — admission, parking, recycling and scaling all happen
//! per endpoint, not globally — and is the type requests are actually sent
//! through:
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), vortex_http::Error> {
//! use vortex_http::{HttpClient, Scheme};
//!
//! let client = HttpClient::new();
//! let endpoint = client.endpoint::<()>(Scheme::Https, "example.invalid", 443);
//!
//! let exchange = endpoint.get("/").send().await?;
//! let response = exchange.into_response();
//! println!("status = {}", response.status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Exchange context
//!
//! `Endpoint<Ctx>`, `Request<Ctx>` and `Exchange<Ctx>` all carry a generic
//! `Ctx` type parameter that rides along with a request through the
//! interceptor chain and back out with the response, for callers that want
//! to correlate a request with application-level state without a side
//! table. Most callers can leave it as `()`.
//!
//! ## Interceptors
//!
//! An [`ExchangeInterceptor`] runs before every request is dispatched and
//! can rewrite the request, short-circuit it with a synthesized response,
//! or let it through unchanged.
//!
//! ## WebSocket
//!
//! With the `websocket` feature (on by default), `Endpoint::websocket_request`
//! upgrades an `http`/`https` endpoint connection to a WebSocket duplex.
//! The upgraded connection is detached from the endpoint's pool — it is no
//! longer counted against pool capacity once the upgrade completes.
//!
//! ## Optional features
//!
//! - **websocket**: WebSocket upgrade support (`Endpoint::websocket_request`).
//! - **gzip**, **brotli**, **zstd**, **deflate**: response body decompression.
//! - **rustls-tls-webpki-roots** / **rustls-tls-native-roots** /
//!   **rustls-tls-manual-roots**: TLS backends, all via `rustls`.
//! - **json**: `serde_json`-backed request/response body helpers.

#[macro_use]
mod trace;

mod body;
mod client;
mod config;
mod conn;
#[cfg(any(
    feature = "gzip",
    feature = "brotli",
    feature = "zstd",
    feature = "deflate"
))]
mod decode;
mod dns;
mod endpoint;
mod error;
mod exchange;
mod interceptor;
mod into_uri;
mod negotiation;
mod pool;
mod request;
mod response;
pub mod tls;
mod util;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use crate::body::Body;
pub use crate::client::HttpClient;
pub use crate::config::{
    Http1Config, Http2Config, HttpClientConfig, HttpClientConfigBuilder, HttpVersion, NetConfig,
    PoolConfig,
};
pub use crate::endpoint::{Endpoint, EndpointBuilder, Scheme};
pub use crate::error::{Error, Result};
pub use crate::exchange::Exchange;
pub use crate::interceptor::{ExchangeInterceptor, InterceptableExchange};
pub use crate::pool::PoolSnapshot;
pub use crate::request::{Request, RequestBuilder};
pub use crate::response::Response;
pub use crate::tls::{AlpnProtocol, CertStore, Identity, TlsConfig};

#[cfg(feature = "websocket")]
pub use crate::websocket::{
    CloseCode, Frame, FrameExchange, FrameKind, Message, WebSocketExchange, WebSocketRequestBuilder,
};

pub use http::header;
pub use http::Method;
pub use http::{StatusCode, Version};

fn _assert_impls() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_clone<T: Clone>() {}

    assert_send::<HttpClient>();
    assert_sync::<HttpClient>();
    assert_clone::<HttpClient>();

    assert_send::<Endpoint>();
    assert_sync::<Endpoint>();

    assert_send::<Request>();
    assert_send::<Response>();
    assert_send::<Exchange>();

    assert_send::<Error>();
    assert_sync::<Error>();

    #[cfg(feature = "websocket")]
    assert_send::<WebSocketExchange>();
    #[cfg(feature = "websocket")]
    assert_send::<FrameExchange>();
}
