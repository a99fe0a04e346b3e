//! WebSocket upgrade and the frame/message duplex (spec.md §4.7).
//!
//! Grounded directly in the teacher's `src/client/websocket/mod.rs`:
//! `WebSocketRequestBuilder::send` builds the handshake request and
//! validates the server's response; `WebSocket` wraps `async_tungstenite`'s
//! `WebSocketStream` as both a `Stream<Item = Message>` and a
//! `Sink<Message>`. The connection dial itself has no teacher analogue
//! (the teacher always upgrades an already-pooled connection obtained
//! through its tower `Service` stack); spec.md §3 requires a WebSocket
//! connection to be *detached* — not pool-counted — so vortex-http dials
//! its own dedicated transport here rather than borrowing one from
//! `Endpoint`'s pool, reusing `negotiation`'s TLS/cleartext dial plumbing.

mod message;

use std::time::Duration;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_tungstenite::tungstenite::{self, protocol};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Version};
pub use message::{CloseCode, Frame, FrameKind, Message};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tungstenite::protocol::WebSocketConfig;

use crate::body::Body;
use crate::config::NetConfig;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::into_uri::IntoTarget;
use crate::negotiation::IoStream;
use crate::tls::TlsConfig;

type Upgraded = hyper::upgrade::Upgraded;

/// A live, upgraded WebSocket transport.
pub type InnerStream = async_tungstenite::WebSocketStream<Compat<Upgraded>>;

/// Builds the upgrade request for [`Endpoint::websocket_request`].
#[must_use = "WebSocketRequestBuilder does nothing until you call `send`"]
pub struct WebSocketRequestBuilder<'a, Ctx> {
    endpoint: &'a Endpoint<Ctx>,
    target: Result<http::uri::PathAndQuery>,
    headers: HeaderMap,
    context: Option<Ctx>,
    nonce: Option<String>,
    protocols: Vec<String>,
    config: WebSocketConfig,
}

impl<'a, Ctx> WebSocketRequestBuilder<'a, Ctx> {
    pub(crate) fn new(endpoint: &'a Endpoint<Ctx>, target: impl IntoTarget, context: Option<Ctx>) -> Self {
        WebSocketRequestBuilder {
            endpoint,
            target: target.into_target().map_err(Into::into),
            headers: HeaderMap::new(),
            context,
            nonce: None,
            protocols: Vec::new(),
            config: WebSocketConfig::default(),
        }
    }

    /// Sets the `Sec-WebSocket-Key` nonce explicitly (mostly for tests —
    /// by default a fresh one is generated per spec.md §4.7).
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.nonce = Some(key.into());
        self
    }

    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn header<K>(mut self, key: K, value: impl TryInto<HeaderValue>) -> Self
    where
        K: TryInto<http::HeaderName>,
    {
        if let (Ok(key), Ok(value)) = (key.try_into(), value.try_into()) {
            self.headers.insert(key, value);
        }
        self
    }

    pub fn max_frame_size(mut self, n: usize) -> Self {
        self.config.max_frame_size = Some(n);
        self
    }

    pub fn max_message_size(mut self, n: usize) -> Self {
        self.config.max_message_size = Some(n);
        self
    }

    /// Performs the dial, the HTTP/1.1 upgrade handshake, and validates the
    /// server's response (spec.md §4.7).
    pub async fn send(self) -> Result<WebSocketExchange<Ctx>> {
        let target = self.target?;
        let nonce = self
            .nonce
            .unwrap_or_else(|| tungstenite::handshake::client::generate_key());

        let mut headers = self.headers;
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(
            header::SEC_WEBSOCKET_KEY,
            HeaderValue::from_str(&nonce).map_err(Error::builder)?,
        );
        headers.insert(header::SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        if !self.protocols.is_empty() {
            let joined = self.protocols.join(", ");
            headers.insert(
                header::SEC_WEBSOCKET_PROTOCOL,
                HeaderValue::from_str(&joined).map_err(Error::builder)?,
            );
        }

        let endpoint = self.endpoint;
        let io = dial(
            endpoint.host(),
            endpoint.port(),
            endpoint.config().tls(),
            endpoint.config().net(),
        )
        .await?;

        let uri = http::uri::Builder::new()
            .scheme(if endpoint.config().tls().enabled { "https" } else { "http" })
            .authority(endpoint.default_authority())
            .path_and_query(target)
            .build()
            .map_err(Error::from)?;

        let mut builder = http::Request::builder().method(Method::GET).uri(uri).version(Version::HTTP_11);
        *builder.headers_mut().expect("builder headers available") = headers;
        let request = builder.body(Body::empty()).map_err(Error::from)?;

        let (mut send_request, conn) = hyper::client::conn::Builder::new()
            .http2_only(false)
            .handshake::<_, Body>(io)
            .await
            .map_err(Error::transport_connect)?;
        tokio::spawn(async move {
            if let Err(err) = conn.await {
                debug!("websocket handshake connection driver ended with error: {err}");
            }
        });

        send_request.ready().await.map_err(Error::transport_connect)?;
        let mut response = send_request
            .send_request(request)
            .await
            .map_err(Error::transport_connect)?;

        validate_handshake(&response, &nonce, &self.protocols)?;
        let protocol = response.headers().get(header::SEC_WEBSOCKET_PROTOCOL).cloned();

        let upgraded = hyper::upgrade::on(&mut response)
            .await
            .map_err(|e| Error::upgrade(e.to_string()))?;

        let inner = InnerStream::from_raw_socket(upgraded.compat(), protocol::Role::Client, Some(self.config)).await;

        Ok(WebSocketExchange {
            context: self.context,
            protocol,
            close_on_outbound_complete: endpoint.config().ws_close_on_outbound_complete(),
            inbound_close_timeout: endpoint.config().ws_inbound_close_frame_timeout(),
            inner,
        })
    }
}

fn validate_handshake(response: &http::Response<Body>, nonce: &str, requested_protocols: &[String]) -> Result<()> {
    if response.version() != Version::HTTP_11 && response.version() != Version::HTTP_10 {
        return Err(Error::websocket_handshake(format!(
            "unexpected response version: {:?}",
            response.version()
        )));
    }
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(Error::websocket_handshake(format!(
            "unexpected status code: {}",
            response.status()
        )));
    }
    if !header_contains_token(response.headers(), header::CONNECTION, "upgrade") {
        return Err(Error::websocket_handshake("missing Connection: Upgrade header"));
    }
    if !header_eq_ci(response.headers(), header::UPGRADE, "websocket") {
        return Err(Error::websocket_handshake("missing Upgrade: websocket header"));
    }
    match response.headers().get(header::SEC_WEBSOCKET_ACCEPT) {
        Some(accept) if accept.to_str().ok() == Some(tungstenite::handshake::derive_accept_key(nonce.as_bytes()).as_str()) => {}
        _ => return Err(Error::websocket_handshake("invalid Sec-WebSocket-Accept header")),
    }

    let echoed = response.headers().get(header::SEC_WEBSOCKET_PROTOCOL);
    match (requested_protocols.is_empty(), echoed) {
        (true, None) => Ok(()),
        (false, Some(value)) => {
            let echoed = value.to_str().map_err(|_| Error::websocket_handshake("invalid protocol header"))?;
            if requested_protocols.iter().any(|p| p == echoed) {
                Ok(())
            } else {
                Err(Error::websocket_handshake(format!("server echoed unrequested protocol: {echoed}")))
            }
        }
        (false, None) => Err(Error::websocket_handshake("server did not echo a subprotocol")),
        (true, Some(_)) => Err(Error::websocket_handshake("server offered a subprotocol that was never requested")),
    }
}

fn header_eq_ci(headers: &HeaderMap, name: http::HeaderName, value: &str) -> bool {
    headers.get(name).is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(value.as_bytes()))
}

fn header_contains_token(headers: &HeaderMap, name: http::HeaderName, token: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains(token))
}

async fn dial(host: &str, port: u16, tls: &TlsConfig, net: &NetConfig) -> Result<Box<dyn IoStream>> {
    let addr = crate::dns::resolve(host, port, net.dns_resolution_timeout()).await?;
    let tcp = crate::dns::connect_tcp(addr, net).await?;

    if !tls.enabled {
        return Ok(Box::new(tcp));
    }

    #[cfg(feature = "__rustls")]
    {
        use tokio_rustls::rustls::ServerName;
        use tokio_rustls::TlsConnector;

        let client_config = crate::tls::connector::build_client_config(tls)?;
        let connector = TlsConnector::from(client_config);
        let server_name = ServerName::try_from(host).map_err(|_| Error::protocol_negotiation("invalid server name for TLS"))?;
        let stream = connector.connect(server_name, tcp).await.map_err(Error::io)?;
        Ok(Box::new(stream))
    }
    #[cfg(not(feature = "__rustls"))]
    {
        Err(Error::protocol_negotiation("tls_enabled requires a rustls-tls* feature to be compiled in"))
    }
}

/// A *detached* connection (spec.md §3): the socket is removed from pool
/// accounting the moment the upgrade succeeds. Implements both
/// `Stream<Item = Result<Message>>` (Inbound) and `Sink<Message>`
/// (Outbound), the message-level view of the duplex. Per spec.md §4.7,
/// Inbound subscription is frames-or-messages, mutually exclusive: call
/// [`WebSocketExchange::into_frames`] instead to get the frame-level view,
/// which consumes this value so there is no way to hold both at once.
pub struct WebSocketExchange<Ctx = ()> {
    context: Option<Ctx>,
    protocol: Option<HeaderValue>,
    close_on_outbound_complete: bool,
    inbound_close_timeout: Duration,
    inner: InnerStream,
}

impl<Ctx> WebSocketExchange<Ctx> {
    pub fn context(&self) -> Option<&Ctx> {
        self.context.as_ref()
    }

    /// The subprotocol the server echoed back, if any.
    pub fn protocol(&self) -> Option<&HeaderValue> {
        self.protocol.as_ref()
    }

    /// Sends a Close frame and consumes the exchange immediately, without
    /// waiting for the peer's Close (for callers that want an explicit,
    /// synchronous close rather than the `finish` policy below).
    pub async fn close(mut self, code: CloseCode, reason: Option<&str>) -> Result<()> {
        self.inner
            .close(Some(tungstenite::protocol::CloseFrame {
                code: code.into(),
                reason: reason.unwrap_or_default().into(),
            }))
            .await
            .map_err(Error::from)
    }

    /// Applies spec.md §4.7's close-on-complete policy: once the outbound
    /// side is done, send a Close frame (if `ws_close_on_outbound_complete`,
    /// the default), then wait up to `ws_inbound_close_frame_timeout` for
    /// the peer's own Close before tearing the socket down.
    pub async fn finish(mut self) -> Result<()> {
        finish_inner(&mut self.inner, self.close_on_outbound_complete, self.inbound_close_timeout).await
    }

    /// Switches to the frame-level subscription mode (spec.md §4.7):
    /// consumes the message-level view and returns one where Inbound
    /// yields [`Frame`] rather than [`Message`]. The two modes are
    /// mutually exclusive by construction — once converted there is no
    /// way back to a `WebSocketExchange` without re-dialing.
    pub fn into_frames(self) -> FrameExchange<Ctx> {
        FrameExchange {
            context: self.context,
            protocol: self.protocol,
            close_on_outbound_complete: self.close_on_outbound_complete,
            inbound_close_timeout: self.inbound_close_timeout,
            inner: self.inner,
        }
    }
}

async fn finish_inner(inner: &mut InnerStream, close_on_outbound_complete: bool, inbound_close_timeout: Duration) -> Result<()> {
    if close_on_outbound_complete {
        let _ = SinkExt::<tungstenite::Message>::close(inner).await;
    }
    let wait_for_peer_close = async {
        while let Some(item) = inner.next().await {
            if matches!(item, Ok(tungstenite::Message::Close(_)) | Err(_)) {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(inbound_close_timeout, wait_for_peer_close).await;
    Ok(())
}

/// The frame-level view of a detached WebSocket duplex (spec.md §4.7),
/// obtained from [`WebSocketExchange::into_frames`]. Outbound is unchanged
/// from the message-level view (a client only ever composes whole
/// messages to send); Inbound yields [`Frame`] instead of [`Message`].
pub struct FrameExchange<Ctx = ()> {
    context: Option<Ctx>,
    protocol: Option<HeaderValue>,
    close_on_outbound_complete: bool,
    inbound_close_timeout: Duration,
    inner: InnerStream,
}

impl<Ctx> FrameExchange<Ctx> {
    pub fn context(&self) -> Option<&Ctx> {
        self.context.as_ref()
    }

    pub fn protocol(&self) -> Option<&HeaderValue> {
        self.protocol.as_ref()
    }

    pub async fn close(mut self, code: CloseCode, reason: Option<&str>) -> Result<()> {
        self.inner
            .close(Some(tungstenite::protocol::CloseFrame {
                code: code.into(),
                reason: reason.unwrap_or_default().into(),
            }))
            .await
            .map_err(Error::from)
    }

    pub async fn finish(mut self) -> Result<()> {
        finish_inner(&mut self.inner, self.close_on_outbound_complete, self.inbound_close_timeout).await
    }
}

impl<Ctx> Stream for FrameExchange<Ctx> {
    type Item = Result<Frame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match self.inner.poll_next_unpin(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::from(e)))),
                Poll::Ready(Some(Ok(raw))) => match Message::try_from(raw) {
                    Ok(msg) => Poll::Ready(Some(Ok(Frame::from(msg)))),
                    Err(_frame) => continue,
                },
            };
        }
    }
}

impl<Ctx> Sink<Message> for FrameExchange<Ctx> {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready_unpin(cx).map_err(Error::from)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<()> {
        self.inner.start_send_unpin(item.into()).map_err(Error::from)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        self.inner.poll_flush_unpin(cx).map_err(Error::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        self.inner.poll_close_unpin(cx).map_err(Error::from)
    }
}

impl<Ctx> Stream for WebSocketExchange<Ctx> {
    type Item = Result<Message>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        loop {
            return match self.inner.poll_next_unpin(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(Error::from(e)))),
                Poll::Ready(Some(Ok(raw))) => match Message::try_from(raw) {
                    Ok(msg) => Poll::Ready(Some(Ok(msg))),
                    Err(_frame) => continue,
                },
            };
        }
    }
}

impl<Ctx> Sink<Message> for WebSocketExchange<Ctx> {
    type Error = Error;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready_unpin(cx).map_err(Error::from)
    }

    fn start_send(mut self: Pin<&mut Self>, item: Message) -> Result<()> {
        self.inner.start_send_unpin(item.into()).map_err(Error::from)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        self.inner.poll_flush_unpin(cx).map_err(Error::from)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<()>> {
        self.inner.poll_close_unpin(cx).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepting_response(nonce: &str) -> http::Response<Body> {
        let accept = tungstenite::handshake::derive_accept_key(nonce.as_bytes());
        http::Response::builder()
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .version(Version::HTTP_11)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_ACCEPT, accept)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn validate_handshake_accepts_a_well_formed_response() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let response = accepting_response(nonce);
        assert!(validate_handshake(&response, nonce, &[]).is_ok());
    }

    #[test]
    fn validate_handshake_rejects_wrong_status() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let mut response = accepting_response(nonce);
        *response.status_mut() = StatusCode::OK;
        assert!(validate_handshake(&response, nonce, &[]).is_err());
    }

    #[test]
    fn validate_handshake_rejects_missing_upgrade_header() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let mut response = accepting_response(nonce);
        response.headers_mut().remove(header::CONNECTION);
        assert!(validate_handshake(&response, nonce, &[]).is_err());
    }

    #[test]
    fn validate_handshake_rejects_wrong_accept_key() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let mut response = accepting_response(nonce);
        response
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_ACCEPT, HeaderValue::from_static("not-the-right-value"));
        assert!(validate_handshake(&response, nonce, &[]).is_err());
    }

    #[test]
    fn validate_handshake_rejects_unrequested_protocol() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let mut response = accepting_response(nonce);
        response
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat"));
        assert!(validate_handshake(&response, nonce, &[]).is_err());
    }

    #[test]
    fn validate_handshake_accepts_requested_protocol_echoed_back() {
        let nonce = "dGhlIHNhbXBsZSBub25jZQ==";
        let mut response = accepting_response(nonce);
        response
            .headers_mut()
            .insert(header::SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("chat"));
        assert!(validate_handshake(&response, nonce, &["chat".to_string()]).is_ok());
    }

    #[test]
    fn header_contains_token_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Keep-Alive, Upgrade"));
        assert!(header_contains_token(&headers, header::CONNECTION, "upgrade"));
        assert!(!header_contains_token(&headers, header::CONNECTION, "close"));
    }
}
