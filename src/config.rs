//! Client configuration: the fields named in the external-interfaces table,
//! plus the ambient connector knobs a real transport needs.
//!
//! Grounded in the teacher's `ClientBuilder` (`src/client/client/mod.rs`) and
//! `Http1Config`/`Http2Config` (`src/client/config/http1.rs`, `http2.rs`):
//! a flat setter-per-option builder consumed by a single `build()`.

use std::net::IpAddr;
use std::time::Duration;

use crate::tls::TlsConfig;

/// Which HTTP versions an [`crate::endpoint::Endpoint`] is willing to
/// negotiate, and in what order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http1,
    Http2,
}

/// Top-level client configuration.
///
/// Built via [`HttpClientConfig::builder`]; every field has the default
/// named in the external-interfaces table.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub(crate) versions: Vec<HttpVersion>,
    pub(crate) tls: TlsConfig,
    pub(crate) pool: PoolConfig,
    pub(crate) net: NetConfig,
    pub(crate) http1: Http1Config,
    pub(crate) http2: Http2Config,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) compression_enabled: bool,
    pub(crate) decompression_enabled: bool,
    pub(crate) ws_close_on_outbound_complete: bool,
    pub(crate) ws_inbound_close_frame_timeout: Duration,
    pub(crate) graceful_shutdown_timeout: Duration,
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }

    pub fn versions(&self) -> &[HttpVersion] {
        &self.versions
    }

    pub fn tls(&self) -> &TlsConfig {
        &self.tls
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    pub fn decompression_enabled(&self) -> bool {
        self.decompression_enabled
    }

    pub fn ws_close_on_outbound_complete(&self) -> bool {
        self.ws_close_on_outbound_complete
    }

    pub fn ws_inbound_close_frame_timeout(&self) -> Duration {
        self.ws_inbound_close_frame_timeout
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        self.graceful_shutdown_timeout
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    pub fn net(&self) -> &NetConfig {
        &self.net
    }

    pub fn http1(&self) -> &Http1Config {
        &self.http1
    }

    pub fn http2(&self) -> &Http2Config {
        &self.http2
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        HttpClientConfig {
            versions: vec![HttpVersion::Http2, HttpVersion::Http1],
            tls: TlsConfig::default(),
            pool: PoolConfig::default(),
            net: NetConfig::default(),
            http1: Http1Config::default(),
            http2: Http2Config::default(),
            request_timeout: None,
            compression_enabled: false,
            decompression_enabled: false,
            ws_close_on_outbound_complete: true,
            ws_inbound_close_frame_timeout: Duration::from_secs(60),
            graceful_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Builder for [`HttpClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct HttpClientConfigBuilder {
    inner: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn http_protocol_versions(mut self, versions: Vec<HttpVersion>) -> Self {
        self.inner.versions = versions;
        self
    }

    pub fn tls_enabled(mut self, enabled: bool) -> Self {
        self.inner.tls.enabled = enabled;
        self
    }

    pub fn tls_trust_all(mut self, trust_all: bool) -> Self {
        self.inner.tls.trust_all = trust_all;
        self
    }

    pub fn pool_max_size(mut self, n: usize) -> Self {
        self.inner.pool.max_size = n;
        self
    }

    pub fn pool_buffer_size(mut self, n: Option<usize>) -> Self {
        self.inner.pool.buffer_size = n;
        self
    }

    pub fn pool_connect_timeout(mut self, d: Option<Duration>) -> Self {
        self.inner.pool.connect_timeout = d;
        self
    }

    pub fn pool_keep_alive_timeout(mut self, d: Duration) -> Self {
        self.inner.pool.keep_alive_timeout = d;
        self
    }

    pub fn pool_clean_period(mut self, d: Duration) -> Self {
        self.inner.pool.clean_period = d;
        self
    }

    pub fn pool_min_keep_alive_active(mut self, n: usize) -> Self {
        self.inner.pool.min_keep_alive_active = n;
        self
    }

    pub fn idle_timeout(mut self, d: Option<Duration>) -> Self {
        self.inner.pool.idle_timeout = d;
        self
    }

    pub fn http1_max_concurrent_requests(mut self, n: usize) -> Self {
        self.inner.http1.max_concurrent_requests = n;
        self
    }

    pub fn http2_max_concurrent_streams(mut self, n: Option<u32>) -> Self {
        self.inner.http2.max_concurrent_streams = n;
        self
    }

    pub fn http2_initial_stream_window_size(mut self, n: u32) -> Self {
        self.inner.http2.initial_stream_window_size = n;
        self
    }

    pub fn http2_initial_connection_window_size(mut self, n: u32) -> Self {
        self.inner.http2.initial_connection_window_size = n;
        self
    }

    pub fn request_timeout(mut self, d: Option<Duration>) -> Self {
        self.inner.request_timeout = d;
        self
    }

    pub fn compression_enabled(mut self, enabled: bool) -> Self {
        self.inner.compression_enabled = enabled;
        self
    }

    pub fn decompression_enabled(mut self, enabled: bool) -> Self {
        self.inner.decompression_enabled = enabled;
        self
    }

    pub fn ws_close_on_outbound_complete(mut self, close: bool) -> Self {
        self.inner.ws_close_on_outbound_complete = close;
        self
    }

    pub fn ws_inbound_close_frame_timeout(mut self, d: Duration) -> Self {
        self.inner.ws_inbound_close_frame_timeout = d;
        self
    }

    pub fn graceful_shutdown_timeout(mut self, d: Duration) -> Self {
        self.inner.graceful_shutdown_timeout = d;
        self
    }

    pub fn local_address(mut self, addr: Option<IpAddr>) -> Self {
        self.inner.net.local_address = addr;
        self
    }

    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.inner.net.tcp_nodelay = nodelay;
        self
    }

    pub fn tcp_keepalive(mut self, d: Option<Duration>) -> Self {
        self.inner.net.tcp_keepalive = d;
        self
    }

    pub fn dns_resolution_timeout(mut self, d: Option<Duration>) -> Self {
        self.inner.net.dns_resolution_timeout = d;
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.inner
    }
}

/// Pool sizing, timeouts and janitor cadence. Spec §6's table, §4.2's
/// operations.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub(crate) max_size: usize,
    pub(crate) buffer_size: Option<usize>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) keep_alive_timeout: Duration,
    pub(crate) clean_period: Duration,
    pub(crate) idle_timeout: Option<Duration>,
    pub(crate) min_keep_alive_active: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_size: 2,
            buffer_size: None,
            connect_timeout: None,
            keep_alive_timeout: Duration::from_secs(60),
            clean_period: Duration::from_millis(1000),
            idle_timeout: None,
            min_keep_alive_active: 0,
        }
    }
}

impl PoolConfig {
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn buffer_size(&self) -> Option<usize> {
        self.buffer_size
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        self.keep_alive_timeout
    }

    pub fn clean_period(&self) -> Duration {
        self.clean_period
    }

    pub fn min_keep_alive_active(&self) -> usize {
        self.min_keep_alive_active
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }
}

/// Ambient connector-level knobs (added: not a new feature, the transport
/// every endpoint needs regardless of protocol).
#[derive(Debug, Clone)]
pub struct NetConfig {
    pub(crate) local_address: Option<IpAddr>,
    pub(crate) interface: Option<String>,
    pub(crate) tcp_nodelay: bool,
    pub(crate) tcp_keepalive: Option<Duration>,
    pub(crate) dns_resolution_timeout: Option<Duration>,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            local_address: None,
            interface: None,
            tcp_nodelay: true,
            tcp_keepalive: None,
            dns_resolution_timeout: None,
        }
    }
}

impl NetConfig {
    pub fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    pub fn tcp_nodelay(&self) -> bool {
        self.tcp_nodelay
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        self.tcp_keepalive
    }

    pub fn dns_resolution_timeout(&self) -> Option<Duration> {
        self.dns_resolution_timeout
    }
}

/// HTTP/1.1-specific settings: pipelining depth.
#[derive(Debug, Clone)]
pub struct Http1Config {
    pub(crate) max_concurrent_requests: usize,
}

impl Default for Http1Config {
    fn default() -> Self {
        Http1Config {
            max_concurrent_requests: 1,
        }
    }
}

impl Http1Config {
    pub fn max_concurrent_requests(&self) -> usize {
        self.max_concurrent_requests
    }
}

/// HTTP/2-specific settings: stream cap and flow-control windows.
#[derive(Debug, Clone)]
pub struct Http2Config {
    pub(crate) max_concurrent_streams: Option<u32>,
    pub(crate) initial_stream_window_size: u32,
    pub(crate) initial_connection_window_size: u32,
}

impl Default for Http2Config {
    fn default() -> Self {
        Http2Config {
            max_concurrent_streams: None,
            initial_stream_window_size: 65_535,
            initial_connection_window_size: 65_535,
        }
    }
}

impl Http2Config {
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.max_concurrent_streams
    }

    pub fn initial_stream_window_size(&self) -> u32 {
        self.initial_stream_window_size
    }

    pub fn initial_connection_window_size(&self) -> u32 {
        self.initial_connection_window_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_interface_table() {
        let cfg = HttpClientConfig::default();
        assert_eq!(cfg.pool().max_size(), 2);
        assert_eq!(cfg.pool().keep_alive_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.pool().clean_period(), Duration::from_millis(1000));
        assert_eq!(cfg.http1().max_concurrent_requests(), 1);
        assert!(cfg.ws_close_on_outbound_complete());
        assert_eq!(
            cfg.ws_inbound_close_frame_timeout(),
            Duration::from_secs(60)
        );
        assert_eq!(cfg.graceful_shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.versions(), &[HttpVersion::Http2, HttpVersion::Http1]);
    }

    #[test]
    fn builder_overrides_apply() {
        let cfg = HttpClientConfig::builder()
            .pool_max_size(8)
            .http1_max_concurrent_requests(4)
            .tls_enabled(true)
            .build();
        assert_eq!(cfg.pool().max_size(), 8);
        assert_eq!(cfg.http1().max_concurrent_requests(), 4);
        assert!(cfg.tls().enabled);
    }
}
