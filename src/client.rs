//! `HttpClient` (spec.md §3: "the application asks an `HttpClient` for an
//! `Endpoint` bound to `(host, port, config)`").
//!
//! Grounded in the teacher's `Client`/`ClientBuilder` pair
//! (`src/client/client/mod.rs`): a cheaply-cloneable handle holding shared
//! defaults, with endpoints created on demand rather than the teacher's
//! single implicit connection pool shared across every `Uri` a `Client`
//! is asked to fetch. vortex-http's pool is per-`Endpoint` (spec.md §4.1),
//! so `HttpClient` itself owns no pool — it is just the config/defaults
//! factory spec.md §3 names.

use std::sync::Arc;

use crate::config::HttpClientConfig;
use crate::endpoint::{Endpoint, Scheme};

/// Builds [`Endpoint`]s that share a common default configuration.
///
/// Cloning an `HttpClient` is cheap (an `Arc` clone); every endpoint it
/// creates is independent afterwards and carries its own connection pool.
#[derive(Clone)]
pub struct HttpClient {
    defaults: Arc<HttpClientConfig>,
}

impl HttpClient {
    /// A client using every [`HttpClientConfig`] default.
    pub fn new() -> Self {
        HttpClient {
            defaults: Arc::new(HttpClientConfig::default()),
        }
    }

    /// A client whose endpoints default to `config` unless overridden via
    /// [`HttpClient::endpoint_builder`].
    pub fn with_config(config: HttpClientConfig) -> Self {
        HttpClient {
            defaults: Arc::new(config),
        }
    }

    /// The configuration new endpoints are built with by default.
    pub fn defaults(&self) -> &HttpClientConfig {
        &self.defaults
    }

    /// Build an [`Endpoint`] bound to `(scheme, host, port)`, using this
    /// client's default configuration (spec.md §3's `(host, port, config)`
    /// triple).
    pub fn endpoint<Ctx>(&self, scheme: Scheme, host: impl Into<String>, port: u16) -> Arc<Endpoint<Ctx>> {
        Endpoint::builder(scheme, host, port)
            .config((*self.defaults).clone())
            .build()
    }

    /// As [`HttpClient::endpoint`], but allowing per-endpoint overrides of
    /// this client's defaults before the endpoint is built.
    pub fn endpoint_builder<Ctx>(
        &self,
        scheme: Scheme,
        host: impl Into<String>,
        port: u16,
    ) -> crate::endpoint::EndpointBuilder<Ctx> {
        Endpoint::builder(scheme, host, port).config((*self.defaults).clone())
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        HttpClient::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_inherits_client_defaults() {
        let client = HttpClient::with_config(HttpClientConfig::builder().pool_max_size(7).build());
        let endpoint: Arc<Endpoint<()>> = client.endpoint(Scheme::Http, "example.invalid", 80);
        assert_eq!(endpoint.config().pool().max_size(), 7);
    }
}
