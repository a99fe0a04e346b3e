//! TLS configuration and ALPN protocol identifiers.
//!
//! The teacher defaults to BoringSSL with JA3/JA4 impersonation
//! (`src/tls.rs`, `src/tls/impersonate/*`); that fingerprinting surface is
//! out of scope here (see DESIGN.md). vortex-http keeps the teacher's
//! `TlsOptions`-style builder shape but backs it with `rustls` via
//! `hyper-rustls`, and keeps the same `AlpnProtocol` identifiers.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

/// A TLS ALPN protocol identifier, as sent on the wire.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct AlpnProtocol(&'static [u8]);

impl AlpnProtocol {
    /// `http/1.1`
    pub const HTTP1: AlpnProtocol = AlpnProtocol(b"http/1.1");
    /// `h2`
    pub const HTTP2: AlpnProtocol = AlpnProtocol(b"h2");

    pub const fn new(value: &'static [u8]) -> Self {
        AlpnProtocol(value)
    }

    pub(crate) fn as_bytes(&self) -> &'static [u8] {
        self.0
    }

    #[allow(dead_code)]
    fn encode_sequence<'a, I>(items: I) -> Bytes
    where
        I: IntoIterator<Item = &'a AlpnProtocol>,
    {
        let mut buf = BytesMut::new();
        for item in items {
            buf.put_u8(item.0.len() as u8);
            buf.extend_from_slice(item.0);
        }
        buf.freeze()
    }
}

/// A client certificate plus private key, for mutual TLS.
#[derive(Debug, Clone)]
pub struct Identity {
    pub(crate) cert_path: PathBuf,
    pub(crate) key_path: PathBuf,
}

impl Identity {
    pub fn from_pem_files(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Identity {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }
}

/// A custom trust anchor store, loaded from a PEM bundle on disk.
#[derive(Debug, Clone)]
pub struct CertStore {
    pub(crate) path: PathBuf,
}

impl CertStore {
    pub fn from_pem_file(path: impl Into<PathBuf>) -> Self {
        CertStore { path: path.into() }
    }
}

/// TLS configuration for an [`crate::endpoint::Endpoint`].
///
/// `tls_enabled` triggers ALPN negotiation in the order given by
/// `alpn_protocols`; the pool's H2C path (`src/negotiation.rs`) is used
/// instead when TLS is off and both HTTP versions are configured.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub enabled: bool,
    pub trust_all: bool,
    pub trust_store: Option<CertStore>,
    pub identity: Option<Identity>,
    pub alpn_protocols: Vec<AlpnProtocol>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        TlsConfig {
            enabled: false,
            trust_all: false,
            trust_store: None,
            identity: None,
            alpn_protocols: vec![AlpnProtocol::HTTP2, AlpnProtocol::HTTP1],
        }
    }
}

#[cfg(feature = "__rustls")]
pub(crate) mod connector {
    use super::*;
    use std::io::BufReader;
    use std::fs::File;

    use rustls::{ClientConfig, RootCertStore};

    /// Build a `rustls::ClientConfig` from a [`TlsConfig`], wired for ALPN.
    pub(crate) fn build_client_config(cfg: &TlsConfig) -> crate::error::Result<Arc<ClientConfig>> {
        let mut roots = RootCertStore::empty();

        #[cfg(feature = "rustls-tls-webpki-roots")]
        {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        #[cfg(feature = "rustls-tls-native-roots")]
        {
            if let Ok(native) = rustls_native_certs::load_native_certs() {
                for cert in native {
                    let _ = roots.add(cert.into());
                }
            }
        }

        if let Some(store) = &cfg.trust_store {
            let file = File::open(&store.path).map_err(crate::error::Error::io)?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader).flatten() {
                let _ = roots.add(cert);
            }
        }

        let builder = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots);

        let mut client_config = if let Some(identity) = &cfg.identity {
            let cert_file = File::open(&identity.cert_path).map_err(crate::error::Error::io)?;
            let key_file = File::open(&identity.key_path).map_err(crate::error::Error::io)?;
            let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(cert_file))
                .flatten()
                .collect();
            let mut keys = rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file))
                .flatten()
                .collect::<Vec<_>>();
            let key = keys
                .pop()
                .ok_or_else(|| crate::error::Error::builder("no private key found"))?;
            builder
                .with_client_auth_cert(certs, rustls::PrivateKey(key))
                .map_err(crate::error::Error::builder)?
        } else {
            builder.with_no_client_auth()
        };

        client_config.alpn_protocols = cfg
            .alpn_protocols
            .iter()
            .map(|p| p.as_bytes().to_vec())
            .collect();

        Ok(Arc::new(client_config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpn_protocol_encode_sequence() {
        let alpn = AlpnProtocol::encode_sequence(&[AlpnProtocol::HTTP2, AlpnProtocol::HTTP1]);
        assert_eq!(alpn, Bytes::from_static(b"\x02h2\x08http/1.1"));
    }

    #[test]
    fn default_alpn_order_prefers_h2() {
        let cfg = TlsConfig::default();
        assert_eq!(cfg.alpn_protocols[0], AlpnProtocol::HTTP2);
        assert_eq!(cfg.alpn_protocols[1], AlpnProtocol::HTTP1);
    }
}
