//! Body compression/decompression (spec.md §6's `compression_enabled`/
//! `decompression_enabled`, §4.6 "Compression"): transparent response
//! decoding plus, symmetrically, gzip-encoding the outbound request body
//! when `compression_enabled` is set.
//!
//! The teacher decodes via `tower-http`'s `DecompressionLayer`
//! (`src/client/layer/decoder.rs`); this crate's `Cargo.toml` instead pulls
//! `async-compression` and `tokio-util` directly (see DESIGN.md), so the
//! bridge here is the `AsyncBufRead` one `tokio_util::io::StreamReader` /
//! `ReaderStream` give any byte stream.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::StreamExt;
use http::{HeaderMap, HeaderValue, header};
use tokio_util::io::{ReaderStream, StreamReader};

use crate::config::HttpClientConfig;
use crate::error::BoxError;

pub(crate) type ByteStream = Pin<Box<dyn futures_core::Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Inspects `Content-Encoding`; if decompression is enabled and a decoder
/// is compiled in for it, wraps `body` with that decoder and strips the
/// now-stale `Content-Encoding`/`Content-Length` headers.
pub(crate) fn maybe_decompress(
    headers: &mut HeaderMap,
    body: ByteStream,
    config: &HttpClientConfig,
) -> ByteStream {
    if !config.decompression_enabled() {
        return body;
    }

    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_ascii_lowercase());

    let decoded = match encoding.as_deref() {
        #[cfg(feature = "gzip")]
        Some("gzip") => Some(decode_with(body, async_compression::tokio::bufread::GzipDecoder::new)),
        #[cfg(feature = "deflate")]
        Some("deflate") => Some(decode_with(body, async_compression::tokio::bufread::ZlibDecoder::new)),
        #[cfg(feature = "brotli")]
        Some("br") => Some(decode_with(body, async_compression::tokio::bufread::BrotliDecoder::new)),
        #[cfg(feature = "zstd")]
        Some("zstd") => Some(decode_with(body, async_compression::tokio::bufread::ZstdDecoder::new)),
        _ => None,
    };

    match decoded {
        Some(stream) => {
            headers.remove(header::CONTENT_ENCODING);
            headers.remove(header::CONTENT_LENGTH);
            stream
        }
        None => body,
    }
}

/// Advertises the codecs this build can decode (spec.md §4.6's "the
/// advertised `Accept-Encoding`") whenever `decompression_enabled` is set.
/// Leaves an `Accept-Encoding` the caller already set untouched. A no-op
/// if no decoder feature is compiled in at all.
pub(crate) fn maybe_set_accept_encoding(headers: &mut HeaderMap, config: &HttpClientConfig) {
    if !config.decompression_enabled() || headers.contains_key(header::ACCEPT_ENCODING) {
        return;
    }

    let mut codecs: Vec<&'static str> = Vec::new();
    #[cfg(feature = "gzip")]
    codecs.push("gzip");
    #[cfg(feature = "deflate")]
    codecs.push("deflate");
    #[cfg(feature = "brotli")]
    codecs.push("br");
    #[cfg(feature = "zstd")]
    codecs.push("zstd");

    if codecs.is_empty() {
        return;
    }

    if let Ok(value) = HeaderValue::from_str(&codecs.join(", ")) {
        headers.insert(header::ACCEPT_ENCODING, value);
    }
}

/// The outbound half of spec.md §6's `compression_enabled` knob: when set,
/// gzip-encode the request body (the only encoder this crate always
/// compiles in by default) and advertise it via `Content-Encoding`. A body
/// too small to bother with, or with no compiled-in encoder available,
/// passes through untouched.
pub(crate) fn maybe_compress(
    headers: &mut HeaderMap,
    body: crate::body::Body,
    config: &HttpClientConfig,
) -> crate::body::Body {
    if !config.compression_enabled() || body.is_end_stream() {
        return body;
    }

    #[cfg(feature = "gzip")]
    {
        headers.insert(header::CONTENT_ENCODING, http::HeaderValue::from_static("gzip"));
        headers.remove(header::CONTENT_LENGTH);
        let erased: ByteStream = Box::pin(crate::body::as_byte_stream(body));
        let reader = StreamReader::new(erased);
        let encoder = async_compression::tokio::bufread::GzipEncoder::new(reader);
        let stream = ReaderStream::new(encoder).map(|res| res.map_err(|e| Box::new(e) as BoxError));
        crate::body::Body::wrap_stream(stream)
    }
    #[cfg(not(feature = "gzip"))]
    {
        body
    }
}

fn decode_with<D, F>(body: ByteStream, wrap: F) -> ByteStream
where
    D: tokio::io::AsyncRead + Send + 'static,
    F: FnOnce(StreamReader<ByteStream, Bytes>) -> D,
{
    let reader = StreamReader::new(body);
    let decoder = wrap(reader);
    let stream = ReaderStream::new(decoder).map(|res| res.map_err(|e| Box::new(e) as BoxError));
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_encoding_is_not_set_when_decompression_disabled() {
        let config = HttpClientConfig::builder().decompression_enabled(false).build();
        let mut headers = HeaderMap::new();
        maybe_set_accept_encoding(&mut headers, &config);
        assert!(!headers.contains_key(header::ACCEPT_ENCODING));
    }

    #[test]
    fn accept_encoding_leaves_a_caller_supplied_value_untouched() {
        let config = HttpClientConfig::builder().decompression_enabled(true).build();
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        maybe_set_accept_encoding(&mut headers, &config);
        assert_eq!(headers.get(header::ACCEPT_ENCODING).unwrap(), "identity");
    }

    #[test]
    #[cfg(any(feature = "gzip", feature = "deflate", feature = "brotli", feature = "zstd"))]
    fn accept_encoding_lists_compiled_in_codecs() {
        let config = HttpClientConfig::builder().decompression_enabled(true).build();
        let mut headers = HeaderMap::new();
        maybe_set_accept_encoding(&mut headers, &config);
        let value = headers.get(header::ACCEPT_ENCODING).unwrap().to_str().unwrap();
        #[cfg(feature = "gzip")]
        assert!(value.contains("gzip"));
        #[cfg(feature = "deflate")]
        assert!(value.contains("deflate"));
        #[cfg(feature = "brotli")]
        assert!(value.contains("br"));
        #[cfg(feature = "zstd")]
        assert!(value.contains("zstd"));
    }
}
