//! The reactive body type used for both requests and responses, plus the
//! sequencer that reshapes arbitrary chunk shapes into framer-friendly ones
//! (spec.md §4.6, §9 "Reactive bodies" / "Reference-counted buffers").
//!
//! Grounded in the teacher's body plumbing (`core::body::Incoming`, used
//! throughout `core/client/mod.rs`) generalized to a single public `Body`
//! type covering bytes, streams and file resources, since this crate
//! exposes its own body rather than re-exporting hyper's.

use std::fs::Metadata;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use http_body::{Body as HttpBody, SizeHint};

use crate::error::{BoxError, Error};

type BoxStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// A reactive, single-subscription, cold byte-chunk body.
///
/// Chunks are delivered as owned [`Bytes`] — the crate maps the spec's
/// reference-counted-chunk release obligation onto `Bytes`'s own
/// `Arc`-backed, move-semantics buffer: once a chunk is handed to the
/// subscriber, dropping it is the release.
pub struct Body(Kind);

enum Kind {
    Empty,
    Once(Option<Bytes>),
    Streaming(BoxStream),
    /// A file-backed body (spec.md §4.6): read whole on the blocking pool
    /// via `tokio::fs::read` the first time it is polled, never inline on
    /// the I/O worker.
    File {
        path: PathBuf,
        len: u64,
    },
    FileRead(Pin<Box<dyn std::future::Future<Output = std::io::Result<Bytes>> + Send>>),
}

impl Body {
    pub fn empty() -> Self {
        Body(Kind::Empty)
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Body(Kind::Once(Some(bytes.into())))
    }

    pub fn wrap_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
    {
        Body(Kind::Streaming(Box::pin(stream)))
    }

    /// A body backed by a file on disk.
    pub fn file(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        Body(Kind::File {
            path: path.into(),
            len: metadata.len(),
        })
    }

    pub fn is_end_stream(&self) -> bool {
        matches!(&self.0, Kind::Empty)
            || matches!(&self.0, Kind::Once(None))
            || matches!(&self.0, Kind::File { len: 0, .. })
    }

    /// Reshapes a streaming body through a [`Sequencer`] before it reaches
    /// the wire framer (spec.md §4.6): small chunks from the application's
    /// publisher are coalesced, oversized ones split. `Once`/`Empty`/`File`
    /// bodies already hand the framer one chunk at a time and pass through
    /// untouched. Applied to every outbound request body in
    /// `Endpoint::send`.
    pub(crate) fn sequenced(self) -> Self {
        match self.0 {
            Kind::Streaming(inner) => Body(Kind::Streaming(Box::pin(SequencedStream {
                inner,
                sequencer: Sequencer::new(DEFAULT_COALESCE_THRESHOLD, DEFAULT_MAX_CHUNK),
                queue: std::collections::VecDeque::new(),
                upstream_done: false,
            }))),
            other => Body(other),
        }
    }
}

/// Below this many buffered bytes, [`Sequencer`] holds a chunk back hoping
/// to coalesce it with the next one rather than handing the framer a tiny
/// write.
const DEFAULT_COALESCE_THRESHOLD: usize = 1024;
/// Chunks larger than this are split before reaching the framer, bounding
/// a single wire write.
const DEFAULT_MAX_CHUNK: usize = 64 * 1024;

struct SequencedStream {
    inner: BoxStream,
    sequencer: Sequencer,
    queue: std::collections::VecDeque<Bytes>,
    upstream_done: bool,
}

impl Stream for SequencedStream {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(chunk) = self.queue.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }
            if self.upstream_done {
                return Poll::Ready(None);
            }
            match self.inner.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(Some(Ok(chunk))) => {
                    let ready = self.sequencer.push(chunk);
                    self.queue.extend(ready);
                }
                Poll::Ready(None) => {
                    self.upstream_done = true;
                    if let Some(rest) = self.sequencer.finish() {
                        self.queue.push_back(rest);
                    }
                }
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::from_bytes(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Self {
        Body::from_bytes(Bytes::from(b))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::from_bytes(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Self {
        Body::from_bytes(Bytes::from_static(s.as_bytes()))
    }
}

impl HttpBody for Body {
    type Data = Bytes;
    type Error = Error;

    fn poll_data(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Self::Data, Self::Error>>> {
        loop {
            match &mut self.0 {
                Kind::Empty => return Poll::Ready(None),
                Kind::Once(slot) => return Poll::Ready(slot.take().map(Ok)),
                Kind::Streaming(stream) => {
                    return stream.as_mut().poll_next(cx).map_err(Error::body_invalid);
                }
                Kind::File { path, .. } => {
                    // Reading happens on the blocking pool, not inline on
                    // the I/O worker (spec.md §9 "Blocking collaborators").
                    let path = path.clone();
                    self.0 = Kind::FileRead(Box::pin(tokio::fs::read(path)));
                }
                Kind::FileRead(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(res) => {
                        self.0 = Kind::Empty;
                        return Poll::Ready(Some(res.map(Bytes::from).map_err(Error::io)));
                    }
                },
            }
        }
    }

    fn poll_trailers(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Result<Option<http::HeaderMap>, Self::Error>> {
        Poll::Ready(Ok(None))
    }

    fn is_end_stream(&self) -> bool {
        Body::is_end_stream(self)
    }

    fn size_hint(&self) -> SizeHint {
        match &self.0 {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Once(Some(b)) => SizeHint::with_exact(b.len() as u64),
            Kind::Once(None) => SizeHint::with_exact(0),
            Kind::Streaming(_) => SizeHint::default(),
            Kind::File { len, .. } => SizeHint::with_exact(*len),
        }
    }
}

/// Adapts a `Body` back into a plain byte-chunk stream, the shape
/// `decode::maybe_compress`/`maybe_decompress` operate on. The inverse of
/// [`Body::wrap_stream`].
pub(crate) fn as_byte_stream(body: Body) -> impl Stream<Item = Result<Bytes, BoxError>> + Send {
    struct ViaHttpBody(Body);

    impl Stream for ViaHttpBody {
        type Item = Result<Bytes, BoxError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.0)
                .poll_data(cx)
                .map(|opt| opt.map(|r| r.map_err(|e| Box::new(e) as BoxError)))
        }
    }

    ViaHttpBody(body)
}

/// Reshapes an arbitrary chunk stream into one amenable to a wire framer:
/// small chunks are coalesced up to `coalesce_threshold`; chunks larger
/// than `max_chunk` are split. Spec.md §4.6 / GLOSSARY "Sequencer".
pub(crate) struct Sequencer {
    coalesce_threshold: usize,
    max_chunk: usize,
    pending: Option<Bytes>,
}

impl Sequencer {
    pub(crate) fn new(coalesce_threshold: usize, max_chunk: usize) -> Self {
        Sequencer {
            coalesce_threshold,
            max_chunk,
            pending: None,
        }
    }

    /// Feed one chunk from the upstream producer; returns the chunks ready
    /// to hand to the framer. May return zero chunks (buffering) or more
    /// than one (split).
    pub(crate) fn push(&mut self, chunk: Bytes) -> Vec<Bytes> {
        let mut combined = match self.pending.take() {
            Some(prev) => {
                let mut buf = bytes::BytesMut::with_capacity(prev.len() + chunk.len());
                buf.extend_from_slice(&prev);
                buf.extend_from_slice(&chunk);
                buf.freeze()
            }
            None => chunk,
        };

        if combined.len() < self.coalesce_threshold {
            self.pending = Some(combined);
            return Vec::new();
        }

        let mut out = Vec::new();
        while combined.len() > self.max_chunk {
            out.push(combined.split_to(self.max_chunk));
        }
        out.push(combined);
        out
    }

    /// Flush any buffered remainder at end-of-stream.
    pub(crate) fn finish(&mut self) -> Option<Bytes> {
        self.pending.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequencer_coalesces_small_chunks() {
        let mut seq = Sequencer::new(8, 1024);
        assert!(seq.push(Bytes::from_static(b"ab")).is_empty());
        let out = seq.push(Bytes::from_static(b"cdefghij"));
        assert_eq!(out, vec![Bytes::from_static(b"abcdefghij")]);
    }

    #[test]
    fn sequencer_splits_oversized_chunks() {
        let mut seq = Sequencer::new(1, 4);
        let out = seq.push(Bytes::from_static(b"0123456789"));
        assert_eq!(
            out,
            vec![
                Bytes::from_static(b"0123"),
                Bytes::from_static(b"4567"),
                Bytes::from_static(b"89"),
            ]
        );
    }

    #[test]
    fn sequencer_finish_flushes_remainder() {
        let mut seq = Sequencer::new(100, 1024);
        assert!(seq.push(Bytes::from_static(b"ab")).is_empty());
        assert_eq!(seq.finish(), Some(Bytes::from_static(b"ab")));
        assert_eq!(seq.finish(), None);
    }

    #[tokio::test]
    async fn empty_body_ends_immediately() {
        let body = Body::empty();
        assert!(body.is_end_stream());
    }

    #[tokio::test]
    async fn file_body_reads_full_contents_once() {
        let mut path = std::env::temp_dir();
        path.push(format!("vortex-http-body-test-{:?}", std::thread::current().id()));
        tokio::fs::write(&path, b"hello from disk").await.unwrap();
        let metadata = tokio::fs::metadata(&path).await.unwrap();

        let body = Body::file(path.clone(), &metadata);
        assert!(!body.is_end_stream());

        let mut stream = Box::pin(as_byte_stream(body));
        let mut collected = Vec::new();
        while let Some(chunk) = futures_util::StreamExt::next(&mut stream).await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        let _ = tokio::fs::remove_file(&path).await;
        assert_eq!(collected, b"hello from disk");
    }
}
