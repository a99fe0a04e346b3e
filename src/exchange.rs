//! `Exchange` (spec.md §3): `(Request view, Response view, Context)`, plus
//! the per-connection accountancy that ties a response body's lifetime back
//! to the pool (§4.2's `release`) and the cancellation/timeout rules of
//! §4.4's exchange state machine.
//!
//! Grounded in the teacher's `Pending`/`PendingRequest` future
//! (`core/client/mod.rs`), generalized here into an explicit body wrapper
//! rather than a `tower::Service`-shaped future, since this crate's
//! `Response` owns its own `Body` type instead of re-exporting hyper's.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_core::Stream;
use http::{HeaderMap, Method, StatusCode, Version};

use crate::body::Body;
use crate::conn::Connection;
use crate::error::{BoxError, Error, Result};
use crate::pool::{self, Lease};
use crate::response::Response;

/// One request/response pair with its application-typed context, produced
/// exactly when response headers have arrived (spec.md §3).
pub struct Exchange<Ctx = ()> {
    method: Method,
    target: http::uri::PathAndQuery,
    context: Option<Ctx>,
    response: Response,
}

impl<Ctx> Exchange<Ctx> {
    pub(crate) fn new(
        method: Method,
        target: http::uri::PathAndQuery,
        context: Option<Ctx>,
        response: Response,
    ) -> Self {
        Exchange {
            method,
            target,
            context,
            response,
        }
    }

    /// The method of the request this exchange answers.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target (path + query) of the request this exchange answers.
    pub fn target(&self) -> &http::uri::PathAndQuery {
        &self.target
    }

    /// The application-typed context carried untouched through interceptors
    /// and the exchange (spec.md §3, §9 "Exchange context typing").
    pub fn context(&self) -> Option<&Ctx> {
        self.context.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn version(&self) -> Version {
        self.response.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Consume the exchange, taking ownership of its response (and, through
    /// it, the single-subscription response body).
    pub fn into_response(self) -> Response {
        self.response
    }
}

impl<Ctx> std::fmt::Debug for Exchange<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("response", &self.response)
            .finish()
    }
}

/// Wraps a response body so the connection's reserved in-flight capacity
/// (the pool's [`Lease`]) is released exactly once the body is fully
/// drained, errors, or is dropped early by a cancelling subscriber —
/// spec.md §3 "Exchange ... holds a reference to the connection's
/// accountancy (to decrement in-flight on completion)" and §4.4's
/// cancellation rule.
pub(crate) struct ReleasingBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>,
    lease: Option<Lease<Connection>>,
    deadline: Option<(Instant, Duration)>,
    finished: bool,
}

impl ReleasingBody {
    pub(crate) fn new(
        inner: Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>,
        lease: Lease<Connection>,
        request_timeout: Option<Duration>,
    ) -> Self {
        ReleasingBody {
            inner,
            lease: Some(lease),
            deadline: request_timeout.map(|d| (Instant::now() + d, d)),
            finished: false,
        }
    }

    fn release(&mut self, ok: bool) {
        if let Some(lease) = self.lease.take() {
            let outcome = if ok {
                pool::Outcome::Ok
            } else {
                pool::Outcome::TransportFailed
            };
            lease.release(outcome);
        }
    }
}

impl Stream for ReleasingBody {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        if let Some((deadline, total)) = self.deadline {
            if Instant::now() >= deadline {
                self.finished = true;
                self.release(false);
                return Poll::Ready(Some(Err(Box::new(Error::request_timeout(total)) as BoxError)));
            }
        }
        let this = self.as_mut().get_mut();
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                this.release(true);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                this.release(false);
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

impl Drop for ReleasingBody {
    fn drop(&mut self) {
        if self.lease.is_none() {
            return;
        }
        // The subscriber dropped the body before it reached end-of-stream:
        // a cancellation during `ResponseBodyStreaming`. Per spec.md §4.4,
        // HTTP/1.1 cannot safely continue pipelining past an abandoned
        // response body, so the connection is poisoned; HTTP/2 relies on
        // hyper/h2 issuing RST_STREAM when the stream's body handle drops,
        // which leaves the rest of the connection healthy.
        if let Some(lease) = &self.lease {
            if lease.conn.is_pipelined() {
                lease.conn.poison();
            }
        }
        self.release(true);
    }
}

pub(crate) fn body_from_releasing(body: ReleasingBody) -> Body {
    Body::wrap_stream(body)
}
