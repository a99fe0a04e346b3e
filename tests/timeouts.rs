//! Timeout behavior (spec.md §4.4, §5, §7), grounded in the teacher's
//! `tests/timeouts.rs` (a server that sleeps before responding, a client
//! configured with a short timeout, assert `is_timeout()`).

mod support;

use std::time::Duration;

use hyper::{Body, Request, Response};
use support::server;
use vortex_http::{HttpClient, HttpClientConfig, Scheme};

/// A `request_timeout` set on the client config fires while the server is
/// still holding the connection open without responding.
#[tokio::test]
async fn client_level_request_timeout_fires() {
    let server = server::http(|_req: Request<Body>| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Response::builder().status(200).body(Body::empty()).unwrap()
    });

    let config = HttpClientConfig::builder()
        .request_timeout(Some(Duration::from_millis(50)))
        .build();
    let client = HttpClient::with_config(config);
    let endpoint = client.endpoint::<()>(Scheme::Http, "127.0.0.1", server.addr().port());

    let err = endpoint
        .get("/slow")
        .send()
        .await
        .expect_err("request should time out before the server responds");
    assert!(err.is_timeout());

    endpoint.shutdown().await;
}

/// A per-request timeout set on the builder overrides a longer (or absent)
/// client-level default.
#[tokio::test]
async fn per_request_timeout_overrides_client_default() {
    let server = server::http(|_req: Request<Body>| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Response::builder().status(200).body(Body::empty()).unwrap()
    });

    let client = HttpClient::new();
    let endpoint = client.endpoint::<()>(Scheme::Http, "127.0.0.1", server.addr().port());

    let err = endpoint
        .get("/slow")
        .timeout(Duration::from_millis(50))
        .send()
        .await
        .expect_err("per-request timeout should fire");
    assert!(err.is_timeout());

    endpoint.shutdown().await;
}

/// A request well within the timeout budget still succeeds.
#[tokio::test]
async fn fast_response_beats_a_generous_timeout() {
    let server = server::http(|_req: Request<Body>| async move {
        Response::builder().status(200).body(Body::empty()).unwrap()
    });

    let client = HttpClient::new();
    let endpoint = client.endpoint::<()>(Scheme::Http, "127.0.0.1", server.addr().port());

    let exchange = endpoint
        .get("/fast")
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("fast response should beat the timeout");
    assert_eq!(exchange.status(), http::StatusCode::OK);

    endpoint.shutdown().await;
}
