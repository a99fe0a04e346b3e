//! A minimal in-process HTTP server used by the integration tests, grounded
//! in the teacher's `tests/support/server.rs` pattern (spawn a dedicated
//! runtime thread, bind `127.0.0.1:0`, serve with hyper until a shutdown
//! signal) but built on `hyper::server` (hyper 0.14) rather than mocking
//! any part of the client under test.

#![allow(dead_code)]

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response};
use tokio::sync::oneshot;

pub struct Server {
    addr: SocketAddr,
    panic_rx: std_mpsc::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Server {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if !thread::panicking() {
            let _ = self.panic_rx.recv_timeout(Duration::from_secs(3));
        }
    }
}

/// Spawns a one-request-handler-fits-all HTTP/1.1+HTTP/2 server on a
/// dedicated thread/runtime, mirroring the teacher's "spawn a new runtime
/// in a thread to avoid reactor conflicts" approach.
pub fn http<F, Fut>(handler: F) -> Server
where
    F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Body>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (panic_tx, panic_rx) = std_mpsc::channel();
    let (addr_tx, addr_rx) = std_mpsc::channel();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build support server runtime");

        rt.block_on(async move {
            let make_svc = make_service_fn(move |_conn| {
                let handler = handler.clone();
                async move {
                    Ok::<_, Infallible>(service_fn(move |req| {
                        let handler = handler.clone();
                        async move { Ok::<_, Infallible>(handler(req).await) }
                    }))
                }
            });

            let server = hyper::Server::bind(&([127, 0, 0, 1], 0).into()).serve(make_svc);
            let _ = addr_tx.send(server.local_addr());

            let graceful = server.with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = graceful.await;
        });
        let _ = panic_tx.send(());
    });

    let addr = addr_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("support server failed to bind");

    Server {
        addr,
        panic_rx,
        shutdown_tx: Some(shutdown_tx),
    }
}

/// Spawns a server that accepts raw TCP connections and hands each one to
/// `handle`, for tests that need to speak below the `hyper::Server`
/// abstraction (the H2C upgrade probe, malformed responses).
pub fn raw<F, Fut>(handle: F) -> Server
where
    F: Fn(tokio::net::TcpStream) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let (panic_tx, panic_rx) = std_mpsc::channel();
    let (addr_tx, addr_rx) = std_mpsc::channel();

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build support server runtime");

        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
                .await
                .expect("failed to bind raw support server");
            let _ = addr_tx.send(listener.local_addr().expect("local_addr"));

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    accepted = listener.accept() => {
                        let (socket, _) = match accepted {
                            Ok(pair) => pair,
                            Err(_) => break,
                        };
                        let handle = handle.clone();
                        tokio::spawn(handle(socket));
                    }
                }
            }
        });
        let _ = panic_tx.send(());
    });

    let addr = addr_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("raw support server failed to bind");

    Server {
        addr,
        panic_rx,
        shutdown_tx: Some(shutdown_tx),
    }
}
