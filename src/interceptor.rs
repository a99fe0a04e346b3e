//! The interceptor chain (spec.md §4.5).
//!
//! Grounded in the teacher's `tower`-flavored layer stack (`src/client/
//! layer/*`, `src/client/middleware/*`), generalized here from a fixed
//! tower `Service` stack into an explicit ordered
//! `Vec<Box<dyn ExchangeInterceptor<Ctx>>>`: short-circuit-with-
//! synthesized-response isn't representable in tower's `Service` trait
//! without inventing a wrapper enum, so the chain below carries the
//! short-circuit signal directly on [`InterceptableExchange`] instead of
//! overloading the return type with it. An interceptor sets
//! `synthesized_response` to stop the chain right there: later
//! interceptors are skipped and the wire request is never sent, which is
//! the spec's "returning none" case expressed without a bare `Option`.

use async_trait::async_trait;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// One step of an exchange before it is dispatched on the wire.
pub struct InterceptableExchange<Ctx> {
    pub request: Request<Ctx>,
    /// Set by an interceptor to short-circuit: the application sees this
    /// response and the wire request is never sent.
    pub synthesized_response: Option<Response>,
}

/// Middleware around an exchange; may transform the request or short
/// circuit it by setting `synthesized_response`.
#[async_trait]
pub trait ExchangeInterceptor<Ctx>: Send + Sync {
    async fn intercept(&self, exchange: InterceptableExchange<Ctx>)
        -> Result<InterceptableExchange<Ctx>>;
}

/// Runs every interceptor in declaration order, stopping as soon as one
/// sets `synthesized_response`.
pub(crate) async fn run_chain<Ctx: Send + Sync + 'static>(
    interceptors: &[Box<dyn ExchangeInterceptor<Ctx>>],
    mut exchange: InterceptableExchange<Ctx>,
) -> Result<InterceptableExchange<Ctx>> {
    for interceptor in interceptors {
        if exchange.synthesized_response.is_some() {
            break;
        }
        exchange = interceptor.intercept(exchange).await?;
    }
    Ok(exchange)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use http::Method;

    struct ShortCircuit;

    #[async_trait]
    impl ExchangeInterceptor<()> for ShortCircuit {
        async fn intercept(
            &self,
            mut exchange: InterceptableExchange<()>,
        ) -> Result<InterceptableExchange<()>> {
            let resp = http::Response::builder()
                .status(200)
                .body(Body::from_bytes("intercepted"))
                .unwrap();
            exchange.synthesized_response = Some(crate::response::Response::from_http(resp));
            Ok(exchange)
        }
    }

    struct NeverCalled;

    #[async_trait]
    impl ExchangeInterceptor<()> for NeverCalled {
        async fn intercept(
            &self,
            _exchange: InterceptableExchange<()>,
        ) -> Result<InterceptableExchange<()>> {
            panic!("should not run after a short-circuit");
        }
    }

    fn dummy_request() -> Request<()> {
        Request {
            method: Method::GET,
            target: "/".parse().unwrap(),
            authority: None,
            headers: Default::default(),
            body: None,
            context: Some(()),
            timeout: None,
            interceptors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn short_circuit_produces_synthesized_response_and_skips_the_rest() {
        let interceptors: Vec<Box<dyn ExchangeInterceptor<()>>> =
            vec![Box::new(ShortCircuit), Box::new(NeverCalled)];
        let exchange = InterceptableExchange {
            request: dummy_request(),
            synthesized_response: None,
        };
        let result = run_chain(&interceptors, exchange).await.unwrap();
        assert!(result.synthesized_response.is_some());
    }
}
