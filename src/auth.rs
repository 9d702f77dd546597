use std::sync::Arc;

use poem::http::{header, StatusCode};
use poem::{Endpoint, Error, Middleware, Request, Result};

/// Rejects every request whose `Authorization` header is not exactly the
/// configured token.
///
/// Wraps the whole route tree, so nothing downstream (including request
/// body parsing) runs for an unauthorized caller.
pub struct TokenAuth {
    token: Arc<str>,
}

impl TokenAuth {
    pub fn new(token: impl Into<Arc<str>>) -> Self {
        Self { token: token.into() }
    }
}

impl<E: Endpoint> Middleware<E> for TokenAuth {
    type Output = TokenAuthEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        TokenAuthEndpoint {
            ep,
            token: self.token.clone(),
        }
    }
}

pub struct TokenAuthEndpoint<E> {
    ep: E,
    token: Arc<str>,
}

impl<E: Endpoint> Endpoint for TokenAuthEndpoint<E> {
    type Output = E::Output;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let authorized = provided
            .map(|provided| constant_time_eq(provided.as_bytes(), self.token.as_bytes()))
            .unwrap_or(false);

        if !authorized {
            warn!("Rejecting unauthorized {} {}", req.method(), req.uri().path());
            return Err(Error::from_string("Unauthorized", StatusCode::UNAUTHORIZED));
        }

        self.ep.call(req).await
    }
}

/// Compares two byte strings without exiting early on the first mismatch.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
