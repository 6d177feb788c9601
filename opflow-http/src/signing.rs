//! HTTP message signing seam.
//!
//! Every request to an Open Payments server must carry `Signature` and
//! `Signature-Input` headers (plus `Content-Digest` when a body is present)
//! computed over the request method, target URI, and body with an Ed25519
//! keypair. The signature computation itself is not this crate's concern:
//! it is injected through the [`RequestSigner`] trait and applied to every
//! outgoing request by [`SigningMiddleware`].

use std::sync::Arc;

use async_trait::async_trait;
use http::{Extensions, HeaderMap};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
use url::Url;

/// The parts of an outgoing request a signer gets to see.
#[derive(Debug, Clone, Copy)]
pub struct SignableRequest<'a> {
    /// HTTP method.
    pub method: &'a http::Method,

    /// Full target URL.
    pub url: &'a Url,

    /// Request body bytes, when the request has a buffered body.
    pub body: Option<&'a [u8]>,
}

/// Failure to produce signature headers for a request.
#[derive(Debug, Clone, thiserror::Error)]
#[error("request signing failed: {message}")]
pub struct SigningError {
    /// What went wrong.
    pub message: String,
}

impl SigningError {
    /// Creates a new signing error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Produces HTTP message-signature headers for outgoing requests.
///
/// Implementations own the Ed25519 key material (or delegate to a KMS) and
/// return the complete set of headers to stamp: `Signature`,
/// `Signature-Input`, and for requests with a body `Content-Digest`.
#[async_trait]
pub trait RequestSigner: Send + Sync {
    /// The key id named in the `Signature-Input` header.
    fn key_id(&self) -> &str;

    /// Computes signature headers for the given request.
    async fn sign(&self, request: SignableRequest<'_>) -> Result<HeaderMap, SigningError>;
}

/// [`rqm::Middleware`] that signs every outgoing request.
///
/// Runs last in the middleware chain so the signature covers the request
/// as it actually leaves the process.
pub struct SigningMiddleware {
    signer: Arc<dyn RequestSigner>,
}

impl std::fmt::Debug for SigningMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMiddleware")
            .field("key_id", &self.signer.key_id())
            .finish_non_exhaustive()
    }
}

impl SigningMiddleware {
    /// Creates a signing middleware around the given signer.
    #[must_use]
    pub fn new(signer: Arc<dyn RequestSigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl rqm::Middleware for SigningMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let body = req
            .body()
            .and_then(reqwest::Body::as_bytes)
            .map(<[u8]>::to_vec);

        let headers = self
            .signer
            .sign(SignableRequest {
                method: req.method(),
                url: req.url(),
                body: body.as_deref(),
            })
            .await
            .map_err(|e| rqm::Error::Middleware(e.into()))?;

        req.headers_mut().extend(headers);
        next.run(req, extensions).await
    }
}
