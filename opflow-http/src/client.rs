//! Signed HTTP implementation of the [`OpenPayments`] boundary.
//!
//! [`HttpOpenPayments`] talks to wallet, auth, and resource servers with
//! `reqwest`, routing every request through [`SigningMiddleware`] so it
//! leaves the process with message-signature headers attached. Resource and
//! continuation requests carry `Authorization: GNAP <token>`; grant
//! requests are authenticated by signature alone plus the configured
//! `client` wallet identity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use opflow::client::{
    ClientError, IncomingPaymentRequest, OpenPayments, OutgoingPaymentRequest, QuoteRequest,
};
use opflow::grant::{GrantContinuation, GrantRequest, GrantResponse};
use opflow::payment::{IncomingPayment, OutgoingPayment, Quote};
use opflow::wallet::WalletAddress;

use crate::error::HttpError;
use crate::signing::{RequestSigner, SigningMiddleware};

/// Configuration for [`HttpOpenPayments`].
pub struct HttpClientConfig {
    /// Wallet address URL identifying the owner of the signing keypair.
    /// Sent as the GNAP `client` field of every grant request.
    pub client_wallet: Url,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Optional pre-configured reqwest client. If `None`, a new client is
    /// created with the configured timeout.
    pub http_client: Option<reqwest::Client>,
}

impl HttpClientConfig {
    /// Creates a config for the given client wallet identity.
    #[must_use]
    pub fn new(client_wallet: Url) -> Self {
        Self {
            client_wallet,
            timeout: Duration::from_secs(30),
            http_client: None,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets a pre-configured reqwest client.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl std::fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("client_wallet", &self.client_wallet)
            .field("timeout", &self.timeout)
            .field("has_http_client", &self.http_client.is_some())
            .finish()
    }
}

/// Wire body for a grant request: the core's request plus the client
/// identity this transport is configured with.
#[derive(Debug, Serialize)]
struct GrantRequestBody<'a> {
    #[serde(flatten)]
    request: &'a GrantRequest,
    client: &'a Url,
}

/// Wire body for a grant continuation.
#[derive(Debug, Serialize)]
struct ContinueRequestBody<'a> {
    interact_ref: &'a str,
}

/// Async HTTP client for Open Payments servers.
///
/// Safe to share across concurrent payment sessions: it holds only static
/// configuration and the connection pool.
pub struct HttpOpenPayments {
    http: ClientWithMiddleware,
    client_wallet: Url,
}

impl std::fmt::Debug for HttpOpenPayments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpOpenPayments")
            .field("client_wallet", &self.client_wallet)
            .finish_non_exhaustive()
    }
}

impl HttpOpenPayments {
    /// Creates a new client from the given configuration and signer.
    pub fn new(config: HttpClientConfig, signer: Arc<dyn RequestSigner>) -> Self {
        let inner = config.http_client.unwrap_or_else(|| {
            reqwest::Client::builder()
                .timeout(config.timeout)
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .expect("failed to build reqwest::Client")
        });

        let http = reqwest_middleware::ClientBuilder::new(inner)
            .with(SigningMiddleware::new(signer))
            .build();

        Self {
            http,
            client_wallet: config.client_wallet,
        }
    }

    /// Returns the configured client wallet identity.
    #[must_use]
    pub const fn client_wallet(&self) -> &Url {
        &self.client_wallet
    }

    /// Builds `<base>/<path>`, tolerating bases with or without a trailing
    /// slash.
    fn endpoint(base: &Url, path: &str, context: &'static str) -> Result<Url, HttpError> {
        let mut normalized = base.as_str().trim_end_matches('/').to_owned();
        normalized.push('/');
        normalized
            .parse::<Url>()
            .and_then(|b| b.join(path))
            .map_err(|source| HttpError::Url { context, source })
    }

    /// Generic GET helper returning parsed JSON.
    async fn get_json<R>(
        &self,
        url: Url,
        context: &'static str,
        auth: Option<&str>,
    ) -> Result<R, HttpError>
    where
        R: DeserializeOwned,
    {
        let mut req = self.http.get(url);
        if let Some(token) = auth {
            req = req.header(AUTHORIZATION, format!("GNAP {token}"));
        }
        let response = req
            .send()
            .await
            .map_err(|source| HttpError::Http { context, source })?;
        Self::parse_json(response, context).await
    }

    /// Generic POST helper returning parsed JSON.
    async fn post_json<T, R>(
        &self,
        url: Url,
        context: &'static str,
        auth: Option<&str>,
        payload: &T,
    ) -> Result<R, HttpError>
    where
        T: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let mut req = self.http.post(url).json(payload);
        if let Some(token) = auth {
            req = req.header(AUTHORIZATION, format!("GNAP {token}"));
        }
        let response = req
            .send()
            .await
            .map_err(|source| HttpError::Http { context, source })?;
        Self::parse_json(response, context).await
    }

    /// POST with no request body where only the status matters.
    async fn post_empty(
        &self,
        url: Url,
        context: &'static str,
        auth: Option<&str>,
    ) -> Result<(), HttpError> {
        let mut req = self.http.post(url);
        if let Some(token) = auth {
            req = req.header(AUTHORIZATION, format!("GNAP {token}"));
        }
        let response = req
            .send()
            .await
            .map_err(|source| HttpError::Http { context, source })?;
        Self::expect_success(response, context).await
    }

    /// DELETE where only the status matters.
    async fn delete(
        &self,
        url: Url,
        context: &'static str,
        auth: Option<&str>,
    ) -> Result<(), HttpError> {
        let mut req = self.http.delete(url);
        if let Some(token) = auth {
            req = req.header(AUTHORIZATION, format!("GNAP {token}"));
        }
        let response = req
            .send()
            .await
            .map_err(|source| HttpError::Http { context, source })?;
        Self::expect_success(response, context).await
    }

    /// Parses a successful response as JSON, or maps the failure status.
    async fn parse_json<R>(response: reqwest::Response, context: &'static str) -> Result<R, HttpError>
    where
        R: DeserializeOwned,
    {
        let status = response.status();
        if status.is_success() {
            response
                .json::<R>()
                .await
                .map_err(|source| HttpError::JsonDeserialization { context, source })
        } else {
            let body = response
                .text()
                .await
                .map_err(|source| HttpError::ResponseBodyRead { context, source })?;
            Err(HttpError::HttpStatus {
                context,
                status,
                body,
            })
        }
    }

    /// Accepts any success status, mapping failures like [`Self::parse_json`].
    async fn expect_success(
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<(), HttpError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response
            .text()
            .await
            .map_err(|source| HttpError::ResponseBodyRead { context, source })?;
        Err(HttpError::HttpStatus {
            context,
            status,
            body,
        })
    }

    /// Fetches wallet address metadata.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] on transport failure, non-success status, or a
    /// response missing required fields.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.http.wallet_address", skip(self), err)
    )]
    pub async fn wallet_address(&self, url: &Url) -> Result<WalletAddress, HttpError> {
        self.get_json(url.clone(), "GET wallet-address", None).await
    }

    /// Requests a grant from an auth server, attaching the configured
    /// client identity.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] on transport failure or an unparsable response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.http.request_grant", skip_all, err)
    )]
    pub async fn grant(
        &self,
        auth_server: &Url,
        request: &GrantRequest,
    ) -> Result<GrantResponse, HttpError> {
        let body = GrantRequestBody {
            request,
            client: &self.client_wallet,
        };
        self.post_json(auth_server.clone(), "POST grant", None, &body)
            .await
    }
}

#[async_trait]
impl OpenPayments for HttpOpenPayments {
    async fn get_wallet_address(&self, url: &Url) -> Result<WalletAddress, ClientError> {
        self.wallet_address(url).await.map_err(Into::into)
    }

    async fn request_grant(
        &self,
        auth_server: &Url,
        request: GrantRequest,
    ) -> Result<GrantResponse, ClientError> {
        self.grant(auth_server, &request).await.map_err(Into::into)
    }

    async fn continue_grant(
        &self,
        continuation: &GrantContinuation,
        interact_ref: &str,
    ) -> Result<GrantResponse, ClientError> {
        self.post_json(
            continuation.uri.clone(),
            "POST grant continuation",
            Some(&continuation.access_token.value),
            &ContinueRequestBody { interact_ref },
        )
        .await
        .map_err(Into::into)
    }

    async fn cancel_grant(&self, continuation: &GrantContinuation) -> Result<(), ClientError> {
        self.delete(
            continuation.uri.clone(),
            "DELETE grant",
            Some(&continuation.access_token.value),
        )
        .await
        .map_err(Into::into)
    }

    async fn create_incoming_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        request: IncomingPaymentRequest,
    ) -> Result<IncomingPayment, ClientError> {
        let url = Self::endpoint(resource_server, "incoming-payments", "POST incoming-payments")?;
        self.post_json(url, "POST incoming-payments", Some(access_token), &request)
            .await
            .map_err(Into::into)
    }

    async fn complete_incoming_payment(
        &self,
        payment_id: &Url,
        access_token: &str,
    ) -> Result<(), ClientError> {
        let url = Self::endpoint(payment_id, "complete", "POST incoming-payment complete")?;
        self.post_empty(url, "POST incoming-payment complete", Some(access_token))
            .await
            .map_err(Into::into)
    }

    async fn create_quote(
        &self,
        resource_server: &Url,
        access_token: &str,
        request: QuoteRequest,
    ) -> Result<Quote, ClientError> {
        let url = Self::endpoint(resource_server, "quotes", "POST quotes")?;
        self.post_json(url, "POST quotes", Some(access_token), &request)
            .await
            .map_err(Into::into)
    }

    async fn create_outgoing_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        request: OutgoingPaymentRequest,
    ) -> Result<OutgoingPayment, ClientError> {
        let url = Self::endpoint(resource_server, "outgoing-payments", "POST outgoing-payments")?;
        self.post_json(url, "POST outgoing-payments", Some(access_token), &request)
            .await
            .map_err(Into::into)
    }

    async fn get_outgoing_payment(
        &self,
        payment_id: &Url,
        access_token: &str,
    ) -> Result<OutgoingPayment, ClientError> {
        self.get_json(
            payment_id.clone(),
            "GET outgoing-payment",
            Some(access_token),
        )
        .await
        .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::{SignableRequest, SigningError};
    use chrono::Utc;
    use http::HeaderMap;
    use opflow::amount::Amount;
    use opflow::client::{IlpMethod, PaymentMetadata};
    use wiremock::matchers::{body_partial_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Stamps fixed signature headers so tests can assert they were sent.
    struct StubSigner;

    #[async_trait]
    impl RequestSigner for StubSigner {
        fn key_id(&self) -> &str {
            "test-key"
        }

        async fn sign(&self, request: SignableRequest<'_>) -> Result<HeaderMap, SigningError> {
            let mut headers = HeaderMap::new();
            headers.insert("Signature", "sig-v=:dGVzdA==:".parse().unwrap());
            headers.insert(
                "Signature-Input",
                "sig-v=(\"@method\" \"@target-uri\");keyid=\"test-key\""
                    .parse()
                    .unwrap(),
            );
            if request.body.is_some() {
                headers.insert("Content-Digest", "sha-512=:dGVzdA==:".parse().unwrap());
            }
            Ok(headers)
        }
    }

    fn client(server: &MockServer) -> HttpOpenPayments {
        let config = HttpClientConfig::new(format!("{}/client", server.uri()).parse().unwrap());
        HttpOpenPayments::new(config, Arc::new(StubSigner))
    }

    #[tokio::test]
    async fn wallet_lookup_parses_metadata_and_signs_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alice"))
            .and(header_exists("Signature"))
            .and(header_exists("Signature-Input"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": format!("{}/alice", server.uri()),
                "publicName": "Alice",
                "assetCode": "USD",
                "assetScale": 2,
                "authServer": format!("{}/auth", server.uri()),
                "resourceServer": format!("{}/rs", server.uri()),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let wallet = client(&server)
            .wallet_address(&format!("{}/alice", server.uri()).parse().unwrap())
            .await
            .unwrap();
        assert_eq!(wallet.asset_code, "USD");
        assert_eq!(wallet.asset_scale, 2);
        assert_eq!(wallet.public_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn partial_wallet_metadata_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": format!("{}/alice", server.uri()),
                "assetCode": "USD",
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .wallet_address(&format!("{}/alice", server.uri()).parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::JsonDeserialization { .. }));
    }

    #[tokio::test]
    async fn grant_request_injects_the_client_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth"))
            .and(body_partial_json(serde_json::json!({
                "client": format!("{}/client", server.uri()),
                "access_token": {
                    "access": [{"type": "incoming-payment"}],
                },
            })))
            .and(header_exists("Content-Digest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": {"value": "tok-1"},
                "continue": {
                    "uri": format!("{}/continue/1", server.uri()),
                    "access_token": {"value": "cont-1"},
                },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = GrantRequest::non_interactive(opflow::grant::AccessItem::incoming_payment());
        let response = client(&server)
            .grant(&format!("{}/auth", server.uri()).parse().unwrap(), &request)
            .await
            .unwrap();
        match response {
            GrantResponse::Finalized(grant) => {
                assert_eq!(grant.access_token.value, "tok-1");
                assert!(grant.continuation.is_some());
            }
            GrantResponse::Pending(_) => panic!("parsed as pending"),
        }
    }

    #[tokio::test]
    async fn continuation_posts_the_interact_ref_with_gnap_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/continue/1"))
            .and(header("Authorization", "GNAP cont-1"))
            .and(body_partial_json(serde_json::json!({"interact_ref": "ref-1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": {"value": "tok-final"},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let continuation = GrantContinuation {
            uri: format!("{}/continue/1", server.uri()).parse().unwrap(),
            access_token: opflow::grant::AccessToken::new("cont-1"),
            wait: None,
        };
        let response = client(&server)
            .continue_grant(&continuation, "ref-1")
            .await
            .unwrap();
        assert!(matches!(response, GrantResponse::Finalized(_)));
    }

    #[tokio::test]
    async fn cancel_sends_a_signed_delete() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/continue/1"))
            .and(header("Authorization", "GNAP cont-1"))
            .and(header_exists("Signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let continuation = GrantContinuation {
            uri: format!("{}/continue/1", server.uri()).parse().unwrap(),
            access_token: opflow::grant::AccessToken::new("cont-1"),
            wait: None,
        };
        client(&server).cancel_grant(&continuation).await.unwrap();
    }

    #[tokio::test]
    async fn incoming_payment_create_carries_token_expiry_and_note() {
        let server = MockServer::start().await;
        let rs: Url = format!("{}/rs", server.uri()).parse().unwrap();
        Mock::given(method("POST"))
            .and(path("/rs/incoming-payments"))
            .and(header("Authorization", "GNAP tok-1"))
            .and(body_partial_json(serde_json::json!({
                "metadata": {"description": "coffee"},
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": format!("{}/rs/incoming-payments/ip-1", server.uri()),
                "walletAddress": format!("{}/bob", server.uri()),
                "completed": false,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = IncomingPaymentRequest {
            wallet_address: format!("{}/bob", server.uri()).parse().unwrap(),
            expires_at: Utc::now() + Duration::from_secs(360),
            metadata: PaymentMetadata::from_note(Some("coffee")),
        };
        let payment = client(&server)
            .create_incoming_payment(&rs, "tok-1", request)
            .await
            .unwrap();
        assert!(!payment.completed);
        assert!(payment.id.as_str().ends_with("/incoming-payments/ip-1"));
    }

    #[tokio::test]
    async fn quote_create_round_trips_the_wire_shape() {
        let server = MockServer::start().await;
        let rs: Url = format!("{}/rs/", server.uri()).parse().unwrap();
        Mock::given(method("POST"))
            .and(path("/rs/quotes"))
            .and(body_partial_json(serde_json::json!({
                "method": "ilp",
                "debitAmount": {"value": "1000", "assetCode": "USD", "assetScale": 2},
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": format!("{}/rs/quotes/q-1", server.uri()),
                "walletAddress": format!("{}/alice", server.uri()),
                "receiver": format!("{}/rs/incoming-payments/ip-1", server.uri()),
                "method": "ilp",
                "debitAmount": {"value": "1000", "assetCode": "USD", "assetScale": 2},
                "receiveAmount": {"value": "912", "assetCode": "EUR", "assetScale": 2},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = QuoteRequest {
            method: IlpMethod,
            wallet_address: format!("{}/alice", server.uri()).parse().unwrap(),
            receiver: format!("{}/rs/incoming-payments/ip-1", server.uri())
                .parse()
                .unwrap(),
            debit_amount: Amount::new("1000", "USD", 2),
        };
        let quote = client(&server).create_quote(&rs, "tok-q", request).await.unwrap();
        assert_eq!(quote.receive_amount.value, "912");
    }

    #[tokio::test]
    async fn incoming_payment_complete_posts_to_the_payment_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rs/incoming-payments/ip-1/complete"))
            .and(header("Authorization", "GNAP tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": format!("{}/rs/incoming-payments/ip-1", server.uri()),
                "completed": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .complete_incoming_payment(
                &format!("{}/rs/incoming-payments/ip-1", server.uri())
                    .parse()
                    .unwrap(),
                "tok-1",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn outgoing_payment_create_binds_the_quote() {
        let server = MockServer::start().await;
        let rs: Url = format!("{}/rs", server.uri()).parse().unwrap();
        Mock::given(method("POST"))
            .and(path("/rs/outgoing-payments"))
            .and(header("Authorization", "GNAP tok-o"))
            .and(body_partial_json(serde_json::json!({
                "quoteId": format!("{}/rs/quotes/q-1", server.uri()),
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "id": format!("{}/rs/outgoing-payments/op-1", server.uri()),
                "walletAddress": format!("{}/alice", server.uri()),
                "quoteId": format!("{}/rs/quotes/q-1", server.uri()),
                "sentAmount": {"value": "0", "assetCode": "USD", "assetScale": 2},
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = OutgoingPaymentRequest {
            wallet_address: format!("{}/alice", server.uri()).parse().unwrap(),
            quote_id: format!("{}/rs/quotes/q-1", server.uri()).parse().unwrap(),
            metadata: None,
        };
        let payment = client(&server)
            .create_outgoing_payment(&rs, "tok-o", request)
            .await
            .unwrap();
        assert_eq!(payment.sent_amount.units().unwrap(), 0);
        assert!(payment.quote_id.is_some());
    }

    #[tokio::test]
    async fn outgoing_payment_get_reads_settlement_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rs/outgoing-payments/op-1"))
            .and(header("Authorization", "GNAP tok-o"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": format!("{}/rs/outgoing-payments/op-1", server.uri()),
                "walletAddress": format!("{}/alice", server.uri()),
                "failed": false,
                "sentAmount": {"value": "1000", "assetCode": "USD", "assetScale": 2},
            })))
            .mount(&server)
            .await;

        let payment = client(&server)
            .get_outgoing_payment(
                &format!("{}/rs/outgoing-payments/op-1", server.uri())
                    .parse()
                    .unwrap(),
                "tok-o",
            )
            .await
            .unwrap();
        assert_eq!(payment.sent_amount.units().unwrap(), 1000);
        assert!(!payment.failed);
    }

    #[tokio::test]
    async fn non_success_statuses_surface_with_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/alice"))
            .respond_with(ResponseTemplate::new(403).set_body_string("signature mismatch"))
            .mount(&server)
            .await;

        let err = client(&server)
            .wallet_address(&format!("{}/alice", server.uri()).parse().unwrap())
            .await
            .unwrap_err();
        match err {
            HttpError::HttpStatus { status, body, .. } => {
                assert_eq!(status, http::StatusCode::FORBIDDEN);
                assert_eq!(body, "signature mismatch");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
