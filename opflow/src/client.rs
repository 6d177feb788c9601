//! Capability-typed boundary to a remote Open Payments service.
//!
//! The orchestration core never talks HTTP itself. Everything it needs from
//! the wider Open Payments network is expressed as the [`OpenPayments`]
//! trait: wallet lookup, grant negotiation against an auth server, and
//! payment/quote resources against a resource server. Implementations (see
//! the `opflow-http` crate) are responsible for transport, HTTP message
//! signing, and client identity.
//!
//! A single implementation instance is safe to share across concurrent
//! payment sessions; it carries no per-session state.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::amount::Amount;
use crate::grant::{GrantContinuation, GrantRequest, GrantResponse};
use crate::payment::{IncomingPayment, OutgoingPayment, Quote};
use crate::wallet::WalletAddress;

/// Opaque transport-level error reported by an [`OpenPayments`] implementation.
pub type ClientError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shared handle to an [`OpenPayments`] implementation.
///
/// One instance is constructed at process start and shared across all
/// concurrent payment sessions.
pub type SharedClient = Arc<dyn OpenPayments>;

/// A unit struct representing the string literal `"ilp"`.
///
/// This is the only payment method the orchestration flow creates quotes
/// with; the type makes it unrepresentable to send anything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IlpMethod;

impl IlpMethod {
    /// The string literal value: `"ilp"`.
    pub const VALUE: &'static str = "ilp";
}

impl std::fmt::Display for IlpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(Self::VALUE)
    }
}

impl AsRef<str> for IlpMethod {
    fn as_ref(&self) -> &str {
        Self::VALUE
    }
}

impl Serialize for IlpMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for IlpMethod {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == Self::VALUE {
            Ok(Self)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected '{}', got '{s}'",
                Self::VALUE,
            )))
        }
    }
}

/// Free-form metadata attached to a payment resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    /// Human-readable description (the payer-supplied note).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PaymentMetadata {
    /// Wraps a note into metadata, or `None` when there is no note.
    #[must_use]
    pub fn from_note(note: Option<&str>) -> Option<Self> {
        note.map(|description| Self {
            description: Some(description.to_owned()),
        })
    }
}

/// Body for creating an incoming payment on the receiver's resource server.
///
/// No `incomingAmount` is set: the payment is created with an open amount
/// and a short expiry, and the quote determines what is actually delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingPaymentRequest {
    /// The receiving wallet address URL.
    pub wallet_address: Url,

    /// When the payment stops accepting funds.
    pub expires_at: DateTime<Utc>,

    /// Optional note carried as the payment description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMetadata>,
}

/// Body for creating a quote on the sender's resource server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    /// Always `"ilp"`.
    pub method: IlpMethod,

    /// The sending wallet address URL.
    pub wallet_address: Url,

    /// The incoming payment this quote pays into.
    pub receiver: Url,

    /// Fixed debit amount in the sender's asset.
    pub debit_amount: Amount,
}

/// Body for creating an outgoing payment from a finalized grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPaymentRequest {
    /// The sending wallet address URL.
    pub wallet_address: Url,

    /// The quote fixing the amounts of this payment.
    pub quote_id: Url,

    /// Optional note carried as the payment description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMetadata>,
}

/// Remote Open Payments operations the orchestration core depends on.
///
/// Auth-server operations take the server URL or a [`GrantContinuation`]
/// handle; resource-server operations additionally take the bearer access
/// token of the grant that authorizes them.
#[async_trait]
pub trait OpenPayments: Send + Sync {
    /// Fetches the public metadata of a wallet address.
    async fn get_wallet_address(&self, url: &Url) -> Result<WalletAddress, ClientError>;

    /// Requests a new grant from an auth server.
    async fn request_grant(
        &self,
        auth_server: &Url,
        request: GrantRequest,
    ) -> Result<GrantResponse, ClientError>;

    /// Continues a pending grant with the interaction reference obtained
    /// from the user's redirect.
    async fn continue_grant(
        &self,
        continuation: &GrantContinuation,
        interact_ref: &str,
    ) -> Result<GrantResponse, ClientError>;

    /// Revokes a grant via its continuation handle.
    async fn cancel_grant(&self, continuation: &GrantContinuation) -> Result<(), ClientError>;

    /// Creates an incoming payment on a resource server.
    async fn create_incoming_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        request: IncomingPaymentRequest,
    ) -> Result<IncomingPayment, ClientError>;

    /// Marks an incoming payment as completed, locking further credits.
    async fn complete_incoming_payment(
        &self,
        payment_id: &Url,
        access_token: &str,
    ) -> Result<(), ClientError>;

    /// Creates a quote on a resource server.
    async fn create_quote(
        &self,
        resource_server: &Url,
        access_token: &str,
        request: QuoteRequest,
    ) -> Result<Quote, ClientError>;

    /// Creates an outgoing payment on a resource server.
    async fn create_outgoing_payment(
        &self,
        resource_server: &Url,
        access_token: &str,
        request: OutgoingPaymentRequest,
    ) -> Result<OutgoingPayment, ClientError>;

    /// Fetches the current state of an outgoing payment.
    async fn get_outgoing_payment(
        &self,
        payment_id: &Url,
        access_token: &str,
    ) -> Result<OutgoingPayment, ClientError>;
}
