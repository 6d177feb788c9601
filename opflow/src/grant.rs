//! Grant negotiation against Open Payments auth servers.
//!
//! Grants follow the GNAP shape: a request names the access it wants, and
//! the auth server answers either with a usable access token (finalized) or
//! with a redirect the end user must visit first (pending). Incoming-payment
//! and quote access is always granted without interaction; outgoing-payment
//! access always requires it. [`GrantNegotiator`] enforces both invariants
//! and drives continuation once the user returns.
//!
//! GNAP bodies use snake_case field names on the wire, unlike the camelCase
//! resource-server types.

use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::amount::Amount;
use crate::client::{OpenPayments, SharedClient};
use crate::error::Error;
use crate::wallet::WalletAddress;

/// The resource type an access item applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    /// Incoming payments on the receiver's resource server.
    IncomingPayment,
    /// Outgoing payments on the sender's resource server.
    OutgoingPayment,
    /// Quotes on the sender's resource server.
    Quote,
}

impl std::fmt::Display for AccessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IncomingPayment => "incoming-payment",
            Self::OutgoingPayment => "outgoing-payment",
            Self::Quote => "quote",
        };
        f.write_str(s)
    }
}

/// An action an access item permits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessAction {
    /// Create a resource.
    Create,
    /// Read a resource.
    Read,
    /// Complete an incoming payment.
    Complete,
}

/// Amount limits on an outgoing-payment access item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessLimits {
    /// Maximum amount debited from the sender.
    pub debit_amount: Amount,

    /// Maximum amount delivered to the receiver, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_amount: Option<Amount>,
}

/// A single access request item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessItem {
    /// The resource type this item grants access to.
    #[serde(rename = "type")]
    pub access_type: AccessType,

    /// Permitted actions.
    pub actions: Vec<AccessAction>,

    /// Wallet address the access is scoped to, where applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<Url>,

    /// Amount limits, for outgoing-payment access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<AccessLimits>,
}

impl AccessItem {
    /// Access for creating, reading, and completing incoming payments.
    #[must_use]
    pub fn incoming_payment() -> Self {
        Self {
            access_type: AccessType::IncomingPayment,
            actions: vec![
                AccessAction::Read,
                AccessAction::Create,
                AccessAction::Complete,
            ],
            identifier: None,
            limits: None,
        }
    }

    /// Access for creating and reading quotes.
    #[must_use]
    pub fn quote() -> Self {
        Self {
            access_type: AccessType::Quote,
            actions: vec![AccessAction::Create, AccessAction::Read],
            identifier: None,
            limits: None,
        }
    }

    /// Limited access for creating and reading outgoing payments on a
    /// specific wallet.
    #[must_use]
    pub fn outgoing_payment(identifier: Url, limits: AccessLimits) -> Self {
        Self {
            access_type: AccessType::OutgoingPayment,
            actions: vec![AccessAction::Create, AccessAction::Read],
            identifier: Some(identifier),
            limits: Some(limits),
        }
    }
}

/// The `access_token` block of a grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    /// Requested access items.
    pub access: Vec<AccessItem>,
}

/// The `finish` block of an interactive grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractFinish {
    /// Always `"redirect"`.
    pub method: String,

    /// Where the auth server sends the user after interaction, carrying the
    /// correlation id as a query parameter.
    pub uri: Url,

    /// Client-chosen nonce, echoed into the redirect hash for verification.
    pub nonce: String,
}

/// The `interact` block of an interactive grant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractRequest {
    /// Interaction start modes; always `["redirect"]`.
    pub start: Vec<String>,

    /// How the interaction finishes.
    pub finish: InteractFinish,
}

/// A GNAP grant request body.
///
/// The transport layer appends the `client` identity field; the core only
/// decides what access to ask for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    /// Requested access.
    pub access_token: AccessTokenRequest,

    /// Interaction requirements, for outgoing-payment grants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact: Option<InteractRequest>,
}

impl GrantRequest {
    /// A request expected to finalize without user interaction.
    #[must_use]
    pub fn non_interactive(item: AccessItem) -> Self {
        Self {
            access_token: AccessTokenRequest { access: vec![item] },
            interact: None,
        }
    }

    /// A request that requires the user to visit a redirect before the
    /// grant can finalize.
    #[must_use]
    pub fn interactive(item: AccessItem, finish_uri: Url, nonce: impl Into<String>) -> Self {
        Self {
            access_token: AccessTokenRequest { access: vec![item] },
            interact: Some(InteractRequest {
                start: vec!["redirect".to_owned()],
                finish: InteractFinish {
                    method: "redirect".to_owned(),
                    uri: finish_uri,
                    nonce: nonce.into(),
                },
            }),
        }
    }

    /// Returns the access type of the first requested item.
    #[must_use]
    pub fn access_type(&self) -> Option<AccessType> {
        self.access_token.access.first().map(|item| item.access_type)
    }
}

/// A bearer access token issued by an auth server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The token value sent as `Authorization: GNAP <value>`.
    pub value: String,

    /// Token management URL, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage: Option<Url>,
}

impl AccessToken {
    /// Creates a token from a raw value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            manage: None,
        }
    }
}

/// The `continue` handle of a grant response.
///
/// Used both to finalize a pending grant (POST with an `interact_ref`) and
/// to revoke a grant that is no longer needed (DELETE).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantContinuation {
    /// Continuation endpoint on the auth server.
    pub uri: Url,

    /// Continuation token authorizing calls to `uri`.
    pub access_token: AccessToken,

    /// Seconds the client should wait before continuing, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
}

/// The `interact` block of a pending grant response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractUris {
    /// URL the end user must visit to approve the grant.
    pub redirect: Url,

    /// Server-chosen value used to verify the finish callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
}

/// A grant that is immediately usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedGrant {
    /// The issued access token.
    pub access_token: AccessToken,

    /// Continuation handle, retained so the grant can later be revoked.
    #[serde(
        rename = "continue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub continuation: Option<GrantContinuation>,
}

/// A grant waiting on user interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingGrant {
    /// Where to send the user.
    pub interact: InteractUris,

    /// Handle for finalizing (or revoking) the grant.
    #[serde(rename = "continue")]
    pub continuation: GrantContinuation,

    /// The nonce this client sent in the request. Not part of the wire
    /// response; attached by the negotiator so callers can verify the
    /// finish callback.
    #[serde(default)]
    pub nonce: String,
}

/// Either shape an auth server can answer a grant request with.
///
/// Pending responses are distinguished by the presence of the `interact`
/// block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GrantResponse {
    /// The grant requires user interaction before it can be used.
    Pending(PendingGrant),
    /// The grant is immediately usable.
    Finalized(FinalizedGrant),
}

/// Negotiates grants with auth servers and enforces the interaction
/// invariants of each access type.
#[derive(Clone)]
pub struct GrantNegotiator {
    client: SharedClient,
}

impl std::fmt::Debug for GrantNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantNegotiator").finish_non_exhaustive()
    }
}

impl GrantNegotiator {
    /// Creates a negotiator backed by the given remote client.
    #[must_use]
    pub fn new(client: SharedClient) -> Self {
        Self { client }
    }

    /// Requests a non-interactive incoming-payment grant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedInteractiveGrant`] if the auth server
    /// answers with a pending grant, which this access type never requires.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.grant.incoming_payment", skip_all, err)
    )]
    pub async fn request_incoming_payment_grant(
        &self,
        auth_server: &Url,
    ) -> Result<FinalizedGrant, Error> {
        self.request_non_interactive(auth_server, AccessItem::incoming_payment())
            .await
    }

    /// Requests a non-interactive quote grant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedInteractiveGrant`] if the auth server
    /// answers with a pending grant.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.grant.quote", skip_all, err)
    )]
    pub async fn request_quote_grant(&self, auth_server: &Url) -> Result<FinalizedGrant, Error> {
        self.request_non_interactive(auth_server, AccessItem::quote())
            .await
    }

    async fn request_non_interactive(
        &self,
        auth_server: &Url,
        item: AccessItem,
    ) -> Result<FinalizedGrant, Error> {
        let access_type = item.access_type;
        let request = GrantRequest::non_interactive(item);
        match self.client.request_grant(auth_server, request).await? {
            GrantResponse::Finalized(grant) => Ok(grant),
            GrantResponse::Pending(_) => Err(Error::UnexpectedInteractiveGrant { access_type }),
        }
    }

    /// Requests an interactive outgoing-payment grant limited to the given
    /// amounts.
    ///
    /// The finish callback is `redirect_url` with `paymentId=<payment_id>`
    /// appended, so the eventual redirect can be correlated back to this
    /// request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedNonInteractiveGrant`] if the auth server
    /// answers with an already-finalized grant, which this access type must
    /// never do.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "opflow.grant.outgoing_payment",
            skip_all,
            fields(payment_id = %payment_id),
            err
        )
    )]
    pub async fn request_outgoing_payment_grant(
        &self,
        wallet: &WalletAddress,
        debit_amount: Amount,
        receive_amount: Option<Amount>,
        redirect_url: &Url,
        nonce: &str,
        payment_id: &str,
    ) -> Result<PendingGrant, Error> {
        let mut finish_uri = redirect_url.clone();
        finish_uri
            .query_pairs_mut()
            .append_pair("paymentId", payment_id);

        let item = AccessItem::outgoing_payment(
            wallet.id.clone(),
            AccessLimits {
                debit_amount,
                receive_amount,
            },
        );
        let request = GrantRequest::interactive(item, finish_uri, nonce);

        match self.client.request_grant(&wallet.auth_server, request).await? {
            GrantResponse::Pending(mut grant) => {
                grant.nonce = nonce.to_owned();
                Ok(grant)
            }
            GrantResponse::Finalized(_) => Err(Error::UnexpectedNonInteractiveGrant),
        }
    }

    /// Finalizes a pending grant with the interaction reference from the
    /// user's redirect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GrantNotFinalized`] if the grant is still pending
    /// after continuation. This is terminal; the interactive flow must be
    /// restarted from a fresh grant request.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.grant.continue", skip_all, err)
    )]
    pub async fn continue_grant(
        &self,
        pending: &PendingGrant,
        interact_ref: &str,
    ) -> Result<FinalizedGrant, Error> {
        match self
            .client
            .continue_grant(&pending.continuation, interact_ref)
            .await?
        {
            GrantResponse::Finalized(grant) => Ok(grant),
            GrantResponse::Pending(_) => Err(Error::GrantNotFinalized),
        }
    }

    /// Revokes a grant via its continuation handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Client`] if the auth server rejects the revocation.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.grant.cancel", skip_all, err)
    )]
    pub async fn cancel_grant(&self, continuation: &GrantContinuation) -> Result<(), Error> {
        self.client
            .cancel_grant(continuation)
            .await
            .map_err(Error::Client)
    }
}
