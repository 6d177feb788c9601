//! Top-level payment orchestration.
//!
//! [`PaymentOrchestrator`] is the surface the rest of the system consumes.
//! It sequences wallet resolution, grant negotiation, quoting, and
//! finalization into three entry points and a best-effort abandon, and owns
//! the correlation between interactive redirects and in-flight payments.
//!
//! Each payment in flight is a [`PaymentSession`] keyed by an opaque
//! correlation id, the same id the auth server sends back as the
//! `paymentId` query parameter of the finish redirect. Sessions live in a
//! concurrent map; unrelated payments never share state beyond the remote
//! client itself.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::SharedClient;
use crate::config::OrchestratorConfig;
use crate::error::Error;
use crate::finalize::PaymentFinalizer;
use crate::grant::{FinalizedGrant, GrantNegotiator, PendingGrant};
use crate::payment::{CheckPaymentResult, Quote};
use crate::quote::{QuoteBuilder, QuoteOutcome};
use crate::wallet::WalletAddress;

/// An in-flight payment between grant request and finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSession {
    /// Correlation id, also the session key.
    pub payment_id: String,

    /// The sending wallet.
    pub sender: WalletAddress,

    /// The quote fixing the amounts.
    pub quote: Quote,

    /// Grant for completing and revoking the incoming payment.
    pub incoming_payment_grant: FinalizedGrant,

    /// The pending outgoing-payment grant awaiting user interaction.
    pub pending_grant: PendingGrant,

    /// The payer's note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// What the caller needs to send the user into the interactive grant step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPaymentAuthorization {
    /// Correlation id to hand back to [`PaymentOrchestrator::finalize_payment`].
    pub payment_id: String,

    /// URL the end user must visit to approve the payment.
    pub redirect: Url,

    /// The pending grant, including the nonce for verifying the finish
    /// callback.
    pub grant: PendingGrant,
}

/// Sequences the full quote-and-pay workflow.
///
/// Construct one per process with an injected remote client; it is safe to
/// share across concurrent requests.
pub struct PaymentOrchestrator {
    config: OrchestratorConfig,
    grants: GrantNegotiator,
    quotes: QuoteBuilder,
    finalizer: PaymentFinalizer,
    sessions: DashMap<String, PaymentSession>,
}

impl std::fmt::Debug for PaymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentOrchestrator")
            .field("config", &self.config)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl PaymentOrchestrator {
    /// Creates an orchestrator from a remote client and configuration.
    #[must_use]
    pub fn new(client: SharedClient, config: OrchestratorConfig) -> Self {
        Self {
            grants: GrantNegotiator::new(client.clone()),
            quotes: QuoteBuilder::new(client.clone(), config.incoming_payment_expiry),
            finalizer: PaymentFinalizer::new(client, config.settlement),
            config,
            sessions: DashMap::new(),
        }
    }

    /// Builds a quote for sending `amount` from `sender` to `receiver`.
    ///
    /// # Errors
    ///
    /// See [`QuoteBuilder::build_quote`].
    pub async fn build_quote(
        &self,
        sender: &str,
        receiver: &str,
        amount: f64,
        note: Option<&str>,
    ) -> Result<QuoteOutcome, Error> {
        self.quotes.build_quote(sender, receiver, amount, note).await
    }

    /// Requests the interactive outgoing-payment grant for a built quote
    /// and registers the payment session.
    ///
    /// A fresh nonce and correlation id are generated per call; the id
    /// comes back to the caller both in the returned value and, later, as
    /// the `paymentId` parameter of the finish redirect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedNonInteractiveGrant`] if the auth server
    /// skips interaction, or [`Error::Client`] on transport failures.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.request_outgoing_grant", skip_all, err)
    )]
    pub async fn request_outgoing_grant(
        &self,
        outcome: QuoteOutcome,
    ) -> Result<PendingPaymentAuthorization, Error> {
        let payment_id = Uuid::new_v4().to_string();
        let nonce = Uuid::new_v4().to_string();

        let pending_grant = self
            .grants
            .request_outgoing_payment_grant(
                &outcome.sender,
                outcome.quote.debit_amount.clone(),
                Some(outcome.quote.receive_amount.clone()),
                &self.config.redirect_url,
                &nonce,
                &payment_id,
            )
            .await?;

        let redirect = pending_grant.interact.redirect.clone();
        let session = PaymentSession {
            payment_id: payment_id.clone(),
            sender: outcome.sender,
            quote: outcome.quote,
            incoming_payment_grant: outcome.incoming_payment_grant,
            pending_grant: pending_grant.clone(),
            note: outcome.note,
        };
        self.sessions.insert(payment_id.clone(), session);

        Ok(PendingPaymentAuthorization {
            payment_id,
            redirect,
            grant: pending_grant,
        })
    }

    /// Finalizes the payment correlated with `payment_id`.
    ///
    /// The session is consumed either way: a failed finalization cannot be
    /// retried against the same grant, and a successful one is done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if no session matches, otherwise
    /// see [`PaymentFinalizer::finalize_payment`].
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.finalize_payment", skip(self, interact_ref), err)
    )]
    pub async fn finalize_payment(
        &self,
        payment_id: &str,
        interact_ref: &str,
    ) -> Result<CheckPaymentResult, Error> {
        let (_, session) = self
            .sessions
            .remove(payment_id)
            .ok_or_else(|| Error::UnknownSession(payment_id.to_owned()))?;

        self.finalizer
            .finalize_payment(
                &session.sender,
                &session.pending_grant,
                &session.quote,
                &session.incoming_payment_grant,
                interact_ref,
                session.note.as_deref(),
            )
            .await
    }

    /// Abandons the payment correlated with `payment_id`.
    ///
    /// Best-effort: both held grants are revoked if possible, so an
    /// abandoned flow does not rely solely on server-side expiry.
    /// Revocation failures are reported to telemetry but do not fail the
    /// abandon.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSession`] if no session matches.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.abandon", skip(self), err)
    )]
    pub async fn abandon(&self, payment_id: &str) -> Result<(), Error> {
        let (_, session) = self
            .sessions
            .remove(payment_id)
            .ok_or_else(|| Error::UnknownSession(payment_id.to_owned()))?;

        if let Some(continuation) = &session.incoming_payment_grant.continuation {
            if let Err(_e) = self.grants.cancel_grant(continuation).await {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_e, "failed to revoke incoming-payment grant on abandon");
            }
        }
        if let Err(_e) = self
            .grants
            .cancel_grant(&session.pending_grant.continuation)
            .await
        {
            #[cfg(feature = "telemetry")]
            tracing::warn!(error = %_e, "failed to revoke pending outgoing-payment grant on abandon");
        }

        Ok(())
    }

    /// Returns how many payment sessions are currently in flight.
    #[must_use]
    pub fn sessions_in_flight(&self) -> usize {
        self.sessions.len()
    }
}
