//! Quote building.
//!
//! A quote is the product of a fixed pipeline: resolve the receiver, resolve
//! the sender, convert the user's amount at the *sender's* scale, obtain an
//! incoming-payment grant from the receiver's auth server, create the
//! provisional incoming payment, obtain a quote grant from the sender's auth
//! server, and finally create the quote bound to that incoming payment. The
//! order is load-bearing: the incoming payment must exist before the quote
//! references it, and the receiver is resolved first so a bad receiver never
//! touches the sender's auth server.
//!
//! No step performs cleanup on failure; the incoming payment's short expiry
//! bounds what an abandoned pipeline leaves behind.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::amount::{Amount, to_minor_units};
use crate::client::{
    IlpMethod, IncomingPaymentRequest, OpenPayments, PaymentMetadata, QuoteRequest, SharedClient,
};
use crate::error::Error;
use crate::grant::{FinalizedGrant, GrantNegotiator};
use crate::payment::{IncomingPayment, Quote};
use crate::wallet::{WalletAddress, WalletResolver};

/// The remote-touching steps of the quote pipeline, named for error
/// reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStep {
    /// Requesting the incoming-payment grant from the receiver's auth server.
    IncomingPaymentGrant,
    /// Creating the incoming payment on the receiver's resource server.
    IncomingPayment,
    /// Requesting the quote grant from the sender's auth server.
    QuoteGrant,
    /// Creating the quote on the sender's resource server.
    Quote,
}

impl std::fmt::Display for QuoteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::IncomingPaymentGrant => "incoming-payment-grant",
            Self::IncomingPayment => "incoming-payment",
            Self::QuoteGrant => "quote-grant",
            Self::Quote => "quote",
        };
        f.write_str(s)
    }
}

/// Everything a successful quote pipeline produces.
///
/// The `incoming_payment_grant` must be retained by the caller: it is needed
/// later to complete the incoming payment and to revoke the grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteOutcome {
    /// The created quote.
    pub quote: Quote,

    /// Grant authorizing completion of the incoming payment.
    pub incoming_payment_grant: FinalizedGrant,

    /// The provisional incoming payment the quote pays into.
    pub incoming_payment: IncomingPayment,

    /// Resolved sender wallet, needed for the outgoing-payment grant.
    pub sender: WalletAddress,

    /// Resolved receiver wallet.
    pub receiver: WalletAddress,

    /// The payer's note, threaded through to the outgoing payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Runs the quote pipeline.
#[derive(Clone)]
pub struct QuoteBuilder {
    client: SharedClient,
    resolver: WalletResolver,
    grants: GrantNegotiator,
    incoming_payment_expiry: Duration,
}

impl std::fmt::Debug for QuoteBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteBuilder")
            .field("incoming_payment_expiry", &self.incoming_payment_expiry)
            .finish_non_exhaustive()
    }
}

impl QuoteBuilder {
    /// Creates a quote builder backed by the given remote client.
    #[must_use]
    pub fn new(client: SharedClient, incoming_payment_expiry: Duration) -> Self {
        Self {
            resolver: WalletResolver::new(client.clone()),
            grants: GrantNegotiator::new(client.clone()),
            client,
            incoming_payment_expiry,
        }
    }

    /// Builds a quote for sending `amount` (in the sender's asset) from
    /// `sender` to `receiver`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWalletAddress`] if either address fails to
    /// resolve (the receiver is checked first, before anything else runs),
    /// [`Error::InvalidAmount`] for unusable amounts, and
    /// [`Error::QuoteCreationFailed`] naming the step when a remote call in
    /// the pipeline fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.quote.build", skip_all, fields(amount = %amount), err)
    )]
    pub async fn build_quote(
        &self,
        sender: &str,
        receiver: &str,
        amount: f64,
        note: Option<&str>,
    ) -> Result<QuoteOutcome, Error> {
        let receiver_wallet = self.resolver.resolve(receiver).await?;
        let sender_wallet = self.resolver.resolve(sender).await?;

        // The debit is always denominated in the sender's asset; the
        // receive side is computed by the quote server.
        let debit_amount = Amount::new(
            to_minor_units(amount, sender_wallet.asset_scale)?,
            sender_wallet.asset_code.clone(),
            sender_wallet.asset_scale,
        );

        let incoming_payment_grant = self
            .grants
            .request_incoming_payment_grant(&receiver_wallet.auth_server)
            .await
            .map_err(wrap_step(QuoteStep::IncomingPaymentGrant))?;

        let expires_at = Utc::now() + self.incoming_payment_expiry;
        let incoming_payment = self
            .client
            .create_incoming_payment(
                &receiver_wallet.resource_server,
                &incoming_payment_grant.access_token.value,
                IncomingPaymentRequest {
                    wallet_address: receiver_wallet.id.clone(),
                    expires_at,
                    metadata: PaymentMetadata::from_note(note),
                },
            )
            .await
            .map_err(|source| Error::QuoteCreationFailed {
                step: QuoteStep::IncomingPayment,
                source,
            })?;

        let quote_grant = self
            .grants
            .request_quote_grant(&sender_wallet.auth_server)
            .await
            .map_err(wrap_step(QuoteStep::QuoteGrant))?;

        let quote = self
            .client
            .create_quote(
                &sender_wallet.resource_server,
                &quote_grant.access_token.value,
                QuoteRequest {
                    method: IlpMethod,
                    wallet_address: sender_wallet.id.clone(),
                    receiver: incoming_payment.id.clone(),
                    debit_amount,
                },
            )
            .await
            .map_err(|source| Error::QuoteCreationFailed {
                step: QuoteStep::Quote,
                source,
            })?;

        Ok(QuoteOutcome {
            quote,
            incoming_payment_grant,
            incoming_payment,
            sender: sender_wallet,
            receiver: receiver_wallet,
            note: note.map(str::to_owned),
        })
    }
}

/// Reclassifies a transport failure as a pipeline-step failure, leaving
/// richer errors (protocol violations, bad amounts) untouched.
fn wrap_step(step: QuoteStep) -> impl FnOnce(Error) -> Error {
    move |err| match err {
        Error::Client(source) => Error::QuoteCreationFailed { step, source },
        other => other,
    }
}
