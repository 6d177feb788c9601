//! Payment finalization.
//!
//! Once the user has approved the outgoing-payment grant and the redirect
//! delivered an interaction reference, [`PaymentFinalizer`] finishes the
//! payment: continue the grant, create the outgoing payment from the quote,
//! watch settlement, then complete the incoming payment and revoke its
//! now-unused grant.
//!
//! The funded check gates everything after it: the incoming payment is
//! completed if and only if the outgoing payment actually sent funds.
//! Cleanup failures after that point are downgraded to warnings on a
//! successful result; money has already moved.

use crate::client::{ClientError, OpenPayments, OutgoingPaymentRequest, PaymentMetadata, SharedClient};
use crate::config::SettlementConfig;
use crate::error::Error;
use crate::grant::{FinalizedGrant, GrantNegotiator, PendingGrant};
use crate::payment::{CheckPaymentResult, CleanupWarning, OutgoingPayment, Quote};
use crate::wallet::WalletAddress;

#[cfg(feature = "telemetry")]
use tracing::instrument;

/// Terminal settlement states the watch can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    /// The payment sent a positive amount.
    Funded,
    /// The server marked the payment failed without sending anything.
    Declined,
}

/// Drives a payment to completion after the interactive grant step.
#[derive(Clone)]
pub struct PaymentFinalizer {
    client: SharedClient,
    grants: GrantNegotiator,
    settlement: SettlementConfig,
}

impl std::fmt::Debug for PaymentFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentFinalizer")
            .field("settlement", &self.settlement)
            .finish_non_exhaustive()
    }
}

impl PaymentFinalizer {
    /// Creates a finalizer backed by the given remote client.
    #[must_use]
    pub fn new(client: SharedClient, settlement: SettlementConfig) -> Self {
        Self {
            grants: GrantNegotiator::new(client.clone()),
            client,
            settlement,
        }
    }

    /// Finalizes a payment.
    ///
    /// Insufficient balance is reported through the returned
    /// [`CheckPaymentResult`], not as an error: it is a normal outcome the
    /// caller must branch on. When it happens, the incoming payment is left
    /// untouched to expire on its own, and a new quote must be built for
    /// any retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GrantNotFinalized`] if continuation leaves the
    /// grant pending, [`Error::OutgoingPaymentCreationFailed`] if the
    /// outgoing payment cannot be created (nothing has been debited at that
    /// point), and [`Error::SettlementTimeout`] if the payment never
    /// reaches a terminal state within the poll budget.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.finalize", skip_all, err)
    )]
    pub async fn finalize_payment(
        &self,
        wallet: &WalletAddress,
        pending_grant: &PendingGrant,
        quote: &Quote,
        incoming_payment_grant: &FinalizedGrant,
        interact_ref: &str,
        note: Option<&str>,
    ) -> Result<CheckPaymentResult, Error> {
        let outgoing_grant = self.grants.continue_grant(pending_grant, interact_ref).await?;
        let access_token = &outgoing_grant.access_token.value;

        let outgoing = self
            .client
            .create_outgoing_payment(
                &wallet.resource_server,
                access_token,
                OutgoingPaymentRequest {
                    wallet_address: wallet.id.clone(),
                    quote_id: quote.id.clone(),
                    metadata: PaymentMetadata::from_note(note),
                },
            )
            .await
            .map_err(Error::OutgoingPaymentCreationFailed)?;

        match self.watch_settlement(&outgoing, access_token).await? {
            Settlement::Declined => return Ok(CheckPaymentResult::insufficient_balance()),
            Settlement::Funded => {}
        }

        // Past this point the payment has succeeded; nothing below may
        // change that verdict.
        let mut warnings = Vec::new();

        if let Err(e) = self
            .client
            .complete_incoming_payment(&quote.receiver, &incoming_payment_grant.access_token.value)
            .await
        {
            warn_soft_failure("incoming payment completion", &e);
            warnings.push(CleanupWarning::IncomingPaymentCompletionFailed {
                message: e.to_string(),
            });
        }

        if let Some(continuation) = &incoming_payment_grant.continuation {
            if let Err(e) = self.client.cancel_grant(continuation).await {
                warn_soft_failure("incoming-payment grant revocation", &e);
                warnings.push(CleanupWarning::GrantRevocationFailed {
                    message: e.to_string(),
                });
            }
        }

        Ok(CheckPaymentResult::funded_with_warnings(warnings))
    }

    /// Polls the outgoing payment until it is funded, declined, or the
    /// budget runs out.
    ///
    /// Observation errors are retried within the budget; only the terminal
    /// states short-circuit.
    async fn watch_settlement(
        &self,
        payment: &OutgoingPayment,
        access_token: &str,
    ) -> Result<Settlement, Error> {
        let mut delay = self.settlement.initial_delay;

        for _ in 0..self.settlement.max_attempts {
            tokio::time::sleep(delay).await;

            match self.client.get_outgoing_payment(&payment.id, access_token).await {
                Ok(observed) => {
                    if observed.sent_amount.units()? > 0 {
                        return Ok(Settlement::Funded);
                    }
                    if observed.failed {
                        return Ok(Settlement::Declined);
                    }
                }
                Err(e) => warn_soft_failure("settlement observation", &e),
            }

            delay = delay
                .mul_f64(self.settlement.backoff_multiplier)
                .min(self.settlement.max_delay);
        }

        Err(Error::SettlementTimeout {
            payment: payment.id.clone(),
            attempts: self.settlement.max_attempts,
        })
    }
}

/// Records a failure that must not change the overall outcome.
#[cfg(feature = "telemetry")]
fn warn_soft_failure(stage: &str, err: &ClientError) {
    tracing::warn!(stage, error = %err, "non-fatal failure during payment finalization");
}

/// Records a failure that must not change the overall outcome.
/// Noop if the telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn warn_soft_failure(_stage: &str, _err: &ClientError) {}
