//! Error types for payment orchestration.
//!
//! Failures that precede any externally visible side effect abort the whole
//! operation; there is nothing to compensate. Failures after the outgoing
//! payment is confirmed funded are deliberately *not* represented here —
//! they surface as [`CleanupWarning`](crate::payment::CleanupWarning)s on a
//! successful [`CheckPaymentResult`](crate::payment::CheckPaymentResult),
//! because money has already moved. Insufficient balance is likewise a
//! normal negative result, not an error.

use url::Url;

use crate::amount::AmountError;
use crate::client::ClientError;
use crate::grant::AccessType;
use crate::quote::QuoteStep;

/// Errors surfaced by the orchestration flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A wallet address could not be resolved to usable metadata.
    #[error("invalid wallet address `{input}`: {reason}")]
    InvalidWalletAddress {
        /// The address as the caller supplied it.
        input: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A user-supplied amount could not be converted to minor units.
    #[error(transparent)]
    InvalidAmount(#[from] AmountError),

    /// The auth server demanded interaction for an access type that must
    /// never require it. This is a protocol violation on the server side.
    #[error("auth server returned an interactive grant for {access_type} access")]
    UnexpectedInteractiveGrant {
        /// The access type that was requested.
        access_type: AccessType,
    },

    /// The auth server finalized an outgoing-payment grant without user
    /// interaction. This access type always requires it.
    #[error("auth server returned a finalized grant for outgoing-payment access")]
    UnexpectedNonInteractiveGrant,

    /// Grant continuation came back still pending. Terminal; the caller
    /// must restart the interactive flow from a fresh grant request.
    #[error("grant did not finalize after continuation")]
    GrantNotFinalized,

    /// A remote call inside the quote pipeline failed.
    #[error("quote creation failed at the {step} step")]
    QuoteCreationFailed {
        /// Which pipeline step failed.
        step: QuoteStep,
        /// The underlying transport failure.
        #[source]
        source: ClientError,
    },

    /// The outgoing payment could not be created. Nothing has been debited
    /// yet, so no compensating action is needed.
    #[error("outgoing payment creation failed")]
    OutgoingPaymentCreationFailed(#[source] ClientError),

    /// The outgoing payment never reached a terminal state within the
    /// settlement poll budget. Distinct from insufficient balance: a stale
    /// zero is never misread as a declined payment.
    #[error("outgoing payment `{payment}` showed no settlement after {attempts} checks")]
    SettlementTimeout {
        /// The payment that was being watched.
        payment: Url,
        /// How many observations were made.
        attempts: u32,
    },

    /// No payment session is registered under the given correlation id.
    #[error("no payment session with id `{0}`")]
    UnknownSession(String),

    /// A remote call failed outside any more specific classification.
    #[error("remote call failed: {0}")]
    Client(#[from] ClientError),
}

impl Error {
    /// Builds an [`Error::InvalidWalletAddress`] from an input and a reason.
    #[must_use]
    pub fn invalid_wallet_address(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidWalletAddress {
            input: input.into(),
            reason: reason.to_string(),
        }
    }
}
