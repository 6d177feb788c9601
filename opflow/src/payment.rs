//! Payment resource types.
//!
//! These mirror the camelCase JSON the resource servers exchange. All of
//! them are server-issued handles threaded through one payment session;
//! nothing here is persisted by this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::amount::Amount;
use crate::client::{IlpMethod, PaymentMetadata};

/// An incoming payment on the receiver's resource server.
///
/// Created with an open amount and a short expiry; completed only after the
/// matching outgoing payment is confirmed funded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingPayment {
    /// Canonical payment URL, used for completion.
    pub id: Url,

    /// The receiving wallet address.
    pub wallet_address: Url,

    /// Whether the payment has been marked finished.
    #[serde(default)]
    pub completed: bool,

    /// When the payment stops accepting funds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Description and other free-form data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMetadata>,
}

/// A quote binding a sender wallet, a debit amount, and a receiver.
///
/// Immutable once created; the server computes `receive_amount` and
/// enforces its own expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Canonical quote URL.
    pub id: Url,

    /// The sending wallet address.
    pub wallet_address: Url,

    /// The incoming payment this quote pays into.
    pub receiver: Url,

    /// Always `"ilp"`.
    pub method: IlpMethod,

    /// Fixed amount debited from the sender.
    pub debit_amount: Amount,

    /// Server-computed amount delivered to the receiver.
    pub receive_amount: Amount,

    /// When the quote's pricing lapses, if the server says.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// An outgoing payment on the sender's resource server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPayment {
    /// Canonical payment URL, used to observe settlement.
    pub id: Url,

    /// The sending wallet address.
    pub wallet_address: Url,

    /// The quote this payment was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_id: Option<Url>,

    /// Set by the server when the payment has definitively failed.
    #[serde(default)]
    pub failed: bool,

    /// What has actually been sent so far; zero until funds move.
    pub sent_amount: Amount,

    /// Description and other free-form data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PaymentMetadata>,
}

/// Error code reported when the sender's balance cannot cover the quote.
pub const INSUFFICIENT_BALANCE: &str = "INSUFFICIENT_BALANCE";

/// Machine- and human-readable description of a payment failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailure {
    /// Machine-readable failure code.
    pub code: String,

    /// Human-readable message.
    pub message: String,
}

/// A cleanup step that failed after the payment itself already succeeded.
///
/// These never flip a funded payment into a reported failure; money has
/// already moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CleanupWarning {
    /// The incoming payment could not be marked completed.
    #[serde(rename_all = "camelCase")]
    IncomingPaymentCompletionFailed {
        /// What the resource server reported.
        message: String,
    },

    /// The incoming-payment grant could not be revoked.
    #[serde(rename_all = "camelCase")]
    GrantRevocationFailed {
        /// What the auth server reported.
        message: String,
    },
}

/// Outcome of a finalize call, shaped for JSON transport to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPaymentResult {
    /// Whether the outgoing payment was confirmed funded.
    pub success: bool,

    /// Failure details when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PaymentFailure>,

    /// Soft cleanup failures on an otherwise successful payment.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CleanupWarning>,
}

impl CheckPaymentResult {
    /// A fully successful payment.
    #[must_use]
    pub const fn funded() -> Self {
        Self {
            success: true,
            error: None,
            warnings: Vec::new(),
        }
    }

    /// A successful payment with post-settlement cleanup warnings.
    #[must_use]
    pub const fn funded_with_warnings(warnings: Vec<CleanupWarning>) -> Self {
        Self {
            success: true,
            error: None,
            warnings,
        }
    }

    /// The normal negative outcome: the sender's balance could not cover
    /// the quote.
    #[must_use]
    pub fn insufficient_balance() -> Self {
        Self {
            success: false,
            error: Some(PaymentFailure {
                code: INSUFFICIENT_BALANCE.to_owned(),
                message:
                    "Insufficient funds to complete this payment. Check your balance and try again."
                        .to_owned(),
            }),
            warnings: Vec::new(),
        }
    }
}
