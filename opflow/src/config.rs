//! Orchestration configuration.
//!
//! One [`OrchestratorConfig`] is built at process start and handed to the
//! orchestrator together with the remote client. There is no global state;
//! two orchestrators with different configs can coexist in one process.

use std::time::Duration;

use url::Url;

/// How the settlement watch polls an outgoing payment.
///
/// The first observation happens after `initial_delay`; each subsequent
/// delay is multiplied by `backoff_multiplier` and capped at `max_delay`,
/// for at most `max_attempts` observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SettlementConfig {
    /// Delay before the first observation.
    pub initial_delay: Duration,

    /// Factor applied to the delay after each observation.
    pub backoff_multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Maximum number of observations before giving up.
    pub max_attempts: u32,
}

impl Default for SettlementConfig {
    /// Roughly 20 seconds of total budget: 1s, 2s, 4s, 8s, 8s.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            max_attempts: 5,
        }
    }
}

/// Configuration for a [`PaymentOrchestrator`](crate::orchestrator::PaymentOrchestrator).
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Base URL the auth server redirects the user back to after the
    /// interactive grant step. The payment correlation id is appended as a
    /// `paymentId` query parameter.
    pub redirect_url: Url,

    /// How long a provisional incoming payment accepts funds. Bounds the
    /// blast radius of an abandoned flow.
    pub incoming_payment_expiry: Duration,

    /// Settlement watch behavior.
    pub settlement: SettlementConfig,
}

impl OrchestratorConfig {
    /// Default incoming-payment expiry: six minutes.
    pub const DEFAULT_INCOMING_PAYMENT_EXPIRY: Duration = Duration::from_secs(6 * 60);

    /// Creates a config with the given redirect URL and default timings.
    #[must_use]
    pub fn new(redirect_url: Url) -> Self {
        Self {
            redirect_url,
            incoming_payment_expiry: Self::DEFAULT_INCOMING_PAYMENT_EXPIRY,
            settlement: SettlementConfig::default(),
        }
    }

    /// Sets the incoming-payment expiry.
    #[must_use]
    pub const fn with_incoming_payment_expiry(mut self, expiry: Duration) -> Self {
        self.incoming_payment_expiry = expiry;
        self
    }

    /// Sets the settlement watch behavior.
    #[must_use]
    pub const fn with_settlement(mut self, settlement: SettlementConfig) -> Self {
        self.settlement = settlement;
        self
    }
}
