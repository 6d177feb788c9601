//! Wallet address resolution.
//!
//! Users type wallet addresses either as full `https://` URLs or in the
//! `$wallet.example/alice` short form. Resolution rewrites the short form,
//! then asks the remote service for the wallet's metadata: asset, auth
//! server, and resource server. A wallet's metadata is effectively static,
//! so callers may cache resolved values, but nothing here requires it.

use serde::{Deserialize, Serialize};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::{OpenPayments, SharedClient};
use crate::error::Error;

/// Resolved identity of a payment account.
///
/// All fields are required; a lookup response missing any of them is
/// rejected during deserialization rather than defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAddress {
    /// Canonical wallet address URL, the immutable identifier.
    pub id: Url,

    /// Asset code, usually an ISO 4217 currency code.
    pub asset_code: String,

    /// Minor-unit exponent of the wallet's asset.
    pub asset_scale: u8,

    /// Auth server that issues grants for this wallet.
    pub auth_server: Url,

    /// Resource server hosting this wallet's payments and quotes.
    pub resource_server: Url,

    /// Display name, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_name: Option<String>,
}

/// Rewrites a user-supplied address into a canonical `https://` URL.
///
/// `$wallet.example/alice` becomes `https://wallet.example/alice`; full
/// `https://` URLs pass through unchanged.
///
/// # Errors
///
/// Returns [`Error::InvalidWalletAddress`] when the input is neither form,
/// or does not parse as a URL.
pub fn normalize_address(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();
    let candidate = if let Some(rest) = trimmed.strip_prefix('$') {
        format!("https://{rest}")
    } else if trimmed.starts_with("https://") {
        trimmed.to_owned()
    } else {
        return Err(Error::invalid_wallet_address(
            input,
            "expected an https:// URL or a $-prefixed payment pointer",
        ));
    };

    candidate
        .parse::<Url>()
        .map_err(|e| Error::invalid_wallet_address(input, e))
}

/// Resolves wallet address inputs into [`WalletAddress`] metadata.
#[derive(Clone)]
pub struct WalletResolver {
    client: SharedClient,
}

impl std::fmt::Debug for WalletResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletResolver").finish_non_exhaustive()
    }
}

impl WalletResolver {
    /// Creates a resolver backed by the given remote client.
    #[must_use]
    pub fn new(client: SharedClient) -> Self {
        Self { client }
    }

    /// Resolves an address input to full wallet metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWalletAddress`] if the input is malformed or
    /// the remote lookup fails.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "opflow.wallet.resolve", skip(self), err)
    )]
    pub async fn resolve(&self, input: &str) -> Result<WalletAddress, Error> {
        let url = normalize_address(input)?;
        self.client
            .get_wallet_address(&url)
            .await
            .map_err(|e| Error::invalid_wallet_address(input, e))
    }
}
