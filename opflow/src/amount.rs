//! Minor-unit amount handling.
//!
//! Open Payments servers exchange monetary values as integer strings in an
//! asset's minor unit (`value`), qualified by `assetCode` and `assetScale`.
//! This module converts between that wire representation and the decimal
//! numbers users type and read.
//!
//! Values are serialized as strings to avoid loss of precision in JSON, since
//! `JavaScript`'s `Number` type cannot safely represent all 64-bit integers.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in an asset's minor unit.
///
/// `value` is a non-negative base-10 integer string. Two amounts are
/// comparable only when both `asset_code` and `asset_scale` match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    /// Integer value in minor units (e.g. `"1000"` for 10.00 at scale 2).
    pub value: String,

    /// Asset code, usually an ISO 4217 currency code (e.g. `"USD"`).
    pub asset_code: String,

    /// Minor-unit exponent: `value` is the amount times `10^asset_scale`.
    pub asset_scale: u8,
}

impl Amount {
    /// Creates a new amount from its raw parts.
    #[must_use]
    pub fn new(value: impl Into<String>, asset_code: impl Into<String>, asset_scale: u8) -> Self {
        Self {
            value: value.into(),
            asset_code: asset_code.into(),
            asset_scale,
        }
    }

    /// Parses `value` as an integer number of minor units.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::InvalidValue`] if `value` is not a
    /// non-negative integer string.
    pub fn units(&self) -> Result<u128, AmountError> {
        self.value
            .parse::<u128>()
            .map_err(|_| AmountError::InvalidValue(self.value.clone()))
    }

    /// Returns `true` if the other amount is denominated in the same asset
    /// at the same scale.
    #[must_use]
    pub fn same_asset(&self, other: &Self) -> bool {
        self.asset_code == other.asset_code && self.asset_scale == other.asset_scale
    }
}

/// An amount prepared for display to a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayAmount {
    /// The amount as a decimal number (minor units divided by `10^scale`).
    pub numeric: f64,

    /// Symbol-prefixed fixed-point rendering, e.g. `"$10.00"`.
    pub formatted: String,

    /// Currency symbol, or the uppercased asset code when unrecognized.
    pub symbol: String,
}

/// Errors arising from amount conversion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AmountError {
    /// The input was NaN or infinite.
    #[error("amount must be a finite number, got {0}")]
    NotFinite(f64),

    /// The input was negative.
    #[error("amount must be non-negative, got {0}")]
    Negative(f64),

    /// The input cannot be represented at the requested scale.
    #[error("amount {amount} is out of range for asset scale {asset_scale}")]
    OutOfRange {
        /// The offending decimal amount.
        amount: f64,
        /// The requested minor-unit exponent.
        asset_scale: u8,
    },

    /// A wire `value` string was not a non-negative integer.
    #[error("amount value `{0}` is not a non-negative integer string")]
    InvalidValue(String),
}

/// Converts a user-facing decimal amount into an integer minor-unit string.
///
/// Multiplies by `10^asset_scale` and rounds to the nearest integer, ties
/// away from zero, which is what resource servers expect for an exact
/// integer `value`.
///
/// # Errors
///
/// Returns [`AmountError`] if the amount is negative, non-finite, or does
/// not fit the minor-unit representation at the given scale.
pub fn to_minor_units(amount: f64, asset_scale: u8) -> Result<String, AmountError> {
    if !amount.is_finite() {
        return Err(AmountError::NotFinite(amount));
    }
    if amount < 0.0 {
        return Err(AmountError::Negative(amount));
    }

    let out_of_range = || AmountError::OutOfRange {
        amount,
        asset_scale,
    };

    let decimal = Decimal::from_f64(amount).ok_or_else(out_of_range)?;
    let factor = pow10(asset_scale).ok_or_else(out_of_range)?;
    let scaled = decimal.checked_mul(factor).ok_or_else(out_of_range)?;
    let rounded = scaled.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    Ok(rounded.normalize().to_string())
}

/// Converts a minor-unit [`Amount`] back into a displayable decimal.
///
/// Recognized ISO 4217 codes get their currency symbol; any other asset
/// code is rendered uppercased in place of a symbol.
///
/// # Errors
///
/// Returns [`AmountError::InvalidValue`] if the amount's `value` is not an
/// integer string.
pub fn to_display_amount(amount: &Amount) -> Result<DisplayAmount, AmountError> {
    let units = amount
        .value
        .parse::<Decimal>()
        .map_err(|_| AmountError::InvalidValue(amount.value.clone()))?;
    if units.is_sign_negative() || !units.fract().is_zero() {
        return Err(AmountError::InvalidValue(amount.value.clone()));
    }

    let factor = pow10(amount.asset_scale).ok_or_else(|| AmountError::OutOfRange {
        amount: 0.0,
        asset_scale: amount.asset_scale,
    })?;
    let mut decimal = units / factor;
    decimal.rescale(u32::from(amount.asset_scale));

    let numeric = decimal
        .to_f64()
        .ok_or_else(|| AmountError::InvalidValue(amount.value.clone()))?;
    let symbol = currency_symbol(&amount.asset_code);
    let formatted = format!("{symbol}{decimal}");

    Ok(DisplayAmount {
        numeric,
        formatted,
        symbol,
    })
}

/// Returns `10^scale` as a [`Decimal`], or `None` on overflow.
fn pow10(scale: u8) -> Option<Decimal> {
    let mut factor = Decimal::ONE;
    for _ in 0..scale {
        factor = factor.checked_mul(Decimal::TEN)?;
    }
    Some(factor)
}

/// Maps a 3-letter ISO 4217 code to its conventional symbol.
///
/// Unrecognized codes fall back to the uppercased code itself followed by a
/// space, so `"XRP"` renders as `"XRP 1.50"`.
fn currency_symbol(asset_code: &str) -> String {
    let upper = asset_code.to_ascii_uppercase();
    let symbol = match upper.as_str() {
        "USD" | "AUD" | "CAD" | "NZD" | "SGD" | "HKD" | "MXN" => "$",
        "EUR" => "\u{20ac}",
        "GBP" => "\u{a3}",
        "JPY" | "CNY" => "\u{a5}",
        "INR" => "\u{20b9}",
        "KRW" => "\u{20a9}",
        "BRL" => "R$",
        "ZAR" => "R",
        _ => return format!("{upper} "),
    };
    symbol.to_owned()
}
