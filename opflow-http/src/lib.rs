#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Signed HTTP transport for the `opflow` orchestration core.
//!
//! Provides [`client::HttpOpenPayments`], a `reqwest`-based implementation
//! of [`opflow::client::OpenPayments`] that routes every request through a
//! [`signing::SigningMiddleware`]. The HTTP message-signature computation
//! itself is injected via the [`signing::RequestSigner`] trait; this crate
//! only guarantees the headers are stamped on every request that leaves the
//! process.
//!
//! # Modules
//!
//! - [`client`] - The HTTP client and its configuration
//! - [`error`] - Transport error types
//! - [`signing`] - The request-signing seam and middleware
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod client;
pub mod error;
pub mod signing;

pub use client::{HttpClientConfig, HttpOpenPayments};
pub use error::HttpError;
pub use signing::{RequestSigner, SignableRequest, SigningError, SigningMiddleware};
