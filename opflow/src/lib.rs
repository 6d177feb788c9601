#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core orchestration for Open Payments quote-and-pay flows.
//!
//! This crate sequences the protocol work behind an embeddable payment
//! widget: negotiating grants with auth servers, creating the provisional
//! incoming payment, quoting, and — once the end user approves the
//! interactive grant — creating the outgoing payment, watching settlement,
//! and finishing the incoming side.
//!
//! The remote Open Payments service is abstracted behind the
//! [`client::OpenPayments`] trait; the `opflow-http` crate provides the
//! HTTP implementation with signed requests. Everything here is plain
//! sequencing over that boundary, so the whole flow is testable against an
//! in-process fake.
//!
//! # Overview
//!
//! A payment runs in two halves around one user interaction:
//!
//! 1. [`orchestrator::PaymentOrchestrator::build_quote`] resolves both
//!    wallets, creates the incoming payment, and prices the transfer.
//! 2. [`orchestrator::PaymentOrchestrator::request_outgoing_grant`] asks
//!    the sender's auth server for an interactive grant and hands back the
//!    redirect the user must visit.
//! 3. After the redirect returns with an interaction reference,
//!    [`orchestrator::PaymentOrchestrator::finalize_payment`] finalizes the
//!    grant, pays, and verifies funds actually moved before completing the
//!    incoming payment.
//!
//! # Modules
//!
//! - [`amount`] - Minor-unit amount conversion and display formatting
//! - [`client`] - Capability-typed boundary to the remote service
//! - [`config`] - Orchestrator and settlement-watch configuration
//! - [`error`] - Error taxonomy of the orchestration flow
//! - [`finalize`] - Grant continuation, outgoing payment, settlement watch
//! - [`grant`] - GNAP grant types and the grant negotiator
//! - [`orchestrator`] - Top-level entry points and payment sessions
//! - [`payment`] - Payment, quote, and result types
//! - [`quote`] - The strict-order quote pipeline
//! - [`wallet`] - Wallet address resolution
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod client;
pub mod config;
pub mod error;
pub mod finalize;
pub mod grant;
pub mod orchestrator;
pub mod payment;
pub mod quote;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testutil;

pub use client::{ClientError, OpenPayments, SharedClient};
pub use config::OrchestratorConfig;
pub use error::Error;
pub use orchestrator::PaymentOrchestrator;
