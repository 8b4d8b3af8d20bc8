//! Simulation harness for TPM SASL negotiations.
//!
//! Runs the device-side state machine against a scripted provisioning
//! service, with the credential pipeline on a tokio runtime so the token
//! really does cross a thread boundary.
//!
//! - [`SimService`]: scripted service side, implements the SASL transport
//! - [`credential_pipeline`]: nonce forwarder plus async token signer
//! - [`SasSigner`]: deterministic stand-in for TPM-backed token signing
//! - [`scenario`]: declarative scenarios verified by oracles

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod pipeline;
pub mod sas;
pub mod scenario;
pub mod sim_service;

pub use pipeline::{CredentialPipeline, NonceForwarder, PipelineMode, credential_pipeline};
pub use sas::SasSigner;
pub use sim_service::{Registration, ServiceEvent, SimService};

/// Harness setup failures. Negotiation failures are part of the result, not
/// errors of the harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Async runtime could not start
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),

    /// Signing key rejected
    #[error("invalid signing key: {0}")]
    SigningKey(String),
}
