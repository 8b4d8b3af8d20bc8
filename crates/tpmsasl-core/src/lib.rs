//! TPM SASL negotiation core
//!
//! Device-side logic for proving TPM identity to a provisioning service over
//! SASL and trading that proof for a SAS token.
//!
//! # Architecture
//!
//! The negotiation is a reactive state machine. It never opens sockets or
//! parses connection frames: a negotiation transport delivers the three SASL
//! events (mechanisms, challenge, outcome) and sends back whatever bytes the
//! state machine returns. The TPM and the SAS token signer sit on the other
//! side of two narrow seams, a nonce callback going out and a token
//! submitter coming back in.
//!
//! ```text
//!            ┌──────────────────────┐
//!  events ──►│ SaslListener         │
//!            │   └─ TpmSaslHandler  │── nonce ──► NonceCallback (TPM)
//!  bytes  ◄──│        └─ TokenGate  │◄─ token ─── TokenSubmitter (signer)
//!            └──────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`negotiation`]: TPM SASL state machine and its configuration
//! - [`gate`]: Bounded, cancellable wait for the externally supplied token
//! - [`handler`]: Reactive contract the transport drives
//! - [`listener`]: Adapter from connection-layer SASL events to a handler
//! - [`error`]: Negotiation error types

pub mod error;
pub mod gate;
pub mod handler;
pub mod listener;
pub mod negotiation;

pub use error::{ErrorKind, SaslError, SaslEvent};
pub use gate::{CancelHandle, TokenGate, TokenSubmitter, WaitCause, WaitFailure, token_gate};
pub use handler::SaslHandler;
pub use listener::{SaslListener, SaslTransport};
pub use negotiation::{
    DEFAULT_TOKEN_TIMEOUT, DeviceIdentity, NegotiationConfig, NegotiationState, NonceCallback,
    TpmSaslHandler,
};
pub use tpmsasl_proto::{Nonce, SaslOutcome};
