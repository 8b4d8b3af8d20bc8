//! Negotiation error types.

use std::time::Duration;

use thiserror::Error;
use tpmsasl_proto::{FramingError, SaslOutcome};

use crate::{gate::WaitCause, negotiation::NegotiationState};

/// Reactive event delivered by the negotiation transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslEvent {
    /// Service announced its mechanisms
    Mechanisms,
    /// Service sent a challenge
    Challenge,
}

impl std::fmt::Display for SaslEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mechanisms => f.write_str("mechanism list"),
            Self::Challenge => f.write_str("challenge"),
        }
    }
}

/// Errors that end a TPM SASL negotiation.
///
/// Every variant is fatal to the negotiation that produced it. Retrying means
/// starting over with a fresh [`crate::TpmSaslHandler`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaslError {
    /// Service did not offer the TPM mechanism
    #[error("service does not offer the {required} mechanism (offered: {offered:?})")]
    MechanismNotSupported {
        /// Mechanism the device needs
        required: String,
        /// Mechanisms the service offered
        offered: Vec<String>,
    },

    /// Event arrived in a state that does not expect it
    #[error("{event} not expected in state {state}: {reason}")]
    ProtocolViolation {
        /// State when the event arrived
        state: NegotiationState,
        /// Offending event
        event: SaslEvent,
        /// What went wrong
        reason: &'static str,
    },

    /// Challenge payload has the wrong shape
    #[error("malformed challenge in state {state}: {reason} ({len} bytes)")]
    MalformedChallenge {
        /// State when the challenge arrived
        state: NegotiationState,
        /// What is wrong with the payload
        reason: &'static str,
        /// Challenge length
        len: usize,
    },

    /// Service rejected the SAS token
    #[error("token rejected by service")]
    CredentialRejected,

    /// Service reported a failure unrelated to the credential
    #[error("authentication failed for a non-credential reason (outcome: {outcome})")]
    NegotiationFailed {
        /// Outcome reported by the service
        outcome: SaslOutcome,
    },

    /// SAS token did not arrive in time
    #[error("no credential supplied in time: {cause} after {waited:?}")]
    CredentialTimeout {
        /// How long the negotiation waited
        waited: Duration,
        /// Why the wait ended
        cause: WaitCause,
    },

    /// Frame builder was given unusable arguments
    #[error("invalid frame argument: {0}")]
    InvalidArgument(#[from] FramingError),
}

/// Discriminant of [`SaslError`], for matching without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`SaslError::MechanismNotSupported`]
    MechanismNotSupported,
    /// See [`SaslError::ProtocolViolation`]
    ProtocolViolation,
    /// See [`SaslError::MalformedChallenge`]
    MalformedChallenge,
    /// See [`SaslError::CredentialRejected`]
    CredentialRejected,
    /// See [`SaslError::NegotiationFailed`]
    NegotiationFailed,
    /// See [`SaslError::CredentialTimeout`]
    CredentialTimeout,
    /// See [`SaslError::InvalidArgument`]
    InvalidArgument,
}

impl SaslError {
    /// Kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MechanismNotSupported { .. } => ErrorKind::MechanismNotSupported,
            Self::ProtocolViolation { .. } => ErrorKind::ProtocolViolation,
            Self::MalformedChallenge { .. } => ErrorKind::MalformedChallenge,
            Self::CredentialRejected => ErrorKind::CredentialRejected,
            Self::NegotiationFailed { .. } => ErrorKind::NegotiationFailed,
            Self::CredentialTimeout { .. } => ErrorKind::CredentialTimeout,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}
