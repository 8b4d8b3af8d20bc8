//! TPM SASL negotiation state machine.
//!
//! One [`TpmSaslHandler`] drives one authentication attempt. The negotiation
//! transport feeds it the three SASL events and sends back whatever bytes it
//! returns; the handler never touches the connection itself.
//!
//! # State Machine
//!
//! ```text
//! ┌─────────────┐ mechanisms ┌────────────────────────┐ [0x00] ┌─────────────────────────┐
//! │ SendingInit │───────────>│ AwaitingFirstChallenge │───────>│ AwaitingSecondChallenge │
//! └─────────────┘  init      └────────────────────────┘  srk   └─────────────────────────┘
//!                                                                          │ [m] nonce half 1
//!                                                                          ↓ [0x00]
//! ┌─────────────────┐  token   ┌─────────────────────────┐ nonce ┌────────────────────────┐
//! │ AwaitingOutcome │<─────────│ AwaitingTokenSubmission │<──────│ AwaitingThirdChallenge │
//! └─────────────────┘          └─────────────────────────┘       └────────────────────────┘
//! ```
//!
//! States only move forward. Any event the current state does not expect is
//! a [`SaslError::ProtocolViolation`], and any error concludes the
//! negotiation: the state stays where it failed and every later mechanism or
//! challenge event is rejected. The outcome event is accepted in any state
//! and always concludes the negotiation.
//!
//! # Blocking
//!
//! The third challenge is the only place the handler blocks. It hands the
//! assembled nonce to the [`NonceCallback`] (synchronously, so the
//! callback's own latency lands on the caller) and then waits on the
//! [`crate::gate`] for the SAS token, bounded by
//! [`NegotiationConfig::token_timeout`].

use std::{fmt, time::Duration};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tpmsasl_proto::{
    ControlByte, Nonce, NonceFragment, SaslOutcome, TPM_MECHANISM, concat_with_null_delimiters,
    prefix_with_control_byte,
};

use crate::{
    error::{SaslError, SaslEvent},
    gate::{CancelHandle, TokenGate, TokenSubmitter, token_gate},
    handler::SaslHandler,
};

/// Default bound on the wait for the SAS token.
pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Negotiation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NegotiationState {
    /// Waiting for the service's mechanism list
    SendingInit,
    /// Init sent, waiting for the empty acknowledgment
    AwaitingFirstChallenge,
    /// Storage root key sent, waiting for the first nonce half
    AwaitingSecondChallenge,
    /// First nonce half stored, waiting for the second
    AwaitingThirdChallenge,
    /// Nonce handed out, waiting for the SAS token
    AwaitingTokenSubmission,
    /// Token sent, waiting for the service's verdict
    AwaitingOutcome,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Negotiation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Mechanism name the service must offer
    pub mechanism: String,
    /// Bound on the wait for the SAS token after the nonce is handed out
    pub token_timeout: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self { mechanism: TPM_MECHANISM.to_string(), token_timeout: DEFAULT_TOKEN_TIMEOUT }
    }
}

/// Identity material the device presents during the negotiation.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Provisioning service tenant
    pub id_scope: String,
    /// Device registration id
    pub registration_id: String,
    /// TPM public endorsement key
    pub endorsement_key: Vec<u8>,
    /// Storage root key material sent in the first response
    pub storage_root_key: Vec<u8>,
}

impl fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("id_scope", &self.id_scope)
            .field("registration_id", &self.registration_id)
            .field("endorsement_key_len", &self.endorsement_key.len())
            .field("storage_root_key_len", &self.storage_root_key.len())
            .finish()
    }
}

/// Receives the assembled nonce.
///
/// Called exactly once per negotiation, from the thread handling the third
/// challenge. The implementation is expected to start whatever produces the
/// SAS token and return; the token comes back through the
/// [`TokenSubmitter`].
pub trait NonceCallback {
    /// Hand the nonce to the TPM side.
    fn provide_nonce(&mut self, nonce: &Nonce);
}

impl<F> NonceCallback for F
where
    F: FnMut(&Nonce),
{
    fn provide_nonce(&mut self, nonce: &Nonce) {
        self(nonce);
    }
}

/// Per-state data. Only the state between the second and third challenge
/// holds the first nonce half.
#[derive(Debug)]
enum Phase {
    SendingInit,
    AwaitingFirstChallenge,
    AwaitingSecondChallenge,
    AwaitingThirdChallenge(NonceFragment),
    AwaitingTokenSubmission,
    AwaitingOutcome,
}

impl Phase {
    fn state(&self) -> NegotiationState {
        match self {
            Self::SendingInit => NegotiationState::SendingInit,
            Self::AwaitingFirstChallenge => NegotiationState::AwaitingFirstChallenge,
            Self::AwaitingSecondChallenge => NegotiationState::AwaitingSecondChallenge,
            Self::AwaitingThirdChallenge(_) => NegotiationState::AwaitingThirdChallenge,
            Self::AwaitingTokenSubmission => NegotiationState::AwaitingTokenSubmission,
            Self::AwaitingOutcome => NegotiationState::AwaitingOutcome,
        }
    }
}

/// Device side of the TPM SASL mechanism.
///
/// Owns the negotiation context for a single attempt. Not reusable: once
/// [`TpmSaslHandler::is_concluded`] is true, start a new handler.
pub struct TpmSaslHandler<C> {
    identity: DeviceIdentity,
    config: NegotiationConfig,
    phase: Phase,
    concluded: bool,
    nonce_callback: C,
    gate: TokenGate,
}

impl<C: NonceCallback> TpmSaslHandler<C> {
    /// Create a handler in [`NegotiationState::SendingInit`].
    ///
    /// Returns the handler together with the submitter through which the SAS
    /// token must be supplied once the nonce has been delivered.
    pub fn new(
        identity: DeviceIdentity,
        config: NegotiationConfig,
        nonce_callback: C,
    ) -> (Self, TokenSubmitter) {
        let (submitter, gate) = token_gate();
        let handler = Self {
            identity,
            config,
            phase: Phase::SendingInit,
            concluded: false,
            nonce_callback,
            gate,
        };
        (handler, submitter)
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> NegotiationState {
        self.phase.state()
    }

    /// True once the negotiation succeeded or failed.
    #[must_use]
    pub fn is_concluded(&self) -> bool {
        self.concluded
    }

    /// Handle that aborts the token wait, e.g. when the connection drops.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.gate.cancel_handle()
    }

    /// Configuration in use
    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    fn advance(&mut self, next: Phase) {
        let from = self.phase.state();
        self.phase = next;
        tracing::debug!(%from, to = %self.phase.state(), "TPM SASL state transition");
    }

    fn fail(&mut self, error: SaslError) -> SaslError {
        self.concluded = true;
        tracing::warn!(state = %self.state(), %error, "TPM SASL negotiation failed");
        error
    }

    fn violation(&mut self, event: SaslEvent, reason: &'static str) -> SaslError {
        let state = self.state();
        self.fail(SaslError::ProtocolViolation { state, event, reason })
    }

    fn malformed(&mut self, reason: &'static str, len: usize) -> SaslError {
        let state = self.state();
        self.fail(SaslError::MalformedChallenge { state, reason, len })
    }

    fn first_challenge(&mut self, challenge: &[u8]) -> Result<Bytes, SaslError> {
        if challenge != [0x00] {
            return Err(self.malformed("expected a single 0x00 acknowledgment", challenge.len()));
        }

        self.advance(Phase::AwaitingSecondChallenge);
        Ok(prefix_with_control_byte(ControlByte::Initial, &self.identity.storage_root_key))
    }

    fn second_challenge(&mut self, challenge: &[u8]) -> Result<Bytes, SaslError> {
        let Ok(fragment) = NonceFragment::from_challenge(challenge) else {
            return Err(self.malformed("empty nonce fragment", challenge.len()));
        };

        self.advance(Phase::AwaitingThirdChallenge(fragment));
        Ok(prefix_with_control_byte(ControlByte::Initial, &[]))
    }

    fn third_challenge(&mut self, challenge: &[u8]) -> Result<Bytes, SaslError> {
        let Phase::AwaitingThirdChallenge(fragment) = &self.phase else {
            return Err(self.violation(SaslEvent::Challenge, "no nonce fragment stored"));
        };
        let Ok(nonce) = fragment.complete(challenge) else {
            return Err(self.malformed("empty nonce fragment", challenge.len()));
        };

        tracing::debug!(nonce_len = nonce.len(), "nonce assembled, handing to TPM");
        self.nonce_callback.provide_nonce(&nonce);
        self.advance(Phase::AwaitingTokenSubmission);
        tracing::debug!(token_ready = self.gate.is_fulfilled(), "waiting for SAS token");

        let token = match self.gate.wait(self.config.token_timeout) {
            Ok(token) => token,
            Err(failure) => {
                return Err(self.fail(SaslError::CredentialTimeout {
                    waited: failure.waited,
                    cause: failure.cause,
                }));
            },
        };

        self.advance(Phase::AwaitingOutcome);
        Ok(prefix_with_control_byte(ControlByte::Initial, token.as_bytes()))
    }
}

impl<C: NonceCallback> SaslHandler for TpmSaslHandler<C> {
    fn handle_mechanisms(&mut self, mechanisms: &[&str]) -> Result<Bytes, SaslError> {
        if self.concluded {
            return Err(self.violation(SaslEvent::Mechanisms, "negotiation already concluded"));
        }
        if !matches!(self.phase, Phase::SendingInit) {
            return Err(self.violation(SaslEvent::Mechanisms, "init already sent"));
        }

        if !mechanisms.contains(&self.config.mechanism.as_str()) {
            let error = SaslError::MechanismNotSupported {
                required: self.config.mechanism.clone(),
                offered: mechanisms.iter().map(ToString::to_string).collect(),
            };
            return Err(self.fail(error));
        }

        let fields: [&[u8]; 3] = [
            self.identity.id_scope.as_bytes(),
            self.identity.registration_id.as_bytes(),
            &self.identity.endorsement_key,
        ];
        let body = match concat_with_null_delimiters(&fields) {
            Ok(body) => body,
            Err(e) => return Err(self.fail(e.into())),
        };

        self.advance(Phase::AwaitingFirstChallenge);
        Ok(prefix_with_control_byte(ControlByte::Initial, &body))
    }

    fn handle_challenge(&mut self, challenge: &[u8]) -> Result<Bytes, SaslError> {
        if self.concluded {
            return Err(self.violation(SaslEvent::Challenge, "negotiation already concluded"));
        }

        match self.phase.state() {
            NegotiationState::SendingInit => {
                Err(self.violation(SaslEvent::Challenge, "challenge received before init sent"))
            },
            NegotiationState::AwaitingFirstChallenge => self.first_challenge(challenge),
            NegotiationState::AwaitingSecondChallenge => self.second_challenge(challenge),
            NegotiationState::AwaitingThirdChallenge => self.third_challenge(challenge),
            NegotiationState::AwaitingTokenSubmission | NegotiationState::AwaitingOutcome => {
                Err(self.violation(SaslEvent::Challenge, "unexpected challenge; outcome expected"))
            },
        }
    }

    fn handle_outcome(&mut self, outcome: SaslOutcome) -> Result<(), SaslError> {
        self.concluded = true;

        let error = match outcome {
            SaslOutcome::Ok => {
                tracing::info!(
                    registration_id = %self.identity.registration_id,
                    state = %self.state(),
                    "TPM SASL negotiation succeeded"
                );
                return Ok(());
            },
            SaslOutcome::Auth => SaslError::CredentialRejected,
            SaslOutcome::None
            | SaslOutcome::Sys
            | SaslOutcome::Perm
            | SaslOutcome::Temp
            | SaslOutcome::Skipped => SaslError::NegotiationFailed { outcome },
        };

        Err(self.fail(error))
    }
}

impl<C> fmt::Debug for TpmSaslHandler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TpmSaslHandler")
            .field("identity", &self.identity)
            .field("config", &self.config)
            .field("phase", &self.phase)
            .field("concluded", &self.concluded)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
    };

    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;
    use crate::{error::ErrorKind, gate::WaitCause};

    type Delivered = Arc<Mutex<Vec<Vec<u8>>>>;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            id_scope: "scope1".into(),
            registration_id: "reg1".into(),
            endorsement_key: vec![0x01, 0x02],
            storage_root_key: vec![0x53, 0x52, 0x4B],
        }
    }

    fn recording_handler(
        config: NegotiationConfig,
    ) -> (TpmSaslHandler<impl NonceCallback>, TokenSubmitter, Delivered) {
        let delivered = Delivered::default();
        let sink = Arc::clone(&delivered);
        let (handler, submitter) = TpmSaslHandler::new(identity(), config, move |nonce: &Nonce| {
            sink.lock().unwrap().push(nonce.as_bytes().to_vec());
        });
        (handler, submitter, delivered)
    }

    fn short_timeout() -> NegotiationConfig {
        NegotiationConfig { token_timeout: Duration::from_millis(20), ..Default::default() }
    }

    /// Drive a handler up to `AwaitingThirdChallenge`.
    fn through_second_challenge<C: NonceCallback>(handler: &mut TpmSaslHandler<C>) {
        handler.handle_mechanisms(&["TPM"]).unwrap();
        handler.handle_challenge(&[0x00]).unwrap();
        handler.handle_challenge(&hex!("01aabb")).unwrap();
        assert_eq!(handler.state(), NegotiationState::AwaitingThirdChallenge);
    }

    #[test]
    fn init_frame_is_bit_exact() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());

        let init = handler.handle_mechanisms(&["TPM"]).unwrap();

        assert_eq!(&init[..], &hex!("00 73636f706531 00 72656731 00 0102"));
        assert_eq!(handler.state(), NegotiationState::AwaitingFirstChallenge);
    }

    #[test]
    fn init_frame_snapshot() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        let init = handler.handle_mechanisms(&["PLAIN", "TPM"]).unwrap();
        insta::assert_snapshot!(hex::encode(&init), @"0073636f7065310072656731000102");
    }

    #[test]
    fn missing_mechanism_rejected() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());

        let err = handler.handle_mechanisms(&["PLAIN", "tpm"]).unwrap_err();

        assert_eq!(
            err,
            SaslError::MechanismNotSupported {
                required: "TPM".into(),
                offered: vec!["PLAIN".into(), "tpm".into()],
            }
        );
        assert_eq!(handler.state(), NegotiationState::SendingInit);
        assert!(handler.is_concluded());
    }

    #[test]
    fn challenge_before_init_is_violation() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());

        let err = handler.handle_challenge(&[0x00]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        assert_eq!(handler.state(), NegotiationState::SendingInit);
    }

    #[test]
    fn first_challenge_must_be_single_zero() {
        for bad in [&[0x05][..], &[][..], &[0x00, 0x00][..]] {
            let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
            handler.handle_mechanisms(&["TPM"]).unwrap();

            let err = handler.handle_challenge(bad).unwrap_err();

            assert_eq!(err.kind(), ErrorKind::MalformedChallenge);
            assert_eq!(handler.state(), NegotiationState::AwaitingFirstChallenge);
        }
    }

    #[test]
    fn first_challenge_returns_srk() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        handler.handle_mechanisms(&["TPM"]).unwrap();

        let response = handler.handle_challenge(&[0x00]).unwrap();

        assert_eq!(&response[..], &hex!("00 53524b"));
        assert_eq!(handler.state(), NegotiationState::AwaitingSecondChallenge);
    }

    #[test]
    fn second_challenge_stores_fragment() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        handler.handle_mechanisms(&["TPM"]).unwrap();
        handler.handle_challenge(&[0x00]).unwrap();

        let response = handler.handle_challenge(&hex!("01aabb")).unwrap();

        assert_eq!(&response[..], hex!("00"));
        assert_eq!(handler.state(), NegotiationState::AwaitingThirdChallenge);
        match &handler.phase {
            Phase::AwaitingThirdChallenge(fragment) => {
                assert_eq!(fragment.as_bytes(), &hex!("aabb"));
            },
            other => panic!("unexpected phase {other:?}"),
        }
    }

    #[test]
    fn empty_second_challenge_is_malformed() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        handler.handle_mechanisms(&["TPM"]).unwrap();
        handler.handle_challenge(&[0x00]).unwrap();

        let err = handler.handle_challenge(&[]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedChallenge);
        assert_eq!(handler.state(), NegotiationState::AwaitingSecondChallenge);
    }

    #[test]
    fn third_challenge_delivers_nonce_and_sends_token() {
        let (mut handler, submitter, delivered) = recording_handler(NegotiationConfig::default());
        through_second_challenge(&mut handler);
        submitter.submit("tok");

        let response = handler.handle_challenge(&hex!("01ccdd")).unwrap();

        assert_eq!(&response[..], b"\x00tok");
        assert_eq!(handler.state(), NegotiationState::AwaitingOutcome);
        assert_eq!(*delivered.lock().unwrap(), vec![hex!("aabbccdd").to_vec()]);
    }

    #[test]
    fn token_from_pipeline_thread() {
        let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
        let (mut handler, submitter) =
            TpmSaslHandler::new(identity(), NegotiationConfig::default(), move |nonce: &Nonce| {
                tx.send(nonce.as_bytes().to_vec()).unwrap();
            });

        let pipeline = thread::spawn(move || {
            let nonce = rx.recv().unwrap();
            submitter.submit(format!("sig-{}", hex::encode(nonce)));
        });

        through_second_challenge(&mut handler);
        let response = handler.handle_challenge(&hex!("01ccdd")).unwrap();
        pipeline.join().unwrap();

        assert_eq!(&response[..], b"\x00sig-aabbccdd");
        assert_eq!(handler.state(), NegotiationState::AwaitingOutcome);
    }

    #[test]
    fn missing_token_times_out() {
        let (mut handler, _submitter, delivered) = recording_handler(short_timeout());
        through_second_challenge(&mut handler);

        let err = handler.handle_challenge(&hex!("01ccdd")).unwrap_err();

        assert!(matches!(err, SaslError::CredentialTimeout { cause: WaitCause::Elapsed, .. }));
        assert_eq!(handler.state(), NegotiationState::AwaitingTokenSubmission);
        assert_eq!(delivered.lock().unwrap().len(), 1);
        assert!(handler.is_concluded());
    }

    #[test]
    fn cancellation_counts_as_timeout() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        through_second_challenge(&mut handler);
        handler.cancel_handle().cancel();

        let err = handler.handle_challenge(&hex!("01ccdd")).unwrap_err();

        assert!(matches!(err, SaslError::CredentialTimeout { cause: WaitCause::Cancelled, .. }));
    }

    #[test]
    fn empty_third_challenge_keeps_fragment_state() {
        let (mut handler, _submitter, delivered) = recording_handler(short_timeout());
        through_second_challenge(&mut handler);

        let err = handler.handle_challenge(&[]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MalformedChallenge);
        assert_eq!(handler.state(), NegotiationState::AwaitingThirdChallenge);
        assert!(delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn challenge_after_token_is_violation() {
        let (mut handler, submitter, _) = recording_handler(NegotiationConfig::default());
        through_second_challenge(&mut handler);
        submitter.submit("tok");
        handler.handle_challenge(&hex!("01ccdd")).unwrap();

        let err = handler.handle_challenge(&hex!("01ccdd")).unwrap_err();

        assert_eq!(
            err,
            SaslError::ProtocolViolation {
                state: NegotiationState::AwaitingOutcome,
                event: SaslEvent::Challenge,
                reason: "unexpected challenge; outcome expected",
            }
        );
    }

    #[test]
    fn outcome_ok_after_token() {
        let (mut handler, submitter, _) = recording_handler(NegotiationConfig::default());
        through_second_challenge(&mut handler);
        submitter.submit("tok");
        handler.handle_challenge(&hex!("01ccdd")).unwrap();

        assert_eq!(handler.handle_outcome(SaslOutcome::Ok), Ok(()));
        assert!(handler.is_concluded());
    }

    #[test]
    fn outcome_auth_rejects_credential_in_any_state() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        assert_eq!(handler.handle_outcome(SaslOutcome::Auth), Err(SaslError::CredentialRejected));

        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        through_second_challenge(&mut handler);
        assert_eq!(handler.handle_outcome(SaslOutcome::Auth), Err(SaslError::CredentialRejected));
    }

    #[test]
    fn other_outcomes_fail_negotiation() {
        let failures = SaslOutcome::ALL
            .into_iter()
            .filter(|o| !matches!(o, SaslOutcome::Ok | SaslOutcome::Auth));

        for outcome in failures {
            let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
            assert_eq!(
                handler.handle_outcome(outcome),
                Err(SaslError::NegotiationFailed { outcome })
            );
        }
    }

    #[test]
    fn concluded_handler_rejects_further_events() {
        let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
        handler.handle_mechanisms(&["PLAIN"]).unwrap_err();

        let err = handler.handle_mechanisms(&["TPM"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
        let err = handler.handle_challenge(&[0x00]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn custom_mechanism_name() {
        let config = NegotiationConfig { mechanism: "TPM2".into(), ..Default::default() };
        let (mut handler, _submitter, _) = recording_handler(config);

        let err = handler.handle_mechanisms(&["TPM"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MechanismNotSupported);
    }

    #[test]
    fn default_config() {
        let config = NegotiationConfig::default();
        assert_eq!(config.mechanism, "TPM");
        assert_eq!(config.token_timeout, Duration::from_secs(180));
    }

    #[test]
    fn debug_hides_key_material() {
        let rendered = format!("{:?}", identity());
        assert!(rendered.contains("endorsement_key_len: 2"));
        assert!(!rendered.contains("[1, 2]"));
    }

    fn mechanism() -> impl Strategy<Value = String> {
        "[A-Z0-9-]{1,12}".prop_filter("must not be TPM", |m| m != "TPM")
    }

    /// Replays a challenge script up to `steps` events deep.
    fn advance_to(steps: usize) -> (TpmSaslHandler<impl NonceCallback>, TokenSubmitter) {
        let (mut handler, submitter, _) = recording_handler(NegotiationConfig::default());
        if steps >= 1 {
            handler.handle_mechanisms(&["TPM"]).unwrap();
        }
        if steps >= 2 {
            handler.handle_challenge(&[0x00]).unwrap();
        }
        if steps >= 3 {
            handler.handle_challenge(&hex!("01aabb")).unwrap();
        }
        (handler, submitter)
    }

    proptest! {
        #[test]
        fn any_set_without_tpm_is_rejected(offered in prop::collection::vec(mechanism(), 0..6)) {
            let (mut handler, _submitter, _) = recording_handler(NegotiationConfig::default());
            let refs: Vec<&str> = offered.iter().map(String::as_str).collect();

            let err = handler.handle_mechanisms(&refs).unwrap_err();

            prop_assert_eq!(err.kind(), ErrorKind::MechanismNotSupported);
            prop_assert_eq!(handler.state(), NegotiationState::SendingInit);
        }

        #[test]
        fn replayed_mechanisms_are_violations(steps in 1usize..=3) {
            let (mut handler, _submitter) = advance_to(steps);
            let before = handler.state();

            let err = handler.handle_mechanisms(&["TPM"]).unwrap_err();

            prop_assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
            prop_assert_eq!(handler.state(), before);
        }

        #[test]
        fn challenge_in_wrong_state_is_violation(
            steps in 0usize..=4,
            conclude in any::<bool>(),
            challenge in prop::collection::vec(any::<u8>(), 0..32),
        ) {
            let (mut handler, submitter) = advance_to(steps.min(3));
            if steps == 4 {
                submitter.submit("tok");
                handler.handle_challenge(&hex!("01ccdd")).unwrap();
                prop_assert_eq!(handler.state(), NegotiationState::AwaitingOutcome);
            }
            // Mid-exchange states accept challenges until the outcome ends them.
            if conclude || (1..=3).contains(&steps) {
                let _ = handler.handle_outcome(SaslOutcome::Temp);
            }
            let before = handler.state();

            let err = handler.handle_challenge(&challenge).unwrap_err();

            prop_assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
            prop_assert_eq!(handler.state(), before);
            prop_assert!(handler.is_concluded());
        }

        #[test]
        fn srk_response_wraps_any_key(srk in prop::collection::vec(any::<u8>(), 0..128)) {
            let id = DeviceIdentity { storage_root_key: srk.clone(), ..identity() };
            let (mut handler, _submitter) =
                TpmSaslHandler::new(id, NegotiationConfig::default(), |_: &Nonce| {});
            handler.handle_mechanisms(&["TPM"]).unwrap();

            let response = handler.handle_challenge(&[0x00]).unwrap();

            prop_assert_eq!(response[0], 0x00);
            prop_assert_eq!(&response[1..], &srk[..]);
        }
    }
}
