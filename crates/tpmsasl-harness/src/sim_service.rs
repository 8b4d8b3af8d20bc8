//! Scripted provisioning service.
//!
//! [`SimService`] plays the service side of the TPM SASL exchange and
//! implements [`SaslTransport`], so a device-side [`SaslListener`] can be
//! driven against it without a network. Every frame the device sends is
//! checked against the script; anything unexpected makes the service give up
//! with a `sys` outcome, like a real service would close the SASL layer.
//!
//! # Script
//!
//! ```text
//!  service                                   device
//!  ───────                                   ──────
//!  mechanisms [..]                ──────────►
//!                                 ◄──────────  0x00 scope 0x00 reg 0x00 ek
//!  challenge 0x00                 ──────────►
//!                                 ◄──────────  0x00 srk
//!  challenge 0x80 nonce[..half]   ──────────►
//!                                 ◄──────────  0x00
//!  challenge 0xC0 nonce[half..]   ──────────►
//!                                 ◄──────────  0x00 token
//!  outcome ok | auth              ──────────►
//! ```

use bytes::Bytes;
use tpmsasl_core::{SaslError, SaslHandler, SaslListener, SaslOutcome, SaslTransport};
use tpmsasl_proto::{ControlByte, NUL, prefix_with_control_byte};

use crate::sas::SasSigner;

/// Next thing the service delivers to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceEvent {
    /// Mechanism list is available
    Mechanisms,
    /// A challenge is pending
    Challenge,
    /// The outcome is available
    Outcome,
}

/// Registration fields parsed from the device's init frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Tenant scope
    pub id_scope: String,
    /// Device registration id
    pub registration_id: String,
    /// Endorsement key
    pub endorsement_key: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Offer,
    AwaitInit,
    AwaitSrk,
    AwaitAck,
    AwaitToken,
    Done,
}

/// Service side of a single TPM SASL negotiation.
#[derive(Debug)]
pub struct SimService {
    mechanisms: Vec<String>,
    accepted: Vec<String>,
    nonce: Vec<u8>,
    signer: SasSigner,
    step: Step,
    pending_challenge: Option<Bytes>,
    outcome: Option<SaslOutcome>,
    outcome_delivered: bool,
    frames: Vec<Bytes>,
    registration: Option<Registration>,
    storage_root_key: Option<Vec<u8>>,
    presented_token: Option<String>,
}

impl SimService {
    /// Service offering `mechanisms` that will challenge with `nonce` and
    /// accept tokens produced by `signer`.
    pub fn new(mechanisms: Vec<String>, nonce: Vec<u8>, signer: SasSigner) -> Self {
        Self {
            mechanisms,
            accepted: Vec::new(),
            nonce,
            signer,
            step: Step::Offer,
            pending_challenge: None,
            outcome: None,
            outcome_delivered: false,
            frames: Vec::new(),
            registration: None,
            storage_root_key: None,
            presented_token: None,
        }
    }

    /// Frames received from the device, in order.
    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    /// Mechanisms the device echoed back.
    pub fn accepted_mechanisms(&self) -> &[String] {
        &self.accepted
    }

    /// Registration parsed from the init frame.
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// Storage root key from the first response.
    pub fn storage_root_key(&self) -> Option<&[u8]> {
        self.storage_root_key.as_deref()
    }

    /// Token from the third response.
    pub fn presented_token(&self) -> Option<&str> {
        self.presented_token.as_deref()
    }

    /// Token the service will accept.
    pub fn expected_token(&self) -> String {
        self.signer.sign(&self.nonce)
    }

    /// Outcome decided so far.
    pub fn outcome(&self) -> Option<SaslOutcome> {
        self.outcome
    }

    /// Next event for the device, if any.
    ///
    /// Once the script stalls without a verdict the service reports `none`,
    /// as the connection layer does for an unfinished negotiation.
    pub fn next_event(&mut self) -> Option<ServiceEvent> {
        if self.step == Step::Offer {
            self.step = Step::AwaitInit;
            return Some(ServiceEvent::Mechanisms);
        }
        if self.pending_challenge.is_some() {
            return Some(ServiceEvent::Challenge);
        }
        if self.outcome_delivered {
            return None;
        }

        if self.outcome.is_none() {
            self.outcome = Some(SaslOutcome::None);
        }
        self.outcome_delivered = true;
        Some(ServiceEvent::Outcome)
    }

    /// Run the whole exchange against `listener`.
    ///
    /// # Errors
    ///
    /// Whatever error ended the negotiation on the device side.
    pub fn drive<H: SaslHandler>(
        &mut self,
        listener: &mut SaslListener<H>,
    ) -> Result<(), SaslError> {
        while let Some(event) = self.next_event() {
            tracing::trace!(?event, "service event");
            match event {
                ServiceEvent::Mechanisms => listener.on_mechanisms(self)?,
                ServiceEvent::Challenge => listener.on_challenge(self)?,
                ServiceEvent::Outcome => return listener.on_outcome(self),
            }
        }
        Ok(())
    }

    fn half(&self) -> usize {
        self.nonce.len() / 2
    }

    fn challenge(&mut self, control: ControlByte, payload: &[u8]) {
        self.pending_challenge = Some(prefix_with_control_byte(control, payload));
    }

    fn give_up(&mut self, reason: &str) {
        tracing::debug!(step = ?self.step, reason, "service rejects device frame");
        self.pending_challenge = None;
        self.outcome = Some(SaslOutcome::Sys);
        self.step = Step::Done;
    }

    fn receive(&mut self, frame: &[u8]) {
        let Some((&control, body)) = frame.split_first() else {
            return self.give_up("empty frame");
        };
        if control != ControlByte::Initial.to_u8() {
            return self.give_up("unexpected control byte");
        }

        match self.step {
            Step::Offer | Step::Done => self.give_up("frame outside the exchange"),
            Step::AwaitInit => match parse_registration(body) {
                Some(registration) => {
                    self.registration = Some(registration);
                    self.challenge(ControlByte::Initial, &[]);
                    self.step = Step::AwaitSrk;
                },
                None => self.give_up("init frame needs three fields"),
            },
            Step::AwaitSrk => {
                self.storage_root_key = Some(body.to_vec());
                let first = self.nonce[..self.half()].to_vec();
                self.challenge(ControlByte::Intermediate, &first);
                self.step = Step::AwaitAck;
            },
            Step::AwaitAck => {
                if !body.is_empty() {
                    return self.give_up("continuation ack carries payload");
                }
                let second = self.nonce[self.half()..].to_vec();
                self.challenge(ControlByte::Final, &second);
                self.step = Step::AwaitToken;
            },
            Step::AwaitToken => {
                let Ok(token) = String::from_utf8(body.to_vec()) else {
                    return self.give_up("token is not UTF-8");
                };
                let verdict = if token == self.expected_token() {
                    SaslOutcome::Ok
                } else {
                    SaslOutcome::Auth
                };
                self.presented_token = Some(token);
                self.outcome = Some(verdict);
                self.step = Step::Done;
            },
        }
    }
}

impl SaslTransport for SimService {
    fn remote_mechanisms(&self) -> Vec<String> {
        self.mechanisms.clone()
    }

    fn set_mechanisms(&mut self, mechanisms: &[String]) {
        self.accepted = mechanisms.to_vec();
    }

    fn take_challenge(&mut self) -> Bytes {
        self.pending_challenge.take().unwrap_or_default()
    }

    fn send(&mut self, frame: &[u8]) {
        self.frames.push(Bytes::copy_from_slice(frame));
        self.receive(frame);
    }

    fn outcome_code(&self) -> i8 {
        self.outcome.unwrap_or(SaslOutcome::None).code()
    }
}

/// Split `scope 0x00 reg 0x00 ek`. The endorsement key is the tail and may
/// itself contain NUL bytes.
fn parse_registration(body: &[u8]) -> Option<Registration> {
    let mut fields = body.splitn(3, |b| *b == NUL);
    let id_scope = String::from_utf8(fields.next()?.to_vec()).ok()?;
    let registration_id = String::from_utf8(fields.next()?.to_vec()).ok()?;
    let endorsement_key = fields.next()?.to_vec();
    Some(Registration { id_scope, registration_id, endorsement_key })
}
