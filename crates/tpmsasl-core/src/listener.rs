//! Bridge from connection-layer SASL events to a [`SaslHandler`].
//!
//! The connection's security layer exposes a SASL object ([`SaslTransport`])
//! and raises events as frames arrive. [`SaslListener`] pulls the relevant
//! data out of the transport, forwards it to the handler and pushes the
//! handler's reply back:
//!
//! ```text
//!  security layer          SaslListener             SaslHandler
//!  ──────────────          ────────────             ───────────
//!  mechanisms  ──────────► on_mechanisms ─────────► handle_mechanisms
//!                          send(init)   ◄───────────
//!  challenge   ──────────► on_challenge  ─────────► handle_challenge
//!                          send(response) ◄─────────
//!  outcome     ──────────► on_outcome    ─────────► handle_outcome
//! ```
//!
//! `sasl-init` and `sasl-response` only ever reach a server, so the device
//! side ignores them.

use bytes::Bytes;
use tpmsasl_proto::SaslOutcome;

use crate::{error::SaslError, handler::SaslHandler};

/// SASL object of the connection's security layer.
pub trait SaslTransport {
    /// Mechanisms the remote peer offered.
    fn remote_mechanisms(&self) -> Vec<String>;

    /// Record the mechanisms this side is willing to use.
    fn set_mechanisms(&mut self, mechanisms: &[String]);

    /// Drain the pending challenge bytes.
    fn take_challenge(&mut self) -> Bytes;

    /// Queue a frame for the remote peer.
    fn send(&mut self, frame: &[u8]);

    /// Raw outcome code reported by the remote peer.
    fn outcome_code(&self) -> i8;
}

/// Dispatches SASL events from a [`SaslTransport`] into a [`SaslHandler`].
#[derive(Debug)]
pub struct SaslListener<H> {
    handler: H,
}

impl<H: SaslHandler> SaslListener<H> {
    /// Wrap a handler.
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    /// Borrow the wrapped handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Unwrap the handler.
    pub fn into_inner(self) -> H {
        self.handler
    }

    /// Mechanism list arrived.
    ///
    /// The offered list is echoed back to the transport before the init
    /// frame is sent.
    pub fn on_mechanisms<T: SaslTransport>(&mut self, sasl: &mut T) -> Result<(), SaslError> {
        let offered = sasl.remote_mechanisms();
        sasl.set_mechanisms(&offered);

        let names: Vec<&str> = offered.iter().map(String::as_str).collect();
        let init = self.handler.handle_mechanisms(&names)?;
        sasl.send(&init);
        Ok(())
    }

    /// Challenge arrived.
    pub fn on_challenge<T: SaslTransport>(&mut self, sasl: &mut T) -> Result<(), SaslError> {
        let challenge = sasl.take_challenge();
        let response = self.handler.handle_challenge(&challenge)?;
        sasl.send(&response);
        Ok(())
    }

    /// Outcome arrived.
    pub fn on_outcome<T: SaslTransport>(&mut self, sasl: &mut T) -> Result<(), SaslError> {
        let outcome = SaslOutcome::from_code(sasl.outcome_code());
        self.handler.handle_outcome(outcome)
    }

    /// `sasl-init` arrived. Only servers act on it.
    pub fn on_init<T: SaslTransport>(&mut self, _sasl: &mut T) {
        tracing::trace!("ignoring sasl-init on device side");
    }

    /// `sasl-response` arrived. Only servers act on it.
    pub fn on_response<T: SaslTransport>(&mut self, _sasl: &mut T) {
        tracing::trace!("ignoring sasl-response on device side");
    }
}
