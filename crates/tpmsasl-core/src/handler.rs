//! Reactive contract between the negotiation transport and a SASL mechanism.

use bytes::Bytes;
use tpmsasl_proto::SaslOutcome;

use crate::error::SaslError;

/// Device-side SASL mechanism driven by the negotiation transport.
///
/// The transport calls these sequentially from one thread per negotiation
/// and sends every returned buffer to the service unchanged.
pub trait SaslHandler {
    /// Service announced its mechanisms. Returns the SASL-init payload.
    fn handle_mechanisms(&mut self, mechanisms: &[&str]) -> Result<Bytes, SaslError>;

    /// Service sent a challenge. Returns the response payload.
    fn handle_challenge(&mut self, challenge: &[u8]) -> Result<Bytes, SaslError>;

    /// Service reported the outcome. Always ends the negotiation.
    fn handle_outcome(&mut self, outcome: SaslOutcome) -> Result<(), SaslError>;
}
