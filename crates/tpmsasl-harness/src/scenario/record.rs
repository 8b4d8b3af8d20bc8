//! What a scenario run leaves behind for its oracle.

use bytes::Bytes;
use tpmsasl_core::{NegotiationState, SaslError};

use crate::sim_service::Registration;

/// Observations from one negotiation.
#[derive(Debug, Clone)]
pub struct NegotiationRecord {
    /// Device-side result
    pub result: Result<(), SaslError>,
    /// Handler state when the negotiation ended
    pub final_state: NegotiationState,
    /// Whether the handler considers itself finished
    pub concluded: bool,
    /// Frames the device sent, in order
    pub frames_sent: Vec<Bytes>,
    /// Nonces the handler passed to the credential pipeline
    pub nonces_delivered: Vec<Vec<u8>>,
    /// Nonce the service challenged with
    pub service_nonce: Vec<u8>,
    /// Registration the service parsed from the init frame
    pub registration: Option<Registration>,
    /// Storage root key the service received
    pub storage_root_key: Option<Vec<u8>>,
    /// Token the device presented
    pub presented_token: Option<String>,
    /// Token the service would accept
    pub expected_token: String,
}

impl NegotiationRecord {
    /// True when the device finished with success.
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}
