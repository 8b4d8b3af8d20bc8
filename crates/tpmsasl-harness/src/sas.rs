//! Stand-in SAS token signer.
//!
//! Real devices derive the token key inside the TPM from material bound to
//! the service nonce. The harness only needs both sides to agree on a
//! deterministic token for a given nonce, so it signs with HMAC-SHA256 under
//! a shared key:
//!
//! ```text
//! sig   = hex(HMAC-SHA256(key, resource_uri || "\n" || expiry || nonce))
//! token = "SharedAccessSignature sr=<resource_uri>&sig=<sig>&se=<expiry>&skn=registration"
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::HarnessError;

type HmacSha256 = Hmac<Sha256>;

/// Signs service nonces into SAS tokens.
#[derive(Clone)]
pub struct SasSigner {
    mac: HmacSha256,
    resource_uri: String,
    expiry: u64,
}

impl SasSigner {
    /// Create a signer for `resource_uri` with tokens expiring at `expiry`
    /// (seconds since the epoch).
    pub fn new(
        key: &[u8],
        resource_uri: impl Into<String>,
        expiry: u64,
    ) -> Result<Self, HarnessError> {
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| HarnessError::SigningKey(e.to_string()))?;
        Ok(Self { mac, resource_uri: resource_uri.into(), expiry })
    }

    /// Token for `nonce`.
    pub fn sign(&self, nonce: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(self.resource_uri.as_bytes());
        mac.update(b"\n");
        mac.update(self.expiry.to_string().as_bytes());
        mac.update(nonce);
        let sig = hex::encode(mac.finalize().into_bytes());

        format!(
            "SharedAccessSignature sr={}&sig={sig}&se={}&skn=registration",
            self.resource_uri, self.expiry
        )
    }
}

impl std::fmt::Debug for SasSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasSigner")
            .field("resource_uri", &self.resource_uri)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
