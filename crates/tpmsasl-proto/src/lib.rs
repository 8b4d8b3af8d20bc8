//! Wire format for the TPM SASL provisioning mechanism.
//!
//! The device proves possession of its TPM endorsement key through a short
//! SASL exchange. Every frame the device sends is a one-byte segment control
//! marker followed by a payload; the init frame packs three fields separated
//! by NUL bytes, and the server-chosen nonce arrives split over two
//! challenges that each carry their own marker byte.
//!
//! ```text
//! init       0x00 | id_scope | 0x00 | registration_id | 0x00 | endorsement_key
//! response1  0x00 | storage_root_key
//! response2  0x00
//! response3  0x00 | utf8(sas_token)
//! ```
//!
//! Everything here is a pure function over byte slices. State lives in
//! `tpmsasl-core`.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod control;
pub mod errors;
pub mod framing;
pub mod nonce;
pub mod outcome;

pub use control::ControlByte;
pub use errors::{FramingError, Result};
pub use framing::{concat_with_null_delimiters, prefix_with_control_byte};
pub use nonce::{Nonce, NonceFragment, assemble_nonce};
pub use outcome::SaslOutcome;

/// Name of the SASL mechanism the provisioning service offers for TPM
/// attestation.
pub const TPM_MECHANISM: &str = "TPM";

/// Field separator inside multi-field payloads.
pub const NUL: u8 = 0x00;
