//! Framing errors.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, FramingError>;

/// Errors produced while building or taking apart TPM SASL frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// A multi-field payload needs at least two fields to delimit.
    #[error("null-delimited payload needs at least 2 fields, got {count}")]
    TooFewFields {
        /// Number of fields supplied
        count: usize,
    },

    /// A challenge fragment had no room for its marker byte.
    #[error("challenge fragment {index} is empty")]
    EmptyFragment {
        /// 1-based position of the fragment in the nonce
        index: usize,
    },

    /// Byte is not one of the segment control markers.
    #[error("unknown segment control byte {0:#04x}")]
    UnknownControlByte(u8),
}
