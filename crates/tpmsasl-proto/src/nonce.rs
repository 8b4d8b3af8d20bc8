//! Nonce reassembly.
//!
//! The service sends its nonce in two challenges. Each challenge starts with
//! a marker byte that belongs to the service's segmentation scheme, not to
//! the nonce, so it is dropped before the halves are joined:
//!
//! ```text
//! challenge 2:  [m1] a a a a      ──►  NonceFragment = a a a a
//! challenge 3:  [m2] b b b b      ──►  Nonce         = a a a a b b b b
//! ```

use std::fmt;

use bytes::Bytes;

use crate::errors::{FramingError, Result};

/// First half of a nonce, marker byte already removed.
///
/// Only exists between the second and third challenge. The negotiation drops
/// it as soon as the full nonce has been built.
#[derive(Clone, PartialEq, Eq)]
pub struct NonceFragment(Bytes);

impl NonceFragment {
    /// Strip the marker byte from the challenge that carries the first half.
    ///
    /// # Errors
    ///
    /// [`FramingError::EmptyFragment`] if the challenge has no marker byte.
    pub fn from_challenge(challenge: &[u8]) -> Result<Self> {
        strip_marker(challenge, 1).map(|rest| Self(Bytes::copy_from_slice(rest)))
    }

    /// Fragment bytes without the marker.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Join with the challenge carrying the second half.
    ///
    /// # Errors
    ///
    /// [`FramingError::EmptyFragment`] if the challenge has no marker byte.
    pub fn complete(&self, challenge: &[u8]) -> Result<Nonce> {
        let rest = strip_marker(challenge, 2)?;

        let mut nonce = Vec::with_capacity(self.0.len() + rest.len());
        nonce.extend_from_slice(&self.0);
        nonce.extend_from_slice(rest);
        Ok(Nonce(nonce))
    }
}

impl fmt::Debug for NonceFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceFragment").field("len", &self.0.len()).finish()
    }
}

/// Complete service nonce, ready to be handed to the TPM.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce(Vec<u8>);

impl Nonce {
    /// Raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Nonce length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when both fragments carried nothing but their marker.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Nonce {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nonce").field("len", &self.0.len()).finish()
    }
}

/// Rebuild a nonce from the two challenges that carry it.
///
/// # Errors
///
/// [`FramingError::EmptyFragment`] if either challenge is zero-length.
pub fn assemble_nonce(first: &[u8], second: &[u8]) -> Result<Nonce> {
    NonceFragment::from_challenge(first)?.complete(second)
}

fn strip_marker(challenge: &[u8], index: usize) -> Result<&[u8]> {
    match challenge.split_first() {
        Some((_marker, rest)) => Ok(rest),
        None => Err(FramingError::EmptyFragment { index }),
    }
}
