//! SASL outcome codes.
//!
//! The connection layer reports the end of a SASL exchange as a small signed
//! code. Only [`SaslOutcome::Ok`] means the device is authenticated;
//! [`SaslOutcome::Auth`] singles out a credential the service refused, every
//! other value is some other failure.

use std::fmt;

use serde_repr::{Deserialize_repr, Serialize_repr};

/// Final outcome of a SASL exchange, as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(i8)]
pub enum SaslOutcome {
    /// Negotiation not completed
    None = -1,
    /// Authentication succeeded
    Ok = 0,
    /// Failed due to bad credentials
    Auth = 1,
    /// Failed due to a system error
    Sys = 2,
    /// Failed due to an unrecoverable error
    Perm = 3,
    /// Failed due to a transient error
    Temp = 4,
    /// SASL layer was skipped
    Skipped = 5,
}

impl SaslOutcome {
    /// Every outcome, in wire-code order.
    pub const ALL: [Self; 7] =
        [Self::None, Self::Ok, Self::Auth, Self::Sys, Self::Perm, Self::Temp, Self::Skipped];

    /// Map a raw outcome code.
    ///
    /// Codes the device does not know about are treated as a system error;
    /// the connection layer reports anything unexpected that way too.
    pub const fn from_code(code: i8) -> Self {
        match code {
            -1 => Self::None,
            0 => Self::Ok,
            1 => Self::Auth,
            3 => Self::Perm,
            4 => Self::Temp,
            5 => Self::Skipped,
            _ => Self::Sys,
        }
    }

    /// Raw outcome code.
    pub const fn code(self) -> i8 {
        self as i8
    }

    /// True only for [`SaslOutcome::Ok`].
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }

    const fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ok => "ok",
            Self::Auth => "auth",
            Self::Sys => "sys",
            Self::Perm => "perm",
            Self::Temp => "temp",
            Self::Skipped => "skipped",
        }
    }
}

impl From<i8> for SaslOutcome {
    fn from(code: i8) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for SaslOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
