//! Segment control markers.
//!
//! The first byte of every device frame tells the service where the payload
//! sits in a (potentially) segmented transfer. The device currently only
//! emits [`ControlByte::Initial`]; none of its payloads need splitting. The
//! other two values are kept so callers can frame continuation segments
//! without inventing constants.

use crate::errors::FramingError;

/// Segment control marker prefixed to every device frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlByte {
    /// First (or only) segment
    Initial = 0x00,
    /// Segment in the middle of a multi-segment payload
    Intermediate = 0x80,
    /// Last segment of a multi-segment payload
    Final = 0xC0,
}

impl ControlByte {
    /// Raw wire value.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

impl From<ControlByte> for u8 {
    fn from(byte: ControlByte) -> Self {
        byte.to_u8()
    }
}

impl TryFrom<u8> for ControlByte {
    type Error = FramingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::Initial),
            0x80 => Ok(Self::Intermediate),
            0xC0 => Ok(Self::Final),
            other => Err(FramingError::UnknownControlByte(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values() {
        assert_eq!(ControlByte::Initial.to_u8(), 0x00);
        assert_eq!(ControlByte::Intermediate.to_u8(), 0x80);
        assert_eq!(ControlByte::Final.to_u8(), 0xC0);
    }

    #[test]
    fn parse_known_markers() {
        for byte in [ControlByte::Initial, ControlByte::Intermediate, ControlByte::Final] {
            assert_eq!(ControlByte::try_from(u8::from(byte)), Ok(byte));
        }
    }

    #[test]
    fn reject_unknown_marker() {
        assert_eq!(ControlByte::try_from(0x01), Err(FramingError::UnknownControlByte(0x01)));
        assert_eq!(ControlByte::try_from(0xFF), Err(FramingError::UnknownControlByte(0xFF)));
    }
}
