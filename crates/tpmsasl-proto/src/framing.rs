//! Frame building primitives.
//!
//! Two operations cover every frame the device sends: prefixing a payload
//! with a segment control byte, and joining several fields with NUL
//! separators (no trailing separator).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    NUL,
    control::ControlByte,
    errors::{FramingError, Result},
};

/// Prefix `payload` with a segment control byte.
///
/// The result is always exactly one byte longer than `payload`.
pub fn prefix_with_control_byte(control: ControlByte, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_u8(control.to_u8());
    buf.put_slice(payload);
    buf.freeze()
}

/// Join `fields` with a single NUL byte between consecutive fields.
///
/// `n` fields produce `n - 1` separators and no trailing separator. Field
/// contents are copied verbatim; a NUL inside a field is not escaped.
///
/// # Errors
///
/// Returns [`FramingError::TooFewFields`] when fewer than two fields are
/// given.
pub fn concat_with_null_delimiters(fields: &[&[u8]]) -> Result<Bytes> {
    if fields.len() < 2 {
        return Err(FramingError::TooFewFields { count: fields.len() });
    }

    let total = fields.iter().map(|f| f.len()).sum::<usize>() + fields.len() - 1;
    let mut buf = BytesMut::with_capacity(total);

    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            buf.put_u8(NUL);
        }
        buf.put_slice(field);
    }

    Ok(buf.freeze())
}
