use super::{FormatError, FormatErrorKind};

/// Reads a little endian `u32` from the start of `data`.
pub(crate) fn read_u32(data: &[u8]) -> Option<(u32, &[u8])> {
    let bytes = data.get(..4)?;
    let value = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    Some((value, &data[4..]))
}

/// Decodes a compressed unsigned integer (ECMA-335 II.23.2) at the start of `data`.
///
/// Returns the number and the remaining slice.
pub(crate) fn decode_unsigned(data: &[u8]) -> Result<(u32, &[u8]), FormatError> {
    let invalid = || FormatError::from(FormatErrorKind::InvalidCompressedUnsigned);
    let first = *data.first().ok_or_else(invalid)?;

    match first.leading_ones() {
        0 => Ok((first as u32, &data[1..])),
        1 => {
            let bytes = data.get(..2).ok_or_else(invalid)?;
            let value = u16::from_be_bytes([bytes[0], bytes[1]]) & 0x3fff;
            Ok((value as u32, &data[2..]))
        }
        2 => {
            let bytes = data.get(..4).ok_or_else(invalid)?;
            let value = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x1fff_ffff;
            Ok((value, &data[4..]))
        }
        _ => Err(invalid()),
    }
}

/// Decodes a compressed signed integer (ECMA-335 II.23.2) at the start of `data`.
///
/// The encoded value is rotated left by one bit, so the sign ends up in the least significant
/// bit. Returns the number and the remaining slice.
pub(crate) fn decode_signed(data: &[u8]) -> Result<(i32, &[u8]), FormatError> {
    let invalid = || FormatError::from(FormatErrorKind::InvalidCompressedSigned);
    let first = *data.first().ok_or_else(invalid)?;

    let (raw, bits, rest) = match first.leading_ones() {
        0 => (first as u32, 7, &data[1..]),
        1 => {
            let bytes = data.get(..2).ok_or_else(invalid)?;
            let raw = u16::from_be_bytes([bytes[0], bytes[1]]) & 0x3fff;
            (raw as u32, 14, &data[2..])
        }
        2 => {
            let bytes = data.get(..4).ok_or_else(invalid)?;
            let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x1fff_ffff;
            (raw, 29, &data[4..])
        }
        _ => return Err(invalid()),
    };

    let magnitude = (raw >> 1) as i32;
    let value = if raw & 1 == 0 {
        magnitude
    } else {
        // Negative numbers are stored in two's complement with `bits` width.
        magnitude - (1 << (bits - 1))
    };

    Ok((value, rest))
}
