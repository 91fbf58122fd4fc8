//! Integer encodings shared by every length, count, index and integer value in a message.
//!
//! The default is a signed LEB128 variant: 7 payload bits per byte with a continuation bit, and
//! termination once the remaining bits are pure sign extension. It is capped at 8 encoded bytes;
//! if a value still has bits left after that, the 9th byte holds the top 8 bits raw, without a
//! continuation bit. The alternative is a fixed 8-byte little-endian two's-complement integer.

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Bytes that can carry a continuation bit before the final raw byte.
pub const MAX_VARINT_BYTES: usize = 8;

/// Which integer encoding a whole message uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntMode {
    Leb128,
    Fixed,
}

impl IntMode {
    pub fn write(self, buf: &mut Vec<u8>, val: i64) {
        match self {
            IntMode::Leb128 => write_leb128(buf, val),
            IntMode::Fixed => buf.extend_from_slice(&val.to_le_bytes()),
        }
    }

    pub fn read(self, buf: &mut &[u8]) -> Result<i64> {
        match self {
            IntMode::Leb128 => read_leb128(buf),
            IntMode::Fixed => buf
                .read_i64::<LittleEndian>()
                .map_err(|_| Error::UnexpectedEof { step: "fixed integer" }),
        }
    }

    /// Write a length, count, or index.
    pub fn write_len(self, buf: &mut Vec<u8>, len: usize) {
        self.write(buf, len as i64)
    }

    /// Read a length, count, or index. Negative values are a format error.
    pub fn read_len(self, buf: &mut &[u8]) -> Result<usize> {
        let len = self.read(buf)?;
        usize::try_from(len).map_err(|_| Error::FormatError(format!("negative length {}", len)))
    }
}

pub fn write_leb128(buf: &mut Vec<u8>, mut val: i64) {
    for _ in 0..MAX_VARINT_BYTES {
        let byte = (val & 0x7F) as u8;
        val >>= 7;
        let sign_bit = byte & 0x40 != 0;
        if (val == 0 && !sign_bit) || (val == -1 && sign_bit) {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
    // Hit the cap: the remaining top 8 bits go out as-is
    buf.push(val as u8);
}

pub fn read_leb128(buf: &mut &[u8]) -> Result<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    for _ in 0..MAX_VARINT_BYTES {
        let byte = buf
            .read_u8()
            .map_err(|_| Error::UnexpectedEof { step: "varint" })?;
        result |= ((byte & 0x7F) as i64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            if byte & 0x40 != 0 {
                result |= -1i64 << shift;
            }
            return Ok(result);
        }
    }
    let last = buf
        .read_u8()
        .map_err(|_| Error::UnexpectedEof { step: "varint" })?;
    Ok(result | ((last as i64) << shift))
}

/// Number of bytes [`write_leb128`] uses for a value.
pub fn leb128_len(val: i64) -> usize {
    let mut buf = Vec::with_capacity(MAX_VARINT_BYTES + 1);
    write_leb128(&mut buf, val);
    buf.len()
}
