//! LEB128 variable-length integers; signed values are zig-zag mapped first.

use crate::error::{BioError, BioResult};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub fn write_u64<W: Write>(out: &mut W, mut value: u64) -> io::Result<()> {
    while value >= 0x80 {
        out.write_u8((value as u8) | 0x80)?;
        value >>= 7;
    }
    out.write_u8(value as u8)
}

pub fn read_u64<R: Read>(input: &mut R) -> BioResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = input.read_u8().map_err(eof)?;
        if shift == 63 && byte > 1 {
            return Err(BioError::serialization("varint overflows 64 bits"));
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err(BioError::serialization("varint overflows 64 bits"));
        }
    }
}

pub fn write_u32<W: Write>(out: &mut W, value: u32) -> io::Result<()> {
    write_u64(out, u64::from(value))
}

pub fn read_u32<R: Read>(input: &mut R) -> BioResult<u32> {
    let value = read_u64(input)?;
    u32::try_from(value)
        .map_err(|_| BioError::serialization(format!("varint {value} overflows 32 bits")))
}

#[inline]
pub fn zigzag32(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

#[inline]
pub fn unzigzag32(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

#[inline]
pub fn zigzag64(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

#[inline]
pub fn unzigzag64(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Truncated input means the stream is out of sync with the reader.
pub(crate) fn eof(error: io::Error) -> BioError {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        BioError::serialization("unexpected end of input")
    } else {
        BioError::Io(error)
    }
}
