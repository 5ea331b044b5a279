#![forbid(unsafe_code)]
//! Varint and fixed-width big-endian helpers shared by the table, heaps and ledger.

pub mod be {
    //! Fixed-width big-endian fields, including the 40-bit reference width.

    /// Largest value a 40-bit field can hold.
    pub const U40_MAX: u64 = (1 << 40) - 1;

    /// Writes a big-endian u16 into the first two bytes of `dst`.
    pub fn put_u16(dst: &mut [u8], v: u16) {
        dst[..2].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u16 from the first two bytes of `src`.
    pub fn get_u16(src: &[u8]) -> u16 {
        u16::from_be_bytes([src[0], src[1]])
    }

    /// Writes a big-endian u32 into the first four bytes of `dst`.
    pub fn put_u32(dst: &mut [u8], v: u32) {
        dst[..4].copy_from_slice(&v.to_be_bytes());
    }

    /// Reads a big-endian u32 from the first four bytes of `src`.
    pub fn get_u32(src: &[u8]) -> u32 {
        u32::from_be_bytes([src[0], src[1], src[2], src[3]])
    }

    /// Writes the low 40 bits of `v` as five big-endian bytes.
    pub fn put_u40(dst: &mut [u8], v: u64) {
        debug_assert!(v <= U40_MAX, "value exceeds 40 bits");
        let bytes = v.to_be_bytes();
        dst[..5].copy_from_slice(&bytes[3..8]);
    }

    /// Reads five big-endian bytes as a 40-bit value.
    pub fn get_u40(src: &[u8]) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[3..8].copy_from_slice(&src[..5]);
        u64::from_be_bytes(bytes)
    }
}

pub mod var {
    //! Unsigned LEB128 varints.

    use std::io::{self, ErrorKind, Read};

    use crate::types::{ArborError, Result};

    /// Longest encoding of a u64.
    pub const MAX_LEN: usize = 10;

    /// Encodes a u64 as an unsigned varint.
    pub fn encode_u64(mut v: u64, out: &mut Vec<u8>) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                out.push(byte);
                break;
            } else {
                out.push(byte | 0x80);
            }
        }
    }

    /// Decodes a varint from a slice, advancing `off`.
    pub fn decode_u64(src: &[u8], off: &mut usize) -> Result<u64> {
        let mut result = 0u64;
        let mut shift = 0u32;
        for i in 0..MAX_LEN {
            let byte = *src
                .get(*off)
                .ok_or(ArborError::Corruption("varint truncated"))?;
            *off += 1;
            let payload = u64::from(byte & 0x7f);
            if i == MAX_LEN - 1 && payload > 1 {
                return Err(ArborError::Corruption("varint exceeds 64 bits"));
            }
            result |= payload << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
        Err(ArborError::Corruption("varint longer than 10 bytes"))
    }

    /// Reads one varint from a stream. Returns `None` on a clean end of stream.
    pub fn read_u64<R: Read>(src: &mut R) -> io::Result<Option<u64>> {
        let mut result = 0u64;
        let mut shift = 0u32;
        let mut byte = [0u8; 1];
        for i in 0..MAX_LEN {
            if src.read(&mut byte)? == 0 {
                if i == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "varint truncated",
                ));
            }
            let payload = u64::from(byte[0] & 0x7f);
            if i == MAX_LEN - 1 && payload > 1 {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    "varint exceeds 64 bits",
                ));
            }
            result |= payload << shift;
            if byte[0] & 0x80 == 0 {
                return Ok(Some(result));
            }
            shift += 7;
        }
        Err(io::Error::new(
            ErrorKind::InvalidData,
            "varint longer than 10 bytes",
        ))
    }
}
