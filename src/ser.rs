//
// ser.rs -- endian-explicit fixed width integer codecs
//
// This file is part of the nudb-native project.
// SPDX-License-Identifier: MIT

//! Every multi-byte integer on disk is big-endian, regardless of host (spec §9). These helpers
//! read/write fixed widths explicitly rather than relying on structure-copy, including the
//! 48-bit (6-byte) offsets used throughout the value/spill/bucket layouts.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Largest value a 6-byte big-endian field can hold.
pub const MAX_U48: u64 = (1u64 << 48) - 1;

pub fn read_u16(mut r: impl Read) -> io::Result<u16> {
    r.read_u16::<BigEndian>()
}

pub fn read_u32(mut r: impl Read) -> io::Result<u32> {
    r.read_u32::<BigEndian>()
}

pub fn read_u64(mut r: impl Read) -> io::Result<u64> {
    r.read_u64::<BigEndian>()
}

/// Reads a 6-byte big-endian unsigned integer (used for file offsets throughout).
pub fn read_u48(mut r: impl Read) -> io::Result<u64> {
    let mut buf = [0u8; 6];
    r.read_exact(&mut buf)?;
    let mut full = [0u8; 8];
    full[2..].copy_from_slice(&buf);
    Ok(u64::from_be_bytes(full))
}

pub fn write_u16(mut w: impl Write, v: u16) -> io::Result<()> {
    w.write_u16::<BigEndian>(v)
}

pub fn write_u32(mut w: impl Write, v: u32) -> io::Result<()> {
    w.write_u32::<BigEndian>(v)
}

pub fn write_u64(mut w: impl Write, v: u64) -> io::Result<()> {
    w.write_u64::<BigEndian>(v)
}

/// Writes a 6-byte big-endian unsigned integer. Returns an error if `v` doesn't fit.
pub fn write_u48(mut w: impl Write, v: u64) -> io::Result<()> {
    if v > MAX_U48 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{v} does not fit in 48 bits"),
        ));
    }
    let full = v.to_be_bytes();
    w.write_all(&full[2..])
}
