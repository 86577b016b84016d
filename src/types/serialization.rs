/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Primitive encoders shared by the hand-written [`BorshSerialize`] and [`BorshDeserialize`]
//! implementations of the chain data types.
//!
//! Every type that is persisted or sent over the wire uses the same fixed layout:
//! - Integers are big-endian. 64-bit fields (heights, timestamps, powers) must stay within
//!   [`MAX_SAFE_INTEGER`], and are rejected on both encode and decode otherwise.
//! - Lists and byte strings are prefixed by a 4-byte big-endian length.

use std::io::{self, Read, Write};

use borsh::{BorshDeserialize, BorshSerialize};

/// Largest value a 64-bit field may hold (`2^48 - 1`).
pub const MAX_SAFE_INTEGER: u64 = (1 << 48) - 1;

// Upper bound on the capacity reserved up front when decoding a list, so that a forged length prefix
// cannot make the decoder allocate a huge buffer before any item has been read.
const MAX_PREALLOCATED_ITEMS: usize = 1024;

pub(crate) fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    if value > MAX_SAFE_INTEGER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside the 48-bit integer range", value),
        ));
    }
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn read_u64<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    let value = u64::from_be_bytes(buf);
    if value > MAX_SAFE_INTEGER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is outside the 48-bit integer range", value),
        ));
    }
    Ok(value)
}

pub(crate) fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_be_bytes())
}

pub(crate) fn read_u32<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

pub(crate) fn write_u8<W: Write>(writer: &mut W, value: u8) -> io::Result<()> {
    writer.write_all(&[value])
}

pub(crate) fn read_u8<R: Read>(reader: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn length_prefix(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("length {} does not fit in a 4-byte prefix", len),
        )
    })
}

/// Write `bytes` prefixed by its length.
pub(crate) fn write_sized_bytes<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u32(writer, length_prefix(bytes.len())?)?;
    writer.write_all(bytes)
}

/// Read a length-prefixed byte string.
pub(crate) fn read_sized_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_u32(reader)? as u64;
    let mut bytes = Vec::new();
    reader.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, bytes.len()),
        ));
    }
    Ok(bytes)
}

/// Write `items` prefixed by their count.
pub(crate) fn write_list<W: Write, T: BorshSerialize>(writer: &mut W, items: &[T]) -> io::Result<()> {
    write_u32(writer, length_prefix(items.len())?)?;
    for item in items {
        item.serialize(writer)?;
    }
    Ok(())
}

/// Read a count-prefixed list.
pub(crate) fn read_list<R: Read, T: BorshDeserialize>(reader: &mut R) -> io::Result<Vec<T>> {
    let count = read_u32(reader)? as usize;
    let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATED_ITEMS));
    for _ in 0..count {
        items.push(T::deserialize_reader(reader)?);
    }
    Ok(items)
}
