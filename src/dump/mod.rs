// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Sorted dump files
//!
//! ## Format
//!
//! \[header\] \[hash matrix\] \[inverse hash matrix\] \[records\]
//!
//! All integers are little-endian. A record is the key in
//! `ceil(key_len / 8)` bytes followed by the value in `val_len` bytes.
//! Records are ordered by the natural slot of their key in the hash array,
//! then by key, so a query can binary search them without an index.

mod header;
mod query;
mod reader;
mod region;
mod writer;

pub use header::{Header, Stats, MAGIC, MAX_VAL_LEN};
pub use query::Query;
pub use reader::Reader;
pub use region::Region;
pub use writer::Writer;

/// Reads a little-endian unsigned integer of up to 8 bytes.
fn decode_uint(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .rev()
        .fold(0, |acc, &byte| (acc << 8) | u64::from(byte))
}

/// Appends the low `len` bytes of `value`, little-endian.
fn encode_uint(buf: &mut Vec<u8>, value: u64, len: usize) {
    buf.extend(value.to_le_bytes().into_iter().take(len));
}

/// Splits a record into key and value.
fn decode_record(record: &[u8], key_bytes: usize) -> (u64, u64) {
    let (key, value) = record.split_at(key_bytes.min(record.len()));
    (decode_uint(key), decode_uint(value))
}
