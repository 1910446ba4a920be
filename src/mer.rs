// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! 2-bit nucleotide codes
//!
//! A mer of `k` bases is packed into the low `2k` bits of a `u64`, first
//! base in the most significant position, with `A = 0`, `C = 1`, `G = 2`,
//! `T = 3`. The complement of a code is `code ^ 3`.

use crate::matrix::low_mask;

/// Longest mer that fits in a `u64` key
pub const MAX_MER_LEN: usize = 32;

/// Returns the 2-bit code of a base, ignoring case.
#[must_use]
pub fn base_code(base: u8) -> Option<u64> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

/// Packs a string of bases into a key.
///
/// Returns `None` for empty strings, strings longer than [`MAX_MER_LEN`],
/// and characters other than `ACGT`.
#[must_use]
pub fn encode(bases: &[u8]) -> Option<u64> {
    if bases.is_empty() || bases.len() > MAX_MER_LEN {
        return None;
    }

    bases
        .iter()
        .try_fold(0u64, |acc, &base| Some((acc << 2) | base_code(base)?))
}

/// Unpacks a key of `mer_len` bases.
#[must_use]
pub fn decode(key: u64, mer_len: usize) -> String {
    (0..mer_len)
        .rev()
        .map(|i| match key.checked_shr(2 * i as u32).unwrap_or(0) & 3 {
            0 => 'A',
            1 => 'C',
            2 => 'G',
            _ => 'T',
        })
        .collect()
}

/// Reverse complement of a key of `mer_len` bases.
#[must_use]
#[expect(clippy::cast_possible_truncation, reason = "mers are at most 32 bases")]
pub fn reverse_complement(key: u64, mer_len: usize) -> u64 {
    let bits = 2 * mer_len as u32;
    let mask = low_mask(bits);

    // Reverse the order of the 2-bit groups, then shift them back down
    let mut x = !key & mask;
    x = ((x >> 2) & 0x3333_3333_3333_3333) | ((x & 0x3333_3333_3333_3333) << 2);
    x = ((x >> 4) & 0x0F0F_0F0F_0F0F_0F0F) | ((x & 0x0F0F_0F0F_0F0F_0F0F) << 4);
    x = x.swap_bytes();

    x.checked_shr(u64::BITS - bits).unwrap_or(0) & mask
}

/// Canonical representative of a mer: the smaller of the key and its
/// reverse complement.
#[must_use]
pub fn canonical(key: u64, mer_len: usize) -> u64 {
    key.min(reverse_complement(key, mer_len))
}
