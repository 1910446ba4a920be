// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    coding::{Decode, Encode},
    FormatError,
};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use std::io::{Read, Write};

/// Magic bytes at the start of every dump file
pub const MAGIC: [u8; 8] = *b"MERCOUNT";

/// Largest value field, in bytes
pub const MAX_VAL_LEN: u64 = 8;

/// Record statistics of a dump file
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Number of records with a value of 1
    pub unique: u64,

    /// Number of records
    pub distinct: u64,

    /// Sum of all values
    pub total: u64,

    /// Largest value
    pub max_count: u64,
}

impl Stats {
    /// Accounts for one record.
    pub fn record(&mut self, value: u64) {
        self.distinct += 1;
        self.total = self.total.saturating_add(value);
        self.max_count = self.max_count.max(value);

        if value == 1 {
            self.unique += 1;
        }
    }
}

/// Fixed-size header of a dump file
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Header {
    /// Key width in bits
    pub key_len: u64,

    /// Value width in bytes
    pub val_len: u64,

    /// Slot count of the hash array the records came from
    pub size: u64,

    /// Largest reprobe index of the hash array
    pub max_reprobe: u64,

    /// Record statistics
    pub stats: Stats,
}

impl Header {
    /// Creates a header with zeroed statistics.
    #[must_use]
    pub fn new(key_len: u32, val_len: u32, size: u64, max_reprobe: u64) -> Self {
        Self {
            key_len: u64::from(key_len),
            val_len: u64::from(val_len),
            size,
            max_reprobe,
            stats: Stats::default(),
        }
    }

    /// Number of bytes of the encoded header.
    #[must_use]
    pub const fn serialized_len() -> usize {
        MAGIC.len()
            // Key length
            + std::mem::size_of::<u64>()
            // Value length
            + std::mem::size_of::<u64>()
            // Size
            + std::mem::size_of::<u64>()
            // Max reprobe
            + std::mem::size_of::<u64>()
            // Stats
            + 4 * std::mem::size_of::<u64>()
    }

    /// Key width in bits.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "validated to be at most 64")]
    pub fn key_bits(&self) -> u32 {
        self.key_len as u32
    }

    /// Number of bytes of a key in a record.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "validated to be at most 64")]
    pub fn key_bytes(&self) -> usize {
        self.key_len.div_ceil(8) as usize
    }

    /// Number of bytes of a value in a record.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "validated to be at most 8")]
    pub fn val_bytes(&self) -> usize {
        self.val_len as usize
    }

    /// Number of bytes of a record.
    #[must_use]
    pub fn record_len(&self) -> usize {
        self.key_bytes() + self.val_bytes()
    }

    /// Largest value a record can hold.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "validated to be at most 8")]
    pub fn val_max(&self) -> u64 {
        crate::matrix::low_mask(8 * self.val_len as u32)
    }

    pub(crate) fn validate(&self) -> crate::Result<()> {
        if self.key_len == 0 || self.key_len > u64::from(u64::BITS) {
            return Err(FormatError::InvalidHeader("key_len").into());
        }

        if self.val_len > MAX_VAL_LEN {
            return Err(FormatError::InvalidHeader("val_len").into());
        }

        if !self.size.is_power_of_two() {
            return Err(FormatError::InvalidHeader("size").into());
        }

        if self.max_reprobe >= self.size {
            return Err(FormatError::InvalidHeader("max_reprobe").into());
        }

        Ok(())
    }
}

impl Encode for Header {
    fn encode_into<W: Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_all(&MAGIC)?;

        writer.write_u64::<LE>(self.key_len)?;
        writer.write_u64::<LE>(self.val_len)?;
        writer.write_u64::<LE>(self.size)?;
        writer.write_u64::<LE>(self.max_reprobe)?;

        writer.write_u64::<LE>(self.stats.unique)?;
        writer.write_u64::<LE>(self.stats.distinct)?;
        writer.write_u64::<LE>(self.stats.total)?;
        writer.write_u64::<LE>(self.stats.max_count)?;

        Ok(())
    }
}

impl Decode for Header {
    fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self> {
        let mut magic = [0u8; MAGIC.len()];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC {
            return Err(FormatError::InvalidMagic(magic).into());
        }

        let key_len = reader.read_u64::<LE>()?;
        let val_len = reader.read_u64::<LE>()?;
        let size = reader.read_u64::<LE>()?;
        let max_reprobe = reader.read_u64::<LE>()?;

        let stats = Stats {
            unique: reader.read_u64::<LE>()?,
            distinct: reader.read_u64::<LE>()?,
            total: reader.read_u64::<LE>()?,
            max_count: reader.read_u64::<LE>()?,
        };

        let header = Self {
            key_len,
            val_len,
            size,
            max_reprobe,
            stats,
        };
        header.validate()?;

        Ok(header)
    }
}
