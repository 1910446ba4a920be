// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{matrix::BitMatrix, HashArray};

/// Default width of the value field in bits
pub const DEFAULT_VAL_WIDTH: u32 = 7;

/// Default largest reprobe index
pub const DEFAULT_REPROBE_LIMIT: usize = 126;

/// Largest accepted reprobe index
pub const MAX_REPROBE_LIMIT: usize = u16::MAX as usize - 1;

/// Hash array configuration builder
///
/// # Examples
///
/// ```
/// # use mercount::Config;
/// #
/// let array = Config::new(1_024, 22)
///     .val_width(5)
///     .reprobe_limit(62)
///     .seed(7)
///     .build()?;
///
/// assert!(array.add(0b1011, 3));
/// assert_eq!(Some(3), array.get_val_for_key(0b1011));
/// # Ok::<(), mercount::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of slots, a power of two
    pub size: usize,

    /// Width of keys in bits
    pub key_width: u32,

    /// Width of the value field in bits
    ///
    /// Counters that outgrow the field spill into continuation slots.
    pub val_width: u32,

    /// Largest reprobe index
    ///
    /// A key visits its natural slot plus up to `reprobe_limit` reprobed
    /// slots before the array reports it as full.
    pub reprobe_limit: usize,

    /// Seed for the hash matrix draw
    #[doc(hidden)]
    pub seed: Option<u64>,

    /// Hash matrix and its inverse
    #[doc(hidden)]
    pub matrices: Option<(BitMatrix, BitMatrix)>,
}

impl Config {
    /// Initializes a new config for a table of `size` slots holding
    /// `key_width`-bit keys.
    #[must_use]
    pub fn new(size: usize, key_width: u32) -> Self {
        Self {
            size,
            key_width,
            val_width: DEFAULT_VAL_WIDTH,
            reprobe_limit: DEFAULT_REPROBE_LIMIT,
            seed: None,
            matrices: None,
        }
    }

    /// Sets the width of the value field in bits.
    ///
    /// A width of 0 makes the array a pure set.
    ///
    /// Defaults to 7.
    #[must_use]
    pub fn val_width(mut self, bits: u32) -> Self {
        self.val_width = bits;
        self
    }

    /// Sets the largest reprobe index.
    ///
    /// Must be smaller than the table size.
    ///
    /// Defaults to 126.
    #[must_use]
    pub fn reprobe_limit(mut self, limit: usize) -> Self {
        self.reprobe_limit = limit;
        self
    }

    /// Draws the hash matrix from a deterministic generator.
    ///
    /// By default, the thread-local generator is used.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Uses the given hash matrix and inverse instead of drawing one.
    ///
    /// This is used to continue counting with the matrix of a previous pass,
    /// so that dump files share the same record order.
    #[must_use]
    pub fn matrices(mut self, matrix: BitMatrix, inverse: BitMatrix) -> Self {
        self.matrices = Some((matrix, inverse));
        self
    }

    /// Allocates the hash array.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the parameters are
    /// inconsistent, and [`crate::Error::MatrixGeneration`] if no invertible
    /// matrix could be drawn.
    pub fn build(self) -> crate::Result<HashArray> {
        HashArray::from_config(self)
    }
}
