// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Bit matrices over GF(2)
//!
//! A [`BitMatrix`] is stored as one `u64` mask per row, where bit `j` of row
//! `i` is the entry at `(i, j)`. Multiplying by a vector is then a
//! population-count parity per row.
//!
//! Square invertible matrices are used as a bijective hash: the hash array
//! derives slot positions from `M · key` and recovers keys with `M⁻¹`.

use crate::{
    coding::{Decode, Encode},
    FormatError,
};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use rand::Rng;
use std::io::{Read, Write};

/// Upper bound of random draws in [`BitMatrix::random_invertible`]
///
/// A random square matrix over GF(2) is invertible with probability ~0.29,
/// so hitting this bound means the random source is broken.
pub const MAX_INVERTIBLE_ATTEMPTS: usize = 1_024;

/// Largest supported number of rows or columns
pub const MAX_DIMENSION: u32 = 64;

/// Returns a mask of the lowest `bits` bits.
#[must_use]
pub(crate) const fn low_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1 << bits) - 1
    }
}

/// Matrix over GF(2) with up to 64 rows and 64 columns
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BitMatrix {
    rows: Vec<u64>,
    cols: u32,
}

impl BitMatrix {
    /// Builds a matrix from row masks.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::InvalidMatrix`] if a dimension is 0 or above 64,
    /// or if a row has bits set at or above `cols`.
    pub fn from_rows(rows: Vec<u64>, cols: u32) -> crate::Result<Self> {
        let row_count = rows.len();

        if row_count == 0 || row_count > MAX_DIMENSION as usize {
            return Err(FormatError::InvalidMatrix.into());
        }

        if cols == 0 || cols > MAX_DIMENSION {
            return Err(FormatError::InvalidMatrix.into());
        }

        let mask = low_mask(cols);

        if rows.iter().any(|row| row & !mask != 0) {
            return Err(FormatError::InvalidMatrix.into());
        }

        Ok(Self { rows, cols })
    }

    /// Returns the `n × n` identity matrix.
    ///
    /// # Panics
    ///
    /// Panics if `n` is 0 or larger than 64.
    #[must_use]
    pub fn identity(n: u32) -> Self {
        assert!(
            n > 0 && n <= MAX_DIMENSION,
            "matrix dimension must be in 1..=64"
        );

        Self {
            rows: (0..n).map(|i| 1 << i).collect(),
            cols: n,
        }
    }

    /// Draws a uniformly random `rows × cols` matrix.
    ///
    /// # Panics
    ///
    /// Panics if a dimension is 0 or larger than 64.
    #[must_use]
    pub fn random<R: Rng + ?Sized>(rows: u32, cols: u32, rng: &mut R) -> Self {
        assert!(
            rows > 0 && rows <= MAX_DIMENSION && cols > 0 && cols <= MAX_DIMENSION,
            "matrix dimensions must be in 1..=64"
        );

        let mask = low_mask(cols);

        Self {
            rows: (0..rows).map(|_| rng.random::<u64>() & mask).collect(),
            cols,
        }
    }

    /// Draws random `size × size` matrices until one is invertible.
    ///
    /// Returns the matrix and its inverse.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MatrixGeneration`] if no invertible matrix was
    /// found within [`MAX_INVERTIBLE_ATTEMPTS`] draws, and
    /// [`crate::Error::InvalidConfig`] for a size outside `1..=64`.
    pub fn random_invertible<R: Rng + ?Sized>(
        size: u32,
        rng: &mut R,
    ) -> crate::Result<(Self, Self)> {
        if size == 0 || size > MAX_DIMENSION {
            return Err(crate::Error::InvalidConfig(
                "matrix size must be in 1..=64",
            ));
        }

        for attempt in 1..=MAX_INVERTIBLE_ATTEMPTS {
            let matrix = Self::random(size, size, rng);

            if let Some(inverse) = matrix.inverse() {
                log::trace!("Drew invertible {size}x{size} matrix after {attempt} attempt(s)");
                return Ok((matrix, inverse));
            }
        }

        Err(crate::Error::MatrixGeneration(MAX_INVERTIBLE_ATTEMPTS))
    }

    /// Number of rows (bit width of a product).
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "there are at most 64 rows"
    )]
    pub fn rows(&self) -> u32 {
        self.rows.len() as u32
    }

    /// Number of columns (bit width of an input vector).
    #[must_use]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Returns `true` if the matrix is square.
    #[must_use]
    pub fn is_square(&self) -> bool {
        self.rows() == self.cols
    }

    /// Row bitmasks, first row first.
    #[must_use]
    pub fn row_masks(&self) -> &[u64] {
        &self.rows
    }

    /// Multiplies the matrix by the bit vector `v`.
    ///
    /// Bits of `v` at or above `cols` are ignored. Bit `i` of the result is
    /// the parity of `row_i & v`.
    #[must_use]
    pub fn multiply(&self, v: u64) -> u64 {
        let v = v & low_mask(self.cols);

        self.rows
            .iter()
            .enumerate()
            .fold(0, |acc, (i, row)| {
                acc | (u64::from((row & v).count_ones() & 1) << i)
            })
    }

    /// Computes the matrix product `self · other`.
    ///
    /// Returns `None` if the dimensions do not agree.
    #[must_use]
    pub fn multiply_matrix(&self, other: &Self) -> Option<Self> {
        if self.cols != other.rows() {
            return None;
        }

        let rows = self
            .rows
            .iter()
            .map(|row| {
                other
                    .rows
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| (row >> j) & 1 == 1)
                    .fold(0, |acc, (_, other_row)| acc ^ other_row)
            })
            .collect();

        Some(Self {
            rows,
            cols: other.cols,
        })
    }

    /// Returns `true` if this is an identity matrix.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.is_square()
            && self
                .rows
                .iter()
                .enumerate()
                .all(|(i, row)| *row == 1 << i)
    }

    /// Rank over GF(2), by Gaussian elimination.
    #[must_use]
    #[expect(
        clippy::indexing_slicing,
        reason = "row indexes are bounded by the row count"
    )]
    pub fn rank(&self) -> u32 {
        let mut rows = self.rows.clone();
        let mut rank = 0;
        let mut next = 0;

        for col in 0..self.cols {
            let bit = 1 << col;

            let Some(pivot) = (next..rows.len()).find(|&r| rows[r] & bit != 0) else {
                continue;
            };

            rows.swap(next, pivot);
            let pivot_row = rows[next];

            for row in rows.iter_mut().skip(next + 1) {
                if *row & bit != 0 {
                    *row ^= pivot_row;
                }
            }

            next += 1;
            rank += 1;
        }

        rank
    }

    /// Inverse by Gauss-Jordan elimination.
    ///
    /// Returns `None` if the matrix is not square or singular.
    #[must_use]
    #[expect(
        clippy::indexing_slicing,
        reason = "row indexes are bounded by the matrix size"
    )]
    pub fn inverse(&self) -> Option<Self> {
        if !self.is_square() {
            return None;
        }

        let n = self.rows.len();
        let mut rows = self.rows.clone();
        let mut inv = Self::identity(self.cols).rows;

        for col in 0..n {
            let bit = 1 << col;
            let pivot = (col..n).find(|&r| rows[r] & bit != 0)?;

            rows.swap(col, pivot);
            inv.swap(col, pivot);

            let (pivot_row, pivot_inv) = (rows[col], inv[col]);

            for r in (0..n).filter(|&r| r != col) {
                if rows[r] & bit != 0 {
                    rows[r] ^= pivot_row;
                    inv[r] ^= pivot_inv;
                }
            }
        }

        Some(Self {
            rows: inv,
            cols: self.cols,
        })
    }

    /// Number of bytes written by [`Encode::encode_into`].
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        2 * std::mem::size_of::<u64>() + self.rows.len() * std::mem::size_of::<u64>()
    }

    /// Deserializes a matrix and checks that it is `width × width`.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::DimensionMismatch`] if either dimension differs
    /// from `width`, or any error of [`Decode::decode_from`].
    pub fn decode_square<R: Read>(reader: &mut R, width: u32) -> crate::Result<Self> {
        let matrix = Self::decode_from(reader)?;

        for got in [matrix.rows(), matrix.cols()] {
            if got != width {
                return Err(FormatError::DimensionMismatch {
                    expected: u64::from(width),
                    got: u64::from(got),
                }
                .into());
            }
        }

        Ok(matrix)
    }
}

impl Encode for BitMatrix {
    fn encode_into<W: Write>(&self, writer: &mut W) -> crate::Result<()> {
        writer.write_u64::<LE>(u64::from(self.rows()))?;
        writer.write_u64::<LE>(u64::from(self.cols))?;

        for row in &self.rows {
            writer.write_u64::<LE>(*row)?;
        }

        Ok(())
    }
}

impl Decode for BitMatrix {
    fn decode_from<R: Read>(reader: &mut R) -> crate::Result<Self> {
        let rows = reader.read_u64::<LE>()?;
        let cols = reader.read_u64::<LE>()?;

        if rows == 0
            || rows > u64::from(MAX_DIMENSION)
            || cols == 0
            || cols > u64::from(MAX_DIMENSION)
        {
            return Err(FormatError::InvalidMatrix.into());
        }

        let masks = (0..rows)
            .map(|_| reader.read_u64::<LE>())
            .collect::<std::io::Result<Vec<_>>>()?;

        #[expect(clippy::cast_possible_truncation, reason = "cols is at most 64")]
        let cols = cols as u32;

        Self::from_rows(masks, cols)
    }
}
