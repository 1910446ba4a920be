// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{decode_record, Header};
use crate::{coding::Decode, BitMatrix, FormatError};
use std::{fs::File, io::Read, path::Path};

/// Default size of the read buffer
pub const DEFAULT_BUFFER_LEN: usize = 1_024 * 1_024;

/// Streams the records of a dump file in file order
///
/// Yields `(key, value)` pairs. A file that ends in the middle of a record,
/// or holds fewer records than its header announces, yields
/// [`FormatError::Truncated`] as its last item.
pub struct Reader {
    header: Header,
    matrix: BitMatrix,
    inverse: BitMatrix,

    file: File,

    buffer: Vec<u8>,

    /// Read cursor into the buffer
    lo: usize,

    /// End of the valid bytes in the buffer
    hi: usize,

    /// Records yielded so far
    read: u64,

    is_terminated: bool,
}

impl Reader {
    /// Opens a dump file.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the header or matrices are malformed,
    /// and I/O errors.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        Self::with_buffer_len(path, DEFAULT_BUFFER_LEN)
    }

    /// Opens a dump file, reading it in blocks of about `len` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Reader::open`].
    pub fn with_buffer_len<P: AsRef<Path>>(path: P, len: usize) -> crate::Result<Self> {
        let mut file = File::open(path.as_ref())?;

        let header = Header::decode_from(&mut file)?;
        let matrix = BitMatrix::decode_square(&mut file, header.key_bits())?;
        let inverse = BitMatrix::decode_square(&mut file, header.key_bits())?;

        // Whole records per block
        let record_len = header.record_len();
        let len = (len / record_len).max(1) * record_len;

        log::trace!(
            "Opened dump file {} for reading ({} records)",
            path.as_ref().display(),
            header.stats.distinct,
        );

        Ok(Self {
            header,
            matrix,
            inverse,
            file,
            buffer: vec![0; len],
            lo: 0,
            hi: 0,
            read: 0,
            is_terminated: false,
        })
    }

    /// File header.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Hash matrix.
    #[must_use]
    pub fn matrix(&self) -> &BitMatrix {
        &self.matrix
    }

    /// Inverse of the hash matrix.
    #[must_use]
    pub fn inverse_matrix(&self) -> &BitMatrix {
        &self.inverse
    }

    /// Moves the unread tail to the front and fills the rest of the buffer.
    #[expect(clippy::indexing_slicing, reason = "cursors stay within the buffer")]
    fn refill(&mut self) -> crate::Result<()> {
        self.buffer.copy_within(self.lo..self.hi, 0);
        self.hi -= self.lo;
        self.lo = 0;

        while self.hi < self.buffer.len() {
            let n = self.file.read(&mut self.buffer[self.hi..])?;
            if n == 0 {
                break;
            }
            self.hi += n;
        }

        Ok(())
    }
}

impl Iterator for Reader {
    type Item = crate::Result<(u64, u64)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_terminated {
            return None;
        }

        let record_len = self.header.record_len();

        if self.hi - self.lo < record_len {
            if let Err(e) = self.refill() {
                self.is_terminated = true;
                return Some(Err(e));
            }
        }

        let available = self.hi - self.lo;

        if available < record_len {
            self.is_terminated = true;

            if available > 0 || self.read < self.header.stats.distinct {
                return Some(Err(FormatError::Truncated.into()));
            }
            if self.read > self.header.stats.distinct {
                return Some(Err(FormatError::InvalidHeader("distinct").into()));
            }
            return None;
        }

        #[expect(clippy::indexing_slicing, reason = "a whole record is available")]
        let record = &self.buffer[self.lo..self.lo + record_len];

        self.lo += record_len;
        self.read += 1;

        Some(Ok(decode_record(record, self.header.key_bytes())))
    }
}

impl std::iter::FusedIterator for Reader {}
