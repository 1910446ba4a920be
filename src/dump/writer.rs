// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{encode_uint, Header, Stats};
use crate::{coding::Encode, matrix::low_mask, BitMatrix, HashArray};
use std::{
    fs::File,
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Default number of records buffered before spilling to the file
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

/// Writes records into a sorted dump file
///
/// The header is written up front with zeroed statistics and rewritten by
/// [`Writer::finish`]. Once records were spilled, a file that was not
/// finished holds more records than its header counts, and readers reject
/// it with [`FormatError::InvalidHeader`](crate::FormatError::InvalidHeader).
pub struct Writer {
    /// Dump file path
    path: PathBuf,

    header: Header,

    matrix: BitMatrix,

    size_mask: u64,

    /// Buffer of encoded records
    block_buffer: Vec<u8>,
    buffered: usize,
    batch_size: usize,

    #[expect(clippy::struct_field_names)]
    file_writer: BufWriter<File>,

    /// (position, key) of the previous record
    previous: Option<(u64, u64)>,

    saturated: u64,
}

impl Writer {
    /// Creates the dump file and writes the header and the matrices.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidConfig`] if the header is invalid or
    /// the matrices do not match its key width, and I/O errors.
    pub fn new<P: AsRef<Path>>(
        path: P,
        header: Header,
        matrix: BitMatrix,
        inverse: BitMatrix,
    ) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if header.validate().is_err() {
            return Err(crate::Error::InvalidConfig("invalid dump header"));
        }

        let key_bits = header.key_bits();

        let square = |m: &BitMatrix| m.is_square() && m.rows() == key_bits;

        if !square(&matrix) || !square(&inverse) {
            return Err(crate::Error::InvalidConfig(
                "matrices must be square and match the key width",
            ));
        }

        let header = Header {
            stats: Stats::default(),
            ..header
        };

        let mut file_writer = BufWriter::with_capacity(u16::MAX.into(), File::create(&path)?);
        header.encode_into(&mut file_writer)?;
        matrix.encode_into(&mut file_writer)?;
        inverse.encode_into(&mut file_writer)?;

        log::debug!(
            "Creating dump file {} ({}-bit keys, {}-byte values)",
            path.display(),
            header.key_len,
            header.val_len,
        );

        Ok(Self {
            path,
            size_mask: header.size - 1,
            header,
            matrix,
            block_buffer: Vec::new(),
            buffered: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            file_writer,
            previous: None,
            saturated: 0,
        })
    }

    /// Creates a dump file for the contents of `array`, taking the key
    /// width, size, reprobe limit and matrices from it.
    ///
    /// # Errors
    ///
    /// Same as [`Writer::new`].
    pub fn for_array<P: AsRef<Path>>(
        path: P,
        array: &HashArray,
        val_len: u32,
    ) -> crate::Result<Self> {
        let header = Header::new(
            array.key_width(),
            val_len,
            array.size() as u64,
            array.reprobe_limit() as u64,
        );

        Self::new(
            path,
            header,
            array.matrix().clone(),
            array.inverse_matrix().clone(),
        )
    }

    /// Sets the number of records buffered before spilling.
    ///
    /// Defaults to 65 536.
    #[must_use]
    pub fn batch_size(mut self, records: usize) -> Self {
        self.batch_size = records.max(1);
        self
    }

    /// Statistics of the records written so far.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.header.stats
    }

    /// Dump file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends a record.
    ///
    /// Values that do not fit in the value bytes are saturated.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsortedInput`] if the record does not sort
    /// strictly after the previous one, and I/O errors.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not fit in the key width.
    pub fn write(&mut self, key: u64, value: u64) -> crate::Result<()> {
        let key_bits = self.header.key_bits();

        assert!(
            key & !low_mask(key_bits) == 0,
            "key {key:#x} does not fit in {key_bits} bits",
        );

        let current = (self.matrix.multiply(key) & self.size_mask, key);

        if let Some(previous) = self.previous {
            if current <= previous {
                return Err(crate::Error::UnsortedInput {
                    previous: previous.1,
                    key,
                });
            }
        }
        self.previous = Some(current);

        let val_max = self.header.val_max();
        let value = if value > val_max {
            self.saturated += 1;
            val_max
        } else {
            value
        };

        encode_uint(&mut self.block_buffer, key, self.header.key_bytes());
        encode_uint(&mut self.block_buffer, value, self.header.val_bytes());
        self.header.stats.record(value);

        self.buffered += 1;

        if self.buffered >= self.batch_size {
            self.spill_block()?;
        }

        Ok(())
    }

    /// Writes all entries of a quiescent hash array in sorted order.
    ///
    /// The array must not be modified concurrently.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsortedInput`] if records written earlier
    /// sort after the array's entries, and I/O errors.
    pub fn write_array(&mut self, array: &HashArray) -> crate::Result<()> {
        let mut entries = array
            .iterator_all()
            .map(|(key, value)| (self.matrix.multiply(key) & self.size_mask, key, value))
            .collect::<Vec<_>>();

        entries.sort_unstable();

        log::trace!("Writing {} entries of hash array", entries.len());

        for (_, key, value) in entries {
            self.write(key, value)?;
        }

        Ok(())
    }

    fn spill_block(&mut self) -> crate::Result<()> {
        if self.buffered == 0 {
            return Ok(());
        }

        log::trace!(
            "Spilling {} records ({} bytes)",
            self.buffered,
            self.block_buffer.len(),
        );

        self.file_writer.write_all(&self.block_buffer)?;
        self.block_buffer.clear();
        self.buffered = 0;

        Ok(())
    }

    /// Writes the remaining records, rewrites the header with the final
    /// statistics and syncs the file.
    ///
    /// # Errors
    ///
    /// Returns I/O errors.
    pub fn finish(mut self) -> crate::Result<Stats> {
        self.spill_block()?;

        self.file_writer.seek(SeekFrom::Start(0))?;
        self.header.encode_into(&mut self.file_writer)?;
        self.file_writer.flush()?;
        self.file_writer.get_ref().sync_all()?;

        if self.saturated > 0 {
            log::warn!(
                "Saturated {} values to {} bytes in {}",
                self.saturated,
                self.header.val_len,
                self.path.display(),
            );
        }

        log::debug!(
            "Finished dump file {}: {:?}",
            self.path.display(),
            self.header.stats,
        );

        Ok(self.header.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dump::Query, Config};
    use test_log::test;

    fn identity_writer(path: &Path, key_len: u32, val_len: u32, size: u64) -> crate::Result<Writer> {
        Writer::new(
            path,
            Header::new(key_len, val_len, size, 0),
            BitMatrix::identity(key_len),
            BitMatrix::identity(key_len),
        )
    }

    #[test]
    fn writer_stats() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");

        let mut writer = identity_writer(&path, 16, 2, 256)?;
        writer.write(0x0101, 1)?;
        writer.write(0x0201, 5)?;
        writer.write(0x0002, 1)?;
        writer.write(0x0003, 9)?;

        let stats = writer.finish()?;
        assert_eq!(
            Stats {
                unique: 2,
                distinct: 4,
                total: 16,
                max_count: 9
            },
            stats
        );

        let bytes = std::fs::read(&path)?;
        let matrix_len = BitMatrix::identity(16).serialized_len();
        assert_eq!(
            Header::serialized_len() + 2 * matrix_len + 4 * (2 + 2),
            bytes.len()
        );

        Ok(())
    }

    #[test]
    fn writer_unsorted() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut writer = identity_writer(&dir.path().join("dump"), 16, 1, 256)?;

        writer.write(0x0005, 1)?;

        // Same position, smaller key
        writer.write(0x0105, 1)?;
        assert!(matches!(
            writer.write(0x0005, 1),
            Err(crate::Error::UnsortedInput {
                previous: 0x0105,
                key: 0x0005
            })
        ));

        // Smaller position
        assert!(matches!(
            writer.write(0x0004, 1),
            Err(crate::Error::UnsortedInput { .. })
        ));

        // Duplicate
        assert!(matches!(
            writer.write(0x0105, 1),
            Err(crate::Error::UnsortedInput { .. })
        ));

        Ok(())
    }

    #[test]
    fn writer_saturates_values() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");

        let mut writer = identity_writer(&path, 8, 1, 16)?;
        writer.write(1, 1_000)?;
        writer.write(2, 255)?;
        let stats = writer.finish()?;

        assert_eq!(255, stats.max_count);

        let query = Query::open(&path)?;
        assert_eq!(255, query.get(1));
        assert_eq!(255, query.get(2));

        Ok(())
    }

    #[test]
    fn writer_small_batches() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");

        let mut writer = identity_writer(&path, 12, 1, 64)?.batch_size(3);
        for key in 0..10 {
            writer.write(key, key + 1)?;
        }
        writer.finish()?;

        let query = Query::open(&path)?;
        assert_eq!(10, query.len());
        for key in 0..10 {
            assert_eq!(key + 1, query.get(key));
        }

        Ok(())
    }

    #[test]
    fn writer_rejects_mismatched_matrix() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;

        assert!(matches!(
            Writer::new(
                dir.path().join("dump"),
                Header::new(16, 1, 256, 0),
                BitMatrix::identity(15),
                BitMatrix::identity(15),
            ),
            Err(crate::Error::InvalidConfig(_))
        ));

        Ok(())
    }

    #[test]
    fn writer_unfinished_is_rejected() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");

        {
            let mut writer = identity_writer(&path, 16, 1, 256)?.batch_size(1);
            writer.write(0x0101, 1)?;
            writer.write(0x0201, 2)?;
        }

        assert!(matches!(
            Query::open(&path),
            Err(crate::Error::Format(crate::FormatError::InvalidHeader("distinct")))
        ));

        Ok(())
    }

    #[test]
    fn writer_for_array() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");

        let array = Config::new(512, 16).val_width(4).seed(1).build()?;
        for key in (0..4_000).step_by(13) {
            assert!(array.add(key, key % 15 + 1));
        }

        let mut writer = Writer::for_array(&path, &array, 1)?;
        writer.write_array(&array)?;
        let stats = writer.finish()?;

        assert_eq!(array.iterator_all().count() as u64, stats.distinct);

        let query = Query::open(&path)?;
        assert_eq!(512, query.header().size);
        assert_eq!(126, query.header().max_reprobe);
        assert_eq!(array.matrix(), query.matrix());

        for key in (0..4_000).step_by(13) {
            assert_eq!(key % 15 + 1, query.get(key));
        }

        Ok(())
    }
}
