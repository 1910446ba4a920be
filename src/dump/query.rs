// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{decode_record, Header, Region};
use crate::{
    binary_search::partition_point, coding::Decode, matrix::low_mask, mer, BitMatrix, FormatError,
};
use std::path::Path;

/// Point queries over a sorted dump file
///
/// Records are kept in a read-only [`Region`] and found by binary search on
/// `(position, key)`, where `position` is the key's natural slot in the hash
/// array that produced the file. Lookups take `&self`, so a query can be
/// shared between threads.
pub struct Query {
    region: Region,
    header: Header,
    matrix: BitMatrix,
    inverse: BitMatrix,

    /// Offset of the first record
    records_start: usize,
    len: usize,

    size_mask: u64,

    first_pos: u64,
    last_pos: u64,

    /// Mer length used to fold keys onto their canonical form
    canonical: Option<usize>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("region", &self.region)
            .field("header", &self.header)
            .field("canonical", &self.canonical.is_some())
            .finish_non_exhaustive()
    }
}

impl Query {
    /// Memory-maps a dump file.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the file is malformed, and I/O errors.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        log::debug!("Mapping dump file {}", path.as_ref().display());
        Self::from_region(Region::map(path.as_ref())?)
    }

    /// Reads a dump file into memory.
    ///
    /// # Errors
    ///
    /// Same as [`Query::open`].
    pub fn open_buffered<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        log::debug!("Loading dump file {}", path.as_ref().display());
        Self::from_region(Region::load(path.as_ref())?)
    }

    /// Queries a dump file held in memory.
    ///
    /// # Errors
    ///
    /// Returns a [`FormatError`] if the bytes are malformed.
    pub fn from_bytes(bytes: Vec<u8>) -> crate::Result<Self> {
        Self::from_region(Region::Owned(bytes))
    }

    fn from_region(region: Region) -> crate::Result<Self> {
        let (header, matrix, inverse, records_start) = {
            let mut reader = &region[..];

            let header = Header::decode_from(&mut reader)?;
            let matrix = BitMatrix::decode_square(&mut reader, header.key_bits())?;
            let inverse = BitMatrix::decode_square(&mut reader, header.key_bits())?;

            (header, matrix, inverse, region.len() - reader.len())
        };

        if !matrix
            .multiply_matrix(&inverse)
            .is_some_and(|product| product.is_identity())
        {
            return Err(FormatError::InvalidMatrix.into());
        }

        let record_len = header.record_len();
        let area = region.len() - records_start;

        if area % record_len != 0 {
            return Err(FormatError::Truncated.into());
        }

        let len = area / record_len;

        match (len as u64).cmp(&header.stats.distinct) {
            std::cmp::Ordering::Less => return Err(FormatError::Truncated.into()),
            std::cmp::Ordering::Greater => {
                return Err(FormatError::InvalidHeader("distinct").into())
            }
            std::cmp::Ordering::Equal => {}
        }

        let mut query = Self {
            region,
            header,
            matrix,
            inverse,
            records_start,
            len,
            size_mask: header.size - 1,
            first_pos: 0,
            last_pos: 0,
            canonical: None,
        };

        let bounds = query
            .record(0)
            .zip(len.checked_sub(1).and_then(|i| query.record(i)));

        if let Some(((first, _), (last, _))) = bounds {
            query.first_pos = query.position(first);
            query.last_pos = query.position(last);
        }

        log::trace!(
            "Dump file holds {len} records, positions {}..={}",
            query.first_pos,
            query.last_pos,
        );

        Ok(query)
    }

    /// Folds keys onto their canonical form before looking them up.
    ///
    /// Keys are read as mers of `key_len / 2` bases. Use this when the
    /// file was built from canonical mers.
    pub fn set_canonical(&mut self, canonical: bool) {
        let mer_len = (self.header.key_bits() / 2) as usize;
        self.canonical = canonical.then_some(mer_len);
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

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the file holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Natural slot of a key in the hash array that produced the file.
    #[must_use]
    pub fn position(&self, key: u64) -> u64 {
        self.matrix.multiply(key) & self.size_mask
    }

    /// Returns the record at `index`.
    #[must_use]
    pub fn record(&self, index: usize) -> Option<(u64, u64)> {
        if index >= self.len {
            return None;
        }

        let record_len = self.header.record_len();
        let start = self.records_start + index * record_len;

        self.region
            .get(start..start + record_len)
            .map(|record| decode_record(record, self.header.key_bytes()))
    }

    /// Returns the value of `key`, or 0 if it is absent.
    #[must_use]
    pub fn get(&self, key: u64) -> u64 {
        self.lookup(key).unwrap_or(0)
    }

    /// Returns the value of `key`, if present.
    #[must_use]
    pub fn lookup(&self, key: u64) -> Option<u64> {
        if key & !low_mask(self.header.key_bits()) != 0 {
            return None;
        }

        let key = match self.canonical {
            Some(mer_len) => mer::canonical(key, mer_len),
            None => key,
        };

        let pos = self.position(key);

        if self.is_empty() || pos < self.first_pos || pos > self.last_pos {
            return None;
        }

        let idx = partition_point(0..self.len, |i| {
            self.record(i)
                .is_some_and(|(k, _)| (self.position(k), k) < (pos, key))
        });

        match self.record(idx) {
            Some((k, value)) if k == key => Some(value),
            _ => None,
        }
    }

    /// Iterates over all records in file order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (u64, u64)> + '_ {
        (0..self.len).filter_map(|i| self.record(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::Writer;
    use test_log::test;

    fn build(path: &Path, records: &[(u64, u64)]) -> crate::Result<()> {
        let mut writer = Writer::new(
            path,
            Header::new(16, 1, 256, 0),
            BitMatrix::identity(16),
            BitMatrix::identity(16),
        )?;
        for &(key, value) in records {
            writer.write(key, value)?;
        }
        writer.finish()?;
        Ok(())
    }

    #[test]
    fn query_get() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");
        build(&path, &[(0x0110, 3), (0x0210, 0), (0x0011, 7), (0x0420, 9)])?;

        for query in [Query::open(&path)?, Query::open_buffered(&path)?] {
            assert_eq!(4, query.len());
            assert_eq!(3, query.get(0x0110));
            assert_eq!(Some(0), query.lookup(0x0210));
            assert_eq!(7, query.get(0x0011));
            assert_eq!(9, query.get(0x0420));

            // Absent, between and outside the stored positions
            assert_eq!(None, query.lookup(0x0010));
            assert_eq!(None, query.lookup(0x0015));
            assert_eq!(None, query.lookup(0x0001));
            assert_eq!(None, query.lookup(0x00FF));

            // Outside the key width
            assert_eq!(0, query.get(0x1_0110));

            assert_eq!(Some((0x0210, 0)), query.record(1));
            assert_eq!(None, query.record(4));
            assert_eq!(
                vec![0x0110, 0x0210, 0x0011, 0x0420],
                query.iter().map(|(k, _)| k).collect::<Vec<_>>()
            );
        }

        Ok(())
    }

    #[test]
    fn query_empty() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");
        build(&path, &[])?;

        let query = Query::open(&path)?;
        assert!(query.is_empty());
        assert_eq!(0, query.get(0));
        assert_eq!(0, query.iter().count());

        Ok(())
    }

    #[test]
    fn query_canonical() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");

        #[expect(clippy::unwrap_used)]
        let (fwd, rev) = (mer::encode(b"TTTTTTTG").unwrap(), mer::encode(b"CAAAAAAA").unwrap());
        assert_eq!(rev, mer::canonical(fwd, 8));

        build(&path, &[(rev, 5)])?;

        let mut query = Query::open(&path)?;
        assert_eq!(5, query.get(rev));
        assert_eq!(0, query.get(fwd));

        query.set_canonical(true);
        assert_eq!(5, query.get(rev));
        assert_eq!(5, query.get(fwd));

        Ok(())
    }

    #[test]
    fn query_bad_record_area() -> crate::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump");
        build(&path, &[(1, 1), (2, 2)])?;

        let mut bytes = std::fs::read(&path)?;

        bytes.pop();
        assert!(matches!(
            Query::from_bytes(bytes.clone()),
            Err(crate::Error::Format(FormatError::Truncated))
        ));

        // One whole record short of the header's count
        bytes.truncate(bytes.len() - 2);
        assert!(matches!(
            Query::from_bytes(bytes.clone()),
            Err(crate::Error::Format(FormatError::Truncated))
        ));

        // One record more than the header's count
        bytes.extend_from_slice(&[3, 0, 3, 4, 0, 4]);
        assert!(matches!(
            Query::from_bytes(bytes),
            Err(crate::Error::Format(FormatError::InvalidHeader("distinct")))
        ));

        Ok(())
    }

    #[test]
    fn query_dimension_mismatch() -> crate::Result<()> {
        use crate::coding::Encode;

        let mut bytes = Header::new(16, 1, 256, 0).encode_into_vec();
        bytes.extend(BitMatrix::identity(12).encode_into_vec());
        bytes.extend(BitMatrix::identity(12).encode_into_vec());

        assert!(matches!(
            Query::from_bytes(bytes),
            Err(crate::Error::Format(FormatError::DimensionMismatch {
                expected: 16,
                got: 12
            }))
        ));

        Ok(())
    }

    #[test]
    fn query_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Query>();
    }
}
