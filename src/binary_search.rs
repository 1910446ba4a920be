// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::ops::Range;

/// Returns the partition point of an index range according to the given
/// predicate (the first index of the second partition).
///
/// Works like [`slice::partition_point`], but over indexes, so it can search
/// sequences that are not materialized as a slice, e.g. fixed-size records
/// in a byte buffer.
///
/// The predicate must be `true` for a (possibly empty) prefix of the range
/// and `false` for the rest.
pub fn partition_point<F>(range: Range<usize>, pred: F) -> usize
where
    F: Fn(usize) -> bool,
{
    let Range {
        start: mut left,
        end: mut right,
    } = range;

    while left < right {
        let mid = left + (right - left) / 2;

        if pred(mid) {
            left = mid + 1;
        } else {
            right = mid;
        }
    }

    left
}

#[cfg(test)]
#[expect(clippy::indexing_slicing)]
mod tests {
    use super::partition_point;
    use test_log::test;

    #[test]
    fn binary_search_first() {
        let items = [1, 2, 3, 4, 5];
        let idx = partition_point(0..items.len(), |i| items[i] < 1);
        assert_eq!(0, idx);

        let pp_idx = items.partition_point(|&x| x < 1);
        assert_eq!(pp_idx, idx);
    }

    #[test]
    fn binary_search_last() {
        let items = [1, 2, 3, 4, 5];
        let idx = partition_point(0..items.len(), |i| items[i] < 5);
        assert_eq!(4, idx);

        let pp_idx = items.partition_point(|&x| x < 5);
        assert_eq!(pp_idx, idx);
    }

    #[test]
    fn binary_search_middle() {
        let items = [1, 2, 3, 4, 5];
        let idx = partition_point(0..items.len(), |i| items[i] < 3);
        assert_eq!(2, idx);
    }

    #[test]
    fn binary_search_none() {
        let items = [1, 2, 3, 4, 5];
        let idx = partition_point(0..items.len(), |i| items[i] < 10);
        assert_eq!(5, idx);
    }

    #[test]
    fn binary_search_empty() {
        assert_eq!(0, partition_point(0..0, |_| true));
        assert_eq!(7, partition_point(7..7, |_| false));
    }

    #[test]
    fn binary_search_subrange() {
        let items = [9, 1, 2, 3, 4, 5, 0];
        let idx = partition_point(1..6, |i| items[i] <= 3);
        assert_eq!(4, idx);

        let idx = partition_point(1..6, |i| items[i] <= 100);
        assert_eq!(6, idx);
    }
}
