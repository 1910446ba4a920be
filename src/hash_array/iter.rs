// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::HashArray;

/// Iterator over the `(key, value)` pairs of a [`HashArray`], in slot order
pub struct Iter<'a> {
    array: &'a HashArray,
    id: usize,
}

impl<'a> Iter<'a> {
    pub(super) fn new(array: &'a HashArray) -> Self {
        Self { array, id: 0 }
    }

    /// Slot of the next entry to be examined.
    #[must_use]
    pub fn id(&self) -> usize {
        self.id
    }
}

impl Iterator for Iter<'_> {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let size = self.array.size();

        while self.id < size {
            let id = self.id;
            self.id += 1;

            if let Some(entry) = self.array.get_key_val_at_id(id) {
                return Some(entry);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.array.size().saturating_sub(self.id)))
    }
}

impl std::iter::FusedIterator for Iter<'_> {}
