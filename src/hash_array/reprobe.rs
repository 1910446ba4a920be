// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Fixed table of reprobe offsets
///
/// Offset `p` is the triangular number `p (p + 1) / 2`. Triangular numbers
/// are a complete residue system modulo any power of two, so for `p < size`
/// every probe of a key lands on a different slot, and the probe index can be
/// recovered from a stored tag to find an entry's natural position.
#[derive(Clone, Debug)]
pub struct ReprobeSequence(Box<[u64]>);

impl ReprobeSequence {
    /// Builds the offsets for probes `0..=limit`.
    #[must_use]
    pub fn triangular(limit: usize) -> Self {
        Self(
            (0..=limit as u64)
                .map(|p| {
                    if p % 2 == 0 {
                        (p / 2).wrapping_mul(p + 1)
                    } else {
                        p.wrapping_mul((p + 1) / 2)
                    }
                })
                .collect(),
        )
    }

    /// Largest probe index.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.0.len() - 1
    }

    /// Offset of the given probe.
    ///
    /// # Panics
    ///
    /// Panics if `probe` exceeds the limit.
    #[must_use]
    #[expect(clippy::indexing_slicing, reason = "probe indexes come from stored tags")]
    pub fn offset(&self, probe: usize) -> u64 {
        self.0[probe]
    }

    /// Iterates over `(probe, offset)` pairs, starting at probe 0.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.0.iter().copied().enumerate()
    }
}
