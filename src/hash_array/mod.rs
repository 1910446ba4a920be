// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod iter;
pub(crate) mod layout;
pub(crate) mod reprobe;

pub use iter::Iter;

use crate::{
    config::{Config, MAX_REPROBE_LIMIT},
    matrix::{low_mask, BitMatrix},
};
use layout::SlotLayout;
use rand::{rngs::StdRng, SeedableRng};
use reprobe::ReprobeSequence;
use std::sync::atomic::{
    AtomicU64, AtomicUsize,
    Ordering::{AcqRel, Acquire, Relaxed},
};

/// Outcome of claiming a slot for a key
enum Claim {
    /// The key was inserted into a fresh slot
    New(usize),

    /// The key was already present
    Found(usize),

    /// Every probe hit a slot owned by another key
    Full,
}

/// Outcome of probing a single slot
enum Probe {
    Claimed,
    Matched,
    Occupied,
}

/// Lock-free, fixed-size open-addressing hash array for integer keys
///
/// Keys are mapped to slots by an invertible GF(2) matrix `M`: the natural
/// slot of a key is the low `log2(size)` bits of `M · key`, and only the
/// remaining high bits are stored. The key is recovered from the slot index
/// and the stored remainder with `M⁻¹`.
///
/// Slots are packed into 64-bit words, and every mutation is a
/// compare-and-swap of the whole word, so an entry is never observed
/// half-written. Entries are never removed.
///
/// The array never grows. When a key cannot be placed within the reprobe
/// limit, [`HashArray::add`] returns `false` and the caller is expected to
/// drain this array and continue with a new one.
pub struct HashArray {
    words: Box<[AtomicU64]>,
    layout: SlotLayout,
    reprobes: ReprobeSequence,

    size_mask: u64,
    lsize: u32,
    key_width: u32,

    matrix: BitMatrix,
    inverse: BitMatrix,

    /// Claimed slots, including continuation slots
    filled: AtomicUsize,
}

impl std::fmt::Debug for HashArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashArray")
            .field("size", &self.size())
            .field("key_width", &self.key_width)
            .field("remainder_bits", &self.layout.rem_bits())
            .field("val_width", &self.layout.val_bits())
            .field("reprobe_limit", &self.reprobe_limit())
            .field("filled", &self.filled_slots())
            .finish_non_exhaustive()
    }
}

impl HashArray {
    pub(crate) fn from_config(config: Config) -> crate::Result<Self> {
        let Config {
            size,
            key_width,
            val_width,
            reprobe_limit,
            seed,
            matrices,
        } = config;

        if !size.is_power_of_two() {
            return Err(crate::Error::InvalidConfig("size must be a power of two"));
        }

        if key_width == 0 || key_width > u64::BITS {
            return Err(crate::Error::InvalidConfig("key width must be in 1..=64"));
        }

        if reprobe_limit >= size || reprobe_limit > MAX_REPROBE_LIMIT {
            return Err(crate::Error::InvalidConfig(
                "reprobe limit must be smaller than the size",
            ));
        }

        let lsize = size.trailing_zeros();
        let layout = SlotLayout::new(lsize, key_width, val_width, reprobe_limit)?;

        let (matrix, inverse) = match matrices {
            Some((matrix, inverse)) => {
                let valid = matrix.rows() == key_width
                    && matrix.is_square()
                    && inverse.rows() == key_width
                    && inverse.is_square()
                    && matrix
                        .multiply_matrix(&inverse)
                        .is_some_and(|product| product.is_identity());

                if !valid {
                    return Err(crate::Error::InvalidConfig(
                        "matrices must be a key width square matrix and its inverse",
                    ));
                }

                (matrix, inverse)
            }
            None => match seed {
                Some(seed) => {
                    BitMatrix::random_invertible(key_width, &mut StdRng::seed_from_u64(seed))?
                }
                None => BitMatrix::random_invertible(key_width, &mut rand::rng())?,
            },
        };

        let word_count = layout.word_count(size);
        let words = (0..word_count).map(|_| AtomicU64::new(0)).collect();

        log::debug!(
            "Allocated hash array of {size} slots ({} bits each, {} per word, {} bytes)",
            layout.slot_bits(),
            layout.slots_per_word(),
            word_count * std::mem::size_of::<u64>(),
        );

        Ok(Self {
            words,
            layout,
            reprobes: ReprobeSequence::triangular(reprobe_limit),
            size_mask: size as u64 - 1,
            lsize,
            key_width,
            matrix,
            inverse,
            filled: AtomicUsize::new(0),
        })
    }

    /// Number of slots.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "size was given as usize")]
    pub fn size(&self) -> usize {
        (self.size_mask + 1) as usize
    }

    /// Width of keys in bits.
    #[must_use]
    pub fn key_width(&self) -> u32 {
        self.key_width
    }

    /// Width of the value field in bits.
    #[must_use]
    pub fn val_width(&self) -> u32 {
        self.layout.val_bits()
    }

    /// Largest reprobe index.
    #[must_use]
    pub fn reprobe_limit(&self) -> usize {
        self.reprobes.limit()
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

    /// Number of claimed slots, including slots holding counter overflow.
    #[must_use]
    pub fn filled_slots(&self) -> usize {
        self.filled.load(Relaxed)
    }

    /// Natural slot of a key.
    #[must_use]
    pub fn position(&self, key: u64) -> u64 {
        self.matrix.multiply(key) & self.size_mask
    }

    /// Adds `increment` to the value of `key`, inserting the key if needed.
    ///
    /// Returns `false` if the key could not be placed within the reprobe
    /// limit, or does not fit in the key width. A full array is left
    /// unchanged and considered full for this key.
    pub fn add(&self, key: u64, increment: u64) -> bool {
        self.add_with_id(key, increment).is_some()
    }

    /// Same as [`HashArray::add`], also returning whether the key was new and
    /// the slot it lives in.
    pub fn add_with_id(&self, key: u64, increment: u64) -> Option<(bool, usize)> {
        if !self.fits(key) {
            return None;
        }

        // A set-only array ignores counts
        let increment = if self.layout.val_bits() == 0 { 0 } else { increment };

        match self.claim(key, increment) {
            Claim::New(id) => Some((true, id)),
            Claim::Found(id) => self.add_at(id, increment).then_some((false, id)),
            Claim::Full => None,
        }
    }

    /// Marks `key` as present.
    ///
    /// A new key gets the value 1 as a liveness marker (if the value field
    /// is at least one bit wide); existing values are left untouched.
    ///
    /// Returns whether the key was new and its slot, or `None` if the key
    /// could not be placed within the reprobe limit or does not fit in the
    /// key width.
    pub fn set(&self, key: u64) -> Option<(bool, usize)> {
        if !self.fits(key) {
            return None;
        }

        match self.claim(key, self.layout.val_max().min(1)) {
            Claim::New(id) => Some((true, id)),
            Claim::Found(id) => Some((false, id)),
            Claim::Full => None,
        }
    }

    /// Returns the slot of `key`, if present.
    #[must_use]
    pub fn get_key_id(&self, key: u64) -> Option<usize> {
        if !self.fits(key) {
            return None;
        }

        let (base, remainder) = self.split(key);

        for (probe, offset) in self.reprobes.iter() {
            let id = self.slot_id(base, offset);
            let slot = self.load_slot(id);

            // NOTE: Entries are never removed, so an empty slot ends the probe sequence
            if slot == 0 {
                return None;
            }

            if self.is_primary_of(slot, probe, remainder) {
                return Some(id);
            }
        }

        None
    }

    /// Returns the value of `key`, if present.
    #[must_use]
    pub fn get_val_for_key(&self, key: u64) -> Option<u64> {
        self.get_key_id(key)
            .map(|id| self.value_at(id, self.load_slot(id)))
    }

    /// Returns the key and value stored in slot `id`.
    ///
    /// Returns `None` for empty slots, slots holding counter overflow, and
    /// out-of-range ids.
    #[must_use]
    pub fn get_key_val_at_id(&self, id: usize) -> Option<(u64, u64)> {
        if id >= self.size() {
            return None;
        }

        let slot = self.load_slot(id);

        if slot == 0 || self.layout.is_large(slot) {
            return None;
        }

        Some((self.recover_key(id, slot), self.value_at(id, slot)))
    }

    /// Iterates over all `(key, value)` pairs in slot order.
    ///
    /// The iterator does not take a snapshot: entries inserted while it runs
    /// may or may not be seen, but entries present for the whole iteration
    /// are seen exactly once.
    #[must_use]
    pub fn iterator_all(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// Empties the array, keeping its matrix.
    pub fn clear(&mut self) {
        for word in &mut self.words {
            *word.get_mut() = 0;
        }
        *self.filled.get_mut() = 0;

        log::trace!("Cleared hash array of {} slots", self.size());
    }

    fn fits(&self, key: u64) -> bool {
        let fits = key & !low_mask(self.key_width) == 0;

        if !fits {
            log::trace!("Key {key:#x} does not fit in {} bits", self.key_width);
        }

        fits
    }

    /// Splits a key into its natural slot and the hash bits stored in the slot.
    fn split(&self, key: u64) -> (u64, u64) {
        let hash = self.matrix.multiply(key);
        let remainder = hash.checked_shr(self.lsize).unwrap_or(0);
        (hash & self.size_mask, remainder)
    }

    fn recover_key(&self, id: usize, slot: u64) -> u64 {
        #[expect(clippy::cast_possible_truncation, reason = "tags are bounded by the limit")]
        let probe = (self.layout.tag(slot) - 1) as usize;

        let base = (id as u64).wrapping_sub(self.reprobes.offset(probe)) & self.size_mask;
        let remainder = self.layout.remainder(slot);
        let hash = remainder.checked_shl(self.lsize).unwrap_or(0) | base;

        self.inverse.multiply(hash)
    }

    #[expect(clippy::cast_possible_truncation, reason = "ids are masked by the size")]
    fn slot_id(&self, from: u64, offset: u64) -> usize {
        (from.wrapping_add(offset) & self.size_mask) as usize
    }

    #[expect(clippy::indexing_slicing, reason = "ids are masked by the size")]
    fn word(&self, id: usize) -> (&AtomicU64, u32) {
        let (idx, shift) = self.layout.locate(id);
        (&self.words[idx], shift)
    }

    fn load_slot(&self, id: usize) -> u64 {
        let (word, shift) = self.word(id);
        self.layout.extract(word.load(Acquire), shift)
    }

    fn is_primary_of(&self, slot: u64, probe: usize, remainder: u64) -> bool {
        !self.layout.is_large(slot)
            && self.layout.tag(slot) == probe as u64 + 1
            && self.layout.remainder(slot) == remainder
    }

    fn is_continuation_of(&self, slot: u64, probe: usize) -> bool {
        self.layout.is_large(slot) && self.layout.tag(slot) == probe as u64 + 1
    }

    /// Claims slot `id` with `entry` if it is empty.
    ///
    /// The CAS covers the whole word, so it is retried when a neighbouring
    /// slot of the same word changes.
    fn try_claim(&self, id: usize, entry: u64, matches: impl Fn(u64) -> bool) -> Probe {
        let (word, shift) = self.word(id);
        let mut current = word.load(Acquire);

        loop {
            let slot = self.layout.extract(current, shift);

            if slot != 0 {
                return if matches(slot) {
                    Probe::Matched
                } else {
                    Probe::Occupied
                };
            }

            let new = self.layout.replace(current, shift, entry);

            match word.compare_exchange_weak(current, new, AcqRel, Acquire) {
                Ok(_) => {
                    self.filled.fetch_add(1, Relaxed);
                    return Probe::Claimed;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Finds the entry of `key`, or inserts it with `value`.
    ///
    /// A value wider than the value field needs a continuation slot, which
    /// is claimed before the entry is published. If there is none, the key is
    /// not inserted: lookups stop at the first empty slot, so it may not move
    /// on to a later probe either.
    fn claim(&self, key: u64, value: u64) -> Claim {
        let (base, remainder) = self.split(key);

        let val_max = self.layout.val_max();
        let carry = value.checked_shr(self.layout.val_bits()).unwrap_or(0);

        for (probe, offset) in self.reprobes.iter() {
            let id = self.slot_id(base, offset);
            let entry = self
                .layout
                .primary(probe as u64 + 1, remainder, value & val_max);
            let matches = |slot: u64| self.is_primary_of(slot, probe, remainder);

            let continuation = if carry > 0 {
                let slot = self.load_slot(id);

                if slot != 0 {
                    if matches(slot) {
                        return Claim::Found(id);
                    }
                    continue;
                }

                let Some(cont) = self.claim_continuation(id) else {
                    log::trace!("No room for counter overflow of new key {key:#x}");
                    return Claim::Full;
                };
                Some(cont)
            } else {
                None
            };

            // NOTE: If another key takes the slot first, a continuation reserved
            // above stays with the slot and serves that key's overflow
            match self.try_claim(id, entry, matches) {
                Probe::Claimed => {
                    if let Some(cont) = continuation {
                        self.spill(id, cont, carry);
                    }
                    return Claim::New(id);
                }
                Probe::Matched => return Claim::Found(id),
                Probe::Occupied => {}
            }
        }

        log::trace!("Reprobe limit reached for key {key:#x}");

        Claim::Full
    }

    /// Finds or claims the continuation slot of the entry in slot `primary`.
    fn claim_continuation(&self, primary: usize) -> Option<usize> {
        for (probe, offset) in self.reprobes.iter().skip(1) {
            let id = self.slot_id(primary as u64, offset);
            let entry = self.layout.continuation(probe as u64 + 1, 0);

            match self.try_claim(id, entry, |slot| self.is_continuation_of(slot, probe)) {
                Probe::Claimed | Probe::Matched => return Some(id),
                Probe::Occupied => {}
            }
        }

        None
    }

    fn find_continuation(&self, primary: usize) -> Option<usize> {
        for (probe, offset) in self.reprobes.iter().skip(1) {
            let id = self.slot_id(primary as u64, offset);
            let slot = self.load_slot(id);

            if slot == 0 {
                return None;
            }

            if self.is_continuation_of(slot, probe) {
                return Some(id);
            }
        }

        None
    }

    /// Full value of the entry `slot` found in slot `id`.
    fn value_at(&self, id: usize, slot: u64) -> u64 {
        let low = self.layout.value(slot);

        if self.layout.cont_bits() == 0 {
            return low;
        }

        match self.find_continuation(id) {
            Some(cont) => {
                let high = self.layout.cont_value(self.load_slot(cont));
                low | (high << self.layout.val_bits())
            }
            None => low,
        }
    }

    /// Adds to the value of the entry in slot `id`.
    ///
    /// The carry out of the value field goes to the continuation slot, which
    /// is claimed before the entry is modified, so that a full array leaves
    /// the entry unchanged.
    fn add_at(&self, id: usize, increment: u64) -> bool {
        let layout = &self.layout;
        let val_bits = layout.val_bits();

        if val_bits == 0 || increment == 0 {
            return true;
        }

        let (word, shift) = self.word(id);
        let mut continuation = None;

        let result = word.fetch_update(AcqRel, Acquire, |current| {
            let slot = layout.extract(current, shift);
            let sum = u128::from(layout.value(slot)) + u128::from(increment);

            if sum >> val_bits > 0 && continuation.is_none() {
                continuation = Some(self.claim_continuation(id)?);
            }

            #[expect(clippy::cast_possible_truncation, reason = "masked to the value width")]
            let low = sum as u64 & layout.val_max();

            Some(layout.replace(current, shift, layout.with_value(slot, low)))
        });

        let Ok(previous) = result else {
            log::trace!("No room for counter overflow of slot {id}");
            return false;
        };

        let sum = u128::from(layout.value(layout.extract(previous, shift))) + u128::from(increment);
        let carry = u64::try_from(sum >> val_bits).unwrap_or(u64::MAX);

        if let (true, Some(cont)) = (carry > 0, continuation) {
            self.spill(id, cont, carry);
        }

        true
    }

    /// Adds the carry out of the entry in slot `id` to its continuation slot.
    fn spill(&self, id: usize, cont: usize, carry: u64) {
        if self.add_continuation(cont, carry) {
            // Pin the low bits too, so a saturated counter reads as its maximum
            let (word, shift) = self.word(id);
            let value_mask = self.layout.with_value(0, self.layout.val_max());
            word.fetch_or(self.layout.replace(0, shift, value_mask), AcqRel);
        }
    }

    /// Adds the carry to a continuation slot, returning `true` if the counter saturated.
    fn add_continuation(&self, id: usize, carry: u64) -> bool {
        let layout = &self.layout;
        let (word, shift) = self.word(id);

        let result = word.fetch_update(AcqRel, Acquire, |current| {
            let slot = layout.extract(current, shift);
            let value = layout
                .cont_value(slot)
                .saturating_add(carry)
                .min(layout.cont_max());

            Some(layout.replace(current, shift, layout.with_cont_value(slot, value)))
        });

        let Ok(previous) = result else {
            return false;
        };

        let before = layout.cont_value(layout.extract(previous, shift));
        let saturated = before.saturating_add(carry) > layout.cont_max();

        if saturated && before < layout.cont_max() {
            log::warn!("Counter in slot {id} saturated");
        }

        saturated
    }
}
