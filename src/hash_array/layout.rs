// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::matrix::low_mask;

/// Bit layout of a slot inside a 64-bit storage word
///
/// ## Format
///
/// \[tag\] \[large\] \[key_remainder\] \[value\]
///
/// from least to most significant bit. A zero slot is empty. Continuation
/// slots set `large` and use the remainder and value fields together as the
/// high part of a counter.
///
/// Slots never straddle words, so `64 / slot_bits` slots share a word and
/// the remaining high bits of each word are unused.
#[expect(clippy::doc_markdown)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SlotLayout {
    tag_bits: u32,
    rem_bits: u32,
    val_bits: u32,
    cont_bits: u32,
    slot_bits: u32,
    slots_per_word: usize,
}

impl SlotLayout {
    /// Computes the layout for a table of `2^lsize` slots.
    pub fn new(
        lsize: u32,
        key_width: u32,
        val_width: u32,
        reprobe_limit: usize,
    ) -> crate::Result<Self> {
        let tags = reprobe_limit as u64 + 1;
        let tag_bits = u64::BITS - tags.leading_zeros();

        let rem_bits = key_width.saturating_sub(lsize);

        let slot_bits = tag_bits + 1 + rem_bits + val_width;

        if slot_bits > u64::BITS {
            return Err(crate::Error::InvalidConfig(
                "slot does not fit in a 64-bit word, lower the value width or grow the table",
            ));
        }

        let cont_bits = if val_width == 0 {
            0
        } else {
            (rem_bits + val_width).min(u64::BITS - val_width)
        };

        Ok(Self {
            tag_bits,
            rem_bits,
            val_bits: val_width,
            cont_bits,
            slot_bits,
            slots_per_word: (u64::BITS / slot_bits) as usize,
        })
    }

    #[must_use]
    pub fn slot_bits(&self) -> u32 {
        self.slot_bits
    }

    #[must_use]
    pub fn slots_per_word(&self) -> usize {
        self.slots_per_word
    }

    #[must_use]
    pub fn rem_bits(&self) -> u32 {
        self.rem_bits
    }

    #[must_use]
    pub fn val_bits(&self) -> u32 {
        self.val_bits
    }

    /// Width of the counter extension held by a continuation slot
    #[must_use]
    pub fn cont_bits(&self) -> u32 {
        self.cont_bits
    }

    #[must_use]
    pub fn val_max(&self) -> u64 {
        low_mask(self.val_bits)
    }

    #[must_use]
    pub fn cont_max(&self) -> u64 {
        low_mask(self.cont_bits)
    }

    /// Returns the word index and bit shift of the slot `id`.
    #[must_use]
    pub fn locate(&self, id: usize) -> (usize, u32) {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "there are at most 64 slots per word"
        )]
        let shift = (id % self.slots_per_word) as u32 * self.slot_bits;

        (id / self.slots_per_word, shift)
    }

    /// Number of words needed to hold `size` slots.
    #[must_use]
    pub fn word_count(&self, size: usize) -> usize {
        size.div_ceil(self.slots_per_word)
    }

    #[must_use]
    pub fn extract(&self, word: u64, shift: u32) -> u64 {
        (word >> shift) & low_mask(self.slot_bits)
    }

    #[must_use]
    pub fn replace(&self, word: u64, shift: u32, slot: u64) -> u64 {
        let mask = low_mask(self.slot_bits) << shift;
        (word & !mask) | (slot << shift)
    }

    #[must_use]
    pub fn tag(&self, slot: u64) -> u64 {
        slot & low_mask(self.tag_bits)
    }

    #[must_use]
    pub fn is_large(&self, slot: u64) -> bool {
        (slot >> self.tag_bits) & 1 == 1
    }

    #[must_use]
    pub fn remainder(&self, slot: u64) -> u64 {
        field(slot, self.rem_shift(), self.rem_bits)
    }

    #[must_use]
    pub fn value(&self, slot: u64) -> u64 {
        field(slot, self.val_shift(), self.val_bits)
    }

    #[must_use]
    pub fn cont_value(&self, slot: u64) -> u64 {
        field(slot, self.rem_shift(), self.cont_bits)
    }

    /// Builds a primary entry found at probe `tag - 1`.
    #[must_use]
    pub fn primary(&self, tag: u64, remainder: u64, value: u64) -> u64 {
        debug_assert!(tag > 0 && tag <= low_mask(self.tag_bits));

        tag | place(remainder, self.rem_shift(), self.rem_bits)
            | place(value, self.val_shift(), self.val_bits)
    }

    /// Builds a continuation entry found at probe `tag - 1` from its primary.
    #[must_use]
    pub fn continuation(&self, tag: u64, value: u64) -> u64 {
        debug_assert!(tag > 0 && tag <= low_mask(self.tag_bits));

        tag | (1 << self.tag_bits) | place(value, self.rem_shift(), self.cont_bits)
    }

    #[must_use]
    pub fn with_value(&self, slot: u64, value: u64) -> u64 {
        let mask = place(u64::MAX, self.val_shift(), self.val_bits);
        (slot & !mask) | place(value, self.val_shift(), self.val_bits)
    }

    #[must_use]
    pub fn with_cont_value(&self, slot: u64, value: u64) -> u64 {
        let mask = place(u64::MAX, self.rem_shift(), self.cont_bits);
        (slot & !mask) | place(value, self.rem_shift(), self.cont_bits)
    }

    fn rem_shift(&self) -> u32 {
        self.tag_bits + 1
    }

    fn val_shift(&self) -> u32 {
        self.tag_bits + 1 + self.rem_bits
    }
}

/// Reads a `bits` wide field at `shift`; zero-width fields read as 0.
fn field(slot: u64, shift: u32, bits: u32) -> u64 {
    if bits == 0 {
        0
    } else {
        (slot >> shift) & low_mask(bits)
    }
}

/// Positions the low `bits` of `value` at `shift`.
fn place(value: u64, shift: u32, bits: u32) -> u64 {
    if bits == 0 {
        0
    } else {
        (value & low_mask(bits)) << shift
    }
}
