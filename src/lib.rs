// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! A lock-free counting hash array for short DNA subsequences (mers), and a
//! sorted, memory-mapped file format to query the counts.
//!
//! ##### About
//!
//! This crate exports a [`HashArray`]: a fixed-size, open-addressing table of
//! integer keys with bounded-width counters, which many threads can update
//! at once without locks.
//!
//! Keys are scrambled by a random invertible bit matrix over GF(2). The low
//! bits of the product pick the slot, and only the remaining high bits are
//! stored, so a 2k-bit mer costs `2k - log2(size)` bits of key storage per
//! entry. Counters that outgrow their slot spill into a continuation slot.
//!
//! The table never grows. When a key cannot be placed within the reprobe
//! limit, the table is written to disk as a sorted dump ([`dump::Writer`])
//! and cleared for the next pass. Dumps are queried through a memory
//! mapping ([`dump::Query`]) by binary search, without an index.
//!
//! ```
//! # use mercount::{dump::{Query, Writer}, mer, Config};
//! #
//! # let folder = tempfile::tempdir()?;
//! # let path = folder.path().join("counts");
//! let array = Config::new(1 << 10, 16).seed(3).build()?;
//!
//! for window in b"ACGTACGTTGCA".windows(8) {
//!     let key = mer::encode(window).unwrap();
//!     assert!(array.add(key, 1));
//! }
//!
//! let mut writer = Writer::for_array(&path, &array, 1)?;
//! writer.write_array(&array)?;
//! let stats = writer.finish()?;
//! assert_eq!(5, stats.distinct);
//!
//! let query = Query::open(&path)?;
//! assert_eq!(1, query.get(mer::encode(b"ACGTACGT").unwrap()));
//! # Ok::<(), mercount::Error>(())
//! ```

#![deny(clippy::all, clippy::cargo)]
#![warn(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![warn(clippy::redundant_feature_names)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

#[doc(hidden)]
pub mod binary_search;

#[doc(hidden)]
pub mod coding;

mod config;

pub mod dump;

mod error;
mod hash_array;

pub mod matrix;

pub mod mer;

pub use {
    config::{Config, DEFAULT_REPROBE_LIMIT, DEFAULT_VAL_WIDTH, MAX_REPROBE_LIMIT},
    error::{Error, FormatError, Result},
    hash_array::{HashArray, Iter},
    matrix::BitMatrix,
};
