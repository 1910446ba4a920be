// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use memmap2::Mmap;
use std::{fs::File, path::Path};

/// Read-only bytes of a dump file
pub enum Region {
    /// Memory-mapped file
    Mapped(Mmap),

    /// Fully loaded file
    Owned(Vec<u8>),
}

impl Region {
    /// Memory-maps the file at `path`.
    pub fn map(path: &Path) -> crate::Result<Self> {
        let file = File::open(path)?;

        // SAFETY: Dump files are immutable once finished, the mapping is never
        // written to, and truncating a file while it is queried is unsupported
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self::Mapped(mmap))
    }

    /// Reads the whole file at `path` into memory.
    pub fn load(path: &Path) -> crate::Result<Self> {
        Ok(Self::Owned(std::fs::read(path)?))
    }

    /// Whether the file is memory-mapped.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        matches!(self, Self::Mapped(_))
    }
}

impl std::ops::Deref for Region {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Mapped(mmap) => mmap,
            Self::Owned(bytes) => bytes,
        }
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mapped(mmap) => write!(f, "Region::Mapped({} bytes)", mmap.len()),
            Self::Owned(bytes) => write!(f, "Region::Owned({} bytes)", bytes.len()),
        }
    }
}
