// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

/// Structural problems found while decoding a dump file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The file does not start with the expected magic bytes
    InvalidMagic([u8; 8]),

    /// A stored dimension does not agree with the declared key width
    DimensionMismatch {
        /// Dimension implied by the header
        expected: u64,

        /// Dimension found in the file
        got: u64,
    },

    /// A serialized matrix has impossible dimensions or stray bits
    InvalidMatrix,

    /// A header field holds an impossible value
    InvalidHeader(&'static str),

    /// The file ends in the middle of a structure or record
    Truncated,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => write!(f, "invalid magic bytes {magic:?}"),
            Self::DimensionMismatch { expected, got } => {
                write!(f, "dimension mismatch (expected {expected}, got {got})")
            }
            Self::InvalidMatrix => write!(f, "invalid matrix"),
            Self::InvalidHeader(field) => write!(f, "invalid header field: {field}"),
            Self::Truncated => write!(f, "truncated file"),
        }
    }
}

impl std::error::Error for FormatError {}

/// Represents errors that can occur in the hash array and the dump files
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Dump file is malformed
    Format(FormatError),

    /// Hash array configuration is unusable
    InvalidConfig(&'static str),

    /// No invertible matrix was drawn within the given number of attempts
    MatrixGeneration(usize),

    /// Records were not supplied in ascending (position, key) order
    UnsortedInput {
        /// Previously written key
        previous: u64,

        /// Offending key
        key: u64,
    },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "MerCountError(Io: {e})"),
            Self::Format(e) => write!(f, "MerCountError(Format: {e})"),
            Self::InvalidConfig(msg) => write!(f, "MerCountError(InvalidConfig: {msg})"),
            Self::MatrixGeneration(attempts) => write!(
                f,
                "MerCountError(MatrixGeneration: no invertible matrix after {attempts} attempts)"
            ),
            Self::UnsortedInput { previous, key } => write!(
                f,
                "MerCountError(UnsortedInput: key {key:#x} written after {previous:#x})"
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Format(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        if value.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Format(FormatError::Truncated)
        } else {
            Self::Io(value)
        }
    }
}

impl From<FormatError> for Error {
    fn from(value: FormatError) -> Self {
        Self::Format(value)
    }
}

/// Crate result
pub type Result<T> = std::result::Result<T, Error>;
