//! Error types for snapshot decoding, traversal and host table parsing.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which kind of chain a traversal was following when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainKind {
    /// File entries hanging off one hash bucket.
    FileEntry,
    /// Callbacks hanging off one file entry.
    Callback,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::FileEntry => f.write_str("file entry"),
            ChainKind::Callback => f.write_str("callback"),
        }
    }
}

/// Which block array an index was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    FileEntry,
    Callback,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKind::FileEntry => f.write_str("file entry"),
            BlockKind::Callback => f.write_str("callback"),
        }
    }
}

/// The input is not a well-formed callback dump or host table.
///
/// None of these are retried: the inputs are static files.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unrecognized magic {0:#010x}: not a callback dump (or unsupported version)")]
    UnrecognizedMagic(u32),

    #[error("invalid hash table size 0 in version 3 header")]
    InvalidHashSize,

    #[error("truncated input in {section}: need {needed} bytes, {available} available")]
    TruncatedInput {
        section: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("{kind} index {index} out of range (1..={total_blocks})")]
    IndexOutOfRange {
        kind: BlockKind,
        index: u32,
        total_blocks: u32,
    },

    #[error("{chain} chain starting at index {head} exceeds {limit} steps: cycle or corruption")]
    CycleDetected {
        chain: ChainKind,
        head: u32,
        limit: u32,
    },

    #[error("invalid host record on line {line}: {reason}")]
    InvalidHostRecord { line: usize, reason: String },
}

/// Top-level error for loading inputs from disk.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Format(#[from] FormatError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// A convenience `Result` alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failed_check() {
        let err = FormatError::UnrecognizedMagic(0xdeadbeef);
        assert!(err.to_string().contains("0xdeadbeef"));

        let err = FormatError::CycleDetected {
            chain: ChainKind::FileEntry,
            head: 3,
            limit: 8,
        };
        assert_eq!(
            err.to_string(),
            "file entry chain starting at index 3 exceeds 8 steps: cycle or corruption"
        );

        let err = FormatError::IndexOutOfRange {
            kind: BlockKind::Callback,
            index: 0,
            total_blocks: 4,
        };
        assert_eq!(err.to_string(), "callback index 0 out of range (1..=4)");
    }

    #[test]
    fn test_format_error_is_transparent() {
        let err: Error = FormatError::InvalidHashSize.into();
        assert_eq!(err.to_string(), "invalid hash table size 0 in version 3 header");
    }
}
