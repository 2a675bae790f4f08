//! Decoder for callback state dumps.
//!
//! A dump is read fully into memory and decoded in one pass into a
//! [`Snapshot`]. Header words are unpacked eagerly; the two block pools are
//! kept as raw slot arrays and decoded on demand through bounds-checked
//! accessors. Nothing stored in the dump is trusted as a pointer: chain
//! traversal lives in [`crate::walk`].

pub mod block;
pub mod layout;

use std::fs;
use std::path::Path;

use tracing::debug;

pub use block::{Arena, Block, Callback, FileEntry};
pub use layout::{Counters, FormatVersion};

use layout::{
    BLOCK_SIZE, COUNTER_WORDS, DEFAULT_HASH_SIZE, SectionReader, TIMEOUT_INTERVALS, TIMEOUT_QUEUES,
};

use crate::error::{Error, FormatError, Result};

/// Immutable, fully decoded callback dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    version: FormatVersion,
    timestamp: u32,
    counters: Counters,
    timeout_intervals: [u32; TIMEOUT_INTERVALS],
    timeout_queues: Vec<u32>,
    first_timeout: u32,
    free_callbacks: u32,
    free_file_entries: u32,
    buckets: Vec<u32>,
    callbacks: Arena<Callback>,
    file_entries: Arena<FileEntry>,
}

impl Snapshot {
    /// Reads and decodes a dump file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| Error::io(path, e))?;
        debug!(path = %path.display(), bytes = data.len(), "snapshot: read dump");
        Ok(Self::decode(&data)?)
    }

    /// Decodes a complete dump image.
    pub fn decode(data: &[u8]) -> std::result::Result<Self, FormatError> {
        let mut r = SectionReader::new(data);

        let magic = r.u32("magic")?;
        let version = FormatVersion::from_magic(magic)?;
        let timestamp = r.u32("timestamp")?;
        let counters = Counters::from_words(r.word_array::<COUNTER_WORDS>("counters")?);

        // Single dispatch point for version-dependent header fields.
        let hash_size = match version {
            FormatVersion::V1 | FormatVersion::V2 => DEFAULT_HASH_SIZE,
            FormatVersion::V3 => {
                let size = r.u32("hash size")?;
                if size == 0 {
                    return Err(FormatError::InvalidHashSize);
                }
                size
            }
        };

        let timeout_intervals = r.word_array::<TIMEOUT_INTERVALS>("timeout intervals")?;
        let timeout_queues = r.words(TIMEOUT_QUEUES, "timeout queues")?;
        let first_timeout = r.u32("first timeout")?;
        let free_callbacks = r.u32("free callback list")?;
        let free_file_entries = r.u32("free file entry list")?;
        let buckets = r.words(hash_size as usize, "hash table")?;

        let total_blocks = counters.n_blocks;
        let pool_len = pool_bytes(total_blocks);
        let callbacks = Arena::new(r.take(pool_len, "callback blocks")?.to_vec(), total_blocks);
        let file_entries = Arena::new(r.take(pool_len, "file entry blocks")?.to_vec(), total_blocks);

        debug!(
            version = version.number(),
            hash_size,
            total_blocks,
            header_bytes = r.position() - 2 * pool_len,
            "snapshot: decoded"
        );
        if r.remaining() > 0 {
            debug!(trailing = r.remaining(), "snapshot: ignoring trailing bytes");
        }

        Ok(Self {
            version,
            timestamp,
            counters,
            timeout_intervals,
            timeout_queues,
            first_timeout,
            free_callbacks,
            free_file_entries,
            buckets,
            callbacks,
            file_entries,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Capture time in unix seconds.
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn total_blocks(&self) -> u32 {
        self.counters.n_blocks
    }

    /// Hash bucket heads in table order; 0 marks an empty bucket.
    pub fn buckets(&self) -> &[u32] {
        &self.buckets
    }

    pub fn timeout_intervals(&self) -> &[u32; TIMEOUT_INTERVALS] {
        &self.timeout_intervals
    }

    pub fn timeout_queues(&self) -> &[u32] {
        &self.timeout_queues
    }

    pub fn first_timeout(&self) -> u32 {
        self.first_timeout
    }

    pub fn free_callbacks(&self) -> u32 {
        self.free_callbacks
    }

    pub fn free_file_entries(&self) -> u32 {
        self.free_file_entries
    }

    /// Decodes the file entry in 1-based slot `index`.
    pub fn file_entry(&self, index: u32) -> std::result::Result<FileEntry, FormatError> {
        self.file_entries.get(index)
    }

    /// Decodes the callback in 1-based slot `index`.
    pub fn callback(&self, index: u32) -> std::result::Result<Callback, FormatError> {
        self.callbacks.get(index)
    }

    /// Bytes reserved for both block pools.
    pub fn memory_allocated(&self) -> u64 {
        self.total_blocks() as u64 * 2 * BLOCK_SIZE as u64
    }

    /// Bytes held by live file entries and callbacks.
    pub fn memory_used(&self) -> u64 {
        (self.counters.n_file_entries as u64 + self.counters.n_callbacks as u64) * BLOCK_SIZE as u64
    }

    /// Saturates at zero when the live counters exceed the pool.
    pub fn memory_available(&self) -> u64 {
        self.memory_allocated().saturating_sub(self.memory_used())
    }

    /// Number of non-empty hash buckets.
    pub fn buckets_in_use(&self) -> usize {
        self.buckets.iter().filter(|&&head| head != 0).count()
    }

    /// Number of non-empty timeout queues.
    pub fn timeout_queues_in_use(&self) -> usize {
        self.timeout_queues.iter().filter(|&&head| head != 0).count()
    }
}

/// Size of one block pool. Saturates so that an absurd block count reports
/// truncation instead of overflowing.
fn pool_bytes(total_blocks: u32) -> usize {
    (total_blocks as usize).saturating_mul(BLOCK_SIZE)
}
