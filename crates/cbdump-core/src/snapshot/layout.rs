//! On-disk layout of the callback dump header.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ magic: u32                  (selects format version 1/2/3)   │
//! │ timestamp: u32              (capture time, unix seconds)     │
//! │ counters: 16 × u32          (64 bytes)                       │
//! │ hash_size: u32              (version 3 only, must be != 0)   │
//! │ timeout_intervals: 8 × u32                                   │
//! │ timeout_queues: 128 × u32                                    │
//! │ first_timeout: u32                                           │
//! │ free_callbacks: u32         (head of free callback list)     │
//! │ free_file_entries: u32      (head of free file entry list)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ HASH TABLE (hash_size × u32, 512 for versions 1 and 2)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │ CALLBACK BLOCKS (n_blocks × 32 bytes, slot 1 first)          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ FILE ENTRY BLOCKS (n_blocks × 32 bytes, slot 1 first)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All words are little-endian.

use serde::Serialize;

use crate::error::FormatError;

pub const MAGIC_V1: u32 = 0x1234_5678;
pub const MAGIC_V2: u32 = 0x1234_5679;
pub const MAGIC_V3: u32 = 0x1234_567A;

/// Bucket count compiled into servers writing versions 1 and 2.
pub const DEFAULT_HASH_SIZE: u32 = 512;

pub const BLOCK_SIZE: usize = 32;
pub const COUNTER_WORDS: usize = 16;
pub const COUNTERS_SIZE: usize = COUNTER_WORDS * 4;
pub const TIMEOUT_INTERVALS: usize = 8;
pub const TIMEOUT_QUEUES: usize = 128;

/// Snapshot format version, selected by the leading magic word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FormatVersion {
    V1,
    V2,
    V3,
}

impl FormatVersion {
    pub fn from_magic(magic: u32) -> Result<Self, FormatError> {
        match magic {
            MAGIC_V1 => Ok(FormatVersion::V1),
            MAGIC_V2 => Ok(FormatVersion::V2),
            MAGIC_V3 => Ok(FormatVersion::V3),
            other => Err(FormatError::UnrecognizedMagic(other)),
        }
    }

    pub fn magic(self) -> u32 {
        match self {
            FormatVersion::V1 => MAGIC_V1,
            FormatVersion::V2 => MAGIC_V2,
            FormatVersion::V3 => MAGIC_V3,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
            FormatVersion::V3 => 3,
        }
    }

    /// True when the header carries an explicit hash table size word.
    pub fn stores_hash_size(self) -> bool {
        matches!(self, FormatVersion::V3)
    }
}

/// Server-side callback counters, in dump order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub delete_files: u32,
    pub delete_callbacks: u32,
    pub break_callbacks: u32,
    pub add_callbacks: u32,
    pub got_some_spaces: u32,
    pub delete_all_callbacks: u32,
    /// Live file entries.
    pub n_file_entries: u32,
    /// Live callbacks.
    pub n_callbacks: u32,
    /// Size of each block pool.
    pub n_blocks: u32,
    pub callbacks_timed_out: u32,
    pub n_breakers: u32,
    pub gss1: u32,
    pub gss2: u32,
    pub gss3: u32,
    pub gss4: u32,
    pub gss5: u32,
}

impl Counters {
    pub fn from_words(w: [u32; COUNTER_WORDS]) -> Self {
        Self {
            delete_files: w[0],
            delete_callbacks: w[1],
            break_callbacks: w[2],
            add_callbacks: w[3],
            got_some_spaces: w[4],
            delete_all_callbacks: w[5],
            n_file_entries: w[6],
            n_callbacks: w[7],
            n_blocks: w[8],
            callbacks_timed_out: w[9],
            n_breakers: w[10],
            gss1: w[11],
            gss2: w[12],
            gss3: w[13],
            gss4: w[14],
            gss5: w[15],
        }
    }

    pub fn to_words(&self) -> [u32; COUNTER_WORDS] {
        [
            self.delete_files,
            self.delete_callbacks,
            self.break_callbacks,
            self.add_callbacks,
            self.got_some_spaces,
            self.delete_all_callbacks,
            self.n_file_entries,
            self.n_callbacks,
            self.n_blocks,
            self.callbacks_timed_out,
            self.n_breakers,
            self.gss1,
            self.gss2,
            self.gss3,
            self.gss4,
            self.gss5,
        ]
    }

    /// Counter names paired with values, in dump order.
    pub fn named(&self) -> [(&'static str, u32); COUNTER_WORDS] {
        let w = self.to_words();
        [
            ("DeleteFiles", w[0]),
            ("DeleteCallBacks", w[1]),
            ("BreakCallBacks", w[2]),
            ("AddCallBacks", w[3]),
            ("GotSomeSpaces", w[4]),
            ("DeleteAllCallBacks", w[5]),
            ("nFEs", w[6]),
            ("nCBs", w[7]),
            ("nblks", w[8]),
            ("CBsTimedOut", w[9]),
            ("nbreakers", w[10]),
            ("GSS1", w[11]),
            ("GSS2", w[12]),
            ("GSS3", w[13]),
            ("GSS4", w[14]),
            ("GSS5", w[15]),
        ]
    }
}

/// Reads a little-endian u32 at `at`. Callers guarantee `at + 4 <= b.len()`.
#[inline]
pub(crate) fn le_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// Sequential reader over the dump buffer; every read is bounds-checked and
/// reports the section it was reading when the buffer runs out.
pub(crate) struct SectionReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SectionReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn take(&mut self, len: usize, section: &'static str) -> Result<&'a [u8], FormatError> {
        if self.remaining() < len {
            return Err(FormatError::TruncatedInput {
                section,
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn u32(&mut self, section: &'static str) -> Result<u32, FormatError> {
        let bytes = self.take(4, section)?;
        Ok(le_u32(bytes, 0))
    }

    pub(crate) fn words(&mut self, count: usize, section: &'static str) -> Result<Vec<u32>, FormatError> {
        let bytes = self.take(count * 4, section)?;
        Ok(bytes.chunks_exact(4).map(|c| le_u32(c, 0)).collect())
    }

    pub(crate) fn word_array<const N: usize>(
        &mut self,
        section: &'static str,
    ) -> Result<[u32; N], FormatError> {
        let bytes = self.take(N * 4, section)?;
        let mut out = [0u32; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = le_u32(bytes, i * 4);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_magic() {
        assert_eq!(FormatVersion::from_magic(MAGIC_V1), Ok(FormatVersion::V1));
        assert_eq!(FormatVersion::from_magic(MAGIC_V2), Ok(FormatVersion::V2));
        assert_eq!(FormatVersion::from_magic(MAGIC_V3), Ok(FormatVersion::V3));
        assert_eq!(
            FormatVersion::from_magic(0x7856_3412),
            Err(FormatError::UnrecognizedMagic(0x7856_3412))
        );
        assert!(FormatVersion::V3.stores_hash_size());
        assert!(!FormatVersion::V2.stores_hash_size());
    }

    #[test]
    fn test_counters_word_order() {
        let words: [u32; COUNTER_WORDS] = std::array::from_fn(|i| i as u32 * 10);
        let counters = Counters::from_words(words);
        assert_eq!(counters.n_file_entries, 60);
        assert_eq!(counters.n_callbacks, 70);
        assert_eq!(counters.n_blocks, 80);
        assert_eq!(counters.gss5, 150);
        assert_eq!(counters.to_words(), words);
        assert_eq!(counters.named()[8], ("nblks", 80));
    }

    #[test]
    fn test_section_reader_truncation() {
        let data = [1u8, 0, 0, 0, 2, 0];
        let mut reader = SectionReader::new(&data);
        assert_eq!(reader.u32("magic").unwrap(), 1);
        assert_eq!(
            reader.u32("timestamp"),
            Err(FormatError::TruncatedInput {
                section: "timestamp",
                needed: 4,
                available: 2,
            })
        );
        assert_eq!(reader.position(), 4);
    }
}
