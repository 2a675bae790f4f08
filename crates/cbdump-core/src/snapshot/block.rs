//! Fixed-size block records and the arenas that hold them.
//!
//! Both pools are kept as raw bytes exactly as dumped; records are unpacked
//! on demand from their 32-byte slot. Slot indices are 1-based, 0 is the
//! chain terminator and never a valid block.

use std::marker::PhantomData;

use serde::Serialize;

use super::layout::{BLOCK_SIZE, le_u32};
use crate::error::{BlockKind, FormatError};

/// A record that occupies one 32-byte block slot.
pub trait Block: Sized {
    const KIND: BlockKind;

    fn decode(slot: &[u8; BLOCK_SIZE]) -> Self;
}

/// One tracked file, heading a chain of callbacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub vnode: u32,
    pub unique: u32,
    pub volume: u32,
    /// Next file entry in the same hash bucket.
    pub next: u32,
    /// Callback count as recorded by the server.
    pub callback_count: u32,
    pub first_callback: u32,
    pub status: u32,
    pub spare: u32,
}

impl FileEntry {
    /// File id in the usual `volume.vnode.unique` form.
    pub fn fid(&self) -> String {
        format!("{}.{}.{}", self.volume, self.vnode, self.unique)
    }
}

impl Block for FileEntry {
    const KIND: BlockKind = BlockKind::FileEntry;

    fn decode(slot: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            vnode: le_u32(slot, 0),
            unique: le_u32(slot, 4),
            volume: le_u32(slot, 8),
            next: le_u32(slot, 12),
            callback_count: le_u32(slot, 16),
            first_callback: le_u32(slot, 20),
            status: le_u32(slot, 24),
            spare: le_u32(slot, 28),
        }
    }
}

/// One outstanding callback promise held by a host on a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Callback {
    /// Next callback on the same file entry.
    pub next: u32,
    /// Back-link to the owning file entry.
    pub file_head: u32,
    /// Timeout queue this callback is filed under.
    pub timeout_head: u8,
    pub status: u8,
    pub flags: u8,
    pub spare: u8,
    /// Host index of the owning host.
    pub host_head: u32,
    pub timeout_prev: u32,
    pub timeout_next: u32,
    pub host_prev: u32,
    pub host_next: u32,
}

impl Block for Callback {
    const KIND: BlockKind = BlockKind::Callback;

    fn decode(slot: &[u8; BLOCK_SIZE]) -> Self {
        Self {
            next: le_u32(slot, 0),
            file_head: le_u32(slot, 4),
            timeout_head: slot[8],
            status: slot[9],
            flags: slot[10],
            spare: slot[11],
            host_head: le_u32(slot, 12),
            timeout_prev: le_u32(slot, 16),
            timeout_next: le_u32(slot, 20),
            host_prev: le_u32(slot, 24),
            host_next: le_u32(slot, 28),
        }
    }
}

/// Exclusively-owned pool of `total_blocks` slots of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena<T> {
    data: Vec<u8>,
    total_blocks: u32,
    _record: PhantomData<T>,
}

impl<T: Block> Arena<T> {
    /// Takes ownership of a pool image; `data.len()` must be
    /// `total_blocks * BLOCK_SIZE`, which the decoder has already checked.
    pub(crate) fn new(data: Vec<u8>, total_blocks: u32) -> Self {
        debug_assert_eq!(data.len(), total_blocks as usize * BLOCK_SIZE);
        Self {
            data,
            total_blocks,
            _record: PhantomData,
        }
    }

    /// Decodes the record at 1-based `index`.
    pub fn get(&self, index: u32) -> Result<T, FormatError> {
        if index == 0 || index > self.total_blocks {
            return Err(FormatError::IndexOutOfRange {
                kind: T::KIND,
                index,
                total_blocks: self.total_blocks,
            });
        }
        let start = (index as usize - 1) * BLOCK_SIZE;
        let mut slot = [0u8; BLOCK_SIZE];
        slot.copy_from_slice(&self.data[start..start + BLOCK_SIZE]);
        Ok(T::decode(&slot))
    }
}
