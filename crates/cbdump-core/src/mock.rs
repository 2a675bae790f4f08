//! Synthetic dump images for tests.
//!
//! [`SnapshotImage`] lays out block pools and chains the way a file server
//! would, then serializes them in the dump format so the decoder can be
//! exercised end to end. Fields are public so tests can corrupt links after
//! building a valid image.

use crate::snapshot::layout::{DEFAULT_HASH_SIZE, TIMEOUT_INTERVALS, TIMEOUT_QUEUES};
use crate::snapshot::{Callback, Counters, FileEntry, FormatVersion};

/// Builder for a dump image with `total_blocks` slots per pool.
#[derive(Debug, Clone)]
pub struct SnapshotImage {
    pub version: FormatVersion,
    pub timestamp: u32,
    pub counters: Counters,
    pub timeout_intervals: [u32; TIMEOUT_INTERVALS],
    pub timeout_queues: Vec<u32>,
    pub first_timeout: u32,
    pub free_callbacks: u32,
    pub free_file_entries: u32,
    pub buckets: Vec<u32>,
    /// Slot `i` holds block index `i + 1`.
    pub callbacks: Vec<Callback>,
    pub file_entries: Vec<FileEntry>,
}

impl SnapshotImage {
    pub fn new(version: FormatVersion, total_blocks: u32) -> Self {
        Self {
            version,
            timestamp: 1_700_000_000,
            counters: Counters {
                n_blocks: total_blocks,
                ..Counters::default()
            },
            timeout_intervals: [0; TIMEOUT_INTERVALS],
            timeout_queues: vec![0; TIMEOUT_QUEUES],
            first_timeout: 0,
            free_callbacks: 0,
            free_file_entries: 0,
            buckets: vec![0; DEFAULT_HASH_SIZE as usize],
            callbacks: vec![Callback::default(); total_blocks as usize],
            file_entries: vec![FileEntry::default(); total_blocks as usize],
        }
    }

    /// Sets the bucket count. Only version 3 images record it; versions 1
    /// and 2 are always written with the default table size.
    pub fn with_hash_size(mut self, hash_size: u32) -> Self {
        self.buckets.resize(hash_size as usize, 0);
        self
    }

    /// Allocates the next free callback slot for `host` and returns its index.
    pub fn add_callback(&mut self, host: u32) -> u32 {
        let index = self.counters.n_callbacks + 1;
        assert!(index <= self.counters.n_blocks, "callback pool exhausted");
        self.counters.n_callbacks = index;
        self.callbacks[index as usize - 1] = Callback {
            host_head: host,
            ..Callback::default()
        };
        index
    }

    /// Allocates a file entry and links `callbacks` into its chain, in order.
    pub fn add_file_entry(&mut self, volume: u32, vnode: u32, unique: u32, callbacks: &[u32]) -> u32 {
        let index = self.counters.n_file_entries + 1;
        assert!(index <= self.counters.n_blocks, "file entry pool exhausted");
        self.counters.n_file_entries = index;
        self.file_entries[index as usize - 1] = FileEntry {
            vnode,
            unique,
            volume,
            callback_count: callbacks.len() as u32,
            first_callback: callbacks.first().copied().unwrap_or(0),
            ..FileEntry::default()
        };
        for (pos, &cb) in callbacks.iter().enumerate() {
            let next = callbacks.get(pos + 1).copied().unwrap_or(0);
            let callback = self.callback_mut(cb);
            callback.file_head = index;
            callback.next = next;
        }
        index
    }

    /// Makes `entries` the chain of `bucket`, in order.
    pub fn chain_bucket(&mut self, bucket: usize, entries: &[u32]) {
        self.buckets[bucket] = entries.first().copied().unwrap_or(0);
        for (pos, &fe) in entries.iter().enumerate() {
            let next = entries.get(pos + 1).copied().unwrap_or(0);
            self.file_entry_mut(fe).next = next;
        }
    }

    pub fn file_entry_mut(&mut self, index: u32) -> &mut FileEntry {
        &mut self.file_entries[index as usize - 1]
    }

    pub fn callback_mut(&mut self, index: u32) -> &mut Callback {
        &mut self.callbacks[index as usize - 1]
    }

    /// Serializes the image in dump format.
    pub fn encode(&self) -> Vec<u8> {
        fn put(out: &mut Vec<u8>, v: u32) {
            out.extend_from_slice(&v.to_le_bytes());
        }

        let mut out = Vec::new();

        put(&mut out, self.version.magic());
        put(&mut out, self.timestamp);
        for w in self.counters.to_words() {
            put(&mut out, w);
        }

        let mut buckets = self.buckets.clone();
        if self.version.stores_hash_size() {
            put(&mut out, buckets.len() as u32);
        } else {
            buckets.resize(DEFAULT_HASH_SIZE as usize, 0);
        }

        for &w in &self.timeout_intervals {
            put(&mut out, w);
        }
        for &w in &self.timeout_queues {
            put(&mut out, w);
        }
        put(&mut out, self.first_timeout);
        put(&mut out, self.free_callbacks);
        put(&mut out, self.free_file_entries);
        for w in buckets {
            put(&mut out, w);
        }

        for cb in &self.callbacks {
            put(&mut out, cb.next);
            put(&mut out, cb.file_head);
            out.extend_from_slice(&[cb.timeout_head, cb.status, cb.flags, cb.spare]);
            put(&mut out, cb.host_head);
            put(&mut out, cb.timeout_prev);
            put(&mut out, cb.timeout_next);
            put(&mut out, cb.host_prev);
            put(&mut out, cb.host_next);
        }
        for fe in &self.file_entries {
            for w in [
                fe.vnode,
                fe.unique,
                fe.volume,
                fe.next,
                fe.callback_count,
                fe.first_callback,
                fe.status,
                fe.spare,
            ] {
                put(&mut out, w);
            }
        }
        out
    }
}
