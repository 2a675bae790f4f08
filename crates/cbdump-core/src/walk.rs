//! Bounded traversal of hash buckets → file entry chains → callback chains.
//!
//! The walk is a lazy, fused iterator over `(file entry, callback)` pairs in
//! table order. Chains in the dump are untrusted: a chain that reaches a slot
//! it already visited, or needs more steps than the pool has slots, makes the
//! walk yield [`FormatError::CycleDetected`] and stop. No slot is yielded
//! twice from the same chain.

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{ChainKind, FormatError};
use crate::snapshot::{Callback, FileEntry, Snapshot};

/// One reachable callback together with the file entry it hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallbackRef {
    /// 1-based slot of the file entry.
    pub file_slot: u32,
    pub file: FileEntry,
    /// 1-based slot of the callback.
    pub callback_slot: u32,
    pub callback: Callback,
}

/// Chain-length maxima observed during a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkStats {
    /// Longest callback chain on any single file entry.
    pub max_callbacks_per_file: u32,
    /// Longest file entry chain in any single bucket.
    pub max_files_per_bucket: u32,
    pub file_entries: u64,
    pub callbacks: u64,
}

/// Visit marks for one block pool. A slot belongs to the current chain when
/// its mark equals the current stamp, so marks never need clearing.
struct Visited {
    marks: Vec<u64>,
    stamp: u64,
}

impl Visited {
    fn new(total_blocks: u32) -> Self {
        Self {
            marks: vec![0; total_blocks as usize + 1],
            stamp: 0,
        }
    }

    fn start_chain(&mut self) {
        self.stamp += 1;
    }

    /// Marks `slot` for the current chain. Returns false when it was already
    /// marked. `slot` has been range-checked by the arena.
    fn insert(&mut self, slot: u32) -> bool {
        let mark = &mut self.marks[slot as usize];
        if *mark == self.stamp {
            return false;
        }
        *mark = self.stamp;
        true
    }
}

struct FileCursor {
    slot: u32,
    entry: FileEntry,
    next_callback: u32,
    callback_steps: u32,
}

/// Iterator over every reachable [`CallbackRef`].
pub struct Walk<'a> {
    snapshot: &'a Snapshot,
    next_bucket: usize,
    bucket_head: u32,
    file_steps: u32,
    current: Option<FileCursor>,
    seen_files: Visited,
    seen_callbacks: Visited,
    stats: WalkStats,
    done: bool,
}

impl<'a> Walk<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            next_bucket: 0,
            bucket_head: 0,
            file_steps: 0,
            current: None,
            seen_files: Visited::new(snapshot.total_blocks()),
            seen_callbacks: Visited::new(snapshot.total_blocks()),
            stats: WalkStats::default(),
            done: false,
        }
    }

    /// Maxima over the part of the walk consumed so far; final once the
    /// iterator has returned `None`.
    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    fn limit(&self) -> u32 {
        self.snapshot.total_blocks()
    }

    fn file_cycle(&self) -> FormatError {
        FormatError::CycleDetected {
            chain: ChainKind::FileEntry,
            head: self.bucket_head,
            limit: self.limit(),
        }
    }

    fn enter_file(&mut self, slot: u32) -> Result<(), FormatError> {
        let entry = self.snapshot.file_entry(slot)?;
        self.file_steps += 1;
        if self.file_steps > self.limit() || !self.seen_files.insert(slot) {
            return Err(self.file_cycle());
        }
        trace!(slot, volume = entry.volume, "walk: file entry");
        self.stats.file_entries += 1;
        self.stats.max_files_per_bucket = self.stats.max_files_per_bucket.max(self.file_steps);
        self.seen_callbacks.start_chain();
        self.current = Some(FileCursor {
            slot,
            entry,
            next_callback: entry.first_callback,
            callback_steps: 0,
        });
        Ok(())
    }

    fn step(&mut self) -> Result<Option<CallbackRef>, FormatError> {
        let limit = self.limit();
        loop {
            if let Some(cursor) = self.current.as_mut() {
                if cursor.next_callback != 0 {
                    let callback_slot = cursor.next_callback;
                    let callback = self.snapshot.callback(callback_slot)?;
                    cursor.callback_steps += 1;
                    if cursor.callback_steps > limit || !self.seen_callbacks.insert(callback_slot) {
                        return Err(FormatError::CycleDetected {
                            chain: ChainKind::Callback,
                            head: cursor.entry.first_callback,
                            limit,
                        });
                    }
                    cursor.next_callback = callback.next;

                    self.stats.callbacks += 1;
                    self.stats.max_callbacks_per_file =
                        self.stats.max_callbacks_per_file.max(cursor.callback_steps);
                    return Ok(Some(CallbackRef {
                        file_slot: cursor.slot,
                        file: cursor.entry,
                        callback_slot,
                        callback,
                    }));
                }

                let next_file = cursor.entry.next;
                self.current = None;
                if next_file != 0 {
                    self.enter_file(next_file)?;
                }
                continue;
            }

            let buckets = self.snapshot.buckets();
            let Some(offset) = buckets[self.next_bucket..].iter().position(|&head| head != 0) else {
                self.next_bucket = buckets.len();
                return Ok(None);
            };
            let bucket = self.next_bucket + offset;
            self.next_bucket = bucket + 1;
            self.bucket_head = buckets[bucket];
            self.file_steps = 0;
            self.seen_files.start_chain();
            trace!(bucket, head = self.bucket_head, "walk: bucket");
            self.enter_file(self.bucket_head)?;
        }
    }
}

impl Iterator for Walk<'_> {
    type Item = Result<CallbackRef, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(pair)) => Some(Ok(pair)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                warn!(error = %err, "walk: aborting traversal");
                self.done = true;
                self.current = None;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for Walk<'_> {}

impl Snapshot {
    /// Starts a fresh traversal. Each call re-walks from the first bucket.
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(self)
    }
}
