//! Decoder and analysis for file-server callback state dumps.
//!
//! A dump is a little-endian image of the server's callback tables: a header
//! of counters, the file-entry hash table and two fixed-size block pools.
//! [`Snapshot`] decodes and validates the image, [`Snapshot::walk`] follows
//! the bucket, file-entry and callback chains with cycle protection, and
//! [`Aggregate`] counts what the walk finds per host and volume. Host indices
//! are resolved through a [`HostTable`] parsed from the companion host dump.

pub mod aggregate;
pub mod error;
pub mod fmt;
pub mod hosts;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod report;
pub mod snapshot;
pub mod walk;

pub use aggregate::{Aggregate, PairFilter, Tally};
pub use error::{Error, FormatError, Result};
pub use hosts::{HostLookup, HostRecord, HostTable, NoHosts};
pub use snapshot::{Callback, FileEntry, FormatVersion, Snapshot};
pub use walk::{CallbackRef, Walk, WalkStats};
