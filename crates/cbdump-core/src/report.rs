//! Report rows built from an [`Aggregate`] and a host lookup.
//!
//! Rows are plain serializable data; rendering them as text or JSON is the
//! caller's job. Host indices that the lookup cannot resolve are reported
//! with the [`UNKNOWN_HOST`] address instead of failing the report.

use serde::Serialize;

use crate::aggregate::Aggregate;
use crate::fmt::fmt_ts;
use crate::hosts::HostLookup;
use crate::snapshot::layout::TIMEOUT_INTERVALS;
use crate::snapshot::{Counters, Snapshot};
use crate::walk::CallbackRef;

/// Address shown for host indices missing from the host table.
pub const UNKNOWN_HOST: &str = "unknown";

pub fn resolve_address<H: HostLookup + ?Sized>(hosts: &H, index: u32) -> String {
    hosts
        .host_by_index(index)
        .map(|h| h.address.clone())
        .unwrap_or_else(|| UNKNOWN_HOST.to_string())
}

/// Flat summary of the dump header and walk statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub version: u32,
    pub timestamp: u32,
    pub captured_at: String,
    pub counters: Counters,
    pub hash_size: usize,
    pub buckets_in_use: usize,
    /// Timeout interval table, in seconds, as recorded by the server.
    pub timeout_intervals: [u32; TIMEOUT_INTERVALS],
    pub timeout_queues_in_use: usize,
    pub first_timeout: u32,
    pub free_callbacks: u32,
    pub free_file_entries: u32,
    pub memory_allocated: u64,
    pub memory_used: u64,
    pub memory_available: u64,
    pub max_callbacks_per_file: u32,
    pub max_files_per_bucket: u32,
    pub file_entries_walked: u64,
    pub callbacks_walked: u64,
    /// Pairs that passed the filter.
    pub pairs: u64,
    pub distinct_hosts: usize,
    pub distinct_volumes: usize,
}

impl Summary {
    pub fn new(snapshot: &Snapshot, agg: &Aggregate) -> Self {
        Self {
            version: snapshot.version().number(),
            timestamp: snapshot.timestamp(),
            captured_at: fmt_ts(snapshot.timestamp() as i64),
            counters: *snapshot.counters(),
            hash_size: snapshot.buckets().len(),
            buckets_in_use: snapshot.buckets_in_use(),
            timeout_intervals: *snapshot.timeout_intervals(),
            timeout_queues_in_use: snapshot.timeout_queues_in_use(),
            first_timeout: snapshot.first_timeout(),
            free_callbacks: snapshot.free_callbacks(),
            free_file_entries: snapshot.free_file_entries(),
            memory_allocated: snapshot.memory_allocated(),
            memory_used: snapshot.memory_used(),
            memory_available: snapshot.memory_available(),
            max_callbacks_per_file: agg.walk.max_callbacks_per_file,
            max_files_per_bucket: agg.walk.max_files_per_bucket,
            file_entries_walked: agg.walk.file_entries,
            callbacks_walked: agg.walk.callbacks,
            pairs: agg.pairs,
            distinct_hosts: agg.distinct_hosts(),
            distinct_volumes: agg.distinct_volumes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostVolumeRow {
    pub address: String,
    pub host: u32,
    pub volume: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRow {
    pub address: String,
    pub host: u32,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeRow {
    pub volume: u32,
    pub count: u64,
}

/// One callback in walk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackRow {
    pub fid: String,
    pub file_slot: u32,
    pub callback_slot: u32,
    pub host: u32,
    pub address: String,
    pub status: u8,
    pub flags: u8,
    pub timeout_head: u8,
}

impl CallbackRow {
    pub fn new<H: HostLookup + ?Sized>(pair: &CallbackRef, hosts: &H) -> Self {
        Self {
            fid: pair.file.fid(),
            file_slot: pair.file_slot,
            callback_slot: pair.callback_slot,
            host: pair.callback.host_head,
            address: resolve_address(hosts, pair.callback.host_head),
            status: pair.callback.status,
            flags: pair.callback.flags,
            timeout_head: pair.callback.timeout_head,
        }
    }
}

pub fn host_volume_rows<H: HostLookup + ?Sized>(
    agg: &Aggregate,
    hosts: &H,
    limit: Option<usize>,
) -> Vec<HostVolumeRow> {
    agg.by_host_volume
        .sorted(limit)
        .into_iter()
        .map(|((host, volume), count)| HostVolumeRow {
            address: resolve_address(hosts, host),
            host,
            volume,
            count,
        })
        .collect()
}

pub fn host_rows<H: HostLookup + ?Sized>(
    agg: &Aggregate,
    hosts: &H,
    limit: Option<usize>,
) -> Vec<HostRow> {
    agg.by_host
        .sorted(limit)
        .into_iter()
        .map(|(host, count)| HostRow {
            address: resolve_address(hosts, host),
            host,
            count,
        })
        .collect()
}

pub fn volume_rows(agg: &Aggregate, limit: Option<usize>) -> Vec<VolumeRow> {
    agg.by_volume
        .sorted(limit)
        .into_iter()
        .map(|(volume, count)| VolumeRow { volume, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::{HostTable, NoHosts};
    use crate::mock::SnapshotImage;
    use crate::snapshot::FormatVersion;

    fn fixture() -> (Snapshot, Aggregate) {
        let mut image = SnapshotImage::new(FormatVersion::V3, 8).with_hash_size(4);
        let a = image.add_callback(1);
        let b = image.add_callback(2);
        let c = image.add_callback(2);
        let f1 = image.add_file_entry(536870913, 1, 1, &[a, b]);
        let f2 = image.add_file_entry(536870916, 5, 2, &[c]);
        image.chain_bucket(0, &[f1]);
        image.chain_bucket(2, &[f2]);
        image.callback_mut(c).status = 1;
        image.callback_mut(c).timeout_head = 9;
        image.timeout_intervals = [60, 120, 240, 480, 960, 1920, 3840, 7680];
        let snap = Snapshot::decode(&image.encode()).unwrap();
        let agg = Aggregate::collect(&snap).unwrap();
        (snap, agg)
    }

    fn hosts() -> HostTable {
        HostTable::parse("ip:10.0.0.2 port:7001 hidx:2 cbid:4 hcps [ ] [ ]").unwrap()
    }

    #[test]
    fn test_summary() {
        let (snap, agg) = fixture();
        let summary = Summary::new(&snap, &agg);
        assert_eq!(summary.version, 3);
        assert_eq!(summary.captured_at, "2023-11-14 22:13:20");
        assert_eq!(summary.hash_size, 4);
        assert_eq!(summary.buckets_in_use, 2);
        assert_eq!(summary.timeout_intervals[0], 60);
        assert_eq!(summary.timeout_intervals[7], 7680);
        assert_eq!(summary.memory_allocated, 512);
        assert_eq!(summary.memory_used, 5 * 32);
        assert_eq!(summary.memory_available, 512 - 160);
        assert_eq!(summary.max_callbacks_per_file, 2);
        assert_eq!(summary.max_files_per_bucket, 1);
        assert_eq!(summary.callbacks_walked, 3);
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.distinct_hosts, 2);
        assert_eq!(summary.distinct_volumes, 2);
    }

    #[test]
    fn test_unresolved_hosts_get_placeholder() {
        let (_, agg) = fixture();
        let rows = host_rows(&agg, &hosts(), None);
        assert_eq!(
            rows,
            vec![
                HostRow {
                    address: "10.0.0.2".into(),
                    host: 2,
                    count: 2
                },
                HostRow {
                    address: UNKNOWN_HOST.into(),
                    host: 1,
                    count: 1
                },
            ]
        );
        assert!(host_rows(&agg, &NoHosts, None)
            .iter()
            .all(|r| r.address == UNKNOWN_HOST));
    }

    #[test]
    fn test_host_volume_rows_with_limit() {
        let (_, agg) = fixture();
        let rows = host_volume_rows(&agg, &hosts(), Some(2));
        assert_eq!(rows.len(), 2);
        // all counts are 1; ties ordered by (host, volume)
        assert_eq!((rows[0].host, rows[0].volume), (1, 536870913));
        assert_eq!((rows[1].host, rows[1].volume), (2, 536870913));
        assert_eq!(rows[1].address, "10.0.0.2");
    }

    #[test]
    fn test_volume_rows() {
        let (_, agg) = fixture();
        assert_eq!(
            volume_rows(&agg, None),
            vec![
                VolumeRow {
                    volume: 536870913,
                    count: 2
                },
                VolumeRow {
                    volume: 536870916,
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_callback_row() {
        let (snap, _) = fixture();
        let pair = snap.walk().last().unwrap().unwrap();
        let row = CallbackRow::new(&pair, &hosts());
        assert_eq!(row.fid, "536870916.5.2");
        assert_eq!(row.callback_slot, 3);
        assert_eq!(row.file_slot, 2);
        assert_eq!(row.address, "10.0.0.2");
        assert_eq!(row.status, 1);
        assert_eq!(row.timeout_head, 9);
    }
}
