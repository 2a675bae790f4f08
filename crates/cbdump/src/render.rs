//! Report assembly and text/JSON rendering.

use std::io::{self, Write};

use serde::Serialize;

use cbdump_core::fmt::{human_bytes, pct};
use cbdump_core::report::{
    self, CallbackRow, HostRow, HostVolumeRow, Summary, VolumeRow,
};
use cbdump_core::{Aggregate, FormatError, HostLookup, PairFilter, Snapshot};

/// Which table to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportKind {
    Stats,
    HostVolume,
    Host,
    Volume,
    Callbacks,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    pub limit: Option<usize>,
    pub filter: PairFilter,
}

/// One rendered report; serializes as `{"report": "...", "rows": ...}`.
#[derive(Debug, Serialize)]
#[serde(tag = "report", content = "rows", rename_all = "kebab-case")]
pub enum Report {
    Stats(Summary),
    HostVolume(Vec<HostVolumeRow>),
    Host(Vec<HostRow>),
    Volume(Vec<VolumeRow>),
    Callbacks(Vec<CallbackRow>),
}

/// Walks `snapshot` once and builds the requested report.
pub fn build<H: HostLookup + ?Sized>(
    snapshot: &Snapshot,
    hosts: &H,
    kind: ReportKind,
    opts: ReportOptions,
) -> Result<Report, FormatError> {
    let mut callbacks = Vec::new();
    let agg = Aggregate::collect_filtered(snapshot, opts.filter, |pair| {
        if kind == ReportKind::Callbacks && opts.limit.is_none_or(|n| callbacks.len() < n) {
            callbacks.push(CallbackRow::new(pair, hosts));
        }
    })?;

    Ok(match kind {
        ReportKind::Stats => Report::Stats(Summary::new(snapshot, &agg)),
        ReportKind::HostVolume => {
            Report::HostVolume(report::host_volume_rows(&agg, hosts, opts.limit))
        }
        ReportKind::Host => Report::Host(report::host_rows(&agg, hosts, opts.limit)),
        ReportKind::Volume => Report::Volume(report::volume_rows(&agg, opts.limit)),
        ReportKind::Callbacks => Report::Callbacks(callbacks),
    })
}

pub fn write_json(out: &mut impl Write, report: &Report) -> io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(io::Error::other)?;
    writeln!(out, "{json}")
}

pub fn write_text(out: &mut impl Write, report: &Report) -> io::Result<()> {
    match report {
        Report::Stats(s) => write_stats(out, s),
        Report::HostVolume(rows) => {
            writeln!(out, "{:<16} {:>6} {:>12} {:>10}", "Host", "Index", "Volume", "Callbacks")?;
            writeln!(out, "{}", "─".repeat(47))?;
            for r in rows {
                writeln!(
                    out,
                    "{:<16} {:>6} {:>12} {:>10}",
                    r.address, r.host, r.volume, r.count
                )?;
            }
            Ok(())
        }
        Report::Host(rows) => {
            writeln!(out, "{:<16} {:>6} {:>10}", "Host", "Index", "Callbacks")?;
            writeln!(out, "{}", "─".repeat(34))?;
            for r in rows {
                writeln!(out, "{:<16} {:>6} {:>10}", r.address, r.host, r.count)?;
            }
            Ok(())
        }
        Report::Volume(rows) => {
            writeln!(out, "{:>12} {:>10}", "Volume", "Callbacks")?;
            writeln!(out, "{}", "─".repeat(23))?;
            for r in rows {
                writeln!(out, "{:>12} {:>10}", r.volume, r.count)?;
            }
            Ok(())
        }
        Report::Callbacks(rows) => {
            writeln!(
                out,
                "{:<28} {:>8} {:<16} {:>6} {:>6} {:>5} {:>7}",
                "Fid", "Slot", "Host", "Index", "Status", "Flags", "Timeout"
            )?;
            writeln!(out, "{}", "─".repeat(82))?;
            for r in rows {
                writeln!(
                    out,
                    "{:<28} {:>8} {:<16} {:>6} {:>6} {:>5} {:>7}",
                    r.fid, r.callback_slot, r.address, r.host, r.status, r.flags, r.timeout_head
                )?;
            }
            Ok(())
        }
    }
}

fn write_stats(out: &mut impl Write, s: &Summary) -> io::Result<()> {
    writeln!(out, "Format:       version {}", s.version)?;
    writeln!(out, "Captured:     {} UTC ({})", s.captured_at, s.timestamp)?;
    writeln!(
        out,
        "Hash table:   {} buckets, {} in use",
        s.hash_size, s.buckets_in_use
    )?;
    writeln!(
        out,
        "Timeouts:     {} queues in use, first timeout {}",
        s.timeout_queues_in_use, s.first_timeout
    )?;
    let intervals: Vec<String> = s.timeout_intervals.iter().map(u32::to_string).collect();
    writeln!(out, "Intervals:    {}", intervals.join(" "))?;
    writeln!(
        out,
        "Free lists:   callbacks {}, file entries {}",
        s.free_callbacks, s.free_file_entries
    )?;
    writeln!(
        out,
        "Memory:       {} allocated, {} used ({:.1}%), {} available",
        human_bytes(s.memory_allocated),
        human_bytes(s.memory_used),
        pct(s.memory_used, s.memory_allocated),
        human_bytes(s.memory_available)
    )?;

    writeln!(out, "\nCounters:")?;
    for (name, value) in s.counters.named() {
        writeln!(out, "  {name:<20} {value:>12}")?;
    }

    writeln!(out, "\nWalk:")?;
    writeln!(out, "  {:<28} {:>10}", "file entries", s.file_entries_walked)?;
    writeln!(out, "  {:<28} {:>10}", "callbacks", s.callbacks_walked)?;
    writeln!(out, "  {:<28} {:>10}", "pairs counted", s.pairs)?;
    writeln!(out, "  {:<28} {:>10}", "max callbacks per file", s.max_callbacks_per_file)?;
    writeln!(out, "  {:<28} {:>10}", "max file entries per bucket", s.max_files_per_bucket)?;
    writeln!(out, "  {:<28} {:>10}", "distinct hosts", s.distinct_hosts)?;
    writeln!(out, "  {:<28} {:>10}", "distinct volumes", s.distinct_volumes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbdump_core::hosts::{HostTable, NoHosts};
    use cbdump_core::mock::SnapshotImage;
    use cbdump_core::FormatVersion;

    fn snapshot() -> Snapshot {
        let mut image = SnapshotImage::new(FormatVersion::V2, 8);
        let a = image.add_callback(1);
        let b = image.add_callback(2);
        let c = image.add_callback(2);
        let f1 = image.add_file_entry(7, 1, 1, &[a, b]);
        let f2 = image.add_file_entry(9, 4, 2, &[c]);
        image.chain_bucket(5, &[f1, f2]);
        Snapshot::decode(&image.encode()).unwrap()
    }

    fn hosts() -> HostTable {
        HostTable::parse("ip:0a000001 port:7001 hidx:1 cbid:3 hcps [ ] [ ]").unwrap()
    }

    fn text(report: &Report) -> String {
        let mut out = Vec::new();
        write_text(&mut out, report).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_stats_text() {
        let report = build(&snapshot(), &NoHosts, ReportKind::Stats, ReportOptions::default())
            .unwrap();
        let out = text(&report);
        assert!(out.contains("Format:       version 2"));
        assert!(out.contains("2023-11-14 22:13:20 UTC"));
        assert!(out.contains("512 buckets, 1 in use"));
        assert!(out.contains("Intervals:    0 0 0 0 0 0 0 0"));
        assert!(out.contains("nblks"));
        assert!(out.contains("max file entries per bucket"));
    }

    #[test]
    fn test_host_report_resolves_addresses() {
        let report = build(&snapshot(), &hosts(), ReportKind::Host, ReportOptions::default())
            .unwrap();
        let out = text(&report);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("unknown"));
        assert!(lines[3].starts_with("10.0.0.1"));
    }

    #[test]
    fn test_limit_and_filter() {
        let opts = ReportOptions {
            limit: Some(1),
            filter: PairFilter {
                volume: Some(7),
                host: None,
            },
        };
        let Report::HostVolume(rows) =
            build(&snapshot(), &NoHosts, ReportKind::HostVolume, opts).unwrap()
        else {
            panic!("wrong report kind");
        };
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].host, rows[0].volume, rows[0].count), (1, 7, 1));
    }

    #[test]
    fn test_callbacks_in_walk_order_with_limit() {
        let opts = ReportOptions {
            limit: Some(2),
            ..ReportOptions::default()
        };
        let Report::Callbacks(rows) =
            build(&snapshot(), &hosts(), ReportKind::Callbacks, opts).unwrap()
        else {
            panic!("wrong report kind");
        };
        let fids: Vec<&str> = rows.iter().map(|r| r.fid.as_str()).collect();
        assert_eq!(fids, vec!["7.1.1", "7.1.1"]);
        assert_eq!(rows[0].address, "10.0.0.1");
    }

    #[test]
    fn test_json_is_tagged() {
        let report = build(&snapshot(), &NoHosts, ReportKind::Volume, ReportOptions::default())
            .unwrap();
        let mut out = Vec::new();
        write_json(&mut out, &report).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["report"], "volume");
        assert_eq!(value["rows"][0]["volume"], 7);
        assert_eq!(value["rows"][0]["count"], 2);
    }

    #[test]
    fn test_corrupt_chain_fails_build() {
        let mut image = SnapshotImage::new(FormatVersion::V1, 2);
        let cb = image.add_callback(1);
        let fe = image.add_file_entry(1, 1, 1, &[cb]);
        image.chain_bucket(0, &[fe]);
        image.callback_mut(cb).next = cb;
        let snap = Snapshot::decode(&image.encode()).unwrap();
        let err = build(&snap, &NoHosts, ReportKind::Stats, ReportOptions::default()).unwrap_err();
        assert!(matches!(err, FormatError::CycleDetected { .. }));
    }
}
