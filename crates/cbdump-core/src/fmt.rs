//! Number and time formatting shared by the text reports.

use chrono::{DateTime, Utc};

/// Pool sizes in binary units (`"512 B"`, `"2.0 KiB"`, `"1.5 MiB"`), as shown
/// on the memory line of the stats report.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KiB", "MiB", "GiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Dump capture time in UTC. Timestamps chrono cannot represent are shown
/// as the raw number.
pub fn fmt_ts(ts: i64) -> String {
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}

/// Share of `total` taken by `part`, in percent; an empty pool is 0%.
pub fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024 / 2), "1.5 MiB");
        assert_eq!(human_bytes(5 * 1024 * 1024 * 1024), "5.0 GiB");
        assert_eq!(human_bytes(2048 * 1024 * 1024 * 1024), "2048.0 GiB");
    }

    #[test]
    fn test_fmt_ts() {
        assert_eq!(fmt_ts(0), "1970-01-01 00:00:00");
        assert_eq!(fmt_ts(1_700_000_000), "2023-11-14 22:13:20");
        assert_eq!(fmt_ts(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_pct() {
        assert_eq!(pct(1, 4), 25.0);
        assert_eq!(pct(5, 0), 0.0);
    }
}
