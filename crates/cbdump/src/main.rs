//! cbdump: inspect file-server callback state dumps.

mod render;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{Level, debug};
use tracing_subscriber::EnvFilter;

use cbdump_core::{HostLookup, HostTable, NoHosts, PairFilter, Snapshot};

use render::{ReportKind, ReportOptions};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "cbdump", about = "Decode and summarize a callback state dump")]
struct Cli {
    /// Path to the binary callback dump
    snapshot: PathBuf,

    /// Host table dump used to resolve host indices to addresses
    #[arg(long)]
    hosts: Option<PathBuf>,

    /// Report to print
    #[arg(long, value_enum, default_value_t = ReportKind::Stats)]
    report: ReportKind,

    /// Show at most N rows
    #[arg(long, value_name = "N")]
    limit: Option<usize>,

    /// Count only callbacks on this volume
    #[arg(long, value_name = "ID")]
    volume: Option<u32>,

    /// Count only callbacks held by this host index
    #[arg(long, value_name = "HIDX")]
    host: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["cbdump", "cbdump_core"] {
        if let Ok(directive) = format!("{target}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = Snapshot::open(&cli.snapshot)?;
    let table = cli.hosts.as_ref().map(HostTable::open).transpose()?;
    let hosts: &dyn HostLookup = match &table {
        Some(table) => table,
        None => &NoHosts,
    };

    let opts = ReportOptions {
        limit: cli.limit,
        filter: PairFilter {
            volume: cli.volume,
            host: cli.host,
        },
    };
    debug!(report = ?cli.report, ?opts, "building report");
    let report = render::build(&snapshot, hosts, cli.report, opts)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        render::write_json(&mut out, &report)?;
    } else {
        render::write_text(&mut out, &report)?;
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "cbdump",
            "dump.bin",
            "--hosts",
            "hosts.txt",
            "--report",
            "host-volume",
            "--limit",
            "10",
            "--volume",
            "536870913",
            "-vv",
        ]);
        assert_eq!(cli.snapshot, PathBuf::from("dump.bin"));
        assert_eq!(cli.report, ReportKind::HostVolume);
        assert_eq!(cli.limit, Some(10));
        assert_eq!(cli.volume, Some(536870913));
        assert_eq!(cli.host, None);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.json);
    }

    #[test]
    fn test_run_reports_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from(["cbdump", dir.path().join("missing").to_str().unwrap()]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_run_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.bin");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let cli = Cli::parse_from(["cbdump", path.to_str().unwrap()]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("unrecognized magic"));
    }
}
