//! Companion host table.
//!
//! The host dump is text, one record per line:
//!
//! ```text
//! ip:0a000001 port:7001 hidx:3 cbid:12 lock:0 last:1700000000 hcps [ 101 102 ] [ 0a000001:7001 ] refCount:1
//! ```
//!
//! `ip`, `port`, `hidx` and `cbid` are required, followed somewhere by
//! `hcps` and two bracketed lists: capability-set ids, then interface
//! addresses. Any other `key:value` tokens are kept verbatim. A line that
//! starts with whitespace continues the previous record, which is how
//! servers wrap long host entries.

use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, FormatError, Result};

/// One host known to the file server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostRecord {
    /// Dotted-quad address.
    pub address: String,
    pub port: u16,
    /// Host index; callbacks refer to their host by this value.
    pub index: u32,
    pub callback_id: u32,
    /// Capability-set ids.
    pub cps: Vec<i32>,
    pub interfaces: Vec<String>,
    /// Remaining `key:value` fields, in line order.
    pub fields: Vec<(String, String)>,
}

/// Resolves callback host indices to host records.
pub trait HostLookup {
    fn host_by_index(&self, index: u32) -> Option<&HostRecord>;
}

/// Lookup used when no host table was supplied; resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHosts;

impl HostLookup for NoHosts {
    fn host_by_index(&self, _index: u32) -> Option<&HostRecord> {
        None
    }
}

/// Host records keyed by host index.
#[derive(Debug, Clone, Default)]
pub struct HostTable {
    hosts: HashMap<u32, HostRecord>,
}

impl HostLookup for HostTable {
    fn host_by_index(&self, index: u32) -> Option<&HostRecord> {
        self.hosts.get(&index)
    }
}

impl HostTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let table = Self::parse(&text)?;
        debug!(path = %path.display(), hosts = table.len(), "hosts: loaded");
        Ok(table)
    }

    pub fn parse(text: &str) -> std::result::Result<Self, FormatError> {
        let mut table = HostTable::default();
        // (first line number, joined text) of the record being assembled
        let mut pending: Option<(usize, String)> = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if line.starts_with(char::is_whitespace) {
                match pending.as_mut() {
                    Some((_, joined)) => {
                        joined.push(' ');
                        joined.push_str(trimmed);
                        continue;
                    }
                    None => {
                        return Err(invalid(line_no, "continuation line without a record"));
                    }
                }
            }
            if let Some((start, joined)) = pending.take() {
                table.insert(parse_record(&joined, start)?);
            }
            pending = Some((line_no, trimmed.to_string()));
        }
        if let Some((start, joined)) = pending {
            table.insert(parse_record(&joined, start)?);
        }
        Ok(table)
    }

    fn insert(&mut self, record: HostRecord) {
        if let Some(old) = self.hosts.insert(record.index, record) {
            warn!(
                hidx = old.index,
                replaced = %old.address,
                "hosts: duplicate host index, keeping the later record"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

fn invalid(line: usize, reason: impl Into<String>) -> FormatError {
    FormatError::InvalidHostRecord {
        line,
        reason: reason.into(),
    }
}

fn parse_record(text: &str, line: usize) -> std::result::Result<HostRecord, FormatError> {
    let spaced = text.replace('[', " [ ").replace(']', " ] ");
    let mut tokens = spaced.split_whitespace();

    let mut address = None;
    let mut port = None;
    let mut index = None;
    let mut callback_id = None;
    let mut lists: Option<(Vec<i32>, Vec<String>)> = None;
    let mut fields = Vec::new();

    while let Some(tok) = tokens.next() {
        if tok == "hcps" {
            if lists.is_some() {
                return Err(invalid(line, "hcps given twice"));
            }
            let cps = take_list(&mut tokens, line, "hcps")?
                .into_iter()
                .map(|id| {
                    id.parse::<i32>()
                        .map_err(|_| invalid(line, format!("invalid cps id '{id}'")))
                })
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let interfaces = take_list(&mut tokens, line, "interface")?
                .into_iter()
                .map(str::to_string)
                .collect();
            lists = Some((cps, interfaces));
            continue;
        }
        if tok == "[" || tok == "]" {
            return Err(invalid(line, "list outside hcps"));
        }

        let (key, value) = tok
            .split_once(':')
            .ok_or_else(|| invalid(line, format!("expected key:value, got '{tok}'")))?;
        if key.is_empty() || value.is_empty() {
            return Err(invalid(line, format!("malformed field '{tok}'")));
        }
        match key {
            "ip" => address = Some(parse_address(value, line)?),
            "port" => port = Some(parse_number::<u16>(key, value, line)?),
            "hidx" => index = Some(parse_number::<u32>(key, value, line)?),
            "cbid" => callback_id = Some(parse_number::<u32>(key, value, line)?),
            _ => fields.push((key.to_string(), value.to_string())),
        }
    }

    let missing = |name: &str| invalid(line, format!("missing {name}"));
    let (cps, interfaces) = lists.ok_or_else(|| missing("hcps lists"))?;
    Ok(HostRecord {
        address: address.ok_or_else(|| missing("ip"))?,
        port: port.ok_or_else(|| missing("port"))?,
        index: index.ok_or_else(|| missing("hidx"))?,
        callback_id: callback_id.ok_or_else(|| missing("cbid"))?,
        cps,
        interfaces,
        fields,
    })
}

/// Consumes `[ tok* ]` from the token stream.
fn take_list<'a>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
    what: &str,
) -> std::result::Result<Vec<&'a str>, FormatError> {
    if tokens.next() != Some("[") {
        return Err(invalid(line, format!("expected '[' opening {what} list")));
    }
    let mut items = Vec::new();
    for tok in tokens.by_ref() {
        match tok {
            "]" => return Ok(items),
            "[" => return Err(invalid(line, format!("nested '[' in {what} list"))),
            _ => items.push(tok),
        }
    }
    Err(invalid(line, format!("unterminated {what} list")))
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    value: &str,
    line: usize,
) -> std::result::Result<T, FormatError> {
    value
        .parse()
        .map_err(|_| invalid(line, format!("invalid {key} '{value}'")))
}

/// Accepts dotted quads, or up to 8 hex digits in host byte order as
/// servers print them.
fn parse_address(value: &str, line: usize) -> std::result::Result<String, FormatError> {
    if let Ok(addr) = value.parse::<Ipv4Addr>() {
        return Ok(addr.to_string());
    }
    let hex = value.strip_prefix("0x").unwrap_or(value);
    if !hex.is_empty() && hex.len() <= 8 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        if let Ok(raw) = u32::from_str_radix(hex, 16) {
            return Ok(Ipv4Addr::from(raw).to_string());
        }
    }
    Err(invalid(line, format!("invalid ip '{value}'")))
}
