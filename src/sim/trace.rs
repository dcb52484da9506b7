use anyhow::{anyhow, Context};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::mem::request::{AccessKind, Addr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecord {
    pub kind: AccessKind,
    pub addr: Addr,
}

/// Parse one trace line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> anyhow::Result<Option<TraceRecord>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut fields = line.split_whitespace();
    let kind = fields.next().ok_or_else(|| anyhow!("missing access type"))?;
    let addr = fields.next().ok_or_else(|| anyhow!("missing address"))?;
    if let Some(extra) = fields.next() {
        return Err(anyhow!("unexpected field '{}'", extra));
    }

    let kind: AccessKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let digits = addr
        .strip_prefix("0x")
        .or_else(|| addr.strip_prefix("0X"))
        .unwrap_or(addr);
    let addr = Addr::from_str_radix(digits, 16)
        .with_context(|| format!("invalid hex address '{}'", addr))?;
    Ok(Some(TraceRecord { kind, addr }))
}

pub fn parse_trace<R: BufRead>(reader: R) -> anyhow::Result<Vec<TraceRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("cannot read trace line {}", idx + 1))?;
        if let Some(record) =
            parse_line(&line).with_context(|| format!("trace line {}: '{}'", idx + 1, line))?
        {
            records.push(record);
        }
    }
    Ok(records)
}

pub fn read_trace(path: &Path) -> anyhow::Result<Vec<TraceRecord>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open trace file {}", path.display()))?;
    parse_trace(BufReader::new(file))
        .with_context(|| format!("failed to parse trace file {}", path.display()))
}
