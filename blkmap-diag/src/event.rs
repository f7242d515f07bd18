// SPDX-License-Identifier: MIT

//! GEOM I/O error records, as logged by the kernel:
//!
//! ```text
//! Oct 12 03:14:07 kernel: GEOM_DISK: g_disk_done() failed ad0s1d[READ(offset=131072, length=512)]
//! ```

use std::io::BufRead;

use time::PrimitiveDateTime;

use crate::{error::EventParseError, timestamp::StampParser};

const FACILITY_PREFIX: &str = "GEOM_";
const FAILED: &str = " failed ";
const OFFSET_OPEN: &str = "(offset=";
const LENGTH_OPEN: &str = "length=";
const RECORD_CLOSE: &str = ")]";

/// One reported I/O failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub timestamp: Option<PrimitiveDateTime>,
    pub device: String,
    pub operation: String,
    pub offset: u64,
    pub length: u64,
}

/// Borrowed fields of one structural match, numerals still unparsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RawRecord<'a> {
    device: &'a str,
    operation: &'a str,
    offset: &'a str,
    length: &'a str,
}

fn is_space(c: char) -> bool {
    c.is_whitespace()
}

/// Splits off the leading run of non-whitespace characters.
fn token(s: &str) -> (&str, &str) {
    let end = s.find(is_space).unwrap_or(s.len());
    s.split_at(end)
}

fn leading_digits(s: &str) -> (&str, &str) {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    s.split_at(end)
}

/// `GEOM_X: ` at the very start of `s`; returns what follows.
fn facility(s: &str) -> Option<&str> {
    let (tok, rest) = token(s);
    let name = tok.strip_suffix(':')?;
    if name.len() <= FACILITY_PREFIX.len() {
        return None;
    }
    rest.strip_prefix(' ')
}

/// `<dev>[<OP>(offset=<N>,` as a single token.
fn device_op_offset(tok: &str) -> Option<(&str, &str, &str)> {
    let head = tok.strip_suffix(',')?;
    let at = head.rfind(OFFSET_OPEN)?;
    let offset = &head[at + OFFSET_OPEN.len()..];
    if offset.is_empty() || !offset.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let dev_op = &head[..at];
    // Rightmost bracket that still leaves a non-empty operation.
    let mut bracket = dev_op.rfind('[')?;
    if bracket + 1 == dev_op.len() {
        bracket = dev_op[..bracket].rfind('[')?;
    }
    let device = &dev_op[..bracket];
    let operation = &dev_op[bracket + 1..];
    if device.is_empty() || operation.is_empty() || operation.contains(is_space) {
        return None;
    }

    Some((device, operation, offset))
}

/// Tries to match one record starting exactly at `s`.
/// Returns the record and the unconsumed remainder.
fn match_at(s: &str) -> Option<(RawRecord<'_>, &str)> {
    let rest = facility(s)?;

    let (function, rest) = token(rest);
    if function.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(FAILED)?;

    let (tok, rest) = token(rest);
    let (device, operation, offset) = device_op_offset(tok)?;

    let rest = rest.strip_prefix(' ')?.strip_prefix(LENGTH_OPEN)?;
    let (length, rest) = leading_digits(rest);
    if length.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(RECORD_CLOSE)?;

    Some((
        RawRecord {
            device,
            operation,
            offset,
            length,
        },
        rest,
    ))
}

/// Every non-overlapping record in `line`, left to right.
fn scan(line: &str) -> Vec<RawRecord<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(hit) = line[pos..].find(FACILITY_PREFIX) {
        let start = pos + hit;
        match match_at(&line[start..]) {
            Some((record, rest)) => {
                found.push(record);
                pos = line.len() - rest.len();
            }
            None => pos = start + 1,
        }
    }

    found
}

fn number(
    digits: &str,
    field: &'static str,
    line_no: usize,
) -> Result<u64, EventParseError> {
    digits.parse().map_err(|_| EventParseError::Overflow {
        line: line_no,
        field,
        digits: digits.to_string(),
    })
}

/// Turns log text into [`ErrorEvent`]s.
#[derive(Debug, Clone, Copy)]
pub struct EventParser {
    stamps: StampParser,
}

impl EventParser {
    pub fn new(stamps: StampParser) -> Self {
        Self { stamps }
    }

    /// Events found in one line; `line_no` is 1-based and only used for errors.
    pub fn parse_line(&self, line: &str, line_no: usize) -> Result<Vec<ErrorEvent>, EventParseError> {
        let records = scan(line);
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let timestamp = self.stamps.parse(line);
        records
            .into_iter()
            .map(|raw| {
                Ok(ErrorEvent {
                    timestamp,
                    device: raw.device.to_string(),
                    operation: raw.operation.to_string(),
                    offset: number(raw.offset, "offset", line_no)?,
                    length: number(raw.length, "length", line_no)?,
                })
            })
            .collect()
    }

    pub fn parse_str(&self, text: &str) -> Result<Vec<ErrorEvent>, EventParseError> {
        let mut events = Vec::new();
        for (i, line) in text.lines().enumerate() {
            events.extend(self.parse_line(line, i + 1)?);
        }
        Ok(events)
    }

    /// Reads lines until EOF. Lines that are not valid UTF-8 are decoded lossily.
    pub fn parse_reader<R: BufRead>(&self, mut reader: R) -> Result<Vec<ErrorEvent>, EventParseError> {
        let mut events = Vec::new();
        let mut buf = Vec::new();
        let mut line_no = 0;

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| EventParseError::Io {
                    line: line_no,
                    reason: e.to_string(),
                })?;
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = String::from_utf8_lossy(&buf);
            events.extend(self.parse_line(line.trim_end_matches(['\n', '\r']), line_no)?);
        }

        log::debug!("{line_no} lines read, {} events", events.len());
        Ok(events)
    }
}
