// SPDX-License-Identifier: MIT

//! Parser for the indented text dump produced by `ffsinfo -l 1`.
//!
//! The dump is line oriented. Groups are opened by a `==== START <title> ====`
//! banner whose following line (`# <indent>@<addr>: <word> <name>`) gives the
//! group its name, and closed by a matching `==== END <title> ====` banner.
//! Everything else is either a comment or a `<name> <type> <value>` field.
//!
//! Only a handful of superblock leaves are consumed downstream, but the whole
//! tree is kept so callers can inspect any other field.

use std::collections::BTreeMap;

/// A single value read from the dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpValue {
    Int(i64),
    Str(String),
    Array(Vec<i64>),
    Group(DumpGroup),
}

/// A named set of fields, possibly containing nested groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpGroup {
    fields: BTreeMap<String, DumpValue>,
}

impl DumpGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&mut self, name: S, value: DumpValue) {
        self.fields.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&DumpValue> {
        self.fields.get(name)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            DumpValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            DumpValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<&[i64]> {
        match self.get(name)? {
            DumpValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn group(&self, name: &str) -> Option<&DumpGroup> {
        match self.get(name)? {
            DumpValue::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DumpValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn absorb(&mut self, other: DumpGroup) {
        self.fields.extend(other.fields);
    }
}

/// Classification of one dump line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpLine<'a> {
    Comment,
    Start(&'a str),
    End(&'a str),
    Field(&'a str, DumpValue),
    Other,
}

/// One open group on the parse stack.
#[derive(Debug, Default)]
struct Frame {
    name: Option<String>,
    group: DumpGroup,
}

/// Parses a complete dump into its root group.
///
/// Unbalanced `END` banners at the top level are ignored and groups left open
/// at end of input are folded back into their parents.
pub fn parse_dump(text: &str) -> DumpGroup {
    let mut stack: Vec<Frame> = vec![Frame::default()];
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        match classify_line(line) {
            DumpLine::Comment | DumpLine::Other => {}
            DumpLine::Start(title) => {
                // The banner is always followed by the header naming the group.
                let name = lines.next().and_then(parse_group_header);
                log::trace!("dump: START {title} -> {name:?} (depth {})", stack.len());
                stack.push(Frame {
                    name: name.map(str::to_string),
                    group: DumpGroup::new(),
                });
            }
            DumpLine::End(title) => {
                if stack.len() == 1 {
                    log::debug!("dump: ignoring unbalanced END {title}");
                    continue;
                }
                pop_frame(&mut stack);
            }
            DumpLine::Field(name, value) => {
                if let Some(top) = stack.last_mut() {
                    top.group.insert(name, value);
                }
            }
        }
    }

    while stack.len() > 1 {
        pop_frame(&mut stack);
    }

    stack.pop().map(|f| f.group).unwrap_or_default()
}

fn pop_frame(stack: &mut Vec<Frame>) {
    let Some(frame) = stack.pop() else {
        return;
    };
    let Some(parent) = stack.last_mut() else {
        return;
    };
    match frame.name {
        Some(name) => parent.group.insert(name, DumpValue::Group(frame.group)),
        None => parent.group.absorb(frame.group),
    }
}

/// Classifies a single line without any parser state.
pub fn classify_line(line: &str) -> DumpLine<'_> {
    let line = line.trim_end();

    if line.starts_with('#') {
        return DumpLine::Comment;
    }
    if let Some(title) = parse_banner(line, "START") {
        return DumpLine::Start(title);
    }
    if let Some(title) = parse_banner(line, "END") {
        return DumpLine::End(title);
    }

    let Some((name, rest)) = split_name(line) else {
        return DumpLine::Other;
    };

    if let Some(value) = parse_string_value(rest) {
        return DumpLine::Field(name, DumpValue::Str(value.to_string()));
    }
    if let Some(values) = parse_array_value(rest) {
        return DumpLine::Field(name, DumpValue::Array(values));
    }
    if let Some(value) = rest.split_whitespace().last().and_then(parse_int) {
        return DumpLine::Field(name, DumpValue::Int(value));
    }

    DumpLine::Other
}

/// `===== START SUPERBLOCK =====` -> `Some("SUPERBLOCK")`.
fn parse_banner<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = line.strip_prefix('=')?.trim_start_matches('=');
    let rest = rest.strip_prefix(' ')?.strip_prefix(keyword)?;
    let rest = rest.strip_prefix(' ')?;
    let title = rest.strip_suffix('=')?.trim_end_matches('=');
    Some(title.strip_suffix(' ').unwrap_or(title).trim())
}

/// `# 4@800a4c000: primary sblock` -> `Some("sblock")`.
pub fn parse_group_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("# ")?;
    let (indent, rest) = rest.split_once('@')?;
    if indent.is_empty() || !indent.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (addr, rest) = rest.split_once(": ")?;
    if addr.is_empty() || addr.contains(char::is_whitespace) {
        return None;
    }
    let mut words = rest.split_whitespace();
    let _kind = words.next()?;
    words.next()
}

fn split_name(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(char::is_whitespace) {
        return None;
    }
    let (name, rest) = line.split_once(char::is_whitespace)?;
    Some((name, rest))
}

fn parse_string_value(rest: &str) -> Option<&str> {
    if !rest.ends_with('"') {
        return None;
    }
    let open = rest.find('"')?;
    let close = rest.len() - 1;
    if open >= close {
        return None;
    }
    // A type column must separate the name from the quoted value.
    if !rest[..open].ends_with(char::is_whitespace) || rest[..open].trim().is_empty() {
        return None;
    }
    Some(&rest[open + 1..close])
}

fn parse_array_value(rest: &str) -> Option<Vec<i64>> {
    let mut tokens = rest.split_whitespace();
    let ty = tokens.next()?;
    if !(ty.contains('[') && ty.ends_with(']')) {
        return None;
    }
    let values = tokens.map(parse_int).collect::<Option<Vec<_>>>()?;
    if values.is_empty() {
        return None;
    }
    Some(values)
}

/// Parses a decimal or `0x` hexadecimal integer, optionally signed.
///
/// Hex values wider than `i64` are reinterpreted as two's complement, the
/// way the C dumper would have printed them.
pub fn parse_int(token: &str) -> Option<i64> {
    let (negative, digits) = match token.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, token.strip_prefix('+').unwrap_or(token)),
    };

    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        if hex.is_empty() {
            return None;
        }
        i64::from_str_radix(hex, 16)
            .ok()
            .or_else(|| u64::from_str_radix(hex, 16).ok().map(|v| v as i64))?
    } else {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<i64>().ok()?
    };

    Some(if negative { value.wrapping_neg() } else { value })
}
