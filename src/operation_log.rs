use crate::error::ParseError;
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Upper limit on the up-front allocation taken from a header's edge count.
const MAX_PREALLOCATED_RECORDS: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Accepted by the parser but never executed.
    Read,
    Add,
    Delete,
}

impl Operation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "READ",
            Operation::Add => "ADD",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed line: `(operation, source, target)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeOperation {
    pub op: Operation,
    pub src: usize,
    pub dst: usize,
}

impl EdgeOperation {
    #[inline]
    pub const fn new(op: Operation, src: usize, dst: usize) -> Self {
        Self { op, src, dst }
    }
}

/// Counts declared on the first line of a base-graph file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub node_count: usize,
    pub edge_count: usize,
}

/// Ordered, immutable sequence of edge operations read from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationLog {
    records: Vec<EdgeOperation>,
}

impl OperationLog {
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[EdgeOperation] {
        &self.records
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &EdgeOperation> + '_ {
        self.records.iter()
    }
}

impl From<Vec<EdgeOperation>> for OperationLog {
    fn from(records: Vec<EdgeOperation>) -> Self {
        Self { records }
    }
}

/// Result of parsing one edge file.
#[derive(Debug, Clone)]
pub struct ParsedLog {
    pub log: OperationLog,
    /// Running max of the header node count and every id seen.
    pub node_bound: usize,
    pub header: Option<Header>,
    pub invalid_markers: usize,
}

/// Parse a base-graph file whose first line carries `node_count edge_count`.
pub fn read_with_header<P: AsRef<Path>>(
    path: P,
    default_op: Operation,
) -> Result<ParsedLog, ParseError> {
    let path = path.as_ref();
    let reader = open(path)?;
    parse(reader, path, default_op, true)
}

/// Parse an update file. Every line is data; the bound comes only from observed ids.
pub fn read<P: AsRef<Path>>(path: P, default_op: Operation) -> Result<ParsedLog, ParseError> {
    let path = path.as_ref();
    let reader = open(path)?;
    parse(reader, path, default_op, false)
}

fn open(path: &Path) -> Result<BufReader<File>, ParseError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse any line source. `origin` only labels errors and log events.
#[instrument(
    name = "parse_edge_file",
    level = "debug",
    skip_all,
    fields(path = %origin.display(), with_header = with_header)
)]
pub fn parse<R: BufRead>(
    reader: R,
    origin: &Path,
    default_op: Operation,
    with_header: bool,
) -> Result<ParsedLog, ParseError> {
    let mut records = Vec::new();
    let mut node_bound = 0usize;
    let mut header = None;
    let mut invalid_markers = 0usize;
    let mut header_pending = with_header;

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.map_err(|source| ParseError::Read {
            path: origin.to_path_buf(),
            line: line_no,
            source,
        })?;
        let text = line.trim_end();
        if text.trim_start().is_empty() {
            continue;
        }

        if header_pending {
            header_pending = false;
            let parsed =
                parse_header(text).ok_or_else(|| malformed(origin, line_no, "header", text))?;
            node_bound = node_bound.max(parsed.node_count);
            records.reserve(parsed.edge_count.min(MAX_PREALLOCATED_RECORDS));
            header = Some(parsed);
            continue;
        }

        let (src, dst, marker) =
            split_data_line(text).map_err(|field| malformed(origin, line_no, field, text))?;
        node_bound = node_bound.max(src.max(dst));

        let op = match marker {
            None => default_op,
            Some('1') => Operation::Add,
            Some('0') => Operation::Delete,
            Some(other) => {
                invalid_markers += 1;
                warn!(
                    line = line_no,
                    marker = %other,
                    fallback = %default_op,
                    "invalid operation marker"
                );
                default_op
            }
        };
        records.push(EdgeOperation::new(op, src, dst));
    }

    if let Some(declared) = header {
        if declared.edge_count != records.len() {
            warn!(
                declared_edges = declared.edge_count,
                parsed_edges = records.len(),
                "header edge count does not match parsed records"
            );
        }
    }

    debug!(records = records.len(), node_bound, "parsed edge file");

    Ok(ParsedLog {
        log: OperationLog::from(records),
        node_bound,
        header,
        invalid_markers,
    })
}

fn malformed(origin: &Path, line: usize, field: &'static str, text: &str) -> ParseError {
    ParseError::Malformed {
        path: PathBuf::from(origin),
        line,
        field,
        text: text.to_owned(),
    }
}

/// Reads leading whitespace then a run of ASCII digits, returning the value and the rest.
fn leading_integer(text: &str) -> Option<(usize, &str)> {
    let text = text.trim_start();
    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let value = text[..digits].parse().ok()?;
    Some((value, &text[digits..]))
}

/// Reads a node id; `usize::MAX` is refused so that `id + 1` always fits.
fn leading_node_id(text: &str) -> Option<(usize, &str)> {
    leading_integer(text).filter(|&(id, _)| id < usize::MAX)
}

/// Header: two integers separated by any non-digit run.
fn parse_header(text: &str) -> Option<Header> {
    let (node_count, rest) = leading_node_id(text)?;
    let rest = rest.trim_start_matches(|c: char| !c.is_ascii_digit());
    let (edge_count, _) = leading_integer(rest)?;
    Some(Header {
        node_count,
        edge_count,
    })
}

/// Data line: `src<sep>dst[<sep><marker>]`, where each separator is a single character.
/// The marker is the character right after the separator that follows `dst`.
fn split_data_line(text: &str) -> Result<(usize, usize, Option<char>), &'static str> {
    let (src, rest) = leading_node_id(text).ok_or("source")?;
    let rest = skip_separator(rest).ok_or("target")?;
    let (dst, rest) = leading_node_id(rest).ok_or("target")?;
    let marker = skip_separator(rest).and_then(|tail| tail.chars().next());
    Ok((src, dst, marker))
}

fn skip_separator(text: &str) -> Option<&str> {
    let mut chars = text.chars();
    chars.next()?;
    Some(chars.as_str())
}
