//! Deduplicating line writer feeding an archive file

use logkeep_core::{Result, MAX_LINE_BYTES};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::rotation::ArchiveFile;

/// SGR colour sequences: ESC [ <digits and semicolons> m
static ANSI_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;]*m").expect("Invalid ANSI colour regex"));

/// Remove terminal colour sequences from a line
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    ANSI_COLOR.replace_all(line, "")
}

/// Lines already written by one writer
#[derive(Debug, Default)]
struct SeenLines {
    lines: HashSet<String>,
    /// Insertion order, only tracked when bounded
    order: VecDeque<String>,
    capacity: Option<usize>,
}

impl SeenLines {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Record a line; false if it was already present
    fn insert(&mut self, line: &str) -> bool {
        if self.lines.contains(line) {
            return false;
        }

        if let Some(capacity) = self.capacity {
            while self.lines.len() >= capacity {
                match self.order.pop_front() {
                    Some(oldest) => {
                        self.lines.remove(&oldest);
                    }
                    None => break,
                }
            }
            self.order.push_back(line.to_owned());
        }

        self.lines.insert(line.to_owned());
        true
    }

    fn len(&self) -> usize {
        self.lines.len()
    }
}

/// Writer for one output channel of one capture.
///
/// Accepts arbitrary byte chunks, splits them into lines, strips colour
/// sequences and appends each line to the archive file unless this writer has
/// written the same cleaned text before. Suppression lasts for the writer's
/// whole lifetime and is never shared with other writers.
pub struct DedupWriter {
    sink: Arc<ArchiveFile>,
    seen: SeenLines,
    /// Bytes of a line whose newline has not arrived yet
    pending: Vec<u8>,
    written: u64,
    suppressed: u64,
}

impl DedupWriter {
    /// Create a writer that remembers every line it writes
    pub fn new(sink: Arc<ArchiveFile>) -> Self {
        Self::with_capacity(sink, None)
    }

    /// Create a writer whose seen set evicts its oldest entry beyond `capacity`
    pub fn with_capacity(sink: Arc<ArchiveFile>, capacity: Option<usize>) -> Self {
        Self {
            sink,
            seen: SeenLines::new(capacity),
            pending: Vec::new(),
            written: 0,
            suppressed: 0,
        }
    }

    /// Write a chunk. Always reports the whole chunk as consumed, including
    /// suppressed lines and a trailing partial line kept for the next call.
    /// A partial line reaching `MAX_LINE_BYTES` is written out in pieces of
    /// that size.
    pub fn write(&mut self, chunk: &[u8]) -> Result<usize> {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut rest = &buf[..];
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.emit(&rest[..pos])?;
            rest = &rest[pos + 1..];
        }
        while rest.len() >= MAX_LINE_BYTES {
            self.emit(&rest[..MAX_LINE_BYTES])?;
            rest = &rest[MAX_LINE_BYTES..];
        }
        self.pending = rest.to_vec();

        Ok(chunk.len())
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let line = std::mem::take(&mut self.pending);
        self.emit(&line)
    }

    fn emit(&mut self, raw: &[u8]) -> Result<()> {
        let raw = match raw.last() {
            Some(b'\r') => &raw[..raw.len() - 1],
            _ => raw,
        };
        let text = String::from_utf8_lossy(raw);
        let clean = strip_ansi(&text);

        if self.seen.insert(&clean) {
            self.sink.append_line(&clean)?;
            self.written += 1;
        } else {
            self.suppressed += 1;
        }
        Ok(())
    }

    /// Lines appended to the archive
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Lines dropped as duplicates
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    /// Number of distinct lines currently remembered
    pub fn remembered(&self) -> usize {
        self.seen.len()
    }
}
