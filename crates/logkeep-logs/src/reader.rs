//! Archive reader for time range queries

use chrono::{DateTime, NaiveDate, Utc};
use logkeep_core::{
    constants, parse_archive_file_name, validate_workload_name, Error, Result, TimeRange,
};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Per-workload overview of the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSummary {
    pub name: String,
    pub files: usize,
    pub bytes: u64,
    pub latest: Option<NaiveDate>,
}

/// Read-only view over the archive root
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    root: PathBuf,
}

impl ArchiveReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the archive root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive files of a workload ordered by date, then rotation suffix
    pub fn files(&self, workload: &str) -> Result<Vec<PathBuf>> {
        if !validate_workload_name(workload) {
            return Err(Error::InvalidWorkload(workload.to_string()));
        }

        let dir = constants::workload_dir(&self.root, workload);
        let entries = fs::read_dir(&dir).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::WorkloadNotFound(workload.to_string()),
            _ => Error::IoError(e),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(order) = parse_archive_file_name(&name.to_string_lossy()) {
                files.push((order, entry.path()));
            }
        }
        files.sort();

        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Lines of a workload whose leading timestamp lies inside `range`.
    ///
    /// Files are read one after another; lines are not merged across files,
    /// so the result is only chronological within each file. Lines without a
    /// parsable timestamp are left out. Any file that cannot be read fails the
    /// whole query.
    pub fn query(&self, workload: &str, range: &TimeRange) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for path in self.files(workload)? {
            let matched = read_file_range(&path, range)?;
            debug!("{}: {} matching lines", path.display(), matched.len());
            lines.extend(matched);
        }
        Ok(lines)
    }

    /// Summarise every workload directory under the root
    pub fn workloads(&self) -> Result<Vec<WorkloadSummary>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let files = self.files(&name)?;

            let mut bytes = 0;
            let mut latest = None;
            for path in &files {
                bytes += fs::metadata(path)?.len();
                let date = path
                    .file_name()
                    .and_then(|n| parse_archive_file_name(&n.to_string_lossy()))
                    .map(|(date, _)| date);
                latest = latest.max(date);
            }

            summaries.push(WorkloadSummary {
                name,
                files: files.len(),
                bytes,
                latest,
            });
        }
        summaries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(summaries)
    }
}

/// Timestamp token at the start of an archive line
pub fn line_timestamp(line: &str) -> Option<DateTime<Utc>> {
    let token = line.split(' ').next()?;
    DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn read_file_range(path: &Path, range: &TimeRange) -> Result<Vec<String>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut lines = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }

        let line = String::from_utf8_lossy(&buf);
        match line_timestamp(&line) {
            Some(ts) if range.contains(ts) => lines.push(line.into_owned()),
            _ => {}
        }
    }

    Ok(lines)
}
