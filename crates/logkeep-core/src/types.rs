//! Core types for logkeep

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::NamingConfig;
use crate::constants::*;
use crate::error::{Error, Result};

/// Validate a workload identity used to address an archive directory.
/// Rejects anything that could escape the archive root.
pub fn validate_workload_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// A running container as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Runtime-assigned opaque ID
    pub id: String,
    /// Runtime names, usually with a leading '/'
    #[serde(default)]
    pub names: Vec<String>,
    /// Image reference the container was created from
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl Workload {
    pub fn new(id: impl Into<String>, name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            names: vec![format!("/{}", name.into())],
            image: image.into(),
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// First runtime name without its leading '/'
    pub fn runtime_name(&self) -> Option<&str> {
        self.names.first().map(|n| n.trim_start_matches('/'))
    }

    /// Name derived from the naming labels, before any validation
    pub fn label_name(&self, naming: &NamingConfig) -> Option<String> {
        let name = self.labels.get(&naming.name_label).filter(|n| !n.is_empty())?;
        match self.labels.get(&naming.preview_label) {
            Some(pr) if pr != "0" && !pr.is_empty() => Some(format!("{}-pr-{}", name, pr)),
            _ => Some(name.clone()),
        }
    }

    /// Name of the workload's archive directory.
    ///
    /// The name label wins; preview deployments get `-pr-<n>` appended.
    /// Without a usable label the runtime name is used, and the ID as a last
    /// resort. The result is always a single path component below the root.
    pub fn display_name(&self, naming: &NamingConfig) -> String {
        self.label_name(naming)
            .filter(|n| validate_workload_name(n))
            .or_else(|| {
                self.runtime_name()
                    .filter(|n| validate_workload_name(n))
                    .map(String::from)
            })
            .unwrap_or_else(|| sanitize_workload_name(&self.id))
    }
}

/// Force an arbitrary string into a valid workload identity
pub fn sanitize_workload_name(name: &str) -> String {
    let clean = name.replace(['/', '\\', '\0'], "_");
    match clean.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => clean,
    }
}

/// A message from the runtime's lifecycle event feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Object type, e.g. "container" or "network"
    pub kind: String,
    /// Action, e.g. "create", "start", "die"
    pub action: String,
    /// ID of the object the event is about
    pub subject_id: String,
}

impl LifecycleEvent {
    pub fn container_created(id: impl Into<String>) -> Self {
        Self {
            kind: "container".to_string(),
            action: "create".to_string(),
            subject_id: id.into(),
        }
    }

    pub fn container_started(id: impl Into<String>) -> Self {
        Self {
            action: "start".to_string(),
            ..Self::container_created(id)
        }
    }

    /// Whether this event announces a new container
    pub fn is_creation(&self) -> bool {
        self.kind == "container" && self.action == "create"
    }

    /// Whether this event may bring up a container that needs a capture
    pub fn triggers_attach(&self) -> bool {
        self.kind == "container" && matches!(self.action.as_str(), "create" | "start")
    }
}

/// Logical archive destination: (workload display name, calendar date)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    pub workload: String,
    pub date: NaiveDate,
}

impl ArchiveKey {
    pub fn new(workload: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            workload: workload.into(),
            date,
        }
    }

    /// Key for today's archive (UTC)
    pub fn today(workload: impl Into<String>) -> Self {
        Self::new(workload, Utc::now().date_naive())
    }

    /// Unsuffixed file name, e.g. `2024-01-01.txt`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.date.format(ARCHIVE_DATE_FORMAT), ARCHIVE_EXT)
    }

    /// File name for a rotation suffix; 0 means unsuffixed
    pub fn file_name_with_suffix(&self, suffix: u32) -> String {
        if suffix == 0 {
            self.file_name()
        } else {
            format!("{}({})", self.file_name(), suffix)
        }
    }

    /// Directory holding every file of this workload
    pub fn dir(&self, root: &Path) -> PathBuf {
        workload_dir(root, &self.workload)
    }

    pub fn path(&self, root: &Path, suffix: u32) -> PathBuf {
        self.dir(root).join(self.file_name_with_suffix(suffix))
    }
}

/// Parse an archive file name into its date and rotation suffix.
/// Returns None for files that are not part of the archive.
pub fn parse_archive_file_name(name: &str) -> Option<(NaiveDate, u32)> {
    let ext = format!(".{}", ARCHIVE_EXT);
    let (stem, rest) = name.split_at(name.find(&ext)?);
    let date = NaiveDate::parse_from_str(stem, ARCHIVE_DATE_FORMAT).ok()?;
    let rest = &rest[ext.len()..];

    if rest.is_empty() {
        return Some((date, 0));
    }

    let suffix = rest.strip_prefix('(')?.strip_suffix(')')?.parse::<u32>().ok()?;
    (suffix > 0).then_some((date, suffix))
}

/// Inclusive time window of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(Error::InvalidRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse RFC 3339 bounds
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    /// Parse optional bounds; a missing or empty bound leaves that side open
    pub fn from_bounds(start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let bound = |value: Option<&str>, open: DateTime<Utc>| match value {
            Some(v) if !v.is_empty() => parse_timestamp(v),
            _ => Ok(open),
        };
        Self::new(
            bound(start, DateTime::<Utc>::MIN_UTC)?,
            bound(end, DateTime::<Utc>::MAX_UTC)?,
        )
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::timestamp(value, e))
}
