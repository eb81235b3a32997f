use std::cmp::Ordering;
use std::fs::Metadata;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Directory,
    File,
}

impl EntryType {
    /// Single-letter marker sent in the entry-type response header.
    pub fn marker(self) -> &'static str {
        match self {
            EntryType::Directory => "d",
            EntryType::File => "f",
        }
    }

    pub fn from_marker(marker: &str) -> Option<Self> {
        match marker {
            "d" => Some(EntryType::Directory),
            "f" => Some(EntryType::File),
            _ => None,
        }
    }
}

/// Wire representation of a single file or directory.
///
/// `size` is only meaningful for files; directories report whatever the
/// underlying filesystem says. Both timestamps are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub size: u64,
    pub ctime: DateTime<Utc>,
    pub mtime: DateTime<Utc>,
}

impl DirectoryEntry {
    /// Builds an entry from filesystem metadata.
    ///
    /// When `name` is `None` the last segment of `path` is used.
    pub fn from_metadata(path: &Path, metadata: &Metadata, name: Option<&str>) -> Self {
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let entry_type = if metadata.is_dir() {
            EntryType::Directory
        } else {
            EntryType::File
        };
        let mtime = to_utc(metadata.modified().unwrap_or(UNIX_EPOCH));

        DirectoryEntry {
            name,
            entry_type,
            size: metadata.len(),
            ctime: change_time(metadata).unwrap_or(mtime),
            mtime,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }
}

fn to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

#[cfg(unix)]
fn change_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;

    DateTime::from_timestamp(metadata.ctime(), metadata.ctime_nsec() as u32)
}

#[cfg(not(unix))]
fn change_time(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.created().ok().map(to_utc)
}

/// Listing order: directories first, then files, each group by
/// case-insensitive name.
pub fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Sorts a listing in place. The sort is stable.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(compare_entries);
}
