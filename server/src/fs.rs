use std::fs::Metadata;
use std::io;
use std::path::Path;

use sharefs_common::{sort_entries, DirectoryEntry};
use tokio::fs;
use tracing::debug;

use crate::resolver::{PathError, PathResolver, ResolvedPath};

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error("entry not found")]
    NotFound,
    #[error("entry already exists")]
    AlreadyExists,
    #[error("a directory occupies the path")]
    IsDirectory,
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
}

/// Result of a default (non-info) read.
#[derive(Debug)]
pub enum ReadOutcome {
    Listing(Vec<DirectoryEntry>),
    File { name: String, contents: Vec<u8> },
}

/// Filesystem operations bounded to the shared root.
pub struct FileSystem {
    resolver: PathResolver,
}

impl FileSystem {
    pub fn new(resolver: PathResolver) -> Self {
        FileSystem { resolver }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub async fn root_available(&self) -> bool {
        matches!(fs::metadata(self.resolver.root()).await, Ok(m) if m.is_dir())
    }

    pub async fn read(&self, requested: &str) -> Result<ReadOutcome, FsError> {
        let target = self.resolver.resolve(requested)?;
        let metadata = probe(target.path()).await?.ok_or(FsError::NotFound)?;

        if metadata.is_dir() {
            let entries = self.list_directory(target.path()).await?;
            debug!(path = %target.request_path(), count = entries.len(), "listed directory");
            Ok(ReadOutcome::Listing(entries))
        } else {
            let contents = fs::read(target.path()).await?;
            debug!(path = %target.request_path(), size = contents.len(), "read file");
            Ok(ReadOutcome::File {
                name: target.name().to_string(),
                contents,
            })
        }
    }

    async fn list_directory(&self, dir: &Path) -> Result<Vec<DirectoryEntry>, FsError> {
        let mut entries = Vec::new();
        let mut children = fs::read_dir(dir).await?;
        while let Some(child) = children.next_entry().await? {
            let path = child.path();
            // Dangling symlinks are reported with the link's own metadata.
            let metadata = match fs::metadata(&path).await {
                Ok(metadata) => metadata,
                Err(_) => child.metadata().await?,
            };
            entries.push(DirectoryEntry::from_metadata(&path, &metadata, None));
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    pub async fn info(&self, requested: &str) -> Result<DirectoryEntry, FsError> {
        let target = self.resolver.resolve(requested)?;
        let metadata = probe(target.path()).await?.ok_or(FsError::NotFound)?;
        Ok(encode(&target, &metadata))
    }

    pub async fn create_directory(&self, requested: &str) -> Result<DirectoryEntry, FsError> {
        let target = self.resolver.resolve_for_write(requested)?;
        if probe_link(target.path()).await?.is_some() {
            return Err(FsError::AlreadyExists);
        }

        if let Some(parent) = target.path().parent() {
            create_parents(parent).await?;
        }
        // create_dir is exclusive: a racing creator loses with AlreadyExists.
        fs::create_dir(target.path()).await.map_err(conflict_or_io)?;
        debug!(path = %target.request_path(), "created directory");

        self.entry_for(&target).await
    }

    pub async fn write_file(
        &self,
        requested: &str,
        contents: &[u8],
    ) -> Result<DirectoryEntry, FsError> {
        let target = self.resolver.resolve_for_write(requested)?;
        if is_directory(target.path()).await {
            return Err(FsError::IsDirectory);
        }

        if let Some(parent) = target.path().parent() {
            create_parents(parent).await?;
        }
        if let Err(err) = fs::write(target.path(), contents).await {
            if is_directory(target.path()).await {
                return Err(FsError::IsDirectory);
            }
            return Err(err.into());
        }
        debug!(path = %target.request_path(), size = contents.len(), "wrote file");

        self.entry_for(&target).await
    }

    /// Removes a file or directory tree, returning the entry as it was
    /// before removal.
    pub async fn delete(&self, requested: &str) -> Result<DirectoryEntry, FsError> {
        let target = self.resolver.resolve_for_write(requested)?;
        let metadata = probe_link(target.path())
            .await?
            .ok_or(FsError::NotFound)?;
        let entry = encode(&target, &metadata);

        if metadata.is_dir() {
            fs::remove_dir_all(target.path()).await?;
        } else {
            fs::remove_file(target.path()).await?;
        }
        debug!(path = %target.request_path(), "deleted entry");

        Ok(entry)
    }

    async fn entry_for(&self, target: &ResolvedPath) -> Result<DirectoryEntry, FsError> {
        let metadata = fs::metadata(target.path()).await?;
        Ok(encode(target, &metadata))
    }
}

fn encode(target: &ResolvedPath, metadata: &Metadata) -> DirectoryEntry {
    DirectoryEntry::from_metadata(target.path(), metadata, Some(target.name()))
}

fn not_found_as_none(result: io::Result<Metadata>) -> Result<Option<Metadata>, FsError> {
    match result {
        Ok(metadata) => Ok(Some(metadata)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Metadata following symlinks, `None` when nothing is there.
async fn probe(path: &Path) -> Result<Option<Metadata>, FsError> {
    not_found_as_none(fs::metadata(path).await)
}

/// Metadata of the path itself, so a symlink is never followed.
async fn probe_link(path: &Path) -> Result<Option<Metadata>, FsError> {
    not_found_as_none(fs::symlink_metadata(path).await)
}

async fn is_directory(path: &Path) -> bool {
    matches!(fs::metadata(path).await, Ok(m) if m.is_dir())
}

async fn create_parents(parent: &Path) -> Result<(), FsError> {
    fs::create_dir_all(parent).await.map_err(conflict_or_io)
}

/// A file sitting where a directory must go surfaces as a conflict.
fn conflict_or_io(err: io::Error) -> FsError {
    if err.kind() == io::ErrorKind::AlreadyExists {
        FsError::AlreadyExists
    } else {
        FsError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use sharefs_common::EntryType;
    use tempfile::TempDir;

    use super::*;

    fn setup() -> (TempDir, FileSystem) {
        let dir = tempfile::tempdir().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        (dir, FileSystem::new(PathResolver::new(root)))
    }

    #[tokio::test]
    async fn test_listing_order() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("A")).unwrap();

        match fs.read("/").await.unwrap() {
            ReadOutcome::Listing(entries) => {
                let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
                assert_eq!(names, vec!["A", "b.txt"]);
                assert_eq!(entries[0].entry_type, EntryType::Directory);
            }
            other => panic!("expected listing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_read_file_contents() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("hello.txt"), b"hi there").unwrap();

        match fs.read("hello.txt").await.unwrap() {
            ReadOutcome::File { name, contents } => {
                assert_eq!(name, "hello.txt");
                assert_eq!(contents, b"hi there");
            }
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_paths() {
        let (_dir, fs) = setup();
        assert!(matches!(fs.read("/nope").await, Err(FsError::NotFound)));
        assert!(matches!(fs.info("/nope").await, Err(FsError::NotFound)));
        assert!(matches!(fs.delete("/nope").await, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let (dir, fs) = setup();
        let entry = fs.write_file("/sub/new.txt", b"12345").await.unwrap();

        assert_eq!(entry.name, "new.txt");
        assert_eq!(entry.size, 5);
        assert_eq!(entry.entry_type, EntryType::File);
        assert!(dir.path().join("sub").is_dir());
        assert_eq!(std::fs::read(dir.path().join("sub/new.txt")).unwrap(), b"12345");
    }

    #[tokio::test]
    async fn test_write_replaces_file() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("f.txt"), b"a much longer body").unwrap();
        let entry = fs.write_file("f.txt", b"short").await.unwrap();
        assert_eq!(entry.size, 5);
        assert_eq!(std::fs::read(dir.path().join("f.txt")).unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_write_onto_directory_conflicts() {
        let (dir, fs) = setup();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        assert!(matches!(
            fs.write_file("/d", b"x").await,
            Err(FsError::IsDirectory)
        ));
    }

    #[tokio::test]
    async fn test_write_below_a_file_conflicts() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("plain"), b"x").unwrap();
        assert!(fs.write_file("/plain/child.txt", b"y").await.is_err());
        assert_eq!(std::fs::read(dir.path().join("plain")).unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_create_directory_conflicts_without_mutation() {
        let (dir, fs) = setup();
        std::fs::write(dir.path().join("taken"), b"keep").unwrap();
        std::fs::create_dir(dir.path().join("dir")).unwrap();

        assert!(matches!(
            fs.create_directory("/taken").await,
            Err(FsError::AlreadyExists)
        ));
        assert!(matches!(
            fs.create_directory("/dir").await,
            Err(FsError::AlreadyExists)
        ));
        assert_eq!(std::fs::read(dir.path().join("taken")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_create_directory_with_intermediates() {
        let (dir, fs) = setup();
        let entry = fs.create_directory("/a/b/c").await.unwrap();
        assert_eq!(entry.name, "c");
        assert!(entry.is_dir());
        assert!(dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_root_is_refused_for_mutations() {
        let (_dir, fs) = setup();
        for result in [
            fs.create_directory("/").await,
            fs.write_file("", b"x").await,
            fs.delete(".").await,
        ] {
            assert!(matches!(result, Err(FsError::InvalidPath(PathError::Root))));
        }
    }

    #[tokio::test]
    async fn test_escape_is_rejected_before_filesystem() {
        let (_dir, fs) = setup();
        assert!(matches!(
            fs.write_file("/../escape.txt", b"x").await,
            Err(FsError::InvalidPath(PathError::OutsideRoot))
        ));
        assert!(matches!(
            fs.read("../../etc/passwd").await,
            Err(FsError::InvalidPath(PathError::OutsideRoot))
        ));
    }

    #[tokio::test]
    async fn test_delete_reports_pre_deletion_entry() {
        let (dir, fs) = setup();
        std::fs::create_dir(dir.path().join("empty")).unwrap();
        std::fs::create_dir_all(dir.path().join("tree/inner")).unwrap();
        std::fs::write(dir.path().join("tree/inner/file"), b"abc").unwrap();

        let entry = fs.delete("/empty").await.unwrap();
        assert!(entry.is_dir());
        assert_eq!(entry.name, "empty");
        assert!(!dir.path().join("empty").exists());

        fs.delete("/tree").await.unwrap();
        assert!(!dir.path().join("tree").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_symlink_keeps_target() {
        let (dir, fs) = setup();
        std::fs::create_dir(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/keep"), b"k").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        fs.delete("/link").await.unwrap();
        assert!(dir.path().join("target/keep").exists());
    }

    #[tokio::test]
    async fn test_root_availability() {
        let (dir, fs) = setup();
        assert!(fs.root_available().await);
        drop(dir);
        assert!(!fs.root_available().await);
    }
}
