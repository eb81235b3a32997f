use std::path::{Component, Path, PathBuf};

use sharefs_common::path;

/// Longest leaf name written to disk, in bytes.
const MAX_NAME_LEN: usize = 255;

const ILLEGAL_CHARS: &[char] = &['/', '\\', '?', '<', '>', ':', '*', '|', '"'];

const RESERVED_DEVICES: &[&str] = &["con", "prn", "aux", "nul"];
const RESERVED_NUMBERED: &[&str] = &["com", "lpt"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path resolves outside the shared root")]
    OutsideRoot,
    #[error("operation not permitted on the shared root")]
    Root,
    #[error("invalid file name")]
    InvalidName,
    #[error("path is not valid UTF-8")]
    Encoding,
    #[error("path contains a NUL byte")]
    NulByte,
}

/// An absolute path proven to lie within the shared root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    absolute: PathBuf,
    request: String,
    name: String,
}

impl ResolvedPath {
    pub fn path(&self) -> &Path {
        &self.absolute
    }

    /// Normalized request path this was resolved from.
    pub fn request_path(&self) -> &str {
        &self.request
    }

    /// Leaf name, empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_root(&self) -> bool {
        path::is_root(&self.request)
    }
}

/// Maps request paths onto the shared root. Never touches the filesystem.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// `root` is expected to be absolute; it is cleaned lexically.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathResolver {
            root: clean(&root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, requested: &str) -> Result<ResolvedPath, PathError> {
        if requested.contains('\0') {
            return Err(PathError::NulByte);
        }
        let request = path::normalize(requested);
        let candidate = clean(&self.root.join(request.trim_start_matches('/')));

        // Path::starts_with compares whole components, so a sibling such as
        // `<root>-other` never matches.
        if candidate != self.root && !candidate.starts_with(&self.root) {
            return Err(PathError::OutsideRoot);
        }

        let name = candidate
            .strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(ResolvedPath {
            absolute: candidate,
            request,
            name,
        })
    }

    /// Resolves a path that is about to be created, written or removed.
    /// The root is refused and the leaf name is sanitized.
    pub fn resolve_for_write(&self, requested: &str) -> Result<ResolvedPath, PathError> {
        let resolved = self.resolve(requested)?;
        if resolved.absolute == self.root {
            return Err(PathError::Root);
        }

        let name = sanitize_file_name(&resolved.name);
        if name.is_empty() {
            return Err(PathError::InvalidName);
        }
        let parent = resolved.absolute.parent().ok_or(PathError::Root)?;

        Ok(ResolvedPath {
            absolute: parent.join(&name),
            request: resolved.request,
            name,
        })
    }
}

/// Lexically resolves `.` and `..` without consulting the filesystem.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Strips characters and names the host filesystem would refuse.
/// Returns an empty string when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !ILLEGAL_CHARS.contains(c))
        .collect();

    if cleaned.len() > MAX_NAME_LEN {
        let mut end = MAX_NAME_LEN;
        while !cleaned.is_char_boundary(end) {
            end -= 1;
        }
        cleaned.truncate(end);
    }

    // Trimming also empties `.` and `..`.
    let kept = cleaned.trim_end_matches(['.', ' ']).len();
    cleaned.truncate(kept);

    if is_reserved_device(&cleaned) {
        return String::new();
    }
    cleaned
}

fn is_reserved_device(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if RESERVED_DEVICES.contains(&stem.as_str()) {
        return true;
    }
    RESERVED_NUMBERED.iter().any(|prefix| {
        stem.len() == prefix.len() + 1
            && stem.starts_with(prefix)
            && stem.as_bytes()[prefix.len()].is_ascii_digit()
    })
}
