/// Brings a client-supplied path into canonical form: `/`-separated,
/// one leading slash, no trailing slash. Empty input and `.` become `/`.
pub fn normalize(requested: &str) -> String {
    let unified = requested.replace('\\', "/");
    let unified = if unified == "." { "" } else { unified.as_str() };
    format!("/{}", unified.trim_matches('/'))
}

pub fn is_root(normalized: &str) -> bool {
    normalized == "/"
}

/// Lexically resolves `.` and `..` in a normalized path. Returns `None`
/// when a `..` would climb above the root.
pub fn segments(normalized: &str) -> Option<Vec<&str>> {
    let mut out = Vec::new();
    for segment in normalized.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                out.pop()?;
            }
            other => out.push(other),
        }
    }
    Some(out)
}

/// Last segment of a normalized path, empty for the root.
pub fn leaf(normalized: &str) -> &str {
    normalized.rsplit('/').next().unwrap_or_default()
}
