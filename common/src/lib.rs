// Types shared between the sharefs server and client
pub mod credentials;
pub mod path;
pub mod types;

pub use credentials::Credentials;
pub use types::{sort_entries, DirectoryEntry, EntryType};

/// Content type attached to every structured (JSON) body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf8";

/// Header carrying the `d`/`f` marker on default GET responses.
pub const ENTRY_TYPE_HEADER: &str = "x-entry-type";

/// Query flag switching GET into metadata-only mode.
pub const INFO_QUERY: &str = "info";
