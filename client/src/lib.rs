pub mod client;
pub mod error;

pub use client::{ClientOptions, ShareClient};
pub use error::ClientError;
pub use sharefs_common::{Credentials, DirectoryEntry, EntryType};
