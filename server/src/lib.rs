pub mod access;
pub mod config;
pub mod fs;
pub mod http;
pub mod resolver;
pub mod routes;
pub mod tls;

pub use access::{Policy, RequestContext};
pub use config::{ServerConfig, TlsConfig};
pub use fs::FileSystem;
pub use http::{router, AppState, HttpServer};
pub use resolver::{PathError, PathResolver, ResolvedPath};
