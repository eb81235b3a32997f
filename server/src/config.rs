use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use ipnet::IpNet;
use sharefs_common::Credentials;

use crate::access::{AccountSet, AllowList, Policy};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REALM: &str = "sharefs";
pub const DEFAULT_MAX_BODY_SIZE: usize = 512 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("shared root {0} does not exist")]
    RootMissing(PathBuf),
    #[error("shared root {0} is not a directory")]
    RootNotDirectory(PathBuf),
    #[error("invalid allow-list entry {0:?}, expected an address or CIDR range")]
    InvalidAllowListEntry(String),
    #[error("invalid account {0:?}, expected name:password")]
    InvalidAccount(String),
    #[error("passphrase-protected private keys are not supported")]
    PassphraseUnsupported,
    #[error("tls: {0}")]
    Tls(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Certificate material for HTTPS mode.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// CA bundle used to verify client certificates.
    pub ca: Option<PathBuf>,
    pub passphrase: Option<String>,
    /// With a CA configured, refuse clients that present no valid certificate.
    pub reject_unauthorized: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub listen: SocketAddr,
    pub tls: Option<TlsConfig>,
    pub allow_list: Vec<IpNet>,
    pub accounts: Vec<Credentials>,
    pub read_only: bool,
    pub realm: String,
    pub max_body_size: usize,
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ServerConfig {
            root: root.into(),
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tls: None,
            allow_list: Vec::new(),
            accounts: Vec::new(),
            read_only: false,
            realm: DEFAULT_REALM.to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Makes the root absolute and checks it is an existing directory.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.root = match std::fs::canonicalize(&self.root) {
            Ok(root) => root,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::RootMissing(self.root));
            }
            Err(err) => return Err(err.into()),
        };
        if !self.root.is_dir() {
            return Err(ConfigError::RootNotDirectory(self.root));
        }
        if self.tls.as_ref().is_some_and(|tls| tls.passphrase.is_some()) {
            return Err(ConfigError::PassphraseUnsupported);
        }
        Ok(self)
    }

    /// Snapshot of the access rules, shared read-only by every request.
    pub fn policy(&self) -> Policy {
        Policy {
            allow_list: AllowList::new(self.allow_list.clone()),
            accounts: AccountSet::new(self.accounts.clone()),
            read_only: self.read_only,
            realm: self.realm.clone(),
        }
    }
}

/// Parses a CIDR range; a bare address becomes a host-length prefix.
pub fn parse_allow_entry(entry: &str) -> Result<IpNet, ConfigError> {
    let entry = entry.trim();
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net);
    }
    entry
        .parse::<IpAddr>()
        .map(IpNet::from)
        .map_err(|_| ConfigError::InvalidAllowListEntry(entry.to_string()))
}

pub fn parse_account(pair: &str) -> Result<Credentials, ConfigError> {
    Credentials::parse_pair(pair).ok_or_else(|| ConfigError::InvalidAccount(pair.to_string()))
}
