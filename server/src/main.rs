use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sharefs_server::config::{self, ServerConfig, TlsConfig};
use sharefs_server::HttpServer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sharefs-server", version, about = "Share a directory over HTTP")]
struct Opts {
    /// Directory to share
    #[arg(short, long, env = "SHAREFS_ROOT", default_value = ".")]
    root: PathBuf,

    /// Address to bind
    #[arg(long, env = "SHAREFS_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "SHAREFS_PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// TLS certificate chain (PEM); enables HTTPS together with --key
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// CA bundle for verifying client certificates
    #[arg(long, requires = "cert")]
    ca: Option<PathBuf>,

    /// Private key passphrase
    #[arg(long, env = "SHAREFS_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Reject clients without a certificate signed by --ca
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    reject_unauthorized: bool,

    /// Permitted client network (CIDR or address), repeatable
    #[arg(short, long = "allow")]
    allow: Vec<String>,

    /// Account as name:password, repeatable
    #[arg(short, long = "user", env = "SHAREFS_USER", hide_env_values = true)]
    user: Vec<String>,

    /// Refuse create, write and delete requests
    #[arg(long)]
    read_only: bool,

    /// Realm sent in authentication challenges
    #[arg(long, default_value = config::DEFAULT_REALM)]
    realm: String,

    /// Largest accepted upload in bytes
    #[arg(long, default_value_t = config::DEFAULT_MAX_BODY_SIZE)]
    max_body_size: usize,
}

impl Opts {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = ServerConfig::new(self.root);
        config.listen = SocketAddr::new(self.host, self.port);
        config.read_only = self.read_only;
        config.realm = self.realm;
        config.max_body_size = self.max_body_size;
        config.allow_list = self
            .allow
            .iter()
            .map(|entry| config::parse_allow_entry(entry))
            .collect::<Result<_, _>>()?;
        config.accounts = self
            .user
            .iter()
            .map(|pair| config::parse_account(pair))
            .collect::<Result<_, _>>()?;
        config.tls = match (self.cert, self.key) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert,
                key,
                ca: self.ca,
                passphrase: self.passphrase,
                reject_unauthorized: self.reject_unauthorized,
            }),
            _ => None,
        };
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opts = Opts::parse();
    let config = opts
        .into_config()?
        .validate()
        .context("invalid server configuration")?;

    HttpServer::new(config).run().await
}
