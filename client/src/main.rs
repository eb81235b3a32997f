use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::Table;
use sharefs_client::{ClientOptions, Credentials, DirectoryEntry, ShareClient};
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "sharefs", version, about = "Client for a sharefs server")]
struct Opts {
    /// Server URL (e.g., https://localhost:8080)
    #[arg(short, long, env = "SHAREFS_SERVER")]
    server: Url,

    /// Credentials as name:password
    #[arg(short, long, env = "SHAREFS_USER", hide_env_values = true)]
    user: Option<String>,

    /// Extra CA certificate (PEM) to trust
    #[arg(long)]
    ca: Option<PathBuf>,

    /// Skip server certificate verification
    #[arg(long)]
    insecure: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show metadata for a single entry
    Info { path: String },
    /// Download a file
    Download {
        remote: String,
        /// Local destination, defaults to the remote file name
        local: Option<PathBuf>,
    },
    /// Upload a file, replacing any existing one
    Upload { local: PathBuf, remote: String },
    /// Create a directory
    Mkdir { path: String },
    /// Delete a file or directory tree
    Rm { path: String },
}

struct Listing(Vec<DirectoryEntry>);

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "No entries");
        }

        let mut table = Table::new();
        table.set_header(vec!["TYPE", "NAME", "SIZE", "MODIFIED"]);
        for entry in &self.0 {
            let (kind, size) = if entry.is_dir() {
                ("dir", String::new())
            } else {
                ("file", entry.size.to_string())
            };
            table.add_row(vec![
                kind.to_string(),
                entry.name.clone(),
                size,
                entry.mtime.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]);
        }
        write!(f, "{table}")
    }
}

fn build_client(opts: &Opts) -> Result<ShareClient> {
    let credentials = opts
        .user
        .as_deref()
        .map(|pair| Credentials::parse_pair(pair).context("--user must be name:password"))
        .transpose()?;
    let ca_pem = opts
        .ca
        .as_ref()
        .map(|path| std::fs::read(path).with_context(|| format!("reading {}", path.display())))
        .transpose()?;

    let options = ClientOptions {
        credentials,
        ca_pem,
        insecure: opts.insecure,
    };
    Ok(ShareClient::new(&opts.server, options)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let opts = Opts::parse();
    let client = build_client(&opts)?;

    match opts.command {
        Command::Ls { path } => {
            let entries = client.list(&path).await?;
            println!("{}", Listing(entries));
        }
        Command::Info { path } => {
            let entry = client.info(&path).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Download { remote, local } => {
            let contents = client.read(&remote).await?;
            let local = local.unwrap_or_else(|| {
                let normalized = sharefs_common::path::normalize(&remote);
                PathBuf::from(sharefs_common::path::leaf(&normalized))
            });
            anyhow::ensure!(
                !local.as_os_str().is_empty(),
                "cannot derive a local file name from {remote:?}"
            );
            tokio::fs::write(&local, &contents)
                .await
                .with_context(|| format!("writing {}", local.display()))?;
            info!("downloaded {} bytes to {}", contents.len(), local.display());
        }
        Command::Upload { local, remote } => {
            let contents = tokio::fs::read(&local)
                .await
                .with_context(|| format!("reading {}", local.display()))?;
            let entry = client.write(&remote, contents).await?;
            println!("uploaded {} ({} bytes)", entry.name, entry.size);
        }
        Command::Mkdir { path } => {
            let entry = client.create_directory(&path).await?;
            println!("created {}", entry.name);
        }
        Command::Rm { path } => {
            let entry = client.delete(&path).await?;
            println!("deleted {}", entry.name);
        }
    }

    Ok(())
}
