use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::endpoint::Endpoint;

/// Resumable, parallel SFTP uploads.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about)]
pub struct Cli {
    /// Config file (defaults to $BURROW_CONFIG, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file, or a directory tree with --recursive.
    Put(PutArgs),
}

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Remote endpoint, `[user@]host[:port]`.
    #[arg(value_name = "ENDPOINT")]
    pub endpoint: Endpoint,

    /// Local file or directory to upload.
    #[arg(value_name = "LOCAL")]
    pub local: PathBuf,

    /// Remote target. Defaults to the remote home directory.
    #[arg(value_name = "REMOTE")]
    pub remote: Option<String>,

    /// Mirror a directory tree.
    #[arg(short, long)]
    pub recursive: bool,

    /// Concurrent chunk uploads per file.
    #[arg(short = 'w', long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Private key used when the agent has none that fits.
    #[arg(short, long, value_name = "PATH")]
    pub identity: Option<PathBuf>,

    /// Skip host key verification.
    #[arg(long)]
    pub insecure: bool,
}
