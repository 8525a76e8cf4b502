mod cli;
mod config;
mod endpoint;
mod progress;
mod session;

use std::process::ExitCode;

use anyhow::Context;
use burrow_mirror::{MirrorOptions, put_dir};
use burrow_transfer::{TransferOptions, put_file};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, PutArgs};
use config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("burrow: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "info,burrow=debug" } else { "info,burrow=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Put(args) => put(args, &config).await,
    }
}

async fn put(args: PutArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let transfer = TransferOptions {
        workers: args.max_workers.unwrap_or(config.transfer.max_workers),
        retry: config.transfer.retry.policy(),
        progress: Some(progress::bar_factory()),
        into_directory: true,
        ..TransferOptions::default()
    };
    let session = session::connect(&args, config)?;
    let remote = args.remote.clone().unwrap_or_default();

    if !args.recursive {
        let outcome = put_file(session, &remote, &args.local, &transfer)
            .await
            .with_context(|| format!("upload of {} failed", args.local.display()))?;
        tracing::info!(
            remote = %outcome.remote_path,
            bytes = outcome.bytes_written,
            skipped = outcome.skipped,
            "upload finished"
        );
        return Ok(ExitCode::SUCCESS);
    }

    let options = MirrorOptions {
        transfer,
        policy: config.transfer.mirror_policy,
    };
    let report = put_dir(session, &remote, &args.local, &options)
        .await
        .with_context(|| format!("mirror of {} failed", args.local.display()))?;

    if report.is_complete() {
        return Ok(ExitCode::SUCCESS);
    }
    for failure in &report.failures {
        eprintln!("burrow: {}: {}", failure.remote_path, failure.error);
    }
    eprintln!(
        "burrow: {} of the entries under {} failed",
        report.failures.len(),
        args.local.display()
    );
    Ok(ExitCode::FAILURE)
}
