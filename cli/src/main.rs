//! dirguard: watch a directory tree and enforce a file-extension allowlist.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dirguard_watcher::{DesktopNotifier, LogNotifier, Monitor, Notifier};
use tracing::error;

mod args;
mod logging;

use args::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = logging::init(&args.log, args.verbose);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("dirguard: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = args.resolve()?;

    let notifier: Arc<dyn Notifier> = if config.desktop_notifications {
        Arc::new(DesktopNotifier::new())
    } else {
        Arc::new(LogNotifier)
    };

    let monitor = Monitor::start(&config, notifier).with_context(|| {
        format!("failed to start monitoring {}", config.root.display())
    })?;
    monitor.run().await;

    // Only reached if the notification source shuts down underneath us.
    anyhow::bail!("notification source closed unexpectedly")
}
