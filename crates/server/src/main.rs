use anyhow::{Context, Result};
use clap::Parser;
use docsync_mirror::{ChangeWatcher, WatcherConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod dispatch;
mod mining;
mod state;
mod ws;

use state::ProjectHost;

#[derive(Parser)]
#[command(name = "docsync")]
#[command(about = "Live source synchronization server for documentation clients", long_about = None)]
#[command(version)]
struct Cli {
    /// Project root to mirror
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Websocket port the documentation peer connects to
    #[arg(long, default_value_t = 8887)]
    port: u16,

    /// External converter binary
    #[arg(long, default_value = "srcml")]
    converter: String,

    /// Source file extension the converter understands
    #[arg(long, default_value = "java")]
    ext: String,

    /// Quiet period before a burst of file changes is converted (ms)
    #[arg(long, default_value_t = 300)]
    debounce_ms: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("resolving project root {}", cli.root.display()))?;

    let host = Arc::new(ProjectHost::open(root.clone(), &cli.converter, &cli.ext)?);

    let _watcher = ChangeWatcher::spawn(
        &root,
        host.converter.clone(),
        host.cache.clone(),
        host.doi.clone(),
        host.outbound(),
        WatcherConfig {
            debounce: Duration::from_millis(cli.debounce_ms),
        },
    )?;

    ws::serve(host, cli.port).await
}
