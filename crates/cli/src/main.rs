mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiber_trace_core::bridge::{Bridge, StorePublisher};
use fiber_trace_core::model::{CommitStore, Grouping, Liveness};
use fiber_trace_core::{Config, Recording};
use fiber_trace_protocol::FiberId;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fiber-trace")]
#[command(about = "Replay a recorded renderer session and inspect its commits", long_about = None)]
struct Cli {
    /// Recorded hook session (JSON)
    recording: PathBuf,

    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List the trailing commit window
    Commits {
        /// Number of commits to show (defaults to the configured window)
        #[arg(short = 'n', long)]
        window: Option<usize>,
    },

    /// Show one fiber and its event history
    Fiber { id: u64 },

    /// Print the fiber tree
    Tree {
        /// Group by owner instead of parent
        #[arg(long)]
        owner: bool,

        /// Include unmounted fibers
        #[arg(long)]
        all: bool,

        /// Keep only paths to fibers whose name contains this text
        #[arg(long)]
        filter: Option<String>,
    },
}

fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_logging(cli.log_level.as_deref().or(config.log_level.as_deref()));

    let (hook, events) = Recording::load(&cli.recording)?
        .into_session()
        .with_context(|| format!("replaying {}", cli.recording.display()))?;
    let store = CommitStore::with_config(config.store);
    let mut bridge = Bridge::new(hook, StorePublisher::new(store), config.bridge);
    for event in events {
        if let Err(err) = bridge.handle(event) {
            tracing::warn!(error = %err, "notification rejected");
        }
    }
    bridge.destroy();
    let publisher = bridge.into_publisher();
    let store = publisher.store();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match cli.command.unwrap_or(Command::Commits { window: None }) {
        Command::Commits { window } => {
            report::write_summary(&mut out, store, publisher.rejected())?;
            let commits = match window {
                Some(window) => store.recent_commits(window),
                None => store.recent(),
            };
            report::write_commits(&mut out, commits)?;
        }
        Command::Fiber { id } => report::write_fiber(&mut out, store, FiberId(id))?,
        Command::Tree { owner, all, filter } => {
            let grouping = if owner { Grouping::Owner } else { Grouping::Parent };
            let liveness = if all { Liveness::All } else { Liveness::Live };
            let mut tree = store.tree(grouping, liveness);
            if let Some(query) = filter {
                tree = tree.iter().filter_map(|node| node.filter(&query)).collect();
            }
            report::write_tree(&mut out, &tree)?;
        }
    }
    Ok(())
}
