//! Command-line probe for `hexsync_core`.
//!
//! # Responsibility
//! - Verify core crate linkage (`ping`, `version`).
//! - Replay a recorded change feed against an in-memory remote and report
//!   what the reconciler did with every message.

use clap::{Args, Parser, Subcommand};
use hexsync_core::{
    init_logging, ConfigError, FeedDisposition, FeedMessage, InMemoryRemote, LoggingError,
    LoopbackTransport, ProjectScope, ScopeSnapshot, SyncConfig, SyncEngine, SyncError,
};
use log::{info, warn};
use serde_json::json;
use std::fmt::{Display, Formatter};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use uuid::Uuid;

type ReplayEngine = SyncEngine<InMemoryRemote, LoopbackTransport>;

#[derive(Parser)]
#[command(name = "hexsync", version, about = "hexsync core probe and feed replay")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the core health check
    Ping,
    /// Print the core crate version
    Version,
    /// Apply a JSON-lines change feed to a seeded in-memory store
    Replay(ReplayArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Project the feed belongs to
    #[arg(long)]
    project: Uuid,
    /// JSON-lines file with one feed message per line
    #[arg(long)]
    feed: PathBuf,
    /// JSON scope snapshot used as the server state before replay
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// JSON engine config
    #[arg(long)]
    config: Option<PathBuf>,
    /// Include the final store in the report
    #[arg(long)]
    dump: bool,
}

#[derive(Debug)]
enum CliError {
    Config(ConfigError),
    Logging(LoggingError),
    Sync(SyncError),
    Io { path: PathBuf, message: String },
    Snapshot(String),
    Feed(String),
    NotSubscribed,
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "config: {err}"),
            Self::Logging(err) => write!(f, "logging: {err}"),
            Self::Sync(err) => write!(f, "sync: {err}"),
            Self::Io { path, message } => write!(f, "{}: {message}", path.display()),
            Self::Snapshot(message) => write!(f, "snapshot: {message}"),
            Self::Feed(message) => write!(f, "feed: {message}"),
            Self::NotSubscribed => f.write_str("feed channel did not open"),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<LoggingError> for CliError {
    fn from(err: LoggingError) -> Self {
        Self::Logging(err)
    }
}

impl From<SyncError> for CliError {
    fn from(err: SyncError) -> Self {
        Self::Sync(err)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct ReplaySummary {
    messages: usize,
    unparsable: usize,
    applied: usize,
    unchanged: usize,
    dropped: usize,
    stale: usize,
}

impl ReplaySummary {
    fn record(&mut self, disposition: FeedDisposition) {
        self.messages += 1;
        match disposition {
            FeedDisposition::Applied => self.applied += 1,
            FeedDisposition::Unchanged => self.unchanged += 1,
            FeedDisposition::Dropped => self.dropped += 1,
            FeedDisposition::Stale => self.stale += 1,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("hexsync: {err}");
            2
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Command::Ping => println!("hexsync_core ping={}", hexsync_core::ping()),
        Command::Version => println!("hexsync_core version={}", hexsync_core::core_version()),
        Command::Replay(args) => replay(args)?,
    }
    Ok(())
}

fn replay(args: ReplayArgs) -> Result<(), CliError> {
    let config = match &args.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    }
    .with_env_overrides()?;
    if config.logging.dir.is_some() {
        init_logging(&config.logging)?;
    }

    let snapshot = match &args.snapshot {
        Some(path) => {
            let raw = read_to_string(path)?;
            serde_json::from_str::<ScopeSnapshot>(&raw)
                .map_err(|err| CliError::Snapshot(err.to_string()))?
        }
        None => ScopeSnapshot::default(),
    };

    let scope = ProjectScope::new(args.project);
    let remote = InMemoryRemote::with_records(scope, snapshot);
    let mut engine = SyncEngine::new(scope, remote, LoopbackTransport::new(), config);
    engine.start(0)?;

    let file = std::fs::File::open(&args.feed).map_err(|err| io_error(&args.feed, err))?;
    let summary = replay_lines(&mut engine, BufReader::new(file))?;
    info!(
        "event=replay_finished module=cli status=ok messages={} applied={} dropped={}",
        summary.messages, summary.applied, summary.dropped
    );

    let store = engine.store();
    let mut report = json!({
        "project": args.project.to_string(),
        "messages": summary.messages,
        "unparsable": summary.unparsable,
        "applied": summary.applied,
        "unchanged": summary.unchanged,
        "dropped": summary.dropped,
        "stale": summary.stale,
        "regions": store.regions().len(),
        "containers": store.containers().len(),
        "items": store.item_count(),
    });
    if args.dump {
        report["store"] = serde_json::to_value(store.snapshot())
            .map_err(|err| CliError::Snapshot(err.to_string()))?;
    }
    println!("{report:#}");
    engine.stop();
    Ok(())
}

/// Feeds every non-blank line to the engine; lines that fail to decode are
/// counted and skipped.
fn replay_lines(
    engine: &mut ReplayEngine,
    reader: impl BufRead,
) -> Result<ReplaySummary, CliError> {
    let handle = engine.subscription().ok_or(CliError::NotSubscribed)?;
    let mut summary = ReplaySummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|err| CliError::Feed(err.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedMessage>(&line) {
            Ok(message) => summary.record(engine.handle_feed(&handle, &message)),
            Err(err) => {
                warn!(
                    "event=replay_line module=cli status=skipped line={} error={}",
                    index + 1,
                    err
                );
                summary.unparsable += 1;
            }
        }
    }
    Ok(summary)
}

fn read_to_string(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|err| io_error(path, err))
}

fn io_error(path: &Path, err: std::io::Error) -> CliError {
    CliError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
