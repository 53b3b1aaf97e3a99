//! conntracker
//!
//! Replays flow and footprint events from JSON-line sources into the flow
//! tables, then dumps every table to the configured logfile.

use anyhow::{Context, Result};
use clap::Parser;
use conntracker::config::{ConntrackerConfig, DEFAULT_CONFIG_PATH};
use conntracker::{drain, read_events, Event, FlowTables, ReadSummary};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Flow tracking and firewall footprint correlation
#[derive(Parser, Debug)]
#[command(name = "conntracker")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// File the flow tables are dumped to (overrides output.logfile)
    #[arg(short = 'o', long)]
    logfile: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error; overrides logging.level)
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Event files to replay; stdin when none are given
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConntrackerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    config.validate().context("invalid configuration")?;

    init_logging(&config.logging.level);
    info!(config = %cli.config.display(), "conntracker: Starting");

    match run(&cli, &config).await {
        Ok(()) => {
            info!("conntracker: Exiting normally");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "conntracker: Exiting with error");
            Err(e)
        }
    }
}

fn apply_overrides(config: &mut ConntrackerConfig, cli: &Cli) {
    if let Some(logfile) = &cli.logfile {
        config.output.logfile = logfile.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
}

/// Installs the fmt subscriber; RUST_LOG takes precedence over `level`
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact(),
        )
        .init();
}

/// Completes on the first ctrl-c and raises the returned flag
fn setup_signal_handler() -> (Arc<AtomicBool>, impl std::future::Future<Output = ()>) {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    let signalled = async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("conntracker: Received SIGINT");
                flag.store(true, Ordering::Relaxed);
            }
            Err(e) => {
                // Without a handler the feed runs to completion
                warn!(error = %e, "conntracker: Failed to listen for SIGINT");
                std::future::pending::<()>().await;
            }
        }
    };
    (interrupted, signalled)
}

fn spawn_readers(
    files: &[PathBuf],
    tx: mpsc::Sender<Event>,
) -> Vec<JoinHandle<Result<ReadSummary>>> {
    if files.is_empty() {
        return vec![tokio::spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            Ok(read_events(stdin, "stdin", tx).await?)
        })];
    }

    files
        .iter()
        .cloned()
        .map(|path| {
            let tx = tx.clone();
            tokio::spawn(async move {
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("opening {}", path.display()))?;
                let source = path.display().to_string();
                Ok(read_events(BufReader::new(file), &source, tx).await?)
            })
        })
        .collect()
}

async fn run(cli: &Cli, config: &ConntrackerConfig) -> Result<()> {
    let mut tables = FlowTables::init(config.tracing.footprint_match)?;

    let (tx, mut rx) = mpsc::channel(config.feed.channel_capacity);
    let readers = spawn_readers(&cli.files, tx);

    let (interrupted, shutdown) = setup_signal_handler();
    let feed = drain(&mut rx, &mut tables, shutdown).await;
    drop(rx);
    info!(
        events = feed.events,
        orphans = feed.orphans,
        rejected = feed.rejected,
        "conntracker: Event feed finished"
    );

    let mut malformed = 0;
    for reader in readers {
        if interrupted.load(Ordering::Relaxed) {
            reader.abort();
            continue;
        }
        match reader.await {
            Ok(Ok(summary)) => malformed += summary.malformed,
            Ok(Err(e)) => error!(error = %e, "conntracker: Event source failed"),
            Err(e) => error!(error = %e, "conntracker: Event reader panicked"),
        }
    }
    if malformed > 0 {
        warn!(malformed, "conntracker: Skipped malformed event lines");
    }

    dump(&tables, config)?;

    tables.teardown();
    Ok(())
}

fn dump(tables: &FlowTables, config: &ConntrackerConfig) -> Result<()> {
    let logfile = &config.output.logfile;
    info!(logfile = %logfile.display(), "conntracker: Dumping flow tables");

    let file =
        File::create(logfile).with_context(|| format!("creating {}", logfile.display()))?;
    let mut sink = BufWriter::new(file);
    tables
        .render_all(&mut sink)
        .with_context(|| format!("writing {}", logfile.display()))?;

    if config.output.metrics {
        let text = tables.metrics().encode_text()?;
        sink.write_all(text.as_bytes())?;
        sink.flush()?;
    }

    Ok(())
}
