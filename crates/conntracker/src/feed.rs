//! Event feed
//!
//! Any number of readers parse JSON-line sources and send events through one
//! channel; a single task owns the [`FlowTables`] and applies events in
//! arrival order, so tables only ever see one mutator.

use crate::error::{ConntrackerError, Result};
use crate::event::Event;
use crate::tables::FlowTables;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Result of reading one source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub sent: u64,
    pub malformed: u64,
}

/// Result of draining the channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub events: u64,
    pub orphans: u64,
    pub rejected: u64,
}

/// Reads events line by line from `reader` and sends them to `tx`.
///
/// Malformed lines are logged and skipped. Stops early if the receiver is
/// gone.
pub async fn read_events<R>(
    reader: R,
    source: &str,
    tx: mpsc::Sender<Event>,
) -> Result<ReadSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut segments = reader.split(b'\n');
    let mut summary = ReadSummary::default();
    let mut line_no = 0;

    while let Some(raw) = segments.next_segment().await? {
        line_no += 1;
        let parsed = std::str::from_utf8(&raw)
            .map_err(|e| ConntrackerError::Event {
                line: line_no,
                reason: e.to_string(),
            })
            .and_then(|line| Event::parse_line(line_no, line));
        match parsed {
            Ok(Some(event)) => {
                if tx.send(event).await.is_err() {
                    debug!(source, "Event receiver closed");
                    break;
                }
                summary.sent += 1;
            }
            Ok(None) => {}
            Err(e) => {
                summary.malformed += 1;
                warn!(source, error = %e, "Skipping malformed event");
            }
        }
    }

    info!(
        source,
        sent = summary.sent,
        malformed = summary.malformed,
        "Event source finished"
    );
    Ok(summary)
}

/// Applies events until every sender is dropped or `shutdown` completes
pub async fn drain<F>(
    rx: &mut mpsc::Receiver<Event>,
    tables: &mut FlowTables,
    shutdown: F,
) -> FeedSummary
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut summary = FeedSummary::default();

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(event) = maybe else {
                    debug!("All event sources closed");
                    break;
                };
                summary.events += 1;
                match event.apply(tables) {
                    Ok(applied) => debug!(?applied, "Applied event"),
                    Err(ConntrackerError::OrphanFootprint { .. }) => summary.orphans += 1,
                    Err(e) if e.is_recoverable() => {
                        summary.rejected += 1;
                        debug!(error = %e, "Event not applied");
                    }
                    Err(e) => {
                        error!(error = %e, "Stopping event processing");
                        break;
                    }
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping event processing");
                break;
            }
        }
    }

    summary
}
