use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

use ripple_db::Database;
use ripple_types::Event;

/// What happened to the lines of one replay run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub undecodable: usize,
    pub rejected: usize,
}

/// Decodes one JSON-lines entry. Blank lines yield `None`.
pub fn decode_line(line: &str) -> Option<serde_json::Result<Event>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

/// Projects every event in `reader` into `db`, one unit of work per event.
///
/// A line that does not decode, or an event the store rejects, is logged and
/// skipped; the replay carries on with the next line.
pub async fn replay<R>(db: Arc<Database>, reader: R) -> anyhow::Result<ReplayStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ReplayStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let event = match decode_line(&line) {
            None => continue,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!(line = line_no, "Skipping undecodable event: {}", e);
                stats.undecodable += 1;
                continue;
            }
        };

        let kind = event.event_type().as_str();
        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.apply_event(&event)).await? {
            Ok(()) => {
                debug!(line = line_no, event = kind, "Applied event");
                stats.applied += 1;
            }
            Err(e) => {
                warn!(line = line_no, event = kind, "Event rejected: {}", e);
                stats.rejected += 1;
            }
        }
    }

    Ok(stats)
}
