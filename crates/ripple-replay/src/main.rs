mod config;
mod replay;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{info, warn};

use ripple_db::Database;
use ripple_types::query::{ChannelListQuery, ChannelSortKey, Sorting};

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ripple=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();

    // Init database
    let db_path = config.db_path.clone();
    let db = tokio::task::spawn_blocking(move || Database::open(&db_path))
        .await?
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let db = Arc::new(db);

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &config.events_path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            info!("Replaying events from {}", path.display());
            Box::new(BufReader::new(file))
        }
        None => {
            info!("Replaying events from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };

    let stats = replay::replay(db.clone(), reader).await?;
    info!(
        applied = stats.applied,
        undecodable = stats.undecodable,
        rejected = stats.rejected,
        "Replay finished"
    );

    if let Some(filter_hash) = &config.channel_query {
        print_channel_list(db, filter_hash.clone()).await?;
    }

    Ok(())
}

/// Prints the cached channel list of a query, one JSON object per line.
async fn print_channel_list(db: Arc<Database>, filter_hash: String) -> anyhow::Result<()> {
    let channels = tokio::task::spawn_blocking(move || {
        db.read(|s| {
            let stored = s.channel_list_query(&filter_hash)?.map(|query| query.sort);
            let sorting = channel_sorting(&filter_hash, stored);
            s.channel_list(&filter_hash, &sorting)
        })
    })
    .await??;

    for channel in &channels {
        println!("{}", serde_json::to_string(channel)?);
    }
    info!(count = channels.len(), "Printed channel list");
    Ok(())
}

/// Sort stored with the query, or the default channel order when it is
/// missing, empty or unreadable.
fn channel_sorting(filter_hash: &str, stored: Option<serde_json::Value>) -> Vec<Sorting<ChannelSortKey>> {
    let sorting = match stored.map(serde_json::from_value::<Vec<Sorting<ChannelSortKey>>>) {
        Some(Ok(sorting)) => sorting,
        Some(Err(e)) => {
            warn!(filter_hash, "Stored sort unreadable, using default: {}", e);
            Vec::new()
        }
        None => Vec::new(),
    };
    if sorting.is_empty() {
        ChannelListQuery::new(serde_json::Value::Null).sort
    } else {
        sorting
    }
}
