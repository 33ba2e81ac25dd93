use crate::orchestrator::SearchOrchestrator;
use log::{debug, error, info};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

/// Forwards each stdin line as a search trigger until EOF. Blocking; run it
/// on a dedicated thread.
pub fn read_stdin(tx: Sender<String>) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(line) => {
                if tx.blocking_send(line).is_err() {
                    error!("Search loop stopped; no longer reading input");
                    return;
                }
            }
            Err(e) => {
                error!("Error reading input: {}", e);
                return;
            }
        }
    }
    info!("End of input");
}

/// Starts a search for every query received. Searches run concurrently so
/// a new query can supersede one still in flight. With `debounce`, a query
/// only starts once no newer one arrived for that long.
pub async fn run(
    mut rx: Receiver<String>,
    orchestrator: Arc<SearchOrchestrator>,
    debounce: Option<Duration>,
) {
    let mut searches: Vec<JoinHandle<()>> = Vec::new();
    while let Some(mut query) = rx.recv().await {
        if let Some(quiet) = debounce {
            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(next) => query = next,
                        None => break,
                    },
                    _ = tokio::time::sleep(quiet) => break,
                }
            }
        }
        // the generation is opened here so input order decides which search is newest
        let pending = match orchestrator.start(&query) {
            Some(pending) => pending,
            None => {
                debug!("Ignoring blank query");
                continue;
            }
        };
        searches.retain(|search| !search.is_finished());
        let orchestrator = orchestrator.clone();
        searches.push(tokio::spawn(async move {
            let query = pending.query().to_string();
            let outcome = orchestrator.finish(pending).await;
            debug!(
                "Search for {:?} ended: {:?} (now {:?})",
                query,
                outcome,
                orchestrator.phase()
            );
        }));
    }
    for search in searches {
        if let Err(e) = search.await {
            error!("Search task failed: {}", e);
        }
    }
}
