use std::time::Duration;

use anyhow::{Context, Result};
use scraper::Html;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::members::MemberAccumulator;
use crate::record::LeadRecord;

/// One-shot extraction: a single scan, then everything captured so far.
/// Never clears what earlier scans captured.
pub fn extract_once(acc: &mut MemberAccumulator, doc: &Html) -> Vec<LeadRecord> {
    acc.collect_visible(doc);
    acc.snapshot()
}

/// Continuous capture while the page scrolls.
///
/// Each [`notify`](Self::notify) is a scroll or mutation signal carrying the
/// page markup at that moment. Bursts are coalesced: only the latest markup is
/// scanned, once `quiet` passes without further activity.
pub struct ScrollWatcher {
    tx: mpsc::UnboundedSender<String>,
    progress: watch::Receiver<usize>,
    task: JoinHandle<MemberAccumulator>,
}

impl ScrollWatcher {
    pub fn spawn(acc: MemberAccumulator, quiet: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (progress_tx, progress) = watch::channel(acc.len());
        let task = tokio::spawn(debounce_loop(acc, rx, progress_tx, quiet));
        Self { tx, progress, task }
    }

    /// Returns false once the watcher has stopped.
    pub fn notify(&self, markup: impl Into<String>) -> bool {
        self.tx.send(markup.into()).is_ok()
    }

    /// Snapshot size after each scan.
    pub fn progress(&self) -> watch::Receiver<usize> {
        self.progress.clone()
    }

    /// Detach the listener. A scan still pending for the last burst runs
    /// before the accumulator is handed back.
    pub async fn finish(self) -> Result<MemberAccumulator> {
        let Self { tx, task, .. } = self;
        drop(tx);
        task.await.context("Scroll watcher task failed")
    }
}

async fn debounce_loop(
    mut acc: MemberAccumulator,
    mut rx: mpsc::UnboundedReceiver<String>,
    progress: watch::Sender<usize>,
    quiet: Duration,
) -> MemberAccumulator {
    let mut pending: Option<String> = None;
    let mut coalesced = 0usize;

    loop {
        let Some(markup) = pending.take() else {
            match rx.recv().await {
                Some(markup) => pending = Some(markup),
                None => break,
            }
            continue;
        };

        tokio::select! {
            next = rx.recv() => match next {
                Some(newer) => {
                    coalesced += 1;
                    pending = Some(newer);
                }
                None => {
                    scan(&mut acc, &markup, &progress, coalesced);
                    break;
                }
            },
            () = tokio::time::sleep(quiet) => {
                scan(&mut acc, &markup, &progress, coalesced);
                coalesced = 0;
            }
        }
    }

    acc
}

fn scan(acc: &mut MemberAccumulator, markup: &str, progress: &watch::Sender<usize>, coalesced: usize) {
    let added = acc.collect_markup(markup);
    debug!(added, coalesced, total = acc.len(), "debounced scan");
    let _ = progress.send(acc.len());
}
