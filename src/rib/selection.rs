use std::collections::HashMap;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use log::{debug, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::export::RouteSink;
use super::table::{RouteTable, UpdateDraft};
use super::RouterId;
use crate::error::{Result, RibError};

/// Default number of queued items handled per batch
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Destinations of one table whose best path may have changed
#[derive(Clone, Debug)]
pub struct TableUpdate {
    pub table: Arc<RouteTable>,
    pub destinations: Vec<IpNetwork>,
}

impl TableUpdate {
    pub fn new(table: Arc<RouteTable>, destinations: Vec<IpNetwork>) -> Self {
        Self {
            table,
            destinations,
        }
    }
}

#[derive(Debug)]
enum Pending {
    Update(TableUpdate),
    /// Send the current best paths of `tables` to a newly registered peer
    Sync {
        peer: RouterId,
        tables: Vec<Arc<RouteTable>>,
    },
    Barrier(oneshot::Sender<()>),
}

/// Sending side of the selection queue
///
/// Once every handle is dropped the process finishes what is queued and
/// exits.
#[derive(Clone, Debug)]
pub struct SelectionHandle {
    tx: mpsc::UnboundedSender<Pending>,
}

impl SelectionHandle {
    /// Queue destinations for recomputation; never blocks
    pub fn notify(&self, update: TableUpdate) -> Result<()> {
        if update.destinations.is_empty() {
            return Ok(());
        }
        self.send(Pending::Update(update))
    }

    /// Queue the initial export of `tables` to `peer`, ordered after every
    /// update queued so far
    pub fn sync_peer(&self, peer: RouterId, tables: Vec<Arc<RouteTable>>) -> Result<()> {
        self.send(Pending::Sync { peer, tables })
    }

    /// Wait until everything queued before this call has been selected
    /// and delivered to the sinks
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Pending::Barrier(tx))?;
        rx.await.map_err(|_| RibError::SchedulerClosed)
    }

    fn send(&self, pending: Pending) -> Result<()> {
        self.tx.send(pending).map_err(|_| RibError::SchedulerClosed)
    }
}

/// Counters reported when the process exits
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SelectionStats {
    pub batches: usize,
    /// Table updates taken off the queue
    pub processed: usize,
    /// Destinations recomputed after per-batch deduplication
    pub recomputed: usize,
    /// Table updates discarded on cancellation
    pub dropped: usize,
}

enum Step {
    Batch(Vec<Pending>),
    Closed,
    Cancelled,
}

/// Single consumer of table updates
///
/// Each batch is deduplicated per table, recomputed, and the resulting
/// changes handed to every sink in queue order.
pub struct BestPathSelectionProcess {
    rx: mpsc::UnboundedReceiver<Pending>,
    sinks: Vec<Arc<dyn RouteSink>>,
    batch_size: usize,
    cancel: CancellationToken,
    stats: SelectionStats,
}

impl BestPathSelectionProcess {
    pub fn new(
        sinks: Vec<Arc<dyn RouteSink>>,
        batch_size: usize,
        cancel: CancellationToken,
    ) -> (Self, SelectionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let process = Self {
            rx,
            sinks,
            batch_size: batch_size.max(1),
            cancel,
            stats: SelectionStats::default(),
        };
        (process, SelectionHandle { tx })
    }

    pub async fn run(mut self) -> SelectionStats {
        debug!("Best path selection started (batch size {})", self.batch_size);
        loop {
            let step = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Step::Cancelled,
                batch = next_batch(&mut self.rx, self.batch_size) => match batch {
                    Some(batch) => Step::Batch(batch),
                    None => Step::Closed,
                },
            };
            match step {
                Step::Batch(batch) => self.process(batch),
                Step::Closed => break,
                Step::Cancelled => {
                    self.discard();
                    break;
                }
            }
        }
        debug!("Best path selection stopped: {:?}", self.stats);
        self.stats
    }

    fn discard(&mut self) {
        self.rx.close();
        while let Ok(pending) = self.rx.try_recv() {
            // Dropped barriers fail their flush
            if let Pending::Update(_) = pending {
                self.stats.dropped += 1;
            }
        }
        if self.stats.dropped > 0 {
            warn!(
                "Selection cancelled, {} queued updates dropped",
                self.stats.dropped
            );
        }
    }

    fn process(&mut self, batch: Vec<Pending>) {
        self.stats.batches += 1;
        trace!("Processing batch of {}", batch.len());
        let mut drafts: Vec<(Arc<RouteTable>, UpdateDraft)> = Vec::new();
        let mut by_table: HashMap<*const RouteTable, usize> = HashMap::new();
        let mut barriers = Vec::new();

        for pending in batch {
            match pending {
                Pending::Update(update) => {
                    self.stats.processed += 1;
                    let key = Arc::as_ptr(&update.table);
                    let index = *by_table.entry(key).or_insert_with(|| {
                        drafts.push((update.table.clone(), UpdateDraft::new()));
                        drafts.len() - 1
                    });
                    let draft = &mut drafts[index].1;
                    for destination in update.destinations {
                        draft.mark(destination);
                    }
                }
                Pending::Sync { peer, tables } => {
                    // Earlier updates must be visible to the sync
                    self.select(&mut drafts);
                    by_table.clear();
                    self.sync(peer, &tables);
                }
                Pending::Barrier(tx) => barriers.push(tx),
            }
        }
        self.select(&mut drafts);

        for barrier in barriers {
            // Waiter may have given up
            let _ = barrier.send(());
        }
    }

    fn select(&mut self, drafts: &mut Vec<(Arc<RouteTable>, UpdateDraft)>) {
        for (table, draft) in drafts.drain(..) {
            let destinations = draft.into_destinations();
            self.stats.recomputed += destinations.len();
            let family = table.family();
            for change in table.select_best(&destinations) {
                trace!("{} best path changed for {}", family, change.destination);
                for sink in &self.sinks {
                    sink.best_path_changed(family, &change);
                }
            }
        }
    }

    fn sync(&self, peer: RouterId, tables: &[Arc<RouteTable>]) {
        for table in tables {
            let state = table.current_state();
            for sink in &self.sinks {
                sink.initialize_peer(peer, table.family(), &state);
            }
        }
    }
}

/// Wait for one item, then take whatever else is already queued, up to
/// `cap` items. `None` once the channel is closed and empty.
pub async fn next_batch<T>(rx: &mut mpsc::UnboundedReceiver<T>, cap: usize) -> Option<Vec<T>> {
    let first = rx.recv().await?;
    let mut batch = Vec::with_capacity(cap.min(256));
    batch.push(first);
    while batch.len() < cap {
        match rx.try_recv() {
            Ok(item) => batch.push(item),
            Err(_) => break,
        }
    }
    Some(batch)
}
