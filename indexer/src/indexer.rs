//! The polling indexer component.

use crate::config::IndexerConfig;
use crate::handlers::{Handlers, Outcome};
use crate::{metrics, IndexerError, Result};
use futures::future::try_join_all;
use gatepass_core::abi;
use gatepass_core::environment::Clock;
use gatepass_core::ledger::{Ledger, LedgerError};
use gatepass_core::store::{CursorStore, EventRecordStore, PurchaseStore};
use gatepass_core::{BlockNumber, BlockRange, EventKind, IndexerCursor, LifecycleEvent, TicketId};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Outcome counts for one batch (or a sum of batches).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Events that changed the store
    pub applied: usize,
    /// Events the store already reflected
    pub skipped: usize,
    /// Ticket id corrections
    pub corrected: usize,
    /// Events with no matching off-chain record
    pub unmatched: usize,
    /// Logs that could not be decoded
    pub malformed: usize,
    /// Events whose handler failed
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Applied => self.applied += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Corrected => self.corrected += 1,
            Outcome::Unmatched => self.unmatched += 1,
        }
    }

    /// Add another report's counts to this one.
    pub const fn absorb(&mut self, other: &Self) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.corrected += other.corrected;
        self.unmatched += other.unmatched;
        self.malformed += other.malformed;
        self.failed += other.failed;
    }

    /// Number of logs seen, decoded or not.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.skipped + self.corrected + self.unmatched + self.malformed + self.failed
    }
}

/// Result of one poll cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Blocks enumerated, `None` when there was nothing new
    pub range: Option<BlockRange>,
    /// Batches completed
    pub batches: usize,
    /// Summed event outcomes
    pub events: BatchReport,
}

/// Health snapshot of the indexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexerStatus {
    /// Whether the polling task is alive
    pub running: bool,
    /// Last block whose enumeration completed
    pub last_processed_block: Option<BlockNumber>,
    /// Ledger the indexer reads from
    pub ledger_endpoint: String,
}

struct Shared {
    ledger: Arc<dyn Ledger>,
    purchases: Arc<dyn PurchaseStore>,
    listings: Arc<dyn EventRecordStore>,
    cursor: Arc<dyn CursorStore>,
    clock: Arc<dyn Clock>,
    config: IndexerConfig,
    progress: watch::Sender<Option<BlockNumber>>,
    // Serializes handler application across the poll loop, rescans and
    // refreshes so no two read-check-write sequences interleave.
    apply: Mutex<()>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Keeps the off-chain store consistent with ledger events.
///
/// One instance owns one polling task. Cycles never overlap: the interval
/// uses [`MissedTickBehavior::Delay`] and a cycle runs to completion before
/// the next tick is awaited, so every write for a natural key happens in
/// ledger order.
///
/// # Example
///
/// ```ignore
/// let indexer = Indexer::new(ledger, store, Arc::new(SystemClock), config);
/// indexer.start().await?;
///
/// let status = indexer.status().await;
/// assert!(status.running);
///
/// indexer.stop().await?;
/// ```
pub struct Indexer {
    shared: Arc<Shared>,
    task: Mutex<Option<Running>>,
}

impl Indexer {
    /// Create an indexer over `ledger`, writing to `store`.
    ///
    /// The store must implement every record family the indexer touches;
    /// both `PostgresStore` and the in-memory test store do.
    #[must_use]
    pub fn new<S>(
        ledger: Arc<dyn Ledger>,
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        config: IndexerConfig,
    ) -> Self
    where
        S: PurchaseStore + EventRecordStore + CursorStore + 'static,
    {
        let purchases: Arc<dyn PurchaseStore> = store.clone();
        let listings: Arc<dyn EventRecordStore> = store.clone();
        let cursor: Arc<dyn CursorStore> = store;
        let (progress, _) = watch::channel(None);

        Self {
            shared: Arc::new(Shared {
                ledger,
                purchases,
                listings,
                cursor,
                clock,
                config,
                progress,
                apply: Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Spawn the polling loop.
    ///
    /// The first cycle runs immediately. An unreachable ledger is not an
    /// error here; the loop logs it and retries on the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::AlreadyRunning`] if the loop is alive.
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|running| !running.handle.is_finished()) {
            return Err(IndexerError::AlreadyRunning);
        }

        let (shutdown, receiver) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&self.shared).run(receiver));
        *task = Some(Running { shutdown, handle });
        Ok(())
    }

    /// Signal shutdown and wait for the loop to exit.
    ///
    /// An in-flight cycle completes first. Stopping an idle indexer is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Task`] if the loop panicked.
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.task.lock().await.take() else {
            return Ok(());
        };
        running.shutdown.send_replace(true);
        running
            .handle
            .await
            .map_err(|e| IndexerError::Task(e.to_string()))
    }

    /// Current health snapshot.
    pub async fn status(&self) -> IndexerStatus {
        let running = self
            .task
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished());

        let known = *self.shared.progress.borrow();
        let last_processed_block = match known {
            Some(block) => Some(block),
            None => self
                .shared
                .cursor
                .load()
                .await
                .ok()
                .flatten()
                .map(|cursor| cursor.last_processed_block),
        };

        IndexerStatus {
            running,
            last_processed_block,
            ledger_endpoint: self.shared.ledger.endpoint().to_string(),
        }
    }

    /// Watch the last processed block as it advances.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<Option<BlockNumber>> {
        self.shared.progress.subscribe()
    }

    /// Run one poll cycle now.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError`] if the ledger fails or times out, or the
    /// cursor cannot be loaded or saved. Completed batches stay committed.
    pub async fn poll(&self) -> Result<PollReport> {
        self.shared.poll().await
    }

    /// Fetch, decode and apply one block range without touching the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::Ledger`] if any log query fails.
    pub async fn process_batch(&self, range: BlockRange) -> Result<BatchReport> {
        self.shared.process_batch(range).await
    }

    /// Re-apply `[from, to]` in batches without touching the cursor.
    ///
    /// Handlers are idempotent, so rescanning an already indexed range only
    /// repairs records that drifted.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::InvalidRange`] if `from > to`, or
    /// [`IndexerError::Ledger`] if a log query fails.
    pub async fn rescan(&self, from: BlockNumber, to: BlockNumber) -> Result<BatchReport> {
        self.shared.rescan(from, to).await
    }

    /// Re-derive one ticket's purchase status from the ledger point query.
    ///
    /// Returns how many purchase records moved forward.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError`] if the ledger or the store fails.
    pub async fn refresh_ticket(&self, ticket_id: TicketId) -> Result<usize> {
        self.shared.refresh_ticket(ticket_id).await
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(running) = task.take() {
                running.shutdown.send_replace(true);
            }
        }
    }
}

impl Shared {
    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // interval() panics on a zero period
        let period = self.config.poll_interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            endpoint = %self.ledger.endpoint(),
            poll_interval = ?period,
            batch_size = self.config.batch_size,
            "Event indexer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.poll().await {
                        warn!(error = %error, "Poll cycle failed, retrying next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Event indexer stopped");
    }

    async fn poll(&self) -> Result<PollReport> {
        let started = Instant::now();
        let result = self.poll_once().await;
        metrics::record_poll_duration(started.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::record_poll_failure();
        }
        result
    }

    #[instrument(skip(self), fields(endpoint = %self.ledger.endpoint()))]
    async fn poll_once(&self) -> Result<PollReport> {
        let head = self.call(self.ledger.head_block()).await?;
        let last = self.resume_point(head).await?;

        let Some(range) = BlockRange::new(last.saturating_add(1), head) else {
            debug!(head, last_processed_block = last, "No new blocks");
            return Ok(PollReport::default());
        };

        let mut report = PollReport {
            range: Some(range),
            ..PollReport::default()
        };
        for batch in range.batches(self.config.batch_size) {
            let batch_report = self.process_batch(batch).await?;
            self.advance_cursor(batch.to).await?;
            report.batches += 1;
            report.events.absorb(&batch_report);
        }

        info!(
            range = %range,
            batches = report.batches,
            applied = report.events.applied,
            corrected = report.events.corrected,
            unmatched = report.events.unmatched,
            malformed = report.events.malformed,
            failed = report.events.failed,
            "Poll cycle complete"
        );
        Ok(report)
    }

    async fn resume_point(&self, head: BlockNumber) -> Result<BlockNumber> {
        let known = *self.progress.borrow();
        if let Some(block) = known {
            return Ok(block);
        }

        let block = if let Some(cursor) = self.cursor.load().await? {
            info!(
                block = cursor.last_processed_block,
                updated_at = %cursor.updated_at,
                "Resuming from persisted cursor"
            );
            cursor.last_processed_block
        } else {
            let block = self.config.start_block.initial_cursor(head);
            info!(
                start = ?self.config.start_block,
                head,
                cursor = block,
                "No persisted cursor, starting fresh"
            );
            self.cursor
                .save(IndexerCursor::new(block, self.clock.now()))
                .await?;
            block
        };

        self.progress.send_replace(Some(block));
        metrics::set_cursor(block);
        Ok(block)
    }

    async fn advance_cursor(&self, block: BlockNumber) -> Result<()> {
        self.cursor
            .save(IndexerCursor::new(block, self.clock.now()))
            .await?;
        self.progress.send_replace(Some(block));
        metrics::set_cursor(block);
        debug!(block, "Cursor advanced");
        Ok(())
    }

    #[instrument(skip(self, range), fields(range = %range))]
    async fn process_batch(&self, range: BlockRange) -> Result<BatchReport> {
        let fetches = EventKind::ALL.map(move |kind| async move {
            self.call(self.ledger.logs(kind, range))
                .await
                .map(|logs| (kind, logs))
        });
        let fetched = try_join_all(fetches).await?;

        let mut report = BatchReport::default();
        let mut events: Vec<LifecycleEvent> = Vec::new();
        for (kind, logs) in fetched {
            for log in logs {
                match abi::decode_log(kind, &log) {
                    Ok(event) => events.push(event),
                    Err(error) => {
                        warn!(
                            kind = %kind,
                            tx_hash = %log.tx_hash,
                            block = log.block_number,
                            log_index = log.log_index,
                            error = %error,
                            "Skipping malformed ledger log"
                        );
                        metrics::record_event(kind, "malformed");
                        report.malformed += 1;
                    }
                }
            }
        }
        events.sort_by_key(LifecycleEvent::position);

        let _applying = self.apply.lock().await;
        let handlers = self.handlers();
        for event in &events {
            match handlers.apply(event).await {
                Ok(outcome) => {
                    metrics::record_event(event.kind, outcome.as_str());
                    report.record(outcome);
                }
                Err(error) => {
                    error!(
                        kind = %event.kind,
                        ticket_id = %event.ticket_id,
                        position = %event.position(),
                        error = %error,
                        "Failed to apply ledger event"
                    );
                    metrics::record_event(event.kind, "failed");
                    report.failed += 1;
                }
            }
        }

        debug!(events = events.len(), "Batch applied");
        Ok(report)
    }

    #[instrument(skip(self))]
    async fn rescan(&self, from: BlockNumber, to: BlockNumber) -> Result<BatchReport> {
        let range = BlockRange::new(from, to).ok_or(IndexerError::InvalidRange { from, to })?;

        let mut report = BatchReport::default();
        for batch in range.batches(self.config.batch_size) {
            report.absorb(&self.process_batch(batch).await?);
        }

        info!(
            range = %range,
            applied = report.applied,
            corrected = report.corrected,
            "Rescan complete"
        );
        Ok(report)
    }

    #[instrument(skip(self, ticket_id), fields(ticket_id = %ticket_id))]
    async fn refresh_ticket(&self, ticket_id: TicketId) -> Result<usize> {
        let Some(ticket) = self.call(self.ledger.ticket(ticket_id)).await? else {
            warn!("Ticket not found on ledger");
            return Ok(0);
        };
        let Some(target) = ticket.state.purchase_status() else {
            debug!(state = ?ticket.state, "Ticket not sold, nothing to refresh");
            return Ok(0);
        };

        let _applying = self.apply.lock().await;
        let handlers = self.handlers();
        let mut updated = 0;
        for record in self.purchases.find_by_ticket_id(ticket_id).await? {
            if record.buyer != ticket.owner {
                debug!(
                    purchase_id = %record.purchase_id,
                    buyer = %record.buyer,
                    owner = %ticket.owner,
                    "Purchase record does not belong to ledger owner"
                );
                continue;
            }
            if handlers.transition(&record, target).await? == Outcome::Applied {
                updated += 1;
            }
        }

        info!(state = ?ticket.state, updated, "Ticket refreshed from ledger");
        Ok(updated)
    }

    fn handlers(&self) -> Handlers<'_> {
        Handlers {
            purchases: self.purchases.as_ref(),
            listings: self.listings.as_ref(),
            clock: self.clock.as_ref(),
        }
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = std::result::Result<T, LedgerError>>,
    ) -> Result<T> {
        let timeout = self.config.rpc_timeout;
        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| LedgerError::Timeout(timeout))?
            .map_err(IndexerError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_absorb_counts() {
        let mut total = BatchReport::default();
        total.record(Outcome::Applied);
        total.record(Outcome::Corrected);

        let other = BatchReport {
            skipped: 2,
            malformed: 1,
            ..BatchReport::default()
        };
        total.absorb(&other);

        assert_eq!(total.applied, 1);
        assert_eq!(total.corrected, 1);
        assert_eq!(total.skipped, 2);
        assert_eq!(total.total(), 5);
    }
}
