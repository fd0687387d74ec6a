use async_trait::async_trait;
use db::{BlockRange, RawStore, StoreResult};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{error, info, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::fetcher::BlockRangeFetcher;

/// What a single batch accomplished.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped: Vec<u64>,
    pub failed_writes: usize,
}

/// Work applied to one batch of blocks.
#[async_trait]
pub trait BatchJob: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, batch: BlockRange) -> IndexerResult<BatchOutcome>;
}

/// Summary of a whole range. Only used for logging.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunReport {
    pub batches_ok: usize,
    pub batches_failed: usize,
    pub processed: usize,
    pub skipped: Vec<u64>,
    pub failed_writes: usize,
}

impl RunReport {
    fn record(&mut self, outcome: BatchOutcome) {
        self.batches_ok += 1;
        self.processed += outcome.processed;
        self.skipped.extend(outcome.skipped);
        self.failed_writes += outcome.failed_writes;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BatchScheduler {
    batch_size: u64,
    max_workers: usize,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, max_workers: usize) -> IndexerResult<Self> {
        if batch_size == 0 {
            return Err(IndexerError::ConfigError("batch size must be at least 1".to_string()));
        }
        if max_workers == 0 {
            return Err(IndexerError::ConfigError("max workers must be at least 1".to_string()));
        }
        Ok(Self {
            batch_size: batch_size as u64,
            max_workers,
        })
    }

    pub fn partition(&self, range: BlockRange) -> Vec<BlockRange> {
        range.chunks(self.batch_size)
    }

    /// Runs `job` over every batch of `range` with at most `max_workers`
    /// batches in flight. Failed or panicking batches are logged and counted;
    /// they never stop their siblings.
    pub async fn run_range(&self, range: BlockRange, job: Arc<dyn BatchJob>) -> RunReport {
        let batches = self.partition(range);
        let mut report = RunReport::default();
        if batches.is_empty() {
            info!("{}: nothing to do for {}", job.name(), range);
            return report;
        }
        info!(
            "{}: {} blocks in {} batches across {} workers",
            job.name(),
            range.len(),
            batches.len(),
            self.max_workers
        );

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks: FuturesUnordered<_> = batches
            .into_iter()
            .map(|batch| {
                let permits = permits.clone();
                let job = job.clone();
                let handle = task::spawn(async move {
                    let _permit = permits
                        .acquire_owned()
                        .await
                        .map_err(|e| IndexerError::ProviderError(e.to_string()))?;
                    job.run(batch).await
                });
                async move { (batch, handle.await) }
            })
            .collect();

        while let Some((batch, result)) = tasks.next().await {
            match result {
                Ok(Ok(outcome)) => report.record(outcome),
                Ok(Err(e)) => {
                    error!("{}: batch {} failed: {}", job.name(), batch, e);
                    report.batches_failed += 1;
                }
                Err(e) => {
                    error!("{}: batch {} panicked: {}", job.name(), batch, e);
                    report.batches_failed += 1;
                }
            }
        }

        info!(
            "{}: finished {} ({} batches ok, {} failed, {} blocks skipped, {} failed writes)",
            job.name(),
            range,
            report.batches_ok,
            report.batches_failed,
            report.skipped.len(),
            report.failed_writes
        );
        report
    }
}

/// Fetches a batch from the chain and persists it verbatim.
pub struct IngestJob {
    fetcher: Arc<BlockRangeFetcher>,
    raw_store: Arc<dyn RawStore>,
}

impl IngestJob {
    pub fn new(fetcher: Arc<BlockRangeFetcher>, raw_store: Arc<dyn RawStore>) -> Self {
        Self { fetcher, raw_store }
    }
}

/// Logs a failed table write and reports whether it succeeded.
pub(crate) fn record_write(
    table: &str,
    batch: BlockRange,
    result: StoreResult<usize>,
    failed_writes: &mut usize,
) -> Option<usize> {
    match result {
        Ok(inserted) => Some(inserted),
        Err(e) => {
            error!("failed to write {} for {}: {}", table, batch, e);
            *failed_writes += 1;
            None
        }
    }
}

#[async_trait]
impl BatchJob for IngestJob {
    fn name(&self) -> &str {
        "ingest"
    }

    async fn run(&self, batch: BlockRange) -> IndexerResult<BatchOutcome> {
        let fetched = self.fetcher.fetch_range(batch).await;
        if !fetched.skipped.is_empty() {
            warn!("ingest {}: skipped blocks {:?}", batch, fetched.skipped);
        }

        let mut failed_writes = 0;
        let blocks = record_write(
            "raw_blocks",
            batch,
            self.raw_store.insert_raw_blocks(&fetched.blocks).await,
            &mut failed_writes,
        );
        let transactions = record_write(
            "raw_transactions",
            batch,
            self.raw_store.insert_raw_transactions(&fetched.transactions).await,
            &mut failed_writes,
        );
        let receipts = record_write(
            "raw_receipts",
            batch,
            self.raw_store.insert_raw_receipts(&fetched.receipts).await,
            &mut failed_writes,
        );
        let logs = record_write(
            "raw_logs",
            batch,
            self.raw_store.insert_raw_logs(&fetched.logs).await,
            &mut failed_writes,
        );

        info!(
            "ingested {}: blocks {:?} txs {:?} receipts {:?} logs {:?}",
            batch, blocks, transactions, receipts, logs
        );

        Ok(BatchOutcome {
            processed: fetched.blocks.len(),
            skipped: fetched.skipped,
            failed_writes,
        })
    }
}
