use db::{BlockRange, DecodedStore, InternalDataProvider, RawStore, TokenRegistry};
use std::sync::Arc;
use tracing::info;

use crate::chain::{BlockSource, RpcChain, TokenSource};
use crate::config::{IndexerConfig, RunTarget};
use crate::decoder::{DecodeJob, DecodePipeline};
use crate::error::IndexerResult;
use crate::fetcher::BlockRangeFetcher;
use crate::scheduler::{BatchScheduler, IngestJob, RunReport};
use crate::tokens::TokenMetadataCache;

/// Both phases of a run, wired over one chain and one store.
pub struct Indexer {
    fetcher: Arc<BlockRangeFetcher>,
    ingest_scheduler: BatchScheduler,
    decode_scheduler: BatchScheduler,
    ingest_job: Arc<IngestJob>,
    decode_job: Arc<DecodeJob>,
    skip_ingest: bool,
    skip_decode: bool,
}

impl Indexer {
    pub fn new(
        config: &IndexerConfig,
        blocks: Arc<dyn BlockSource>,
        tokens: Arc<dyn TokenSource>,
        raw_store: Arc<dyn RawStore>,
        decoded_store: Arc<dyn DecodedStore>,
        registry: Arc<dyn TokenRegistry>,
    ) -> IndexerResult<Self> {
        let fetcher = Arc::new(BlockRangeFetcher::new(blocks));
        let token_cache = Arc::new(TokenMetadataCache::new(
            registry,
            tokens,
            config.token_memory_cache,
        ));
        let pipeline = Arc::new(DecodePipeline::new(
            raw_store.clone(),
            decoded_store,
            token_cache,
        ));

        Ok(Self {
            ingest_scheduler: BatchScheduler::new(config.batch_size, config.max_workers)?,
            decode_scheduler: BatchScheduler::new(config.decode_batch_size, config.max_workers)?,
            ingest_job: Arc::new(IngestJob::new(fetcher.clone(), raw_store)),
            decode_job: Arc::new(DecodeJob::new(pipeline)),
            fetcher,
            skip_ingest: config.skip_ingest,
            skip_decode: config.skip_decode,
        })
    }

    /// Connects to the node and the database. Either being unreachable is
    /// fatal.
    pub async fn connect(config: &IndexerConfig) -> IndexerResult<Self> {
        let chain = Arc::new(RpcChain::connect(config.rpc_endpoint()?).await?);
        let store = Arc::new(InternalDataProvider::new().await?);
        Self::new(config, chain.clone(), chain, store.clone(), store.clone(), store)
    }

    pub async fn resolve_target(&self, target: RunTarget) -> IndexerResult<BlockRange> {
        match target {
            RunTarget::Range(range) => Ok(range),
            RunTarget::Date(date) => self.fetcher.resolve_date(date).await,
        }
    }

    /// Ingests then decodes the target range. Per-block and per-batch
    /// failures are only logged; errors are returned for startup problems.
    pub async fn run(&self, target: RunTarget) -> IndexerResult<()> {
        let range = self.resolve_target(target).await?;
        info!("indexing blocks {}", range);

        if self.skip_ingest {
            info!("skipping ingestion");
        } else {
            let report = self
                .ingest_scheduler
                .run_range(range, self.ingest_job.clone())
                .await;
            log_report("ingestion", &report);
        }

        if self.skip_decode {
            info!("skipping decoding");
        } else {
            let report = self
                .decode_scheduler
                .run_range(range, self.decode_job.clone())
                .await;
            log_report("decoding", &report);
        }

        Ok(())
    }
}

fn log_report(phase: &str, report: &RunReport) {
    info!(
        "{} done: {} blocks, {} batches ok, {} batches failed",
        phase, report.processed, report.batches_ok, report.batches_failed
    );
    if !report.skipped.is_empty() {
        info!("{} skipped blocks {:?}", phase, report.skipped);
    }
}
