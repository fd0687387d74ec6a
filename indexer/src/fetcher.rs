use chrono::NaiveDate;
use db::{canonical_hex, BlockRange, RawBlock, RawLog, RawReceipt, RawTransaction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::BlockSource;
use crate::error::{IndexerError, IndexerResult};

/// One block with everything it contains, ready for the raw store.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchedBlock {
    pub block: RawBlock,
    pub transactions: Vec<RawTransaction>,
    pub receipts: Vec<RawReceipt>,
    pub logs: Vec<RawLog>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FetchedRange {
    pub blocks: Vec<RawBlock>,
    pub transactions: Vec<RawTransaction>,
    pub receipts: Vec<RawReceipt>,
    pub logs: Vec<RawLog>,
    pub skipped: Vec<u64>,
}

impl FetchedRange {
    fn push(&mut self, fetched: FetchedBlock) {
        self.blocks.push(fetched.block);
        self.transactions.extend(fetched.transactions);
        self.receipts.extend(fetched.receipts);
        self.logs.extend(fetched.logs);
    }
}

pub struct BlockRangeFetcher {
    source: Arc<dyn BlockSource>,
}

impl BlockRangeFetcher {
    pub fn new(source: Arc<dyn BlockSource>) -> Self {
        Self { source }
    }

    /// Smallest block whose timestamp is at or after `timestamp`, or `None`
    /// when the chain has not reached it yet.
    ///
    /// Lower-bound binary search over `[0, latest]`, relying on timestamps
    /// being non-decreasing in block number.
    pub async fn find_block_for_timestamp(&self, timestamp: u64) -> IndexerResult<Option<u64>> {
        let latest = self.source.latest_block_number().await?;
        let (mut low, mut high) = (0u64, latest);
        let mut chosen = None;

        while low <= high {
            let mid = low + (high - low) / 2;
            let block_timestamp = self.source.block_timestamp(mid).await?;

            if block_timestamp < timestamp {
                low = mid + 1;
            } else {
                chosen = Some(mid);
                if mid == 0 {
                    break;
                }
                high = mid - 1;
            }
        }

        debug!("timestamp {} resolved to block {:?}", timestamp, chosen);
        Ok(chosen)
    }

    /// Blocks produced on `date` (UTC).
    pub async fn resolve_date(&self, date: NaiveDate) -> IndexerResult<BlockRange> {
        let start_ts = midnight_timestamp(date)?;
        let next_day = date
            .succ_opt()
            .ok_or_else(|| IndexerError::ConfigError(format!("no day after {}", date)))?;
        let end_ts = midnight_timestamp(next_day)?;

        let start = self
            .find_block_for_timestamp(start_ts)
            .await?
            .ok_or_else(|| IndexerError::ConfigError(format!("no block produced on or after {}", date)))?;

        let end = match self.find_block_for_timestamp(end_ts).await? {
            Some(first_of_next_day) if first_of_next_day > start => first_of_next_day - 1,
            Some(_) => {
                return Err(IndexerError::ConfigError(format!("no block produced on {}", date)));
            }
            None => self.source.latest_block_number().await?,
        };

        info!("block range for {}: {} to {}", date, start, end);
        Ok(BlockRange::new(start, end))
    }

    /// Fetches one block with all transactions, receipts and logs.
    ///
    /// The block is all-or-nothing: any failed or missing receipt fails the
    /// whole call so an incomplete block is never handed to the store.
    pub async fn fetch_block(&self, number: u64) -> IndexerResult<FetchedBlock> {
        let block = self
            .source
            .block_with_transactions(number)
            .await?
            .ok_or(IndexerError::BlockNotFound(number))?;

        let mut transactions = Vec::with_capacity(block.transactions.len());
        let mut receipts = Vec::with_capacity(block.transactions.len());
        let mut logs = Vec::new();

        for tx in block.transactions {
            let tx_hash = canonical_hex(&tx.hash);
            let receipt = self
                .source
                .transaction_receipt(&tx_hash)
                .await?
                .ok_or_else(|| IndexerError::ReceiptNotFound(tx_hash.clone()))?;

            logs.extend(receipt.logs.into_iter().map(|log| RawLog {
                tx_hash: tx_hash.clone(),
                block_number: number,
                log_index: log.log_index,
                payload: log.payload,
            }));
            receipts.push(RawReceipt {
                tx_hash: tx_hash.clone(),
                block_number: number,
                payload: receipt.payload,
            });
            transactions.push(RawTransaction {
                tx_hash,
                block_number: number,
                payload: tx.payload,
            });
        }

        Ok(FetchedBlock {
            block: RawBlock {
                block_number: number,
                block_timestamp: block.timestamp,
                payload: block.payload,
            },
            transactions,
            receipts,
            logs,
        })
    }

    /// Fetches every block of `range` in order. Failed blocks are logged and
    /// listed in `skipped`; the rest of the range carries on.
    pub async fn fetch_range(&self, range: BlockRange) -> FetchedRange {
        let mut fetched = FetchedRange::default();
        for number in range.blocks() {
            match self.fetch_block(number).await {
                Ok(block) => fetched.push(block),
                Err(e) => {
                    warn!("skipping block {}: {}", number, e);
                    fetched.skipped.push(number);
                }
            }
        }
        fetched
    }
}

fn midnight_timestamp(date: NaiveDate) -> IndexerResult<u64> {
    let timestamp = date
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| IndexerError::ConfigError(format!("invalid date {}", date)))?;
    u64::try_from(timestamp)
        .map_err(|_| IndexerError::ConfigError(format!("{} predates the unix epoch", date)))
}
