use async_trait::async_trait;

use crate::{
    error::StoreResult, BlockRange, DecodedBlockModel, DecodedErc20TransferModel,
    DecodedEventModel, DecodedTransactionModel, RawBlock, RawBlockModel, RawLog, RawLogModel,
    RawReceipt, RawTransaction, RawTxReceiptPair, TokenModel,
};

/// Insert-if-absent persistence of raw chain data and range reads over it.
///
/// Every insert returns the number of rows actually written; rows whose
/// natural key already exists are skipped, never overwritten. An empty
/// input is a no-op.
#[async_trait]
pub trait RawStore: Send + Sync {
    async fn insert_raw_blocks(&self, rows: &[RawBlock]) -> StoreResult<usize>;
    async fn insert_raw_transactions(&self, rows: &[RawTransaction]) -> StoreResult<usize>;
    async fn insert_raw_receipts(&self, rows: &[RawReceipt]) -> StoreResult<usize>;
    async fn insert_raw_logs(&self, rows: &[RawLog]) -> StoreResult<usize>;

    /// Raw blocks in the range, ascending by block number.
    async fn raw_blocks(&self, range: BlockRange) -> StoreResult<Vec<RawBlockModel>>;

    /// Transactions in the range joined with their receipts, ascending by
    /// block number. Transactions without a stored receipt are omitted.
    async fn raw_transaction_receipt_pairs(
        &self,
        range: BlockRange,
    ) -> StoreResult<Vec<RawTxReceiptPair>>;

    /// Raw logs in the range, ascending by (block number, log index).
    async fn raw_logs(&self, range: BlockRange) -> StoreResult<Vec<RawLogModel>>;
}

#[async_trait]
pub trait DecodedStore: Send + Sync {
    async fn insert_decoded_blocks(&self, rows: &[DecodedBlockModel]) -> StoreResult<usize>;
    async fn insert_decoded_transactions(
        &self,
        rows: &[DecodedTransactionModel],
    ) -> StoreResult<usize>;
    async fn insert_decoded_events(&self, rows: &[DecodedEventModel]) -> StoreResult<usize>;
    async fn insert_decoded_erc20_transfers(
        &self,
        rows: &[DecodedErc20TransferModel],
    ) -> StoreResult<usize>;
}

/// Persistent, write-once registry of token metadata keyed by lowercase
/// address.
#[async_trait]
pub trait TokenRegistry: Send + Sync {
    async fn get_token(&self, address: &str) -> StoreResult<Option<TokenModel>>;

    /// Returns `false` when a row for the address already existed, in which
    /// case the stored row is left untouched.
    async fn insert_token(&self, token: &TokenModel) -> StoreResult<bool>;
}
