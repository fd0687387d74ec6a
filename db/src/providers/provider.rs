use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::{
    pooled_connection::deadpool::Object, AsyncConnection, AsyncPgConnection, RunQueryDsl,
};
use rayon::prelude::*;
use scoped_futures::ScopedFutureExt;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::schema::{
    decoded_blocks, decoded_erc20_transfers, decoded_events, decoded_transactions, raw_blocks,
    raw_logs, raw_receipts, raw_transactions, tokens,
};
use crate::{
    BlockRange, Columns, DatabaseConnections, DecodedBlockModel, DecodedErc20TransferModel,
    DecodedEventModel, DecodedStore, DecodedTransactionModel, RawBlock, RawBlockModel, RawLog,
    RawLogModel, RawReceipt, RawReceiptModel, RawStore, RawTransaction, RawTransactionModel,
    RawTxReceiptPair, TokenModel, TokenRegistry,
};

/// Postgres caps a single statement at 65535 bind parameters.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

type PooledConnection = Object<AsyncPgConnection>;

pub fn rows_per_statement<M: Columns>() -> usize {
    (MAX_BIND_PARAMS / M::COLUMNS).max(1)
}

/// Multi-row `INSERT ... ON CONFLICT DO NOTHING`, chunked under the bind
/// limit. All chunks share one transaction so a failure rolls back only this
/// call.
macro_rules! insert_ignoring_conflicts {
    ($self:ident, $table:expr, $model:ty, $models:expr) => {{
        let models: Vec<$model> = $models;
        if models.is_empty() {
            return Ok(0);
        }
        let chunk_size = rows_per_statement::<$model>();
        let mut conn = $self.connection().await?;
        conn.transaction::<usize, StoreError, _>(|conn| {
            async move {
                let mut inserted = 0;
                for chunk in models.chunks(chunk_size) {
                    inserted += diesel::insert_into($table)
                        .values(chunk)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }
                Ok(inserted)
            }
            .scope_boxed()
        })
        .await
    }};
}

#[derive(Clone)]
pub struct InternalDataProvider {
    pub dbc: DatabaseConnections,
}

impl InternalDataProvider {
    pub async fn new() -> StoreResult<Self> {
        Ok(InternalDataProvider {
            dbc: DatabaseConnections::init().await?,
        })
    }

    async fn connection(&self) -> StoreResult<PooledConnection> {
        self.dbc
            .postgres
            .get()
            .await
            .map_err(|e| StoreError::PoolError(e.to_string()))
    }
}

#[async_trait]
impl RawStore for InternalDataProvider {
    async fn insert_raw_blocks(&self, rows: &[RawBlock]) -> StoreResult<usize> {
        let inserted = insert_ignoring_conflicts!(
            self,
            raw_blocks::table,
            RawBlockModel,
            rows.par_iter().map(RawBlockModel::from).collect()
        )?;
        debug!("raw_blocks: {} of {} rows inserted", inserted, rows.len());
        Ok(inserted)
    }

    async fn insert_raw_transactions(&self, rows: &[RawTransaction]) -> StoreResult<usize> {
        let inserted = insert_ignoring_conflicts!(
            self,
            raw_transactions::table,
            RawTransactionModel,
            rows.par_iter().map(RawTransactionModel::from).collect()
        )?;
        debug!("raw_transactions: {} of {} rows inserted", inserted, rows.len());
        Ok(inserted)
    }

    async fn insert_raw_receipts(&self, rows: &[RawReceipt]) -> StoreResult<usize> {
        let inserted = insert_ignoring_conflicts!(
            self,
            raw_receipts::table,
            RawReceiptModel,
            rows.par_iter().map(RawReceiptModel::from).collect()
        )?;
        debug!("raw_receipts: {} of {} rows inserted", inserted, rows.len());
        Ok(inserted)
    }

    async fn insert_raw_logs(&self, rows: &[RawLog]) -> StoreResult<usize> {
        let inserted = insert_ignoring_conflicts!(
            self,
            raw_logs::table,
            RawLogModel,
            rows.par_iter().map(RawLogModel::from).collect()
        )?;
        debug!("raw_logs: {} of {} rows inserted", inserted, rows.len());
        Ok(inserted)
    }

    async fn raw_blocks(&self, range: BlockRange) -> StoreResult<Vec<RawBlockModel>> {
        let mut conn = self.connection().await?;
        let rows = raw_blocks::table
            .filter(raw_blocks::block_number.between(range.start_i64(), range.end_i64()))
            .order(raw_blocks::block_number.asc())
            .select(RawBlockModel::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn raw_transaction_receipt_pairs(
        &self,
        range: BlockRange,
    ) -> StoreResult<Vec<RawTxReceiptPair>> {
        let mut conn = self.connection().await?;
        let rows = raw_transactions::table
            .inner_join(raw_receipts::table.on(raw_receipts::tx_hash.eq(raw_transactions::tx_hash)))
            .filter(raw_transactions::block_number.between(range.start_i64(), range.end_i64()))
            .order((
                raw_transactions::block_number.asc(),
                raw_transactions::tx_hash.asc(),
            ))
            .select((
                raw_transactions::tx_hash,
                raw_transactions::block_number,
                raw_transactions::raw_json,
                raw_receipts::raw_json,
            ))
            .load::<RawTxReceiptPair>(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn raw_logs(&self, range: BlockRange) -> StoreResult<Vec<RawLogModel>> {
        let mut conn = self.connection().await?;
        let rows = raw_logs::table
            .filter(raw_logs::block_number.between(range.start_i64(), range.end_i64()))
            .order((raw_logs::block_number.asc(), raw_logs::log_index.asc()))
            .select(RawLogModel::as_select())
            .load(&mut conn)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl DecodedStore for InternalDataProvider {
    async fn insert_decoded_blocks(&self, rows: &[DecodedBlockModel]) -> StoreResult<usize> {
        insert_ignoring_conflicts!(self, decoded_blocks::table, DecodedBlockModel, rows.to_vec())
    }

    async fn insert_decoded_transactions(
        &self,
        rows: &[DecodedTransactionModel],
    ) -> StoreResult<usize> {
        insert_ignoring_conflicts!(
            self,
            decoded_transactions::table,
            DecodedTransactionModel,
            rows.to_vec()
        )
    }

    async fn insert_decoded_events(&self, rows: &[DecodedEventModel]) -> StoreResult<usize> {
        insert_ignoring_conflicts!(self, decoded_events::table, DecodedEventModel, rows.to_vec())
    }

    async fn insert_decoded_erc20_transfers(
        &self,
        rows: &[DecodedErc20TransferModel],
    ) -> StoreResult<usize> {
        insert_ignoring_conflicts!(
            self,
            decoded_erc20_transfers::table,
            DecodedErc20TransferModel,
            rows.to_vec()
        )
    }
}

#[async_trait]
impl TokenRegistry for InternalDataProvider {
    async fn get_token(&self, address: &str) -> StoreResult<Option<TokenModel>> {
        let mut conn = self.connection().await?;
        let token = tokens::table
            .find(address)
            .select(TokenModel::as_select())
            .first(&mut conn)
            .await
            .optional()?;
        Ok(token)
    }

    async fn insert_token(&self, token: &TokenModel) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let inserted = diesel::insert_into(tokens::table)
            .values(token)
            .on_conflict(tokens::address)
            .do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted > 0)
    }
}
