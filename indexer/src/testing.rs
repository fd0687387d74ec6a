//! In-memory chain and store used by the unit tests.

use alloy::primitives::Address;
use async_trait::async_trait;
use db::{
    BlockRange, DecodedBlockModel, DecodedErc20TransferModel, DecodedEventModel, DecodedStore,
    DecodedTransactionModel, RawBlock, RawBlockModel, RawLog, RawLogModel, RawReceipt,
    RawReceiptModel, RawStore, RawTransaction, RawTransactionModel, RawTxReceiptPair, RawValue,
    StoreError, StoreResult, TokenModel, TokenRegistry,
};
use std::collections::{btree_map::Entry, BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::chain::{BlockSource, ChainBlock, ChainLog, ChainReceipt, ChainTransaction, TokenSource};
use crate::decoder::ERC20_TRANSFER_TOPIC;
use crate::error::{IndexerError, IndexerResult};

/// Contract every fake transaction's Transfer log is emitted by.
pub const FAKE_TOKEN: &str = "0x00000000000000000000000000000000000000aa";
pub const FAKE_SENDER: &str = "0x1111111111111111111111111111111111111111";
pub const FAKE_RECIPIENT: &str = "0x2222222222222222222222222222222222222222";

#[derive(Clone, Default)]
struct FakeToken {
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<u8>,
}

/// Deterministic chain: every transaction moves 100 units of [`FAKE_TOKEN`]
/// from [`FAKE_SENDER`] to [`FAKE_RECIPIENT`] and emits one Transfer log.
#[derive(Default)]
pub struct FakeChain {
    blocks: BTreeMap<u64, (u64, usize)>,
    transactions: HashMap<String, (u64, usize)>,
    failing_blocks: HashSet<u64>,
    failing_receipts: HashSet<String>,
    tokens: HashMap<Address, FakeToken>,
    token_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, number: u64, timestamp: u64, tx_count: usize) {
        for index in 0..tx_count {
            let tx_hash = self.transaction_hash(number, index);
            self.transactions.insert(tx_hash, (number, index));
        }
        self.blocks.insert(number, (timestamp, tx_count));
    }

    /// Adds `range` with 12 second spacing and `tx_count` transactions each.
    pub fn add_blocks(&mut self, range: BlockRange, tx_count: usize) {
        for number in range.blocks() {
            self.add_block(number, 1_700_000_000 + number * 12, tx_count);
        }
    }

    pub fn fail_block(&mut self, number: u64) {
        self.failing_blocks.insert(number);
    }

    pub fn fail_receipt(&mut self, tx_hash: &str) {
        self.failing_receipts.insert(tx_hash.to_string());
    }

    pub fn transaction_hash(&self, block: u64, index: usize) -> String {
        format!("0x{:064x}", block * 1_000 + index as u64)
    }

    pub fn add_token(&mut self, address: &str, name: &str, symbol: &str, decimals: u8) {
        self.add_partial_token(address, Some(name), Some(symbol), Some(decimals));
    }

    /// Registers a token whose `None` fields revert when read.
    pub fn add_partial_token(
        &mut self,
        address: &str,
        name: Option<&str>,
        symbol: Option<&str>,
        decimals: Option<u8>,
    ) {
        let address: Address = address.parse().expect("valid test address");
        self.tokens.insert(
            address,
            FakeToken {
                name: name.map(str::to_string),
                symbol: symbol.map(str::to_string),
                decimals,
            },
        );
    }

    /// Number of `name`/`symbol`/`decimals` calls served so far.
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    fn token(&self, address: Address) -> FakeToken {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.get(&address).cloned().unwrap_or_default()
    }

    fn transaction_payload(&self, number: u64, index: usize) -> RawValue {
        RawValue::map([
            ("hash", RawValue::from(self.transaction_hash(number, index))),
            ("blockNumber", RawValue::from(format!("{:#x}", number))),
            ("from", RawValue::from(FAKE_SENDER)),
            ("to", RawValue::from(FAKE_TOKEN)),
            ("value", RawValue::from("0xde0b6b3a7640000")),
            ("gasPrice", RawValue::from("0x3b9aca00")),
            (
                "input",
                RawValue::from(format!("0xa9059cbb{:064x}", index)),
            ),
        ])
    }

    fn transfer_log(&self, number: u64, index: usize) -> ChainLog {
        let pad = |address: &str| format!("0x{:0>64}", address.trim_start_matches("0x"));
        ChainLog {
            log_index: index as u64,
            payload: RawValue::map([
                ("address", RawValue::from(FAKE_TOKEN)),
                (
                    "topics",
                    RawValue::Seq(vec![
                        RawValue::from(ERC20_TRANSFER_TOPIC),
                        RawValue::from(pad(FAKE_SENDER)),
                        RawValue::from(pad(FAKE_RECIPIENT)),
                    ]),
                ),
                ("data", RawValue::from(format!("0x{:064x}", 100))),
                ("logIndex", RawValue::from(format!("{:#x}", index))),
                ("blockNumber", RawValue::from(format!("{:#x}", number))),
                (
                    "transactionHash",
                    RawValue::from(self.transaction_hash(number, index)),
                ),
            ]),
        }
    }
}

#[async_trait]
impl BlockSource for FakeChain {
    async fn latest_block_number(&self) -> IndexerResult<u64> {
        Ok(self.blocks.keys().next_back().copied().unwrap_or_default())
    }

    async fn block_timestamp(&self, number: u64) -> IndexerResult<u64> {
        self.blocks
            .get(&number)
            .map(|(timestamp, _)| *timestamp)
            .ok_or(IndexerError::BlockNotFound(number))
    }

    async fn block_with_transactions(&self, number: u64) -> IndexerResult<Option<ChainBlock>> {
        if self.failing_blocks.contains(&number) {
            return Err(IndexerError::ProviderError(format!("block {} unavailable", number)));
        }
        let Some((timestamp, tx_count)) = self.blocks.get(&number).copied() else {
            return Ok(None);
        };

        let transactions = (0..tx_count)
            .map(|index| ChainTransaction {
                hash: self.transaction_hash(number, index).to_uppercase().replacen("0X", "0x", 1),
                payload: self.transaction_payload(number, index),
            })
            .collect();

        Ok(Some(ChainBlock {
            number,
            timestamp,
            payload: RawValue::map([
                ("number", RawValue::from(format!("{:#x}", number))),
                ("hash", RawValue::Bytes(number.to_be_bytes().to_vec())),
                ("timestamp", RawValue::from(format!("{:#x}", timestamp))),
                ("miner", RawValue::from("0x95222290DD7278Aa3Ddd389Cc1E1d165CC4BAfe5")),
                ("gasUsed", RawValue::from(21_000 * tx_count as u64)),
                ("gasLimit", RawValue::from("0x1c9c380")),
                ("baseFeePerGas", RawValue::from("0x7")),
            ]),
            transactions,
        }))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> IndexerResult<Option<ChainReceipt>> {
        if self.failing_receipts.contains(tx_hash) {
            return Err(IndexerError::ProviderError(format!("receipt {} unavailable", tx_hash)));
        }
        let Some((number, index)) = self.transactions.get(tx_hash).copied() else {
            return Ok(None);
        };

        Ok(Some(ChainReceipt {
            payload: RawValue::map([
                ("transactionHash", RawValue::from(tx_hash)),
                ("blockNumber", RawValue::from(format!("{:#x}", number))),
                ("gasUsed", RawValue::from("0xc350")),
                ("status", RawValue::from("0x1")),
            ]),
            logs: vec![self.transfer_log(number, index)],
        }))
    }
}

#[async_trait]
impl TokenSource for FakeChain {
    async fn token_name(&self, token: Address) -> IndexerResult<String> {
        self.token(token)
            .name
            .ok_or_else(|| IndexerError::ProviderError("name() reverted".to_string()))
    }

    async fn token_symbol(&self, token: Address) -> IndexerResult<String> {
        self.token(token)
            .symbol
            .ok_or_else(|| IndexerError::ProviderError("symbol() reverted".to_string()))
    }

    async fn token_decimals(&self, token: Address) -> IndexerResult<u8> {
        self.token(token)
            .decimals
            .ok_or_else(|| IndexerError::ProviderError("decimals() reverted".to_string()))
    }
}

/// Insert-if-absent store over ordered maps, with per-table failure
/// injection.
#[derive(Default)]
pub struct MemoryStore {
    raw_blocks: Mutex<BTreeMap<i64, RawBlockModel>>,
    raw_transactions: Mutex<BTreeMap<String, RawTransactionModel>>,
    raw_receipts: Mutex<BTreeMap<String, RawReceiptModel>>,
    raw_logs: Mutex<BTreeMap<(String, i64), RawLogModel>>,
    decoded_blocks: Mutex<BTreeMap<i64, DecodedBlockModel>>,
    decoded_transactions: Mutex<BTreeMap<String, DecodedTransactionModel>>,
    decoded_events: Mutex<BTreeMap<(String, i64), DecodedEventModel>>,
    decoded_transfers: Mutex<BTreeMap<(String, i64), DecodedErc20TransferModel>>,
    tokens: Mutex<BTreeMap<String, TokenModel>>,
    failing_tables: Mutex<HashSet<&'static str>>,
    token_inserts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later read or write of `table` fails.
    pub fn fail_table(&self, table: &'static str) {
        self.failing_tables.lock().unwrap().insert(table);
    }

    /// Successful token inserts, i.e. rows actually created.
    pub fn token_inserts(&self) -> usize {
        self.token_inserts.load(Ordering::SeqCst)
    }

    pub fn tokens(&self) -> Vec<TokenModel> {
        self.tokens.lock().unwrap().values().cloned().collect()
    }

    pub fn decoded_blocks(&self) -> Vec<DecodedBlockModel> {
        self.decoded_blocks.lock().unwrap().values().cloned().collect()
    }

    pub fn decoded_transactions(&self) -> Vec<DecodedTransactionModel> {
        self.decoded_transactions.lock().unwrap().values().cloned().collect()
    }

    pub fn decoded_events(&self) -> Vec<DecodedEventModel> {
        self.decoded_events.lock().unwrap().values().cloned().collect()
    }

    pub fn decoded_transfers(&self) -> Vec<DecodedErc20TransferModel> {
        self.decoded_transfers.lock().unwrap().values().cloned().collect()
    }

    /// Distinct block numbers present in `table`.
    pub fn blocks_in(&self, table: &str) -> BTreeSet<i64> {
        match table {
            "raw_blocks" => self.raw_blocks.lock().unwrap().keys().copied().collect(),
            "raw_transactions" => collect_blocks(&self.raw_transactions, |r| r.block_number),
            "raw_receipts" => collect_blocks(&self.raw_receipts, |r| r.block_number),
            "raw_logs" => collect_blocks(&self.raw_logs, |r| r.block_number),
            "decoded_blocks" => self.decoded_blocks.lock().unwrap().keys().copied().collect(),
            "decoded_transactions" => {
                collect_blocks(&self.decoded_transactions, |r| r.block_number)
            }
            "decoded_events" => collect_blocks(&self.decoded_events, |r| r.block_number),
            "decoded_erc20_transfers" => {
                collect_blocks(&self.decoded_transfers, |r| r.block_number)
            }
            other => panic!("unknown table {}", other),
        }
    }

    fn check(&self, table: &'static str) -> StoreResult<()> {
        if self.failing_tables.lock().unwrap().contains(table) {
            return Err(StoreError::PoolError(format!("{} unavailable", table)));
        }
        Ok(())
    }

    fn insert_absent<K: Ord, V>(
        &self,
        table: &'static str,
        rows: &Mutex<BTreeMap<K, V>>,
        new_rows: impl IntoIterator<Item = (K, V)>,
    ) -> StoreResult<usize> {
        self.check(table)?;
        let mut rows = rows.lock().unwrap();
        let mut inserted = 0;
        for (key, row) in new_rows {
            if let Entry::Vacant(slot) = rows.entry(key) {
                slot.insert(row);
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

fn collect_blocks<K, V>(rows: &Mutex<BTreeMap<K, V>>, block: impl Fn(&V) -> i64) -> BTreeSet<i64> {
    rows.lock().unwrap().values().map(block).collect()
}

fn in_range(range: BlockRange, block_number: i64) -> bool {
    u64::try_from(block_number).map_or(false, |number| range.contains(number))
}

#[async_trait]
impl RawStore for MemoryStore {
    async fn insert_raw_blocks(&self, rows: &[RawBlock]) -> StoreResult<usize> {
        self.insert_absent(
            "raw_blocks",
            &self.raw_blocks,
            rows.iter().map(RawBlockModel::from).map(|m| (m.block_number, m)),
        )
    }

    async fn insert_raw_transactions(&self, rows: &[RawTransaction]) -> StoreResult<usize> {
        self.insert_absent(
            "raw_transactions",
            &self.raw_transactions,
            rows.iter()
                .map(RawTransactionModel::from)
                .map(|m| (m.tx_hash.clone(), m)),
        )
    }

    async fn insert_raw_receipts(&self, rows: &[RawReceipt]) -> StoreResult<usize> {
        self.insert_absent(
            "raw_receipts",
            &self.raw_receipts,
            rows.iter()
                .map(RawReceiptModel::from)
                .map(|m| (m.tx_hash.clone(), m)),
        )
    }

    async fn insert_raw_logs(&self, rows: &[RawLog]) -> StoreResult<usize> {
        self.insert_absent(
            "raw_logs",
            &self.raw_logs,
            rows.iter()
                .map(RawLogModel::from)
                .map(|m| ((m.tx_hash.clone(), m.log_index), m)),
        )
    }

    async fn raw_blocks(&self, range: BlockRange) -> StoreResult<Vec<RawBlockModel>> {
        self.check("raw_blocks")?;
        Ok(self
            .raw_blocks
            .lock()
            .unwrap()
            .values()
            .filter(|b| in_range(range, b.block_number))
            .cloned()
            .collect())
    }

    async fn raw_transaction_receipt_pairs(
        &self,
        range: BlockRange,
    ) -> StoreResult<Vec<RawTxReceiptPair>> {
        self.check("raw_transactions")?;
        self.check("raw_receipts")?;
        let receipts = self.raw_receipts.lock().unwrap();
        let mut pairs: Vec<RawTxReceiptPair> = self
            .raw_transactions
            .lock()
            .unwrap()
            .values()
            .filter(|tx| in_range(range, tx.block_number))
            .filter_map(|tx| {
                receipts.get(&tx.tx_hash).map(|receipt| RawTxReceiptPair {
                    tx_hash: tx.tx_hash.clone(),
                    block_number: tx.block_number,
                    tx_json: tx.raw_json.clone(),
                    receipt_json: receipt.raw_json.clone(),
                })
            })
            .collect();
        pairs.sort_by_key(|pair| pair.block_number);
        Ok(pairs)
    }

    async fn raw_logs(&self, range: BlockRange) -> StoreResult<Vec<RawLogModel>> {
        self.check("raw_logs")?;
        let mut logs: Vec<RawLogModel> = self
            .raw_logs
            .lock()
            .unwrap()
            .values()
            .filter(|log| in_range(range, log.block_number))
            .cloned()
            .collect();
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        Ok(logs)
    }
}

#[async_trait]
impl DecodedStore for MemoryStore {
    async fn insert_decoded_blocks(&self, rows: &[DecodedBlockModel]) -> StoreResult<usize> {
        self.insert_absent(
            "decoded_blocks",
            &self.decoded_blocks,
            rows.iter().cloned().map(|m| (m.block_number, m)),
        )
    }

    async fn insert_decoded_transactions(
        &self,
        rows: &[DecodedTransactionModel],
    ) -> StoreResult<usize> {
        self.insert_absent(
            "decoded_transactions",
            &self.decoded_transactions,
            rows.iter().cloned().map(|m| (m.tx_hash.clone(), m)),
        )
    }

    async fn insert_decoded_events(&self, rows: &[DecodedEventModel]) -> StoreResult<usize> {
        self.insert_absent(
            "decoded_events",
            &self.decoded_events,
            rows.iter()
                .cloned()
                .map(|m| ((m.tx_hash.clone(), m.log_index), m)),
        )
    }

    async fn insert_decoded_erc20_transfers(
        &self,
        rows: &[DecodedErc20TransferModel],
    ) -> StoreResult<usize> {
        self.insert_absent(
            "decoded_erc20_transfers",
            &self.decoded_transfers,
            rows.iter()
                .cloned()
                .map(|m| ((m.tx_hash.clone(), m.log_index), m)),
        )
    }
}

#[async_trait]
impl TokenRegistry for MemoryStore {
    async fn get_token(&self, address: &str) -> StoreResult<Option<TokenModel>> {
        self.check("tokens")?;
        Ok(self.tokens.lock().unwrap().get(address).cloned())
    }

    async fn insert_token(&self, token: &TokenModel) -> StoreResult<bool> {
        let inserted = self.insert_absent(
            "tokens",
            &self.tokens,
            [(token.address.clone(), token.clone())],
        )?;
        self.token_inserts.fetch_add(inserted, Ordering::SeqCst);
        Ok(inserted > 0)
    }
}
