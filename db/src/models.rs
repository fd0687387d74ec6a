use crate::types::{normalize, RawValue};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of bound columns per row, used to keep multi-row inserts under the
/// Postgres bind-parameter limit.
pub trait Columns {
    const COLUMNS: usize;
}

/// A block as fetched from the chain, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub struct RawBlock {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub payload: RawValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawTransaction {
    pub tx_hash: String,
    pub block_number: u64,
    pub payload: RawValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub payload: RawValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawLog {
    pub tx_hash: String,
    pub block_number: u64,
    pub log_index: u64,
    pub payload: RawValue,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(block_number))]
#[diesel(table_name = crate::schema::raw_blocks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RawBlockModel {
    pub block_number: i64,
    pub block_timestamp: i64,
    pub raw_json: Value,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(tx_hash))]
#[diesel(table_name = crate::schema::raw_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RawTransactionModel {
    pub tx_hash: String,
    pub block_number: i64,
    pub raw_json: Value,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(tx_hash))]
#[diesel(table_name = crate::schema::raw_receipts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RawReceiptModel {
    pub tx_hash: String,
    pub block_number: i64,
    pub raw_json: Value,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(tx_hash, log_index))]
#[diesel(table_name = crate::schema::raw_logs)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RawLogModel {
    pub tx_hash: String,
    pub block_number: i64,
    pub log_index: i64,
    pub raw_json: Value,
}

/// A transaction joined with its receipt on `tx_hash`.
#[derive(Clone, Debug, Queryable, Serialize, Deserialize, PartialEq)]
pub struct RawTxReceiptPair {
    pub tx_hash: String,
    pub block_number: i64,
    pub tx_json: Value,
    pub receipt_json: Value,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(block_number))]
#[diesel(table_name = crate::schema::decoded_blocks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DecodedBlockModel {
    pub block_number: i64,
    pub block_timestamp: Option<i64>,
    pub miner: Option<String>,
    pub gas_used: Option<i64>,
    pub gas_limit: Option<i64>,
    pub base_fee: Option<i64>,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(tx_hash))]
#[diesel(table_name = crate::schema::decoded_transactions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DecodedTransactionModel {
    pub tx_hash: String,
    pub block_number: i64,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub value_eth: Option<f64>,
    pub gas_price: Option<i64>,
    pub gas_used: Option<i64>,
    pub input: Option<String>,
    pub method_id: Option<String>,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(tx_hash, log_index))]
#[diesel(table_name = crate::schema::decoded_events)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DecodedEventModel {
    pub tx_hash: String,
    pub block_number: i64,
    pub log_index: i64,
    pub contract_address: Option<String>,
    pub event_topic: Option<String>,
    pub topics: Value,
    pub data: Option<String>,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(tx_hash, log_index))]
#[diesel(table_name = crate::schema::decoded_erc20_transfers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DecodedErc20TransferModel {
    pub tx_hash: String,
    pub block_number: i64,
    pub log_index: i64,
    pub token_address: String,
    pub token_symbol: String,
    pub token_decimals: i32,
    pub from_address: String,
    pub to_address: String,
    pub amount_raw: Option<String>,
    pub amount: Option<f64>,
}

#[derive(
    Clone, Debug, Queryable, Selectable, Insertable, Identifiable, Serialize, Deserialize, PartialEq,
)]
#[diesel(primary_key(address))]
#[diesel(table_name = crate::schema::tokens)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TokenModel {
    pub address: String,
    pub symbol: String,
    pub decimals: i32,
    pub name: String,
    pub first_seen: NaiveDateTime,
}

macro_rules! columns {
    ($($model:ty => $count:expr),+ $(,)?) => {
        $(impl Columns for $model {
            const COLUMNS: usize = $count;
        })+
    };
}

columns! {
    RawBlockModel => 3,
    RawTransactionModel => 3,
    RawReceiptModel => 3,
    RawLogModel => 4,
    DecodedBlockModel => 6,
    DecodedTransactionModel => 9,
    DecodedEventModel => 7,
    DecodedErc20TransferModel => 10,
    TokenModel => 5,
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl From<&RawBlock> for RawBlockModel {
    fn from(value: &RawBlock) -> Self {
        Self {
            block_number: to_i64(value.block_number),
            block_timestamp: to_i64(value.block_timestamp),
            raw_json: normalize(&value.payload),
        }
    }
}

impl From<&RawTransaction> for RawTransactionModel {
    fn from(value: &RawTransaction) -> Self {
        Self {
            tx_hash: value.tx_hash.clone(),
            block_number: to_i64(value.block_number),
            raw_json: normalize(&value.payload),
        }
    }
}

impl From<&RawReceipt> for RawReceiptModel {
    fn from(value: &RawReceipt) -> Self {
        Self {
            tx_hash: value.tx_hash.clone(),
            block_number: to_i64(value.block_number),
            raw_json: normalize(&value.payload),
        }
    }
}

impl From<&RawLog> for RawLogModel {
    fn from(value: &RawLog) -> Self {
        Self {
            tx_hash: value.tx_hash.clone(),
            block_number: to_i64(value.block_number),
            log_index: to_i64(value.log_index),
            raw_json: normalize(&value.payload),
        }
    }
}
