use alloy::primitives::U256;
use async_trait::async_trait;
use db::{
    canonical_hex, BlockRange, DecodedBlockModel, DecodedErc20TransferModel, DecodedEventModel,
    DecodedStore, DecodedTransactionModel, RawBlockModel, RawLogModel, RawStore, RawTxReceiptPair,
};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::IndexerResult;
use crate::scheduler::{record_write, BatchJob, BatchOutcome};
use crate::tokens::MetadataResolver;

pub const ERC20_TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";
pub const ERC20_TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const WEI_PER_ETHER: f64 = 1e18;

/// Stored payloads are JSON objects; older rows may hold the object as a
/// JSON-encoded string.
fn payload_object(raw: &Value) -> Option<Cow<'_, Map<String, Value>>> {
    match raw {
        Value::Object(map) => Some(Cow::Borrowed(map)),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(Cow::Owned(map)),
            _ => None,
        },
        _ => None,
    }
}

fn strip_hex_prefix(value: &str) -> Option<&str> {
    value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))
}

/// Parses a quantity given as a JSON number, a `0x` hex string or a decimal
/// string.
fn parse_u256(value: Option<&Value>) -> Option<U256> {
    match value? {
        Value::Number(n) => n.as_u64().map(U256::from),
        Value::String(text) => {
            let text = text.trim();
            match strip_hex_prefix(text) {
                Some(body) if !body.is_empty() => U256::from_str_radix(body, 16).ok(),
                Some(_) => None,
                None => U256::from_str_radix(text, 10).ok(),
            }
        }
        _ => None,
    }
}

fn parse_quantity(value: Option<&Value>) -> Option<i64> {
    parse_u256(value).and_then(|q| i64::try_from(q).ok())
}

fn u256_to_f64(value: U256) -> f64 {
    value.to_string().parse::<f64>().unwrap_or(f64::INFINITY)
}

fn wei_to_ether(value: Option<&Value>) -> Option<f64> {
    parse_u256(value).map(|wei| u256_to_f64(wei) / WEI_PER_ETHER)
}

fn text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::to_string)
}

fn address(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(canonical_hex)
}

/// Selector of the called function: `0x` plus four bytes. Input shorter than
/// a full selector has none.
fn method_id(input: &str) -> Option<String> {
    let body = strip_hex_prefix(input).unwrap_or(input);
    let selector = body.get(..8)?;
    Some(format!("0x{}", selector))
}

/// Transfer classification needs the signature and both address topics as
/// strings in their original positions.
fn is_erc20_transfer(topics: &[Value]) -> bool {
    match topics {
        [Value::String(signature), Value::String(_), Value::String(_), ..] => {
            canonical_hex(signature) == ERC20_TRANSFER_TOPIC
        }
        _ => false,
    }
}

/// Stored form of one topic. Non-string topics keep their JSON text.
fn topic_text(topic: &Value) -> String {
    match topic {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// An indexed address topic is left-padded to 32 bytes; the address is the
/// last 20.
fn topic_address(topic: &str) -> Option<String> {
    let body = strip_hex_prefix(topic).unwrap_or(topic);
    if body.len() < 40 || !body.is_ascii() {
        return None;
    }
    Some(canonical_hex(&body[body.len() - 40..]))
}

/// Big-endian uint256 in the first 32-byte word of the log data.
fn parse_amount(data: &str) -> Option<U256> {
    let body = strip_hex_prefix(data).unwrap_or(data);
    if body.is_empty() || !body.is_ascii() {
        return None;
    }
    U256::from_str_radix(&body[..body.len().min(64)], 16).ok()
}

/// `raw / 10^decimals`, or the unscaled amount when that is not finite.
fn scale_amount(raw: U256, decimals: i32) -> f64 {
    let raw = u256_to_f64(raw);
    let divisor = 10f64.powi(decimals);
    let scaled = raw / divisor;
    if divisor.is_finite() && scaled.is_finite() {
        scaled
    } else {
        raw
    }
}

pub fn decode_blocks(rows: &[RawBlockModel]) -> Vec<DecodedBlockModel> {
    rows.iter()
        .map(|row| {
            let payload = payload_object(&row.raw_json);
            let field = |key: &str| payload.as_ref().and_then(|p| p.get(key));
            DecodedBlockModel {
                block_number: row.block_number,
                block_timestamp: parse_quantity(field("timestamp")),
                miner: address(field("miner")),
                gas_used: parse_quantity(field("gasUsed")),
                gas_limit: parse_quantity(field("gasLimit")),
                base_fee: parse_quantity(field("baseFeePerGas")),
            }
        })
        .collect()
}

pub fn decode_transactions(rows: &[RawTxReceiptPair]) -> Vec<DecodedTransactionModel> {
    rows.iter()
        .map(|row| {
            let tx = payload_object(&row.tx_json);
            let receipt = payload_object(&row.receipt_json);
            let field = |key: &str| tx.as_ref().and_then(|p| p.get(key));
            let input = text(field("input"));
            DecodedTransactionModel {
                tx_hash: row.tx_hash.clone(),
                block_number: row.block_number,
                from_address: address(field("from")),
                to_address: address(field("to")),
                value_eth: wei_to_ether(field("value")),
                gas_price: parse_quantity(field("gasPrice")),
                gas_used: parse_quantity(receipt.as_ref().and_then(|r| r.get("gasUsed"))),
                method_id: input.as_deref().and_then(method_id),
                input,
            }
        })
        .collect()
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodedLogs {
    pub events: Vec<DecodedEventModel>,
    pub transfers: Vec<DecodedErc20TransferModel>,
}

/// One event per log; ERC-20 transfers additionally get a transfer row with
/// the token's metadata.
pub async fn decode_logs(rows: &[RawLogModel], resolver: &dyn MetadataResolver) -> DecodedLogs {
    let mut decoded = DecodedLogs::default();

    for row in rows {
        let payload = payload_object(&row.raw_json);
        let field = |key: &str| payload.as_ref().and_then(|p| p.get(key));

        let contract_address = address(field("address"));
        let raw_topics: &[Value] = field("topics")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let topics: Vec<String> = raw_topics.iter().map(topic_text).collect();
        let data = text(field("data"));

        if is_erc20_transfer(raw_topics) {
            match (&contract_address, topic_address(&topics[1]), topic_address(&topics[2])) {
                (Some(token), Some(from_address), Some(to_address)) => {
                    let token_meta = resolver.resolve(token).await;
                    let amount_raw = data.as_deref().and_then(parse_amount);
                    decoded.transfers.push(DecodedErc20TransferModel {
                        tx_hash: row.tx_hash.clone(),
                        block_number: row.block_number,
                        log_index: row.log_index,
                        token_address: token.clone(),
                        token_symbol: token_meta.symbol,
                        token_decimals: token_meta.decimals,
                        from_address,
                        to_address,
                        amount_raw: amount_raw.map(|raw| raw.to_string()),
                        amount: amount_raw.map(|raw| scale_amount(raw, token_meta.decimals)),
                    });
                }
                _ => debug!(
                    "log {}:{} is not a valid {}, keeping the event only",
                    row.tx_hash, row.log_index, ERC20_TRANSFER_SIGNATURE
                ),
            }
        }

        decoded.events.push(DecodedEventModel {
            tx_hash: row.tx_hash.clone(),
            block_number: row.block_number,
            log_index: row.log_index,
            contract_address,
            event_topic: raw_topics.first().and_then(Value::as_str).map(str::to_string),
            topics: Value::from(topics),
            data,
        });
    }

    decoded
}

/// Rows written per table by one [`DecodePipeline::decode_range`] call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeReport {
    pub raw_blocks: usize,
    pub blocks: Option<usize>,
    pub transactions: Option<usize>,
    pub events: Option<usize>,
    pub transfers: Option<usize>,
    pub failed_writes: usize,
}

pub struct DecodePipeline {
    raw: Arc<dyn RawStore>,
    decoded: Arc<dyn DecodedStore>,
    resolver: Arc<dyn MetadataResolver>,
}

impl DecodePipeline {
    pub fn new(
        raw: Arc<dyn RawStore>,
        decoded: Arc<dyn DecodedStore>,
        resolver: Arc<dyn MetadataResolver>,
    ) -> Self {
        Self {
            raw,
            decoded,
            resolver,
        }
    }

    /// Decodes whatever raw rows exist in `range`. Read failures abort the
    /// range; write failures are logged per table. Transfers are only
    /// written once their events are.
    pub async fn decode_range(&self, range: BlockRange) -> IndexerResult<DecodeReport> {
        let raw_blocks = self.raw.raw_blocks(range).await?;
        let pairs = self.raw.raw_transaction_receipt_pairs(range).await?;
        let raw_logs = self.raw.raw_logs(range).await?;

        let blocks = decode_blocks(&raw_blocks);
        let transactions = decode_transactions(&pairs);
        let logs = decode_logs(&raw_logs, self.resolver.as_ref()).await;

        let mut report = DecodeReport {
            raw_blocks: raw_blocks.len(),
            ..Default::default()
        };
        report.blocks = record_write(
            "decoded_blocks",
            range,
            self.decoded.insert_decoded_blocks(&blocks).await,
            &mut report.failed_writes,
        );
        report.transactions = record_write(
            "decoded_transactions",
            range,
            self.decoded.insert_decoded_transactions(&transactions).await,
            &mut report.failed_writes,
        );
        report.events = record_write(
            "decoded_events",
            range,
            self.decoded.insert_decoded_events(&logs.events).await,
            &mut report.failed_writes,
        );
        if report.events.is_some() {
            report.transfers = record_write(
                "decoded_erc20_transfers",
                range,
                self.decoded.insert_decoded_erc20_transfers(&logs.transfers).await,
                &mut report.failed_writes,
            );
        } else if !logs.transfers.is_empty() {
            warn!(
                "skipping {} transfers for {} since their events were not written",
                logs.transfers.len(),
                range
            );
        }

        info!(
            "decoded {}: {} blocks, {} txs, {} events, {} transfers",
            range,
            blocks.len(),
            transactions.len(),
            logs.events.len(),
            logs.transfers.len()
        );
        Ok(report)
    }
}

pub struct DecodeJob {
    pipeline: Arc<DecodePipeline>,
}

impl DecodeJob {
    pub fn new(pipeline: Arc<DecodePipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl BatchJob for DecodeJob {
    fn name(&self) -> &str {
        "decode"
    }

    async fn run(&self, batch: BlockRange) -> IndexerResult<BatchOutcome> {
        let report = self.pipeline.decode_range(batch).await?;
        Ok(BatchOutcome {
            processed: report.raw_blocks,
            skipped: Vec::new(),
            failed_writes: report.failed_writes,
        })
    }
}
