use std::{collections::BTreeMap, fmt};

use alloy::primitives::{hex::ToHexExt, FixedBytes};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Inclusive range of block numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn contains(&self, block_number: u64) -> bool {
        self.start <= block_number && block_number <= self.end
    }

    pub fn blocks(&self) -> impl Iterator<Item = u64> {
        self.start..=self.end
    }

    /// Consecutive sub-ranges of at most `size` blocks, in ascending order.
    pub fn chunks(&self, size: u64) -> Vec<BlockRange> {
        let mut out = Vec::new();
        if size == 0 || self.is_empty() {
            return out;
        }
        let mut start = self.start;
        loop {
            let end = start.saturating_add(size - 1).min(self.end);
            out.push(BlockRange::new(start, end));
            if end >= self.end {
                break;
            }
            start = end + 1;
        }
        out
    }

    pub fn start_i64(&self) -> i64 {
        i64::try_from(self.start).unwrap_or(i64::MAX)
    }

    pub fn end_i64(&self) -> i64 {
        i64::try_from(self.end).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Dynamic value as returned by an RPC source before it is persisted.
///
/// Payloads reach the indexer in several shapes: hex strings, raw byte
/// buffers, nested objects and arrays, and integers wider than JSON can
/// carry. Every shape is a variant here so that [`normalize`] can be a
/// single total function.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Map(BTreeMap<String, RawValue>),
    Seq(Vec<RawValue>),
}

impl RawValue {
    /// Captures any serializable RPC object (alloy blocks, transactions,
    /// receipts, logs) as a dynamic value.
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(serde_json::to_value(value)?.into())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, RawValue)>,
        K: Into<String>,
    {
        RawValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        match self {
            RawValue::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, RawValue::Map(_) | RawValue::Seq(_))
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    RawValue::Int(i as i128)
                } else if let Some(u) = n.as_u64() {
                    RawValue::Int(u as i128)
                } else {
                    RawValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => RawValue::Text(s),
            Value::Array(items) => RawValue::Seq(items.into_iter().map(Into::into).collect()),
            Value::Object(entries) => {
                RawValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<u64> for RawValue {
    fn from(value: u64) -> Self {
        RawValue::Int(value as i128)
    }
}

/// Maps a dynamic value to its JSON form.
///
/// Bytes become lowercase `0x` hex, maps and sequences recurse, scalars pass
/// through. Integers outside the 64-bit range are emitted as decimal strings
/// and non-finite floats as `null`, since JSON cannot carry either. Map keys
/// come out sorted, so equal inputs always produce identical JSON text.
pub fn normalize(value: &RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(*b),
        RawValue::Int(i) => {
            if let Ok(small) = i64::try_from(*i) {
                Value::Number(small.into())
            } else if let Ok(unsigned) = u64::try_from(*i) {
                Value::Number(unsigned.into())
            } else {
                Value::String(i.to_string())
            }
        }
        RawValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        RawValue::Text(s) => Value::String(s.clone()),
        RawValue::Bytes(bytes) => Value::String(bytes.as_slice().to_hex_string()),
        RawValue::Map(entries) => Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), normalize(v)))
                .collect::<Map<String, Value>>(),
        ),
        RawValue::Seq(items) => Value::Array(items.iter().map(normalize).collect()),
    }
}

pub fn normalize_to_text(value: &RawValue) -> String {
    normalize(value).to_string()
}

pub trait ToHexString {
    fn to_hex_string(&self) -> String;
}

impl ToHexString for &[u8] {
    fn to_hex_string(&self) -> String {
        to_hex_string_internal(self)
    }
}

impl<const N: usize> ToHexString for FixedBytes<N> {
    fn to_hex_string(&self) -> String {
        to_hex_string_internal(self.as_slice())
    }
}

fn to_hex_string_internal(bytes: &[u8]) -> String {
    bytes.encode_hex_with_prefix()
}

/// Storage form of an address or hash: lowercase, `0x`-prefixed.
pub fn canonical_hex(value: &str) -> String {
    let trimmed = value.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("0x{}", body.to_ascii_lowercase())
}
