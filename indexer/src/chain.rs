use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, B256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::sol;
use alloy::transports::http::Http;
use async_trait::async_trait;
use db::{canonical_hex, RawValue, ToHexString};
use reqwest::Client;
use tracing::info;

use crate::error::{IndexerError, IndexerResult};

pub type ExternalProvider = RootProvider<Http<Client>>;

sol! {
    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// A block with its full transaction objects, as returned by the node.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainBlock {
    pub number: u64,
    pub timestamp: u64,
    pub payload: RawValue,
    pub transactions: Vec<ChainTransaction>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainTransaction {
    pub hash: String,
    pub payload: RawValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainReceipt {
    pub payload: RawValue,
    pub logs: Vec<ChainLog>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChainLog {
    pub log_index: u64,
    pub payload: RawValue,
}

/// Read-only block access.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn latest_block_number(&self) -> IndexerResult<u64>;

    /// Header timestamp of block `number`; a missing block is an error.
    async fn block_timestamp(&self, number: u64) -> IndexerResult<u64>;

    async fn block_with_transactions(&self, number: u64) -> IndexerResult<Option<ChainBlock>>;

    async fn transaction_receipt(&self, tx_hash: &str) -> IndexerResult<Option<ChainReceipt>>;
}

/// ERC-20 metadata reads (`name()`, `symbol()`, `decimals()`).
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token_name(&self, token: Address) -> IndexerResult<String>;
    async fn token_symbol(&self, token: Address) -> IndexerResult<String>;
    async fn token_decimals(&self, token: Address) -> IndexerResult<u8>;
}

#[derive(Clone)]
pub struct RpcChain {
    provider: ExternalProvider,
}

impl RpcChain {
    pub fn new(provider: ExternalProvider) -> Self {
        Self { provider }
    }

    /// Builds an HTTP provider and checks the node answers before any batch
    /// work starts.
    pub async fn connect(endpoint: &str) -> IndexerResult<Self> {
        let url = endpoint
            .parse()
            .map_err(|e| IndexerError::ConfigError(format!("invalid RPC url {}: {}", endpoint, e)))?;
        let provider = ProviderBuilder::new().on_http(url);
        let chain_id = provider.get_chain_id().await?;
        info!("connected to chain {}", chain_id);
        Ok(Self::new(provider))
    }
}

#[async_trait]
impl BlockSource for RpcChain {
    async fn latest_block_number(&self) -> IndexerResult<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn block_timestamp(&self, number: u64) -> IndexerResult<u64> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number), false)
            .await?
            .ok_or(IndexerError::BlockNotFound(number))?;
        Ok(block.header.timestamp)
    }

    async fn block_with_transactions(&self, number: u64) -> IndexerResult<Option<ChainBlock>> {
        let Some(block) = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number), true)
            .await?
        else {
            return Ok(None);
        };

        let transactions = block
            .transactions
            .txns()
            .map(|tx| -> IndexerResult<ChainTransaction> {
                Ok(ChainTransaction {
                    hash: tx.hash.to_hex_string(),
                    payload: RawValue::from_serialize(tx)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        Ok(Some(ChainBlock {
            number: block.header.number,
            timestamp: block.header.timestamp,
            payload: RawValue::from_serialize(&block)?,
            transactions,
        }))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> IndexerResult<Option<ChainReceipt>> {
        let hash: B256 = canonical_hex(tx_hash)
            .parse()
            .map_err(|_| IndexerError::ProviderError(format!("malformed tx hash {}", tx_hash)))?;
        let Some(receipt) = self.provider.get_transaction_receipt(hash).await? else {
            return Ok(None);
        };

        let logs = receipt
            .inner
            .logs()
            .iter()
            .enumerate()
            .map(|(position, log)| -> IndexerResult<ChainLog> {
                Ok(ChainLog {
                    log_index: log.log_index.unwrap_or(position as u64),
                    payload: RawValue::from_serialize(log)?,
                })
            })
            .collect::<IndexerResult<Vec<_>>>()?;

        Ok(Some(ChainReceipt {
            payload: RawValue::from_serialize(&receipt)?,
            logs,
        }))
    }
}

#[async_trait]
impl TokenSource for RpcChain {
    async fn token_name(&self, token: Address) -> IndexerResult<String> {
        let contract = IERC20Metadata::new(token, self.provider.clone());
        Ok(contract.name().call().await?._0)
    }

    async fn token_symbol(&self, token: Address) -> IndexerResult<String> {
        let contract = IERC20Metadata::new(token, self.provider.clone());
        Ok(contract.symbol().call().await?._0)
    }

    async fn token_decimals(&self, token: Address) -> IndexerResult<u8> {
        let contract = IERC20Metadata::new(token, self.provider.clone());
        Ok(contract.decimals().call().await?._0)
    }
}
