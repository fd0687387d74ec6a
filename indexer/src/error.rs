use alloy::transports::TransportError;
use db::StoreError;
use serde_json::Error as SerdeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("Deserialization Error: {0}")]
    DeserializationError(#[from] SerdeError),

    #[error("RPC Transport Error: {0}")]
    TransportError(#[from] TransportError),

    #[error("Contract Call Error: {0}")]
    ContractError(#[from] alloy::contract::Error),

    #[error("Store Error: {0}")]
    StoreError(#[from] StoreError),

    #[error("External Provider Error: {0}")]
    ProviderError(String),

    #[error("Block {0} not found")]
    BlockNotFound(u64),

    #[error("Receipt for transaction {0} not found")]
    ReceiptNotFound(String),

    #[error("Configuration Error: {0}")]
    ConfigError(String),
}

pub type IndexerResult<T> = Result<T, IndexerError>;
