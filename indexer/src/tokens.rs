use alloy::primitives::Address;
use async_trait::async_trait;
use chrono::Utc;
use db::{canonical_hex, TokenMemoryCache, TokenModel, TokenRegistry};
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::TokenSource;
use crate::error::IndexerResult;

pub const DEFAULT_NAME: &str = "UNKNOWN";
pub const DEFAULT_SYMBOL: &str = "UNK";
pub const DEFAULT_DECIMALS: i32 = 18;

/// Outcome of one metadata call. A failed call still carries a usable value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldRead<T> {
    Resolved(T),
    Defaulted { value: T, reason: String },
}

impl<T> FieldRead<T> {
    fn from_result(result: IndexerResult<T>, fallback: T) -> Self {
        match result {
            Ok(value) => FieldRead::Resolved(value),
            Err(e) => FieldRead::Defaulted {
                value: fallback,
                reason: e.to_string(),
            },
        }
    }

    pub fn value(&self) -> &T {
        match self {
            FieldRead::Resolved(value) | FieldRead::Defaulted { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            FieldRead::Resolved(value) | FieldRead::Defaulted { value, .. } => value,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OnChainMetadata {
    pub name: FieldRead<String>,
    pub symbol: FieldRead<String>,
    pub decimals: FieldRead<i32>,
}

impl OnChainMetadata {
    fn into_token(self, address: &str) -> TokenModel {
        TokenModel {
            address: address.to_string(),
            symbol: self.symbol.into_value(),
            decimals: self.decimals.into_value(),
            name: self.name.into_value(),
            first_seen: Utc::now().naive_utc(),
        }
    }
}

fn default_token(address: &str) -> TokenModel {
    TokenModel {
        address: address.to_string(),
        symbol: DEFAULT_SYMBOL.to_string(),
        decimals: DEFAULT_DECIMALS,
        name: DEFAULT_NAME.to_string(),
        first_seen: Utc::now().naive_utc(),
    }
}

/// The part of token metadata the transfer decoder needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedToken {
    pub symbol: String,
    pub decimals: i32,
}

impl From<&TokenModel> for ResolvedToken {
    fn from(token: &TokenModel) -> Self {
        Self {
            symbol: token.symbol.clone(),
            decimals: token.decimals,
        }
    }
}

/// Infallible address → (symbol, decimals) lookup.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> ResolvedToken;
}

/// Read-through token metadata: process memory, then the persistent
/// registry, then the token contract itself.
pub struct TokenMetadataCache {
    memory: Option<TokenMemoryCache>,
    registry: Arc<dyn TokenRegistry>,
    source: Arc<dyn TokenSource>,
}

impl TokenMetadataCache {
    pub fn new(
        registry: Arc<dyn TokenRegistry>,
        source: Arc<dyn TokenSource>,
        use_memory: bool,
    ) -> Self {
        Self {
            memory: use_memory.then(TokenMemoryCache::new),
            registry,
            source,
        }
    }

    /// Reads `name`, `symbol` and `decimals` concurrently. Each read falls
    /// back to its default on its own.
    pub async fn read_on_chain(&self, token: Address) -> OnChainMetadata {
        let checksum = token.to_checksum(None);
        let (name, symbol, decimals) = tokio::join!(
            self.source.token_name(token),
            self.source.token_symbol(token),
            self.source.token_decimals(token),
        );

        let metadata = OnChainMetadata {
            name: FieldRead::from_result(name, DEFAULT_NAME.to_string()),
            symbol: FieldRead::from_result(symbol, DEFAULT_SYMBOL.to_string()),
            decimals: FieldRead::from_result(decimals.map(i32::from), DEFAULT_DECIMALS),
        };

        log_defaulted(&checksum, "name", &metadata.name);
        log_defaulted(&checksum, "symbol", &metadata.symbol);
        log_defaulted(&checksum, "decimals", &metadata.decimals);
        debug!(
            "token {}: {} ({}) with {} decimals",
            checksum,
            metadata.name.value(),
            metadata.symbol.value(),
            metadata.decimals.value()
        );
        metadata
    }

    /// Full registry record for `address`. Never fails: registry errors are
    /// logged and the freshly read values are returned instead.
    pub async fn resolve_metadata(&self, address: &str) -> TokenModel {
        let address = canonical_hex(address);

        if let Some(memory) = &self.memory {
            if let Some(token) = memory.get(&address).await {
                return token;
            }
        }

        match self.registry.get_token(&address).await {
            Ok(Some(token)) => {
                self.remember(&token).await;
                return token;
            }
            Ok(None) => {}
            Err(e) => warn!("token registry lookup for {} failed: {}", address, e),
        }

        let token = match address.parse::<Address>() {
            Ok(parsed) => self.read_on_chain(parsed).await.into_token(&address),
            Err(e) => {
                warn!("{} is not a token address ({}), using defaults", address, e);
                return default_token(&address);
            }
        };

        match self.registry.insert_token(&token).await {
            Ok(true) => {
                self.remember(&token).await;
                token
            }
            Ok(false) => match self.registry.get_token(&address).await {
                Ok(Some(stored)) => {
                    debug!("token {} was registered concurrently, using stored row", address);
                    self.remember(&stored).await;
                    stored
                }
                Ok(None) => {
                    warn!("token {} vanished from the registry", address);
                    token
                }
                Err(e) => {
                    warn!("token registry read-back for {} failed: {}", address, e);
                    token
                }
            },
            Err(e) => {
                warn!("failed to register token {}: {}", address, e);
                token
            }
        }
    }

    async fn remember(&self, token: &TokenModel) {
        if let Some(memory) = &self.memory {
            memory.insert(token.clone()).await;
        }
    }
}

fn log_defaulted<T: Debug>(checksum: &str, field: &str, read: &FieldRead<T>) {
    if let FieldRead::Defaulted { value, reason } = read {
        warn!(
            "token {}: {}() failed, defaulting to {:?}: {}",
            checksum, field, value, reason
        );
    }
}

#[async_trait]
impl MetadataResolver for TokenMetadataCache {
    async fn resolve(&self, address: &str) -> ResolvedToken {
        ResolvedToken::from(&self.resolve_metadata(address).await)
    }
}
