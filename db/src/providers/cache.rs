use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::TokenModel;

/// Process-local token metadata layer in front of the persistent registry.
///
/// Entries live for the lifetime of the process and are never evicted or
/// updated. Several processes may hold diverging copies; the registry stays
/// authoritative.
#[derive(Default)]
pub struct TokenMemoryCache {
    entries: RwLock<HashMap<String, TokenModel>>,
}

impl TokenMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, address: &str) -> Option<TokenModel> {
        self.entries.read().await.get(address).cloned()
    }

    /// Keeps the first entry seen for an address.
    pub async fn insert(&self, token: TokenModel) {
        self.entries
            .write()
            .await
            .entry(token.address.clone())
            .or_insert(token);
    }
}
