//! Explicit adapter-cache context object.
//!
//! Maps chain id to adapter instance, separately keyed for read-only and
//! wallet-capable roles, lazily populated through a factory keyed on
//! chain family. Lifetime equals session lifetime: entries are replaced
//! wholesale via [`AdapterRegistry::clear`] on reconnect, there is no
//! finer-grained teardown. A race constructing the same adapter twice is
//! harmless; the last write wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::chainadapter::{ChainAdapter, WalletAdapter};
use crate::cosmos::CosmosAdapter;
use crate::error::XCallError;
use crate::evm::EvmAdapter;
use crate::icon::IconAdapter;
use crate::types::{ChainConfig, ChainFamily, ChainId};

/// Builds adapter instances for a chain, keyed on its family.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn make_adapter(
        &self,
        config: &ChainConfig,
    ) -> Result<Arc<dyn ChainAdapter>, XCallError>;

    async fn make_wallet_adapter(
        &self,
        config: &ChainConfig,
    ) -> Result<Arc<dyn WalletAdapter>, XCallError>;
}

/// Factory wiring each family's adapter to its RPC/signing client.
pub struct DefaultAdapterFactory;

#[async_trait]
impl AdapterFactory for DefaultAdapterFactory {
    async fn make_adapter(
        &self,
        config: &ChainConfig,
    ) -> Result<Arc<dyn ChainAdapter>, XCallError> {
        Ok(match config.family {
            ChainFamily::Evm => Arc::new(EvmAdapter::new(config.clone())?),
            ChainFamily::Icon => Arc::new(IconAdapter::new(config.clone())?),
            ChainFamily::Cosmos => Arc::new(CosmosAdapter::new(config.clone())?),
        })
    }

    async fn make_wallet_adapter(
        &self,
        config: &ChainConfig,
    ) -> Result<Arc<dyn WalletAdapter>, XCallError> {
        Ok(match config.family {
            ChainFamily::Evm => Arc::new(EvmAdapter::with_signer(config.clone())?),
            ChainFamily::Icon => Arc::new(IconAdapter::with_signer(config.clone())?),
            ChainFamily::Cosmos => Arc::new(CosmosAdapter::with_signer(config.clone())?),
        })
    }
}

/// Session-scoped cache of adapter instances.
pub struct AdapterRegistry {
    configs: HashMap<ChainId, ChainConfig>,
    factory: Arc<dyn AdapterFactory>,
    readers: RwLock<HashMap<ChainId, Arc<dyn ChainAdapter>>>,
    wallets: RwLock<HashMap<ChainId, Arc<dyn WalletAdapter>>>,
}

impl AdapterRegistry {
    pub fn new(configs: Vec<ChainConfig>) -> Self {
        Self::with_factory(configs, Arc::new(DefaultAdapterFactory))
    }

    pub fn with_factory(configs: Vec<ChainConfig>, factory: Arc<dyn AdapterFactory>) -> Self {
        Self {
            configs: configs
                .into_iter()
                .map(|c| (c.chain_id.clone(), c))
                .collect(),
            factory,
            readers: RwLock::new(HashMap::new()),
            wallets: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self, chain_id: &ChainId) -> Result<&ChainConfig, XCallError> {
        self.configs
            .get(chain_id)
            .ok_or_else(|| XCallError::Configuration(format!("unknown chain id: {chain_id}")))
    }

    /// Read-only adapter for a chain, constructed on first request.
    pub async fn adapter(&self, chain_id: &ChainId) -> Result<Arc<dyn ChainAdapter>, XCallError> {
        if let Some(adapter) = self.readers.read().await.get(chain_id) {
            return Ok(adapter.clone());
        }

        let config = self.config(chain_id)?;
        debug!(%chain_id, family = ?config.family, "constructing read-only adapter");
        let adapter = self.factory.make_adapter(config).await?;

        let mut readers = self.readers.write().await;
        readers.insert(chain_id.clone(), adapter.clone());
        Ok(adapter)
    }

    /// Wallet-capable adapter for a chain, constructed on first request.
    pub async fn wallet_adapter(
        &self,
        chain_id: &ChainId,
    ) -> Result<Arc<dyn WalletAdapter>, XCallError> {
        if let Some(adapter) = self.wallets.read().await.get(chain_id) {
            return Ok(adapter.clone());
        }

        let config = self.config(chain_id)?;
        debug!(%chain_id, family = ?config.family, "constructing wallet adapter");
        let adapter = self.factory.make_wallet_adapter(config).await?;

        let mut wallets = self.wallets.write().await;
        wallets.insert(chain_id.clone(), adapter.clone());
        Ok(adapter)
    }

    pub async fn has_adapter(&self, chain_id: &ChainId) -> bool {
        self.readers.read().await.contains_key(chain_id)
    }

    /// Drops cached instances for one chain; the next request rebuilds.
    pub async fn invalidate(&self, chain_id: &ChainId) {
        info!(%chain_id, "invalidating cached adapters");
        self.readers.write().await.remove(chain_id);
        self.wallets.write().await.remove(chain_id);
    }

    /// Drops every cached instance, e.g. on wallet reconnect.
    pub async fn clear(&self) {
        self.readers.write().await.clear();
        self.wallets.write().await.clear();
    }

    pub async fn cached_chain_ids(&self) -> Vec<ChainId> {
        self.readers.read().await.keys().cloned().collect()
    }

    pub fn known_chain_ids(&self) -> Vec<ChainId> {
        self.configs.keys().cloned().collect()
    }
}
