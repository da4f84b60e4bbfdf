//! Read-only chain access.
//!
//! No retries happen here; retry policy belongs to the caller so that a
//! persistent misconfiguration (wrong contract address, wrong RPC) surfaces
//! instead of being retried away.

use std::sync::Arc;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, U256};
use tracing::debug;

use crate::chains::ChainId;
use crate::config::BridgeConfig;
use crate::contracts::{BinanceBridge, RupayaBridge};
use crate::error::{BridgeError, BridgeResult};
use crate::types::BridgeLimits;

/// Read-only queries against both chains.
///
/// Implementations must be safe to call concurrently for different chains.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native gas-token balance of `address`, in smallest units.
    async fn native_balance(&self, address: Address, chain: ChainId) -> BridgeResult<U256>;

    /// Current limits published by the bridge contract on `chain`.
    async fn bridge_limits(&self, chain: ChainId) -> BridgeResult<BridgeLimits>;

    /// Wrapped-token balance of `address`, in smallest units.
    async fn token_balance(&self, address: Address, chain: ChainId) -> BridgeResult<U256>;
}

/// [`ChainClient`] over plain JSON-RPC endpoints.
pub struct EvmChainClient {
    rupaya_provider: Arc<Provider<Http>>,
    binance_provider: Arc<Provider<Http>>,
    rupaya_bridge: RupayaBridge<Provider<Http>>,
    binance_bridge: BinanceBridge<Provider<Http>>,
}

impl EvmChainClient {
    pub fn new(config: &BridgeConfig) -> BridgeResult<Self> {
        let rupaya_provider = Arc::new(http_provider(&config.rupaya.rpc_url)?);
        let binance_provider = Arc::new(http_provider(&config.binance.rpc_url)?);

        Ok(Self {
            rupaya_bridge: RupayaBridge::new(config.rupaya.bridge_contract, rupaya_provider.clone()),
            binance_bridge: BinanceBridge::new(
                config.binance.bridge_contract,
                binance_provider.clone(),
            ),
            rupaya_provider,
            binance_provider,
        })
    }

    fn provider(&self, chain: ChainId) -> &Provider<Http> {
        match chain {
            ChainId::RupayaTestnet => self.rupaya_provider.as_ref(),
            ChainId::BinanceTestnet => self.binance_provider.as_ref(),
        }
    }

    async fn rupaya_limits(&self) -> BridgeResult<(U256, U256)> {
        let chain = ChainId::RupayaTestnet;
        let max_call = self.rupaya_bridge.max_transfer_amount();
        let cooldown_call = self.rupaya_bridge.transfer_cooldown();
        tokio::try_join!(max_call.call(), cooldown_call.call())
            .map_err(|e| BridgeError::chain_query(chain, e))
    }

    async fn binance_limits(&self) -> BridgeResult<(U256, U256)> {
        let chain = ChainId::BinanceTestnet;
        let max_call = self.binance_bridge.max_transfer_amount();
        let cooldown_call = self.binance_bridge.transfer_cooldown();
        tokio::try_join!(max_call.call(), cooldown_call.call())
            .map_err(|e| BridgeError::chain_query(chain, e))
    }
}

pub(crate) fn http_provider(url: &str) -> BridgeResult<Provider<Http>> {
    Provider::<Http>::try_from(url)
        .map_err(|e| BridgeError::Config(format!("invalid RPC URL {url}: {e}")))
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn native_balance(&self, address: Address, chain: ChainId) -> BridgeResult<U256> {
        debug!("Fetching native balance of {:#x} on {}", address, chain.label());
        self.provider(chain)
            .get_balance(address, None)
            .await
            .map_err(|e| BridgeError::chain_query(chain, e))
    }

    async fn bridge_limits(&self, chain: ChainId) -> BridgeResult<BridgeLimits> {
        debug!("Fetching bridge limits on {}", chain.label());
        let (max_transfer_amount, cooldown) = match chain {
            ChainId::RupayaTestnet => self.rupaya_limits().await?,
            ChainId::BinanceTestnet => self.binance_limits().await?,
        };

        if cooldown > U256::from(u64::MAX) {
            return Err(BridgeError::chain_query(
                chain,
                format!("transferCooldown out of range: {cooldown}"),
            ));
        }

        Ok(BridgeLimits {
            max_transfer_amount,
            cooldown_secs: cooldown.as_u64(),
        })
    }

    async fn token_balance(&self, address: Address, chain: ChainId) -> BridgeResult<U256> {
        match chain {
            ChainId::BinanceTestnet => {
                debug!("Fetching wrapped balance of {:#x}", address);
                self.binance_bridge
                    .balance_of(address)
                    .call()
                    .await
                    .map_err(|e| BridgeError::chain_query(chain, e))
            }
            ChainId::RupayaTestnet => Err(BridgeError::chain_query(
                chain,
                "no wrapped token is issued on this chain",
            )),
        }
    }
}
