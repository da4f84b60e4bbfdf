//! Local-key [`WalletProvider`].
//!
//! Signs with a private key held in memory and broadcasts through the
//! configured RPC endpoints. The "active chain" plays the role a browser
//! wallet's network selector plays: it is switched explicitly and every
//! switch is announced as a [`WalletEvent::ChainChanged`].

use std::sync::Arc;

use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, U256, U64};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::chains::{BridgeMethod, ChainId};
use crate::client::http_provider;
use crate::config::BridgeConfig;
use crate::contracts::{BinanceBridge, RupayaBridge};
use crate::error::{BridgeError, BridgeResult};
use crate::wallet::{BridgeCall, Confirmation, TransactionHandle, WalletEvent, WalletProvider};

const EVENT_CAPACITY: usize = 16;

/// Wallet backed by a local private key.
pub struct LocalKeyWallet {
    wallet: LocalWallet,
    rupaya: Provider<Http>,
    binance: Provider<Http>,
    active: RwLock<ChainId>,
    events: broadcast::Sender<WalletEvent>,
}

impl LocalKeyWallet {
    /// Create a wallet from a hex private key, starting on `initial`.
    pub fn new(private_key: &str, config: &BridgeConfig, initial: ChainId) -> BridgeResult<Self> {
        let key = private_key.trim();
        let wallet = key
            .strip_prefix("0x")
            .unwrap_or(key)
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Config(format!("invalid private key: {e}")))?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            wallet,
            rupaya: http_provider(&config.rupaya.rpc_url)?,
            binance: http_provider(&config.binance.rpc_url)?,
            active: RwLock::new(initial),
            events,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub async fn active_chain(&self) -> ChainId {
        *self.active.read().await
    }

    /// Move to another chain and announce it to subscribers.
    pub async fn switch_chain(&self, chain: ChainId) {
        let mut active = self.active.write().await;
        if *active == chain {
            return;
        }
        *active = chain;
        info!("Local wallet switched to {}", chain.display_name());
        // No subscribers is fine.
        let _ = self.events.send(WalletEvent::ChainChanged(chain.as_u64()));
    }

    fn provider(&self, chain: ChainId) -> &Provider<Http> {
        match chain {
            ChainId::RupayaTestnet => &self.rupaya,
            ChainId::BinanceTestnet => &self.binance,
        }
    }
}

#[async_trait]
impl WalletProvider for LocalKeyWallet {
    async fn request_accounts(&self) -> BridgeResult<Vec<Address>> {
        Ok(vec![self.wallet.address()])
    }

    async fn chain_id(&self) -> BridgeResult<u64> {
        let chain = self.active_chain().await;
        let id = self
            .provider(chain)
            .get_chainid()
            .await
            .map_err(|e| BridgeError::Wallet(format!("chain id query failed: {e}")))?;
        if id > U256::from(u64::MAX) {
            return Err(BridgeError::Wallet(format!("chain id out of range: {id}")));
        }
        Ok(id.as_u64())
    }

    async fn send_transaction(&self, call: &BridgeCall) -> BridgeResult<TransactionHandle> {
        let chain = self.active_chain().await;
        if chain != call.chain {
            return Err(BridgeError::WrongNetwork {
                expected: call.chain.as_u64(),
                actual: chain.as_u64(),
            });
        }
        let chain_id = self
            .chain_id()
            .await
            .map_err(|e| BridgeError::SubmissionFailed(e.to_string()))?;
        let signer = self.wallet.clone().with_chain_id(chain_id);
        let client = Arc::new(SignerMiddleware::new(self.provider(chain).clone(), signer));

        debug!(
            "Sending {} of {} to {:#x} on {}",
            call.method.name(),
            call.amount,
            call.contract,
            chain.label()
        );

        let hash = match call.method {
            BridgeMethod::Deposit => {
                let bridge = RupayaBridge::new(call.contract, client);
                let tx = bridge.deposit().value(call.value());
                let pending = tx
                    .send()
                    .await
                    .map_err(|e| BridgeError::SubmissionFailed(e.to_string()))?;
                pending.tx_hash()
            }
            BridgeMethod::Burn => {
                let bridge = BinanceBridge::new(call.contract, client);
                let tx = bridge.burn(call.amount);
                let pending = tx
                    .send()
                    .await
                    .map_err(|e| BridgeError::SubmissionFailed(e.to_string()))?;
                pending.tx_hash()
            }
        };

        info!("Transaction submitted: {:#x}", hash);
        Ok(TransactionHandle { chain, hash })
    }

    async fn wait_for_confirmation(&self, handle: &TransactionHandle) -> BridgeResult<Confirmation> {
        let provider = self.provider(handle.chain);
        let receipt = PendingTransaction::new(handle.hash, provider)
            .confirmations(1)
            .await
            .map_err(|e| BridgeError::chain_query(handle.chain, e))?
            .ok_or(BridgeError::TransactionDropped { hash: handle.hash })?;

        Ok(Confirmation {
            hash: handle.hash,
            success: receipt.status == Some(U64::from(1u64)),
            block_number: receipt.block_number.map(|n| n.as_u64()),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
