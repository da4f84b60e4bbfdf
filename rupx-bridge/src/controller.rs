//! Single entry point for a presentation layer.
//!
//! Wires the wallet gateway, chain cache, orchestrator and ledger together
//! and turns wallet and connectivity notifications into resynchronisation.

use std::sync::Arc;

use ethers::types::Address;
use tracing::{debug, info};

use crate::chains::ChainId;
use crate::client::{ChainClient, EvmChainClient};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::{export_file_name, FileLedger, TransferLedger};
use crate::network::{BalanceSnapshot, Connectivity, NetworkInfo};
use crate::orchestrator::{BridgeOrchestrator, TransferOutcome};
use crate::types::{LimitStatus, TransferRecord, TransferRequest};
use crate::wallet::{EventSubscription, SessionChange, WalletEvent, WalletGateway, WalletProvider};

pub struct BridgeController {
    config: BridgeConfig,
    gateway: Arc<WalletGateway>,
    network: Arc<NetworkInfo>,
    ledger: Arc<dyn TransferLedger>,
    orchestrator: BridgeOrchestrator,
}

impl BridgeController {
    /// Assemble a controller from explicit capabilities. `wallet` is `None`
    /// when no wallet is available in the environment.
    pub fn new(
        config: BridgeConfig,
        wallet: Option<Arc<dyn WalletProvider>>,
        client: Arc<dyn ChainClient>,
        ledger: Arc<dyn TransferLedger>,
    ) -> Self {
        let gateway = Arc::new(match wallet {
            Some(provider) => WalletGateway::new(provider),
            None => WalletGateway::unavailable(),
        });
        let network = Arc::new(NetworkInfo::new(client, config.retry));
        let orchestrator =
            BridgeOrchestrator::new(gateway.clone(), network.clone(), ledger.clone(), &config);

        Self {
            config,
            gateway,
            network,
            ledger,
            orchestrator,
        }
    }

    /// Controller over the configured RPC endpoints with a file-backed ledger.
    pub fn from_config(config: BridgeConfig, wallet: Option<Arc<dyn WalletProvider>>) -> BridgeResult<Self> {
        let client = Arc::new(EvmChainClient::new(&config)?);
        let ledger = Arc::new(FileLedger::new(config.ledger_dir.clone()));
        Ok(Self::new(config, wallet, client, ledger))
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn gateway(&self) -> &WalletGateway {
        &self.gateway
    }

    pub fn network(&self) -> &NetworkInfo {
        &self.network
    }

    pub fn orchestrator(&self) -> &BridgeOrchestrator {
        &self.orchestrator
    }

    async fn connected_address(&self) -> BridgeResult<Address> {
        self.gateway.address().await.ok_or(BridgeError::NotConnected)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SESSION
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Connect the wallet and load balances and limits for the new session.
    pub async fn connect(&self) -> BridgeResult<Address> {
        let address = self.gateway.connect().await?;
        self.network
            .resync(Some(address), self.orchestrator.phase(address))
            .await;
        Ok(address)
    }

    /// Close the session and forget its balances.
    pub async fn disconnect(&self) {
        if let Some(address) = self.gateway.address().await {
            self.network.clear_balances(address).await;
        }
        self.gateway.disconnect().await;
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CHAIN STATE
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Cached balances of the connected account.
    pub async fn balances(&self) -> BridgeResult<BalanceSnapshot> {
        let address = self.connected_address().await?;
        Ok(self.network.balances(address).await)
    }

    pub async fn refresh_balances(&self) -> BridgeResult<BalanceSnapshot> {
        let address = self.connected_address().await?;
        let phase = self.orchestrator.phase(address);
        Ok(self.network.refresh_balances(address, phase).await)
    }

    pub async fn limits(&self) -> Vec<(ChainId, LimitStatus)> {
        self.network.all_limits().await
    }

    pub async fn refresh_limits(&self) -> Vec<(ChainId, LimitStatus)> {
        self.network.refresh_all_limits().await
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TRANSFERS
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Run a transfer, then reload balances.
    pub async fn submit(&self, request: &TransferRequest) -> BridgeResult<TransferOutcome> {
        let outcome = self.orchestrator.submit(request).await?;
        if let Ok(address) = self.connected_address().await {
            self.network
                .refresh_balances(address, self.orchestrator.phase(address))
                .await;
        }
        Ok(outcome)
    }

    /// History of the connected account, oldest first.
    pub async fn history(&self) -> BridgeResult<Vec<TransferRecord>> {
        let address = self.connected_address().await?;
        self.ledger.list(address).await
    }

    pub async fn clear_history(&self) -> BridgeResult<()> {
        let address = self.connected_address().await?;
        self.ledger.clear(address).await
    }

    /// Export file name and contents for the connected account's history.
    pub async fn export_history(&self) -> BridgeResult<(String, Vec<u8>)> {
        let address = self.connected_address().await?;
        let bytes = self.ledger.export(address).await?;
        Ok((export_file_name(&address), bytes))
    }

    /// Explorer page of a recorded transaction, if it has a hash.
    pub fn explorer_url(&self, record: &TransferRecord) -> Option<String> {
        if record.tx_hash.is_empty() {
            return None;
        }
        let chain = record.source_chain()?;
        Some(self.config.explorer_tx_url(chain, &record.tx_hash))
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // NOTIFICATIONS
    // ═══════════════════════════════════════════════════════════════════════════════

    /// React to one wallet notification.
    pub async fn handle_wallet_event(&self, event: WalletEvent) -> SessionChange {
        let previous = self.gateway.address().await;
        let change = self.gateway.apply_event(&event).await;

        match change {
            SessionChange::Disconnected => {
                if let Some(address) = previous {
                    self.network.clear_balances(address).await;
                }
            }
            SessionChange::AccountSwitched(address) => {
                if let Some(old) = previous {
                    self.network.clear_balances(old).await;
                }
                self.network
                    .refresh_balances(address, self.orchestrator.phase(address))
                    .await;
            }
            SessionChange::ChainChanged(chain) => {
                info!("Wallet chain changed to {}; resynchronising", chain.as_u64());
                let address = self.gateway.address().await;
                let phase = address
                    .map(|a| self.orchestrator.phase(a))
                    .unwrap_or_default();
                self.network.resync(address, phase).await;
            }
            SessionChange::Unchanged => {}
        }
        change
    }

    /// Record an online/offline notification; coming back online resyncs.
    pub async fn set_connectivity(&self, connectivity: Connectivity) {
        if !self.network.set_connectivity(connectivity).await {
            return;
        }
        if connectivity == Connectivity::Online {
            let address = self.gateway.address().await;
            let phase = address
                .map(|a| self.orchestrator.phase(a))
                .unwrap_or_default();
            self.network.resync(address, phase).await;
        }
    }

    /// Feed wallet notifications into [`Self::handle_wallet_event`] until the
    /// subscription is dropped.
    pub fn spawn_event_listener(self: &Arc<Self>) -> BridgeResult<EventSubscription> {
        let controller = Arc::clone(self);
        self.gateway.subscribe(move |event| {
            let controller = controller.clone();
            async move {
                debug!("Wallet event: {:?}", event);
                controller.handle_wallet_event(event).await;
            }
        })
    }
}
