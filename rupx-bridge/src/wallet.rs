//! Wallet gateway.
//!
//! The wallet itself is an external capability ([`WalletProvider`]): it
//! exposes accounts, reports its active chain, signs and broadcasts, and
//! emits account/chain change events. [`WalletGateway`] owns the local
//! session on top of it.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chains::{ActiveChain, BridgeMethod, ChainId};
use crate::error::{BridgeError, BridgeResult};
use crate::types::ValidatedTransfer;

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDER CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Notification pushed by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    /// The set of exposed accounts changed; empty means access was revoked.
    AccountsChanged(Vec<Address>),
    /// The wallet switched to another numeric chain id.
    ChainChanged(u64),
}

/// The single contract call a transfer is executed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeCall {
    /// Chain the call is sent on.
    pub chain: ChainId,
    /// Bridge contract on that chain.
    pub contract: Address,
    pub method: BridgeMethod,
    /// Transfer amount in smallest units.
    pub amount: U256,
}

impl BridgeCall {
    pub fn for_transfer(transfer: &ValidatedTransfer, contract: Address) -> Self {
        Self {
            chain: transfer.route.source(),
            contract,
            method: transfer.route.method(),
            amount: transfer.amount,
        }
    }

    /// Native value attached to the transaction.
    pub fn value(&self) -> U256 {
        match self.method {
            BridgeMethod::Deposit => self.amount,
            BridgeMethod::Burn => U256::zero(),
        }
    }
}

/// A broadcast transaction awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionHandle {
    pub chain: ChainId,
    pub hash: TxHash,
}

/// Result of waiting for one confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: TxHash,
    /// `false` when the transaction was mined but reverted.
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Capabilities the core needs from a wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet to expose its accounts. Fails with
    /// [`BridgeError::UserRejected`] when the user declines.
    async fn request_accounts(&self) -> BridgeResult<Vec<Address>>;

    /// Numeric id of the chain the wallet is currently on.
    async fn chain_id(&self) -> BridgeResult<u64>;

    /// Sign and broadcast `call` from the wallet's account.
    async fn send_transaction(&self, call: &BridgeCall) -> BridgeResult<TransactionHandle>;

    /// Suspend until one confirmation is observed.
    async fn wait_for_confirmation(&self, handle: &TransactionHandle) -> BridgeResult<Confirmation>;

    /// Stream of account/chain notifications. Dropping the receiver
    /// unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// Local view of the wallet connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalletSession {
    pub address: Option<Address>,
    pub is_connected: bool,
}

/// Effect of a wallet event on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChange {
    /// The session was torn down.
    Disconnected,
    /// The session now belongs to another account.
    AccountSwitched(Address),
    /// The wallet moved to another chain; chain-scoped state is invalid.
    ChainChanged(ActiveChain),
    Unchanged,
}

/// Live event subscription; dropping it unsubscribes.
pub struct EventSubscription {
    handle: JoinHandle<()>,
}

impl EventSubscription {
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATEWAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Session-owning front of a [`WalletProvider`].
pub struct WalletGateway {
    provider: Option<Arc<dyn WalletProvider>>,
    session: RwLock<WalletSession>,
}

impl WalletGateway {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider: Some(provider),
            session: RwLock::new(WalletSession::default()),
        }
    }

    /// A gateway for an environment without any wallet.
    pub fn unavailable() -> Self {
        Self {
            provider: None,
            session: RwLock::new(WalletSession::default()),
        }
    }

    fn provider(&self) -> BridgeResult<&Arc<dyn WalletProvider>> {
        self.provider.as_ref().ok_or(BridgeError::WalletUnavailable)
    }

    /// Request account access and open a session on the first account.
    pub async fn connect(&self) -> BridgeResult<Address> {
        let accounts = self.provider()?.request_accounts().await?;
        let address = *accounts.first().ok_or(BridgeError::NoAccounts)?;

        let mut session = self.session.write().await;
        session.address = Some(address);
        session.is_connected = true;
        info!("Wallet connected: {:#x}", address);
        Ok(address)
    }

    /// Clear the local session. Nothing is sent to the wallet or chain.
    pub async fn disconnect(&self) {
        let mut session = self.session.write().await;
        if session.is_connected {
            info!("Wallet disconnected");
        }
        *session = WalletSession::default();
    }

    pub async fn session(&self) -> WalletSession {
        self.session.read().await.clone()
    }

    pub async fn address(&self) -> Option<Address> {
        self.session.read().await.address
    }

    /// Chain the wallet is on right now, asked fresh from the wallet.
    pub async fn current_chain(&self) -> BridgeResult<ActiveChain> {
        let id = self.provider()?.chain_id().await?;
        Ok(ActiveChain::from_u64(id))
    }

    /// Sign and broadcast `call` from the connected account.
    pub async fn send_transaction(&self, call: &BridgeCall) -> BridgeResult<TransactionHandle> {
        if !self.session.read().await.is_connected {
            return Err(BridgeError::NotConnected);
        }
        self.provider()?.send_transaction(call).await
    }

    /// Wait for one confirmation of a broadcast transaction.
    pub async fn await_confirmation(&self, handle: &TransactionHandle) -> BridgeResult<Confirmation> {
        self.provider()?.wait_for_confirmation(handle).await
    }

    /// Apply a wallet notification to the session.
    pub async fn apply_event(&self, event: &WalletEvent) -> SessionChange {
        match event {
            WalletEvent::AccountsChanged(accounts) => {
                let mut session = self.session.write().await;
                match accounts.first() {
                    None if session.is_connected => {
                        info!("Wallet revoked all accounts; clearing session");
                        *session = WalletSession::default();
                        SessionChange::Disconnected
                    }
                    Some(&next) if session.is_connected && session.address != Some(next) => {
                        info!("Wallet account changed to {:#x}", next);
                        session.address = Some(next);
                        SessionChange::AccountSwitched(next)
                    }
                    _ => {
                        debug!("Ignoring accounts change: {:?}", accounts);
                        SessionChange::Unchanged
                    }
                }
            }
            WalletEvent::ChainChanged(id) => {
                let chain = ActiveChain::from_u64(*id);
                info!("Wallet switched to chain {}", id);
                SessionChange::ChainChanged(chain)
            }
        }
    }

    /// Forward every wallet notification to `on_event` until the returned
    /// subscription is dropped.
    pub fn subscribe<F, Fut>(&self, mut on_event: F) -> BridgeResult<EventSubscription>
    where
        F: FnMut(WalletEvent) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let mut events = self.provider()?.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => on_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} wallet events", missed);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Wallet event stream closed");
                        break;
                    }
                }
            }
        });
        Ok(EventSubscription { handle })
    }
}
