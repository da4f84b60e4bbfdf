//! Transfer state machine.
//!
//! ```text
//!  Idle ─► Validating ─► NetworkCheck ─► Submitting ─► Confirming ─┬─► Completed
//!              │              │               │                     └─► Failed (recorded)
//!              └──────────────┴───────────────┴─► Failed (not recorded)
//! ```
//!
//! Anything that fails before a transaction hash exists is a plain error
//! and leaves no history. Once a hash exists exactly one record is written,
//! whatever the confirmation outcome. A broadcast transaction is never
//! re-sent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ethers::types::{Address, TxHash};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::chains::{BridgeRoute, ChainId};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::ledger::TransferLedger;
use crate::network::NetworkInfo;
use crate::types::{LimitStatus, TransferPhase, TransferRecord, TransferRequest, TransferStatus};
use crate::wallet::{BridgeCall, TransactionHandle, WalletGateway};

const PROGRESS_CAPACITY: usize = 64;

/// Phase change of one address's transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub address: Address,
    pub phase: TransferPhase,
    /// Known from `Confirming` on.
    pub tx_hash: Option<TxHash>,
}

/// Result of a transfer that reached the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub route: BridgeRoute,
    /// The record handed to the ledger.
    pub record: TransferRecord,
    /// Why the transfer failed, if it did.
    pub failure: Option<BridgeError>,
    /// Set when the record could not be persisted. Does not change the
    /// transfer's status.
    pub ledger_error: Option<BridgeError>,
}

impl TransferOutcome {
    pub fn is_completed(&self) -> bool {
        self.record.status == TransferStatus::Completed
    }

    pub fn tx_hash(&self) -> &str {
        &self.record.tx_hash
    }
}

/// Drives transfers from request to recorded outcome.
pub struct BridgeOrchestrator {
    gateway: Arc<WalletGateway>,
    network: Arc<NetworkInfo>,
    ledger: Arc<dyn TransferLedger>,
    rupaya_bridge: Address,
    binance_bridge: Address,
    confirmation_timeout: Duration,
    phases: Mutex<HashMap<Address, TransferPhase>>,
    progress: broadcast::Sender<TransferProgress>,
}

impl BridgeOrchestrator {
    pub fn new(
        gateway: Arc<WalletGateway>,
        network: Arc<NetworkInfo>,
        ledger: Arc<dyn TransferLedger>,
        config: &BridgeConfig,
    ) -> Self {
        let (progress, _) = broadcast::channel(PROGRESS_CAPACITY);
        Self {
            gateway,
            network,
            ledger,
            rupaya_bridge: config.bridge_contract(ChainId::RupayaTestnet),
            binance_bridge: config.bridge_contract(ChainId::BinanceTestnet),
            confirmation_timeout: config.confirmation_timeout,
            phases: Mutex::new(HashMap::new()),
            progress,
        }
    }

    /// Current phase of `address`'s transfer.
    pub fn phase(&self, address: Address) -> TransferPhase {
        self.phases().get(&address).copied().unwrap_or_default()
    }

    /// Stream of phase changes for every address.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<TransferProgress> {
        self.progress.subscribe()
    }

    /// Run one transfer for the connected account.
    ///
    /// Returns `Err` when the transfer never reached the chain (nothing is
    /// recorded) and `Ok` with the recorded outcome otherwise, whether the
    /// transaction completed or not.
    pub async fn submit(&self, request: &TransferRequest) -> BridgeResult<TransferOutcome> {
        let session = self.gateway.session().await;
        let address = match session.address {
            Some(address) if session.is_connected => address,
            _ => return Err(BridgeError::NotConnected),
        };

        let mut flight = self.begin(address)?;

        // Validating. Limits are re-read only once the address is claimed,
        // and never for a same-chain request.
        let limits = match (request.source, request.destination) {
            (Some(source), Some(destination)) if source != destination => {
                self.network.refresh_limits(source).await
            }
            (Some(source), _) => self.network.limits(source).await,
            (None, _) => LimitStatus::Unknown,
        };
        let transfer = match request.validate(|_| limits) {
            Ok(transfer) => transfer,
            Err(e) => return Err(flight.reject(e.into())),
        };
        debug!("Validated {} of {} for {:#x}", transfer.route, transfer.amount_text, address);

        // NetworkCheck
        flight.advance(TransferPhase::NetworkCheck, None);
        if let Err(e) = self.check_network(transfer.route.source()).await {
            return Err(flight.reject(e));
        }

        // Submitting
        flight.advance(TransferPhase::Submitting, None);
        let call = BridgeCall::for_transfer(&transfer, self.bridge_contract(transfer.route.source()));
        let handle = match self.gateway.send_transaction(&call).await {
            Ok(handle) => handle,
            Err(e) => return Err(flight.reject(not_broadcast(e))),
        };
        info!(
            "{} of {} {} submitted: {:#x}",
            call.method.name(),
            transfer.amount_text,
            crate::TOKEN_SYMBOL,
            handle.hash
        );

        // Confirming
        flight.advance(TransferPhase::Confirming, Some(handle.hash));
        let failure = self.confirm(&handle).await.err();

        let record = match &failure {
            None => TransferRecord::completed(&transfer, handle.hash),
            Some(cause) => TransferRecord::failed(&transfer, Some(handle.hash), cause.to_string()),
        };
        let ledger_error = self.record(address, &record).await;

        match &failure {
            None => {
                info!("Transfer {:#x} completed", handle.hash);
                flight.finish(TransferPhase::Completed, Some(handle.hash));
            }
            Some(cause) => {
                error!("Transfer {:#x} failed: {}", handle.hash, cause);
                flight.finish(TransferPhase::Failed, Some(handle.hash));
            }
        }

        Ok(TransferOutcome {
            route: transfer.route,
            record,
            failure,
            ledger_error,
        })
    }

    fn bridge_contract(&self, chain: ChainId) -> Address {
        match chain {
            ChainId::RupayaTestnet => self.rupaya_bridge,
            ChainId::BinanceTestnet => self.binance_bridge,
        }
    }

    async fn check_network(&self, source: ChainId) -> BridgeResult<()> {
        let expected = source.as_u64();
        let actual = self.gateway.current_chain().await?.as_u64();
        if actual != expected {
            warn!("Wallet is on chain {}, transfer needs {}", actual, expected);
            return Err(BridgeError::WrongNetwork { expected, actual });
        }
        Ok(())
    }

    async fn confirm(&self, handle: &TransactionHandle) -> BridgeResult<()> {
        let wait = self.gateway.await_confirmation(handle);
        let confirmation = match tokio::time::timeout(self.confirmation_timeout, wait).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(BridgeError::ConfirmationTimeout {
                    hash: handle.hash,
                    timeout_secs: self.confirmation_timeout.as_secs(),
                })
            }
        };

        if !confirmation.success {
            return Err(BridgeError::SubmissionReverted { hash: handle.hash });
        }
        if let Some(block) = confirmation.block_number {
            debug!("{:#x} confirmed in block {}", handle.hash, block);
        }
        Ok(())
    }

    async fn record(&self, address: Address, record: &TransferRecord) -> Option<BridgeError> {
        match self.ledger.append(address, record.clone()).await {
            Ok(()) => None,
            Err(e) => {
                error!("Could not record transfer {} for {:#x}: {}", record.tx_hash, address, e);
                Some(e)
            }
        }
    }

    fn phases(&self) -> MutexGuard<'_, HashMap<Address, TransferPhase>> {
        self.phases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, address: Address, phase: TransferPhase, tx_hash: Option<TxHash>) {
        self.phases().insert(address, phase);
        // No subscribers is fine.
        let _ = self.progress.send(TransferProgress {
            address,
            phase,
            tx_hash,
        });
    }

    /// Claim `address` for a new transfer.
    fn begin(&self, address: Address) -> BridgeResult<InFlight<'_>> {
        {
            let mut phases = self.phases();
            let current = phases.get(&address).copied().unwrap_or_default();
            if current.is_active() {
                warn!("Rejecting transfer for {:#x}: already {:?}", address, current);
                return Err(BridgeError::SubmissionInProgress);
            }
            phases.insert(address, TransferPhase::Validating);
        }
        let _ = self.progress.send(TransferProgress {
            address,
            phase: TransferPhase::Validating,
            tx_hash: None,
        });
        Ok(InFlight {
            orchestrator: self,
            address,
            finished: false,
        })
    }
}

/// Exclusive claim on one address's transfer slot. Released when it
/// reaches a terminal phase or is dropped.
struct InFlight<'a> {
    orchestrator: &'a BridgeOrchestrator,
    address: Address,
    finished: bool,
}

impl InFlight<'_> {
    fn advance(&mut self, phase: TransferPhase, tx_hash: Option<TxHash>) {
        self.orchestrator.set_phase(self.address, phase, tx_hash);
    }

    fn finish(&mut self, phase: TransferPhase, tx_hash: Option<TxHash>) {
        self.advance(phase, tx_hash);
        self.finished = true;
    }

    /// Fail before anything reached the chain.
    fn reject(&mut self, err: BridgeError) -> BridgeError {
        warn!("Transfer for {:#x} rejected: {}", self.address, err);
        self.finish(TransferPhase::Failed, None);
        err
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let phase = self.orchestrator.phase(self.address);
            warn!("Transfer for {:#x} abandoned during {:?}", self.address, phase);
            self.orchestrator.set_phase(self.address, TransferPhase::Idle, None);
        }
    }
}

/// Errors from sending mean nothing was broadcast.
fn not_broadcast(err: BridgeError) -> BridgeError {
    if err.is_pre_submission() {
        err
    } else {
        BridgeError::SubmissionFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ChainClient;
    use crate::ledger::MemoryLedger;
    use crate::retry::RetryPolicy;
    use crate::types::BridgeLimits;
    use crate::wallet::{Confirmation, WalletEvent, WalletProvider};
    use async_trait::async_trait;
    use ethers::types::U256;

    struct UnlimitedChain;

    #[async_trait]
    impl ChainClient for UnlimitedChain {
        async fn native_balance(&self, _: Address, chain: ChainId) -> BridgeResult<U256> {
            Err(BridgeError::chain_query(chain, "offline"))
        }

        async fn bridge_limits(&self, _: ChainId) -> BridgeResult<BridgeLimits> {
            Ok(BridgeLimits {
                max_transfer_amount: U256::MAX,
                cooldown_secs: 0,
            })
        }

        async fn token_balance(&self, _: Address, chain: ChainId) -> BridgeResult<U256> {
            Err(BridgeError::chain_query(chain, "offline"))
        }
    }

    struct IdleWallet(broadcast::Sender<WalletEvent>);

    #[async_trait]
    impl WalletProvider for IdleWallet {
        async fn request_accounts(&self) -> BridgeResult<Vec<Address>> {
            Ok(vec![Address::repeat_byte(9)])
        }

        async fn chain_id(&self) -> BridgeResult<u64> {
            Ok(799)
        }

        async fn send_transaction(&self, _: &BridgeCall) -> BridgeResult<TransactionHandle> {
            Err(BridgeError::UserRejected)
        }

        async fn wait_for_confirmation(&self, handle: &TransactionHandle) -> BridgeResult<Confirmation> {
            Err(BridgeError::TransactionDropped { hash: handle.hash })
        }

        fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
            self.0.subscribe()
        }
    }

    fn orchestrator() -> BridgeOrchestrator {
        let config = BridgeConfig::from_lookup(|key| {
            Some(match key {
                "RUPX_RUPAYA_BRIDGE_ADDRESS" | "RUPX_BINANCE_BRIDGE_ADDRESS" => {
                    format!("{:#x}", Address::repeat_byte(0x42))
                }
                k if k.ends_with("_URL") => "http://localhost".to_string(),
                _ => return None,
            })
        })
        .unwrap();
        let (events, _) = broadcast::channel(1);
        BridgeOrchestrator::new(
            Arc::new(WalletGateway::new(Arc::new(IdleWallet(events)))),
            Arc::new(NetworkInfo::new(Arc::new(UnlimitedChain), RetryPolicy::none())),
            Arc::new(MemoryLedger::new()),
            &config,
        )
    }

    #[test]
    fn test_second_claim_rejected_until_released() {
        let orchestrator = orchestrator();
        let address = Address::repeat_byte(1);

        let flight = orchestrator.begin(address).unwrap();
        assert_eq!(orchestrator.phase(address), TransferPhase::Validating);
        assert!(matches!(
            orchestrator.begin(address),
            Err(BridgeError::SubmissionInProgress)
        ));
        // Other addresses are independent.
        assert!(orchestrator.begin(Address::repeat_byte(2)).is_ok());

        drop(flight);
        assert_eq!(orchestrator.phase(address), TransferPhase::Idle);
        assert!(orchestrator.begin(address).is_ok());
    }

    #[test]
    fn test_finished_claim_keeps_terminal_phase() {
        let orchestrator = orchestrator();
        let address = Address::repeat_byte(3);
        let mut progress = orchestrator.subscribe_progress();

        let mut flight = orchestrator.begin(address).unwrap();
        flight.finish(TransferPhase::Completed, None);
        drop(flight);

        assert_eq!(orchestrator.phase(address), TransferPhase::Completed);
        assert_eq!(progress.try_recv().unwrap().phase, TransferPhase::Validating);
        assert_eq!(progress.try_recv().unwrap().phase, TransferPhase::Completed);
        assert!(progress.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submit_requires_connection() {
        let orchestrator = orchestrator();
        let request = TransferRequest::new(ChainId::RupayaTestnet, ChainId::BinanceTestnet, "1");
        assert_eq!(orchestrator.submit(&request).await, Err(BridgeError::NotConnected));
    }

    #[tokio::test]
    async fn test_send_rejection_is_not_recorded() {
        let orchestrator = orchestrator();
        orchestrator.gateway.connect().await.unwrap();

        let request = TransferRequest::new(ChainId::RupayaTestnet, ChainId::BinanceTestnet, "1");
        assert_eq!(orchestrator.submit(&request).await, Err(BridgeError::UserRejected));

        let address = Address::repeat_byte(9);
        assert_eq!(orchestrator.phase(address), TransferPhase::Failed);
        assert!(orchestrator.ledger.list(address).await.unwrap().is_empty());
    }

    #[test]
    fn test_send_errors_are_normalised() {
        assert_eq!(not_broadcast(BridgeError::UserRejected), BridgeError::UserRejected);
        assert!(matches!(
            not_broadcast(BridgeError::chain_query(ChainId::BinanceTestnet, "nonce too low")),
            BridgeError::SubmissionFailed(_)
        ));
    }
}
