//! Scripted doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use rupx_bridge::{
    BridgeCall, BridgeConfig, BridgeController, BridgeError, BridgeLimits, BridgeResult, ChainClient,
    ChainId, Confirmation, MemoryLedger, TransactionHandle, TransferLedger, TransferRecord,
    WalletEvent, WalletProvider,
};
use tokio::sync::{broadcast, Notify};

pub const RUPAYA_BRIDGE: &str = "0x1111111111111111111111111111111111111111";
pub const BINANCE_BRIDGE: &str = "0x2222222222222222222222222222222222222222";

pub fn whole(tokens: u64) -> U256 {
    U256::from(tokens) * U256::exp10(18)
}

pub fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

pub fn config() -> BridgeConfig {
    BridgeConfig::from_lookup(|key| {
        let value = match key {
            "RUPX_RUPAYA_RPC_URL" => "http://127.0.0.1:8545",
            "RUPX_BINANCE_RPC_URL" => "http://127.0.0.1:8546",
            "RUPX_RUPAYA_BRIDGE_ADDRESS" => RUPAYA_BRIDGE,
            "RUPX_BINANCE_BRIDGE_ADDRESS" => BINANCE_BRIDGE,
            "RUPX_RUPAYA_EXPLORER_URL" => "https://scan.testnet.rupaya.io",
            "RUPX_BINANCE_EXPLORER_URL" => "https://testnet.bscscan.com",
            "RUPX_CONFIRMATION_TIMEOUT_SECS" => "30",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Chain reads with call counting and switchable failures.
pub struct ScriptedChain {
    pub max_transfer: Mutex<HashMap<ChainId, U256>>,
    pub fail_limits: AtomicBool,
    pub fail_balances: AtomicBool,
    pub native_calls: AtomicU32,
    pub limit_calls: AtomicU32,
    pub token_calls: AtomicU32,
}

impl ScriptedChain {
    /// Both chains allow up to `max` whole tokens.
    pub fn with_max(max: u64) -> Arc<Self> {
        Arc::new(Self {
            max_transfer: Mutex::new(HashMap::from([
                (ChainId::RupayaTestnet, whole(max)),
                (ChainId::BinanceTestnet, whole(max)),
            ])),
            fail_limits: AtomicBool::new(false),
            fail_balances: AtomicBool::new(false),
            native_calls: AtomicU32::new(0),
            limit_calls: AtomicU32::new(0),
            token_calls: AtomicU32::new(0),
        })
    }

    pub fn total_calls(&self) -> u32 {
        self.native_calls.load(Ordering::SeqCst)
            + self.limit_calls.load(Ordering::SeqCst)
            + self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn native_balance(&self, _address: Address, chain: ChainId) -> BridgeResult<U256> {
        self.native_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(BridgeError::chain_query(chain, "connection reset"));
        }
        Ok(whole(chain.as_u64()))
    }

    async fn bridge_limits(&self, chain: ChainId) -> BridgeResult<BridgeLimits> {
        self.limit_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_limits.load(Ordering::SeqCst) {
            return Err(BridgeError::chain_query(chain, "execution reverted"));
        }
        let max = self.max_transfer.lock().unwrap()[&chain];
        Ok(BridgeLimits {
            max_transfer_amount: max,
            cooldown_secs: 60,
        })
    }

    async fn token_balance(&self, _address: Address, chain: ChainId) -> BridgeResult<U256> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(BridgeError::chain_query(chain, "connection reset"));
        }
        Ok(whole(3))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WALLET
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendBehavior {
    Broadcast,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmBehavior {
    Confirm,
    Revert,
    Drop,
    /// Never resolves.
    Hang,
    /// Resolves successfully once `release` is notified.
    Hold,
}

/// Wallet that records every call and answers from a script.
pub struct ScriptedWallet {
    pub accounts: Mutex<Vec<Address>>,
    pub chain_id: AtomicU64,
    pub send: Mutex<SendBehavior>,
    pub confirm: Mutex<ConfirmBehavior>,
    pub sent: Mutex<Vec<BridgeCall>>,
    pub release: Notify,
    pub events: broadcast::Sender<WalletEvent>,
    next_hash: AtomicU64,
}

impl ScriptedWallet {
    pub fn new(account: Address, chain_id: u64) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            accounts: Mutex::new(vec![account]),
            chain_id: AtomicU64::new(chain_id),
            send: Mutex::new(SendBehavior::Broadcast),
            confirm: Mutex::new(ConfirmBehavior::Confirm),
            sent: Mutex::new(Vec::new()),
            release: Notify::new(),
            events,
            next_hash: AtomicU64::new(0xbeef),
        })
    }

    pub fn sent(&self) -> Vec<BridgeCall> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_confirm(&self, behavior: ConfirmBehavior) {
        *self.confirm.lock().unwrap() = behavior;
    }

    pub fn set_chain(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn request_accounts(&self) -> BridgeResult<Vec<Address>> {
        Ok(self.accounts.lock().unwrap().clone())
    }

    async fn chain_id(&self) -> BridgeResult<u64> {
        Ok(self.chain_id.load(Ordering::SeqCst))
    }

    async fn send_transaction(&self, call: &BridgeCall) -> BridgeResult<TransactionHandle> {
        let behavior = *self.send.lock().unwrap();
        if behavior == SendBehavior::Reject {
            return Err(BridgeError::UserRejected);
        }
        self.sent.lock().unwrap().push(call.clone());
        let hash = TxHash::from_low_u64_be(self.next_hash.fetch_add(1, Ordering::SeqCst));
        Ok(TransactionHandle {
            chain: call.chain,
            hash,
        })
    }

    async fn wait_for_confirmation(&self, handle: &TransactionHandle) -> BridgeResult<Confirmation> {
        let behavior = *self.confirm.lock().unwrap();
        let confirmed = |success| Confirmation {
            hash: handle.hash,
            success,
            block_number: Some(100),
        };
        match behavior {
            ConfirmBehavior::Confirm => Ok(confirmed(true)),
            ConfirmBehavior::Revert => Ok(confirmed(false)),
            ConfirmBehavior::Drop => Err(BridgeError::TransactionDropped { hash: handle.hash }),
            ConfirmBehavior::Hang => std::future::pending::<BridgeResult<Confirmation>>().await,
            ConfirmBehavior::Hold => {
                self.release.notified().await;
                Ok(confirmed(true))
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Ledger whose writes always fail.
#[derive(Default)]
pub struct BrokenLedger;

#[async_trait]
impl TransferLedger for BrokenLedger {
    async fn append(&self, _address: Address, _record: TransferRecord) -> BridgeResult<()> {
        Err(BridgeError::Storage("disk full".to_string()))
    }

    async fn list(&self, _address: Address) -> BridgeResult<Vec<TransferRecord>> {
        Ok(Vec::new())
    }

    async fn clear(&self, _address: Address) -> BridgeResult<()> {
        Ok(())
    }
}

/// Everything a scenario needs.
pub struct Harness {
    pub chain: Arc<ScriptedChain>,
    pub wallet: Arc<ScriptedWallet>,
    pub ledger: Arc<MemoryLedger>,
    pub controller: Arc<BridgeController>,
}

impl Harness {
    /// Alice on `chain_id`, both chains limited to 100 tokens.
    pub fn new(chain_id: u64) -> Self {
        let chain = ScriptedChain::with_max(100);
        let wallet = ScriptedWallet::new(alice(), chain_id);
        let ledger = Arc::new(MemoryLedger::new());
        let controller = Arc::new(BridgeController::new(
            config(),
            Some(wallet.clone() as Arc<dyn WalletProvider>),
            chain.clone(),
            ledger.clone(),
        ));
        Self {
            chain,
            wallet,
            ledger,
            controller,
        }
    }

    pub async fn connected(chain_id: u64) -> Self {
        let harness = Self::new(chain_id);
        harness.controller.connect().await.unwrap();
        harness
    }

    pub async fn history(&self) -> Vec<TransferRecord> {
        self.ledger.list(alice()).await.unwrap()
    }
}
