//! Cached chain state: bridge limits, balances and connectivity.
//!
//! Limit fetches go through the configured [`RetryPolicy`]; once attempts
//! are exhausted the chain's limits become [`LimitStatus::Unknown`] rather
//! than keeping an old value. Balance reads are not retried; a failed read
//! shows as [`Reading::Unavailable`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ethers::types::{Address, U256};
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::chains::ChainId;
use crate::client::ChainClient;
use crate::error::BridgeResult;
use crate::retry::RetryPolicy;
use crate::types::{LimitStatus, Reading, TransferPhase};

/// Online/offline state reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
}

/// Balances of one address across both chains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub rupaya_native: Reading<U256>,
    pub binance_native: Reading<U256>,
    /// Wrapped token held on the Binance side.
    pub wrapped: Reading<U256>,
}

impl BalanceSnapshot {
    pub fn native(&self, chain: ChainId) -> &Reading<U256> {
        match chain {
            ChainId::RupayaTestnet => &self.rupaya_native,
            ChainId::BinanceTestnet => &self.binance_native,
        }
    }

    pub fn mark_stale(&mut self) {
        self.rupaya_native.mark_stale();
        self.binance_native.mark_stale();
        self.wrapped.mark_stale();
    }

    /// Whether every reading is fresh and was taken outside a transfer.
    pub fn is_authoritative(&self) -> bool {
        self.rupaya_native.is_authoritative()
            && self.binance_native.is_authoritative()
            && self.wrapped.is_authoritative()
    }
}

/// Shared cache of chain-scoped reads.
pub struct NetworkInfo {
    client: Arc<dyn ChainClient>,
    retry: RetryPolicy,
    limits: RwLock<HashMap<ChainId, LimitStatus>>,
    balances: RwLock<HashMap<Address, BalanceSnapshot>>,
    connectivity: RwLock<Connectivity>,
    /// Bumped whenever cached state is invalidated, so that reads started
    /// before the invalidation are not written back afterwards.
    epoch: AtomicU64,
}

impl NetworkInfo {
    pub fn new(client: Arc<dyn ChainClient>, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            limits: RwLock::new(HashMap::new()),
            balances: RwLock::new(HashMap::new()),
            connectivity: RwLock::new(Connectivity::Online),
            epoch: AtomicU64::new(0),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // LIMITS
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Last known limits of `chain`; `Unknown` until the first successful fetch.
    pub async fn limits(&self, chain: ChainId) -> LimitStatus {
        self.limits.read().await.get(&chain).copied().unwrap_or_default()
    }

    pub async fn all_limits(&self) -> Vec<(ChainId, LimitStatus)> {
        let limits = self.limits.read().await;
        ChainId::ALL
            .iter()
            .map(|chain| (*chain, limits.get(chain).copied().unwrap_or_default()))
            .collect()
    }

    /// Fetch limits of `chain` with retries and replace the cached value.
    pub async fn refresh_limits(&self, chain: ChainId) -> LimitStatus {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let what = format!("bridge limits on {}", chain.label());
        let status = match self.retry.run(&what, || self.client.bridge_limits(chain)).await {
            Ok(limits) => {
                debug!(
                    "{} limits: max {} cooldown {}s",
                    chain.label(),
                    limits.max_transfer_amount,
                    limits.cooldown_secs
                );
                LimitStatus::Known(limits)
            }
            Err(e) => {
                warn!("Limits of {} are unknown: {}", chain.label(), e);
                LimitStatus::Unknown
            }
        };

        let mut cached = self.limits.write().await;
        if self.epoch.load(Ordering::SeqCst) == epoch || !status.is_known() {
            cached.insert(chain, status);
        }
        status
    }

    /// Refresh limits of both chains concurrently.
    pub async fn refresh_all_limits(&self) -> Vec<(ChainId, LimitStatus)> {
        let refreshed = join_all(ChainId::ALL.iter().map(|chain| self.refresh_limits(*chain))).await;
        ChainId::ALL.iter().copied().zip(refreshed).collect()
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // BALANCES
    // ═══════════════════════════════════════════════════════════════════════════════

    /// Cached balances of `address`; all `Unavailable` if never read.
    pub async fn balances(&self, address: Address) -> BalanceSnapshot {
        self.balances.read().await.get(&address).cloned().unwrap_or_default()
    }

    /// Read all balances of `address` concurrently. `phase` is the transfer
    /// phase of that address at the time of the read.
    pub async fn refresh_balances(&self, address: Address, phase: TransferPhase) -> BalanceSnapshot {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let (rupaya, binance, wrapped) = futures::join!(
            self.client.native_balance(address, ChainId::RupayaTestnet),
            self.client.native_balance(address, ChainId::BinanceTestnet),
            self.client.token_balance(address, ChainId::BinanceTestnet),
        );

        let snapshot = BalanceSnapshot {
            rupaya_native: reading("native balance", rupaya, phase),
            binance_native: reading("native balance", binance, phase),
            wrapped: reading("wrapped balance", wrapped, phase),
        };

        let mut cached = self.balances.write().await;
        if self.epoch.load(Ordering::SeqCst) == epoch {
            cached.insert(address, snapshot.clone());
        } else {
            debug!("Discarding balances of {:#x} read before invalidation", address);
        }
        snapshot
    }

    /// Forget the balances of `address`.
    pub async fn clear_balances(&self, address: Address) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.balances.write().await.remove(&address);
    }

    /// Forget every cached balance.
    pub async fn clear_all_balances(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.balances.write().await.clear();
    }

    pub async fn mark_all_stale(&self) {
        for snapshot in self.balances.write().await.values_mut() {
            snapshot.mark_stale();
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // INVALIDATION
    // ═══════════════════════════════════════════════════════════════════════════════

    pub async fn connectivity(&self) -> Connectivity {
        *self.connectivity.read().await
    }

    /// Record a connectivity change. Returns `true` when the state changed.
    ///
    /// Going offline marks every balance stale.
    pub async fn set_connectivity(&self, next: Connectivity) -> bool {
        let mut current = self.connectivity.write().await;
        if *current == next {
            return false;
        }
        *current = next;
        drop(current);

        info!("Connectivity changed: {:?}", next);
        if next == Connectivity::Offline {
            self.mark_all_stale().await;
        }
        true
    }

    /// Drop all chain-scoped state: limits become `Unknown` and balances
    /// stale. In-flight reads started before this call are discarded.
    pub async fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.limits.write().await.clear();
        self.mark_all_stale().await;
    }

    /// Invalidate everything, then re-read limits and, if given, the
    /// balances of `address`.
    pub async fn resync(&self, address: Option<Address>, phase: TransferPhase) {
        info!("Resynchronising chain state");
        self.invalidate().await;
        match address {
            Some(address) => {
                futures::join!(
                    self.refresh_all_limits(),
                    self.refresh_balances(address, phase)
                );
            }
            None => {
                self.refresh_all_limits().await;
            }
        }
    }
}

fn reading(what: &str, result: BridgeResult<U256>, phase: TransferPhase) -> Reading<U256> {
    match result {
        Ok(value) => Reading::fresh(value, phase),
        Err(e) => {
            warn!("{} unavailable: {}", what, e);
            Reading::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::types::BridgeLimits;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    #[derive(Default)]
    struct FlakyClient {
        /// Limit fetches that fail before one succeeds.
        limit_failures: AtomicU32,
        limit_calls: AtomicU32,
        fail_balances: AtomicBool,
    }

    impl FlakyClient {
        fn failing_limits(times: u32) -> Self {
            let client = Self::default();
            client.limit_failures.store(times, Ordering::SeqCst);
            client
        }
    }

    #[async_trait]
    impl ChainClient for FlakyClient {
        async fn native_balance(&self, _address: Address, chain: ChainId) -> BridgeResult<U256> {
            if self.fail_balances.load(Ordering::SeqCst) {
                return Err(BridgeError::chain_query(chain, "timeout"));
            }
            Ok(U256::from(chain.as_u64()))
        }

        async fn bridge_limits(&self, chain: ChainId) -> BridgeResult<BridgeLimits> {
            self.limit_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.limit_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.limit_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BridgeError::chain_query(chain, "connection refused"));
            }
            Ok(BridgeLimits {
                max_transfer_amount: U256::from(100u64),
                cooldown_secs: 30,
            })
        }

        async fn token_balance(&self, _address: Address, chain: ChainId) -> BridgeResult<U256> {
            if self.fail_balances.load(Ordering::SeqCst) {
                return Err(BridgeError::chain_query(chain, "timeout"));
            }
            Ok(U256::from(5u64))
        }
    }

    fn info(client: FlakyClient) -> (Arc<FlakyClient>, NetworkInfo) {
        let client = Arc::new(client);
        let info = NetworkInfo::new(client.clone(), RetryPolicy::default());
        (client, info)
    }

    #[tokio::test]
    async fn test_limits_start_unknown() {
        let (_, info) = info(FlakyClient::default());
        assert_eq!(info.limits(ChainId::RupayaTestnet).await, LimitStatus::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limits_recover_within_retry_budget() {
        let (client, info) = info(FlakyClient::failing_limits(2));
        let status = info.refresh_limits(ChainId::RupayaTestnet).await;
        assert!(status.is_known());
        assert_eq!(client.limit_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_reset_to_unknown() {
        let (client, info) = info(FlakyClient::default());
        assert!(info.refresh_limits(ChainId::BinanceTestnet).await.is_known());

        client.limit_failures.store(3, Ordering::SeqCst);
        let status = info.refresh_limits(ChainId::BinanceTestnet).await;

        assert_eq!(status, LimitStatus::Unknown);
        assert_eq!(info.limits(ChainId::BinanceTestnet).await, LimitStatus::Unknown);
        assert_eq!(client.limit_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_balances_tagged_with_phase() {
        let (_, info) = info(FlakyClient::default());
        let address = Address::repeat_byte(7);

        let snapshot = info.refresh_balances(address, TransferPhase::Confirming).await;
        assert_eq!(snapshot.native(ChainId::RupayaTestnet).value(), Some(&U256::from(799u64)));
        assert_eq!(snapshot.wrapped.value(), Some(&U256::from(5u64)));
        assert!(!snapshot.is_authoritative());

        let snapshot = info.refresh_balances(address, TransferPhase::Idle).await;
        assert!(snapshot.is_authoritative());
        assert_eq!(info.balances(address).await, snapshot);
    }

    #[tokio::test]
    async fn test_failed_balance_reads_are_unavailable() {
        let client = FlakyClient::default();
        client.fail_balances.store(true, Ordering::SeqCst);
        let (_, info) = info(client);

        let snapshot = info.refresh_balances(Address::zero(), TransferPhase::Idle).await;
        assert_eq!(snapshot, BalanceSnapshot::default());
    }

    #[tokio::test]
    async fn test_offline_marks_stale_and_invalidate_forgets_limits() {
        let (_, info) = info(FlakyClient::default());
        let address = Address::repeat_byte(1);
        info.refresh_balances(address, TransferPhase::Idle).await;
        info.refresh_all_limits().await;

        assert!(info.set_connectivity(Connectivity::Offline).await);
        assert!(!info.set_connectivity(Connectivity::Offline).await);
        let snapshot = info.balances(address).await;
        assert!(snapshot.rupaya_native.is_stale());
        assert!(snapshot.wrapped.is_stale());

        info.invalidate().await;
        for (_, status) in info.all_limits().await {
            assert_eq!(status, LimitStatus::Unknown);
        }
    }

    #[tokio::test]
    async fn test_resync_refetches_everything() {
        let (client, info) = info(FlakyClient::default());
        let address = Address::repeat_byte(2);

        info.resync(Some(address), TransferPhase::Idle).await;
        assert_eq!(client.limit_calls.load(Ordering::SeqCst), 2);
        assert!(info.balances(address).await.is_authoritative());

        info.clear_balances(address).await;
        assert_eq!(info.balances(address).await, BalanceSnapshot::default());
    }
}
