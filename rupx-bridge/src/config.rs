//! Bridge configuration.
//!
//! RPC endpoints, contract addresses and explorer URLs for both chains are
//! required; a missing or malformed value is fatal at startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::chains::ChainId;
use crate::error::{BridgeError, BridgeResult};
use crate::retry::RetryPolicy;
use crate::types::parse_address;
use crate::DEFAULT_CONFIRMATION_TIMEOUT_SECS;

// ═══════════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

const RUPAYA_RPC_URL_ENV: &str = "RUPX_RUPAYA_RPC_URL";
const BINANCE_RPC_URL_ENV: &str = "RUPX_BINANCE_RPC_URL";
const RUPAYA_BRIDGE_ADDRESS_ENV: &str = "RUPX_RUPAYA_BRIDGE_ADDRESS";
const BINANCE_BRIDGE_ADDRESS_ENV: &str = "RUPX_BINANCE_BRIDGE_ADDRESS";
const RUPAYA_EXPLORER_URL_ENV: &str = "RUPX_RUPAYA_EXPLORER_URL";
const BINANCE_EXPLORER_URL_ENV: &str = "RUPX_BINANCE_EXPLORER_URL";
const LEDGER_DIR_ENV: &str = "RUPX_LEDGER_DIR";
const RETRY_MAX_ATTEMPTS_ENV: &str = "RUPX_RETRY_MAX_ATTEMPTS";
const RETRY_BACKOFF_MS_ENV: &str = "RUPX_RETRY_BACKOFF_MS";
const CONFIRMATION_TIMEOUT_ENV: &str = "RUPX_CONFIRMATION_TIMEOUT_SECS";

const DEFAULT_LEDGER_DIR: &str = "bridge-history";

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-chain connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainEndpoint {
    /// Chain these settings belong to.
    pub chain: ChainId,
    /// JSON-RPC URL used for read-only queries.
    pub rpc_url: String,
    /// Deployed bridge contract.
    pub bridge_contract: Address,
    /// Block explorer base URL, without trailing slash.
    pub explorer_url: String,
}

/// Complete configuration of the bridge core.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub rupaya: ChainEndpoint,
    pub binance: ChainEndpoint,
    /// Directory holding one history file per address.
    pub ledger_dir: PathBuf,
    /// Retry policy for network-info fetches.
    pub retry: RetryPolicy,
    /// Upper bound on waiting for one confirmation.
    pub confirmation_timeout: Duration,
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> BridgeResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BridgeResult<Self> {
        let rupaya = ChainEndpoint {
            chain: ChainId::RupayaTestnet,
            rpc_url: required_url(&lookup, RUPAYA_RPC_URL_ENV)?,
            bridge_contract: required_address(&lookup, RUPAYA_BRIDGE_ADDRESS_ENV)?,
            explorer_url: required_url(&lookup, RUPAYA_EXPLORER_URL_ENV)?,
        };
        let binance = ChainEndpoint {
            chain: ChainId::BinanceTestnet,
            rpc_url: required_url(&lookup, BINANCE_RPC_URL_ENV)?,
            bridge_contract: required_address(&lookup, BINANCE_BRIDGE_ADDRESS_ENV)?,
            explorer_url: required_url(&lookup, BINANCE_EXPLORER_URL_ENV)?,
        };

        let ledger_dir = lookup(LEDGER_DIR_ENV)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_DIR));

        let defaults = RetryPolicy::default();
        let max_attempts = match optional_number(&lookup, RETRY_MAX_ATTEMPTS_ENV)? {
            Some(n) => u32::try_from(n).map_err(|_| {
                BridgeError::Config(format!("{RETRY_MAX_ATTEMPTS_ENV} is out of range: {n}"))
            })?,
            None => defaults.max_attempts,
        };
        if max_attempts == 0 {
            return Err(BridgeError::Config(format!(
                "{RETRY_MAX_ATTEMPTS_ENV} must be at least 1"
            )));
        }
        let backoff = optional_number(&lookup, RETRY_BACKOFF_MS_ENV)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.backoff);

        let confirmation_timeout = Duration::from_secs(
            optional_number(&lookup, CONFIRMATION_TIMEOUT_ENV)?
                .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
        );

        Ok(Self {
            rupaya,
            binance,
            ledger_dir,
            retry: RetryPolicy::new(max_attempts, backoff),
            confirmation_timeout,
        })
    }

    /// Settings of one chain.
    pub fn endpoint(&self, chain: ChainId) -> &ChainEndpoint {
        match chain {
            ChainId::RupayaTestnet => &self.rupaya,
            ChainId::BinanceTestnet => &self.binance,
        }
    }

    /// Bridge contract deployed on `chain`.
    pub fn bridge_contract(&self, chain: ChainId) -> Address {
        self.endpoint(chain).bridge_contract
    }

    /// Explorer page of a transaction sent on `chain`.
    pub fn explorer_tx_url(&self, chain: ChainId, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.endpoint(chain).explorer_url, tx_hash)
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> BridgeResult<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BridgeError::MissingConfig(key.to_string()))
}

fn required_url(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> BridgeResult<String> {
    let value = required(lookup, key)?;
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(BridgeError::Config(format!("{key} is not an http(s) URL: {value}")));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn required_address(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> BridgeResult<Address> {
    let value = required(lookup, key)?;
    parse_address(&value).map_err(|e| BridgeError::Config(format!("{key}: {e}")))
}

fn optional_number(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> BridgeResult<Option<u64>> {
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| BridgeError::Config(format!("{key} is not a number: {v}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (RUPAYA_RPC_URL_ENV, "https://rpc.testnet.rupaya.io".to_string()),
            (BINANCE_RPC_URL_ENV, "https://data-seed-prebsc-1-s1.binance.org:8545/".to_string()),
            (RUPAYA_BRIDGE_ADDRESS_ENV, format!("{:#x}", Address::repeat_byte(0x11))),
            (BINANCE_BRIDGE_ADDRESS_ENV, format!("{:#x}", Address::repeat_byte(0x22))),
            (RUPAYA_EXPLORER_URL_ENV, "https://scan.testnet.rupaya.io/".to_string()),
            (BINANCE_EXPLORER_URL_ENV, "https://testnet.bscscan.com".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> BridgeResult<BridgeConfig> {
        BridgeConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff, Duration::from_secs(1));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(300));
        assert_eq!(config.ledger_dir, PathBuf::from("bridge-history"));
        assert_eq!(
            config.bridge_contract(ChainId::BinanceTestnet),
            Address::repeat_byte(0x22)
        );
    }

    #[test]
    fn test_missing_required_value_is_fatal() {
        for key in [
            RUPAYA_RPC_URL_ENV,
            BINANCE_RPC_URL_ENV,
            RUPAYA_BRIDGE_ADDRESS_ENV,
            BINANCE_BRIDGE_ADDRESS_ENV,
            RUPAYA_EXPLORER_URL_ENV,
            BINANCE_EXPLORER_URL_ENV,
        ] {
            let mut env = base_env();
            env.remove(key);
            assert_eq!(
                load(&env).unwrap_err(),
                BridgeError::MissingConfig(key.to_string())
            );
        }
    }

    #[test]
    fn test_malformed_values_are_fatal() {
        let mut env = base_env();
        env.insert(RUPAYA_BRIDGE_ADDRESS_ENV, "0xnot-an-address".to_string());
        assert!(matches!(load(&env), Err(BridgeError::Config(_))));

        let mut env = base_env();
        env.insert(BINANCE_RPC_URL_ENV, "ws://localhost:8546".to_string());
        assert!(matches!(load(&env), Err(BridgeError::Config(_))));

        let mut env = base_env();
        env.insert(RETRY_BACKOFF_MS_ENV, "soon".to_string());
        assert!(matches!(load(&env), Err(BridgeError::Config(_))));

        let mut env = base_env();
        env.insert(RETRY_MAX_ATTEMPTS_ENV, "0".to_string());
        assert!(matches!(load(&env), Err(BridgeError::Config(_))));

        let mut env = base_env();
        env.insert(RETRY_MAX_ATTEMPTS_ENV, "4294967296".to_string());
        assert!(matches!(load(&env), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_overrides() {
        let mut env = base_env();
        env.insert(RETRY_MAX_ATTEMPTS_ENV, "5".to_string());
        env.insert(RETRY_BACKOFF_MS_ENV, "250".to_string());
        env.insert(CONFIRMATION_TIMEOUT_ENV, "30".to_string());
        env.insert(LEDGER_DIR_ENV, "/tmp/rupx".to_string());

        let config = load(&env).unwrap();
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::from_millis(250)));
        assert_eq!(config.confirmation_timeout, Duration::from_secs(30));
        assert_eq!(config.ledger_dir, PathBuf::from("/tmp/rupx"));
    }

    #[test]
    fn test_explorer_url() {
        let config = load(&base_env()).unwrap();
        assert_eq!(
            config.explorer_tx_url(ChainId::RupayaTestnet, "0xabc"),
            "https://scan.testnet.rupaya.io/tx/0xabc"
        );
        assert_eq!(
            config.explorer_tx_url(ChainId::BinanceTestnet, "0xdef"),
            "https://testnet.bscscan.com/tx/0xdef"
        );
    }
}
