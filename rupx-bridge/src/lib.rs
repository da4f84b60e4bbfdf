//! rupx-bridge
//!
//! Orchestration core for moving RUPX between the Rupaya testnet and the
//! Binance Smart Chain testnet.
//!
//! # Overview
//!
//! The bridge itself (locking, minting, burning) lives in two deployed
//! contracts. This crate is the client side of it: it reads balances and
//! bridge limits from both chains, drives a connected wallet through a
//! deposit or burn, waits for the confirmation, and keeps a per-address
//! history of terminal outcomes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          BridgeController                            │
//! │   connect · refresh · submit · history · clear · export · events     │
//! └───────┬──────────────────┬───────────────────┬───────────────┬───────┘
//!         │                  │                   │               │
//!         ▼                  ▼                   ▼               ▼
//! ┌──────────────┐  ┌─────────────────┐  ┌──────────────┐  ┌────────────┐
//! │ WalletGateway│  │BridgeOrchestrator│ │ NetworkInfo  │  │ Transfer   │
//! │ • session    │◄─┤ • validate       │─►│ • limits     │  │ Ledger     │
//! │ • events     │  │ • network check  │  │ • balances   │  │ • append   │
//! │ • send/await │  │ • deposit / burn │  │ • resync     │  │ • export   │
//! └──────┬───────┘  └────────┬─────────┘  └──────┬───────┘  └────────────┘
//!        │                   │                   │
//!        ▼                   ▼                   ▼
//!  WalletProvider      TransferLedger       ChainClient
//!  (LocalKeyWallet)    (FileLedger)         (EvmChainClient)
//! ```
//!
//! Every external capability (wallet, chain reads, history storage) is a
//! trait injected into the components, so each can be replaced by an
//! in-memory double.

pub mod chains;
pub mod client;
pub mod config;
pub mod contracts;
pub mod controller;
pub mod error;
pub mod ledger;
pub mod network;
pub mod orchestrator;
pub mod retry;
pub mod signer;
pub mod types;
pub mod wallet;

pub use chains::{ActiveChain, BridgeMethod, BridgeRoute, ChainId};
pub use client::{ChainClient, EvmChainClient};
pub use config::{BridgeConfig, ChainEndpoint};
pub use controller::BridgeController;
pub use error::{BridgeError, BridgeResult, ValidationError};
pub use ledger::{export_file_name, FileLedger, MemoryLedger, TransferLedger};
pub use network::{BalanceSnapshot, Connectivity, NetworkInfo};
pub use orchestrator::{BridgeOrchestrator, TransferOutcome, TransferProgress};
pub use retry::RetryPolicy;
pub use signer::LocalKeyWallet;
pub use types::{
    BridgeLimits, LimitStatus, Reading, TransferPhase, TransferRecord, TransferRequest,
    TransferStatus, ValidatedTransfer,
};
pub use wallet::{
    BridgeCall, Confirmation, EventSubscription, SessionChange, TransactionHandle, WalletEvent,
    WalletGateway, WalletProvider, WalletSession,
};

/// Symbol of the bridged asset.
pub const TOKEN_SYMBOL: &str = "RUPX";

/// Symbol of the wrapped asset on the Binance side.
pub const WRAPPED_TOKEN_SYMBOL: &str = "BRUPX";

/// Decimals of the native and wrapped token.
pub const TOKEN_DECIMALS: u32 = 18;

/// Default time to wait for one confirmation (5 minutes).
pub const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 300;
