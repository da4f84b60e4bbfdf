//! Chain identifiers and transfer routes.
//!
//! The bridge spans exactly two EVM chains. Every transfer is an ordered
//! pair of them, and the pair alone decides which contract method is used.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Numeric EVM chain id of the Rupaya testnet.
pub const RUPAYA_TESTNET_ID: u64 = 799;
/// Numeric EVM chain id of the BSC testnet.
pub const BINANCE_TESTNET_ID: u64 = 97;

/// A chain the bridge operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainId {
    /// Rupaya testnet, home of native RUPX.
    RupayaTestnet,
    /// Binance Smart Chain testnet, home of wrapped BRUPX.
    BinanceTestnet,
}

impl ChainId {
    /// Both chains, in a fixed order.
    pub const ALL: [ChainId; 2] = [ChainId::RupayaTestnet, ChainId::BinanceTestnet];

    /// Numeric EVM chain id.
    pub fn as_u64(self) -> u64 {
        match self {
            Self::RupayaTestnet => RUPAYA_TESTNET_ID,
            Self::BinanceTestnet => BINANCE_TESTNET_ID,
        }
    }

    /// Look up a chain by numeric id.
    pub fn from_u64(id: u64) -> Option<Self> {
        match id {
            RUPAYA_TESTNET_ID => Some(Self::RupayaTestnet),
            BINANCE_TESTNET_ID => Some(Self::BinanceTestnet),
            _ => None,
        }
    }

    /// Label written into history records.
    pub fn label(self) -> &'static str {
        match self {
            Self::RupayaTestnet => "Rupaya",
            Self::BinanceTestnet => "BSC",
        }
    }

    /// Resolve a history label back into a chain.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }

    /// Short key used on the command line and in configuration.
    pub fn key(self) -> &'static str {
        match self {
            Self::RupayaTestnet => "rupaya",
            Self::BinanceTestnet => "bsc",
        }
    }

    /// Human-readable chain name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::RupayaTestnet => "Rupaya Testnet",
            Self::BinanceTestnet => "Binance Smart Chain Testnet",
        }
    }

    /// Symbol of the chain's native gas token.
    pub fn native_symbol(self) -> &'static str {
        match self {
            Self::RupayaTestnet => "RUPX",
            Self::BinanceTestnet => "BNB",
        }
    }

    /// The other side of the bridge.
    pub fn counterpart(self) -> Self {
        match self {
            Self::RupayaTestnet => Self::BinanceTestnet,
            Self::BinanceTestnet => Self::RupayaTestnet,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name(), self.as_u64())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rupaya" | "rupaya-testnet" | "799" => Ok(Self::RupayaTestnet),
            "bsc" | "binance" | "binance-testnet" | "97" => Ok(Self::BinanceTestnet),
            other => Err(format!("unknown chain: {other}")),
        }
    }
}

/// Chain the wallet currently reports, which may be outside the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveChain {
    Supported(ChainId),
    Unsupported(u64),
}

impl ActiveChain {
    pub fn from_u64(id: u64) -> Self {
        ChainId::from_u64(id).map_or(Self::Unsupported(id), Self::Supported)
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Self::Supported(chain) => chain.as_u64(),
            Self::Unsupported(id) => id,
        }
    }

    pub fn supported(self) -> Option<ChainId> {
        match self {
            Self::Supported(chain) => Some(chain),
            Self::Unsupported(_) => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

/// Contract method a route is executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeMethod {
    /// `deposit()` on the Rupaya-side contract, amount attached as value.
    Deposit,
    /// `burn(amount)` on the Binance-side contract.
    Burn,
}

impl BridgeMethod {
    pub fn name(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Burn => "burn",
        }
    }
}

/// An ordered, valid (source ≠ destination) pair of chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRoute {
    source: ChainId,
    destination: ChainId,
}

impl BridgeRoute {
    /// Rupaya → BSC.
    pub const RUPAYA_TO_BINANCE: BridgeRoute = BridgeRoute {
        source: ChainId::RupayaTestnet,
        destination: ChainId::BinanceTestnet,
    };

    /// BSC → Rupaya.
    pub const BINANCE_TO_RUPAYA: BridgeRoute = BridgeRoute {
        source: ChainId::BinanceTestnet,
        destination: ChainId::RupayaTestnet,
    };

    /// Build a route, rejecting same-chain pairs.
    pub fn new(source: ChainId, destination: ChainId) -> Result<Self, ValidationError> {
        match (source, destination) {
            (ChainId::RupayaTestnet, ChainId::BinanceTestnet) => Ok(Self::RUPAYA_TO_BINANCE),
            (ChainId::BinanceTestnet, ChainId::RupayaTestnet) => Ok(Self::BINANCE_TO_RUPAYA),
            _ => Err(ValidationError::SameChain(source)),
        }
    }

    pub fn source(&self) -> ChainId {
        self.source
    }

    pub fn destination(&self) -> ChainId {
        self.destination
    }

    /// Contract method that executes this route on the source chain.
    pub fn method(&self) -> BridgeMethod {
        match self.source {
            ChainId::RupayaTestnet => BridgeMethod::Deposit,
            ChainId::BinanceTestnet => BridgeMethod::Burn,
        }
    }
}

impl fmt::Display for BridgeRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.label(), self.destination.label())
    }
}
