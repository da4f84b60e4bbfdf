//! Core data model: amounts, limits, requests, history records and phases.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use ethers::types::{Address, TxHash, U256};
use ethers::utils::{format_units, parse_units, to_checksum};
use serde::{Deserialize, Serialize};

use crate::chains::{BridgeRoute, ChainId};
use crate::error::ValidationError;
use crate::TOKEN_DECIMALS;

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNTS & ADDRESSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Parse a decimal token amount ("5", "0.25") into smallest units.
///
/// Only plain non-negative decimals with at most 18 fractional digits are
/// accepted; signs, exponents and separators are rejected.
pub fn parse_amount(input: &str) -> Result<U256, ValidationError> {
    let trimmed = input.trim();
    let invalid = || ValidationError::InvalidAmount(input.to_string());

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let well_formed = !(whole.is_empty() && fraction.is_empty())
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c.is_ascii_digit())
        && fraction.len() <= TOKEN_DECIMALS as usize;
    if !well_formed {
        return Err(invalid());
    }

    let normalized = match (whole.is_empty(), fraction.is_empty()) {
        (true, _) => format!("0.{fraction}"),
        (false, true) => whole.to_string(),
        (false, false) => format!("{whole}.{fraction}"),
    };

    parse_units(normalized, TOKEN_DECIMALS)
        .map(U256::from)
        .map_err(|_| invalid())
}

/// Render smallest units as a decimal token amount without trailing zeros.
pub fn format_amount(amount: U256) -> String {
    let rendered = match format_units(amount, TOKEN_DECIMALS) {
        Ok(s) => s,
        Err(_) => return amount.to_string(),
    };
    match rendered.split_once('.') {
        Some((whole, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                whole.to_string()
            } else {
                format!("{whole}.{fraction}")
            }
        }
        None => rendered,
    }
}

/// Parse an account address, enforcing the EIP-55 checksum when the input
/// is mixed-case.
pub fn parse_address(input: &str) -> Result<Address, String> {
    let trimmed = input.trim();
    let address =
        Address::from_str(trimmed).map_err(|e| format!("invalid address {trimmed}: {e}"))?;

    let hex = trimmed.trim_start_matches("0x");
    let mixed_case =
        hex.chars().any(|c| c.is_ascii_uppercase()) && hex.chars().any(|c| c.is_ascii_lowercase());
    if mixed_case && to_checksum(&address, None) != format!("0x{hex}") {
        return Err(format!("address {trimmed} fails checksum validation"));
    }
    Ok(address)
}

/// Checksummed rendering of an address.
pub fn checksummed(address: &Address) -> String {
    to_checksum(address, None)
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIMITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Limits published by a chain's bridge contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeLimits {
    /// Largest single transfer, in smallest units.
    pub max_transfer_amount: U256,
    /// Minimum delay between two transfers from one address, enforced on-chain.
    pub cooldown_secs: u64,
}

/// Last known limits of a chain.
///
/// `Unknown` is both the initial value and the value after a failed fetch,
/// so a zero limit is never mistaken for "could not read".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LimitStatus {
    Known(BridgeLimits),
    #[default]
    Unknown,
}

impl LimitStatus {
    pub fn known(&self) -> Option<&BridgeLimits> {
        match self {
            Self::Known(limits) => Some(limits),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFER REQUEST
// ═══════════════════════════════════════════════════════════════════════════════

/// A transfer as entered by the user; any field may still be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: Option<ChainId>,
    pub destination: Option<ChainId>,
    /// Decimal amount in whole tokens, e.g. "5" or "0.5".
    pub amount: Option<String>,
}

impl TransferRequest {
    pub fn new(source: ChainId, destination: ChainId, amount: impl Into<String>) -> Self {
        Self {
            source: Some(source),
            destination: Some(destination),
            amount: Some(amount.into()),
        }
    }

    /// Validate against the limits of the source chain.
    ///
    /// `limits_for` is only consulted once a route has been established.
    pub fn validate(
        &self,
        limits_for: impl FnOnce(ChainId) -> LimitStatus,
    ) -> Result<ValidatedTransfer, ValidationError> {
        let source = self.source.ok_or(ValidationError::MissingField("source chain"))?;
        let destination = self
            .destination
            .ok_or(ValidationError::MissingField("destination chain"))?;
        let amount_text = self
            .amount
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .ok_or(ValidationError::MissingField("amount"))?;

        let route = BridgeRoute::new(source, destination)?;
        let amount = parse_amount(amount_text)?;
        if amount.is_zero() {
            return Err(ValidationError::NonPositiveAmount);
        }

        match limits_for(source) {
            LimitStatus::Unknown => Err(ValidationError::UnknownLimit(source)),
            LimitStatus::Known(limits) if amount > limits.max_transfer_amount => {
                Err(ValidationError::OverLimit {
                    amount,
                    max: limits.max_transfer_amount,
                })
            }
            LimitStatus::Known(_) => Ok(ValidatedTransfer {
                route,
                amount,
                amount_text: amount_text.to_string(),
            }),
        }
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub route: BridgeRoute,
    /// Amount in smallest units.
    pub amount: U256,
    /// Amount exactly as the user entered it.
    pub amount_text: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HISTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Status stored in a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

/// One terminal transfer attempt, as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    #[serde(rename = "date")]
    pub timestamp: DateTime<Utc>,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub status: TransferStatus,
    #[serde(rename = "txHash")]
    pub tx_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl TransferRecord {
    pub fn completed(transfer: &ValidatedTransfer, hash: TxHash) -> Self {
        Self::new(transfer, TransferStatus::Completed, Some(hash), None)
    }

    pub fn failed(transfer: &ValidatedTransfer, hash: Option<TxHash>, cause: impl Into<String>) -> Self {
        Self::new(transfer, TransferStatus::Failed, hash, Some(cause.into()))
    }

    fn new(
        transfer: &ValidatedTransfer,
        status: TransferStatus,
        hash: Option<TxHash>,
        cause: Option<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            from: transfer.route.source().label().to_string(),
            to: transfer.route.destination().label().to_string(),
            amount: transfer.amount_text.clone(),
            status,
            tx_hash: hash.map(|h| format!("{h:#x}")).unwrap_or_default(),
            cause,
        }
    }

    /// Chain the transaction was sent on, if the label is recognised.
    pub fn source_chain(&self) -> Option<ChainId> {
        ChainId::from_label(&self.from)
    }

    /// `0x1234...abcd` form of the hash.
    pub fn short_hash(&self) -> String {
        // Records are read back from disk and may hold non-ASCII text.
        let chars: Vec<char> = self.tx_hash.chars().collect();
        if chars.len() <= 10 {
            return self.tx_hash.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORCHESTRATION PHASES & READINGS
// ═══════════════════════════════════════════════════════════════════════════════

/// Phase of the transfer state machine for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferPhase {
    #[default]
    Idle,
    Validating,
    NetworkCheck,
    Submitting,
    Confirming,
    Completed,
    Failed,
}

impl TransferPhase {
    /// Whether a transfer is between validation and its terminal state.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Validating | Self::NetworkCheck | Self::Submitting | Self::Confirming
        )
    }

    /// Whether a transaction may be on its way to the chain.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Submitting | Self::Confirming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Validating => "Validating request",
            Self::NetworkCheck => "Checking wallet network",
            Self::Submitting => "Processing...",
            Self::Confirming => "Waiting for confirmation",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// A value read from a chain together with when and under which phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observed<T> {
    pub value: T,
    pub observed_at: DateTime<Utc>,
    pub phase: TransferPhase,
}

/// Display state of a cached chain read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reading<T> {
    Unavailable,
    Fresh(Observed<T>),
    Stale(Observed<T>),
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Self::Unavailable
    }
}

impl<T> Reading<T> {
    pub fn fresh(value: T, phase: TransferPhase) -> Self {
        Self::Fresh(Observed {
            value,
            observed_at: Utc::now(),
            phase,
        })
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fresh(o) | Self::Stale(o) => Some(&o.value),
            Self::Unavailable => None,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }

    /// Fresh and not taken while a transfer was in progress.
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Fresh(o) if !o.phase.is_active())
    }

    pub fn mark_stale(&mut self) {
        if let Self::Fresh(_) = self {
            if let Self::Fresh(observed) = std::mem::replace(self, Self::Unavailable) {
                *self = Self::Stale(observed);
            }
        }
    }
}
