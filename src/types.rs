//! Core lottery types shared by every pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub type Hash = [u8; 32];

// =============================================================================
// CONSTANTS
// =============================================================================

/// Prefix of every ledger record key created by this client.
pub const RECORD_ID_PREFIX: &str = "lottery-";

/// Description stored alongside every participant entry.
pub const ENTRY_DESCRIPTION: &str = "Lottery Participant Entry";

/// Trailing window for the "recent winners" statistic (24 hours).
pub const RECENT_WINDOW_SECS: u64 = 86_400;

/// Reserved second public field; always written as zero.
pub const PUBLIC_VALUE2_RESERVED: u64 = 0;

/// Hex digits in a wallet address after the `0x` prefix.
pub const ADDRESS_HEX_LEN: usize = 40;

// =============================================================================
// ADDRESSES
// =============================================================================

/// Wallet address of a participant (`0x`-prefixed hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checked wallet address: `0x` followed by 40 hex digits.
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let raw = raw.trim();
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| AddressError::Malformed(raw.to_string()))?;
        if digits.len() != ADDRESS_HEX_LEN || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError::Malformed(raw.to_string()));
        }
        Ok(Self(format!("0x{}", digits)))
    }

    /// `0x1234...abcd` form used in listings
    pub fn short(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 12 {
            return self.0.clone();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of the lottery contract on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractAddress(pub String);

impl ContractAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// One participant's ticket as loaded from the ledger.
///
/// `ledger_record_id` is the identity of the entry. `id` is only a display
/// number and may repeat across reloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryEntry {
    pub id: u64,
    pub display_name: String,
    pub ledger_record_id: String,
    /// Plaintext mirror of the ticket number
    pub public_value1: u64,
    pub public_value2: u64,
    pub description: String,
    pub creator_address: Address,
    pub created_at: u64,
    pub is_verified: bool,
    /// Ledger-sourced cleartext, only present when `is_verified`
    pub revealed_value: Option<u64>,
}

impl LotteryEntry {
    /// Cleartext the ledger vouches for, if any.
    pub fn verified_value(&self) -> Option<u64> {
        if self.is_verified { self.revealed_value } else { None }
    }
}

/// Display number for a record key: the millisecond stamp embedded in
/// `lottery-<millis>[-suffix]`, or `created_at` when the key has another shape.
pub fn display_id(record_id: &str, created_at: u64) -> u64 {
    record_id
        .strip_prefix(RECORD_ID_PREFIX)
        .and_then(|rest| rest.split('-').next())
        .and_then(|stamp| stamp.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(created_at)
}

/// Fresh record key for a new submission.
pub fn new_record_id() -> String {
    let suffix: u16 = rand::random();
    format!("{}{}-{:04x}", RECORD_ID_PREFIX, now_millis(), suffix)
}

/// Current unix time in seconds
pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current unix time in milliseconds
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("malformed wallet address: {0:?}")]
    Malformed(String),
}
