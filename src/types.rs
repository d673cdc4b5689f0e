//! Shared identifier types and platform constants
//!
//! Every identifier that crosses the ledger boundary is validated at
//! construction so the rest of the crate can treat it as well-formed.

use crate::errors::{SettlementError, SettleResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis-point denominator: 10000 bps = 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Fixed platform share of entry fees, in basis points (20%).
pub const PLATFORM_FEE_BPS: u16 = 2_000;

/// Maximum host fee, in basis points (5%).
pub const MAX_HOST_FEE_BPS: u16 = 500;

/// Maximum prize pool share for pool-split rooms, in basis points (40%).
pub const MAX_PRIZE_POOL_BPS: u16 = 4_000;

/// Minimum charity share of entry fees, in basis points (40%).
pub const MIN_CHARITY_BPS: u16 = 4_000;

/// Maximum number of winners a host may declare.
pub const MAX_WINNERS: usize = 10;

/// Maximum number of pre-funded prize slots in an asset-based room.
pub const MAX_PRIZE_SLOTS: usize = 3;

/// Maximum room identifier length in bytes.
pub const MAX_ROOM_ID_LEN: usize = 32;

/// Maximum charity memo length in bytes.
pub const MAX_CHARITY_MEMO_LEN: usize = 28;

/// Validated room identifier: 1..=32 chars from `[A-Za-z0-9_-]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> SettleResult<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_ROOM_ID_LEN {
            return Err(SettlementError::Validation(format!(
                "room id must be 1..={} characters, got {}",
                MAX_ROOM_ID_LEN,
                id.len()
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SettlementError::Validation(format!(
                "room id '{}' contains characters outside [A-Za-z0-9_-]",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque ledger account identifier (wallet address, token account, ...).
///
/// The exact encoding is ledger-family specific; this layer only moves it
/// between reads and transaction plans.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> SettleResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SettlementError::Validation(
                "account id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fungible or non-fungible asset identifier (token mint, currency code).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> SettleResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(SettlementError::Validation(
                "asset id cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a charity memo (attached verbatim to the donation transfer).
pub fn validate_charity_memo(memo: &str) -> SettleResult<()> {
    if memo.len() > MAX_CHARITY_MEMO_LEN {
        return Err(SettlementError::Validation(format!(
            "charity memo exceeds {} bytes ({} given)",
            MAX_CHARITY_MEMO_LEN,
            memo.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_accepts_valid_charset() {
        assert!(RoomId::new("friday-quiz_01").is_ok());
        assert!(RoomId::new("A").is_ok());
        assert!(RoomId::new("a".repeat(32)).is_ok());
    }

    #[test]
    fn test_room_id_rejects_bad_input() {
        assert!(RoomId::new("").is_err());
        assert!(RoomId::new("a".repeat(33)).is_err());
        assert!(RoomId::new("room with spaces").is_err());
        assert!(RoomId::new("room!").is_err());
    }

    #[test]
    fn test_charity_memo_limit() {
        assert!(validate_charity_memo("for the local shelter").is_ok());
        assert!(validate_charity_memo(&"m".repeat(28)).is_ok());
        assert!(validate_charity_memo(&"m".repeat(29)).is_err());
    }

    #[test]
    fn test_account_and_asset_ids_reject_empty() {
        assert!(AccountId::new("").is_err());
        assert!(AssetId::new("").is_err());
        assert!(AccountId::new("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin").is_ok());
    }
}
