//! Fee Allocation Engine
//!
//! Pure integer basis-point math for splitting collected entry fees between
//! platform, host, prize pool, and charity. No I/O. All amount derivations
//! use `amount * bps / 10000` with floor division over a u128 intermediate,
//! matching the ledger program's own integer math bit for bit; any deviation
//! here shows up as a preview-vs-actual mismatch at distribution time.

use crate::errors::{SettlementError, SettleResult};
use crate::types::{
    BPS_DENOMINATOR, MAX_HOST_FEE_BPS, MAX_PRIZE_POOL_BPS, MIN_CHARITY_BPS, PLATFORM_FEE_BPS,
};
use serde::{Deserialize, Serialize};

/// Derive a money amount from a basis-point share. Floor division, same
/// rounding direction as the on-chain program.
pub fn amount_for_bps(amount: u64, bps: u16) -> u64 {
    (amount as u128 * bps as u128 / BPS_DENOMINATOR as u128) as u64
}

/// A validated fee split. Shares always sum to exactly 10000 bps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub platform_bps: u16,
    pub host_bps: u16,
    pub prize_pool_bps: u16,
    pub charity_bps: u16,
}

impl FeeSplit {
    /// Split for a pool-split room: platform fixed at 2000 bps, host and
    /// prize pool configurable, charity the remainder (minimum 4000 bps).
    pub fn pool(host_fee_bps: u16, prize_pool_bps: u16) -> SettleResult<Self> {
        if host_fee_bps > MAX_HOST_FEE_BPS {
            return Err(SettlementError::Validation(format!(
                "host fee {} bps exceeds maximum {} bps",
                host_fee_bps, MAX_HOST_FEE_BPS
            )));
        }
        if prize_pool_bps > MAX_PRIZE_POOL_BPS {
            return Err(SettlementError::Validation(format!(
                "prize pool {} bps exceeds maximum {} bps",
                prize_pool_bps, MAX_PRIZE_POOL_BPS
            )));
        }
        let allocated = PLATFORM_FEE_BPS as u32 + host_fee_bps as u32 + prize_pool_bps as u32;
        let charity_bps = BPS_DENOMINATOR as u32 - allocated;
        if charity_bps < MIN_CHARITY_BPS as u32 {
            return Err(SettlementError::Validation(format!(
                "charity share {} bps is below the {} bps minimum \
                 (host {} + prize pool {} leaves too little)",
                charity_bps, MIN_CHARITY_BPS, host_fee_bps, prize_pool_bps
            )));
        }
        Ok(Self {
            platform_bps: PLATFORM_FEE_BPS,
            host_bps: host_fee_bps,
            prize_pool_bps,
            charity_bps: charity_bps as u16,
        })
    }

    /// Split for an asset-based room: no prize pool component, pre-funded
    /// prizes substitute for it. Charity takes everything after platform and
    /// host.
    pub fn asset(host_fee_bps: u16) -> SettleResult<Self> {
        if host_fee_bps > MAX_HOST_FEE_BPS {
            return Err(SettlementError::Validation(format!(
                "host fee {} bps exceeds maximum {} bps",
                host_fee_bps, MAX_HOST_FEE_BPS
            )));
        }
        let charity_bps = BPS_DENOMINATOR as u16 - PLATFORM_FEE_BPS - host_fee_bps;
        Ok(Self {
            platform_bps: PLATFORM_FEE_BPS,
            host_bps: host_fee_bps,
            prize_pool_bps: 0,
            charity_bps,
        })
    }

    /// Sum of all shares; always 10000 for a validated split.
    pub fn total_bps(&self) -> u32 {
        self.platform_bps as u32
            + self.host_bps as u32
            + self.prize_pool_bps as u32
            + self.charity_bps as u32
    }

    /// Apply the split to observed pooled balances.
    ///
    /// Platform, host, and prize pool are floored bps shares of entry fees.
    /// Charity receives the exact remainder of entry fees plus 100% of
    /// extras, so the four amounts always reassemble the full pool with no
    /// dust left behind.
    pub fn apply(&self, entry_fees: u64, extras: u64) -> SettleResult<SettlementAmounts> {
        let platform = amount_for_bps(entry_fees, self.platform_bps);
        let host = amount_for_bps(entry_fees, self.host_bps);
        let prize_pool = amount_for_bps(entry_fees, self.prize_pool_bps);
        let charity_from_entry = entry_fees
            .checked_sub(platform)
            .and_then(|v| v.checked_sub(host))
            .and_then(|v| v.checked_sub(prize_pool))
            .ok_or_else(|| {
                SettlementError::Validation("fee shares exceed entry fee pool".to_string())
            })?;
        let charity = charity_from_entry.checked_add(extras).ok_or_else(|| {
            SettlementError::Validation("charity amount overflows u64".to_string())
        })?;
        Ok(SettlementAmounts {
            platform,
            host,
            prize_pool,
            charity,
        })
    }
}

/// Concrete per-category amounts in the fee asset's smallest unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementAmounts {
    pub platform: u64,
    pub host: u64,
    pub prize_pool: u64,
    pub charity: u64,
}

impl SettlementAmounts {
    pub fn total(&self) -> u64 {
        self.platform + self.host + self.prize_pool + self.charity
    }
}
