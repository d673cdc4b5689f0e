//! Prize Escrow Model
//!
//! In-memory view of the up-to-three pre-funded prize slots of an
//! asset-based room. Slot mutations are owned by the ledger program; this
//! model is only updated after a confirmed on-ledger read, and a slot is
//! immutable once deposited.

use crate::errors::{SettlementError, SettleResult};
use crate::types::{AssetId, MAX_PRIZE_SLOTS};
use serde::{Deserialize, Serialize};

/// Whether a prize slot holds a fungible amount or a single non-fungible
/// asset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrizeKind {
    Fungible,
    NonFungible,
}

/// One configured prize position. Index 0 is first place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeSlot {
    pub index: u8,
    pub asset: AssetId,
    pub amount: u64,
    pub kind: PrizeKind,
    pub deposited: bool,
}

/// Ordered prize slots for an asset-based room.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeEscrow {
    slots: Vec<PrizeSlot>,
}

impl PrizeEscrow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the next prize slot at room creation. Slots must be added
    /// in order starting at index 0; slot 0 is mandatory, 1 and 2 optional.
    pub fn configure_slot(
        &mut self,
        index: u8,
        kind: PrizeKind,
        asset: AssetId,
        amount: u64,
    ) -> SettleResult<()> {
        if index as usize >= MAX_PRIZE_SLOTS {
            return Err(SettlementError::Validation(format!(
                "prize slot index {} out of range (0..{})",
                index, MAX_PRIZE_SLOTS
            )));
        }
        if index as usize != self.slots.len() {
            return Err(SettlementError::Validation(format!(
                "prize slots must be configured in order; expected index {}, got {}",
                self.slots.len(),
                index
            )));
        }
        if amount == 0 {
            return Err(SettlementError::Validation(format!(
                "prize slot {} amount must be greater than zero",
                index
            )));
        }
        if kind == PrizeKind::NonFungible && amount != 1 {
            return Err(SettlementError::Validation(format!(
                "prize slot {} is non-fungible and must have amount 1, got {}",
                index, amount
            )));
        }
        self.slots.push(PrizeSlot {
            index,
            asset,
            amount,
            kind,
            deposited: false,
        });
        Ok(())
    }

    /// Mark a slot funded. Callers may only do this after a confirmed
    /// on-ledger transfer and a fresh read showing the slot deposited.
    pub fn mark_deposited(&mut self, index: u8) -> SettleResult<()> {
        let slot = self.slots.get_mut(index as usize).ok_or_else(|| {
            SettlementError::Validation(format!("prize slot {} is not configured", index))
        })?;
        if slot.deposited {
            return Err(SettlementError::Validation(format!(
                "prize slot {} is already deposited and immutable",
                index
            )));
        }
        slot.deposited = true;
        Ok(())
    }

    pub fn slot(&self, index: u8) -> Option<&PrizeSlot> {
        self.slots.get(index as usize)
    }

    pub fn slots(&self) -> &[PrizeSlot] {
        &self.slots
    }

    pub fn configured_count(&self) -> usize {
        self.slots.len()
    }

    /// How many configured slots are funded.
    pub fn deposited_count(&self) -> usize {
        self.slots.iter().filter(|s| s.deposited).count()
    }

    /// Every configured slot is funded (and at least one is configured).
    pub fn fully_funded(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(|s| s.deposited)
    }
}
