//! Room model and lifecycle controller
//!
//! The room is the unit of orchestration: a fundraising game whose entry
//! fees and/or pre-funded prizes settle on a ledger. This module owns the
//! client-side state machine and gates which orchestrator operations are
//! legal in which state. Transitions are driven only by confirmed on-ledger
//! state changes, never by optimistic client assumption, and illegal
//! transitions are rejected locally before any network call.

use crate::errors::{SettlementError, SettleResult};
use crate::escrow::PrizeEscrow;
use crate::fees::FeeSplit;
use crate::types::{validate_charity_memo, AccountId, AssetId, RoomId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a room's prizes are funded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomMode {
    /// Prizes are a percentage of collected entry fees, split among the
    /// declared winners by `prize_distribution` (percent per place, sums to
    /// 100).
    PoolSplit {
        prize_pool_bps: u16,
        prize_distribution: Vec<u8>,
    },
    /// Prizes are specific pre-deposited assets held in escrow slots.
    AssetBased { escrow: PrizeEscrow },
}

/// Client-side room state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    Created,
    AwaitingFunding,
    PartiallyFunded,
    Ready,
    Open,
    JoiningClosed,
    WinnersDeclared,
    Ended,
    Cleaned,
}

/// A fundraising room mirrored from confirmed ledger reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub host: AccountId,
    pub fee_asset: AssetId,
    /// Entry fee in the fee asset's smallest unit.
    pub entry_fee: u64,
    pub max_players: u32,
    pub host_fee_bps: u16,
    pub mode: RoomMode,
    pub charity_memo: String,
    /// Host-supplied static charity address, used when the routing
    /// collaborator cannot produce a destination.
    pub charity_fallback: Option<AccountId>,
    /// Ledger slot after which the room is expired; 0 means never.
    pub expiration_slot: u64,
    /// Monotonic non-decreasing while the room is open.
    pub total_entry_fees: u64,
    pub total_extras_fees: u64,
    pub player_count: u32,
    pub state: RoomState,
    /// Roster mirrored from the ledger after a confirmed declare-winners.
    pub winners: Vec<AccountId>,
}

/// Parameters shared by both room modes.
#[derive(Clone, Debug)]
pub struct RoomParams {
    pub id: RoomId,
    pub host: AccountId,
    pub fee_asset: AssetId,
    pub entry_fee: u64,
    pub max_players: u32,
    pub host_fee_bps: u16,
    pub charity_memo: String,
    pub charity_fallback: Option<AccountId>,
    pub expiration_slot: u64,
}

impl Room {
    /// Create a pool-split room. Pool rooms need no escrow step and start
    /// `Ready` as soon as the creation transaction confirms.
    pub fn new_pool(
        params: RoomParams,
        prize_pool_bps: u16,
        prize_distribution: Vec<u8>,
    ) -> SettleResult<Self> {
        // validates host fee, pool share, and the charity minimum
        FeeSplit::pool(params.host_fee_bps, prize_pool_bps)?;
        validate_room_params(&params)?;
        if prize_distribution.is_empty() || prize_distribution.len() > 3 {
            return Err(SettlementError::Validation(
                "prize distribution must cover 1 to 3 places".to_string(),
            ));
        }
        let sum: u32 = prize_distribution.iter().map(|p| *p as u32).sum();
        if sum != 100 {
            return Err(SettlementError::Validation(format!(
                "prize distribution must sum to 100 percent, got {}",
                sum
            )));
        }
        Ok(Self::with_mode(
            params,
            RoomMode::PoolSplit {
                prize_pool_bps,
                prize_distribution,
            },
            RoomState::Created,
        ))
    }

    /// Create an asset-based room. The escrow must already carry its slot
    /// configuration (slot 0 mandatory); the room waits in `AwaitingFunding`
    /// until every configured slot is deposited.
    pub fn new_asset(params: RoomParams, escrow: PrizeEscrow) -> SettleResult<Self> {
        FeeSplit::asset(params.host_fee_bps)?;
        validate_room_params(&params)?;
        if escrow.configured_count() == 0 {
            return Err(SettlementError::Validation(
                "asset-based room requires at least prize slot 0".to_string(),
            ));
        }
        Ok(Self::with_mode(
            params,
            RoomMode::AssetBased { escrow },
            RoomState::Created,
        ))
    }

    fn with_mode(params: RoomParams, mode: RoomMode, state: RoomState) -> Self {
        Self {
            id: params.id,
            host: params.host,
            fee_asset: params.fee_asset,
            entry_fee: params.entry_fee,
            max_players: params.max_players,
            host_fee_bps: params.host_fee_bps,
            mode,
            charity_memo: params.charity_memo,
            charity_fallback: params.charity_fallback,
            expiration_slot: params.expiration_slot,
            total_entry_fees: 0,
            total_extras_fees: 0,
            player_count: 0,
            state,
            winners: Vec::new(),
        }
    }

    /// Recompute the fee split for this room's configuration.
    ///
    /// Fields may have been mirrored from a ledger read, so the bps limits
    /// are re-checked here rather than trusted.
    pub fn fee_split(&self) -> SettleResult<FeeSplit> {
        match &self.mode {
            RoomMode::PoolSplit { prize_pool_bps, .. } => {
                FeeSplit::pool(self.host_fee_bps, *prize_pool_bps)
            }
            RoomMode::AssetBased { .. } => FeeSplit::asset(self.host_fee_bps),
        }
    }

    pub fn escrow(&self) -> Option<&PrizeEscrow> {
        match &self.mode {
            RoomMode::AssetBased { escrow } => Some(escrow),
            RoomMode::PoolSplit { .. } => None,
        }
    }

    pub fn is_expired(&self, current_slot: u64) -> bool {
        self.expiration_slot > 0 && current_slot >= self.expiration_slot
    }

    /// Whether the lifecycle table permits `from -> to`.
    fn may_transition(&self, to: RoomState) -> bool {
        use RoomState::*;
        match (self.state, to) {
            // asset rooms fund their escrow first; pool rooms skip straight
            // to Ready
            (Created, AwaitingFunding) => matches!(self.mode, RoomMode::AssetBased { .. }),
            (Created, Ready) => matches!(self.mode, RoomMode::PoolSplit { .. }),
            (AwaitingFunding, PartiallyFunded) => true,
            (AwaitingFunding, Ready) => true,
            (PartiallyFunded, Ready) => true,
            (Ready, Open) => true,
            (Open, JoiningClosed) => true,
            (JoiningClosed, WinnersDeclared) => true,
            (WinnersDeclared, Ended) => true,
            (Ended, Cleaned) => true,
            _ => false,
        }
    }

    /// Apply a confirmed transition. Rejected locally when illegal; callers
    /// must only invoke this after the corresponding ledger change has
    /// confirmed.
    pub fn transition(&mut self, to: RoomState) -> SettleResult<()> {
        if !self.may_transition(to) {
            return Err(SettlementError::Validation(format!(
                "illegal room transition {:?} -> {:?} for room {}",
                self.state, to, self.id
            )));
        }
        debug!(room = %self.id, from = ?self.state, to = ?to, "room transition");
        self.state = to;
        Ok(())
    }

    /// Fail unless the room is in `expected`.
    pub fn ensure_state(&self, expected: RoomState) -> SettleResult<()> {
        if self.state != expected {
            return Err(SettlementError::Validation(format!(
                "room {} is {:?}, operation requires {:?}",
                self.id, self.state, expected
            )));
        }
        Ok(())
    }

    /// Mirror a confirmed prize deposit into the escrow and advance the
    /// funding state.
    pub fn apply_confirmed_deposit(&mut self, slot_index: u8) -> SettleResult<()> {
        if !matches!(
            self.state,
            RoomState::AwaitingFunding | RoomState::PartiallyFunded
        ) {
            return Err(SettlementError::Validation(format!(
                "room {} is {:?}, deposits only apply while funding",
                self.id, self.state
            )));
        }
        let escrow = match &mut self.mode {
            RoomMode::AssetBased { escrow } => escrow,
            RoomMode::PoolSplit { .. } => {
                return Err(SettlementError::Validation(format!(
                    "room {} is pool-split and holds no prize escrow",
                    self.id
                )))
            }
        };
        escrow.mark_deposited(slot_index)?;
        let next = if escrow.fully_funded() {
            RoomState::Ready
        } else {
            RoomState::PartiallyFunded
        };
        if self.state != next {
            self.transition(next)?;
        }
        Ok(())
    }

    /// Mirror a confirmed player join: bump counters and fee accumulators.
    pub fn apply_confirmed_join(&mut self, entry_paid: u64, extras_paid: u64) -> SettleResult<()> {
        self.ensure_state(RoomState::Open)?;
        if self.player_count >= self.max_players {
            return Err(SettlementError::Validation(format!(
                "room {} is full ({} players)",
                self.id, self.max_players
            )));
        }
        self.player_count += 1;
        self.total_entry_fees = self.total_entry_fees.saturating_add(entry_paid);
        self.total_extras_fees = self.total_extras_fees.saturating_add(extras_paid);
        Ok(())
    }
}

fn validate_room_params(params: &RoomParams) -> SettleResult<()> {
    if params.entry_fee == 0 {
        return Err(SettlementError::Validation(
            "entry fee must be greater than zero".to_string(),
        ));
    }
    if params.max_players == 0 {
        return Err(SettlementError::Validation(
            "max players must be at least 1".to_string(),
        ));
    }
    validate_charity_memo(&params.charity_memo)?;
    Ok(())
}

/// One player's participation in one room, mirrored from the ledger.
///
/// Looked up by the composite key `(room, player)`; created at most once per
/// pair. A second join attempt short-circuits on the existing entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEntry {
    pub room: RoomId,
    pub player: AccountId,
    pub entry_paid: u64,
    pub extras_paid: u64,
    /// Monotonic ledger-time ordinal of the join.
    pub joined_at: u64,
}

impl PlayerEntry {
    pub fn total_paid(&self) -> u64 {
        self.entry_paid + self.extras_paid
    }
}
