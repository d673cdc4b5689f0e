//! Ledger client interface
//!
//! The settlement layer drives externally-deployed room programs on two
//! structurally different ledger families: allowance-style (account-and-
//! balance, spender approvals) and token-account-style (per-asset holding
//! accounts that must exist before they can receive). Everything the
//! orchestrator needs from a ledger sits behind [`LedgerClient`] so the same
//! protocol runs against either family, and so tests can drive the whole
//! stack with an in-memory implementation.
//!
//! Clients are injected per call; this crate holds no global provider
//! handle.

use crate::errors::SettleResult;
use crate::events::LedgerEvent;
use crate::room::{PlayerEntry, Room};
use crate::types::{AccountId, AssetId, RoomId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two ledger programming models this client supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerFamily {
    /// Account-and-balance with spender allowances (approve-then-transfer).
    Allowance,
    /// Per-asset token accounts that must be created before receiving.
    TokenAccount,
}

impl fmt::Display for LedgerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerFamily::Allowance => f.write_str("allowance"),
            LedgerFamily::TokenAccount => f.write_str("token-account"),
        }
    }
}

/// Which read endpoint to confirm against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Primary,
    Fallback,
}

/// One program invocation inside a transaction plan.
///
/// Account/argument layouts are program-specific; the client implementation
/// maps these logical calls onto its wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ProgramCall {
    CreateRoom {
        room: Room,
    },
    JoinRoom {
        room_id: RoomId,
        player: AccountId,
        extras: u64,
    },
    DepositPrizeAsset {
        room_id: RoomId,
        slot_index: u8,
        asset: AssetId,
        amount: u64,
    },
    CloseJoining {
        room_id: RoomId,
    },
    DeclareWinners {
        room_id: RoomId,
        winners: Vec<AccountId>,
    },
    Distribute {
        room_id: RoomId,
        charity_destination: AccountId,
        intent_id: String,
    },
    CleanupRoom {
        room_id: RoomId,
    },
    /// Allowance-family preflight: authorize the settling program to move
    /// `amount` of `asset` from `owner`.
    Approve {
        owner: AccountId,
        asset: AssetId,
        amount: u64,
    },
    /// Token-account-family preflight: create `owner`'s holding account for
    /// `asset`, funded by `payer`.
    CreateHoldingAccount {
        owner: AccountId,
        asset: AssetId,
        payer: AccountId,
    },
}

/// A transaction ready for simulation and submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPlan {
    pub calls: Vec<ProgramCall>,
    /// Freshness token / sequencing reference (recent blockhash, sequence
    /// number) attached at build time.
    pub freshness: String,
    /// Settlement intent id for distribute transactions; the receiving
    /// program uses it to distinguish retries from duplicates.
    pub intent_id: Option<String>,
}

/// Opaque transaction signature/hash returned by submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxSignature(pub String);

impl fmt::Display for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dry-run result. `Err` from [`LedgerClient::simulate`] means the
/// simulation itself could not be performed (transport failure); a program
/// revert is a successful simulation with a `Reverted` outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulationOutcome {
    Ok { logs: Vec<String> },
    Reverted { code: Option<u32>, message: String },
}

/// Confirmation poll result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed(ConfirmedTransaction),
    Reverted { code: Option<u32>, message: String },
    /// Not yet visible on this endpoint; poll again.
    Pending,
}

/// A transaction that landed, with the events it emitted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub signature: TxSignature,
    pub slot: u64,
    pub events: Vec<LedgerEvent>,
}

/// Pooled entry-fee and extras balances currently held for a room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledBalance {
    pub entry_fees: u64,
    pub extras: u64,
}

/// Everything the settlement layer needs from a ledger.
///
/// Read accessors return confirmed state only; the orchestrator never
/// mirrors a field into its local model without one of these reads backing
/// it.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn family(&self) -> LedgerFamily;

    // --- reads ---

    async fn current_slot(&self) -> SettleResult<u64>;

    /// Freshness token attached to every built transaction.
    async fn freshness_token(&self) -> SettleResult<String>;

    async fn fetch_room(&self, id: &RoomId) -> SettleResult<Option<Room>>;

    async fn fetch_player_entry(
        &self,
        room: &RoomId,
        player: &AccountId,
    ) -> SettleResult<Option<PlayerEntry>>;

    /// Fresh read of a prize slot's deposited flag.
    async fn prize_slot_deposited(&self, room: &RoomId, slot_index: u8) -> SettleResult<bool>;

    async fn pooled_balance(&self, room: &RoomId) -> SettleResult<PooledBalance>;

    /// Allowance-family: how much the settling program may currently move
    /// from `owner`.
    async fn allowance(&self, owner: &AccountId, asset: &AssetId) -> SettleResult<u64>;

    /// Token-account-family: whether `owner`'s holding account for `asset`
    /// exists.
    async fn holding_account_exists(
        &self,
        owner: &AccountId,
        asset: &AssetId,
    ) -> SettleResult<bool>;

    // --- transaction primitives ---

    async fn simulate(&self, plan: &TransactionPlan) -> SettleResult<SimulationOutcome>;

    /// Broadcast the plan. Called at most once per plan; retries after a
    /// broadcast are a new user action with a fresh intent id.
    async fn submit(&self, plan: &TransactionPlan) -> SettleResult<TxSignature>;

    async fn confirm(
        &self,
        signature: &TxSignature,
        endpoint: Endpoint,
    ) -> SettleResult<ConfirmOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_serialization() {
        let plan = TransactionPlan {
            calls: vec![ProgramCall::CloseJoining {
                room_id: RoomId::new("r1").unwrap(),
            }],
            freshness: "blockhash-123".to_string(),
            intent_id: None,
        };
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"call\":\"close_joining\""));
        let back: TransactionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_family_display() {
        assert_eq!(LedgerFamily::Allowance.to_string(), "allowance");
        assert_eq!(LedgerFamily::TokenAccount.to_string(), "token-account");
    }
}
