//! Mirrored ledger events
//!
//! The program emits events for every confirmed state change; this client
//! parses them out of confirmed transactions for reporting and for the
//! preview-vs-actual reconciliation step. `RoomEnded` is the authority for
//! all user-facing settlement amounts.

use crate::fees::SettlementAmounts;
use crate::types::{AccountId, AssetId, RoomId};
use serde::{Deserialize, Serialize};

/// Events emitted by the room program, as read from confirmed transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    RoomCreated {
        room_id: RoomId,
        host: AccountId,
        entry_fee: u64,
        max_players: u32,
        expiration_slot: u64,
        timestamp: i64,
    },
    PlayerJoined {
        room_id: RoomId,
        player: AccountId,
        amount_paid: u64,
        extras_paid: u64,
        player_count: u32,
        timestamp: i64,
    },
    PrizeAssetDeposited {
        room_id: RoomId,
        slot_index: u8,
        asset: AssetId,
        amount: u64,
        depositor: AccountId,
        timestamp: i64,
    },
    WinnersDeclared {
        room_id: RoomId,
        winners: Vec<AccountId>,
        timestamp: i64,
    },
    /// Final distribution record. These amounts are what actually moved and
    /// override any client-side preview.
    RoomEnded {
        room_id: RoomId,
        winners: Vec<AccountId>,
        platform_amount: u64,
        host_amount: u64,
        charity_amount: u64,
        prize_amount: u64,
        total_players: u32,
        timestamp: i64,
    },
    RoomCleaned {
        room_id: RoomId,
        reclaimed: u64,
        timestamp: i64,
    },
}

impl LedgerEvent {
    /// The settlement amounts carried by a `RoomEnded` event, if this is one.
    pub fn settlement_amounts(&self) -> Option<SettlementAmounts> {
        match self {
            LedgerEvent::RoomEnded {
                platform_amount,
                host_amount,
                charity_amount,
                prize_amount,
                ..
            } => Some(SettlementAmounts {
                platform: *platform_amount,
                host: *host_amount,
                prize_pool: *prize_amount,
                charity: *charity_amount,
            }),
            _ => None,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        match self {
            LedgerEvent::RoomCreated { room_id, .. }
            | LedgerEvent::PlayerJoined { room_id, .. }
            | LedgerEvent::PrizeAssetDeposited { room_id, .. }
            | LedgerEvent::WinnersDeclared { room_id, .. }
            | LedgerEvent::RoomEnded { room_id, .. }
            | LedgerEvent::RoomCleaned { room_id, .. } => room_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_ended_exposes_amounts() {
        let event = LedgerEvent::RoomEnded {
            room_id: RoomId::new("r1").unwrap(),
            winners: vec![AccountId::new("w1").unwrap()],
            platform_amount: 200,
            host_amount: 20,
            charity_amount: 480,
            prize_amount: 300,
            total_players: 4,
            timestamp: 1_700_000_000,
        };
        let amounts = event.settlement_amounts().unwrap();
        assert_eq!(amounts.platform, 200);
        assert_eq!(amounts.charity, 480);
        assert_eq!(amounts.prize_pool, 300);
        assert_eq!(event.room_id().as_str(), "r1");
    }

    #[test]
    fn test_other_events_carry_no_amounts() {
        let event = LedgerEvent::WinnersDeclared {
            room_id: RoomId::new("r1").unwrap(),
            winners: vec![],
            timestamp: 0,
        };
        assert!(event.settlement_amounts().is_none());
    }

    #[test]
    fn test_event_json_round_trip() {
        let event = LedgerEvent::PlayerJoined {
            room_id: RoomId::new("r2").unwrap(),
            player: AccountId::new("alice").unwrap(),
            amount_paid: 1_500,
            extras_paid: 500,
            player_count: 3,
            timestamp: 42,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"player_joined\""));
        let back: LedgerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
