//! Settlement Orchestrator
//!
//! Drives the two-phase winner-declaration/distribution protocol plus the
//! room operations feeding it (create, join, prize deposits, close). Every
//! operation receives its ledger client per call, validates locally before
//! any network traffic, executes through the transaction pipeline, and
//! mirrors results back into the room model only from confirmed reads.
//!
//! A per-room in-process lock makes settlement attempts single-flight within
//! this client. Cross-process exclusion is the receiving program's job via
//! the settlement intent id it gets with every distribute transaction.

use crate::charity::{CharityResolver, CharityRouter};
use crate::errors::{SettlementError, SettleResult, Stage};
use crate::events::LedgerEvent;
use crate::fees::SettlementAmounts;
use crate::ledger::{ConfirmedTransaction, LedgerClient, ProgramCall, TxSignature};
use crate::pipeline::{ExecutionPipeline, PipelineConfig};
use crate::preflight::{AccountPreflight, Authorization, Recipient, TransferRequirement};
use crate::room::{PlayerEntry, Room, RoomMode, RoomState};
use crate::types::{AccountId, RoomId, MAX_WINNERS};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Derive a settlement intent id from the room and the submission time.
///
/// Deterministic for a given `(room, timestamp)` pair; every user-initiated
/// retry happens at a later timestamp and therefore carries a new id, which
/// is how the receiving program tells a retry from a duplicate.
pub fn derive_intent_id(room_id: &RoomId, timestamp_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(room_id.as_str().as_bytes());
    hasher.update(timestamp_ms.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Reconcile a declared winner list against the number of funded prize
/// slots in an asset-based room.
///
/// More winners than deposits: truncate to the first `deposited` entries,
/// declaration order being the tie-break. Fewer: pad with the host so
/// unclaimed prizes return to them. Zero deposits: nothing to distribute.
pub fn reconcile_winners(
    declared: &[AccountId],
    deposited: usize,
    host: &AccountId,
) -> SettleResult<Vec<AccountId>> {
    if deposited == 0 {
        return Err(SettlementError::Validation(
            "no prize slots are deposited, nothing to distribute".to_string(),
        ));
    }
    let mut roster: Vec<AccountId> = declared.iter().take(deposited).cloned().collect();
    while roster.len() < deposited {
        roster.push(host.clone());
    }
    Ok(roster)
}

fn validate_winner_list(winners: &[AccountId], host: &AccountId) -> SettleResult<()> {
    if winners.is_empty() || winners.len() > MAX_WINNERS {
        return Err(SettlementError::Validation(format!(
            "winner list must have 1..={} entries, got {}",
            MAX_WINNERS,
            winners.len()
        )));
    }
    for (i, winner) in winners.iter().enumerate() {
        if winner == host {
            return Err(SettlementError::Validation(
                "host cannot be among the winners".to_string(),
            ));
        }
        if winners[..i].contains(winner) {
            return Err(SettlementError::Validation(format!(
                "duplicate winner {}",
                winner
            )));
        }
    }
    Ok(())
}

/// Ephemeral per-attempt settlement record. Lives only for the duration of
/// one distribute attempt; never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SettlementIntent {
    pub room_id: RoomId,
    pub winners: Vec<AccountId>,
    pub intent_id: String,
    pub charity_destination: AccountId,
    pub charity_amount_preview: u64,
}

/// Result of a completed distribution.
#[derive(Clone, Debug)]
pub struct DistributionReport {
    pub intent: SettlementIntent,
    /// Client-side preview computed before submission.
    pub preview: SettlementAmounts,
    /// Amounts parsed from the settlement event. Authoritative for all
    /// user-facing reporting.
    pub actual: SettlementAmounts,
    pub mismatch: bool,
    pub signature: TxSignature,
}

/// Result of a join attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined(PlayerEntry),
    /// The `(room, player)` entry already existed; no transfer was made.
    AlreadyJoined(PlayerEntry),
}

/// In-process single-flight registry: one async mutex per room id.
#[derive(Default)]
struct RoomLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl RoomLocks {
    fn lock_for(&self, room: &RoomId) -> Arc<Mutex<()>> {
        self.inner
            .entry(room.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Orchestrates room lifecycle operations and the two-phase settlement
/// protocol. Ledger clients and the charity router are injected per call.
pub struct SettlementOrchestrator {
    platform_account: AccountId,
    network: String,
    pipeline_config: PipelineConfig,
    locks: RoomLocks,
}

impl SettlementOrchestrator {
    pub fn new(
        platform_account: AccountId,
        network: impl Into<String>,
        pipeline_config: PipelineConfig,
    ) -> Self {
        Self {
            platform_account,
            network: network.into(),
            pipeline_config,
            locks: RoomLocks::default(),
        }
    }

    fn pipeline<'a>(&self, client: &'a dyn LedgerClient) -> ExecutionPipeline<'a> {
        ExecutionPipeline::new(client, self.pipeline_config)
    }

    /// Submit room creation. Pool rooms come back `Ready`; asset rooms wait
    /// in `AwaitingFunding` for their prize deposits.
    pub async fn create_room(
        &self,
        client: &dyn LedgerClient,
        mut room: Room,
    ) -> SettleResult<Room> {
        room.ensure_state(RoomState::Created)?;
        let call = ProgramCall::CreateRoom { room: room.clone() };
        self.pipeline(client).execute(vec![call], None).await?;

        let next = match room.mode {
            RoomMode::PoolSplit { .. } => RoomState::Ready,
            RoomMode::AssetBased { .. } => RoomState::AwaitingFunding,
        };
        room.transition(next)?;
        info!(room = %room.id, state = ?room.state, "room created");
        Ok(room)
    }

    /// Join a room, paying the entry fee plus optional extras. Idempotent:
    /// an existing `(room, player)` entry short-circuits with no transfer.
    pub async fn join_room(
        &self,
        client: &dyn LedgerClient,
        room: &mut Room,
        player: &AccountId,
        extras: u64,
    ) -> SettleResult<JoinOutcome> {
        room.ensure_state(RoomState::Open)?;
        let current_slot = client.current_slot().await?;
        if room.is_expired(current_slot) {
            return Err(SettlementError::Validation(format!(
                "room {} expired at slot {}",
                room.id, room.expiration_slot
            )));
        }

        if let Some(existing) = client.fetch_player_entry(&room.id, player).await? {
            info!(room = %room.id, %player, "player already joined, skipping payment");
            return Ok(JoinOutcome::AlreadyJoined(existing));
        }

        let pipeline = self.pipeline(client);
        let preflight = AccountPreflight::new(client);
        let requirement = TransferRequirement {
            payer: player.clone(),
            authorization: Some(Authorization {
                owner: player.clone(),
                asset: room.fee_asset.clone(),
                amount: room.entry_fee.saturating_add(extras),
            }),
            recipients: Vec::new(),
        };
        let mut calls = preflight.ensure(&pipeline, &requirement).await?;
        calls.push(ProgramCall::JoinRoom {
            room_id: room.id.clone(),
            player: player.clone(),
            extras,
        });

        let confirmed = pipeline.execute(calls, None).await?;
        let (entry_paid, extras_paid, joined_at) = confirmed
            .events
            .iter()
            .find_map(|e| match e {
                LedgerEvent::PlayerJoined {
                    amount_paid,
                    extras_paid,
                    timestamp,
                    ..
                } => Some((
                    amount_paid.saturating_sub(*extras_paid),
                    *extras_paid,
                    (*timestamp).max(0) as u64,
                )),
                _ => None,
            })
            .ok_or_else(|| SettlementError::Submission {
                stage: Stage::ParseEvent,
                reason: "confirmed join carried no PlayerJoined event".to_string(),
            })?;

        room.apply_confirmed_join(entry_paid, extras_paid)?;
        let entry = PlayerEntry {
            room: room.id.clone(),
            player: player.clone(),
            entry_paid,
            extras_paid,
            joined_at,
        };
        Ok(JoinOutcome::Joined(entry))
    }

    /// Deposit one configured prize slot of an asset-based room. The slot is
    /// marked funded only after the transfer confirms and a fresh ledger
    /// read shows it deposited.
    pub async fn deposit_prize(
        &self,
        client: &dyn LedgerClient,
        room: &mut Room,
        slot_index: u8,
    ) -> SettleResult<()> {
        let slot = room
            .escrow()
            .ok_or_else(|| {
                SettlementError::Validation(format!(
                    "room {} is pool-split and takes no prize deposits",
                    room.id
                ))
            })?
            .slot(slot_index)
            .cloned()
            .ok_or_else(|| {
                SettlementError::Validation(format!(
                    "prize slot {} is not configured for room {}",
                    slot_index, room.id
                ))
            })?;
        if slot.deposited {
            return Err(SettlementError::Validation(format!(
                "prize slot {} is already deposited",
                slot_index
            )));
        }
        if !matches!(
            room.state,
            RoomState::AwaitingFunding | RoomState::PartiallyFunded
        ) {
            return Err(SettlementError::Validation(format!(
                "room {} is {:?}, deposits only allowed while funding",
                room.id, room.state
            )));
        }

        let pipeline = self.pipeline(client);
        let preflight = AccountPreflight::new(client);
        let requirement = TransferRequirement {
            payer: room.host.clone(),
            authorization: Some(Authorization {
                owner: room.host.clone(),
                asset: slot.asset.clone(),
                amount: slot.amount,
            }),
            recipients: Vec::new(),
        };
        let mut calls = preflight.ensure(&pipeline, &requirement).await?;
        calls.push(ProgramCall::DepositPrizeAsset {
            room_id: room.id.clone(),
            slot_index,
            asset: slot.asset.clone(),
            amount: slot.amount,
        });
        pipeline.execute(calls, None).await?;

        // never assert the flag without a verified on-ledger read
        let deposited = client.prize_slot_deposited(&room.id, slot_index).await?;
        if !deposited {
            return Err(SettlementError::Submission {
                stage: Stage::Confirm,
                reason: format!(
                    "deposit for slot {} confirmed but ledger does not show it funded",
                    slot_index
                ),
            });
        }
        room.apply_confirmed_deposit(slot_index)?;
        info!(
            room = %room.id,
            slot = slot_index,
            state = ?room.state,
            "prize deposit confirmed"
        );
        Ok(())
    }

    /// Open a `Ready` room for joining.
    pub async fn open_room(&self, _client: &dyn LedgerClient, room: &mut Room) -> SettleResult<()> {
        room.ensure_state(RoomState::Ready)?;
        room.transition(RoomState::Open)
    }

    /// Close joining, host-triggered or by anyone once the room is expired.
    pub async fn close_joining(
        &self,
        client: &dyn LedgerClient,
        room: &mut Room,
        caller: &AccountId,
    ) -> SettleResult<()> {
        room.ensure_state(RoomState::Open)?;
        self.ensure_host_or_expired(client, room, caller).await?;
        let call = ProgramCall::CloseJoining {
            room_id: room.id.clone(),
        };
        self.pipeline(client).execute(vec![call], None).await?;
        room.transition(RoomState::JoiningClosed)
    }

    /// Phase 1: declare winners. For asset rooms the candidate list is
    /// reconciled against the funded slot count before submission. The
    /// roster held by the program after this call is the authority for
    /// distribution.
    pub async fn declare_winners(
        &self,
        client: &dyn LedgerClient,
        room: &mut Room,
        caller: &AccountId,
        winners: Vec<AccountId>,
    ) -> SettleResult<Vec<AccountId>> {
        let lock = self.locks.lock_for(&room.id);
        let _guard = lock.lock().await;

        room.ensure_state(RoomState::JoiningClosed)?;
        self.ensure_host_or_expired(client, room, caller).await?;
        validate_winner_list(&winners, &room.host)?;

        let roster = match &room.mode {
            RoomMode::AssetBased { escrow } => {
                let roster = reconcile_winners(&winners, escrow.deposited_count(), &room.host)?;
                if roster.len() != winners.len() {
                    info!(
                        room = %room.id,
                        declared = winners.len(),
                        roster = roster.len(),
                        "winner list reconciled to funded slot count"
                    );
                }
                roster
            }
            RoomMode::PoolSplit { .. } => winners,
        };

        let call = ProgramCall::DeclareWinners {
            room_id: room.id.clone(),
            winners: roster.clone(),
        };
        self.pipeline(client).execute(vec![call], None).await?;

        // mirror the roster the program now holds, not our local copy
        let ledger_roster = match client.fetch_room(&room.id).await? {
            Some(ledger_room) if !ledger_room.winners.is_empty() => ledger_room.winners,
            _ => roster,
        };
        room.winners = ledger_roster.clone();
        room.transition(RoomState::WinnersDeclared)?;
        info!(room = %room.id, winners = ledger_roster.len(), "winners declared");
        Ok(ledger_roster)
    }

    /// Phase 2: distribute collected value. Resolves the charity
    /// destination, provisions every recipient, submits with a fresh intent
    /// id, and reconciles the client preview against the settlement event.
    pub async fn distribute(
        &self,
        client: &dyn LedgerClient,
        router: &dyn CharityRouter,
        room: &mut Room,
        caller: &AccountId,
        organization_id: Option<&str>,
        charity_override: Option<AccountId>,
    ) -> SettleResult<DistributionReport> {
        let lock = self.locks.lock_for(&room.id);
        let _guard = lock.lock().await;

        room.ensure_state(RoomState::WinnersDeclared)?;
        self.ensure_host_or_expired(client, room, caller).await?;

        // the program's roster is authoritative; re-derive recipients from it
        let winners = match client.fetch_room(&room.id).await? {
            Some(ledger_room) if !ledger_room.winners.is_empty() => ledger_room.winners,
            _ => {
                return Err(SettlementError::Validation(format!(
                    "room {} has no declared winners on the ledger",
                    room.id
                )))
            }
        };

        let pooled = client.pooled_balance(&room.id).await?;
        let preview = room.fee_split()?.apply(pooled.entry_fees, pooled.extras)?;

        let charity_destination = match charity_override {
            Some(address) => address,
            None => {
                CharityResolver::new(router, self.network.clone())
                    .resolve(
                        organization_id,
                        room.charity_fallback.as_ref(),
                        &room.fee_asset,
                        preview.charity,
                        &room.charity_memo,
                    )
                    .await?
            }
        };

        let mut recipients = vec![
            Recipient {
                owner: self.platform_account.clone(),
                asset: room.fee_asset.clone(),
            },
            Recipient {
                owner: room.host.clone(),
                asset: room.fee_asset.clone(),
            },
            Recipient {
                owner: charity_destination.clone(),
                asset: room.fee_asset.clone(),
            },
        ];
        for winner in &winners {
            recipients.push(Recipient {
                owner: winner.clone(),
                asset: room.fee_asset.clone(),
            });
        }
        if let RoomMode::AssetBased { escrow } = &room.mode {
            // each prize asset needs a holding account at its winner
            for (winner, slot) in winners.iter().zip(escrow.slots()) {
                if slot.deposited {
                    recipients.push(Recipient {
                        owner: winner.clone(),
                        asset: slot.asset.clone(),
                    });
                }
            }
        }

        let pipeline = self.pipeline(client);
        let preflight = AccountPreflight::new(client);
        let requirement = TransferRequirement {
            payer: caller.clone(),
            // funds move from program-held escrow, no source approval needed
            authorization: None,
            recipients,
        };
        let mut calls = preflight.ensure(&pipeline, &requirement).await?;

        let intent_id = derive_intent_id(&room.id, chrono::Utc::now().timestamp_millis());
        let intent = SettlementIntent {
            room_id: room.id.clone(),
            winners: winners.clone(),
            intent_id: intent_id.clone(),
            charity_destination: charity_destination.clone(),
            charity_amount_preview: preview.charity,
        };
        calls.push(ProgramCall::Distribute {
            room_id: room.id.clone(),
            charity_destination,
            intent_id: intent_id.clone(),
        });

        let confirmed = pipeline.execute(calls, Some(intent_id)).await?;
        let actual = Self::settlement_amounts(&confirmed)?;

        let mismatch = actual != preview;
        if mismatch {
            warn!(
                room = %room.id,
                ?preview,
                ?actual,
                "preview disagrees with settlement event; event amounts are authoritative"
            );
        }

        room.transition(RoomState::Ended)?;
        info!(
            room = %room.id,
            charity = actual.charity,
            platform = actual.platform,
            host = actual.host,
            prizes = actual.prize_pool,
            "room settled"
        );
        Ok(DistributionReport {
            intent,
            preview,
            actual,
            mismatch,
            signature: confirmed.signature,
        })
    }

    /// Reclaim residual escrow rent/storage from an ended room. Optional.
    pub async fn cleanup(
        &self,
        client: &dyn LedgerClient,
        room: &mut Room,
        caller: &AccountId,
    ) -> SettleResult<()> {
        room.ensure_state(RoomState::Ended)?;
        if caller != &room.host {
            return Err(SettlementError::Validation(
                "only the host may clean up a room".to_string(),
            ));
        }
        let call = ProgramCall::CleanupRoom {
            room_id: room.id.clone(),
        };
        self.pipeline(client).execute(vec![call], None).await?;
        room.transition(RoomState::Cleaned)
    }

    async fn ensure_host_or_expired(
        &self,
        client: &dyn LedgerClient,
        room: &Room,
        caller: &AccountId,
    ) -> SettleResult<()> {
        if caller == &room.host {
            return Ok(());
        }
        let current_slot = client.current_slot().await?;
        if room.is_expired(current_slot) {
            return Ok(());
        }
        Err(SettlementError::Validation(format!(
            "caller {} is not the host of room {} and the room is not expired",
            caller, room.id
        )))
    }

    fn settlement_amounts(confirmed: &ConfirmedTransaction) -> SettleResult<SettlementAmounts> {
        confirmed
            .events
            .iter()
            .find_map(LedgerEvent::settlement_amounts)
            .ok_or_else(|| SettlementError::Submission {
                stage: Stage::ParseEvent,
                reason: "confirmed distribution carried no RoomEnded event".to_string(),
            })
    }
}
