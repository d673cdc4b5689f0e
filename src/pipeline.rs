//! Transaction Execution Pipeline
//!
//! build -> simulate -> submit -> confirm, with a fallback confirmation
//! endpoint and a hard wall-clock bound. Simulation failures are translated
//! into the error taxonomy and abort before a real submission is spent. A
//! plan is broadcast at most once; after broadcast only confirmation is
//! retried, and a timeout is reported as failed-unconfirmed rather than
//! failed, since the transfer may still land.

use crate::errors::{ProgramRejection, SettlementError, SettleResult, Stage};
use crate::ledger::{
    ConfirmOutcome, ConfirmedTransaction, Endpoint, LedgerClient, ProgramCall, SimulationOutcome,
    TransactionPlan, TxSignature,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Tunables for the execution pipeline.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Hard bound on the whole confirmation wait.
    pub confirm_timeout: Duration,
    /// Delay between confirmation polls.
    pub confirm_poll_interval: Duration,
    /// Consecutive transport failures tolerated on the fallback endpoint
    /// before confirmation is declared failed.
    pub max_confirm_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(75),
            confirm_poll_interval: Duration::from_millis(1_500),
            max_confirm_failures: 3,
        }
    }
}

/// Executes one transaction plan against an injected ledger client.
pub struct ExecutionPipeline<'a> {
    client: &'a dyn LedgerClient,
    config: PipelineConfig,
}

impl<'a> ExecutionPipeline<'a> {
    pub fn new(client: &'a dyn LedgerClient, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// Run the full build -> simulate -> submit -> confirm sequence.
    pub async fn execute(
        &self,
        calls: Vec<ProgramCall>,
        intent_id: Option<String>,
    ) -> SettleResult<ConfirmedTransaction> {
        let plan = self.build(calls, intent_id).await?;
        self.simulate(&plan).await?;
        let signature = self.submit(&plan).await?;
        self.confirm_with_fallback(&signature).await
    }

    /// Attach the freshness token and assemble the plan.
    async fn build(
        &self,
        calls: Vec<ProgramCall>,
        intent_id: Option<String>,
    ) -> SettleResult<TransactionPlan> {
        if calls.is_empty() {
            return Err(SettlementError::Validation(
                "transaction plan has no calls".to_string(),
            ));
        }
        let freshness = self
            .client
            .freshness_token()
            .await
            .map_err(|e| submission(Stage::Build, e))?;
        Ok(TransactionPlan {
            calls,
            freshness,
            intent_id,
        })
    }

    /// Dry-run against current ledger state. A revert here costs nothing and
    /// aborts the attempt as a preflight failure.
    async fn simulate(&self, plan: &TransactionPlan) -> SettleResult<()> {
        let outcome = self
            .client
            .simulate(plan)
            .await
            .map_err(|e| submission(Stage::Simulate, e))?;
        match outcome {
            SimulationOutcome::Ok { logs } => {
                debug!(calls = plan.calls.len(), log_lines = logs.len(), "simulation ok");
                Ok(())
            }
            SimulationOutcome::Reverted { code, message } => Err(SettlementError::Preflight {
                stage: Stage::Simulate,
                reason: ProgramRejection::new(code, message).to_string(),
            }),
        }
    }

    /// Broadcast exactly once. Nothing is resent automatically after this
    /// point; a user-initiated retry carries a fresh intent id.
    async fn submit(&self, plan: &TransactionPlan) -> SettleResult<TxSignature> {
        let signature = self
            .client
            .submit(plan)
            .await
            .map_err(|e| submission(Stage::Submit, e))?;
        info!(%signature, intent = ?plan.intent_id, "transaction submitted");
        Ok(signature)
    }

    /// Poll the primary endpoint for confirmation, switching to the fallback
    /// on transport errors, until the hard timeout elapses.
    async fn confirm_with_fallback(
        &self,
        signature: &TxSignature,
    ) -> SettleResult<ConfirmedTransaction> {
        let started = Instant::now();
        let deadline = started + self.config.confirm_timeout;
        let mut endpoint = Endpoint::Primary;
        let mut fallback_failures = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(%signature, waited_ms, "confirmation timed out; transaction may still land");
                return Err(SettlementError::Unconfirmed {
                    signature: signature.0.clone(),
                    waited_ms,
                });
            }

            // the deadline must hold even when the endpoint hangs mid-call
            let result =
                match tokio::time::timeout(deadline - now, self.client.confirm(signature, endpoint))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => continue,
                };

            match result {
                Ok(ConfirmOutcome::Confirmed(tx)) => {
                    info!(%signature, slot = tx.slot, "transaction confirmed");
                    return Ok(tx);
                }
                Ok(ConfirmOutcome::Reverted { code, message }) => {
                    return Err(SettlementError::ProgramRejection(ProgramRejection::new(
                        code, message,
                    )));
                }
                Ok(ConfirmOutcome::Pending) => {
                    tokio::time::sleep(self.config.confirm_poll_interval).await;
                }
                Err(e) => match endpoint {
                    Endpoint::Primary => {
                        warn!(%signature, error = %e, "primary confirmation failed, using fallback");
                        endpoint = Endpoint::Fallback;
                    }
                    Endpoint::Fallback => {
                        fallback_failures += 1;
                        if fallback_failures >= self.config.max_confirm_failures {
                            return Err(SettlementError::Submission {
                                stage: Stage::Confirm,
                                reason: format!(
                                    "both endpoints failing, last error: {}",
                                    e
                                ),
                            });
                        }
                        tokio::time::sleep(self.config.confirm_poll_interval).await;
                    }
                },
            }
        }
    }
}

fn submission(stage: Stage, err: SettlementError) -> SettlementError {
    // already-classified errors pass through untouched
    match err {
        SettlementError::Validation(_)
        | SettlementError::ProgramRejection(_)
        | SettlementError::Preflight { .. }
        | SettlementError::Unconfirmed { .. } => err,
        other => SettlementError::Submission {
            stage,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::PlayerEntry;
    use crate::room::Room;
    use crate::types::{AccountId, AssetId, RoomId};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Scripted client: every pipeline stage reads its next response from a
    /// queue.
    struct ScriptedClient {
        simulate: SimulationOutcome,
        submit_count: AtomicU32,
        confirms: Mutex<Vec<SettleResult<ConfirmOutcome>>>,
        hang_confirm: bool,
    }

    impl ScriptedClient {
        fn new(simulate: SimulationOutcome, confirms: Vec<SettleResult<ConfirmOutcome>>) -> Self {
            Self {
                simulate,
                submit_count: AtomicU32::new(0),
                confirms: Mutex::new(confirms),
                hang_confirm: false,
            }
        }

        /// Client whose confirmation endpoint never answers at all.
        fn hanging() -> Self {
            Self {
                hang_confirm: true,
                ..Self::new(SimulationOutcome::Ok { logs: vec![] }, vec![])
            }
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedClient {
        fn family(&self) -> crate::ledger::LedgerFamily {
            crate::ledger::LedgerFamily::TokenAccount
        }
        async fn current_slot(&self) -> SettleResult<u64> {
            Ok(1)
        }
        async fn freshness_token(&self) -> SettleResult<String> {
            Ok("fresh".to_string())
        }
        async fn fetch_room(&self, _id: &RoomId) -> SettleResult<Option<Room>> {
            Ok(None)
        }
        async fn fetch_player_entry(
            &self,
            _room: &RoomId,
            _player: &AccountId,
        ) -> SettleResult<Option<PlayerEntry>> {
            Ok(None)
        }
        async fn prize_slot_deposited(&self, _room: &RoomId, _i: u8) -> SettleResult<bool> {
            Ok(false)
        }
        async fn pooled_balance(
            &self,
            _room: &RoomId,
        ) -> SettleResult<crate::ledger::PooledBalance> {
            Ok(Default::default())
        }
        async fn allowance(&self, _o: &AccountId, _a: &AssetId) -> SettleResult<u64> {
            Ok(0)
        }
        async fn holding_account_exists(
            &self,
            _o: &AccountId,
            _a: &AssetId,
        ) -> SettleResult<bool> {
            Ok(true)
        }
        async fn simulate(&self, _plan: &TransactionPlan) -> SettleResult<SimulationOutcome> {
            Ok(self.simulate.clone())
        }
        async fn submit(&self, _plan: &TransactionPlan) -> SettleResult<TxSignature> {
            self.submit_count.fetch_add(1, Ordering::SeqCst);
            Ok(TxSignature("sig-1".to_string()))
        }
        async fn confirm(
            &self,
            _signature: &TxSignature,
            _endpoint: Endpoint,
        ) -> SettleResult<ConfirmOutcome> {
            if self.hang_confirm {
                std::future::pending::<()>().await;
            }
            let mut confirms = self.confirms.lock().unwrap();
            if confirms.is_empty() {
                Ok(ConfirmOutcome::Pending)
            } else {
                confirms.remove(0)
            }
        }
    }

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            confirm_timeout: Duration::from_millis(200),
            confirm_poll_interval: Duration::from_millis(5),
            max_confirm_failures: 3,
        }
    }

    fn close_call() -> Vec<ProgramCall> {
        vec![ProgramCall::CloseJoining {
            room_id: RoomId::new("r1").unwrap(),
        }]
    }

    fn confirmed() -> ConfirmOutcome {
        ConfirmOutcome::Confirmed(ConfirmedTransaction {
            signature: TxSignature("sig-1".to_string()),
            slot: 7,
            events: vec![],
        })
    }

    #[tokio::test]
    async fn test_happy_path_confirms() {
        let client = ScriptedClient::new(
            SimulationOutcome::Ok { logs: vec![] },
            vec![Ok(ConfirmOutcome::Pending), Ok(confirmed())],
        );
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        let tx = pipeline.execute(close_call(), None).await.unwrap();
        assert_eq!(tx.slot, 7);
        assert_eq!(client.submit_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_simulation_revert_aborts_before_submit() {
        let client = ScriptedClient::new(
            SimulationOutcome::Reverted {
                code: Some(6007),
                message: "0x1777".to_string(),
            },
            vec![],
        );
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        let err = pipeline.execute(close_call(), None).await.unwrap_err();
        match err {
            SettlementError::Preflight { stage, reason } => {
                assert_eq!(stage, Stage::Simulate);
                assert!(reason.contains("host cannot be a winner"));
            }
            other => panic!("expected preflight failure, got {:?}", other),
        }
        // no real submission was spent
        assert_eq!(client.submit_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_error_falls_back() {
        let client = ScriptedClient::new(
            SimulationOutcome::Ok { logs: vec![] },
            vec![
                Err(SettlementError::Submission {
                    stage: Stage::Confirm,
                    reason: "primary down".to_string(),
                }),
                Ok(confirmed()),
            ],
        );
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        assert!(pipeline.execute(close_call(), None).await.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_reports_unconfirmed_not_failed() {
        let client = ScriptedClient::new(SimulationOutcome::Ok { logs: vec![] }, vec![]);
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        let err = pipeline.execute(close_call(), None).await.unwrap_err();
        match err {
            SettlementError::Unconfirmed { signature, .. } => assert_eq!(signature, "sig-1"),
            other => panic!("expected unconfirmed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_confirm_still_hits_hard_timeout() {
        let client = ScriptedClient::hanging();
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        // the outer bound fails the test if the deadline never fires
        let err = tokio::time::timeout(
            Duration::from_secs(1),
            pipeline.execute(close_call(), None),
        )
        .await
        .expect("hard timeout must fire while confirm hangs")
        .unwrap_err();
        assert!(matches!(err, SettlementError::Unconfirmed { .. }));
    }

    #[tokio::test]
    async fn test_confirmed_revert_is_program_rejection() {
        let client = ScriptedClient::new(
            SimulationOutcome::Ok { logs: vec![] },
            vec![Ok(ConfirmOutcome::Reverted {
                code: Some(6001),
                message: "already ended".to_string(),
            })],
        );
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        let err = pipeline.execute(close_call(), None).await.unwrap_err();
        assert!(matches!(err, SettlementError::ProgramRejection(_)));
    }

    #[tokio::test]
    async fn test_empty_plan_rejected_locally() {
        let client = ScriptedClient::new(SimulationOutcome::Ok { logs: vec![] }, vec![]);
        let pipeline = ExecutionPipeline::new(&client, fast_config());
        assert!(matches!(
            pipeline.execute(vec![], None).await.unwrap_err(),
            SettlementError::Validation(_)
        ));
    }
}
