//! Account Provisioning Preflight
//!
//! Before any value transfer, every destination able to hold the asset must
//! exist and every source must have authorized the move. The shape differs
//! per ledger family: allowance-style ledgers need an approval transaction
//! confirmed up front when the current allowance is short; token-account
//! ledgers need payer-funded holding-account creations batched into the same
//! transaction as the transfer. Probe first, create/approve only on absence:
//! running the preflight twice against provisioned accounts is a no-op.

use crate::errors::{SettlementError, SettleResult, Stage};
use crate::ledger::{LedgerClient, LedgerFamily, ProgramCall};
use crate::pipeline::ExecutionPipeline;
use crate::types::{AccountId, AssetId};
use std::collections::HashSet;
use tracing::{debug, info};

/// A destination that must be able to receive `asset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    pub owner: AccountId,
    pub asset: AssetId,
}

/// A source-side authorization requirement (allowance ledgers only).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    pub owner: AccountId,
    pub asset: AssetId,
    pub amount: u64,
}

/// What a planned transfer needs provisioned.
#[derive(Clone, Debug)]
pub struct TransferRequirement {
    /// Account funding any holding-account creations.
    pub payer: AccountId,
    /// Present when the transfer is drawn from a user-held balance rather
    /// than program-held escrow.
    pub authorization: Option<Authorization>,
    pub recipients: Vec<Recipient>,
}

/// Provisioning work split by how it must be executed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvisioningPlan {
    /// Approvals: executed and confirmed as their own transactions before
    /// the transfer is attempted.
    pub standalone: Vec<ProgramCall>,
    /// Creations: prepended to the transfer's own transaction.
    pub batched: Vec<ProgramCall>,
}

impl ProvisioningPlan {
    pub fn is_noop(&self) -> bool {
        self.standalone.is_empty() && self.batched.is_empty()
    }
}

/// Per-ledger-family check-and-create step.
pub struct AccountPreflight<'a> {
    client: &'a dyn LedgerClient,
}

impl<'a> AccountPreflight<'a> {
    pub fn new(client: &'a dyn LedgerClient) -> Self {
        Self { client }
    }

    /// Probe current ledger state and plan only the missing pieces.
    pub async fn prepare(&self, req: &TransferRequirement) -> SettleResult<ProvisioningPlan> {
        let mut plan = ProvisioningPlan::default();
        match self.client.family() {
            LedgerFamily::Allowance => {
                if let Some(auth) = &req.authorization {
                    let current = self
                        .client
                        .allowance(&auth.owner, &auth.asset)
                        .await
                        .map_err(provisioning_error)?;
                    if current < auth.amount {
                        debug!(
                            owner = %auth.owner,
                            current,
                            required = auth.amount,
                            "allowance short, planning approval"
                        );
                        plan.standalone.push(ProgramCall::Approve {
                            owner: auth.owner.clone(),
                            asset: auth.asset.clone(),
                            amount: auth.amount,
                        });
                    } else {
                        debug!(owner = %auth.owner, current, "allowance already sufficient");
                    }
                }
                // balances in account-and-balance ledgers can always receive
            }
            LedgerFamily::TokenAccount => {
                // the same (owner, asset) may appear more than once, e.g. a
                // host-padded winner roster; one creation covers them all
                let mut probed = HashSet::new();
                for recipient in &req.recipients {
                    if !probed.insert((recipient.owner.clone(), recipient.asset.clone())) {
                        continue;
                    }
                    let exists = self
                        .client
                        .holding_account_exists(&recipient.owner, &recipient.asset)
                        .await
                        .map_err(provisioning_error)?;
                    if !exists {
                        plan.batched.push(ProgramCall::CreateHoldingAccount {
                            owner: recipient.owner.clone(),
                            asset: recipient.asset.clone(),
                            payer: req.payer.clone(),
                        });
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Prepare and execute the standalone part, returning the batched calls
    /// the caller must prepend to its transfer transaction.
    pub async fn ensure(
        &self,
        pipeline: &ExecutionPipeline<'_>,
        req: &TransferRequirement,
    ) -> SettleResult<Vec<ProgramCall>> {
        let plan = self.prepare(req).await?;
        if plan.is_noop() {
            return Ok(Vec::new());
        }
        for call in plan.standalone {
            info!(?call, "executing provisioning transaction");
            pipeline.execute(vec![call], None).await?;
        }
        if !plan.batched.is_empty() {
            info!(
                creations = plan.batched.len(),
                "batching holding-account creations ahead of transfer"
            );
        }
        Ok(plan.batched)
    }
}

fn provisioning_error(err: SettlementError) -> SettlementError {
    match err {
        SettlementError::Validation(_) => err,
        other => SettlementError::Preflight {
            stage: Stage::Provisioning,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettleResult;
    use crate::ledger::{
        ConfirmOutcome, Endpoint, PooledBalance, SimulationOutcome, TransactionPlan, TxSignature,
    };
    use crate::room::{PlayerEntry, Room};
    use crate::types::RoomId;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};

    struct ProbeClient {
        family: LedgerFamily,
        allowances: HashMap<String, u64>,
        existing: HashSet<(String, String)>,
    }

    #[async_trait]
    impl LedgerClient for ProbeClient {
        fn family(&self) -> LedgerFamily {
            self.family
        }
        async fn current_slot(&self) -> SettleResult<u64> {
            Ok(0)
        }
        async fn freshness_token(&self) -> SettleResult<String> {
            Ok("f".into())
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
        async fn pooled_balance(&self, _room: &RoomId) -> SettleResult<PooledBalance> {
            Ok(Default::default())
        }
        async fn allowance(&self, owner: &AccountId, _asset: &AssetId) -> SettleResult<u64> {
            Ok(*self.allowances.get(owner.as_str()).unwrap_or(&0))
        }
        async fn holding_account_exists(
            &self,
            owner: &AccountId,
            asset: &AssetId,
        ) -> SettleResult<bool> {
            Ok(self
                .existing
                .contains(&(owner.as_str().to_string(), asset.as_str().to_string())))
        }
        async fn simulate(&self, _plan: &TransactionPlan) -> SettleResult<SimulationOutcome> {
            Ok(SimulationOutcome::Ok { logs: vec![] })
        }
        async fn submit(&self, _plan: &TransactionPlan) -> SettleResult<TxSignature> {
            Ok(TxSignature("s".into()))
        }
        async fn confirm(
            &self,
            _signature: &TxSignature,
            _endpoint: Endpoint,
        ) -> SettleResult<ConfirmOutcome> {
            Ok(ConfirmOutcome::Pending)
        }
    }

    fn account(id: &str) -> AccountId {
        AccountId::new(id).unwrap()
    }

    fn asset(id: &str) -> AssetId {
        AssetId::new(id).unwrap()
    }

    fn requirement(authorization: Option<Authorization>, recipients: Vec<Recipient>) -> TransferRequirement {
        TransferRequirement {
            payer: account("payer"),
            authorization,
            recipients,
        }
    }

    #[tokio::test]
    async fn test_sufficient_allowance_builds_no_approval() {
        // Scenario D: allowance already >= required
        let client = ProbeClient {
            family: LedgerFamily::Allowance,
            allowances: HashMap::from([("alice".to_string(), 5_000)]),
            existing: HashSet::new(),
        };
        let preflight = AccountPreflight::new(&client);
        let plan = preflight
            .prepare(&requirement(
                Some(Authorization {
                    owner: account("alice"),
                    asset: asset("USDC"),
                    amount: 1_000,
                }),
                vec![],
            ))
            .await
            .unwrap();
        assert!(plan.is_noop());
    }

    #[tokio::test]
    async fn test_short_allowance_plans_standalone_approval() {
        let client = ProbeClient {
            family: LedgerFamily::Allowance,
            allowances: HashMap::from([("alice".to_string(), 100)]),
            existing: HashSet::new(),
        };
        let preflight = AccountPreflight::new(&client);
        let plan = preflight
            .prepare(&requirement(
                Some(Authorization {
                    owner: account("alice"),
                    asset: asset("USDC"),
                    amount: 1_000,
                }),
                vec![],
            ))
            .await
            .unwrap();
        assert_eq!(plan.standalone.len(), 1);
        assert!(plan.batched.is_empty());
        assert!(matches!(
            plan.standalone[0],
            ProgramCall::Approve { amount: 1_000, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_holding_accounts_are_batched() {
        let client = ProbeClient {
            family: LedgerFamily::TokenAccount,
            allowances: HashMap::new(),
            existing: HashSet::from([("bob".to_string(), "USDC".to_string())]),
        };
        let preflight = AccountPreflight::new(&client);
        let plan = preflight
            .prepare(&requirement(
                None,
                vec![
                    Recipient {
                        owner: account("bob"),
                        asset: asset("USDC"),
                    },
                    Recipient {
                        owner: account("carol"),
                        asset: asset("USDC"),
                    },
                ],
            ))
            .await
            .unwrap();
        // bob exists, only carol needs a creation
        assert!(plan.standalone.is_empty());
        assert_eq!(plan.batched.len(), 1);
        assert!(matches!(
            &plan.batched[0],
            ProgramCall::CreateHoldingAccount { owner, .. } if owner.as_str() == "carol"
        ));
    }

    #[tokio::test]
    async fn test_repeated_recipient_gets_one_creation() {
        // a host-padded roster lists the same account once per unclaimed
        // prize; the batch must still create its holding account once
        let client = ProbeClient {
            family: LedgerFamily::TokenAccount,
            allowances: HashMap::new(),
            existing: HashSet::new(),
        };
        let preflight = AccountPreflight::new(&client);
        let plan = preflight
            .prepare(&requirement(
                None,
                vec![
                    Recipient {
                        owner: account("winner"),
                        asset: asset("USDC"),
                    },
                    Recipient {
                        owner: account("host"),
                        asset: asset("USDC"),
                    },
                    Recipient {
                        owner: account("host"),
                        asset: asset("USDC"),
                    },
                    Recipient {
                        owner: account("host"),
                        asset: asset("USDC"),
                    },
                ],
            ))
            .await
            .unwrap();
        assert_eq!(plan.batched.len(), 2);
        let owners: Vec<&str> = plan
            .batched
            .iter()
            .map(|call| match call {
                ProgramCall::CreateHoldingAccount { owner, .. } => owner.as_str(),
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(owners, vec!["winner", "host"]);
    }

    #[tokio::test]
    async fn test_fully_provisioned_is_idempotent_noop() {
        let client = ProbeClient {
            family: LedgerFamily::TokenAccount,
            allowances: HashMap::new(),
            existing: HashSet::from([("bob".to_string(), "USDC".to_string())]),
        };
        let preflight = AccountPreflight::new(&client);
        let req = requirement(
            None,
            vec![Recipient {
                owner: account("bob"),
                asset: asset("USDC"),
            }],
        );
        for _ in 0..2 {
            let plan = preflight.prepare(&req).await.unwrap();
            assert!(plan.is_noop());
        }
    }
}
