//! Fundroom - Prize Settlement Orchestration for Fundraising Rooms
//!
//! Client-side layer that drives externally-deployed room programs: fee
//! splitting, prize-escrow bookkeeping, account provisioning preflight, a
//! simulate-first transaction pipeline with fallback confirmation, charity
//! destination routing, and the two-phase declare-winners/distribute
//! settlement protocol. Funds always move ledger-side; this crate
//! orchestrates, mirrors confirmed state, and reconciles previews against
//! the settlement events the programs emit.

pub mod charity;
pub mod config;
pub mod errors;
pub mod escrow;
pub mod events;
pub mod fees;
pub mod ledger;
pub mod pipeline;
pub mod preflight;
pub mod room;
pub mod settlement;
pub mod types;

pub use charity::{CharityResolver, CharityRouter, HttpCharityRouter};
pub use config::FundroomConfig;
pub use errors::{SettlementError, SettleResult};
pub use fees::{FeeSplit, SettlementAmounts};
pub use ledger::{LedgerClient, LedgerFamily};
pub use pipeline::{ExecutionPipeline, PipelineConfig};
pub use room::{Room, RoomMode, RoomParams, RoomState};
pub use settlement::{DistributionReport, JoinOutcome, SettlementOrchestrator};
pub use types::{AccountId, AssetId, RoomId};

/// Install the process-wide tracing subscriber. `RUST_LOG` controls the
/// filter; defaults to `info` for this crate.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fundroom=info,warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
