//! Error taxonomy for settlement orchestration
//!
//! Every failure surfaced by this crate is one of a fixed set of categories
//! so callers can decide between "fix input and retry", "retry confirmation",
//! and "give up and re-read ledger state". Lower layers never swallow errors;
//! each variant carries the stage it was raised from where that matters for
//! resuming.

use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type SettleResult<T> = Result<T, SettlementError>;

/// Stage of the settlement pipeline an error was raised from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Build,
    Provisioning,
    Simulate,
    Submit,
    Confirm,
    CharityResolve,
    ParseEvent,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Build => "build",
            Stage::Provisioning => "provisioning",
            Stage::Simulate => "simulate",
            Stage::Submit => "submit",
            Stage::Confirm => "confirm",
            Stage::CharityResolve => "charity-resolve",
            Stage::ParseEvent => "parse-event",
        };
        f.write_str(name)
    }
}

/// Root error type for all settlement operations.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Local, pre-network failure: bad parameters or an illegal room state
    /// transition. Never sent over the network, always recoverable by fixing
    /// the input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Simulation or account-provisioning failed before anything was
    /// broadcast. Recoverable by fixing the underlying condition and
    /// retrying from the top.
    #[error("preflight failed at {stage}: {reason}")]
    Preflight { stage: Stage, reason: String },

    /// Network/RPC failure before confirmation. Bounded retries against the
    /// fallback confirmation endpoint apply before this is surfaced.
    #[error("submission failed at {stage}: {reason}")]
    Submission { stage: Stage, reason: String },

    /// A transaction was broadcast but could not be confirmed within the
    /// configured timeout. Not necessarily reverted: the caller must re-read
    /// authoritative ledger state before assuming failure.
    #[error(
        "transaction {signature} still unconfirmed after {waited_ms}ms; \
         re-query ledger state before retrying"
    )]
    Unconfirmed { signature: String, waited_ms: u64 },

    /// The ledger program rejected the transaction. Fatal for this attempt;
    /// the raw code is mapped to a human-readable reason where known.
    #[error("program rejected transaction: {0}")]
    ProgramRejection(ProgramRejection),

    /// Neither the charity routing collaborator nor a fallback address could
    /// produce a destination. The distribute phase aborts rather than
    /// skipping the charity leg.
    #[error("charity destination could not be resolved: {0}")]
    CharityResolution(String),

    /// Configuration load/validation failure.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SettlementError {
    /// Whether the caller may retry the whole operation without a fresh user
    /// decision (validation and program rejections require one).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::Preflight { .. } | SettlementError::Submission { .. }
        )
    }
}

/// On-ledger rejection with the program's raw code and a readable mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramRejection {
    pub code: Option<u32>,
    pub message: String,
}

impl ProgramRejection {
    pub fn new(code: Option<u32>, raw_message: impl Into<String>) -> Self {
        let raw = raw_message.into();
        let message = match code.and_then(known_program_error) {
            Some(known) => format!("{} ({})", known, raw),
            None => raw,
        };
        Self { code, message }
    }
}

impl fmt::Display for ProgramRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "code {}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Human-readable mapping for the program error codes this client knows.
///
/// The code space is owned by the on-chain program; unknown codes are passed
/// through verbatim.
fn known_program_error(code: u32) -> Option<&'static str> {
    let message = match code {
        6000 => "unauthorized caller",
        6001 => "room already ended",
        6002 => "invalid room status for this operation",
        6003 => "joining is closed",
        6004 => "maximum players reached",
        6005 => "player already joined",
        6006 => "invalid winner list",
        6007 => "host cannot be a winner",
        6008 => "winner did not join the room",
        6009 => "winners already declared",
        6010 => "prize already deposited",
        6011 => "room expired",
        6012 => "escrow vault not empty",
        6013 => "duplicate settlement intent",
        _ => return None,
    };
    Some(message)
}
