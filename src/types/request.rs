use alloy::primitives::{TxHash, U256};

use super::{Quote, Token};
use crate::error::SwapError;

/// Phase of a swap request.
///
/// Transitions are monotonic within one request: the phase never
/// revisits an earlier state except through an explicit reset (parameter
/// change, cancellation, or an account/network change). The transition
/// predicate is exhaustive; anything it rejects is reported as
/// [`SwapError::InvalidTransition`], never silently ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwapPhase {
    #[default]
    Idle,
    Quoting,
    NeedsApproval,
    ReadyToSwap,
    Approving,
    Swapping,
    Confirmed,
    Failed,
}

impl SwapPhase {
    /// Whether `self -> next` is a legal forward transition.
    ///
    /// Resets (to [`SwapPhase::Idle`]) are not transitions and go
    /// through the orchestrator's reset path instead.
    pub fn can_transition(self, next: SwapPhase) -> bool {
        use SwapPhase::*;
        matches!(
            (self, next),
            (Idle, Quoting)
                | (Quoting, NeedsApproval)
                | (Quoting, ReadyToSwap)
                | (Quoting, Failed)
                | (NeedsApproval, Approving)
                | (Approving, ReadyToSwap)
                | (Approving, NeedsApproval)
                | (Approving, Failed)
                | (ReadyToSwap, Swapping)
                | (ReadyToSwap, NeedsApproval)
                | (ReadyToSwap, Failed)
                | (Swapping, Confirmed)
                | (Swapping, Failed)
        )
    }

    /// Phases with no further forward transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, SwapPhase::Confirmed | SwapPhase::Failed)
    }

    /// Phases in which cancellation aborts cleanly, with nothing
    /// submitted on chain yet.
    pub fn is_cleanly_cancellable(self) -> bool {
        matches!(
            self,
            SwapPhase::Idle | SwapPhase::Quoting | SwapPhase::NeedsApproval
        )
    }
}

/// Kind of transaction submitted by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxKind {
    Authorize,
    Exchange,
}

/// Confirmation state of a submitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Reverted,
}

/// A transaction the orchestrator submitted and tracks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: TxHash,
    pub kind: TxKind,
    /// Unix seconds at submission.
    pub submitted_at: u64,
    pub status: ConfirmationStatus,
}

/// Caller-controlled trade parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TradeParams {
    pub token_in: Token,
    pub token_out: Token,
    /// Input amount in base units of `token_in`. Always non-zero.
    pub amount_in: U256,
    /// Tolerated deviation between quoted and executed output, in basis
    /// points. Always within `[0, 10000]`.
    pub slippage_bps: u16,
}

/// Read-only view of the current swap request, published to the
/// presentation layer on every state change.
///
/// Display formatting of the integer base-unit amounts is the
/// presentation layer's job (see [`crate::num::Converter`]).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapSnapshot {
    pub phase: SwapPhase,
    pub params: Option<TradeParams>,
    pub quote: Option<Quote>,
    pub error: Option<SwapError>,
    pub authorization: Option<TransactionRecord>,
    pub exchange: Option<TransactionRecord>,
    /// Unix-seconds deadline embedded in the exchange transaction, once
    /// one has been submitted.
    pub deadline: Option<u64>,
}
