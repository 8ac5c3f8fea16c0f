use alloy::{
    primitives::Bytes,
    sol_types::{Revert, SolError},
    transports::{RpcError, TransportErrorKind},
};

use crate::types::SwapPhase;

/// EIP-1193 code for a signing request declined by the user.
const CODE_USER_REJECTED: i64 = 4001;

/// JSON-RPC code nodes use for call/transaction reverts carrying data.
const CODE_EXECUTION_REVERTED: i64 = 3;

/// Failure of a swap operation, classified into the closed taxonomy the
/// presentation layer acts on.
///
/// [`SwapError::NetworkUnavailable`] and [`SwapError::Timeout`] are
/// transient and retried internally before surfacing (see
/// [`crate::retry`]); everything else is terminal for the current
/// request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    #[error("signing rejected by the user")]
    UserRejected,

    #[error("insufficient funds for the trade")]
    InsufficientFunds,

    #[error("spender not authorized for the requested amount")]
    InsufficientAllowance,

    #[error("execution price moved beyond the slippage bound")]
    SlippageExceeded,

    #[error("transaction reverted: {0:?}")]
    Reverted(Option<String>),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("timed out waiting for the network")]
    Timeout,

    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),

    #[error("no liquidity path between the requested tokens")]
    NoLiquidityPath,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid phase transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SwapPhase, to: SwapPhase },

    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl SwapError {
    /// Transient failures are worth retrying; all other variants reflect
    /// a decision or chain state that retrying cannot change.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkUnavailable(_) | Self::Timeout)
    }
}

/// Raw failure produced by a collaborator call, before classification.
///
/// [`crate::session::WalletSession`] and [`crate::session::ChainReader`]
/// implementations reduce whatever their transport throws to this shape;
/// [`classify`] maps it into the [`SwapError`] taxonomy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawFailure {
    /// JSON-RPC error response, with revert data when the node provides it.
    Rpc {
        code: i64,
        message: String,
        data: Option<Bytes>,
    },

    /// Transport-level breakdown (connection refused, DNS, malformed body).
    Transport(String),

    /// The collaborator did not answer within its deadline.
    Timeout,

    /// The signer declined to sign.
    SigningDeclined,
}

impl RawFailure {
    /// Raw revert response carrying an ABI-encoded `Error(string)` reason.
    pub fn revert(reason: &str) -> Self {
        let revert = Revert::from(reason);
        Self::Rpc {
            code: CODE_EXECUTION_REVERTED,
            message: "execution reverted".to_string(),
            data: Some(revert.abi_encode().into()),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for RawFailure {
    fn from(value: RpcError<TransportErrorKind>) -> Self {
        match value {
            RpcError::ErrorResp(ref resp) => Self::Rpc {
                code: resp.code,
                message: resp.message.to_string(),
                data: resp.as_revert_data(),
            },
            RpcError::NullResp => Self::Transport("unexpected empty RPC response".to_string()),
            _ => Self::Transport(value.to_string()),
        }
    }
}

/// Maps a raw collaborator failure into the [`SwapError`] taxonomy.
///
/// Pure function: no I/O, no retries. Retry policy lives in the caller.
pub fn classify(raw: &RawFailure) -> SwapError {
    match raw {
        RawFailure::SigningDeclined => SwapError::UserRejected,
        RawFailure::Timeout => SwapError::Timeout,
        RawFailure::Transport(message) => SwapError::NetworkUnavailable(message.clone()),
        RawFailure::Rpc {
            code,
            message,
            data,
        } => {
            let msg = message.to_ascii_lowercase();
            if *code == CODE_USER_REJECTED
                || msg.contains("user rejected")
                || msg.contains("user denied")
            {
                SwapError::UserRejected
            } else if msg.contains("insufficient funds") || msg.contains("insufficient balance") {
                SwapError::InsufficientFunds
            } else if *code == CODE_EXECUTION_REVERTED || msg.contains("revert") {
                match data.as_ref().and_then(|d| Revert::abi_decode(d).ok()) {
                    Some(revert) => classify_revert(revert.reason),
                    None => SwapError::Reverted(None),
                }
            } else if (-32099..=-32000).contains(code)
                || msg.contains("timeout")
                || msg.contains("timed out")
            {
                SwapError::NetworkUnavailable(message.clone())
            } else {
                SwapError::Unknown(message.clone())
            }
        }
    }
}

/// Classifies a decoded revert reason string.
///
/// Reason strings follow router/token conventions; anything unrecognized
/// stays a generic revert with the reason preserved for display.
fn classify_revert(reason: String) -> SwapError {
    let upper = reason.to_ascii_uppercase();
    if upper.contains("INSUFFICIENT_OUTPUT_AMOUNT") || upper.contains("TOO LITTLE RECEIVED") {
        SwapError::SlippageExceeded
    } else if upper.contains("TRANSFER_FROM_FAILED") || upper.contains("ALLOWANCE") {
        SwapError::InsufficientAllowance
    } else if upper.contains("INSUFFICIENT_LIQUIDITY") || upper.contains("INVALID_PATH") {
        SwapError::NoLiquidityPath
    } else {
        SwapError::Reverted(Some(reason))
    }
}
