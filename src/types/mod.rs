mod quote;
mod request;

pub use quote::Quote;
pub use request::{
    ConfirmationStatus, SwapPhase, SwapSnapshot, TradeParams, TransactionRecord, TxKind,
};

use alloy::primitives::Address;

/// ID of a quote request. Strictly increasing per engine; the defense
/// against out-of-order network replies.
pub type RequestId = u64;

/// A fungible token on a specific network.
///
/// Immutable once constructed; amounts for the token are always integer
/// base units scaled by [`Token::decimals`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    chain_id: u64,
    address: Address,
    symbol: String,
    decimals: u8,
}

impl Token {
    pub fn new(chain_id: u64, address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            chain_id,
            address,
            symbol: symbol.into(),
            decimals,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}
