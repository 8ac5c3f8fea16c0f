use alloy::primitives::{Address, U256};
use itertools::Itertools;

use super::RequestId;
use crate::num;

/// Priced estimate for a candidate trade.
///
/// Owned by [`crate::quote::QuoteEngine`] until published to the
/// orchestrator; a quote superseded by a later request id is discarded,
/// never merged.
#[derive(Clone, derive_more::Debug, PartialEq, Eq)]
pub struct Quote {
    request_id: RequestId,
    #[debug("{amount_in}")]
    amount_in: U256,
    #[debug("{amount_out}")]
    amount_out: U256,
    price_impact_bps: u16,
    #[debug("{}", path.iter().join(" -> "))]
    path: Vec<Address>,
}

impl Quote {
    pub(crate) fn new(
        request_id: RequestId,
        amount_in: U256,
        amount_out: U256,
        price_impact_bps: u16,
        path: Vec<Address>,
    ) -> Self {
        Self {
            request_id,
            amount_in,
            amount_out,
            price_impact_bps,
            path,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Input amount the quote was priced for, in base units.
    pub fn amount_in(&self) -> U256 {
        self.amount_in
    }

    /// Expected output amount, in base units.
    pub fn amount_out(&self) -> U256 {
        self.amount_out
    }

    /// Deviation of the execution price from the pool mid-price, in
    /// basis points.
    pub fn price_impact_bps(&self) -> u16 {
        self.price_impact_bps
    }

    /// Token route the quote was priced over, input first.
    pub fn path(&self) -> &[Address] {
        &self.path
    }

    /// Slippage-bounded output floor embedded in the exchange
    /// transaction. Always `<=` [`Self::amount_out`].
    pub fn min_output(&self, slippage_bps: u16) -> U256 {
        num::min_acceptable_output(self.amount_out, slippage_bps)
    }
}
