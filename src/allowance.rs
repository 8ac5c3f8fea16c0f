//! Spending-authorization tracking.
//!
//! [`AllowanceMonitor`] answers "may this spender move this amount of
//! this token for this owner" with a fresh on-chain read, and keeps the
//! last observed [`AllowanceRecord`] per (owner, spender, token). The
//! record cache is the one resource shared across orchestrator
//! instances: the monitor is its single writer, everything else reads,
//! and [`AllowanceMonitor::invalidate`] is authoritative over any
//! cached value.

use std::sync::Arc;

use alloy::{
    primitives::{Address, U256},
    sol_types::SolCall,
};
use dashmap::DashMap;

use crate::{
    abi::erc20::Erc20,
    error::{SwapError, classify},
    retry::{self, Backoff},
    session::ChainReader,
    types::{RequestId, Token},
};

/// Authorization observed on chain for (owner, spender, token).
///
/// Valid only within the swap request it was observed for; it must be
/// re-verified before an exchange transaction is submitted, since
/// approval state can change between phases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AllowanceRecord {
    pub owner: Address,
    pub spender: Address,
    pub token: Address,
    pub authorized: U256,
    /// Quote request the observation belongs to.
    pub as_of_request_id: RequestId,
}

pub struct AllowanceMonitor<R> {
    reader: Arc<R>,
    backoff: Backoff,
    records: DashMap<(Address, Address, Address), AllowanceRecord>,
}

impl<R: ChainReader> AllowanceMonitor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_backoff(reader, Backoff::default())
    }

    pub fn with_backoff(reader: Arc<R>, backoff: Backoff) -> Self {
        Self {
            reader,
            backoff,
            records: DashMap::new(),
        }
    }

    /// Fresh authorization read: true when `spender` may move at least
    /// `amount` of `token` on behalf of `owner`.
    ///
    /// Updates the shared record. Transient read failures are retried
    /// before surfacing.
    pub async fn check(
        &self,
        owner: Address,
        spender: Address,
        token: &Token,
        amount: U256,
        as_of_request_id: RequestId,
    ) -> Result<bool, SwapError> {
        let input = Erc20::allowanceCall { owner, spender }.abi_encode();
        let output = retry::with_backoff(self.backoff, || {
            let input = input.clone();
            async move {
                self.reader
                    .call(token.address(), input.into())
                    .await
                    .map_err(|raw| classify(&raw))
            }
        })
        .await?;
        let authorized = Erc20::allowanceCall::abi_decode_returns(&output)
            .map_err(|e| SwapError::Unknown(format!("allowance response: {e}")))?;

        tracing::debug!(
            %owner, %spender, token = %token.address(),
            %authorized, required = %amount,
            "allowance checked"
        );
        self.records.insert(
            (owner, spender, token.address()),
            AllowanceRecord {
                owner,
                spender,
                token: token.address(),
                authorized,
                as_of_request_id,
            },
        );
        Ok(authorized >= amount)
    }

    /// Last observed record, if any. Never a substitute for a fresh
    /// [`Self::check`] at a phase boundary.
    pub fn cached(
        &self,
        owner: Address,
        spender: Address,
        token: Address,
    ) -> Option<AllowanceRecord> {
        self.records
            .get(&(owner, spender, token))
            .map(|r| r.clone())
    }

    /// Drops every cached record. Must be called whenever the active
    /// account or network changes.
    pub fn invalidate(&self) {
        self.records.clear();
        tracing::debug!("allowance records invalidated");
    }
}

#[cfg(test)]
mod tests {
    use alloy::sol_types::SolValue;

    use super::*;
    use crate::testing::MockReader;

    fn token(addr: Address) -> Token {
        Token::new(1, addr, "TKA", 6)
    }

    #[tokio::test]
    async fn test_check_reads_fresh_and_caches() {
        let owner = Address::repeat_byte(0x11);
        let spender = Address::repeat_byte(0x22);
        let tok = Address::repeat_byte(0x33);

        let reader = Arc::new(MockReader::new());
        reader.script_call(
            tok,
            Erc20::allowanceCall::SELECTOR,
            Ok((U256::from(500u64),).abi_encode_params()),
        );

        let monitor = AllowanceMonitor::new(reader);
        assert!(
            monitor
                .check(owner, spender, &token(tok), U256::from(400u64), 7)
                .await
                .unwrap()
        );
        assert!(
            !monitor
                .check(owner, spender, &token(tok), U256::from(501u64), 8)
                .await
                .unwrap()
        );

        let record = monitor.cached(owner, spender, tok).unwrap();
        assert_eq!(record.authorized, U256::from(500u64));
        assert_eq!(record.as_of_request_id, 8);
    }

    #[tokio::test]
    async fn test_invalidate_drops_records() {
        let owner = Address::repeat_byte(0x11);
        let spender = Address::repeat_byte(0x22);
        let tok = Address::repeat_byte(0x33);

        let reader = Arc::new(MockReader::new());
        reader.script_call(
            tok,
            Erc20::allowanceCall::SELECTOR,
            Ok((U256::from(1u64),).abi_encode_params()),
        );

        let monitor = AllowanceMonitor::new(reader);
        monitor
            .check(owner, spender, &token(tok), U256::from(1u64), 1)
            .await
            .unwrap();
        assert!(monitor.cached(owner, spender, tok).is_some());

        monitor.invalidate();
        assert!(monitor.cached(owner, spender, tok).is_none());
    }
}
