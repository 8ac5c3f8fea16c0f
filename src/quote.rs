//! Quote computation with debouncing and staleness rejection.
//!
//! Every [`QuoteEngine::request_quote`] call gets a strictly increasing
//! request id. A call whose id has been superseded by a newer one when
//! its debounce window elapses, or by the time its pricing responses
//! arrive, resolves to `Ok(None)` and leaves no trace. This id
//! comparison is the sole defense against out-of-order network replies.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use tracing::debug;

use crate::{
    Chain,
    abi::amm::{Factory, Pair, Router},
    error::{SwapError, classify},
    num,
    retry::{self, Backoff},
    session::ChainReader,
    types::{Quote, RequestId, Token},
};

/// Pause after the last parameter change before pricing goes out.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Bound on a single pricing read.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timing and retry knobs for the engine.
#[derive(Clone, Copy, Debug)]
pub struct QuoteConfig {
    pub debounce: Duration,
    pub timeout: Duration,
    pub backoff: Backoff,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            timeout: DEFAULT_TIMEOUT,
            backoff: Backoff::default(),
        }
    }
}

pub struct QuoteEngine<R> {
    reader: Arc<R>,
    config: QuoteConfig,
    latest_id: AtomicU64,
}

impl<R: ChainReader> QuoteEngine<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self::with_config(reader, QuoteConfig::default())
    }

    pub fn with_config(reader: Arc<R>, config: QuoteConfig) -> Self {
        Self {
            reader,
            config,
            latest_id: AtomicU64::new(0),
        }
    }

    /// Highest request id issued so far.
    pub fn latest_id(&self) -> RequestId {
        self.latest_id.load(Ordering::SeqCst)
    }

    /// Marks every in-flight request stale without issuing a new one.
    ///
    /// Called on cancellation and reset; the superseded results are
    /// discarded on arrival.
    pub fn supersede(&self) {
        self.latest_id.fetch_add(1, Ordering::SeqCst);
    }

    /// Prices `amount_in` of `token_in` against `token_out` over the
    /// direct pool.
    ///
    /// Suspends for the debounce window, then reads the execution quote
    /// from the router and the reference mid-price from the pool
    /// reserves. Returns `Ok(None)` when a later request supersedes this
    /// one at any suspension point.
    pub async fn request_quote(
        &self,
        chain: &Chain,
        token_in: &Token,
        token_out: &Token,
        amount_in: U256,
    ) -> Result<Option<Quote>, SwapError> {
        if amount_in.is_zero() {
            return Err(SwapError::Validation("amount_in must be positive".into()));
        }
        if token_in.address() == token_out.address() {
            return Err(SwapError::Validation(
                "token_in and token_out must differ".into(),
            ));
        }

        let id = self.latest_id.fetch_add(1, Ordering::SeqCst) + 1;
        let path = vec![token_in.address(), token_out.address()];

        // Let a burst of parameter changes settle before pricing.
        tokio::time::sleep(self.config.debounce).await;
        if self.latest_id() != id {
            debug!(id, "quote request superseded while debouncing");
            return Ok(None);
        }

        debug!(id, %amount_in, path = ?path, "pricing");
        let (amount_out, mid_out) = futures::try_join!(
            self.execution_output(chain, &path, amount_in),
            self.mid_price_output(chain, &path, amount_in),
        )?;
        if self.latest_id() != id {
            debug!(id, "quote superseded on arrival");
            return Ok(None);
        }

        let impact = num::price_impact_bps(mid_out, amount_out);
        debug!(id, %amount_out, %mid_out, impact, "quote ready");
        Ok(Some(Quote::new(id, amount_in, amount_out, impact, path)))
    }

    /// Execution output quoted by the router for `amount_in` over
    /// `path`.
    async fn execution_output(
        &self,
        chain: &Chain,
        path: &[Address],
        amount_in: U256,
    ) -> Result<U256, SwapError> {
        let input = Router::getAmountsOutCall {
            amountIn: amount_in,
            path: path.to_vec(),
        }
        .abi_encode();
        let output = self.read(chain.router(), input).await?;
        let amounts = Router::getAmountsOutCall::abi_decode_returns(&output)
            .map_err(|e| SwapError::Unknown(format!("getAmountsOut response: {e}")))?;
        let amount_out = *amounts
            .last()
            .ok_or_else(|| SwapError::Unknown("getAmountsOut returned no amounts".into()))?;
        if amount_out.is_zero() {
            return Err(SwapError::NoLiquidityPath);
        }
        Ok(amount_out)
    }

    /// Output `amount_in` would fetch at the pool mid-price, composed
    /// hop by hop over `path`.
    async fn mid_price_output(
        &self,
        chain: &Chain,
        path: &[Address],
        amount_in: U256,
    ) -> Result<U256, SwapError> {
        let mut amount = amount_in;
        for hop in path.windows(2) {
            let (token_a, token_b) = (hop[0], hop[1]);
            let input = Factory::getPairCall { tokenA: token_a, tokenB: token_b }.abi_encode();
            let output = self.read(chain.factory(), input).await?;
            let pair = Factory::getPairCall::abi_decode_returns(&output)
                .map_err(|e| SwapError::Unknown(format!("getPair response: {e}")))?;
            if pair.is_zero() {
                return Err(SwapError::NoLiquidityPath);
            }

            let output = self.read(pair, Pair::token0Call {}.abi_encode()).await?;
            let token0 = Pair::token0Call::abi_decode_returns(&output)
                .map_err(|e| SwapError::Unknown(format!("token0 response: {e}")))?;

            let output = self.read(pair, Pair::getReservesCall {}.abi_encode()).await?;
            let reserves = Pair::getReservesCall::abi_decode_returns(&output)
                .map_err(|e| SwapError::Unknown(format!("getReserves response: {e}")))?;
            let (reserve_in, reserve_out) = if token0 == token_a {
                (reserves.reserve0, reserves.reserve1)
            } else {
                (reserves.reserve1, reserves.reserve0)
            };
            if reserve_in.is_zero() || reserve_out.is_zero() {
                return Err(SwapError::NoLiquidityPath);
            }
            amount = amount * reserve_out / reserve_in;
        }
        Ok(amount)
    }

    /// Read-only call with the per-call timeout, retried on transient
    /// failures.
    async fn read(&self, to: Address, input: Vec<u8>) -> Result<Bytes, SwapError> {
        retry::with_backoff(self.config.backoff, || {
            let input = input.clone();
            async move {
                match tokio::time::timeout(self.config.timeout, self.reader.call(to, input.into()))
                    .await
                {
                    Ok(result) => result.map_err(|raw| classify(&raw)),
                    Err(_) => Err(SwapError::Timeout),
                }
            }
        })
        .await
    }
}
