//! Swap orchestration state machine.
//!
//! [`SwapOrchestrator`] sequences quoting, authorization, and exchange
//! submission for one trade intent at a time. Phase tracking is the
//! exhaustive [`SwapPhase`] enum with an explicit transition predicate;
//! an illegal transition is rejected as
//! [`SwapError::InvalidTransition`], never silently ignored.
//!
//! State lives behind a `std::sync::Mutex` held only across
//! non-suspending sections. Every async driver captures the request
//! generation before suspending and re-checks it under the lock before
//! applying results, so a superseding parameter change, cancellation,
//! or session event structurally discards stale continuations.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use alloy::{
    primitives::{Address, TxHash, U256},
    sol_types::SolCall,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    Chain, Registry,
    abi::{amm::Router, erc20::Erc20},
    allowance::AllowanceMonitor,
    error::{SwapError, classify},
    num,
    quote::{QuoteConfig, QuoteEngine},
    retry::Backoff,
    session::{ChainReader, ReceiptStatus, SessionEvent, TransactionRequest, WalletSession},
    types::{
        ConfirmationStatus, SwapPhase, SwapSnapshot, Token, TradeParams, TransactionRecord, TxKind,
    },
};

/// Window embedded in the exchange transaction; the chain refuses to
/// execute after it, protecting against stale quotes.
pub const DEFAULT_DEADLINE_WINDOW: Duration = Duration::from_secs(1200);

/// Ceiling on confirmation polling before the request is marked
/// [`SwapError::Timeout`].
pub const DEFAULT_CONFIRMATION_CEILING: Duration = Duration::from_secs(300);

/// Receipt polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Slippage bound applied until the caller sets one.
pub const DEFAULT_SLIPPAGE_BPS: u16 = 50;

#[derive(Clone, Copy, Debug)]
pub struct OrchestratorConfig {
    pub quote: QuoteConfig,
    pub deadline_window: Duration,
    pub confirmation_ceiling: Duration,
    pub poll_interval: Duration,
    pub backoff: Backoff,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            quote: QuoteConfig::default(),
            deadline_window: DEFAULT_DEADLINE_WINDOW,
            confirmation_ceiling: DEFAULT_CONFIRMATION_CEILING,
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: Backoff::default(),
        }
    }
}

/// Caller-staged trade parameters; a request forms once the pair and
/// the amount are both set.
#[derive(Clone, Debug)]
struct Staged {
    tokens: Option<(Token, Token)>,
    amount_in: Option<U256>,
    slippage_bps: u16,
}

impl Default for Staged {
    fn default() -> Self {
        Self {
            tokens: None,
            amount_in: None,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
        }
    }
}

impl Staged {
    fn params(&self) -> Option<TradeParams> {
        let (token_in, token_out) = self.tokens.clone()?;
        Some(TradeParams {
            token_in,
            token_out,
            amount_in: self.amount_in?,
            slippage_bps: self.slippage_bps,
        })
    }
}

#[derive(Debug, Default)]
struct Inner {
    chain_id: u64,
    /// Bumped on every parameter change, cancellation, and session
    /// event; in-flight continuations carrying an older value are
    /// discarded on arrival.
    generation: u64,
    staged: Staged,
    snapshot: SwapSnapshot,
}

pub struct SwapOrchestrator<W, R> {
    wallet: Arc<W>,
    reader: Arc<R>,
    registry: Registry,
    quotes: QuoteEngine<R>,
    allowance: AllowanceMonitor<R>,
    config: OrchestratorConfig,
    inner: Mutex<Inner>,
    publisher: watch::Sender<SwapSnapshot>,
}

impl<W: WalletSession, R: ChainReader> SwapOrchestrator<W, R> {
    pub fn new(wallet: Arc<W>, reader: Arc<R>, registry: Registry) -> Self {
        Self::with_config(wallet, reader, registry, OrchestratorConfig::default())
    }

    pub fn with_config(
        wallet: Arc<W>,
        reader: Arc<R>,
        registry: Registry,
        config: OrchestratorConfig,
    ) -> Self {
        let (publisher, _) = watch::channel(SwapSnapshot::default());
        let inner = Inner {
            chain_id: wallet.chain_id(),
            ..Default::default()
        };
        Self {
            wallet,
            quotes: QuoteEngine::with_config(reader.clone(), config.quote),
            allowance: AllowanceMonitor::with_backoff(reader.clone(), config.backoff),
            reader,
            registry,
            config,
            inner: Mutex::new(inner),
            publisher,
        }
    }

    /// Current request state, as published to the presentation layer.
    pub fn snapshot(&self) -> SwapSnapshot {
        self.lock().snapshot.clone()
    }

    pub fn phase(&self) -> SwapPhase {
        self.lock().snapshot.phase
    }

    /// Receiver tracking every published [`SwapSnapshot`].
    pub fn subscribe(&self) -> watch::Receiver<SwapSnapshot> {
        self.publisher.subscribe()
    }

    /// Shared allowance monitor; read-only access for hosts.
    pub fn allowance(&self) -> &AllowanceMonitor<R> {
        &self.allowance
    }

    /// Sets the input amount, in base units of the input token.
    ///
    /// Any parameter change replaces the current request: the phase
    /// returns to `Quoting` (once the pair is also set) and in-flight
    /// work is superseded.
    pub fn set_amount_in(&self, amount_in: U256) -> Result<(), SwapError> {
        if amount_in.is_zero() {
            return Err(SwapError::Validation("amount_in must be positive".into()));
        }
        self.restage(|staged| staged.amount_in = Some(amount_in))
    }

    /// Sets the pair to trade; both tokens must live on the same chain.
    pub fn set_token_pair(&self, token_in: Token, token_out: Token) -> Result<(), SwapError> {
        if token_in.chain_id() != token_out.chain_id() {
            return Err(SwapError::Validation(
                "token pair spans two chains".into(),
            ));
        }
        if token_in.address() == token_out.address() {
            return Err(SwapError::Validation(
                "token_in and token_out must differ".into(),
            ));
        }
        self.restage(|staged| staged.tokens = Some((token_in, token_out)))
    }

    /// Sets the slippage bound in basis points, within `[0, 10000]`.
    pub fn set_slippage_bps(&self, slippage_bps: u16) -> Result<(), SwapError> {
        if slippage_bps > num::BPS_DENOMINATOR as u16 {
            return Err(SwapError::Validation(format!(
                "slippage_bps {slippage_bps} outside [0, {}]",
                num::BPS_DENOMINATOR,
            )));
        }
        self.restage(|staged| staged.slippage_bps = slippage_bps)
    }

    /// Discards the current request.
    ///
    /// From `Idle`/`Quoting`/`NeedsApproval` this aborts cleanly. After
    /// a submission it only stops local tracking; the transaction
    /// already on chain is not retracted.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        let phase = inner.snapshot.phase;
        if !phase.is_cleanly_cancellable() && !phase.is_terminal() {
            warn!(?phase, "cancelled after submission; the on-chain transaction is not retracted");
        }
        info!(?phase, "request cancelled");
        inner.generation += 1;
        self.quotes.supersede();
        inner.staged = Staged::default();
        inner.snapshot = SwapSnapshot::default();
        self.publish(&inner);
    }

    /// Applies an account or network change from the wallet.
    ///
    /// Either kind forces an unconditional reset to `Idle` and
    /// invalidates cached allowance and quote data, regardless of the
    /// current phase.
    pub fn handle_session_event(&self, event: SessionEvent) {
        let mut inner = self.lock();
        match event {
            SessionEvent::AccountChanged(account) => {
                info!(?account, "account changed, resetting");
            }
            SessionEvent::ChainChanged(chain_id) => {
                info!(chain_id, "network changed, resetting");
                inner.chain_id = chain_id;
            }
        }
        inner.generation += 1;
        self.quotes.supersede();
        self.allowance.invalidate();
        inner.staged = Staged::default();
        inner.snapshot = SwapSnapshot::default();
        self.publish(&inner);
    }

    /// Drives the `Quoting` phase: prices the staged trade and routes
    /// to `NeedsApproval` or `ReadyToSwap` on arrival.
    ///
    /// Returns the resulting phase; when the request was superseded
    /// mid-flight, the current phase is returned and nothing is
    /// mutated.
    pub async fn refresh_quote(&self) -> Result<SwapPhase, SwapError> {
        let (generation, chain, params, owner) = {
            let mut inner = self.lock();
            let phase = inner.snapshot.phase;
            if phase != SwapPhase::Quoting {
                return Err(SwapError::InvalidTransition {
                    from: phase,
                    to: SwapPhase::Quoting,
                });
            }
            self.trade_context(&mut inner)?
        };

        debug!(generation, amount_in = %params.amount_in, "requesting quote");
        let quote = match self
            .quotes
            .request_quote(&chain, &params.token_in, &params.token_out, params.amount_in)
            .await
        {
            Ok(Some(quote)) => quote,
            Ok(None) => return Ok(self.phase()),
            Err(err) => return self.settle_failure(generation, err),
        };

        let sufficient = match self
            .allowance
            .check(
                owner,
                chain.router(),
                &params.token_in,
                params.amount_in,
                quote.request_id(),
            )
            .await
        {
            Ok(sufficient) => sufficient,
            Err(err) => return self.settle_failure(generation, err),
        };

        match self.if_current(generation, |inner| -> Result<SwapPhase, SwapError> {
            if quote.request_id() != self.quotes.latest_id() {
                return Ok(inner.snapshot.phase);
            }
            let next = if sufficient {
                SwapPhase::ReadyToSwap
            } else {
                SwapPhase::NeedsApproval
            };
            Self::transition(inner, next)?;
            inner.snapshot.quote = Some(quote);
            Ok(next)
        }) {
            Ok(result) => result,
            Err(phase) => Ok(phase),
        }
    }

    /// Drives `NeedsApproval -> Approving -> ReadyToSwap`: submits an
    /// exact-amount authorization and waits for its on-chain inclusion
    /// before anything else is submitted.
    pub async fn approve(&self) -> Result<SwapPhase, SwapError> {
        let (generation, chain, params, owner) = {
            let mut inner = self.lock();
            let phase = inner.snapshot.phase;
            if phase != SwapPhase::NeedsApproval {
                return Err(SwapError::InvalidTransition {
                    from: phase,
                    to: SwapPhase::Approving,
                });
            }
            let context = self.trade_context(&mut inner)?;
            Self::transition(&mut inner, SwapPhase::Approving)?;
            self.publish(&inner);
            context
        };

        let input = Erc20::approveCall {
            spender: chain.router(),
            amount: params.amount_in,
        }
        .abi_encode();
        info!(
            token = %params.token_in.address(),
            spender = %chain.router(),
            amount = %params.amount_in,
            "submitting authorization"
        );
        let hash = match self
            .wallet
            .sign_and_send(TransactionRequest::call(params.token_in.address(), input))
            .await
        {
            Ok(hash) => hash,
            Err(raw) => return self.settle_failure(generation, classify(&raw)),
        };

        if let Err(phase) = self.if_current(generation, |inner| {
            inner.snapshot.authorization = Some(TransactionRecord {
                hash,
                kind: TxKind::Authorize,
                submitted_at: num::unix_now(),
                status: ConfirmationStatus::Pending,
            });
        }) {
            warn!(%hash, "authorization submitted for an abandoned request");
            return Ok(phase);
        }
        info!(%hash, "authorization submitted");

        let status = match self.await_confirmation(hash).await {
            Ok(status) => status,
            Err(err) => return self.settle_failure(generation, err),
        };
        if status == ConfirmationStatus::Reverted {
            let err = SwapError::Reverted(None);
            return match self.if_current(generation, |inner| {
                if let Some(record) = inner.snapshot.authorization.as_mut() {
                    record.status = ConfirmationStatus::Reverted;
                }
                self.fail(inner, &err);
            }) {
                Ok(()) => Err(err),
                Err(phase) => Ok(phase),
            };
        }
        if let Err(phase) = self.if_current(generation, |inner| {
            if let Some(record) = inner.snapshot.authorization.as_mut() {
                record.status = ConfirmationStatus::Confirmed;
            }
        }) {
            return Ok(phase);
        }
        info!(%hash, "authorization confirmed");

        // Approval state may have moved under us; leave Approving only
        // on a fresh read.
        let sufficient = match self
            .allowance
            .check(
                owner,
                chain.router(),
                &params.token_in,
                params.amount_in,
                self.quotes.latest_id(),
            )
            .await
        {
            Ok(sufficient) => sufficient,
            Err(err) => return self.settle_failure(generation, err),
        };
        let next = if sufficient {
            SwapPhase::ReadyToSwap
        } else {
            warn!("allowance still insufficient after confirmed authorization");
            SwapPhase::NeedsApproval
        };
        self.settle_transition(generation, next)
    }

    /// Drives `ReadyToSwap -> Swapping -> Confirmed | Failed`: re-reads
    /// the allowance, submits the exchange with the slippage-bounded
    /// output floor and deadline embedded, and polls confirmation.
    pub async fn execute_swap(&self) -> Result<SwapPhase, SwapError> {
        let (generation, chain, params, owner, quote) = {
            let mut inner = self.lock();
            let phase = inner.snapshot.phase;
            if phase != SwapPhase::ReadyToSwap {
                return Err(SwapError::InvalidTransition {
                    from: phase,
                    to: SwapPhase::Swapping,
                });
            }
            let (generation, chain, params, owner) = self.trade_context(&mut inner)?;
            let quote = inner
                .snapshot
                .quote
                .clone()
                .ok_or_else(|| SwapError::Validation("no quote for the current request".into()))?;
            (generation, chain, params, owner, quote)
        };

        // Never trusted across a phase boundary: a fresh read, not the
        // cached record.
        let sufficient = match self
            .allowance
            .check(
                owner,
                chain.router(),
                &params.token_in,
                params.amount_in,
                quote.request_id(),
            )
            .await
        {
            Ok(sufficient) => sufficient,
            Err(err) => return self.settle_failure(generation, err),
        };
        if !sufficient {
            warn!("allowance no longer sufficient, authorization required again");
            return self.settle_transition(generation, SwapPhase::NeedsApproval);
        }

        let min_output = quote.min_output(params.slippage_bps);
        let deadline = num::unix_now() + self.config.deadline_window.as_secs();
        match self.if_current(generation, |inner| -> Result<(), SwapError> {
            Self::transition(inner, SwapPhase::Swapping)?;
            inner.snapshot.deadline = Some(deadline);
            Ok(())
        }) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(phase) => return Ok(phase),
        }

        let input = Router::swapExactTokensForTokensCall {
            amountIn: params.amount_in,
            amountOutMin: min_output,
            path: quote.path().to_vec(),
            to: owner,
            deadline: U256::from(deadline),
        }
        .abi_encode();
        info!(
            amount_in = %params.amount_in,
            %min_output,
            deadline,
            "submitting exchange"
        );
        let hash = match self
            .wallet
            .sign_and_send(TransactionRequest::call(chain.router(), input))
            .await
        {
            Ok(hash) => hash,
            Err(raw) => return self.settle_failure(generation, classify(&raw)),
        };

        if let Err(phase) = self.if_current(generation, |inner| {
            inner.snapshot.exchange = Some(TransactionRecord {
                hash,
                kind: TxKind::Exchange,
                submitted_at: num::unix_now(),
                status: ConfirmationStatus::Pending,
            });
        }) {
            warn!(%hash, "exchange submitted for an abandoned request");
            return Ok(phase);
        }
        info!(%hash, "exchange submitted");

        let status = match self.await_confirmation(hash).await {
            Ok(status) => status,
            Err(err) => return self.settle_failure(generation, err),
        };
        match status {
            ConfirmationStatus::Reverted => {
                let err = SwapError::Reverted(None);
                match self.if_current(generation, |inner| {
                    if let Some(record) = inner.snapshot.exchange.as_mut() {
                        record.status = ConfirmationStatus::Reverted;
                    }
                    self.fail(inner, &err);
                }) {
                    Ok(()) => Err(err),
                    Err(phase) => Ok(phase),
                }
            }
            _ => match self.if_current(generation, |inner| {
                if let Some(record) = inner.snapshot.exchange.as_mut() {
                    record.status = ConfirmationStatus::Confirmed;
                }
                Self::transition(inner, SwapPhase::Confirmed)
            }) {
                Ok(Ok(())) => {
                    info!(%hash, "exchange confirmed");
                    Ok(SwapPhase::Confirmed)
                }
                Ok(Err(err)) => Err(err),
                Err(phase) => Ok(phase),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("orchestrator state lock poisoned")
    }

    fn publish(&self, inner: &Inner) {
        self.publisher.send_replace(inner.snapshot.clone());
    }

    /// Parameter change entry point: replaces the current request and
    /// re-enters `Quoting` once the parameters form a complete trade.
    fn restage(&self, apply: impl FnOnce(&mut Staged)) -> Result<(), SwapError> {
        let mut inner = self.lock();
        let phase = inner.snapshot.phase;
        if matches!(phase, SwapPhase::Approving | SwapPhase::Swapping) {
            return Err(SwapError::InvalidTransition {
                from: phase,
                to: SwapPhase::Quoting,
            });
        }
        inner.generation += 1;
        self.quotes.supersede();
        apply(&mut inner.staged);
        inner.snapshot = SwapSnapshot {
            params: inner.staged.params(),
            ..Default::default()
        };
        if inner.snapshot.params.is_some() {
            inner.snapshot.phase = SwapPhase::Quoting;
            debug!(generation = inner.generation, "parameters changed, re-quoting");
        }
        self.publish(&inner);
        Ok(())
    }

    /// Context every driver needs: the request generation plus resolved
    /// chain, complete parameters, and the active account. Resolution
    /// failures are recorded on the snapshot before surfacing.
    fn trade_context(
        &self,
        inner: &mut Inner,
    ) -> Result<(u64, Chain, TradeParams, Address), SwapError> {
        let params = inner
            .staged
            .params()
            .ok_or_else(|| SwapError::Validation("trade parameters are incomplete".into()))?;
        let chain = match self.registry.resolve(inner.chain_id) {
            Ok(chain) => chain.clone(),
            Err(err) => {
                self.fail(inner, &err);
                self.publish(inner);
                return Err(err);
            }
        };
        if params.token_in.chain_id() != chain.chain_id() {
            let err = SwapError::Validation("token pair is not on the active network".into());
            self.fail(inner, &err);
            self.publish(inner);
            return Err(err);
        }
        let Some(owner) = self.wallet.account() else {
            let err = SwapError::Validation("no account connected".into());
            self.fail(inner, &err);
            self.publish(inner);
            return Err(err);
        };
        Ok((inner.generation, chain, params, owner))
    }

    /// Applies `apply` and publishes, provided the request is still
    /// current; a superseded continuation gets the current phase back
    /// and leaves state untouched.
    fn if_current<T>(&self, generation: u64, apply: impl FnOnce(&mut Inner) -> T) -> Result<T, SwapPhase> {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(generation, current = inner.generation, "stale continuation discarded");
            return Err(inner.snapshot.phase);
        }
        let out = apply(&mut inner);
        self.publish(&inner);
        Ok(out)
    }

    fn settle_failure(&self, generation: u64, err: SwapError) -> Result<SwapPhase, SwapError> {
        match self.if_current(generation, |inner| self.fail(inner, &err)) {
            Ok(()) => Err(err),
            Err(phase) => Ok(phase),
        }
    }

    fn settle_transition(
        &self,
        generation: u64,
        next: SwapPhase,
    ) -> Result<SwapPhase, SwapError> {
        match self.if_current(generation, |inner| Self::transition(inner, next)) {
            Ok(Ok(())) => Ok(next),
            Ok(Err(err)) => Err(err),
            Err(phase) => Ok(phase),
        }
    }

    fn transition(inner: &mut Inner, to: SwapPhase) -> Result<(), SwapError> {
        let from = inner.snapshot.phase;
        if !from.can_transition(to) {
            return Err(SwapError::InvalidTransition { from, to });
        }
        info!(?from, ?to, "phase transition");
        inner.snapshot.phase = to;
        Ok(())
    }

    fn fail(&self, inner: &mut Inner, err: &SwapError) {
        warn!(phase = ?inner.snapshot.phase, %err, "request failed");
        inner.snapshot.phase = SwapPhase::Failed;
        inner.snapshot.error = Some(err.clone());
    }

    /// Polls the receipt until the transaction settles or the ceiling
    /// elapses. Transient read failures do not abort polling; the
    /// ceiling bounds the total wait, and a timed-out request may still
    /// confirm on chain later.
    async fn await_confirmation(&self, hash: TxHash) -> Result<ConfirmationStatus, SwapError> {
        let poll = async {
            let mut interval = tokio::time::interval(self.config.poll_interval);
            loop {
                interval.tick().await;
                match self.reader.transaction_receipt(hash).await {
                    Ok(Some(ReceiptStatus::Success)) => return ConfirmationStatus::Confirmed,
                    Ok(Some(ReceiptStatus::Reverted)) => return ConfirmationStatus::Reverted,
                    Ok(None) => debug!(%hash, "transaction pending"),
                    Err(raw) => debug!(%hash, ?raw, "receipt lookup failed, retrying"),
                }
            }
        };
        tokio::time::timeout(self.config.confirmation_ceiling, poll)
            .await
            .map_err(|_| SwapError::Timeout)
    }
}
