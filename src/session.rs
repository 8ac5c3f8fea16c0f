//! Capability interfaces for the two external collaborators.
//!
//! [`WalletSession`] abstracts the signing wallet, [`ChainReader`] the
//! read-only chain access. The orchestrator is generic over both, so a
//! deterministic double (see [`crate::testing`]) can stand in for a live
//! wallet and RPC node. Live adapters over an [`alloy`] provider are
//! provided as [`ProviderSession`] and [`RpcReader`].

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, TxHash, U256},
    providers::Provider,
    rpc::types::TransactionRequest as RpcTransactionRequest,
};

use crate::error::RawFailure;

/// Transaction to be signed and submitted by the wallet.
#[derive(Clone, derive_more::Debug, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    #[debug("{} byte calldata", input.len())]
    pub input: Bytes,
    pub value: U256,
}

impl TransactionRequest {
    /// Zero-value contract call with the given calldata.
    pub fn call(to: Address, input: impl Into<Bytes>) -> Self {
        Self {
            to,
            input: input.into(),
            value: U256::ZERO,
        }
    }
}

/// Execution outcome reported by a transaction receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Change of the wallet's active account or network.
///
/// Hosts forward these to
/// [`crate::swap::SwapOrchestrator::handle_session_event`]; either kind
/// forces an unconditional reset and invalidates cached allowance and
/// quote data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    AccountChanged(Option<Address>),
    ChainChanged(u64),
}

/// Signing wallet collaborator.
pub trait WalletSession: Send + Sync {
    /// Active account, if any is connected.
    fn account(&self) -> Option<Address>;

    /// Network the wallet is currently on.
    fn chain_id(&self) -> u64;

    /// Signs and submits the transaction, returning its hash.
    ///
    /// Suspends for as long as the signer takes; a decline surfaces as
    /// [`RawFailure::SigningDeclined`].
    fn sign_and_send(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = Result<TxHash, RawFailure>> + Send;
}

/// Read-only chain access collaborator.
pub trait ChainReader: Send + Sync {
    /// Executes a read-only call against `to` with the given calldata.
    fn call(
        &self,
        to: Address,
        input: Bytes,
    ) -> impl Future<Output = Result<Bytes, RawFailure>> + Send;

    /// Receipt lookup; `None` while the transaction is still pending.
    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<ReceiptStatus>, RawFailure>> + Send;
}

/// [`ChainReader`] over any alloy [`Provider`].
#[derive(Clone, Debug)]
pub struct RpcReader<P> {
    provider: P,
}

impl<P: Provider> RpcReader<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: Provider> ChainReader for RpcReader<P> {
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, RawFailure> {
        let tx = RpcTransactionRequest::default()
            .with_to(to)
            .with_input(input);
        self.provider.call(tx).await.map_err(RawFailure::from)
    }

    async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> Result<Option<ReceiptStatus>, RawFailure> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(RawFailure::from)?;
        Ok(receipt.map(|r| {
            if r.status() {
                ReceiptStatus::Success
            } else {
                ReceiptStatus::Reverted
            }
        }))
    }
}

/// [`WalletSession`] over a wallet-enabled alloy [`Provider`].
#[derive(Clone, Debug)]
pub struct ProviderSession<P> {
    provider: P,
    account: Address,
    chain_id: u64,
}

impl<P: Provider> ProviderSession<P> {
    /// Wraps a provider whose wallet holds the key for `account`.
    pub fn new(provider: P, account: Address, chain_id: u64) -> Self {
        Self {
            provider,
            account,
            chain_id,
        }
    }
}

impl<P: Provider> WalletSession for ProviderSession<P> {
    fn account(&self) -> Option<Address> {
        Some(self.account)
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<TxHash, RawFailure> {
        let req = RpcTransactionRequest::default()
            .with_from(self.account)
            .with_to(tx.to)
            .with_input(tx.input)
            .with_value(tx.value);
        let pending = self
            .provider
            .send_transaction(req)
            .await
            .map_err(RawFailure::from)?;
        Ok(*pending.tx_hash())
    }
}
