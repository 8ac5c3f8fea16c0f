//! Deterministic in-process doubles for the collaborator traits.
//!
//! [`MockReader`] and [`MockWallet`] replay scripted responses keyed by
//! contract address and call selector, record everything the engine
//! sends them, and support per-response delays so ordering and timeout
//! behavior can be driven with `tokio` paused time.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use alloy::primitives::{Address, B256, Bytes, TxHash, U256};

use crate::{
    error::RawFailure,
    session::{ChainReader, ReceiptStatus, TransactionRequest, WalletSession},
};

type CallKey = (Address, [u8; 4]);

#[derive(Clone, Debug)]
struct Scripted {
    delay: Duration,
    result: Result<Vec<u8>, RawFailure>,
}

/// [`ChainReader`] double replaying scripted responses.
///
/// Responses are queued per (contract, selector); each call pops the
/// next one, and the last scripted response repeats once the queue is
/// down to it. An unscripted call panics, naming the selector.
#[derive(Debug, Default)]
pub struct MockReader {
    calls: Mutex<HashMap<CallKey, VecDeque<Scripted>>>,
    receipts: Mutex<HashMap<TxHash, VecDeque<Option<ReceiptStatus>>>>,
    call_log: Mutex<Vec<CallKey>>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_call(&self, to: Address, selector: [u8; 4], result: Result<Vec<u8>, RawFailure>) {
        self.script_call_delayed(to, selector, Duration::ZERO, result);
    }

    /// Scripts a response that arrives only after `delay` elapses, for
    /// out-of-order and timeout scenarios.
    pub fn script_call_delayed(
        &self,
        to: Address,
        selector: [u8; 4],
        delay: Duration,
        result: Result<Vec<u8>, RawFailure>,
    ) {
        self.calls
            .lock()
            .unwrap()
            .entry((to, selector))
            .or_default()
            .push_back(Scripted { delay, result });
    }

    /// Scripts the next receipt lookup for `hash`; the last scripted
    /// status repeats. A hash with no script stays pending forever.
    pub fn script_receipt(&self, hash: TxHash, status: Option<ReceiptStatus>) {
        self.receipts
            .lock()
            .unwrap()
            .entry(hash)
            .or_default()
            .push_back(status);
    }

    /// Read-only calls issued so far to (contract, selector).
    pub fn call_count(&self, to: Address, selector: [u8; 4]) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|key| **key == (to, selector))
            .count()
    }

    /// Total read-only calls issued, across every contract.
    pub fn total_calls(&self) -> usize {
        self.call_log.lock().unwrap().len()
    }

    fn next_scripted(&self, key: CallKey) -> Scripted {
        let mut calls = self.calls.lock().unwrap();
        let queue = calls
            .get_mut(&key)
            .unwrap_or_else(|| panic!("unscripted call to {:?} selector {:02x?}", key.0, key.1));
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue
                .front()
                .cloned()
                .unwrap_or_else(|| panic!("call queue for {:?} drained", key.0))
        }
    }
}

impl ChainReader for MockReader {
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, RawFailure> {
        let selector: [u8; 4] = input
            .get(..4)
            .expect("calldata shorter than a selector")
            .try_into()
            .unwrap();
        self.call_log.lock().unwrap().push((to, selector));
        let scripted = self.next_scripted((to, selector));
        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }
        scripted.result.map(Bytes::from)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<ReceiptStatus>, RawFailure> {
        let mut receipts = self.receipts.lock().unwrap();
        let Some(queue) = receipts.get_mut(&hash) else {
            return Ok(None);
        };
        if queue.len() > 1 {
            Ok(queue.pop_front().unwrap())
        } else {
            Ok(queue.front().copied().flatten())
        }
    }
}

/// [`WalletSession`] double with scripted signing outcomes.
///
/// Unscripted submissions succeed with a generated hash; every
/// submitted request is recorded for assertions.
#[derive(Debug)]
pub struct MockWallet {
    account: Mutex<Option<Address>>,
    chain_id: Mutex<u64>,
    outcomes: Mutex<VecDeque<Result<TxHash, RawFailure>>>,
    sent: Mutex<Vec<TransactionRequest>>,
    next_hash: AtomicU64,
}

impl MockWallet {
    pub fn new(account: Address, chain_id: u64) -> Self {
        Self {
            account: Mutex::new(Some(account)),
            chain_id: Mutex::new(chain_id),
            outcomes: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            next_hash: AtomicU64::new(1),
        }
    }

    /// The next submission is declined by the signer.
    pub fn decline_next(&self) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(RawFailure::SigningDeclined));
    }

    /// Scripts the outcome of the next submission.
    pub fn script_submission(&self, outcome: Result<TxHash, RawFailure>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Requests signed and sent so far, in order.
    pub fn submissions(&self) -> Vec<TransactionRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_account(&self, account: Option<Address>) {
        *self.account.lock().unwrap() = account;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        *self.chain_id.lock().unwrap() = chain_id;
    }
}

impl WalletSession for MockWallet {
    fn account(&self) -> Option<Address> {
        *self.account.lock().unwrap()
    }

    fn chain_id(&self) -> u64 {
        *self.chain_id.lock().unwrap()
    }

    async fn sign_and_send(&self, tx: TransactionRequest) -> Result<TxHash, RawFailure> {
        let outcome = self.outcomes.lock().unwrap().pop_front();
        match outcome {
            Some(Err(raw)) => Err(raw),
            Some(Ok(hash)) => {
                self.sent.lock().unwrap().push(tx);
                Ok(hash)
            }
            None => {
                self.sent.lock().unwrap().push(tx);
                let n = self.next_hash.fetch_add(1, Ordering::SeqCst);
                Ok(B256::from(U256::from(n)))
            }
        }
    }
}
