//! AMM swap SDK.
//!
//! # Overview
//!
//! Client-side engine for exchanging one fungible token for another
//! through an on-chain constant-product AMM: fetching a price quote,
//! obtaining spending authorization, and submitting a bounded-slippage
//! exchange transaction.
//!
//! Use [`Registry`] to describe the networks the host supports, then
//! drive a [`swap::SwapOrchestrator`] with the wallet and chain-access
//! collaborators of [`session`]. The orchestrator publishes a
//! [`types::SwapSnapshot`] on every state change, which is all the
//! presentation layer needs to render.
//!
//! All amounts are integer base units ([`alloy::primitives::U256`]);
//! converting to and from display values happens at the presentation
//! boundary via [`num::Converter`].
//!
//! See `./tests` for end-to-end examples.
//!
//! # Testing
//!
//! [`testing`] module provides deterministic in-process doubles for the
//! wallet and chain-access collaborators, with scripted responses and
//! recorded submissions.

pub mod abi;
pub mod allowance;
pub mod error;
pub mod num;
pub mod quote;
pub mod retry;
pub mod session;
pub mod swap;
pub mod testing;
pub mod types;

use std::collections::HashMap;

use alloy::primitives::{Address, address};
use url::Url;

use crate::error::SwapError;

/// Chain the AMM is operating on.
///
/// Carries the RPC endpoint and the router/factory contract addresses
/// the engine needs; everything else about the network stays with the
/// host.
#[derive(Clone, Debug)]
pub struct Chain {
    chain_id: u64,
    endpoint: Url,
    router: Address,
    factory: Address,
}

impl Chain {
    /// Ethereum mainnet with the canonical V2 router and factory.
    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            endpoint: Url::parse("https://eth.llamarpc.com").expect("static url"),
            router: address!("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"),
            factory: address!("0x5C69bEE701ef814a2B6a3EDD4B1652CB9cc8aa6f"),
        }
    }

    pub fn custom(chain_id: u64, endpoint: Url, router: Address, factory: Address) -> Self {
        Self {
            chain_id,
            endpoint,
            router,
            factory,
        }
    }

    /// Descriptor sourced from the standard environment variables, see
    /// [`ChainConfig`].
    pub fn from_env() -> Result<Self, SwapError> {
        ChainConfig::from_env()
            .map_err(|e| SwapError::Validation(e.to_string()))?
            .into_chain()
    }

    /// Same descriptor pointed at a different RPC endpoint.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// RPC endpoint to read quotes and receipts from.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Router contract: pricing reads and exchange submissions.
    pub fn router(&self) -> Address {
        self.router
    }

    /// Factory contract: pool lookup per token pair.
    pub fn factory(&self) -> Address {
        self.factory
    }
}

/// Chain descriptor as read from the environment
/// (`CHAIN_ID`, `NODE_RPC_URL`, `ROUTER_ADDRESS`, `FACTORY_ADDRESS`).
#[derive(Debug, serde::Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub node_rpc_url: String,
    pub router_address: String,
    pub factory_address: String,
}

impl ChainConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn into_chain(self) -> Result<Chain, SwapError> {
        let endpoint = Url::parse(&self.node_rpc_url)
            .map_err(|e| SwapError::Validation(format!("node_rpc_url: {e}")))?;
        let router = self
            .router_address
            .parse()
            .map_err(|e| SwapError::Validation(format!("router_address: {e}")))?;
        let factory = self
            .factory_address
            .parse()
            .map_err(|e| SwapError::Validation(format!("factory_address: {e}")))?;
        Ok(Chain::custom(self.chain_id, endpoint, router, factory))
    }
}

/// Lookup of per-network [`Chain`] descriptors.
///
/// Stateless and side-effect-free; an id with no descriptor resolves to
/// [`SwapError::UnsupportedChain`].
#[derive(Clone, Debug, Default)]
pub struct Registry {
    chains: HashMap<u64, Chain>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chains.insert(chain.chain_id(), chain);
        self
    }

    pub fn resolve(&self, chain_id: u64) -> Result<&Chain, SwapError> {
        self.chains
            .get(&chain_id)
            .ok_or(SwapError::UnsupportedChain(chain_id))
    }
}
