use std::{sync::Arc, time::Duration};

use alloy::{
    primitives::{Address, U256},
    sol_types::{SolCall, SolValue},
};
use swap_sdk::{
    Chain,
    abi::amm::{Factory, Pair, Router},
    error::{RawFailure, SwapError},
    quote::{QuoteConfig, QuoteEngine},
    retry::Backoff,
    testing::MockReader,
    types::Token,
};
use url::Url;

const ROUTER: Address = Address::repeat_byte(0xE1);
const FACTORY: Address = Address::repeat_byte(0xE2);
const PAIR: Address = Address::repeat_byte(0xE3);
const USDC: Address = Address::repeat_byte(0xAA);
const WETH: Address = Address::repeat_byte(0xBB);

const AMOUNT_IN: u64 = 100_000_000;
const AMOUNT_OUT: u64 = 200_000_000;

fn chain() -> Chain {
    Chain::custom(
        1,
        Url::parse("http://localhost:8545").unwrap(),
        ROUTER,
        FACTORY,
    )
}

fn usdc() -> Token {
    Token::new(1, USDC, "USDC", 6)
}

fn weth() -> Token {
    Token::new(1, WETH, "WETH", 18)
}

fn script_amounts_out(reader: &MockReader, amount_in: u64, amount_out: u64) {
    reader.script_call(
        ROUTER,
        Router::getAmountsOutCall::SELECTOR,
        Ok(vec![U256::from(amount_in), U256::from(amount_out)].abi_encode()),
    );
}

/// Pool whose reserves put the mid-price output at
/// `amount * reserve_out / reserve_in`.
fn script_pool(reader: &MockReader, reserve_in: u64, reserve_out: u64) {
    reader.script_call(
        FACTORY,
        Factory::getPairCall::SELECTOR,
        Ok(PAIR.abi_encode()),
    );
    reader.script_call(PAIR, Pair::token0Call::SELECTOR, Ok(USDC.abi_encode()));
    reader.script_call(
        PAIR,
        Pair::getReservesCall::SELECTOR,
        Ok((U256::from(reserve_in), U256::from(reserve_out)).abi_encode_params()),
    );
}

/// Quote carries the router's execution amount and the deviation from
/// the reserve-derived mid-price.
#[tokio::test(start_paused = true)]
async fn test_quote_prices_against_router_and_mid_price() {
    let reader = Arc::new(MockReader::new());
    script_amounts_out(&reader, AMOUNT_IN, AMOUNT_OUT);
    // Mid-price output 202_000_000, about 1% above the execution quote.
    script_pool(&reader, 100, 202);

    let engine = QuoteEngine::new(reader);
    let quote = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::from(AMOUNT_IN))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(quote.request_id(), 1);
    assert_eq!(quote.amount_in(), U256::from(AMOUNT_IN));
    assert_eq!(quote.amount_out(), U256::from(AMOUNT_OUT));
    assert_eq!(quote.path(), [USDC, WETH]);
    // (202M - 200M) * 10000 / 202M, floored.
    assert_eq!(quote.price_impact_bps(), 99);
    // 50 bps off the quoted execution output.
    assert_eq!(quote.min_output(50), U256::from(199_000_000u64));
}

/// R1 issued before R2, R1's response arriving after R2's: R1 resolves
/// to `None` and its result never lands.
#[tokio::test(start_paused = true)]
async fn test_earlier_response_arriving_late_is_discarded() {
    let reader = Arc::new(MockReader::new());
    // R1's pricing response takes 5s; R2's is immediate.
    reader.script_call_delayed(
        ROUTER,
        Router::getAmountsOutCall::SELECTOR,
        Duration::from_secs(5),
        Ok(vec![U256::from(AMOUNT_IN), U256::from(111_000_000u64)].abi_encode()),
    );
    script_amounts_out(&reader, AMOUNT_IN, AMOUNT_OUT);
    script_pool(&reader, 100, 202);

    let engine = Arc::new(QuoteEngine::new(reader));
    let first = {
        let engine = engine.clone();
        let chain = chain();
        tokio::spawn(async move {
            engine
                .request_quote(&chain, &usdc(), &weth(), U256::from(AMOUNT_IN))
                .await
        })
    };
    // Past R1's debounce, so its pricing call is in flight.
    tokio::time::sleep(Duration::from_millis(600)).await;

    let second = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::from(AMOUNT_IN))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.request_id(), 2);
    assert_eq!(second.amount_out(), U256::from(AMOUNT_OUT));

    assert_eq!(first.await.unwrap().unwrap(), None);
}

/// A parameter change inside the debounce window supersedes the pending
/// request before its pricing call goes out.
#[tokio::test(start_paused = true)]
async fn test_request_superseded_while_debouncing_issues_no_call() {
    let reader = Arc::new(MockReader::new());
    script_amounts_out(&reader, AMOUNT_IN, AMOUNT_OUT);
    script_pool(&reader, 100, 202);

    let engine = Arc::new(QuoteEngine::new(reader.clone()));
    let first = {
        let engine = engine.clone();
        let chain = chain();
        tokio::spawn(async move {
            engine
                .request_quote(&chain, &usdc(), &weth(), U256::from(AMOUNT_IN))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::from(AMOUNT_IN))
        .await
        .unwrap();
    assert!(second.is_some());

    assert_eq!(first.await.unwrap().unwrap(), None);
    assert_eq!(reader.call_count(ROUTER, Router::getAmountsOutCall::SELECTOR), 1);
}

/// A pricing read that never answers times out per attempt and
/// surfaces `Timeout` once the backoff budget is spent.
#[tokio::test(start_paused = true)]
async fn test_pricing_timeout_surfaces_after_retries() {
    let reader = Arc::new(MockReader::new());
    reader.script_call_delayed(
        ROUTER,
        Router::getAmountsOutCall::SELECTOR,
        Duration::from_secs(60),
        Ok(Vec::<U256>::new().abi_encode()),
    );
    script_pool(&reader, 100, 202);

    let engine = QuoteEngine::with_config(
        reader.clone(),
        QuoteConfig {
            debounce: Duration::ZERO,
            timeout: Duration::from_secs(1),
            backoff: Backoff {
                attempts: 2,
                base_delay: Duration::from_millis(100),
            },
        },
    );
    let result = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::from(AMOUNT_IN))
        .await;

    assert_eq!(result, Err(SwapError::Timeout));
    assert_eq!(reader.call_count(ROUTER, Router::getAmountsOutCall::SELECTOR), 2);
}

/// Zero pair address from the factory means no route exists.
#[tokio::test(start_paused = true)]
async fn test_missing_pool_reports_no_liquidity_path() {
    let reader = Arc::new(MockReader::new());
    script_amounts_out(&reader, AMOUNT_IN, AMOUNT_OUT);
    reader.script_call(
        FACTORY,
        Factory::getPairCall::SELECTOR,
        Ok(Address::ZERO.abi_encode()),
    );

    let engine = QuoteEngine::new(reader);
    let result = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::from(AMOUNT_IN))
        .await;
    assert_eq!(result, Err(SwapError::NoLiquidityPath));
}

/// Router revert reasons classify into the taxonomy; liquidity reverts
/// are not retried.
#[tokio::test(start_paused = true)]
async fn test_router_liquidity_revert_classifies_and_does_not_retry() {
    let reader = Arc::new(MockReader::new());
    reader.script_call(
        ROUTER,
        Router::getAmountsOutCall::SELECTOR,
        Err(RawFailure::revert("Amm: INSUFFICIENT_LIQUIDITY")),
    );
    script_pool(&reader, 100, 202);

    let engine = QuoteEngine::new(reader.clone());
    let result = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::from(AMOUNT_IN))
        .await;

    assert_eq!(result, Err(SwapError::NoLiquidityPath));
    assert_eq!(reader.call_count(ROUTER, Router::getAmountsOutCall::SELECTOR), 1);
}

/// Parameter validation happens before any network call.
#[tokio::test(start_paused = true)]
async fn test_invalid_parameters_rejected_without_side_effects() {
    let reader = Arc::new(MockReader::new());
    let engine = QuoteEngine::new(reader.clone());

    let zero = engine
        .request_quote(&chain(), &usdc(), &weth(), U256::ZERO)
        .await;
    assert!(matches!(zero, Err(SwapError::Validation(_))));

    let same_token = engine
        .request_quote(&chain(), &usdc(), &usdc(), U256::from(AMOUNT_IN))
        .await;
    assert!(matches!(same_token, Err(SwapError::Validation(_))));

    assert_eq!(reader.total_calls(), 0);
}
