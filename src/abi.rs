//! Contract interfaces the engine talks to.
//!
//! All collaborator traffic is raw `eth_call`/transaction payloads
//! (see [`crate::session`]), so only the encoding/decoding types are
//! generated here, with no bound contract instances.

pub mod erc20 {
    alloy::sol! {
        /// Minimal ERC-20 surface: authorization reads and writes plus
        /// the balance read.
        interface Erc20 {
            function allowance(address owner, address spender) external view returns (uint256);
            function approve(address spender, uint256 amount) external returns (bool);
            function balanceOf(address owner) external view returns (uint256);
        }
    }
}

pub mod amm {
    alloy::sol! {
        /// Constant-product AMM router.
        interface Router {
            function getAmountsOut(uint256 amountIn, address[] path) external view returns (uint256[] amounts);
            function swapExactTokensForTokens(
                uint256 amountIn,
                uint256 amountOutMin,
                address[] path,
                address to,
                uint256 deadline
            ) external returns (uint256[] amounts);
        }

        /// Pool registry; the zero address means no pool exists for the pair.
        interface Factory {
            function getPair(address tokenA, address tokenB) external view returns (address pair);
        }

        /// A single liquidity pool. `token0` orders the reserves.
        interface Pair {
            function token0() external view returns (address);
            function getReserves() external view returns (uint256 reserve0, uint256 reserve1);
        }
    }
}
