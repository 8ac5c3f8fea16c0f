use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::U256;
use fastnum::{
    bint,
    decimal::{Context, RoundingMode, UnsignedDecimal},
};

/// Basis-point denominator: 1 bp = 1/100 of a percent.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Smallest output the trade may settle at under the given slippage bound.
///
/// Computed as `output * (10000 - slippage_bps) / 10000` with integer
/// division, so the result is always `<= output`. A bound of 10000 bps
/// (or more) floors the output at zero.
pub fn min_acceptable_output(output: U256, slippage_bps: u16) -> U256 {
    let kept = BPS_DENOMINATOR.saturating_sub(slippage_bps as u64);
    output * U256::from(kept) / U256::from(BPS_DENOMINATOR)
}

/// Deviation of the quoted output from the mid-price output, in basis
/// points of the mid-price output.
///
/// Zero when the quote is at or better than mid, capped at 10000 when the
/// quote is worthless relative to mid. A zero mid-price output (empty
/// pool) also reports zero; callers reject that case separately.
pub fn price_impact_bps(mid_output: U256, quoted_output: U256) -> u16 {
    if mid_output.is_zero() || quoted_output >= mid_output {
        return 0;
    }
    let deviation = (mid_output - quoted_output) * U256::from(BPS_DENOMINATOR) / mid_output;
    deviation.min(U256::from(BPS_DENOMINATOR)).to::<u64>() as u16
}

/// Current unix time in whole seconds, for transaction deadlines.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Base-unit to decimal converter for one token's decimal-places count.
///
/// Lives strictly at the presentation boundary: the engine itself stores
/// and computes in integer base units, and only hosts rendering or
/// parsing human amounts go through this.
#[derive(Clone, Copy, Debug, Default)]
pub struct Converter {
    decimals: i32,
}

impl Converter {
    pub fn new(decimals: u8) -> Self {
        Self {
            decimals: decimals as i32,
        }
    }

    /// Base units -> decimal display value.
    pub fn to_decimal<const N: usize>(&self, value: U256) -> UnsignedDecimal<N> {
        let unscaled = bint::UInt::<N>::from_le_slice(value.as_le_slice())
            .expect("Converter: U256 -> UInt::<N>");
        UnsignedDecimal::<N>::from_parts(
            unscaled,
            -self.decimals,
            Context::default().with_rounding_mode(RoundingMode::Floor),
        )
    }

    /// Decimal display value -> base units.
    pub fn to_base_units<const N: usize>(&self, value: UnsignedDecimal<N>) -> U256 {
        let rescaled = value.rescale(self.decimals as i16);
        U256::from_le_slice(rescaled.digits().to_radix_le(256).as_slice())
    }
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;

    #[test]
    fn test_min_acceptable_output_never_exceeds_output() {
        let output = U256::from(200_000_000u64);
        for bps in [0u16, 1, 50, 100, 9_999, 10_000] {
            assert!(min_acceptable_output(output, bps) <= output);
        }
    }

    #[test]
    fn test_min_acceptable_output_fifty_bps() {
        // 200000000 * 9950 / 10000
        assert_eq!(
            min_acceptable_output(U256::from(200_000_000u64), 50),
            U256::from(199_000_000u64),
        );
    }

    #[test]
    fn test_min_acceptable_output_bounds() {
        let output = U256::from(12_345u64);
        assert_eq!(min_acceptable_output(output, 0), output);
        assert_eq!(min_acceptable_output(output, 10_000), U256::ZERO);
    }

    #[test]
    fn test_price_impact() {
        // Quote 1% below mid.
        assert_eq!(
            price_impact_bps(U256::from(10_000u64), U256::from(9_900u64)),
            100,
        );
        // Quote at or above mid reports zero.
        assert_eq!(
            price_impact_bps(U256::from(10_000u64), U256::from(10_000u64)),
            0,
        );
        assert_eq!(
            price_impact_bps(U256::from(10_000u64), U256::from(10_100u64)),
            0,
        );
        // Empty pool.
        assert_eq!(price_impact_bps(U256::ZERO, U256::from(1u64)), 0);
        // Worthless quote caps at the denominator.
        assert_eq!(
            price_impact_bps(U256::from(10_000u64), U256::ZERO),
            10_000,
        );
    }

    #[test]
    fn test_converter_to_base_units() {
        // Display value 100 of a 6-decimals token.
        assert_eq!(
            Converter::new(6).to_base_units(udec256!(100)),
            U256::from(100_000_000u64),
        );
        assert_eq!(
            Converter::new(0).to_base_units(udec256!(1234567890)),
            U256::from(1_234_567_890u64),
        );
        assert_eq!(
            Converter::new(2).to_base_units(udec256!(1.23)),
            U256::from(123u64),
        );
    }

    #[test]
    fn test_converter_to_decimal() {
        assert_eq!(
            Converter::new(6).to_decimal(U256::from(100_000_000u64)),
            udec256!(100),
        );
        assert_eq!(
            Converter::new(12).to_decimal(U256::from(1_234_567_890u64)),
            udec256!(0.00123456789),
        );
    }
}
