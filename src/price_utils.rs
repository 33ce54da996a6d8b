//! sqrtPriceX96 (Q64.96) → USD estimate helpers shared by both EVM venues.
//! The 1e9 supply assumption and the `TVL ≈ 2·(L/sqrtPrice)·ethPrice`
//! approximation are deliberate rough estimates, not exact accounting.

use num_bigint::BigUint;
use num_traits::ToPrimitive;

const ASSUMED_SUPPLY: f64 = 1_000_000_000.0;
const Q96: f64 = 79228162514264337593543950336.0; // 2^96

/// Returns `None` on overflow or zero inputs rather than panicking; callers
/// leave the previous estimate in place when this returns `None`.
pub fn estimate_mcap(sqrt_price_x96: &BigUint, eth_is_token0: bool, eth_price: f64) -> Option<f64> {
    let sqrt_price = sqrt_price_x96.to_f64()?;
    if sqrt_price == 0.0 || eth_price == 0.0 || !sqrt_price.is_finite() {
        return None;
    }
    let price_ratio = (sqrt_price / Q96).powi(2);
    if !price_ratio.is_finite() || price_ratio == 0.0 {
        return None;
    }
    let token_price_eth = if eth_is_token0 { 1.0 / price_ratio } else { price_ratio };
    let mcap = token_price_eth * eth_price * ASSUMED_SUPPLY;
    mcap.is_finite().then_some(mcap)
}

/// Updates `liquidity_usd` in place; `None` means "leave unchanged".
pub fn estimate_liquidity_usd(liquidity: &BigUint, sqrt_price_x96: &BigUint, eth_price: f64) -> Option<f64> {
    let liquidity = liquidity.to_f64()?;
    let sqrt_price = sqrt_price_x96.to_f64()?;
    if sqrt_price <= 0.0 || eth_price <= 0.0 || !sqrt_price.is_finite() {
        return None;
    }
    let usd = (liquidity / sqrt_price) * eth_price * 2.0;
    usd.is_finite().then_some(usd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_price_is_noop() {
        assert_eq!(estimate_mcap(&BigUint::from(0u32), true, 2500.0), None);
    }

    #[test]
    fn plausible_mcap_is_positive() {
        let sqrt_price = BigUint::from(Q96 as u128);
        let mcap = estimate_mcap(&sqrt_price, false, 2500.0).unwrap();
        assert!(mcap > 0.0);
    }

    #[test]
    fn liquidity_requires_positive_sqrt_price() {
        assert_eq!(estimate_liquidity_usd(&BigUint::from(100u32), &BigUint::from(0u32), 2500.0), None);
    }
}
