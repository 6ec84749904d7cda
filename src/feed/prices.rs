use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Static symbol -> USD price table (spec §4.D "fixed symbol→USD price
/// table", §9 "Price table: static; part of configuration. Changes require
/// restart. No runtime price discovery."). 18 decimals assumed for the
/// native asset and every listed ERC-20, matching the wei-denominated
/// amounts the Feed Adapter returns.
static PRICE_TABLE_USD: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("NATIVE", 3200.0),
        ("ETH", 3200.0),
        ("WETH", 3200.0),
        ("USDC", 1.0),
        ("USDT", 1.0),
        ("DAI", 1.0),
        ("WBTC", 62000.0),
    ])
});

const DECIMALS: u32 = 18;

/// Converts a wei-denominated amount into USD using the static price table.
/// Returns 0.0 for unrecognized symbols rather than failing the cycle —
/// portfolio value is informational, not authoritative (spec §3 "portfolio
/// value (derived from a static price table)").
pub fn usd_value(symbol: &str, amount: &crate::model::Amount) -> f64 {
    let Some(&price) = PRICE_TABLE_USD.get(symbol.to_uppercase().as_str()) else {
        return 0.0;
    };
    // integer arithmetic up to the final division, per spec §9 "Percentage
    // computations must stay in integer arithmetic until the final division
    // to avoid overflow" — applied here to the unit conversion as well.
    let whole = amount.0 / ethers::types::U256::exp10(DECIMALS as usize);
    let remainder = amount.0 % ethers::types::U256::exp10(DECIMALS as usize);
    let whole_f = whole.as_u128() as f64;
    let frac_f = remainder.as_u128() as f64 / 10f64.powi(DECIMALS as i32);
    (whole_f + frac_f) * price
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Amount;

    #[test]
    fn one_eth_at_3200() {
        let amount = Amount(ethers::types::U256::exp10(18));
        assert!((usd_value("ETH", &amount) - 3200.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_symbol_is_zero() {
        let amount = Amount::from_u64(1);
        assert_eq!(usd_value("SHIBMOON", &amount), 0.0);
    }
}
