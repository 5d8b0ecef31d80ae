//! Arbitrage transaction cost model.
//!
//! The arbitrageur pays a fixed USD cost per executed arbitrage. The default
//! comes from observed L2 DEX trade costs; an EVO-style estimate prices the
//! gas of a virtual-order execution directly.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Which cost figure to charge per arbitrage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum GasTier {
    High,
    #[default]
    Avg,
    Low,
    /// Gas units of an EVO execution priced at the model's gas and ETH price.
    Evo,
}

/// Observed DEX trade costs in USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DexTradeCosts {
    pub high: Decimal,
    pub avg: Decimal,
    pub low: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbCostModel {
    pub est_evo_gas: Decimal,
    pub usd_per_eth: Decimal,
    pub base_fee_gwei: Decimal,
    pub priority_fee_gwei: Decimal,
    pub gwei_per_eth: Decimal,
    pub dex_trade: DexTradeCosts,
    /// Safety factor applied to a DEX trade cost.
    pub trade_multiplier: Decimal,
    /// Trades per arbitrage (one on each chain).
    pub legs: Decimal,
}

impl Default for ArbCostModel {
    fn default() -> Self {
        Self {
            est_evo_gas: dec!(219806),
            usd_per_eth: dec!(1879.75),
            base_fee_gwei: dec!(0.0837),
            priority_fee_gwei: dec!(0.1080),
            gwei_per_eth: dec!(1000000000),
            dex_trade: DexTradeCosts {
                high: dec!(0.237),
                avg: dec!(0.124),
                low: dec!(0.0728),
            },
            trade_multiplier: dec!(1.5),
            legs: dec!(2),
        }
    }
}

impl ArbCostModel {
    #[inline]
    pub fn gwei_per_gas(&self) -> Decimal {
        self.base_fee_gwei + self.priority_fee_gwei
    }

    /// USD cost of the estimated EVO gas usage.
    pub fn evo_cost_usd(&self) -> Decimal {
        self.est_evo_gas * self.gwei_per_gas() * self.usd_per_eth / self.gwei_per_eth
    }

    /// USD charged per arbitrage for the given tier.
    pub fn arb_cost_usd(&self, tier: GasTier) -> Decimal {
        let trade = match tier {
            GasTier::High => self.dex_trade.high,
            GasTier::Avg => self.dex_trade.avg,
            GasTier::Low => self.dex_trade.low,
            GasTier::Evo => return self.evo_cost_usd(),
        };
        trade * self.trade_multiplier * self.legs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tier_is_one_and_a_half_avg_trades_per_leg() {
        let model = ArbCostModel::default();
        assert_eq!(model.arb_cost_usd(GasTier::default()), dec!(0.372));
        assert_eq!(model.arb_cost_usd(GasTier::High), dec!(0.711));
        assert_eq!(model.arb_cost_usd(GasTier::Low), dec!(0.2184));
    }

    #[test]
    fn evo_cost_prices_gas_units() {
        let model = ArbCostModel::default();
        // 219806 gas * 0.1917 gwei * 1879.75 USD/ETH / 1e9 gwei/ETH
        let cost = model.evo_cost_usd();
        assert!(cost > dec!(0.0792) && cost < dec!(0.0793), "evo cost = {cost}");
        assert_eq!(model.arb_cost_usd(GasTier::Evo), cost);
    }
}
