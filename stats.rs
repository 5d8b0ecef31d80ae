//! Running totals of a simulation. Written only at commit points.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::{Result, SimError};
use crate::market::{ArbitrageTrade, VirtualOrderExecution};
use crate::precision::DecimalContext;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ArbitrageStats {
    pub swaps: u64,
    /// Y sold into the pool.
    pub y_sold: Decimal,
    /// X bought from the pool.
    pub x_received: Decimal,
    pub y_fees: Decimal,
    pub net_profit_usd: Decimal,
    pub gas_usd: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Y paid out to the long-term order.
    pub lt_proceeds: Decimal,
    /// X fees paid by the long-term order.
    pub lt_fees: Decimal,
    pub arbitrage: ArbitrageStats,
}

impl Statistics {
    pub fn record_virtual_execution(
        &mut self,
        exec: &VirtualOrderExecution,
        ctx: &DecimalContext,
    ) -> Result<()> {
        self.lt_proceeds = ctx.add(self.lt_proceeds, exec.buy_amount)?;
        self.lt_fees = ctx.add(self.lt_fees, exec.fee_amount)?;
        Ok(())
    }

    pub fn record_arbitrage(
        &mut self,
        trade: &ArbitrageTrade,
        net_profit: Decimal,
        gas_usd: Decimal,
        ctx: &DecimalContext,
    ) -> Result<()> {
        let arb = &mut self.arbitrage;
        arb.swaps = arb.swaps.checked_add(1).ok_or(SimError::Overflow("arbitrage count"))?;
        arb.y_sold = ctx.add(arb.y_sold, trade.sell_amount)?;
        arb.x_received = ctx.add(arb.x_received, trade.buy_amount)?;
        arb.y_fees = ctx.add(arb.y_fees, trade.fee_amount)?;
        arb.net_profit_usd = ctx.add(arb.net_profit_usd, net_profit)?;
        arb.gas_usd = ctx.add(arb.gas_usd, gas_usd)?;
        Ok(())
    }
}

/// Cost of the trade as a percentage of the amount sold:
/// `100 × (sold − proceeds) / sold`.
pub fn trade_cost_pct(sold: Decimal, proceeds: Decimal, ctx: &DecimalContext) -> Result<Decimal> {
    let shortfall = ctx.mul(dec!(100), ctx.sub(sold, proceeds)?)?;
    ctx.div(shortfall, sold, "trade cost")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::execute_virtual_orders;
    use crate::types::{Parameters, PoolState};

    #[test]
    fn trade_cost_is_percentage_shortfall() {
        let ctx = DecimalContext::default();
        assert_eq!(trade_cost_pct(dec!(1000), dec!(990), &ctx).unwrap(), dec!(1));
        assert_eq!(trade_cost_pct(dec!(1000), dec!(1000), &ctx).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn trade_cost_of_empty_order_is_degenerate() {
        let ctx = DecimalContext::default();
        assert!(matches!(
            trade_cost_pct(Decimal::ZERO, Decimal::ZERO, &ctx),
            Err(SimError::ArithmeticDegenerate { context: "trade cost", .. })
        ));
    }

    #[test]
    fn overflowing_total_is_an_error_not_a_panic() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let pool = PoolState::new(dec!(10000000), dec!(10000000)).unwrap();
        let exec = execute_virtual_orders(&pool, 0, 10, dec!(1000), &params, &ctx).unwrap();

        let mut stats = Statistics { lt_proceeds: Decimal::MAX, ..Statistics::default() };
        assert_eq!(stats.record_virtual_execution(&exec, &ctx), Err(SimError::Overflow("add")));

        let mut stats = Statistics::default();
        stats.record_virtual_execution(&exec, &ctx).unwrap();
        assert_eq!(stats.lt_proceeds, exec.buy_amount);
        assert_eq!(stats.lt_fees, exec.fee_amount);
    }
}
