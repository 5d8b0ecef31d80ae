use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::{Result, SimError};
use crate::precision::DecimalContext;
use crate::types::{Parameters, PoolState};

// ─── Virtual Order Execution ──────────────────────────────────────────────────

/// Hypothetical effect of executing the long-term order up to a block.
///
/// Nothing here is applied to the pool until the decision policy commits it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VirtualOrderExecution {
    pub elapsed_seconds: u64,
    /// Product of the reserves the swap was priced against.
    pub invariant: Decimal,
    /// X sold since the last committed execution (fee included).
    pub sell_amount: Decimal,
    pub fee_amount: Decimal,
    pub sell_amount_less_fee: Decimal,
    /// Y paid out to the order.
    pub buy_amount: Decimal,
    /// X per Y paid by the order; `None` when nothing was bought.
    pub effective_price: Option<Decimal>,
    /// X reserve after the swap but before the fee is added to it.
    pub reserve_x_before_fee: Decimal,
    /// Reserves after the swap with the fee accrued to liquidity providers.
    pub pool: PoolState,
    /// X per Y after the execution.
    pub pool_price: Decimal,
}

/// Execute the long-term order's sales between `last_virtual_order_time` and
/// `block_time` against `pool`.
///
/// The invariant is taken from the reserves as they are now; the fee goes back
/// into the X reserve after the swap, so the product grows from step to step.
pub fn execute_virtual_orders(
    pool: &PoolState,
    last_virtual_order_time: u64,
    block_time: u64,
    sales_rate: Decimal,
    params: &Parameters,
    ctx: &DecimalContext,
) -> Result<VirtualOrderExecution> {
    let x_dec = params.token_x.decimals;
    let y_dec = params.token_y.decimals;

    let elapsed_seconds = block_time.checked_sub(last_virtual_order_time).ok_or_else(|| {
        SimError::degenerate(
            "virtual order execution",
            format!("block time {block_time} precedes last execution {last_virtual_order_time}"),
        )
    })?;

    let k = pool.invariant(ctx)?;
    let sell_amount = ctx.to_fixed(ctx.mul(sales_rate, Decimal::from(elapsed_seconds))?, x_dec);
    let fee_amount = ctx.to_fixed(ctx.mul(sell_amount, params.long_term_fee_rate)?, x_dec);
    let sell_amount_less_fee = ctx.to_fixed(ctx.sub(sell_amount, fee_amount)?, x_dec);

    let reserve_x_before_fee = ctx.add(pool.reserve_x, sell_amount_less_fee)?;
    let reserve_y = ctx.div(k, reserve_x_before_fee, "virtual order execution")?;
    let buy_amount = ctx.to_fixed(ctx.sub(pool.reserve_y, reserve_y)?, y_dec);
    let effective_price = if buy_amount.is_zero() {
        None
    } else {
        Some(ctx.to_fixed(ctx.div(sell_amount, buy_amount, "lt effective price")?, x_dec))
    };

    let reserve_x = ctx.add(reserve_x_before_fee, fee_amount)?;
    let pool_price = ctx.to_fixed(ctx.div(reserve_x, reserve_y, "lt pool price")?, x_dec);

    Ok(VirtualOrderExecution {
        elapsed_seconds,
        invariant: k,
        sell_amount,
        fee_amount,
        sell_amount_less_fee,
        buy_amount,
        effective_price,
        reserve_x_before_fee,
        pool: PoolState { reserve_x, reserve_y },
        pool_price,
    })
}

// ─── Arbitrage ────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QuadraticRoots {
    pub plus: Decimal,
    pub minus: Decimal,
}

impl QuadraticRoots {
    /// Larger root by value.
    #[inline]
    pub fn larger(&self) -> Decimal {
        self.plus.max(self.minus)
    }
}

/// Real roots of `a·y² + b·y + c = 0`, or `None` when the discriminant is negative.
pub fn quadratic_roots(
    a: Decimal,
    b: Decimal,
    c: Decimal,
    ctx: &DecimalContext,
) -> Result<Option<QuadraticRoots>> {
    let discriminant = ctx.sub(ctx.mul(b, b)?, ctx.mul(ctx.mul(dec!(4), a)?, c)?)?;
    let Some(sqrt_term) = ctx.sqrt(discriminant) else {
        return Ok(None);
    };
    let two_a = ctx.mul(dec!(2), a)?;
    let plus = ctx.div(ctx.sub(sqrt_term, b)?, two_a, "quadratic root")?;
    let minus = ctx.div(ctx.sub(-b, sqrt_term)?, two_a, "quadratic root")?;
    Ok(Some(QuadraticRoots { plus, minus }))
}

/// Profit-maximizing arbitrage that sells Y into the pool for X.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArbitrageTrade {
    pub roots: QuadraticRoots,
    /// Y sold (fee included).
    pub sell_amount: Decimal,
    pub fee_amount: Decimal,
    pub sell_amount_less_fee: Decimal,
    /// X received.
    pub buy_amount: Decimal,
    /// Y per X paid by the arbitrageur; `None` when nothing was bought.
    pub effective_price: Option<Decimal>,
    /// `buy_amount − sell_amount`, valuing X and Y at par.
    pub gross_profit: Decimal,
    /// Reserves after the arbitrage with its fee accrued.
    pub pool: PoolState,
    pub pool_price: Decimal,
}

/// Size the arbitrage against reserves `(old_x, old_y)` in closed form.
///
/// Selling `y` of Y with `m = 1 − fee` yields profit
///
/// ```text
/// p(y) = old_x − (m·y² + old_y·y + k) / (old_y + m·y),   k = old_x·old_y
/// ```
///
/// and `dp/dy = 0` reduces to `m²·y² + 2·old_y·m·y + old_y² − k·m = 0`.
/// The larger root is the candidate. Pricing both assets at par only holds
/// for a pegged pair; there is no external price term.
///
/// Returns `None` when no positive sell amount exists.
pub fn optimal_arb_trade(
    old_x: Decimal,
    old_y: Decimal,
    params: &Parameters,
    ctx: &DecimalContext,
) -> Result<Option<ArbitrageTrade>> {
    let x_dec = params.token_x.decimals;
    let y_dec = params.token_y.decimals;
    let fee = params.short_term_fee_rate;

    let m = ctx.sub(Decimal::ONE, fee)?;
    let k = ctx.mul(old_x, old_y)?;
    let a = ctx.mul(m, m)?;
    let b = ctx.mul(ctx.mul(dec!(2), old_y)?, m)?;
    let c = ctx.sub(ctx.mul(old_y, old_y)?, ctx.mul(k, m)?)?;

    let Some(roots) = quadratic_roots(a, b, c, ctx)? else {
        return Ok(None);
    };
    let sell_amount = ctx.to_fixed(roots.larger(), y_dec);
    if sell_amount <= Decimal::ZERO {
        return Ok(None);
    }

    let fee_amount = ctx.to_fixed(ctx.mul(sell_amount, fee)?, y_dec);
    let sell_amount_less_fee = ctx.to_fixed(ctx.sub(sell_amount, fee_amount)?, y_dec);
    let reserve_y_before_fee = ctx.add(old_y, sell_amount_less_fee)?;
    let reserve_x = ctx.div(k, reserve_y_before_fee, "arbitrage")?;
    let buy_amount = ctx.to_fixed(ctx.sub(old_x, reserve_x)?, x_dec);
    let effective_price = if buy_amount.is_zero() {
        None
    } else {
        Some(ctx.to_fixed(ctx.div(sell_amount, buy_amount, "arb effective price")?, y_dec))
    };
    let gross_profit = ctx.to_fixed(ctx.sub(buy_amount, sell_amount)?, x_dec);

    let reserve_y = ctx.add(reserve_y_before_fee, fee_amount)?;
    let pool_price = ctx.to_fixed(ctx.div(reserve_x, reserve_y, "arb pool price")?, x_dec);

    Ok(Some(ArbitrageTrade {
        roots,
        sell_amount,
        fee_amount,
        sell_amount_less_fee,
        buy_amount,
        effective_price,
        gross_profit,
        pool: PoolState { reserve_x, reserve_y },
        pool_price,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced_pool() -> PoolState {
        PoolState::new(dec!(10000000), dec!(10000000)).unwrap()
    }

    #[test]
    fn zero_elapsed_time_is_a_no_op() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let pool = balanced_pool();
        let exec = execute_virtual_orders(&pool, 10, 10, dec!(1111), &params, &ctx).unwrap();
        assert_eq!(exec.sell_amount, Decimal::ZERO);
        assert_eq!(exec.buy_amount, Decimal::ZERO);
        assert_eq!(exec.effective_price, None);
        assert_eq!(exec.pool, pool);
        assert_eq!(exec.pool_price, Decimal::ONE);
    }

    #[test]
    fn virtual_execution_prices_net_of_fee_and_accrues_fee() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let pool = balanced_pool();
        let exec = execute_virtual_orders(&pool, 0, 10, dec!(1000), &params, &ctx).unwrap();

        assert_eq!(exec.elapsed_seconds, 10);
        assert_eq!(exec.sell_amount, dec!(10000));
        assert_eq!(exec.fee_amount, dec!(1));
        assert_eq!(exec.sell_amount_less_fee, dec!(9999));
        assert_eq!(exec.reserve_x_before_fee, dec!(10009999));
        assert_eq!(exec.pool.reserve_x, dec!(10010000));

        // buy = y − k / (x + net)
        let expected_buy = dec!(10000000) - dec!(100000000000000) / dec!(10009999);
        assert!((exec.buy_amount - expected_buy).abs() < dec!(0.000000000001));
        assert!(exec.buy_amount < exec.sell_amount_less_fee);
        assert!(exec.pool_price > Decimal::ONE);
        assert!(exec.effective_price.unwrap() > Decimal::ONE);
    }

    #[test]
    fn time_running_backwards_is_degenerate() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let err = execute_virtual_orders(&balanced_pool(), 20, 10, dec!(1), &params, &ctx);
        assert!(matches!(err, Err(SimError::ArithmeticDegenerate { .. })));
    }

    #[test]
    fn quadratic_roots_of_known_polynomial() {
        let ctx = DecimalContext::default();
        // y² − 3y + 2 = (y − 1)(y − 2)
        let roots = quadratic_roots(dec!(1), dec!(-3), dec!(2), &ctx).unwrap().unwrap();
        assert_eq!(roots.plus, dec!(2));
        assert_eq!(roots.minus, dec!(1));
        assert_eq!(roots.larger(), dec!(2));
    }

    #[test]
    fn negative_discriminant_has_no_roots() {
        let ctx = DecimalContext::default();
        assert_eq!(quadratic_roots(dec!(1), dec!(0), dec!(1), &ctx).unwrap(), None);
    }

    #[test]
    fn balanced_pool_has_no_arbitrage() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let trade = optimal_arb_trade(dec!(10000000), dec!(10000000), &params, &ctx).unwrap();
        assert_eq!(trade, None);
    }

    #[test]
    fn skewed_pool_yields_profitable_arbitrage() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        // X is cheap in the pool: sell Y, buy X.
        let old_x = dec!(10100000);
        let old_y = dec!(9900990.099009900990099010);
        let trade = optimal_arb_trade(old_x, old_y, &params, &ctx).unwrap().unwrap();

        assert!(trade.sell_amount > Decimal::ZERO);
        assert!(trade.gross_profit > Decimal::ZERO, "profit = {}", trade.gross_profit);
        assert_eq!(trade.gross_profit, trade.buy_amount - trade.sell_amount);
        assert_eq!(trade.fee_amount, ctx.to_fixed(trade.sell_amount * dec!(0.00005), 18));

        // The arbitrage pulls the price back toward par.
        assert!(trade.pool.reserve_x < old_x);
        assert!(trade.pool.reserve_y > old_y);
        let skew_before = (old_x - old_y).abs();
        let skew_after = (trade.pool.reserve_x - trade.pool.reserve_y).abs();
        assert!(skew_after < skew_before);
    }

    #[test]
    fn optimal_size_beats_neighbouring_sizes() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let old_x = dec!(10050000);
        let old_y = dec!(9950248.756218905472636816);
        let trade = optimal_arb_trade(old_x, old_y, &params, &ctx).unwrap().unwrap();

        let k = old_x * old_y;
        let m = Decimal::ONE - params.short_term_fee_rate;
        let profit = |y: Decimal| old_x - k / (old_y + m * y) - y;
        let best = profit(trade.sell_amount);
        assert!(best >= profit(trade.sell_amount * dec!(0.9)));
        assert!(best >= profit(trade.sell_amount * dec!(1.1)));
    }
}
