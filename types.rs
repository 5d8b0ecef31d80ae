use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::gas::{ArbCostModel, GasTier};
use crate::precision::{DecimalContext, Rounding, DEFAULT_DECIMAL_PLACES, MAX_DECIMAL_PLACES};

/// Seconds per block.
pub const BLOCK_LENGTH_SECONDS: u64 = 2;

/// Seconds per order interval (5 minutes). Orders expire on interval boundaries.
pub const INTERVAL_SECONDS: u64 = 300;

/// Largest pool liquidity or order amount accepted. Squares of reserves this
/// size, as formed by the invariant and the arbitrage quadratic, stay inside
/// `Decimal`'s range of about 7.9e28.
pub const MAX_NOTIONAL_USD: Decimal = dec!(100000000000000);

// ─── Tokens ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub symbol: String,
    pub description: String,
    pub decimals: u32,
}

impl Token {
    pub fn new(symbol: &str, description: &str, decimals: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            description: description.to_string(),
            decimals,
        }
    }

    /// Asset sold by the long-term order.
    pub fn usdc_x() -> Self {
        Self::new("X-USDC", "USDC on Chain X", DEFAULT_DECIMAL_PLACES)
    }

    /// Asset bought by the long-term order.
    pub fn usdc_y() -> Self {
        Self::new("Y-USDC", "USDC on Chain Y", DEFAULT_DECIMAL_PLACES)
    }
}

// ─── Run parameters ───────────────────────────────────────────────────────────

/// Immutable configuration of one simulation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Pool value in USD, split evenly between both reserves.
    pub total_liquidity_usd: Decimal,
    /// Amount of X the long-term order sells.
    pub lt_order_amount: Decimal,
    /// Order intervals after the implicit protection interval.
    pub duration_intervals: u64,
    /// Fee charged on the arbitrageur's swap.
    pub short_term_fee_rate: Decimal,
    /// Fee charged on the long-term order's sales.
    pub long_term_fee_rate: Decimal,
    /// USD cost per arbitrage. `None` prices it with `gas_tier`.
    pub arb_cost_usd: Option<Decimal>,
    pub gas_tier: GasTier,
    /// Net profit an arbitrage must exceed to be executed.
    pub arb_profit_threshold_usd: Decimal,
    pub block_length_seconds: u64,
    pub interval_seconds: u64,
    pub token_x: Token,
    pub token_y: Token,
    /// Places kept after division and sqrt.
    pub decimal_places: u32,
    pub rounding: Rounding,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            total_liquidity_usd: dec!(20000000),
            lt_order_amount: dec!(1000000),
            duration_intervals: 2,
            short_term_fee_rate: dec!(0.00005),
            long_term_fee_rate: dec!(0.0001),
            arb_cost_usd: None,
            gas_tier: GasTier::Avg,
            arb_profit_threshold_usd: dec!(1),
            block_length_seconds: BLOCK_LENGTH_SECONDS,
            interval_seconds: INTERVAL_SECONDS,
            token_x: Token::usdc_x(),
            token_y: Token::usdc_y(),
            decimal_places: DEFAULT_DECIMAL_PLACES,
            rounding: Rounding::HalfCeil,
        }
    }
}

impl Parameters {
    /// Cost charged per arbitrage: the explicit override or the model's tier.
    pub fn arb_cost(&self) -> Decimal {
        self.arb_cost_usd
            .unwrap_or_else(|| ArbCostModel::default().arb_cost_usd(self.gas_tier))
    }

    pub fn decimal_context(&self) -> Result<DecimalContext> {
        DecimalContext::new(self.decimal_places, self.rounding)
    }

    /// Reject parameter sets the simulation cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.total_liquidity_usd <= Decimal::ZERO {
            return Err(SimError::invalid(
                "total_liquidity_usd",
                format!("must be positive, got {}", self.total_liquidity_usd),
            ));
        }
        if self.lt_order_amount <= Decimal::ZERO {
            return Err(SimError::invalid(
                "lt_order_amount",
                format!("must be positive, got {}", self.lt_order_amount),
            ));
        }
        for (name, amount) in [
            ("total_liquidity_usd", self.total_liquidity_usd),
            ("lt_order_amount", self.lt_order_amount),
        ] {
            if amount > MAX_NOTIONAL_USD {
                return Err(SimError::invalid(
                    name,
                    format!("{amount} exceeds the maximum of {MAX_NOTIONAL_USD}"),
                ));
            }
        }
        for (name, rate) in [
            ("short_term_fee_rate", self.short_term_fee_rate),
            ("long_term_fee_rate", self.long_term_fee_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(SimError::invalid(name, format!("must be in [0, 1), got {rate}")));
            }
        }
        if self.arb_cost() < Decimal::ZERO {
            return Err(SimError::invalid(
                "arb_cost_usd",
                format!("must not be negative, got {}", self.arb_cost()),
            ));
        }
        if self.block_length_seconds == 0 {
            return Err(SimError::invalid("block_length_seconds", "must be positive"));
        }
        if self.interval_seconds == 0 || self.interval_seconds % self.block_length_seconds != 0 {
            return Err(SimError::invalid(
                "interval_seconds",
                format!(
                    "must be a positive multiple of the block length ({}s), got {}",
                    self.block_length_seconds, self.interval_seconds
                ),
            ));
        }
        for (name, token) in [("token_x", &self.token_x), ("token_y", &self.token_y)] {
            if token.decimals > MAX_DECIMAL_PLACES {
                return Err(SimError::invalid(
                    name,
                    format!("{} decimals exceed {MAX_DECIMAL_PLACES}", token.decimals),
                ));
            }
        }
        self.decimal_context()?;
        Ok(())
    }
}

// ─── Order schedule (derived once per run) ────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderSchedule {
    pub start_time: u64,
    /// Last interval boundary at or before the start.
    pub last_expiry: u64,
    pub order_expiry: u64,
    pub order_length_seconds: u64,
    pub order_length_blocks: u64,
    /// X sold per second, truncated to X's decimals.
    pub sales_rate: Decimal,
    /// `sales_rate × order_length_seconds`; never above the requested amount.
    pub actual_amount: Decimal,
}

impl OrderSchedule {
    /// Derive the schedule of an order placed at `start_time`.
    ///
    /// The order always runs one interval longer than requested: the extra
    /// interval protects against a zero-length order.
    pub fn new(params: &Parameters, ctx: &DecimalContext, start_time: u64) -> Result<Self> {
        let interval = params.interval_seconds;
        if interval == 0 || params.block_length_seconds == 0 {
            return Err(SimError::invalid(
                "interval_seconds",
                "interval and block length must be positive",
            ));
        }
        let last_expiry = start_time - start_time % interval;
        let order_expiry = params
            .duration_intervals
            .checked_add(1)
            .and_then(|n| n.checked_mul(interval))
            .and_then(|len| len.checked_add(last_expiry))
            .ok_or(SimError::Overflow("order expiry"))?;
        let order_length_seconds = order_expiry - last_expiry;
        let order_length_blocks = order_length_seconds / params.block_length_seconds;

        let length = Decimal::from(order_length_seconds);
        let x_decimals = params.token_x.decimals;
        let raw_rate = params
            .lt_order_amount
            .checked_div(length)
            .ok_or(SimError::Overflow("sales rate"))?;
        let sales_rate = Rounding::TowardZero.apply(raw_rate, x_decimals);
        if sales_rate.is_zero() {
            return Err(SimError::degenerate(
                "sales rate",
                format!(
                    "{} over {order_length_seconds}s rounds to zero at {x_decimals} decimals",
                    params.lt_order_amount
                ),
            ));
        }
        let actual_amount = ctx.to_fixed(ctx.mul(sales_rate, length)?, x_decimals);

        Ok(Self {
            start_time,
            last_expiry,
            order_expiry,
            order_length_seconds,
            order_length_blocks,
            sales_rate,
            actual_amount,
        })
    }
}

// ─── Mutable simulation state ─────────────────────────────────────────────────

/// Reserves of the constant-product pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolState {
    pub reserve_x: Decimal,
    pub reserve_y: Decimal,
}

impl PoolState {
    pub fn new(reserve_x: Decimal, reserve_y: Decimal) -> Result<Self> {
        if reserve_x <= Decimal::ZERO || reserve_y <= Decimal::ZERO {
            return Err(SimError::degenerate(
                "pool reserves",
                format!("reserves must be positive, got x={reserve_x} y={reserve_y}"),
            ));
        }
        Ok(Self { reserve_x, reserve_y })
    }

    /// Pool holding `total_usd` split evenly, both assets priced at $1.
    pub fn balanced(total_usd: Decimal, ctx: &DecimalContext) -> Result<Self> {
        let half = ctx.div(total_usd, dec!(2), "initial reserves")?;
        Self::new(half, half)
    }

    /// `reserve_x × reserve_y`, recomputed from the current reserves.
    pub fn invariant(&self, ctx: &DecimalContext) -> Result<Decimal> {
        ctx.mul(self.reserve_x, self.reserve_y)
    }

    pub fn liquidity(&self) -> Decimal {
        self.reserve_x + self.reserve_y
    }
}

/// Progress of the long-term order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderProgress {
    pub remaining_to_sell: Decimal,
    pub proceeds_received: Decimal,
    /// Advances only when a virtual execution is committed.
    pub last_virtual_order_time: u64,
}

impl OrderProgress {
    pub fn new(schedule: &OrderSchedule) -> Self {
        Self {
            remaining_to_sell: schedule.actual_amount,
            proceeds_received: Decimal::ZERO,
            last_virtual_order_time: schedule.start_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(params: &Parameters) -> OrderSchedule {
        let ctx = params.decimal_context().unwrap();
        OrderSchedule::new(params, &ctx, 0).unwrap()
    }

    #[test]
    fn default_schedule_runs_three_intervals() {
        let s = schedule(&Parameters::default());
        assert_eq!(s.order_expiry, 900);
        assert_eq!(s.order_length_seconds, 900);
        assert_eq!(s.order_length_blocks, 450);
        assert_eq!(s.sales_rate, dec!(1111.111111111111111111));
        assert!(s.actual_amount <= dec!(1000000));
        assert_eq!(s.actual_amount, dec!(999999.9999999999999999));
    }

    #[test]
    fn actual_amount_never_exceeds_request() {
        // 1_000_000 / 600 = 1666.66..., which half-ceil would round up
        let params = Parameters { duration_intervals: 1, ..Parameters::default() };
        let s = schedule(&params);
        assert!(s.actual_amount <= params.lt_order_amount);
        let gap = params.lt_order_amount - s.actual_amount;
        assert!(gap <= Decimal::new(1, 18) * Decimal::from(s.order_length_seconds));
    }

    #[test]
    fn start_mid_interval_expires_on_boundary() {
        let params = Parameters::default();
        let ctx = params.decimal_context().unwrap();
        let s = OrderSchedule::new(&params, &ctx, 1_000).unwrap();
        assert_eq!(s.last_expiry, 900);
        assert_eq!(s.order_expiry, 1_800);
        assert_eq!(s.order_length_seconds, 900);
    }

    #[test]
    fn zero_intervals_keeps_protection_interval() {
        let params = Parameters { duration_intervals: 0, ..Parameters::default() };
        let s = schedule(&params);
        assert_eq!(s.order_length_blocks, INTERVAL_SECONDS / BLOCK_LENGTH_SECONDS);
    }

    #[test]
    fn validate_rejects_non_positive_inputs() {
        let bad_liquidity =
            Parameters { total_liquidity_usd: Decimal::ZERO, ..Parameters::default() };
        assert!(matches!(
            bad_liquidity.validate(),
            Err(SimError::InvalidParameter { name: "total_liquidity_usd", .. })
        ));

        let bad_amount = Parameters { lt_order_amount: dec!(-5), ..Parameters::default() };
        assert!(matches!(
            bad_amount.validate(),
            Err(SimError::InvalidParameter { name: "lt_order_amount", .. })
        ));

        let bad_interval = Parameters { interval_seconds: 301, ..Parameters::default() };
        assert!(matches!(
            bad_interval.validate(),
            Err(SimError::InvalidParameter { name: "interval_seconds", .. })
        ));

        assert!(Parameters::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_amounts_that_would_overflow_the_invariant() {
        let huge_pool = Parameters {
            total_liquidity_usd: dec!(2000000000000000),
            ..Parameters::default()
        };
        assert!(matches!(
            huge_pool.validate(),
            Err(SimError::InvalidParameter { name: "total_liquidity_usd", .. })
        ));

        let huge_order = Parameters {
            lt_order_amount: dec!(2000000000000000),
            ..Parameters::default()
        };
        assert!(matches!(
            huge_order.validate(),
            Err(SimError::InvalidParameter { name: "lt_order_amount", .. })
        ));

        let at_limit =
            Parameters { total_liquidity_usd: MAX_NOTIONAL_USD, ..Parameters::default() };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn dust_order_has_degenerate_sales_rate() {
        let params = Parameters {
            lt_order_amount: dec!(0.000001),
            token_x: Token::new("X-USDC", "USDC on Chain X", 6),
            ..Parameters::default()
        };
        let ctx = params.decimal_context().unwrap();
        assert!(matches!(
            OrderSchedule::new(&params, &ctx, 0),
            Err(SimError::ArithmeticDegenerate { context: "sales rate", .. })
        ));
    }

    #[test]
    fn explicit_arb_cost_overrides_model() {
        let params = Parameters { arb_cost_usd: Some(dec!(5)), ..Parameters::default() };
        assert_eq!(params.arb_cost(), dec!(5));
        assert_eq!(Parameters::default().arb_cost(), dec!(0.372));
    }

    #[test]
    fn parameters_load_from_partial_toml() {
        let params: Parameters = toml::from_str(
            "total_liquidity_usd = 5000000\nduration_intervals = 4\nrounding = \"half-even\"\n",
        )
        .unwrap();
        assert_eq!(params.total_liquidity_usd, dec!(5000000));
        assert_eq!(params.duration_intervals, 4);
        assert_eq!(params.rounding, Rounding::HalfEven);
        assert_eq!(params.lt_order_amount, dec!(1000000));
    }
}
