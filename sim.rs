//! Block-stepped TWAMM simulation.
//!
//! Each block the long-term order is virtually executed up to the block time
//! and the profit-maximizing arbitrage against the resulting pool is sized.
//! When the arbitrage clears its cost and threshold, both trades are committed
//! together. Otherwise nothing changes, and the order keeps accruing sales
//! until a later block commits. The final block of the order always settles
//! the long-term execution, with or without an arbitrage.

use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, trace};

use crate::error::Result;
use crate::market::{
    execute_virtual_orders, optimal_arb_trade, ArbitrageTrade, VirtualOrderExecution,
};
use crate::precision::DecimalContext;
use crate::stats::{trade_cost_pct, Statistics};
use crate::types::{OrderProgress, OrderSchedule, Parameters, PoolState};

// ─── Block decisions ──────────────────────────────────────────────────────────

/// What the decision policy did with a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum BlockOutcome {
    /// The optimizer found no positive arbitrage. State unchanged.
    NoArbCandidate,
    /// An arbitrage was sized but did not clear cost plus threshold. State unchanged.
    Rejected,
    /// Long-term execution and arbitrage applied together.
    Committed,
    /// Last block of the order: long-term execution applied alone.
    TerminalSettlement,
}

/// A block whose outcome changed the simulation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SettlementEvent {
    pub block_number: u64,
    pub block_time: u64,
    pub outcome: BlockOutcome,
    pub execution: VirtualOrderExecution,
    pub arbitrage: Option<ArbitrageTrade>,
    pub net_profit: Option<Decimal>,
    pub pool_before: PoolState,
    pub pool_after: PoolState,
    pub remaining_to_sell: Decimal,
    pub proceeds_received: Decimal,
}

// ─── Simulation state ─────────────────────────────────────────────────────────

/// Everything a run mutates. Only the decision policy writes to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimContext {
    pub pool: PoolState,
    pub order: OrderProgress,
    pub stats: Statistics,
}

#[derive(Clone, Debug)]
pub struct Simulation {
    params: Parameters,
    ctx: DecimalContext,
    schedule: OrderSchedule,
    arb_cost: Decimal,
    initial_pool: PoolState,
    state: SimContext,
    events: Vec<SettlementEvent>,
}

/// Final state of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimResult {
    pub params: Parameters,
    pub schedule: OrderSchedule,
    pub arb_cost: Decimal,
    pub initial_pool: PoolState,
    pub pool: PoolState,
    pub order: OrderProgress,
    pub stats: Statistics,
    pub trade_cost_pct: Decimal,
    pub events: Vec<SettlementEvent>,
}

impl SimResult {
    /// Settlements that included an arbitrage.
    pub fn arbitrage_events(&self) -> impl Iterator<Item = &SettlementEvent> {
        self.events.iter().filter(|e| e.outcome == BlockOutcome::Committed)
    }

    /// X actually sold by the order.
    pub fn sold(&self) -> Decimal {
        self.schedule.actual_amount - self.order.remaining_to_sell
    }
}

impl Simulation {
    /// Validate `params` and set up a balanced pool with the order placed at time 0.
    pub fn new(params: Parameters) -> Result<Self> {
        params.validate()?;
        let ctx = params.decimal_context()?;
        let schedule = OrderSchedule::new(&params, &ctx, 0)?;
        let pool = PoolState::balanced(params.total_liquidity_usd, &ctx)?;
        let order = OrderProgress::new(&schedule);
        let arb_cost = params.arb_cost();

        Ok(Self {
            params,
            ctx,
            schedule,
            arb_cost,
            initial_pool: pool.clone(),
            state: SimContext { pool, order, stats: Statistics::default() },
            events: Vec::new(),
        })
    }

    pub fn schedule(&self) -> &OrderSchedule {
        &self.schedule
    }

    pub fn state(&self) -> &SimContext {
        &self.state
    }

    pub fn events(&self) -> &[SettlementEvent] {
        &self.events
    }

    #[inline]
    pub fn block_time(&self, block_number: u64) -> u64 {
        self.schedule.start_time + block_number * self.params.block_length_seconds
    }

    /// Evaluate one block and commit whatever the policy decides.
    pub fn step(&mut self, block_number: u64) -> Result<BlockOutcome> {
        let ctx = &self.ctx;
        let block_time = self.block_time(block_number);
        let pool_before = self.state.pool.clone();

        let exec = execute_virtual_orders(
            &pool_before,
            self.state.order.last_virtual_order_time,
            block_time,
            self.schedule.sales_rate,
            &self.params,
            ctx,
        )?;

        // Sized against the post-swap reserves before the LT fee is accrued.
        let candidate = optimal_arb_trade(
            exec.reserve_x_before_fee,
            exec.pool.reserve_y,
            &self.params,
            ctx,
        )?;

        if let Some(trade) = &candidate {
            let net_profit = ctx.sub(trade.gross_profit, self.arb_cost)?;
            trace!(
                block_number,
                sell = %trade.sell_amount,
                gross_profit = %trade.gross_profit,
                %net_profit,
                "arbitrage candidate"
            );
            if net_profit > self.params.arb_profit_threshold_usd {
                let pool_after = PoolState {
                    reserve_x: ctx.add(trade.pool.reserve_x, exec.fee_amount)?,
                    reserve_y: trade.pool.reserve_y,
                };
                self.commit(
                    block_number,
                    block_time,
                    BlockOutcome::Committed,
                    exec,
                    pool_before,
                    pool_after,
                    Some((trade.clone(), net_profit)),
                )?;
                return Ok(BlockOutcome::Committed);
            }
        } else {
            trace!(block_number, "no arbitrage candidate");
        }

        if block_number == self.schedule.order_length_blocks {
            let pool_after = exec.pool.clone();
            self.commit(
                block_number,
                block_time,
                BlockOutcome::TerminalSettlement,
                exec,
                pool_before,
                pool_after,
                None,
            )?;
            return Ok(BlockOutcome::TerminalSettlement);
        }

        Ok(if candidate.is_some() { BlockOutcome::Rejected } else { BlockOutcome::NoArbCandidate })
    }

    #[allow(clippy::too_many_arguments)]
    fn commit(
        &mut self,
        block_number: u64,
        block_time: u64,
        outcome: BlockOutcome,
        exec: VirtualOrderExecution,
        pool_before: PoolState,
        pool_after: PoolState,
        arbitrage: Option<(ArbitrageTrade, Decimal)>,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let remaining_to_sell = ctx.sub(self.state.order.remaining_to_sell, exec.sell_amount)?;
        let proceeds_received = ctx.add(self.state.order.proceeds_received, exec.buy_amount)?;
        let mut stats = self.state.stats.clone();
        stats.record_virtual_execution(&exec, ctx)?;
        if let Some((trade, net_profit)) = &arbitrage {
            stats.record_arbitrage(trade, *net_profit, self.arb_cost, ctx)?;
        }

        // Nothing below can fail.
        let order = &mut self.state.order;
        order.last_virtual_order_time = block_time;
        order.remaining_to_sell = remaining_to_sell;
        order.proceeds_received = proceeds_received;
        self.state.stats = stats;
        self.state.pool = pool_after.clone();

        debug!(
            block_number,
            ?outcome,
            sold = %exec.sell_amount,
            bought = %exec.buy_amount,
            remaining = %order.remaining_to_sell,
            reserve_x = %pool_after.reserve_x,
            reserve_y = %pool_after.reserve_y,
            "settled"
        );

        let (arbitrage, net_profit) = match arbitrage {
            Some((trade, profit)) => (Some(trade), Some(profit)),
            None => (None, None),
        };
        self.events.push(SettlementEvent {
            block_number,
            block_time,
            outcome,
            remaining_to_sell: order.remaining_to_sell,
            proceeds_received: order.proceeds_received,
            execution: exec,
            arbitrage,
            net_profit,
            pool_before,
            pool_after,
        });
        Ok(())
    }

    /// Step every block from 0 through the order's last block.
    pub fn run(mut self) -> Result<SimResult> {
        info!(
            liquidity = %self.params.total_liquidity_usd,
            order = %self.params.lt_order_amount,
            actual = %self.schedule.actual_amount,
            sales_rate = %self.schedule.sales_rate,
            blocks = self.schedule.order_length_blocks,
            arb_cost = %self.arb_cost,
            "starting simulation"
        );

        for block_number in 0..=self.schedule.order_length_blocks {
            self.step(block_number)?;
        }

        let trade_cost_pct = trade_cost_pct(
            self.schedule.actual_amount,
            self.state.order.proceeds_received,
            &self.ctx,
        )?;

        info!(
            arbs = self.state.stats.arbitrage.swaps,
            proceeds = %self.state.order.proceeds_received,
            unsold = %self.state.order.remaining_to_sell,
            %trade_cost_pct,
            "simulation complete"
        );

        Ok(SimResult {
            params: self.params,
            schedule: self.schedule,
            arb_cost: self.arb_cost,
            initial_pool: self.initial_pool,
            pool: self.state.pool,
            order: self.state.order,
            stats: self.state.stats,
            trade_cost_pct,
            events: self.events,
        })
    }
}

/// Run one complete simulation.
pub fn run_simulation(params: &Parameters) -> Result<SimResult> {
    Simulation::new(params.clone())?.run()
}

// ─── Parallel Multi-simulation Runner ────────────────────────────────────────

/// Run independent simulations in parallel. Results keep the input order.
pub fn run_parallel(param_sets: &[Parameters]) -> Vec<Result<SimResult>> {
    param_sets.par_iter().map(run_simulation).collect()
}
