//! Run records, the CSV results log, and the text report.

use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ReportError;
use crate::sim::{BlockOutcome, SimResult};

pub const RESULTS_SUMMARY_CSV: &str = "summary.csv";

const RULE: &str =
    "---------------------------------------------------------------------------------";

// ─── Run record ───────────────────────────────────────────────────────────────

/// Flat summary of one run: its parameters followed by its outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub st_fee: Decimal,
    pub lt_fee: Decimal,
    pub arb_threshold: Decimal,
    pub arb_cost: Decimal,
    pub initial_liquidity_usd: Decimal,
    pub final_liquidity_usd: Decimal,
    pub lt_sell_specified: Decimal,
    pub lt_sell_actual: Decimal,
    pub duration_intervals: u64,
    pub duration_sec: u64,
    pub sales_rate: Decimal,
    pub lt_sold: Decimal,
    pub lt_unsold: Decimal,
    pub lt_bought: Decimal,
    pub lt_fees_paid: Decimal,
    pub lt_trade_cost: Decimal,
    pub arbs: u64,
    pub arb_total_sold: Decimal,
    pub arb_total_bought: Decimal,
    pub arb_fees: Decimal,
    pub arb_gas: Decimal,
    pub arb_profit: Decimal,
}

impl RunSummary {
    pub fn from_result(result: &SimResult) -> Self {
        let arb = &result.stats.arbitrage;
        Self {
            st_fee: result.params.short_term_fee_rate,
            lt_fee: result.params.long_term_fee_rate,
            arb_threshold: result.params.arb_profit_threshold_usd,
            arb_cost: result.arb_cost,
            initial_liquidity_usd: result.initial_pool.liquidity(),
            final_liquidity_usd: result.pool.liquidity(),
            lt_sell_specified: result.params.lt_order_amount,
            lt_sell_actual: result.schedule.actual_amount,
            duration_intervals: result.params.duration_intervals,
            duration_sec: result.schedule.order_length_seconds,
            sales_rate: result.schedule.sales_rate,
            lt_sold: result.sold(),
            lt_unsold: result.order.remaining_to_sell,
            lt_bought: result.order.proceeds_received,
            lt_fees_paid: result.stats.lt_fees,
            lt_trade_cost: result.trade_cost_pct,
            arbs: arb.swaps,
            arb_total_sold: arb.y_sold,
            arb_total_bought: arb.x_received,
            arb_fees: arb.y_fees,
            arb_gas: arb.gas_usd,
            arb_profit: arb.net_profit_usd,
        }
    }

    /// Column names and rendered values, in log order.
    pub fn columns(&self) -> Vec<(&'static str, String)> {
        vec![
            ("stFee", self.st_fee.to_string()),
            ("ltFee", self.lt_fee.to_string()),
            ("arbThreshold", self.arb_threshold.to_string()),
            ("arbCost", self.arb_cost.to_string()),
            ("initialLiquidityUsd", self.initial_liquidity_usd.to_string()),
            ("finalLiquidityUsd", self.final_liquidity_usd.to_string()),
            ("ltSellSpecified", self.lt_sell_specified.to_string()),
            ("ltSellActual", self.lt_sell_actual.to_string()),
            ("durationIntervals", self.duration_intervals.to_string()),
            ("durationSec", self.duration_sec.to_string()),
            ("salesRate", self.sales_rate.to_string()),
            ("ltSold", self.lt_sold.to_string()),
            ("ltUnsold", self.lt_unsold.to_string()),
            ("ltBought", self.lt_bought.to_string()),
            ("ltFeesPaid", self.lt_fees_paid.to_string()),
            ("ltTradeCost", self.lt_trade_cost.to_string()),
            ("arbs", self.arbs.to_string()),
            ("arbTotalSold", self.arb_total_sold.to_string()),
            ("arbTotalBought", self.arb_total_bought.to_string()),
            ("arbFees", self.arb_fees.to_string()),
            ("arbGas", self.arb_gas.to_string()),
            ("arbProfit", self.arb_profit.to_string()),
        ]
    }
}

/// A summary identified by the SHA-256 of its JSON form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub data_id: String,
    #[serde(flatten)]
    pub summary: RunSummary,
}

impl RunRecord {
    pub fn new(summary: RunSummary) -> Result<Self, ReportError> {
        let data_id = content_hash(&summary)?;
        Ok(Self { data_id, summary })
    }

    pub fn from_result(result: &SimResult) -> Result<Self, ReportError> {
        Self::new(RunSummary::from_result(result))
    }

    pub fn header(&self) -> String {
        let mut names: Vec<&str> = self.summary.columns().iter().map(|(n, _)| *n).collect();
        names.push("dataId");
        names.join(", ")
    }

    pub fn row(&self) -> String {
        let mut values: Vec<String> = self.summary.columns().into_iter().map(|(_, v)| v).collect();
        values.push(self.data_id.clone());
        values.join(", ")
    }
}

/// Lowercase hex SHA-256 of the JSON serialization of `value`.
pub fn content_hash<T: Serialize>(value: &T) -> Result<String, ReportError> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

// ─── Results log ──────────────────────────────────────────────────────────────

/// Append-only CSV log with one row per run.
#[derive(Clone, Debug)]
pub struct ResultsLog {
    path: PathBuf,
}

impl ResultsLog {
    /// Log at `<dir>/summary.csv`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self { path: dir.as_ref().join(RESULTS_SUMMARY_CSV) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, writing the header first if the file is new.
    pub fn append(&self, record: &RunRecord) -> Result<(), ReportError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let new_file = !self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        if new_file {
            writeln!(writer, "{}", record.header())?;
        }
        writeln!(writer, "{}", record.row())?;
        writer.flush()?;
        Ok(())
    }
}

// ─── Text report ──────────────────────────────────────────────────────────────

pub fn pool_details(result: &SimResult) -> String {
    let p = &result.params;
    let mut out = String::new();
    let _ = writeln!(out, "Pool Details:\n{RULE}");
    let _ = writeln!(out, "Reserve {}: {}", p.token_x.symbol, result.initial_pool.reserve_x);
    let _ = writeln!(out, "Reserve {}: {}", p.token_y.symbol, result.initial_pool.reserve_y);
    let _ = writeln!(out, "LT Fee:         {} %", dec!(100) * p.long_term_fee_rate);
    let _ = writeln!(out, "ST Fee:         {} %", dec!(100) * p.short_term_fee_rate);
    let _ = writeln!(out, "Arb Threshold:  {} $USD", p.arb_profit_threshold_usd);
    let _ = writeln!(out, "Arb Cost:       {} $USD", result.arb_cost);
    out
}

pub fn trade_details(result: &SimResult) -> String {
    let x = &result.params.token_x.symbol;
    let s = &result.schedule;
    let mut out = String::new();
    let _ = writeln!(out, "Trade Details:\n{RULE}");
    let _ = writeln!(out, "Specified Sell: {} {x}", result.params.lt_order_amount);
    let _ = writeln!(out, "Actual Sell:    {} {x}", s.actual_amount);
    let _ = writeln!(out, "Duration:       {} seconds", s.order_length_seconds);
    let _ = writeln!(out, "Sales Rate:     {} {x} / second", s.sales_rate);
    out
}

/// Running totals as of the last committed arbitrage, if any.
pub fn last_arbitrage(result: &SimResult) -> Option<String> {
    let event = result.arbitrage_events().last()?;
    let x = &result.params.token_x.symbol;
    let y = &result.params.token_y.symbol;
    let trade = event.arbitrage.as_ref()?;
    let mut out = String::new();
    let _ = writeln!(out, "Last Arbitrage:\n{RULE}");
    let _ = writeln!(out, "Block Number:      {}", event.block_number);
    let _ = writeln!(out, "Block Time:        {} seconds", event.block_time);
    let _ = writeln!(out, "Remaining:         {} {x}", event.remaining_to_sell);
    let _ = writeln!(out, "Proceeds:          {} {y}", event.proceeds_received);
    let _ = writeln!(out, "Sell Amt:          {} {y}", trade.sell_amount);
    let _ = writeln!(out, "Buy Amount:        {} {x}", trade.buy_amount);
    let _ = writeln!(out, "Gross Profit:      {} {x}", trade.gross_profit);
    let _ = writeln!(out, "New Pool Price:    {} {x} / {y}", trade.pool_price);
    Some(out)
}

pub fn trade_result(result: &SimResult) -> String {
    let x = &result.params.token_x.symbol;
    let y = &result.params.token_y.symbol;
    let arb = &result.stats.arbitrage;
    let remaining = result.order.remaining_to_sell;
    let settled = remaining < result.schedule.sales_rate;
    let terminal = result
        .events
        .iter()
        .any(|e| e.outcome == BlockOutcome::TerminalSettlement);

    let mut out = String::new();
    let _ = writeln!(out, "Trade result\n{RULE}");
    let _ = writeln!(out, "Sold:         {} {x}", result.schedule.actual_amount);
    let _ = writeln!(
        out,
        "  Remaining:  {remaining} {x} {}",
        if settled { "(settled)" } else { "(UNSETTLED)" }
    );
    let _ = writeln!(out, "Bought:       {} {y}", result.order.proceeds_received);
    let _ = writeln!(out, "Trade Cost:   {} %", result.trade_cost_pct);
    let _ = writeln!(out, "Fees:         {} {x}", result.stats.lt_fees);
    let terminal_note = if terminal { " (+ terminal settlement)" } else { "" };
    let _ = writeln!(out, "Arbs:         {}{terminal_note}", arb.swaps);
    let _ = writeln!(out, "Arb sold:     {} {y}", arb.y_sold);
    let _ = writeln!(out, "Arb bought:   {} {x}", arb.x_received);
    let _ = writeln!(out, "Arb fees:     {} {y}", arb.y_fees);
    let _ = writeln!(out, "Arb profit:   {} $USD", arb.net_profit_usd);
    let _ = writeln!(out, "Arb gas:      {} $USD", arb.gas_usd);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::run_simulation;
    use crate::types::Parameters;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("twamm_sim_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn short_run() -> SimResult {
        let params = Parameters { duration_intervals: 0, ..Parameters::default() };
        run_simulation(&params).unwrap()
    }

    #[test]
    fn record_id_is_stable_and_content_addressed() {
        let result = short_run();
        let a = RunRecord::from_result(&result).unwrap();
        let b = RunRecord::from_result(&result).unwrap();
        assert_eq!(a.data_id, b.data_id);
        assert_eq!(a.data_id.len(), 64);

        let mut changed = a.summary.clone();
        changed.arbs += 1;
        assert_ne!(RunRecord::new(changed).unwrap().data_id, a.data_id);
    }

    #[test]
    fn header_and_row_line_up() {
        let record = RunRecord::from_result(&short_run()).unwrap();
        let header: Vec<String> = record.header().split(", ").map(str::to_string).collect();
        let row: Vec<String> = record.row().split(", ").map(str::to_string).collect();
        assert_eq!(header.len(), row.len());
        assert_eq!(header.first().map(String::as_str), Some("stFee"));
        assert_eq!(header.last().map(String::as_str), Some("dataId"));
        assert_eq!(row.last(), Some(&record.data_id));
    }

    #[test]
    fn log_writes_header_once() {
        let dir = scratch_dir("log_header");
        let log = ResultsLog::in_dir(&dir);
        let record = RunRecord::from_result(&short_run()).unwrap();

        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let contents = fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], record.header());
        assert_eq!(lines[1], record.row());
        assert_eq!(lines[2], record.row());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unwritable_destination_surfaces_io_error() {
        let dir = scratch_dir("log_blocked");
        fs::create_dir_all(&dir).unwrap();
        // A directory squatting on the log's file name cannot be opened for append.
        let log = ResultsLog::in_dir(&dir);
        fs::create_dir_all(log.path()).unwrap();

        let result = short_run();
        let record = RunRecord::from_result(&result).unwrap();
        assert!(matches!(log.append(&record), Err(ReportError::Io(_))));
        // The in-memory result is untouched and still reports.
        assert!(trade_result(&result).contains("Trade Cost"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn text_report_names_tokens() {
        let result = short_run();
        assert!(pool_details(&result).contains("Reserve X-USDC: 10000000"));
        assert!(trade_details(&result).contains("Duration:       300 seconds"));
        assert!(trade_result(&result).contains("(settled)"));
        assert!(last_arbitrage(&result).is_some());
    }
}
