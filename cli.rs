use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use twamm_sim::gas::GasTier;
use twamm_sim::precision::Rounding;
use twamm_sim::report::{
	last_arbitrage, pool_details, trade_details, trade_result, ResultsLog, RunRecord,
};
use twamm_sim::sim::{run_parallel, run_simulation};
use twamm_sim::types::Parameters;

#[derive(Parser)]
#[command(
	name = "twamm-sim",
	about = "Simulate a TWAMM long-term order against a pool with arbitrage"
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Run one simulation and append its record to the results log.
	Run {
		#[command(flatten)]
		params: ParamArgs,
		#[command(flatten)]
		output: OutputArgs,
		/// Also print the run record as JSON.
		#[arg(long)]
		json: bool,
	},
	/// Run the cartesian product of the given lists in parallel.
	Sweep {
		#[command(flatten)]
		params: ParamArgs,
		#[command(flatten)]
		output: OutputArgs,
		#[arg(long, value_delimiter = ',')]
		liquidities: Vec<Decimal>,
		#[arg(long, value_delimiter = ',')]
		orders: Vec<Decimal>,
		#[arg(long, value_delimiter = ',')]
		durations: Vec<u64>,
		#[arg(long, value_delimiter = ',')]
		thresholds: Vec<Decimal>,
	},
}

/// Parameter sources, highest priority first: flags, environment, `--config`, defaults.
#[derive(Args)]
struct ParamArgs {
	/// TOML file with any subset of the run parameters.
	#[arg(long)]
	config: Option<PathBuf>,
	#[arg(long, env = "LIQUIDITY_USD")]
	liquidity_usd: Option<Decimal>,
	#[arg(long, env = "LT_TRADE_USD")]
	lt_trade_usd: Option<Decimal>,
	#[arg(long, env = "DURATION_INTERVALS")]
	duration_intervals: Option<u64>,
	#[arg(long, env = "SWAP_FEE")]
	swap_fee: Option<Decimal>,
	#[arg(long, env = "LT_SWAP_FEE")]
	lt_swap_fee: Option<Decimal>,
	#[arg(long, env = "ARB_COST_USD")]
	arb_cost_usd: Option<Decimal>,
	#[arg(long, value_enum)]
	gas_tier: Option<GasTier>,
	#[arg(long, env = "ARB_THRESHOLD_USD")]
	arb_threshold_usd: Option<Decimal>,
	#[arg(long)]
	decimal_places: Option<u32>,
	#[arg(long, value_enum)]
	rounding: Option<Rounding>,
}

impl ParamArgs {
	fn resolve(&self) -> Result<Parameters> {
		let mut params = match &self.config {
			Some(path) => load_config(path)?,
			None => Parameters::default(),
		};
		if let Some(v) = self.liquidity_usd {
			params.total_liquidity_usd = v;
		}
		if let Some(v) = self.lt_trade_usd {
			params.lt_order_amount = v;
		}
		if let Some(v) = self.duration_intervals {
			params.duration_intervals = v;
		}
		if let Some(v) = self.swap_fee {
			params.short_term_fee_rate = v;
		}
		if let Some(v) = self.lt_swap_fee {
			params.long_term_fee_rate = v;
		}
		if let Some(v) = self.arb_cost_usd {
			params.arb_cost_usd = Some(v);
		}
		if let Some(v) = self.gas_tier {
			params.gas_tier = v;
		}
		if let Some(v) = self.arb_threshold_usd {
			params.arb_profit_threshold_usd = v;
		}
		if let Some(v) = self.decimal_places {
			params.decimal_places = v;
		}
		if let Some(v) = self.rounding {
			params.rounding = v;
		}
		params.validate()?;
		Ok(params)
	}
}

#[derive(Args)]
struct OutputArgs {
	/// Directory holding summary.csv.
	#[arg(long, env = "RESULTS_DIR", default_value = "simulations/L2-USDT")]
	results_dir: PathBuf,
	/// Do not append to the results log.
	#[arg(long)]
	no_save: bool,
}

fn main() -> Result<()> {
	dotenvy::dotenv().ok();
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let cli = Cli::parse();
	match cli.command {
		Commands::Run { params, output, json } => run_cmd(&params, &output, json),
		Commands::Sweep {
			params,
			output,
			liquidities,
			orders,
			durations,
			thresholds,
		} => sweep_cmd(&params, &output, &liquidities, &orders, &durations, &thresholds),
	}
}

fn load_config(path: &Path) -> Result<Parameters> {
	let text = fs::read_to_string(path)
		.with_context(|| format!("failed to read config file {}", path.display()))?;
	toml::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
}

fn run_cmd(args: &ParamArgs, output: &OutputArgs, json: bool) -> Result<()> {
	let params = args.resolve()?;
	let result = run_simulation(&params).context("simulation failed")?;

	println!("{}", pool_details(&result));
	println!("{}", trade_details(&result));
	if let Some(arb) = last_arbitrage(&result) {
		println!("{arb}");
	}
	println!("{}", trade_result(&result));

	let record = RunRecord::from_result(&result)?;
	if json {
		println!("{}", serde_json::to_string_pretty(&record)?);
	}
	if !output.no_save {
		let log = ResultsLog::in_dir(&output.results_dir);
		log.append(&record)
			.with_context(|| format!("failed to append to {}", log.path().display()))?;
		info!(data_id = %record.data_id, path = %log.path().display(), "recorded run");
	}
	Ok(())
}

fn sweep_cmd(
	args: &ParamArgs,
	output: &OutputArgs,
	liquidities: &[Decimal],
	orders: &[Decimal],
	durations: &[u64],
	thresholds: &[Decimal],
) -> Result<()> {
	let base = args.resolve()?;
	let or_base =
		|list: &[Decimal], v: Decimal| if list.is_empty() { vec![v] } else { list.to_vec() };
	let liquidities = or_base(liquidities, base.total_liquidity_usd);
	let orders = or_base(orders, base.lt_order_amount);
	let thresholds = or_base(thresholds, base.arb_profit_threshold_usd);
	let durations = if durations.is_empty() {
		vec![base.duration_intervals]
	} else {
		durations.to_vec()
	};

	let mut sets = Vec::new();
	for &liquidity in &liquidities {
		for &order in &orders {
			for &duration in &durations {
				for &threshold in &thresholds {
					sets.push(Parameters {
						total_liquidity_usd: liquidity,
						lt_order_amount: order,
						duration_intervals: duration,
						arb_profit_threshold_usd: threshold,
						..base.clone()
					});
				}
			}
		}
	}
	info!(runs = sets.len(), "starting sweep");

	let log = ResultsLog::in_dir(&output.results_dir);
	let mut failures = 0usize;

	println!("\n     Liquidity          Order  Int  Threshold   Arbs  Trade Cost %        Arb Profit");
	println!("-------------------------------------------------------------------------------------");
	for (params, outcome) in sets.iter().zip(run_parallel(&sets)) {
		let result = match outcome {
			Ok(result) => result,
			Err(e) => {
				error!(
					liquidity = %params.total_liquidity_usd,
					order = %params.lt_order_amount,
					duration = params.duration_intervals,
					"run failed: {e}"
				);
				failures += 1;
				continue;
			}
		};
		println!(
			"{:>14} {:>14} {:>4} {:>10} {:>6} {:>13.6} {:>17.6}",
			params.total_liquidity_usd,
			params.lt_order_amount,
			params.duration_intervals,
			params.arb_profit_threshold_usd,
			result.stats.arbitrage.swaps,
			result.trade_cost_pct,
			result.stats.arbitrage.net_profit_usd,
		);
		if !output.no_save {
			let record = RunRecord::from_result(&result)?;
			log.append(&record)
				.with_context(|| format!("failed to append to {}", log.path().display()))?;
		}
	}

	if failures > 0 {
		bail!("{failures} of {} runs failed", sets.len());
	}
	if !output.no_save {
		println!("\nResults appended to {}", log.path().display());
	}
	Ok(())
}
