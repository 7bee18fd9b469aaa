use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use grid_backtester::config::{GridSpec, InitialPriceSpec, PriceSpec, StrategyConfig};
use grid_backtester::data::{self, TimeWindow};
use grid_backtester::engine::{RunResult, SimulationEngine};
use grid_backtester::optimizer::{self, DEFAULT_CANDIDATE_GRID_LEVELS};
use grid_backtester::report;

#[derive(Parser, Debug)]
#[command(author, version, about = "Grid trading backtester with grid-density optimizer")]
struct Args {
    /// CSV with a timestamp column and a close column.
    #[arg(long, conflicts_with = "synthetic")]
    data_file: Option<PathBuf>,
    /// Use a seeded random walk instead of a data file.
    #[arg(long)]
    synthetic: bool,
    #[arg(long, default_value_t = 20260226)]
    seed: u64,
    #[arg(long, default_value_t = 5_000)]
    bars: usize,
    #[arg(long, default_value_t = 0.004)]
    volatility: f64,

    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,

    /// Absolute price, or `first` for the first close in the window.
    #[arg(long, default_value = "first")]
    initial_price: InitialPriceSpec,
    #[arg(long, default_value = "10%")]
    lower_limit: PriceSpec,
    #[arg(long, default_value = "10%")]
    upper_limit: PriceSpec,
    #[arg(long, default_value = "15%")]
    lower_stop_loss: PriceSpec,
    #[arg(long, default_value = "15%")]
    upper_stop_loss: PriceSpec,
    #[arg(long)]
    no_stop_loss: bool,
    /// Level count, or spacing as a percentage of the initial price.
    #[arg(long, default_value = "20")]
    grid: GridSpec,
    #[arg(long, default_value_t = 1_000.0)]
    capital: f64,
    #[arg(long, default_value_t = 1.0)]
    leverage: f64,

    #[arg(long)]
    optimize: bool,
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_CANDIDATE_GRID_LEVELS.to_vec())]
    candidates: Vec<u32>,

    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    trades_csv: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let filter = std::env::var("GRID_LOG").unwrap_or_else(|_| log_level.to_string());
    let env_filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
    Ok(())
}

fn parse_bound(raw: &Option<String>, name: &str) -> Result<Option<chrono::DateTime<Utc>>> {
    match raw {
        None => Ok(None),
        Some(s) => data::parse_timestamp(s)
            .map(Some)
            .with_context(|| format!("--{name}: unrecognised date {s:?}")),
    }
}

fn print_run(label: &str, grid_levels: u32, r: &RunResult) {
    println!(
        "[{label}] grid_levels={} trades={} open={} realized={:.3} mtm={:.3} cost={:.3} net={:.3} roi={:.2}%",
        grid_levels,
        r.trades.len(),
        r.open_position_count,
        r.total_realized_pnl,
        r.mark_to_market_value,
        r.total_transaction_cost,
        r.net_pnl,
        r.roi
    );
    if r.stop_loss.triggered {
        println!(
            "[{label}] stop-loss triggered at {} price={:.2}",
            r.stop_loss
                .at_timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            r.stop_loss.at_price.unwrap_or(f64::NAN)
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    let (source, raw) = if let Some(path) = &args.data_file {
        (path.display().to_string(), data::load_series_csv(path)?)
    } else if args.synthetic {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .context("invalid synthetic start")?;
        let series = data::random_walk(
            args.seed,
            start,
            Duration::minutes(1),
            args.bars,
            100.0,
            args.volatility,
        );
        (format!("synthetic(seed={})", args.seed), series)
    } else {
        bail!("either --data-file or --synthetic is required");
    };

    let window = TimeWindow {
        start: parse_bound(&args.start, "start")?,
        end: parse_bound(&args.end, "end")?,
    };
    let windowed = data::filter_series(&raw, &window, None);

    let cfg = StrategyConfig {
        initial_price: args.initial_price,
        lower_limit: args.lower_limit,
        upper_limit: args.upper_limit,
        grid: args.grid,
        lower_stop_loss: args.lower_stop_loss,
        upper_stop_loss: args.upper_stop_loss,
        stop_loss_enabled: !args.no_stop_loss,
        initial_capital: args.capital,
        leverage: args.leverage,
    };
    let params = cfg.resolve(&windowed)?;

    let series = data::filter_series(
        &windowed,
        &TimeWindow::default(),
        Some((params.lower_limit, params.upper_limit)),
    );
    if series.is_empty() {
        bail!(
            "no data available after filtering {} to [{:.4}, {:.4}]; adjust limits or date range",
            source,
            params.lower_limit,
            params.upper_limit
        );
    }

    info!(
        data = %source,
        ticks = series.len(),
        initial_price = params.initial_price,
        lower = params.lower_limit,
        upper = params.upper_limit,
        grid_levels = params.grid_levels,
        "running backtest"
    );

    let baseline = SimulationEngine::run(&series, &params)?;
    print_run("baseline", params.grid_levels, &baseline);

    let optimization = if args.optimize {
        let o = optimizer::optimize(&series, &params, &args.candidates, &baseline)?;
        print_run("optimized", o.grid_levels, &o.result);
        if o.baseline_kept {
            println!("no candidate density beat the baseline; baseline kept.");
        }
        Some(o)
    } else {
        None
    };

    if let Some(out) = &args.out {
        let payload = report::build_report(&source, &params, &baseline, optimization.as_ref());
        report::write_report(out, &payload)?;
        println!("Saved report: {}", out.display());
    }
    if let Some(path) = &args.trades_csv {
        let selected = optimization.as_ref().map(|o| &o.result).unwrap_or(&baseline);
        report::write_trade_log_csv(path, &selected.trades)?;
        println!("Saved trade log: {}", path.display());
    }

    Ok(())
}
