use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};

use crate::accounting::{cumulative_series, summarize};
use crate::config::{GridParams, percent_above, percent_below, spacing_percent};
use crate::engine::{RunResult, TradeRecord};
use crate::optimizer::Optimization;

fn run_json(result: &RunResult, initial_capital: f64) -> Value {
    json!({
        "total_realized_pnl": result.total_realized_pnl,
        "mark_to_market_value": result.mark_to_market_value,
        "total_transaction_cost": result.total_transaction_cost,
        "net_pnl": result.net_pnl,
        "roi_pct": result.roi,
        "total_trades": result.trades.len(),
        "open_positions": result.open_position_count,
        "mark_price": result.mark_price,
        "final_working_capital": result.final_working_capital,
        "ticks_processed": result.ticks_processed,
        "stop_loss": result.stop_loss,
        "summary": summarize(result, initial_capital),
    })
}

pub fn build_report(
    source: &str,
    params: &GridParams,
    baseline: &RunResult,
    optimization: Option<&Optimization>,
) -> Value {
    let selected = optimization.map(|o| &o.result).unwrap_or(baseline);
    json!({
        "generated_at_utc": Utc::now().to_rfc3339(),
        "data": source,
        "params": params,
        "params_relative": {
            "lower_limit_pct": percent_below(params.initial_price, params.lower_limit),
            "upper_limit_pct": percent_above(params.initial_price, params.upper_limit),
            "lower_stop_loss_pct": percent_below(params.initial_price, params.lower_stop_loss),
            "upper_stop_loss_pct": percent_above(params.initial_price, params.upper_stop_loss),
            "grid_spacing_pct": spacing_percent(params),
        },
        "baseline": run_json(baseline, params.initial_capital),
        "optimization": optimization.map(|o| json!({
            "best_grid_levels": o.grid_levels,
            "baseline_kept": o.baseline_kept,
            "candidates": o.candidates,
            "result": run_json(&o.result, params.initial_capital),
        })),
        "trade_log": selected.trades,
        "open_positions": selected.open_positions,
    })
}

pub fn write_report(path: &Path, payload: &Value) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(payload)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[derive(Serialize)]
struct TradeRow<'a> {
    seq: u64,
    timestamp: String,
    price: f64,
    action: &'a str,
    entry_level: f64,
    target_level: f64,
    realized_pnl: f64,
    quantity: f64,
    transaction_cost: f64,
    cumulative_pnl: f64,
    cumulative_cost: f64,
    net_pnl: f64,
}

pub fn write_trade_log_csv(path: &Path, trades: &[TradeRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for (t, c) in trades.iter().zip(cumulative_series(trades)) {
        wtr.serialize(TradeRow {
            seq: t.sequence,
            timestamp: t.timestamp.to_rfc3339(),
            price: t.price,
            action: t.action.label(),
            entry_level: t.entry_level,
            target_level: t.target_level,
            realized_pnl: t.realized_pnl,
            quantity: t.quantity,
            transaction_cost: t.transaction_cost,
            cumulative_pnl: c.cumulative_pnl,
            cumulative_cost: c.cumulative_cost,
            net_pnl: c.net_pnl,
        })?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PriceTick, SimulationEngine};
    use chrono::TimeZone;

    fn setup() -> (GridParams, RunResult) {
        let params = GridParams {
            initial_price: 100.0,
            lower_limit: 70.0,
            upper_limit: 130.0,
            grid_levels: 6,
            initial_capital: 1000.0,
            leverage: 1.0,
            lower_stop_loss: 60.0,
            upper_stop_loss: 140.0,
            stop_loss_enabled: true,
        };
        let series: Vec<PriceTick> = [100.0, 90.0, 80.0, 95.0]
            .iter()
            .enumerate()
            .map(|(i, &price)| PriceTick {
                timestamp: Utc.timestamp_opt(i as i64 * 60, 0).unwrap(),
                price,
            })
            .collect();
        let result = SimulationEngine::run(&series, &params).unwrap();
        (params, result)
    }

    #[test]
    fn report_carries_trade_log_and_metrics() {
        let (params, result) = setup();
        let payload = build_report("memory", &params, &result, None);
        assert_eq!(payload["trade_log"].as_array().map(Vec::len), Some(3));
        assert_eq!(payload["baseline"]["total_trades"], json!(3));
        assert_eq!(payload["baseline"]["summary"]["closing_trades"], json!(1));
        assert!(payload["optimization"].is_null());
        assert_eq!(payload["trade_log"][2]["action"], json!("CloseBuy"));
    }

    #[test]
    fn trade_log_csv_has_header_and_rows() {
        let (_, result) = setup();
        let path = std::env::temp_dir().join(format!("grid_bt_trades_{}.csv", std::process::id()));
        write_trade_log_csv(&path, &result.trades).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("seq,timestamp,price,action"));
        assert_eq!(lines.count(), 3);
        assert!(text.contains("Close-Buy"));
        fs::remove_file(&path).ok();
    }
}
