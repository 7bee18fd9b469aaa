//! P&L, transaction cost and mark-to-market arithmetic, plus the derived
//! per-trade series layered on top of a finished run.

use serde::Serialize;

use crate::book::{Position, Side};
use crate::engine::{RunResult, TradeAction, TradeRecord};

/// Proportional fee charged on both opening and closing notional.
pub const FEE_RATE: f64 = 0.0003;

pub fn transaction_cost(price: f64, quantity: f64) -> f64 {
    FEE_RATE * price * quantity
}

pub fn realized_pnl(side: Side, entry_price: f64, close_price: f64, quantity: f64) -> f64 {
    match side {
        Side::Buy => (close_price - entry_price) * quantity,
        Side::Sell => (entry_price - close_price) * quantity,
    }
}

pub fn mark_to_market(positions: &[Position], mark_price: f64) -> f64 {
    positions
        .iter()
        .map(|p| realized_pnl(p.side, p.entry_level, mark_price, p.quantity))
        .sum()
}

pub fn net_pnl(total_realized: f64, mtm_value: f64, total_cost: f64) -> f64 {
    total_realized + mtm_value - total_cost
}

pub fn roi_pct(net_pnl: f64, initial_capital: f64) -> f64 {
    net_pnl / initial_capital * 100.0
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CumulativePoint {
    pub sequence: u64,
    pub cumulative_pnl: f64,
    pub cumulative_cost: f64,
    pub net_pnl: f64,
}

pub fn cumulative_series(trades: &[TradeRecord]) -> Vec<CumulativePoint> {
    let mut pnl = 0.0;
    let mut cost = 0.0;
    trades
        .iter()
        .map(|t| {
            pnl += t.realized_pnl;
            cost += t.transaction_cost;
            CumulativePoint {
                sequence: t.sequence,
                cumulative_pnl: pnl,
                cumulative_cost: cost,
                net_pnl: pnl - cost,
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_trades: usize,
    pub opening_trades: usize,
    pub closing_trades: usize,
    pub winning_closes: usize,
    pub max_drawdown_pct: f64,
}

pub fn summarize(result: &RunResult, initial_capital: f64) -> RunSummary {
    let opening_trades = result
        .trades
        .iter()
        .filter(|t| matches!(t.action, TradeAction::OpenBuy | TradeAction::OpenSell))
        .count();
    let closing_trades = result.trades.len() - opening_trades;
    let winning_closes = result
        .trades
        .iter()
        .filter(|t| t.action.is_close() && t.realized_pnl > 0.0)
        .count();

    let mut equity_curve = vec![initial_capital];
    equity_curve.extend(
        cumulative_series(&result.trades)
            .iter()
            .map(|p| initial_capital + p.net_pnl),
    );

    RunSummary {
        total_trades: result.trades.len(),
        opening_trades,
        closing_trades,
        winning_closes,
        max_drawdown_pct: calc_max_drawdown(&equity_curve) * 100.0,
    }
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn calc_max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0;
    for &e in equity_curve {
        if e > peak {
            peak = e;
        }
        if peak > 0.0 {
            let dd = (peak - e) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(sequence: u64, action: TradeAction, pnl: f64, cost: f64) -> TradeRecord {
        TradeRecord {
            sequence,
            timestamp: Utc.timestamp_opt(sequence as i64, 0).unwrap(),
            price: 100.0,
            action,
            entry_level: 100.0,
            target_level: 110.0,
            realized_pnl: pnl,
            quantity: 1.0,
            transaction_cost: cost,
        }
    }

    #[test]
    fn pnl_signs_follow_side() {
        assert_eq!(realized_pnl(Side::Buy, 90.0, 100.0, 2.0), 20.0);
        assert_eq!(realized_pnl(Side::Sell, 110.0, 100.0, 2.0), 20.0);
        assert_eq!(realized_pnl(Side::Sell, 110.0, 120.0, 2.0), -20.0);
    }

    #[test]
    fn fee_is_proportional_to_notional() {
        assert!((transaction_cost(100.0, 10.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn cumulative_series_is_prefix_sum() {
        let trades = vec![
            record(1, TradeAction::OpenBuy, 0.0, 0.5),
            record(2, TradeAction::CloseBuy, 10.0, 0.5),
            record(3, TradeAction::OpenSell, 0.0, 0.25),
        ];
        let series = cumulative_series(&trades);
        assert_eq!(series.len(), 3);
        assert_eq!(series[1].cumulative_pnl, 10.0);
        assert_eq!(series[2].cumulative_cost, 1.25);
        assert_eq!(series[2].net_pnl, 8.75);
    }

    #[test]
    fn drawdown_of_flat_or_rising_curve_is_zero() {
        assert_eq!(calc_max_drawdown(&[]), 0.0);
        assert_eq!(calc_max_drawdown(&[100.0, 100.0, 120.0]), 0.0);
        assert!((calc_max_drawdown(&[100.0, 120.0, 90.0, 130.0]) - 0.25).abs() < 1e-12);
    }
}
