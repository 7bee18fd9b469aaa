use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::accounting::{self, mark_to_market, realized_pnl, transaction_cost};
use crate::book::{Position, PositionBook, Side};
use crate::config::GridParams;
use crate::error::{GridError, Result};
use crate::ladder::GridLadder;

const QUANTITY_DIGITS: i32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TradeAction {
    OpenBuy,
    OpenSell,
    CloseBuy,
    CloseSell,
}

impl TradeAction {
    fn open(side: Side) -> Self {
        match side {
            Side::Buy => TradeAction::OpenBuy,
            Side::Sell => TradeAction::OpenSell,
        }
    }

    fn close(side: Side) -> Self {
        match side {
            Side::Buy => TradeAction::CloseBuy,
            Side::Sell => TradeAction::CloseSell,
        }
    }

    pub fn is_close(self) -> bool {
        matches!(self, TradeAction::CloseBuy | TradeAction::CloseSell)
    }

    pub fn side(self) -> Side {
        match self {
            TradeAction::OpenBuy | TradeAction::CloseBuy => Side::Buy,
            TradeAction::OpenSell | TradeAction::CloseSell => Side::Sell,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TradeAction::OpenBuy => "Open-Buy",
            TradeAction::OpenSell => "Open-Sell",
            TradeAction::CloseBuy => "Close-Buy",
            TradeAction::CloseSell => "Close-Sell",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TradeRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub action: TradeAction,
    pub entry_level: f64,
    pub target_level: f64,
    pub realized_pnl: f64,
    pub quantity: f64,
    pub transaction_cost: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StopLossOutcome {
    pub triggered: bool,
    pub at_timestamp: Option<DateTime<Utc>>,
    pub at_price: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunResult {
    pub trades: Vec<TradeRecord>,
    pub total_realized_pnl: f64,
    pub total_transaction_cost: f64,
    pub mark_to_market_value: f64,
    pub net_pnl: f64,
    pub roi: f64,
    pub open_position_count: usize,
    pub open_positions: Vec<Position>,
    pub stop_loss: StopLossOutcome,
    pub ticks_processed: usize,
    pub mark_price: f64,
    pub final_working_capital: f64,
    pub grid_range: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum EngineState {
    Running,
    StoppedByStopLoss { at: DateTime<Utc>, price: f64 },
}

/// Tick-by-tick grid state machine for a single run. Owns its book, log and
/// working capital; nothing is shared between runs.
#[derive(Clone, Debug)]
pub struct SimulationEngine {
    params: GridParams,
    ladder: GridLadder,
    book: PositionBook,
    trades: Vec<TradeRecord>,
    working_capital: f64,
    total_realized: f64,
    total_cost: f64,
    last_price: Option<f64>,
    ticks_processed: usize,
    state: EngineState,
}

impl SimulationEngine {
    pub fn new(params: &GridParams) -> Result<Self> {
        params.validate()?;
        let ladder = GridLadder::build(
            params.lower_limit,
            params.upper_limit,
            params.initial_price,
            params.grid_levels,
        )?;
        Ok(Self {
            params: params.clone(),
            ladder,
            book: PositionBook::new(),
            trades: Vec::new(),
            working_capital: params.initial_capital * params.leverage,
            total_realized: 0.0,
            total_cost: 0.0,
            last_price: None,
            ticks_processed: 0,
            state: EngineState::Running,
        })
    }

    /// Validates, then drives every tick through the engine and finalizes.
    pub fn run(series: &[PriceTick], params: &GridParams) -> Result<RunResult> {
        let mut engine = Self::new(params)?;
        validate_series(series)?;
        if series.is_empty() {
            warn!(
                initial_price = params.initial_price,
                "empty price series, returning zero-activity result"
            );
        }
        for tick in series {
            engine.on_tick(tick);
            if engine.is_stopped() {
                break;
            }
        }
        Ok(engine.finish())
    }

    pub fn ladder(&self) -> &GridLadder {
        &self.ladder
    }

    pub fn working_capital(&self) -> f64 {
        self.working_capital
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, EngineState::StoppedByStopLoss { .. })
    }

    pub fn on_tick(&mut self, tick: &PriceTick) {
        if self.is_stopped() {
            return;
        }
        let price = tick.price;

        if self.params.stop_loss_enabled
            && (price >= self.params.upper_stop_loss || price <= self.params.lower_stop_loss)
        {
            info!(
                at = %tick.timestamp,
                price,
                lower = self.params.lower_stop_loss,
                upper = self.params.upper_stop_loss,
                "stop-loss triggered, trading halted"
            );
            self.state = EngineState::StoppedByStopLoss {
                at: tick.timestamp,
                price,
            };
            return;
        }

        self.ticks_processed += 1;
        self.last_price = Some(price);
        self.close_reached(tick);
        self.open_eligible(tick);
    }

    fn close_reached(&mut self, tick: &PriceTick) {
        for pos in self.book.close_reached(tick.price) {
            let pnl = realized_pnl(pos.side, pos.entry_level, tick.price, pos.quantity);
            let cost = transaction_cost(tick.price, pos.quantity);
            self.total_realized += pnl;
            self.total_cost += cost;
            self.working_capital += pnl;
            debug!(
                side = ?pos.side,
                entry = pos.entry_level,
                price = tick.price,
                pnl,
                "position closed"
            );
            self.push_trade(tick, TradeAction::close(pos.side), &pos, pnl, cost);
        }
    }

    fn open_eligible(&mut self, tick: &PriceTick) {
        let price = tick.price;
        let (side, eligible): (Side, Vec<f64>) = if price < self.params.initial_price {
            let levels = self.ladder.buy_levels.iter();
            (Side::Buy, levels.copied().filter(|&l| price <= l).collect())
        } else if price > self.params.initial_price {
            let levels = self.ladder.sell_levels.iter();
            (Side::Sell, levels.copied().filter(|&l| price >= l).collect())
        } else {
            return;
        };

        let slots = self.params.grid_levels as f64 / 2.0;
        for level in eligible {
            if self.book.is_occupied(level) {
                continue;
            }
            let quantity = round_to(self.working_capital / price / slots, QUANTITY_DIGITS);
            let target = match side {
                Side::Buy => level + self.ladder.grid_range,
                Side::Sell => level - self.ladder.grid_range,
            };
            if !self
                .book
                .try_open(side, level, target, quantity, tick.timestamp)
            {
                continue;
            }
            let cost = transaction_cost(price, quantity);
            self.total_cost += cost;
            debug!(?side, level, target, quantity, price, "position opened");

            let pos = Position {
                side,
                entry_level: level,
                target_level: target,
                quantity,
                opened_at: tick.timestamp,
            };
            self.push_trade(tick, TradeAction::open(side), &pos, 0.0, cost);
        }
    }

    fn push_trade(
        &mut self,
        tick: &PriceTick,
        action: TradeAction,
        pos: &Position,
        realized_pnl: f64,
        transaction_cost: f64,
    ) {
        self.trades.push(TradeRecord {
            sequence: self.trades.len() as u64 + 1,
            timestamp: tick.timestamp,
            price: tick.price,
            action,
            entry_level: pos.entry_level,
            target_level: pos.target_level,
            realized_pnl,
            quantity: pos.quantity,
            transaction_cost,
        });
    }

    /// Marks remaining positions to market and produces the immutable result.
    pub fn finish(self) -> RunResult {
        let (mark_price, stop_loss) = match self.state {
            EngineState::StoppedByStopLoss { at, price } => (
                price,
                StopLossOutcome {
                    triggered: true,
                    at_timestamp: Some(at),
                    at_price: Some(price),
                },
            ),
            EngineState::Running => (
                self.last_price.unwrap_or(self.params.initial_price),
                StopLossOutcome::default(),
            ),
        };

        let open_positions = self.book.open_positions().to_vec();
        let mtm = mark_to_market(&open_positions, mark_price);
        let net = accounting::net_pnl(self.total_realized, mtm, self.total_cost);
        let roi = accounting::roi_pct(net, self.params.initial_capital);

        info!(
            grid_levels = self.params.grid_levels,
            trades = self.trades.len(),
            open = open_positions.len(),
            net_pnl = net,
            stopped = stop_loss.triggered,
            "simulation finished"
        );

        RunResult {
            trades: self.trades,
            total_realized_pnl: self.total_realized,
            total_transaction_cost: self.total_cost,
            mark_to_market_value: mtm,
            net_pnl: net,
            roi,
            open_position_count: open_positions.len(),
            open_positions,
            stop_loss,
            ticks_processed: self.ticks_processed,
            mark_price,
            final_working_capital: self.working_capital,
            grid_range: self.ladder.grid_range,
        }
    }
}

pub fn validate_series(series: &[PriceTick]) -> Result<()> {
    for (index, tick) in series.iter().enumerate() {
        if !tick.price.is_finite() || tick.price <= 0.0 {
            return Err(GridError::InvalidSeries {
                index,
                reason: format!("price {} must be finite and positive", tick.price),
            });
        }
        if index > 0 && tick.timestamp <= series[index - 1].timestamp {
            return Err(GridError::InvalidSeries {
                index,
                reason: format!(
                    "timestamp {} not after previous {}",
                    tick.timestamp,
                    series[index - 1].timestamp
                ),
            });
        }
    }
    Ok(())
}

fn round_to(v: f64, digits: i32) -> f64 {
    let f = 10_f64.powi(digits);
    (v * f).round() / f
}
