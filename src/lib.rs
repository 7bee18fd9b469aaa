pub mod accounting;
pub mod book;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod ladder;
pub mod optimizer;
pub mod report;

pub use book::{Position, PositionBook, Side};
pub use config::{GridParams, GridSpec, InitialPriceSpec, PriceSpec, StrategyConfig};
pub use engine::{PriceTick, RunResult, SimulationEngine, StopLossOutcome, TradeAction, TradeRecord};
pub use error::{GridError, Result};
pub use ladder::GridLadder;
pub use optimizer::{DEFAULT_CANDIDATE_GRID_LEVELS, Optimization, optimize};
