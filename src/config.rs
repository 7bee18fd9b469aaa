//! Strategy parameters: the validated record the engine consumes, and the
//! absolute / percentage entry modes that resolve into it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::PriceTick;
use crate::error::{GridError, Result, invalid};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridParams {
    pub initial_price: f64,
    pub lower_limit: f64,
    pub upper_limit: f64,
    pub grid_levels: u32,
    pub initial_capital: f64,
    pub leverage: f64,
    pub lower_stop_loss: f64,
    pub upper_stop_loss: f64,
    pub stop_loss_enabled: bool,
}

impl GridParams {
    pub fn validate(&self) -> Result<()> {
        if self.grid_levels == 0 {
            return Err(invalid("grid_levels must be >= 1"));
        }
        for (name, v) in [
            ("initial_price", self.initial_price),
            ("lower_limit", self.lower_limit),
            ("upper_limit", self.upper_limit),
            ("initial_capital", self.initial_capital),
            ("leverage", self.leverage),
        ] {
            if !v.is_finite() {
                return Err(invalid(format!("{name} must be finite, got {v}")));
            }
        }
        if self.upper_limit <= self.lower_limit {
            return Err(invalid(format!(
                "upper_limit {} must be greater than lower_limit {}",
                self.upper_limit, self.lower_limit
            )));
        }
        if self.initial_price < self.lower_limit || self.initial_price > self.upper_limit {
            return Err(invalid(format!(
                "initial_price {} outside [{}, {}]",
                self.initial_price, self.lower_limit, self.upper_limit
            )));
        }
        if self.initial_capital <= 0.0 {
            return Err(invalid("initial_capital must be > 0"));
        }
        if self.leverage <= 0.0 {
            return Err(invalid("leverage must be > 0"));
        }
        if self.stop_loss_enabled
            && (!self.lower_stop_loss.is_finite() || !self.upper_stop_loss.is_finite())
        {
            return Err(invalid("stop-loss bounds must be finite when enabled"));
        }
        Ok(())
    }

    pub fn with_grid_levels(&self, grid_levels: u32) -> Self {
        Self {
            grid_levels,
            ..self.clone()
        }
    }

    pub fn grid_range(&self) -> f64 {
        (self.upper_limit - self.lower_limit) / self.grid_levels as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PriceSpec {
    Absolute(f64),
    /// Distance from the initial price, in percent.
    Percent(f64),
}

impl PriceSpec {
    pub fn below(self, initial_price: f64) -> f64 {
        match self {
            PriceSpec::Absolute(p) => p,
            PriceSpec::Percent(pct) => initial_price * (1.0 - pct / 100.0),
        }
    }

    pub fn above(self, initial_price: f64) -> f64 {
        match self {
            PriceSpec::Absolute(p) => p,
            PriceSpec::Percent(pct) => initial_price * (1.0 + pct / 100.0),
        }
    }
}

impl FromStr for PriceSpec {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        match t.strip_suffix('%') {
            Some(pct) => parse_number(pct, s).map(PriceSpec::Percent),
            None => parse_number(t, s).map(PriceSpec::Absolute),
        }
    }
}

impl fmt::Display for PriceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSpec::Absolute(p) => write!(f, "{p}"),
            PriceSpec::Percent(pct) => write!(f, "{pct}%"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GridSpec {
    Count(u32),
    /// Spacing between levels as a percentage of the initial price.
    Spacing(f64),
}

impl GridSpec {
    pub fn resolve(self, initial_price: f64, lower_limit: f64, upper_limit: f64) -> Result<u32> {
        match self {
            GridSpec::Count(n) => Ok(n),
            GridSpec::Spacing(pct) => {
                let spacing = initial_price * pct / 100.0;
                if !(spacing > 0.0) {
                    return Err(invalid(format!("grid spacing {pct}% must be > 0")));
                }
                let levels = ((upper_limit - lower_limit) / spacing).round();
                if !(levels >= 1.0 && levels <= u32::MAX as f64) {
                    return Err(invalid(format!(
                        "grid spacing {pct}% yields {levels} levels"
                    )));
                }
                Ok(levels as u32)
            }
        }
    }
}

impl FromStr for GridSpec {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        if let Some(pct) = t.strip_suffix('%') {
            return parse_number(pct, s).map(GridSpec::Spacing);
        }
        t.parse::<u32>()
            .map(GridSpec::Count)
            .map_err(|_| GridError::InvalidSpec(format!("expected level count or N%: {s:?}")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum InitialPriceSpec {
    Absolute(f64),
    /// Price of the first tick in the (already filtered) series.
    FirstClose,
}

impl FromStr for InitialPriceSpec {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("first") {
            return Ok(InitialPriceSpec::FirstClose);
        }
        parse_number(t, s).map(InitialPriceSpec::Absolute)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub initial_price: InitialPriceSpec,
    pub lower_limit: PriceSpec,
    pub upper_limit: PriceSpec,
    pub grid: GridSpec,
    pub lower_stop_loss: PriceSpec,
    pub upper_stop_loss: PriceSpec,
    pub stop_loss_enabled: bool,
    pub initial_capital: f64,
    pub leverage: f64,
}

impl StrategyConfig {
    pub fn resolve_initial_price(&self, series: &[PriceTick]) -> Result<f64> {
        match self.initial_price {
            InitialPriceSpec::Absolute(p) => Ok(p),
            InitialPriceSpec::FirstClose => series
                .first()
                .map(|t| t.price)
                .ok_or_else(|| invalid("initial price `first` needs a non-empty series")),
        }
    }

    /// Limits resolve against the initial price before the grid spec, since a
    /// spacing percentage needs the final limits.
    pub fn resolve(&self, series: &[PriceTick]) -> Result<GridParams> {
        let initial_price = self.resolve_initial_price(series)?;
        let lower_limit = self.lower_limit.below(initial_price);
        let upper_limit = self.upper_limit.above(initial_price);
        let grid_levels = self.grid.resolve(initial_price, lower_limit, upper_limit)?;

        let params = GridParams {
            initial_price,
            lower_limit,
            upper_limit,
            grid_levels,
            initial_capital: self.initial_capital,
            leverage: self.leverage,
            lower_stop_loss: self.lower_stop_loss.below(initial_price),
            upper_stop_loss: self.upper_stop_loss.above(initial_price),
            stop_loss_enabled: self.stop_loss_enabled,
        };
        params.validate()?;
        Ok(params)
    }
}

pub fn percent_below(initial_price: f64, price: f64) -> f64 {
    (initial_price - price) / initial_price * 100.0
}

pub fn percent_above(initial_price: f64, price: f64) -> f64 {
    (price - initial_price) / initial_price * 100.0
}

pub fn spacing_percent(params: &GridParams) -> f64 {
    params.grid_range() / params.initial_price * 100.0
}

fn parse_number(t: &str, original: &str) -> Result<f64> {
    let v = t
        .trim()
        .parse::<f64>()
        .map_err(|_| GridError::InvalidSpec(format!("not a number: {original:?}")))?;
    if !v.is_finite() {
        return Err(GridError::InvalidSpec(format!("not finite: {original:?}")));
    }
    Ok(v)
}
