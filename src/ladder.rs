//! Evenly spaced buy/sell trigger prices around a reference price.

use serde::Serialize;

use crate::error::{Result, invalid};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GridLadder {
    pub grid_range: f64,
    /// `initial - k * grid_range` for k = 1..=levels, nearest first.
    pub buy_levels: Vec<f64>,
    /// `initial + k * grid_range` for k = 1..=levels, nearest first.
    pub sell_levels: Vec<f64>,
}

impl GridLadder {
    pub fn build(
        lower_limit: f64,
        upper_limit: f64,
        initial_price: f64,
        grid_levels: u32,
    ) -> Result<Self> {
        if grid_levels == 0 {
            return Err(invalid("grid_levels must be >= 1"));
        }
        if !lower_limit.is_finite() || !upper_limit.is_finite() || !initial_price.is_finite() {
            return Err(invalid("limits and initial price must be finite"));
        }
        if upper_limit <= lower_limit {
            return Err(invalid(format!(
                "upper_limit {upper_limit} must be greater than lower_limit {lower_limit}"
            )));
        }
        if initial_price < lower_limit || initial_price > upper_limit {
            return Err(invalid(format!(
                "initial_price {initial_price} outside [{lower_limit}, {upper_limit}]"
            )));
        }

        let grid_range = (upper_limit - lower_limit) / grid_levels as f64;
        let buy_levels = (1..=grid_levels)
            .map(|k| initial_price - k as f64 * grid_range)
            .collect();
        let sell_levels = (1..=grid_levels)
            .map(|k| initial_price + k as f64 * grid_range)
            .collect();

        Ok(Self {
            grid_range,
            buy_levels,
            sell_levels,
        })
    }

    pub fn levels(&self) -> usize {
        self.buy_levels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GridError;

    #[test]
    fn builds_symmetric_ladder() {
        let ladder = GridLadder::build(70.0, 130.0, 100.0, 6).unwrap();
        assert_eq!(ladder.grid_range, 10.0);
        assert_eq!(ladder.buy_levels, vec![90.0, 80.0, 70.0, 60.0, 50.0, 40.0]);
        assert_eq!(
            ladder.sell_levels,
            vec![110.0, 120.0, 130.0, 140.0, 150.0, 160.0]
        );
        assert_eq!(ladder.levels(), 6);
    }

    #[test]
    fn rejects_zero_levels() {
        let err = GridLadder::build(70.0, 130.0, 100.0, 0).unwrap_err();
        assert!(matches!(err, GridError::InvalidParameter(_)));
    }

    #[test]
    fn rejects_inverted_or_degenerate_bounds() {
        assert!(GridLadder::build(130.0, 70.0, 100.0, 6).is_err());
        assert!(GridLadder::build(100.0, 100.0, 100.0, 6).is_err());
    }

    #[test]
    fn rejects_initial_price_outside_bounds() {
        assert!(GridLadder::build(70.0, 130.0, 131.0, 6).is_err());
        assert!(GridLadder::build(70.0, 130.0, 69.99, 6).is_err());
        assert!(GridLadder::build(70.0, 130.0, 70.0, 6).is_ok());
        assert!(GridLadder::build(70.0, 130.0, 130.0, 6).is_ok());
    }
}
