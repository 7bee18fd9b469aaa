use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Position {
    pub side: Side,
    pub entry_level: f64,
    pub target_level: f64,
    pub quantity: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn target_reached(&self, price: f64) -> bool {
        match self.side {
            Side::Buy => price >= self.target_level,
            Side::Sell => price <= self.target_level,
        }
    }
}

/// Open grid positions, at most one per level, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct PositionBook {
    positions: Vec<Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_occupied(&self, level: f64) -> bool {
        self.positions.iter().any(|p| p.entry_level == level)
    }

    /// `level` must be the canonical ladder value, never a recomputed one,
    /// since occupancy is exact float equality.
    pub fn try_open(
        &mut self,
        side: Side,
        level: f64,
        target_level: f64,
        quantity: f64,
        at: DateTime<Utc>,
    ) -> bool {
        if self.is_occupied(level) {
            return false;
        }
        self.positions.push(Position {
            side,
            entry_level: level,
            target_level,
            quantity,
            opened_at: at,
        });
        true
    }

    /// Removes and returns every position whose target is reached at `price`,
    /// in insertion order.
    pub fn close_reached(&mut self, price: f64) -> Vec<Position> {
        let (closed, kept): (Vec<Position>, Vec<Position>) = std::mem::take(&mut self.positions)
            .into_iter()
            .partition(|p| p.target_reached(price));
        self.positions = kept;
        closed
    }

    pub fn open_positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn refuses_second_position_on_same_level() {
        let mut book = PositionBook::new();
        assert!(book.try_open(Side::Buy, 90.0, 100.0, 1.0, at(1)));
        assert!(!book.try_open(Side::Buy, 90.0, 100.0, 2.0, at(2)));
        assert_eq!(book.len(), 1);
        assert_eq!(book.open_positions()[0].quantity, 1.0);
    }

    #[test]
    fn closes_every_reached_target_in_insertion_order() {
        let mut book = PositionBook::new();
        book.try_open(Side::Buy, 90.0, 100.0, 1.0, at(1));
        book.try_open(Side::Buy, 80.0, 90.0, 1.0, at(2));
        book.try_open(Side::Buy, 70.0, 80.0, 1.0, at(3));

        let closed = book.close_reached(95.0);
        let levels: Vec<f64> = closed.iter().map(|p| p.entry_level).collect();
        assert_eq!(levels, vec![80.0, 70.0]);
        assert_eq!(book.len(), 1);
        assert_eq!(book.open_positions()[0].entry_level, 90.0);
    }

    #[test]
    fn sell_targets_close_on_falling_price() {
        let mut book = PositionBook::new();
        book.try_open(Side::Sell, 110.0, 100.0, 1.0, at(1));
        assert!(book.close_reached(100.01).is_empty());
        let closed = book.close_reached(100.0);
        assert_eq!(closed.len(), 1);
        assert!(book.is_empty());
    }

    #[test]
    fn reopens_level_after_close() {
        let mut book = PositionBook::new();
        book.try_open(Side::Buy, 90.0, 100.0, 1.0, at(1));
        book.close_reached(100.0);
        assert!(book.try_open(Side::Buy, 90.0, 100.0, 1.0, at(3)));
    }
}
