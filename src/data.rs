use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::engine::PriceTick;

const TIME_HEADERS: [&str; 4] = ["timestamp", "date", "open time", "time"];

/// Loads `timestamp, ..., close` rows; malformed rows are skipped. The result
/// is sorted and de-duplicated by timestamp (first row wins).
pub fn load_series_csv(path: &Path) -> Result<Vec<PriceTick>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open csv: {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read csv header: {}", path.display()))?
        .clone();
    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let ts_col = find(&TIME_HEADERS).unwrap_or(0);
    let close_col = find(&["close"]);

    let mut series = Vec::new();
    let mut skipped = 0_usize;
    for rec in rdr.records() {
        let Ok(r) = rec else {
            skipped += 1;
            continue;
        };
        let price_col = close_col.unwrap_or(if r.len() >= 5 { 4 } else { 1 });
        let ts = r.get(ts_col).and_then(parse_timestamp);
        let price = r.get(price_col).and_then(|x| x.trim().parse::<f64>().ok());
        match (ts, price) {
            (Some(timestamp), Some(price)) => series.push(PriceTick { timestamp, price }),
            _ => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, path = %path.display(), "skipped malformed csv rows");
    }

    series.sort_by_key(|t| t.timestamp);
    series.dedup_by_key(|t| t.timestamp);
    debug!(ticks = series.len(), path = %path.display(), "price series loaded");
    Ok(series)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(n) = s.parse::<i64>() {
        return if n.abs() >= 100_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        };
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts <= e)
    }
}

/// Keeps ticks inside the inclusive window and, when given, inside the
/// `[lower, upper]` price band.
pub fn filter_series(
    series: &[PriceTick],
    window: &TimeWindow,
    band: Option<(f64, f64)>,
) -> Vec<PriceTick> {
    series
        .iter()
        .filter(|t| window.contains(t.timestamp))
        .filter(|t| band.is_none_or(|(lo, hi)| t.price >= lo && t.price <= hi))
        .copied()
        .collect()
}

/// Deterministic geometric random walk with Gaussian log-returns.
pub fn random_walk(
    seed: u64,
    start: DateTime<Utc>,
    step: Duration,
    len: usize,
    start_price: f64,
    volatility: f64,
) -> Vec<PriceTick> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = start_price;
    let mut ts = start;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(PriceTick {
            timestamp: ts,
            price,
        });
        price *= (volatility * gauss(&mut rng)).exp();
        ts += step;
    }
    out
}

fn gauss(rng: &mut StdRng) -> f64 {
    let u1 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        assert_eq!(parse_timestamp("1700000000"), Some(ts(1_700_000_000)));
        assert_eq!(parse_timestamp("1700000000000"), Some(ts(1_700_000_000)));
        assert_eq!(
            parse_timestamp("2017-10-01T00:00:00Z"),
            Some(ts(1_506_816_000))
        );
        assert_eq!(
            parse_timestamp("2017-10-01 00:00:00"),
            Some(ts(1_506_816_000))
        );
        assert_eq!(parse_timestamp("2017-10-01"), Some(ts(1_506_816_000)));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn loads_ohlcv_layout_sorted_and_deduplicated() {
        let dir = std::env::temp_dir().join(format!("grid_bt_csv_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ohlcv.csv");
        fs::write(
            &path,
            "Open time,Open,High,Low,Close,Volume\n\
             1700000120000,1,1,1,103.0,5\n\
             1700000000000,1,1,1,101.0,5\n\
             garbage,1,1,1,1,1\n\
             1700000060000,1,1,1,102.0,5\n\
             1700000060000,1,1,1,999.0,5\n",
        )
        .unwrap();

        let series = load_series_csv(&path).unwrap();
        let prices: Vec<f64> = series.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![101.0, 102.0, 103.0]);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn filter_applies_window_and_band() {
        let series: Vec<PriceTick> = [(0, 100.0), (60, 50.0), (120, 110.0), (180, 105.0)]
            .iter()
            .map(|&(s, p)| PriceTick {
                timestamp: ts(s),
                price: p,
            })
            .collect();
        let window = TimeWindow {
            start: Some(ts(60)),
            end: Some(ts(120)),
        };
        let kept = filter_series(&series, &window, Some((70.0, 130.0)));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].price, 110.0);
        assert_eq!(filter_series(&series, &TimeWindow::default(), None).len(), 4);
    }

    #[test]
    fn random_walk_is_reproducible() {
        let a = random_walk(7, ts(0), Duration::minutes(1), 50, 100.0, 0.01);
        let b = random_walk(7, ts(0), Duration::minutes(1), 50, 100.0, 0.01);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert_eq!(a[0].price, 100.0);
        assert!(a.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
        assert!(a.iter().all(|t| t.price > 0.0));
    }
}
