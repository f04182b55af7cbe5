// =============================================================================
// Supertrend — ATR-derived trailing band indicator
// =============================================================================
//
// Standard definition (left unfrozen by the spec, §4.F): basic bands are the
// midpoint +/- multiplier*ATR; final bands carry forward unless price breaks
// them; supertrend value switches between the two bands on a direction flip.
// The ATR series here follows `atr.rs`'s Wilder's-smoothing recurrence but
// returns the full aligned series (one ATR per bar) rather than only the
// latest value, since Supertrend needs a band per bar, not a single number.
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
pub struct SupertrendPoint {
    pub value: f64,
    pub trend: Trend,
}

/// Wilder's-smoothed True Range series, one value per bar starting at index
/// `period` (mirrors `atr.rs::calculate_atr`'s recurrence, generalized to
/// return every intermediate value instead of only the last).
fn atr_series(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let mut tr_values = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let tr = (candles[i].high - candles[i].low)
            .max((candles[i].high - candles[i - 1].close).abs())
            .max((candles[i].low - candles[i - 1].close).abs());
        tr_values.push(tr);
    }

    if tr_values.len() < period {
        return Vec::new();
    }

    let period_f = period as f64;
    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period_f;

    let mut out = Vec::with_capacity(tr_values.len() - period + 1);
    out.push(seed);
    let mut atr = seed;
    for &tr in &tr_values[period..] {
        atr = (atr * (period_f - 1.0) + tr) / period_f;
        out.push(atr);
    }
    out
}

/// Compute the Supertrend series for `candles` at the given `(period,
/// multiplier)`. Output is aligned with `candles[candles.len() - output.len()
/// ..]` (oldest first).
pub fn calculate_supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Vec<SupertrendPoint> {
    let atrs = atr_series(candles, period);
    if atrs.is_empty() {
        return Vec::new();
    }

    // atrs[i] corresponds to candles[candles.len() - atrs.len() + i].
    let start = candles.len() - atrs.len();
    let bars = &candles[start..];

    let mut final_upper = Vec::with_capacity(atrs.len());
    let mut final_lower = Vec::with_capacity(atrs.len());
    let mut points = Vec::with_capacity(atrs.len());

    for i in 0..bars.len() {
        let mid = (bars[i].high + bars[i].low) / 2.0;
        let basic_upper = mid + multiplier * atrs[i];
        let basic_lower = mid - multiplier * atrs[i];

        let fu = if i == 0 {
            basic_upper
        } else if basic_upper < final_upper[i - 1] || bars[i - 1].close > final_upper[i - 1] {
            basic_upper
        } else {
            final_upper[i - 1]
        };

        let fl = if i == 0 {
            basic_lower
        } else if basic_lower > final_lower[i - 1] || bars[i - 1].close < final_lower[i - 1] {
            basic_lower
        } else {
            final_lower[i - 1]
        };

        final_upper.push(fu);
        final_lower.push(fl);

        let trend = if i == 0 {
            if bars[i].close <= fu { Trend::Down } else { Trend::Up }
        } else {
            match points[i - 1] {
                SupertrendPoint { trend: Trend::Up, .. } if bars[i].close < fl => Trend::Down,
                SupertrendPoint { trend: Trend::Down, .. } if bars[i].close > fu => Trend::Up,
                SupertrendPoint { trend, .. } => trend,
            }
        };

        let value = match trend {
            Trend::Up => fl,
            Trend::Down => fu,
        };

        points.push(SupertrendPoint { value, trend });
    }

    points
}

/// Weighted trailing-stop blend of the two closest of three supertrend
/// series (0.6/0.4), used by the Supertrend-triplet strategy family (§4.F).
pub fn blended_trailing_stop(values: &[f64; 3], current_price: f64) -> f64 {
    let mut sorted = *values;
    sorted.sort_by(|a, b| {
        (a - current_price)
            .abs()
            .partial_cmp(&(b - current_price).abs())
            .unwrap()
    });
    0.6 * sorted[0] + 0.4 * sorted[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(bucket_start: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            bucket_start,
            interval: 5,
            open,
            high,
            low,
            close,
            volume: 100,
            tick_count: 1,
            closed: true,
        }
    }

    #[test]
    fn empty_on_insufficient_data() {
        let candles = vec![candle(0, 100.0, 101.0, 99.0, 100.0); 5];
        assert!(calculate_supertrend(&candles, 10, 3.0).is_empty());
    }

    #[test]
    fn steadily_rising_series_trends_up() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(i * 60_000, base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        let points = calculate_supertrend(&candles, 10, 3.0);
        assert!(!points.is_empty());
        assert_eq!(points.last().unwrap().trend, Trend::Up);
    }

    #[test]
    fn steadily_falling_series_trends_down() {
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 200.0 - i as f64 * 2.0;
                candle(i * 60_000, base, base + 1.0, base - 1.0, base - 0.5)
            })
            .collect();
        let points = calculate_supertrend(&candles, 10, 3.0);
        assert!(!points.is_empty());
        assert_eq!(points.last().unwrap().trend, Trend::Down);
    }

    #[test]
    fn blended_stop_weights_closest_two_values() {
        let values = [100.0, 102.0, 150.0];
        let stop = blended_trailing_stop(&values, 101.0);
        // closest two to 101 are 100 and 102
        assert!((stop - (0.6 * 100.0 + 0.4 * 102.0)).abs() < 1e-9);
    }
}
