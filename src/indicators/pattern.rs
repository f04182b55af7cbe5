// =============================================================================
// Candlestick Pattern Detector
// =============================================================================
//
// Grounded on `original_source/backend/app/services/pattern_scanner.py`'s
// `CandlestickPatternScanner`: each `is_*` staticmethod there becomes a
// function here operating on `&Candle` instead of a `pandas.Series` row, with
// the same wick/body ratio thresholds. Used by the Pattern-confirmation
// strategy family (§4.F).
// =============================================================================

use crate::market_data::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Doji,
    Hammer,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Pattern {
    pub fn direction(self) -> Direction {
        match self {
            Pattern::Doji => Direction::Bullish, // indecision; caller weighs by trend context
            Pattern::Hammer | Pattern::BullishEngulfing => Direction::Bullish,
            Pattern::ShootingStar | Pattern::BearishEngulfing => Direction::Bearish,
        }
    }
}

/// Small body relative to total range (`< 10%`) -- indecision.
pub fn is_doji(c: &Candle) -> bool {
    let range = c.high - c.low;
    if range <= 0.0 {
        return false;
    }
    let body = (c.close - c.open).abs();
    body / range < 0.1
}

/// Long lower wick, small body near the top of the range, little upper wick
/// (bullish reversal).
pub fn is_hammer(c: &Candle) -> bool {
    let range = c.high - c.low;
    if range <= 0.0 {
        return false;
    }
    let body = (c.close - c.open).abs();
    let lower_wick = c.open.min(c.close) - c.low;
    let upper_wick = c.high - c.open.max(c.close);

    let long_lower_wick = lower_wick >= body * 2.0;
    let small_upper_wick = upper_wick < body * 0.5;
    let body_at_top = (c.high - c.open.max(c.close)) / range < 0.3;

    long_lower_wick && small_upper_wick && body_at_top
}

/// Long upper wick, small body near the bottom (bearish reversal).
pub fn is_shooting_star(c: &Candle) -> bool {
    let range = c.high - c.low;
    if range <= 0.0 {
        return false;
    }
    let body = (c.close - c.open).abs();
    let upper_wick = c.high - c.open.max(c.close);
    let lower_wick = c.open.min(c.close) - c.low;

    let long_upper_wick = upper_wick >= body * 2.0;
    let small_lower_wick = lower_wick < body * 0.5;

    long_upper_wick && small_lower_wick
}

/// Current bullish candle's body fully engulfs the previous bearish candle's
/// body, and is larger.
pub fn is_bullish_engulfing(curr: &Candle, prev: &Candle) -> bool {
    let prev_bearish = prev.close < prev.open;
    let curr_bullish = curr.close > curr.open;
    let engulfs = curr.open <= prev.close && curr.close >= prev.open;
    let larger_body = (curr.close - curr.open).abs() > (prev.close - prev.open).abs();
    prev_bearish && curr_bullish && engulfs && larger_body
}

pub fn is_bearish_engulfing(curr: &Candle, prev: &Candle) -> bool {
    let prev_bullish = prev.close > prev.open;
    let curr_bearish = curr.close < curr.open;
    let engulfs = curr.open >= prev.close && curr.close <= prev.open;
    let larger_body = (curr.close - curr.open).abs() > (prev.close - prev.open).abs();
    prev_bullish && curr_bearish && engulfs && larger_body
}

/// Scan the last candle (and, for two-candle patterns, the one before it) and
/// return every pattern that matches, most specific first.
pub fn detect(candles: &[Candle]) -> Vec<Pattern> {
    let mut found = Vec::new();
    let Some(last) = candles.last() else {
        return found;
    };

    if candles.len() >= 2 {
        let prev = &candles[candles.len() - 2];
        if is_bullish_engulfing(last, prev) {
            found.push(Pattern::BullishEngulfing);
        }
        if is_bearish_engulfing(last, prev) {
            found.push(Pattern::BearishEngulfing);
        }
    }

    if is_hammer(last) {
        found.push(Pattern::Hammer);
    }
    if is_shooting_star(last) {
        found.push(Pattern::ShootingStar);
    }
    if is_doji(last) {
        found.push(Pattern::Doji);
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            bucket_start: 0,
            interval: 5,
            open,
            high,
            low,
            close,
            volume: 0,
            tick_count: 1,
            closed: true,
        }
    }

    #[test]
    fn doji_detects_small_body() {
        let c = candle(100.0, 102.0, 98.0, 100.1);
        assert!(is_doji(&c));
    }

    #[test]
    fn doji_rejects_large_body() {
        let c = candle(100.0, 105.0, 99.0, 104.5);
        assert!(!is_doji(&c));
    }

    #[test]
    fn hammer_detects_long_lower_wick_small_body_at_top() {
        let c = candle(100.0, 100.5, 90.0, 100.2);
        assert!(is_hammer(&c));
    }

    #[test]
    fn shooting_star_detects_long_upper_wick() {
        let c = candle(100.0, 110.0, 99.5, 100.2);
        assert!(is_shooting_star(&c));
    }

    #[test]
    fn bullish_engulfing_detects_larger_opposite_body() {
        let prev = candle(105.0, 106.0, 99.0, 100.0); // bearish
        let curr = candle(99.0, 107.0, 98.0, 106.0); // bullish, engulfs
        assert!(is_bullish_engulfing(&curr, &prev));
        assert!(!is_bearish_engulfing(&curr, &prev));
    }

    #[test]
    fn bearish_engulfing_detects_larger_opposite_body() {
        let prev = candle(100.0, 106.0, 99.0, 105.0); // bullish
        let curr = candle(106.0, 107.0, 98.0, 99.0); // bearish, engulfs
        assert!(is_bearish_engulfing(&curr, &prev));
    }

    #[test]
    fn detect_returns_empty_on_no_candles() {
        assert!(detect(&[]).is_empty());
    }

    #[test]
    fn detect_finds_engulfing_across_two_candles() {
        let candles = vec![
            candle(105.0, 106.0, 99.0, 100.0),
            candle(99.0, 107.0, 98.0, 106.0),
        ];
        let patterns = detect(&candles);
        assert!(patterns.contains(&Pattern::BullishEngulfing));
    }
}
