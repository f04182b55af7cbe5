// =============================================================================
// Pattern-confirmation strategy family (§4.F)
// =============================================================================
//
// Grounded on `pattern_strategy.py`'s `PatternConfirmationStrategy`: trade a
// high-confidence candlestick pattern (`indicators::pattern::detect`) only
// when trend context agrees -- price on the correct side of a trend EMA and
// ADX above a minimum trend-strength floor -- then place the stop beyond the
// recent swing high/low and size the target off a minimum risk-reward ratio,
// widened if a nearer opposing swing level would cap it first.
// =============================================================================

use crate::indicators::adx::calculate_adx;
use crate::indicators::ema::calculate_ema;
use crate::indicators::pattern::{detect, Direction, Pattern};
use crate::market_data::Candle;
use crate::types::Side;

use super::{check_exit, risk_gate, OpenEntry, Signal, SignalKind, Strategy, StrategyStatus};

#[derive(Debug, Clone, Copy)]
pub struct PatternParams {
    pub min_confidence: f64,
    pub trend_ema: usize,
    pub min_adx: f64,
    pub min_rr_ratio: f64,
    pub swing_lookback: usize,
    pub capital: f64,
    pub risk_per_trade: f64,
    pub max_loss_per_day: f64,
    pub max_trades_per_day: u32,
}

impl PatternParams {
    pub fn standard(capital: f64) -> Self {
        Self {
            min_confidence: 0.80,
            trend_ema: 50,
            min_adx: 20.0,
            min_rr_ratio: 2.0,
            swing_lookback: 10,
            capital,
            risk_per_trade: 0.02,
            max_loss_per_day: 5_000.0,
            max_trades_per_day: 20,
        }
    }
}

/// Fixed confidence per pattern kind, mirroring the original's priority
/// ordering (engulfing/hammer/shooting-star bucket; doji is excluded since it
/// signals indecision rather than a tradeable edge).
fn pattern_confidence(p: Pattern) -> f64 {
    match p {
        Pattern::BullishEngulfing | Pattern::BearishEngulfing => 0.85,
        Pattern::Hammer | Pattern::ShootingStar => 0.80,
        Pattern::Doji => 0.0,
    }
}

fn swing_high_low(candles: &[Candle], lookback: usize) -> (f64, f64) {
    let n = lookback.min(candles.len());
    let recent = &candles[candles.len() - n..];
    let high = recent.iter().fold(f64::MIN, |acc, c| acc.max(c.high));
    let low = recent.iter().fold(f64::MAX, |acc, c| acc.min(c.low));
    (high, low)
}

pub struct PatternStrategy {
    symbol: String,
    params: PatternParams,
    entry: OpenEntry,
    trades_today: u32,
    daily_pnl: f64,
}

impl PatternStrategy {
    pub fn new(symbol: impl Into<String>, params: PatternParams) -> Self {
        Self {
            symbol: symbol.into(),
            params,
            entry: OpenEntry::default(),
            trades_today: 0,
            daily_pnl: 0.0,
        }
    }

    pub fn record_trade_outcome(&mut self, realized_pnl: f64) {
        self.trades_today += 1;
        self.daily_pnl += realized_pnl;
    }

    fn trend_confirmed(&self, candles: &[Candle], direction: Direction) -> bool {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let Some(&ema) = calculate_ema(&closes, self.params.trend_ema).last() else {
            return false;
        };
        let Some(adx) = calculate_adx(candles, 14) else {
            return false;
        };
        if adx < self.params.min_adx {
            return false;
        }
        let price = candles.last().unwrap().close;
        match direction {
            Direction::Bullish => price > ema,
            Direction::Bearish => price < ema,
        }
    }
}

impl Strategy for PatternStrategy {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn generate_signal(&mut self, candles: &[Candle], current_price: f64) -> Option<Signal> {
        if self.entry.is_open() {
            if let Some(exit) = check_exit(&self.symbol, &self.entry, current_price) {
                self.entry.clear();
                return Some(exit);
            }
            return None;
        }

        if !risk_gate(
            self.entry.is_open(),
            self.daily_pnl,
            self.params.max_loss_per_day,
            self.trades_today,
            self.params.max_trades_per_day,
        ) {
            return None;
        }

        if candles.len() < self.params.trend_ema + 20 {
            return None;
        }

        let patterns = detect(candles);
        let best = patterns
            .into_iter()
            .filter(|p| pattern_confidence(*p) >= self.params.min_confidence)
            .max_by(|a, b| pattern_confidence(*a).partial_cmp(&pattern_confidence(*b)).unwrap())?;

        let direction = best.direction();
        if !self.trend_confirmed(candles, direction) {
            return None;
        }

        let (swing_high, swing_low) = swing_high_low(candles, self.params.swing_lookback);

        let side = match direction {
            Direction::Bullish => Side::Buy,
            Direction::Bearish => Side::Sell,
        };

        let (stop_loss, mut target) = match side {
            Side::Buy => {
                let stop_loss = swing_low * 0.995;
                let risk = current_price - stop_loss;
                (stop_loss, current_price + risk * self.params.min_rr_ratio)
            }
            Side::Sell => {
                let stop_loss = swing_high * 1.005;
                let risk = stop_loss - current_price;
                (stop_loss, current_price - risk * self.params.min_rr_ratio)
            }
        };

        // Prefer the nearer opposing swing level as target if it's further out
        // than the risk-reward floor would otherwise reach.
        match side {
            Side::Buy if swing_high > current_price => {
                let candidate = swing_high * 0.995;
                if candidate > target {
                    target = candidate;
                }
            }
            Side::Sell if swing_low < current_price => {
                let candidate = swing_low * 1.005;
                if candidate < target {
                    target = candidate;
                }
            }
            _ => {}
        }

        let (risk, reward) = match side {
            Side::Buy => (current_price - stop_loss, target - current_price),
            Side::Sell => (stop_loss - current_price, current_price - target),
        };
        if risk <= 0.0 || reward / risk < self.params.min_rr_ratio {
            return None;
        }

        let qty = super::default_position_size(self.params.capital, self.params.risk_per_trade, current_price, stop_loss);
        if qty == 0 {
            return None;
        }

        self.entry.open(side, current_price, stop_loss, target);

        Some(Signal {
            ts: chrono::Utc::now(),
            symbol: self.symbol.clone(),
            kind: if side == Side::Buy { SignalKind::Buy } else { SignalKind::Sell },
            price: current_price,
            qty,
            stop_loss: Some(stop_loss),
            target: Some(target),
            reason: format!("{best:?} pattern with trend confirmation"),
            confidence: pattern_confidence(best),
            metadata: Some(serde_json::json!({ "pattern": format!("{best:?}"), "swing_high": swing_high, "swing_low": swing_low })),
        })
    }

    fn calculate_stop_loss(&self, entry: f64, side: Side) -> f64 {
        match side {
            Side::Buy => entry * 0.98,
            Side::Sell => entry * 1.02,
        }
    }

    fn calculate_target(&self, entry: f64, side: Side) -> f64 {
        let stop_loss = self.calculate_stop_loss(entry, side);
        let risk = (entry - stop_loss).abs();
        match side {
            Side::Buy => entry + risk * self.params.min_rr_ratio,
            Side::Sell => entry - risk * self.params.min_rr_ratio,
        }
    }

    fn get_status(&self) -> StrategyStatus {
        StrategyStatus {
            symbol: self.symbol.clone(),
            name: "pattern-confirmation",
            in_position: self.entry.is_open(),
            entry_price: self.entry.is_open().then_some(self.entry.entry_price),
            stop_loss: self.entry.is_open().then_some(self.entry.stop_loss),
            target: self.entry.is_open().then_some(self.entry.target),
            trades_today: self.trades_today,
            daily_pnl: self.daily_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            bucket_start: i * 300_000,
            interval: 5,
            open,
            high,
            low,
            close,
            volume: 1000,
            tick_count: 10,
            closed: true,
        }
    }

    #[test]
    fn no_signal_with_insufficient_candles() {
        let mut s = PatternStrategy::new("RELIANCE", PatternParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..10).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0)).collect();
        assert!(s.generate_signal(&candles, 100.0).is_none());
    }

    #[test]
    fn no_signal_without_pattern() {
        let mut s = PatternStrategy::new("RELIANCE", PatternParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..80).map(|i| candle(i, 100.0, 100.5, 99.5, 100.0 + i as f64 * 0.05)).collect();
        // flat-bodied candles shouldn't trip any detector threshold reliably;
        // assert no panic and a well-formed Option either way.
        let _ = s.generate_signal(&candles, 104.0);
    }

    #[test]
    fn exit_monitoring_clears_open_entry() {
        let mut s = PatternStrategy::new("RELIANCE", PatternParams::standard(100_000.0));
        s.entry.open(Side::Buy, 100.0, 98.0, 105.0);
        let candles: Vec<Candle> = (0..80).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0)).collect();
        let signal = s.generate_signal(&candles, 97.0).unwrap();
        assert_eq!(signal.kind, SignalKind::Exit);
        assert!(!s.entry.is_open());
    }
}
