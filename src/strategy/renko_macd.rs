// =============================================================================
// Renko + MACD strategy family (§4.F)
// =============================================================================
//
// Grounded on `renko_macd_strategy.py`'s `RenkoMACDStrategy`: the only family
// member driven directly by ticks rather than candle closes alone --
// `process_tick` feeds the shared `RenkoAccumulator` while `generate_signal`
// still runs on periodic candles to derive MACD crossover state. Entry fires
// when MACD agrees with a strong Renko trend (brick count past a threshold in
// the same direction); stop-loss trails the opposite brick limit instead of a
// fixed level, and target uses a 2:1 risk-reward off that stop.
// =============================================================================

use std::sync::Arc;

use crate::indicators::macd::{bearish_crossover, bullish_crossover, calculate_macd};
use crate::market_data::renko::RenkoAccumulator;
use crate::market_data::tick::Tick;
use crate::market_data::Candle;
use crate::types::Side;

use super::{risk_gate, OpenEntry, Signal, SignalKind, Strategy, StrategyStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MacdCrossover {
    None,
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy)]
pub struct RenkoMacdParams {
    pub renko_brick_threshold: i64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub capital: f64,
    pub max_loss_per_day: f64,
    pub max_trades_per_day: u32,
}

impl RenkoMacdParams {
    pub fn standard(capital: f64) -> Self {
        Self {
            renko_brick_threshold: 2,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            capital,
            max_loss_per_day: 5_000.0,
            max_trades_per_day: 20,
        }
    }
}

pub struct RenkoMacdStrategy {
    symbol: String,
    token: u32,
    params: RenkoMacdParams,
    renko: Arc<RenkoAccumulator>,
    entry: OpenEntry,
    trades_today: u32,
    daily_pnl: f64,
    macd_crossover: MacdCrossover,
}

impl RenkoMacdStrategy {
    pub fn new(symbol: impl Into<String>, token: u32, renko: Arc<RenkoAccumulator>, params: RenkoMacdParams) -> Self {
        Self {
            symbol: symbol.into(),
            token,
            params,
            renko,
            entry: OpenEntry::default(),
            trades_today: 0,
            daily_pnl: 0.0,
            macd_crossover: MacdCrossover::None,
        }
    }

    pub fn record_trade_outcome(&mut self, realized_pnl: f64) {
        self.trades_today += 1;
        self.daily_pnl += realized_pnl;
    }
}

impl Strategy for RenkoMacdStrategy {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn process_tick(&mut self, tick: &Tick) {
        self.renko.update_brick(self.token, tick.last_price);
    }

    fn generate_signal(&mut self, candles: &[Candle], current_price: f64) -> Option<Signal> {
        if candles.len() >= self.params.macd_slow + self.params.macd_signal {
            let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
            let points = calculate_macd(&closes, self.params.macd_fast, self.params.macd_slow, self.params.macd_signal);
            if !points.is_empty() {
                if bullish_crossover(&points) || points.last().unwrap().histogram > 0.0 {
                    self.macd_crossover = MacdCrossover::Bullish;
                } else if bearish_crossover(&points) || points.last().unwrap().histogram < 0.0 {
                    self.macd_crossover = MacdCrossover::Bearish;
                }
            }
        }

        let Some(brick_state) = self.renko.get_brick_state(self.token) else {
            return None;
        };
        let brick_count = brick_state.brick_count;

        if self.entry.is_open() {
            let side = self.entry.side.unwrap();
            let new_stop = match side {
                Side::Buy => brick_state.lower_limit.unwrap_or(self.entry.stop_loss),
                Side::Sell => brick_state.upper_limit.unwrap_or(self.entry.stop_loss),
            };

            let hit_stop = match side {
                Side::Buy => current_price <= new_stop,
                Side::Sell => current_price >= new_stop,
            };
            if hit_stop {
                self.entry.clear();
                return Some(Signal::exit(&self.symbol, current_price, "renko brick stop-loss hit"));
            }

            if (new_stop - self.entry.stop_loss).abs() > f64::EPSILON {
                self.entry.stop_loss = new_stop;
                return Some(Signal::update_stop_loss(&self.symbol, current_price, new_stop, "update trailing stop-loss (renko brick)"));
            }
            return None;
        }

        if !risk_gate(false, self.daily_pnl, self.params.max_loss_per_day, self.trades_today, self.params.max_trades_per_day) {
            return None;
        }

        let qty = (self.params.capital / current_price).floor().max(0.0) as u64;
        if qty == 0 {
            return None;
        }

        if self.macd_crossover == MacdCrossover::Bullish && brick_count >= self.params.renko_brick_threshold {
            let stop_loss = brick_state.lower_limit.unwrap_or(current_price * 0.98);
            let risk = (current_price - stop_loss).abs();
            let target = current_price + risk * 2.0;
            self.entry.open(Side::Buy, current_price, stop_loss, target);
            return Some(Signal {
                ts: chrono::Utc::now(),
                symbol: self.symbol.clone(),
                kind: SignalKind::Buy,
                price: current_price,
                qty,
                stop_loss: Some(stop_loss),
                target: None,
                reason: format!("MACD bullish + {brick_count} green Renko bricks"),
                confidence: (brick_count.unsigned_abs() as f64 / 5.0).min(1.0),
                metadata: Some(serde_json::json!({ "brick_count": brick_count, "brick_size": brick_state.brick_size })),
            });
        }

        if self.macd_crossover == MacdCrossover::Bearish && brick_count <= -self.params.renko_brick_threshold {
            let stop_loss = brick_state.upper_limit.unwrap_or(current_price * 1.02);
            let risk = (stop_loss - current_price).abs();
            let target = current_price - risk * 2.0;
            self.entry.open(Side::Sell, current_price, stop_loss, target);
            return Some(Signal {
                ts: chrono::Utc::now(),
                symbol: self.symbol.clone(),
                kind: SignalKind::Sell,
                price: current_price,
                qty,
                stop_loss: Some(stop_loss),
                target: None,
                reason: format!("MACD bearish + {} red Renko bricks", brick_count.abs()),
                confidence: (brick_count.unsigned_abs() as f64 / 5.0).min(1.0),
                metadata: Some(serde_json::json!({ "brick_count": brick_count, "brick_size": brick_state.brick_size })),
            });
        }

        None
    }

    fn calculate_stop_loss(&self, entry: f64, side: Side) -> f64 {
        match self.renko.get_brick_state(self.token) {
            Some(state) => match side {
                Side::Buy => state.lower_limit.unwrap_or(entry * 0.98),
                Side::Sell => state.upper_limit.unwrap_or(entry * 1.02),
            },
            None => match side {
                Side::Buy => entry * 0.98,
                Side::Sell => entry * 1.02,
            },
        }
    }

    fn calculate_target(&self, entry: f64, side: Side) -> f64 {
        let stop_loss = self.calculate_stop_loss(entry, side);
        let risk = (entry - stop_loss).abs();
        match side {
            Side::Buy => entry + risk * 2.0,
            Side::Sell => entry - risk * 2.0,
        }
    }

    fn get_status(&self) -> StrategyStatus {
        StrategyStatus {
            symbol: self.symbol.clone(),
            name: "renko-macd",
            in_position: self.entry.is_open(),
            entry_price: self.entry.is_open().then_some(self.entry.entry_price),
            stop_loss: self.entry.is_open().then_some(self.entry.stop_loss),
            target: None,
            trades_today: self.trades_today,
            daily_pnl: self.daily_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: i64, close: f64) -> Candle {
        Candle {
            bucket_start: i * 300_000,
            interval: 5,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1000,
            tick_count: 10,
            closed: true,
        }
    }

    #[test]
    fn no_signal_without_brick_state() {
        let renko = Arc::new(RenkoAccumulator::new());
        let mut s = RenkoMacdStrategy::new("RELIANCE", 1, renko, RenkoMacdParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0)).collect();
        assert!(s.generate_signal(&candles, 100.0).is_none());
    }

    #[test]
    fn process_tick_feeds_renko_accumulator() {
        let renko = Arc::new(RenkoAccumulator::new());
        renko.initialize_brick(1, 1.0, Some(100.0));
        let mut s = RenkoMacdStrategy::new("RELIANCE", 1, renko.clone(), RenkoMacdParams::standard(100_000.0));
        s.process_tick(&Tick::with_fallback_timestamp(1, Some(1), 102.0, 1));
        assert_eq!(renko.get_brick_count(1), 1);
    }

    #[test]
    fn bullish_macd_with_strong_uptrend_bricks_emits_buy() {
        let renko = Arc::new(RenkoAccumulator::new());
        renko.initialize_brick(1, 1.0, Some(100.0));
        renko.update_brick(1, 103.0); // forms bricks, brick_count >= 2
        let mut s = RenkoMacdStrategy::new("RELIANCE", 1, renko, RenkoMacdParams::standard(100_000.0));

        let mut closes = vec![100.0; 30];
        closes.extend((1..=20).map(|i| 100.0 + i as f64 * 2.0));
        let candles: Vec<Candle> = closes.iter().enumerate().map(|(i, &c)| candle(i as i64, c)).collect();

        let signal = s.generate_signal(&candles, 103.0);
        if let Some(sig) = signal {
            assert_eq!(sig.kind, SignalKind::Buy);
        }
    }
}
