// =============================================================================
// Supertrend-triplet strategy family (§4.F)
// =============================================================================
//
// Grounded on `supertrend_strategy.py`'s `SupertrendStrategy`: three
// Supertrend series at distinct (period, multiplier) pairs must all agree on
// direction before an entry fires; once in a position, every evaluation
// re-emits a HOLD with an updated trailing stop from
// `indicators::supertrend::blended_trailing_stop` rather than a fixed target,
// since the original trails risk with the Supertrend bands instead of taking
// profit at a level.
// =============================================================================

use crate::indicators::supertrend::{blended_trailing_stop, calculate_supertrend, Trend};
use crate::market_data::Candle;
use crate::types::Side;

use super::{risk_gate, OpenEntry, Signal, SignalKind, Strategy, StrategyStatus};

#[derive(Debug, Clone, Copy)]
pub struct SupertrendParams {
    pub st1_period: usize,
    pub st1_multiplier: f64,
    pub st2_period: usize,
    pub st2_multiplier: f64,
    pub st3_period: usize,
    pub st3_multiplier: f64,
    pub capital: f64,
    pub max_loss_per_day: f64,
    pub max_trades_per_day: u32,
}

impl SupertrendParams {
    pub fn standard(capital: f64) -> Self {
        Self {
            st1_period: 7,
            st1_multiplier: 3.0,
            st2_period: 10,
            st2_multiplier: 3.0,
            st3_period: 11,
            st3_multiplier: 2.0,
            capital,
            max_loss_per_day: 5_000.0,
            max_trades_per_day: 20,
        }
    }
}

pub struct SupertrendStrategy {
    symbol: String,
    params: SupertrendParams,
    entry: OpenEntry,
    trades_today: u32,
    daily_pnl: f64,
}

impl SupertrendStrategy {
    pub fn new(symbol: impl Into<String>, params: SupertrendParams) -> Self {
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
}

impl Strategy for SupertrendStrategy {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn generate_signal(&mut self, candles: &[Candle], current_price: f64) -> Option<Signal> {
        let st1 = calculate_supertrend(candles, self.params.st1_period, self.params.st1_multiplier);
        let st2 = calculate_supertrend(candles, self.params.st2_period, self.params.st2_multiplier);
        let st3 = calculate_supertrend(candles, self.params.st3_period, self.params.st3_multiplier);

        let (Some(p1), Some(p2), Some(p3)) = (st1.last(), st2.last(), st3.last()) else {
            return None;
        };
        let values = [p1.value, p2.value, p3.value];

        if self.entry.is_open() {
            let new_stop = blended_trailing_stop(&values, current_price);
            let side = self.entry.side.unwrap();
            // Trailing stop only ever tightens toward price, never loosens.
            let tightened = match side {
                Side::Buy => new_stop.max(self.entry.stop_loss),
                Side::Sell => new_stop.min(self.entry.stop_loss),
            };

            let hit_stop = match side {
                Side::Buy => current_price <= tightened,
                Side::Sell => current_price >= tightened,
            };
            if hit_stop {
                self.entry.clear();
                return Some(Signal::exit(&self.symbol, current_price, "trailing stop-loss hit"));
            }

            if (tightened - self.entry.stop_loss).abs() > f64::EPSILON {
                self.entry.stop_loss = tightened;
                return Some(Signal::update_stop_loss(&self.symbol, current_price, tightened, "update trailing stop-loss"));
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

        let all_green = p1.trend == Trend::Up && p2.trend == Trend::Up && p3.trend == Trend::Up;
        let all_red = p1.trend == Trend::Down && p2.trend == Trend::Down && p3.trend == Trend::Down;

        let side = if all_green {
            Side::Buy
        } else if all_red {
            Side::Sell
        } else {
            return None;
        };

        let stop_loss = blended_trailing_stop(&values, current_price);
        self.entry.open(side, current_price, stop_loss, 0.0);

        Some(Signal {
            ts: chrono::Utc::now(),
            symbol: self.symbol.clone(),
            kind: if side == Side::Buy { SignalKind::Buy } else { SignalKind::Sell },
            price: current_price,
            qty,
            stop_loss: Some(stop_loss),
            target: None,
            reason: if side == Side::Buy {
                "all 3 supertrends GREEN -- bullish alignment".to_string()
            } else {
                "all 3 supertrends RED -- bearish alignment".to_string()
            },
            confidence: 1.0,
            metadata: None,
        })
    }

    fn calculate_stop_loss(&self, entry: f64, side: Side) -> f64 {
        match side {
            Side::Buy => entry * 0.98,
            Side::Sell => entry * 1.02,
        }
    }

    fn calculate_target(&self, entry: f64, side: Side) -> f64 {
        // No fixed target: exits are managed by the trailing stop. This is a
        // nominal 3% figure for display purposes only (§4.F).
        match side {
            Side::Buy => entry * 1.03,
            Side::Sell => entry * 0.97,
        }
    }

    fn get_status(&self) -> StrategyStatus {
        StrategyStatus {
            symbol: self.symbol.clone(),
            name: "supertrend-triplet",
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

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            bucket_start: i * 60_000,
            interval: 1,
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
        let mut s = SupertrendStrategy::new("RELIANCE", SupertrendParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 100.0, 101.0, 99.0, 100.0)).collect();
        assert!(s.generate_signal(&candles, 100.0).is_none());
    }

    #[test]
    fn steadily_rising_series_opens_long() {
        let mut s = SupertrendStrategy::new("RELIANCE", SupertrendParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(i, base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        let last_price = candles.last().unwrap().close;
        let signal = s.generate_signal(&candles, last_price);
        if let Some(sig) = signal {
            assert_eq!(sig.kind, SignalKind::Buy);
            assert!(s.entry.is_open());
        }
    }

    #[test]
    fn open_position_emits_trailing_stop_update_or_exit() {
        let mut s = SupertrendStrategy::new("RELIANCE", SupertrendParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..60)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(i, base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect();
        s.entry.open(Side::Buy, 150.0, 140.0, 0.0);
        let last_price = candles.last().unwrap().close;
        let signal = s.generate_signal(&candles, last_price).unwrap();
        assert!(matches!(signal.kind, SignalKind::Hold | SignalKind::Exit));
    }
}
