// =============================================================================
// Price-action breakout strategy family (§4.F)
// =============================================================================
//
// Grounded on `breakout_strategy.py`'s `BreakoutStrategy`: recompute nearby
// support/resistance levels from pivot swing points every `lookback_period`
// candles, require the breakout candle's volume to exceed a multiple of the
// trailing 20-candle average (using candle volume, not tick volume -- see
// DESIGN.md open question), and size the target off the next level beyond
// the one just broken, falling back to a minimum risk-reward ratio when no
// further level exists.
// =============================================================================

use crate::market_data::Candle;
use crate::types::Side;

use super::{check_exit, risk_gate, OpenEntry, Signal, SignalKind, Strategy, StrategyStatus};

#[derive(Debug, Clone, Copy)]
pub struct BreakoutParams {
    pub lookback_period: usize,
    pub volume_multiplier: f64,
    pub min_rr_ratio: f64,
    pub capital: f64,
    pub risk_per_trade: f64,
    pub max_loss_per_day: f64,
    pub max_trades_per_day: u32,
}

impl BreakoutParams {
    pub fn standard(capital: f64) -> Self {
        Self {
            lookback_period: 20,
            volume_multiplier: 1.2,
            min_rr_ratio: 1.5,
            capital,
            risk_per_trade: 0.02,
            max_loss_per_day: 5_000.0,
            max_trades_per_day: 20,
        }
    }
}

/// Swing-point support/resistance levels, refreshed every `lookback_period`
/// candles rather than on every evaluation.
fn find_levels(candles: &[Candle], lookback: usize) -> (Vec<f64>, Vec<f64>) {
    let window = &candles[candles.len().saturating_sub(lookback * 2)..];
    let mut support = Vec::new();
    let mut resistance = Vec::new();

    for i in 2..window.len().saturating_sub(2) {
        let c = &window[i];
        let is_swing_high = window[i - 2..i].iter().all(|p| p.high <= c.high)
            && window[i + 1..=i + 2].iter().all(|n| n.high <= c.high);
        let is_swing_low = window[i - 2..i].iter().all(|p| p.low >= c.low)
            && window[i + 1..=i + 2].iter().all(|n| n.low >= c.low);

        if is_swing_high {
            resistance.push(c.high);
        }
        if is_swing_low {
            support.push(c.low);
        }
    }

    (support, resistance)
}

fn nearest_above(levels: &[f64], price: f64) -> Option<f64> {
    levels.iter().copied().filter(|&l| l > price).fold(None, |acc, l| {
        Some(acc.map_or(l, |a: f64| a.min(l)))
    })
}

fn nearest_below(levels: &[f64], price: f64) -> Option<f64> {
    levels.iter().copied().filter(|&l| l < price).fold(None, |acc, l| {
        Some(acc.map_or(l, |a: f64| a.max(l)))
    })
}

pub struct BreakoutStrategy {
    symbol: String,
    params: BreakoutParams,
    entry: OpenEntry,
    trades_today: u32,
    daily_pnl: f64,
    support: Vec<f64>,
    resistance: Vec<f64>,
    candles_since_refresh: usize,
}

impl BreakoutStrategy {
    pub fn new(symbol: impl Into<String>, params: BreakoutParams) -> Self {
        Self {
            symbol: symbol.into(),
            params,
            entry: OpenEntry::default(),
            trades_today: 0,
            daily_pnl: 0.0,
            support: Vec::new(),
            resistance: Vec::new(),
            candles_since_refresh: usize::MAX,
        }
    }

    pub fn record_trade_outcome(&mut self, realized_pnl: f64) {
        self.trades_today += 1;
        self.daily_pnl += realized_pnl;
    }
}

impl Strategy for BreakoutStrategy {
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

        if candles.len() < self.params.lookback_period + 5 {
            return None;
        }

        if self.candles_since_refresh >= self.params.lookback_period {
            let (s, r) = find_levels(candles, self.params.lookback_period);
            self.support = s;
            self.resistance = r;
            self.candles_since_refresh = 0;
        } else {
            self.candles_since_refresh += 1;
        }

        let avg_volume: f64 = {
            let n = 20.min(candles.len());
            candles[candles.len() - n..].iter().map(|c| c.volume as f64).sum::<f64>() / n as f64
        };
        let current = candles.last().unwrap();
        let previous = &candles[candles.len() - 2];
        let volume_confirmed = (current.volume as f64) > avg_volume * self.params.volume_multiplier;
        if !volume_confirmed || avg_volume <= 0.0 {
            return None;
        }

        if let Some(broken) = nearest_above(&self.resistance, previous.close) {
            if current.close > broken {
                let stop_loss = broken * 0.995;
                let next_resistance = nearest_above(&self.resistance, current.close);
                let target = next_resistance.map(|r| r * 0.995).unwrap_or_else(|| {
                    current_price + (current_price - stop_loss) * self.params.min_rr_ratio
                });
                let risk = current_price - stop_loss;
                let reward = target - current_price;
                if risk > 0.0 && reward / risk >= self.params.min_rr_ratio {
                    let qty = super::default_position_size(self.params.capital, self.params.risk_per_trade, current_price, stop_loss);
                    if qty > 0 {
                        self.entry.open(Side::Buy, current_price, stop_loss, target);
                        return Some(Signal {
                            ts: chrono::Utc::now(),
                            symbol: self.symbol.clone(),
                            kind: SignalKind::Buy,
                            price: current_price,
                            qty,
                            stop_loss: Some(stop_loss),
                            target: Some(target),
                            reason: format!("resistance breakout @ {broken:.2} with volume"),
                            confidence: 0.85,
                            metadata: Some(serde_json::json!({ "broken_level": broken, "volume_ratio": current.volume as f64 / avg_volume })),
                        });
                    }
                }
            }
        }

        if let Some(broken) = nearest_below(&self.support, previous.close) {
            if current.close < broken {
                let stop_loss = broken * 1.005;
                let next_support = nearest_below(&self.support, current.close);
                let target = next_support.map(|s| s * 1.005).unwrap_or_else(|| {
                    current_price - (stop_loss - current_price) * self.params.min_rr_ratio
                });
                let risk = stop_loss - current_price;
                let reward = current_price - target;
                if risk > 0.0 && reward / risk >= self.params.min_rr_ratio {
                    let qty = super::default_position_size(self.params.capital, self.params.risk_per_trade, current_price, stop_loss);
                    if qty > 0 {
                        self.entry.open(Side::Sell, current_price, stop_loss, target);
                        return Some(Signal {
                            ts: chrono::Utc::now(),
                            symbol: self.symbol.clone(),
                            kind: SignalKind::Sell,
                            price: current_price,
                            qty,
                            stop_loss: Some(stop_loss),
                            target: Some(target),
                            reason: format!("support breakdown @ {broken:.2} with volume"),
                            confidence: 0.85,
                            metadata: Some(serde_json::json!({ "broken_level": broken, "volume_ratio": current.volume as f64 / avg_volume })),
                        });
                    }
                }
            }
        }

        None
    }

    fn calculate_stop_loss(&self, entry: f64, side: Side) -> f64 {
        match side {
            Side::Buy => entry * 0.98,
            Side::Sell => entry * 1.02,
        }
    }

    fn calculate_target(&self, entry: f64, side: Side) -> f64 {
        match side {
            Side::Buy => entry * 1.03,
            Side::Sell => entry * 0.97,
        }
    }

    fn get_status(&self) -> StrategyStatus {
        StrategyStatus {
            symbol: self.symbol.clone(),
            name: "price-action-breakout",
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

    fn candle(i: i64, close: f64, volume: u64) -> Candle {
        Candle {
            bucket_start: i * 300_000,
            interval: 5,
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume,
            tick_count: 10,
            closed: true,
        }
    }

    #[test]
    fn no_signal_with_insufficient_candles() {
        let mut s = BreakoutStrategy::new("RELIANCE", BreakoutParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..5).map(|i| candle(i, 100.0, 1000)).collect();
        assert!(s.generate_signal(&candles, 100.0).is_none());
    }

    #[test]
    fn no_signal_without_volume_confirmation() {
        let mut s = BreakoutStrategy::new("RELIANCE", BreakoutParams::standard(100_000.0));
        let candles: Vec<Candle> = (0..40).map(|i| candle(i, 100.0 + (i % 5) as f64, 1000)).collect();
        assert!(s.generate_signal(&candles, 105.0).is_none());
    }

    #[test]
    fn exit_monitoring_clears_open_entry() {
        let mut s = BreakoutStrategy::new("RELIANCE", BreakoutParams::standard(100_000.0));
        s.entry.open(Side::Buy, 100.0, 98.0, 105.0);
        let candles: Vec<Candle> = (0..30).map(|i| candle(i, 100.0, 1000)).collect();
        let signal = s.generate_signal(&candles, 97.0).unwrap();
        assert_eq!(signal.kind, SignalKind::Exit);
        assert!(!s.entry.is_open());
    }
}
