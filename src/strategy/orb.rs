// =============================================================================
// Opening-range breakout (ORB) strategy family (§4.F)
// =============================================================================
//
// Grounded on `orb_strategy.py`'s `ORBStrategy`, but resolved more precisely:
// the original fell back to ad hoc `datetime` parsing of the candle
// dataframe's index to find "today's" opening window. Here the bucket
// boundaries are already market-local IST minute buckets (`Candle::bucket_start`,
// §4.B), so the range is derived directly from candles whose bucket falls in
// `[09:15, 09:15 + range_minutes)` on the current IST calendar day, using
// `market_clock::ist_offset` for the same local-time interpretation the
// Candle Builder uses.
// =============================================================================

use chrono::{TimeZone, Timelike};

use crate::market_clock::ist_offset;
use crate::market_data::Candle;
use crate::types::Side;

use super::{check_exit, risk_gate, OpenEntry, Signal, SignalKind, Strategy, StrategyStatus};

#[derive(Debug, Clone, Copy)]
pub struct OrbParams {
    pub range_minutes: i64,
    pub sl_pct: f64,
    pub target_pct: f64,
    pub capital: f64,
    pub risk_per_trade: f64,
    pub max_loss_per_day: f64,
    pub max_trades_per_day: u32,
}

impl OrbParams {
    pub fn standard(capital: f64) -> Self {
        Self {
            range_minutes: 15,
            sl_pct: 0.005,
            target_pct: 0.01,
            capital,
            risk_per_trade: 0.01,
            max_loss_per_day: 5_000.0,
            max_trades_per_day: 20,
        }
    }
}

pub struct OrbStrategy {
    symbol: String,
    params: OrbParams,
    entry: OpenEntry,
    trades_today: u32,
    daily_pnl: f64,
    range_high: Option<f64>,
    range_low: Option<f64>,
    range_day: Option<chrono::NaiveDate>,
}

impl OrbStrategy {
    pub fn new(symbol: impl Into<String>, params: OrbParams) -> Self {
        Self {
            symbol: symbol.into(),
            params,
            entry: OpenEntry::default(),
            trades_today: 0,
            daily_pnl: 0.0,
            range_high: None,
            range_low: None,
            range_day: None,
        }
    }

    pub fn record_trade_outcome(&mut self, realized_pnl: f64) {
        self.trades_today += 1;
        self.daily_pnl += realized_pnl;
    }

    /// Recompute the opening range from candles whose bucket falls inside
    /// `[09:15, 09:15 + range_minutes)` on `today`, if not already set for it.
    fn refresh_range(&mut self, candles: &[Candle]) {
        let offset = ist_offset();
        let last_bucket = candles.last().map(|c| c.bucket_start);
        let Some(last_bucket) = last_bucket else { return };
        let today = offset.timestamp_millis_opt(last_bucket).single().map(|dt| dt.date_naive());
        let Some(today) = today else { return };

        if self.range_day == Some(today) {
            return;
        }

        let open_start_minutes = 9 * 60 + 15;
        let range_end_minutes = open_start_minutes + self.params.range_minutes;

        let mut high: Option<f64> = None;
        let mut low: Option<f64> = None;
        let mut saw_full_window = false;

        for c in candles {
            let Some(dt) = offset.timestamp_millis_opt(c.bucket_start).single() else { continue };
            if dt.date_naive() != today {
                continue;
            }
            let minutes_of_day = dt.hour() as i64 * 60 + dt.minute() as i64;
            if minutes_of_day < open_start_minutes {
                continue;
            }
            if minutes_of_day >= range_end_minutes {
                saw_full_window = true;
                continue;
            }
            high = Some(high.map_or(c.high, |h: f64| h.max(c.high)));
            low = Some(low.map_or(c.low, |l: f64| l.min(c.low)));
        }

        if saw_full_window && high.is_some() && low.is_some() {
            self.range_high = high;
            self.range_low = low;
            self.range_day = Some(today);
        }
    }
}

impl Strategy for OrbStrategy {
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

        if candles.is_empty() {
            return None;
        }

        self.refresh_range(candles);

        let (Some(range_high), Some(range_low)) = (self.range_high, self.range_low) else {
            return None;
        };

        let side = if current_price > range_high {
            Side::Buy
        } else if current_price < range_low {
            Side::Sell
        } else {
            return None;
        };

        let stop_loss = match side {
            Side::Buy => range_low,
            Side::Sell => range_high,
        };
        let target = self.calculate_target(current_price, side);
        let qty = super::default_position_size(self.params.capital, self.params.risk_per_trade, current_price, stop_loss);
        if qty == 0 {
            return None;
        }

        self.entry.open(side, current_price, stop_loss, target);
        // Opening range is one-shot for the session; clear it so no further
        // entries are attempted today after this breakout fires.
        self.range_high = None;
        self.range_low = None;

        Some(Signal {
            ts: chrono::Utc::now(),
            symbol: self.symbol.clone(),
            kind: if side == Side::Buy { SignalKind::Buy } else { SignalKind::Sell },
            price: current_price,
            qty,
            stop_loss: Some(stop_loss),
            target: Some(target),
            reason: format!(
                "ORB breakout {} range [{range_low:.2}, {range_high:.2}]",
                if side == Side::Buy { "above" } else { "below" }
            ),
            confidence: 0.8,
            metadata: None,
        })
    }

    fn calculate_stop_loss(&self, entry: f64, side: Side) -> f64 {
        match side {
            Side::Buy => entry * (1.0 - self.params.sl_pct),
            Side::Sell => entry * (1.0 + self.params.sl_pct),
        }
    }

    fn calculate_target(&self, entry: f64, side: Side) -> f64 {
        match side {
            Side::Buy => entry * (1.0 + self.params.target_pct),
            Side::Sell => entry * (1.0 - self.params.target_pct),
        }
    }

    fn get_status(&self) -> StrategyStatus {
        StrategyStatus {
            symbol: self.symbol.clone(),
            name: "opening-range-breakout",
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
    use chrono::NaiveDate;

    fn bucket_ms(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
        ist_offset()
            .from_local_datetime(&NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap())
            .single()
            .unwrap()
            .timestamp_millis()
    }

    fn candle(bucket_start: i64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            bucket_start,
            interval: 5,
            open: close,
            high,
            low,
            close,
            volume: 1000,
            tick_count: 10,
            closed: true,
        }
    }

    #[test]
    fn no_signal_before_range_forms() {
        let mut s = OrbStrategy::new("RELIANCE", OrbParams::standard(100_000.0));
        let candles = vec![candle(bucket_ms(2025, 7, 28, 9, 15), 101.0, 99.0, 100.0)];
        assert!(s.generate_signal(&candles, 100.0).is_none());
    }

    #[test]
    fn breakout_above_range_high_emits_buy() {
        let mut s = OrbStrategy::new("RELIANCE", OrbParams::standard(100_000.0));
        let candles = vec![
            candle(bucket_ms(2025, 7, 28, 9, 15), 101.0, 99.0, 100.0),
            candle(bucket_ms(2025, 7, 28, 9, 20), 102.0, 100.0, 101.0),
            candle(bucket_ms(2025, 7, 28, 9, 35), 103.0, 102.0, 102.5),
        ];
        let signal = s.generate_signal(&candles, 103.5).unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
        assert_eq!(signal.stop_loss, Some(99.0));
    }

    #[test]
    fn breakdown_below_range_low_emits_sell() {
        let mut s = OrbStrategy::new("RELIANCE", OrbParams::standard(100_000.0));
        let candles = vec![
            candle(bucket_ms(2025, 7, 28, 9, 15), 101.0, 99.0, 100.0),
            candle(bucket_ms(2025, 7, 28, 9, 20), 100.5, 98.0, 99.0),
            candle(bucket_ms(2025, 7, 28, 9, 35), 99.0, 96.0, 97.0),
        ];
        let signal = s.generate_signal(&candles, 95.5).unwrap();
        assert_eq!(signal.kind, SignalKind::Sell);
        assert_eq!(signal.stop_loss, Some(101.0));
    }
}
