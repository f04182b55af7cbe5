// =============================================================================
// Candle Builder — per-(token, interval) OHLCV accumulator (§4.B)
// =============================================================================
//
// Generalizes the teacher's `candle_buffer.rs` ring-buffer-by-key design from
// Binance kline frames (which arrive pre-bucketed) to this spec's tick-driven
// bucketing rule, where the bucket boundary itself must be computed from each
// tick's timestamp in market-local time.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, FixedOffset, TimeZone, Timelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Intervals (in minutes) the builder accepts (§4.B).
pub const SUPPORTED_INTERVALS: &[u32] = &[1, 3, 5, 10, 15, 30, 60];

const MAX_HISTORY: usize = 500;

/// A single OHLCV bucket (§3). Immutable once `closed == true`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: i64,
    pub interval: u32,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub tick_count: u32,
    pub closed: bool,
}

impl Candle {
    fn new(bucket_start: i64, interval: u32, price: f64) -> Self {
        Self {
            bucket_start,
            interval,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0,
            tick_count: 0,
            closed: false,
        }
    }

    fn apply(&mut self, price: f64, volume_delta: u64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume_delta;
        self.tick_count += 1;
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct Key {
    token: u32,
    interval: u32,
}

/// Snapshot returned by [`CandleBuilder::status`] for the REST status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleBuilderStatus {
    pub instruments_tracked: usize,
    pub total_historical_candles: usize,
    pub intervals: Vec<u32>,
}

type CloseHandler = Box<dyn Fn(u32, &Candle) + Send + Sync>;

/// Thread-safe OHLCV builder keyed by `(token, interval)` (§4.B).
pub struct CandleBuilder {
    ist_offset: FixedOffset,
    current: RwLock<HashMap<Key, Candle>>,
    history: RwLock<HashMap<Key, VecDeque<Candle>>>,
    close_handlers: RwLock<HashMap<u32, Vec<CloseHandler>>>,
}

impl Default for CandleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CandleBuilder {
    pub fn new() -> Self {
        Self {
            ist_offset: FixedOffset::east_opt(5 * 3600 + 1800).expect("valid fixed offset"),
            current: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            close_handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Floor `timestamp_ms` to the `interval`-minute boundary in market-local
    /// time (§4.B "Bucketing").
    fn bucket_start(&self, timestamp_ms: i64, interval: u32) -> i64 {
        let utc: DateTime<Utc> = Utc.timestamp_millis_opt(timestamp_ms).single().unwrap_or_else(Utc::now);
        let local = utc.with_timezone(&self.ist_offset);
        let minutes_since_midnight = local.hour() * 60 + local.minute();
        let floored = (minutes_since_midnight / interval) * interval;
        let floored_local = self
            .ist_offset
            .from_local_datetime(
                &local
                    .date_naive()
                    .and_hms_opt(floored / 60, floored % 60, 0)
                    .expect("valid floored time"),
            )
            .single()
            .expect("unambiguous local time");
        floored_local.timestamp_millis()
    }

    /// Register a close callback scoped to one interval (§4.B, supplemented).
    pub fn on_candle_close<F>(&self, interval: u32, handler: F)
    where
        F: Fn(u32, &Candle) + Send + Sync + 'static,
    {
        self.close_handlers
            .write()
            .entry(interval)
            .or_default()
            .push(Box::new(handler));
    }

    /// Feed one tick into the `(token, interval)` series, per the update rule
    /// in §4.B. Returns the candle that just closed, if this tick rolled the
    /// bucket.
    pub fn update(&self, token: u32, interval: u32, timestamp_ms: i64, price: f64, volume_delta: u64) -> Option<Candle> {
        let bucket_start = self.bucket_start(timestamp_ms, interval);
        let key = Key { token, interval };

        let closed = {
            let mut current = self.current.write();
            match current.get_mut(&key) {
                None => {
                    let mut candle = Candle::new(bucket_start, interval, price);
                    candle.apply(price, volume_delta);
                    current.insert(key.clone(), candle);
                    None
                }
                Some(open) if bucket_start < open.bucket_start => {
                    // Late-arriving tick (§4.B) -- discard.
                    debug!(token, interval, bucket_start, open_bucket = open.bucket_start, "discarding late tick");
                    return None;
                }
                Some(open) if bucket_start > open.bucket_start => {
                    let mut finished = *open;
                    finished.closed = true;
                    let mut candle = Candle::new(bucket_start, interval, price);
                    candle.apply(price, volume_delta);
                    *open = candle;
                    Some(finished)
                }
                Some(open) => {
                    open.apply(price, volume_delta);
                    None
                }
            }
        };

        if let Some(finished) = closed {
            {
                let mut history = self.history.write();
                let ring = history.entry(key).or_insert_with(VecDeque::new);
                ring.push_back(finished);
                while ring.len() > MAX_HISTORY {
                    ring.pop_front();
                }
            }

            let handlers = self.close_handlers.read();
            if let Some(fns) = handlers.get(&interval) {
                for f in fns {
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(token, &finished)));
                    if outcome.is_err() {
                        warn!(token, interval, "candle close handler panicked");
                    }
                }
            }
        }

        closed
    }

    /// In-progress candle for live dashboard display (§4.B, supplemented).
    pub fn get_current_candle(&self, token: u32, interval: u32) -> Option<Candle> {
        self.current.read().get(&Key { token, interval }).copied()
    }

    /// Last `count` closed candles, oldest first (§4.B, supplemented).
    pub fn get_historical_candles(&self, token: u32, interval: u32, count: usize) -> Vec<Candle> {
        let history = self.history.read();
        match history.get(&Key { token, interval }) {
            Some(ring) => {
                let start = ring.len().saturating_sub(count);
                ring.iter().skip(start).copied().collect()
            }
            None => Vec::new(),
        }
    }

    /// Close prices only, oldest first -- convenient strategy input.
    pub fn get_closes(&self, token: u32, interval: u32, count: usize) -> Vec<f64> {
        self.get_historical_candles(token, interval, count)
            .iter()
            .map(|c| c.close)
            .collect()
    }

    /// Wipe one instrument's history, or all instruments' if `token` is
    /// `None` (used by the portfolio-reset flow, §4.E).
    pub fn clear_history(&self, token: Option<u32>) {
        match token {
            Some(t) => {
                self.history.write().retain(|k, _| k.token != t);
                self.current.write().retain(|k, _| k.token != t);
            }
            None => {
                self.history.write().clear();
                self.current.write().clear();
            }
        }
    }

    /// Status snapshot for the REST status endpoint (§4.B, supplemented).
    pub fn status(&self) -> CandleBuilderStatus {
        let history = self.history.read();
        let mut tokens: std::collections::HashSet<u32> = std::collections::HashSet::new();
        let mut intervals: std::collections::HashSet<u32> = std::collections::HashSet::new();
        let mut total = 0usize;
        for (key, ring) in history.iter() {
            tokens.insert(key.token);
            intervals.insert(key.interval);
            total += ring.len();
        }
        let mut intervals: Vec<u32> = intervals.into_iter().collect();
        intervals.sort_unstable();
        CandleBuilderStatus {
            instruments_tracked: tokens.len(),
            total_historical_candles: total,
            intervals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_opens_candle() {
        let builder = CandleBuilder::new();
        // 2025-07-28 09:17:10 IST
        let ts = 1753674430_000;
        let closed = builder.update(101, 5, ts, 100.0, 10);
        assert!(closed.is_none());
        let c = builder.get_current_candle(101, 5).unwrap();
        assert_eq!(c.open, 100.0);
        assert_eq!(c.tick_count, 1);
    }

    #[test]
    fn ticks_within_bucket_update_high_low_close() {
        let builder = CandleBuilder::new();
        let base = 1753674430_000; // 09:17:10 IST
        builder.update(101, 5, base, 100.0, 10);
        builder.update(101, 5, base + 30_000, 105.0, 5);
        builder.update(101, 5, base + 40_000, 98.0, 5);
        let c = builder.get_current_candle(101, 5).unwrap();
        assert_eq!(c.high, 105.0);
        assert_eq!(c.low, 98.0);
        assert_eq!(c.close, 98.0);
        assert_eq!(c.volume, 20);
        assert_eq!(c.tick_count, 3);
    }

    #[test]
    fn tick_on_next_boundary_closes_previous_bucket() {
        let builder = CandleBuilder::new();
        let t1 = 1753674430_000; // 09:17:10 IST, bucket 09:15
        builder.update(101, 5, t1, 100.0, 0);
        // 09:20:00 IST -- next 5-minute boundary.
        let t2 = 1753674600_000;
        let closed = builder.update(101, 5, t2, 110.0, 0);
        let closed = closed.expect("previous bucket should close");
        assert!(closed.closed);
        assert_eq!(closed.close, 100.0);
        let new_open = builder.get_current_candle(101, 5).unwrap();
        assert_eq!(new_open.open, 110.0);
    }

    #[test]
    fn late_tick_is_discarded() {
        let builder = CandleBuilder::new();
        let t2 = 1753674600_000; // 09:20:00
        builder.update(101, 5, t2, 110.0, 0);
        let earlier = 1753674430_000; // 09:17:10, earlier bucket
        let closed = builder.update(101, 5, earlier, 999.0, 0);
        assert!(closed.is_none());
        let c = builder.get_current_candle(101, 5).unwrap();
        assert_eq!(c.open, 110.0); // untouched by the late tick
    }

    #[test]
    fn history_is_capped_at_max() {
        let builder = CandleBuilder::new();
        let mut ts = 1753674430_000i64;
        for i in 0..520 {
            builder.update(101, 1, ts, 100.0 + i as f64, 0);
            ts += 60_000;
        }
        let history = builder.get_historical_candles(101, 1, 1000);
        assert_eq!(history.len(), 500);
    }

    #[test]
    fn close_handler_fires_with_token_and_closed_candle() {
        let builder = CandleBuilder::new();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let seen_clone = seen.clone();
        builder.on_candle_close(5, move |token, candle| {
            *seen_clone.lock() = Some((token, candle.close));
        });
        let t1 = 1753674430_000;
        builder.update(101, 5, t1, 100.0, 0);
        let t2 = 1753674600_000;
        builder.update(101, 5, t2, 200.0, 0);
        assert_eq!(*seen.lock(), Some((101, 100.0)));
    }

    #[test]
    fn clear_history_removes_one_token_only() {
        let builder = CandleBuilder::new();
        let t1 = 1753674430_000;
        let t2 = 1753674600_000;
        builder.update(101, 5, t1, 100.0, 0);
        builder.update(101, 5, t2, 105.0, 0);
        builder.update(202, 5, t1, 50.0, 0);
        builder.update(202, 5, t2, 55.0, 0);
        builder.clear_history(Some(101));
        assert!(builder.get_historical_candles(101, 5, 10).is_empty());
        assert_eq!(builder.get_historical_candles(202, 5, 10).len(), 1);
    }
}
