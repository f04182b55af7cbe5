// =============================================================================
// Historical Fetcher — interval-aware window chunking (§4.D)
// =============================================================================
//
// Grounded on the teacher's `binance/client.rs::get_klines` (an HTTP client
// method returning parsed OHLCV rows) for the per-window fetch shape, and on
// `risk.rs`'s `anyhow::Context` usage for wrapping upstream failures with
// enough detail to act on -- here, the failing window's bounds.
// =============================================================================

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::sync::Arc;

use super::upstream::{RawCandle, UpstreamClient};

const SECONDS_PER_DAY: i64 = 86_400;

/// Maximum days per single upstream request, by interval (§4.D).
fn max_days_for_interval(interval: &str) -> i64 {
    match interval {
        "day" => 2000,
        "60minute" | "60min" => 200,
        "30minute" | "30min" | "15minute" | "15min" => 100,
        _ => 60, // 5/3/1-minute and anything finer
    }
}

/// Fetch `[from, to]` (unix seconds, inclusive) for `token` at `interval`,
/// transparently splitting into `limit`-day windows when the range exceeds
/// the interval's per-request bound, deduplicating by timestamp (first
/// occurrence wins) and sorting ascending (§4.D, §8 scenario 5).
pub async fn fetch_historical(
    client: &Arc<dyn UpstreamClient>,
    token: u32,
    from: i64,
    to: i64,
    interval: &str,
) -> Result<Vec<RawCandle>> {
    let limit_days = max_days_for_interval(interval);
    let limit_secs = limit_days * SECONDS_PER_DAY;

    let windows = split_windows(from, to, limit_secs);

    let mut all = Vec::new();
    for (win_from, win_to) in &windows {
        let chunk = client
            .fetch_candles(token, *win_from, *win_to, interval)
            .await
            .with_context(|| {
                format!(
                    "historical fetch failed for token {token} interval {interval} window [{win_from}, {win_to}]"
                )
            })?;
        all.extend(chunk);
    }

    Ok(dedupe_sort(all))
}

/// Split `[from, to]` into consecutive `limit_secs`-wide windows, inclusive
/// bounds (§4.D).
fn split_windows(from: i64, to: i64, limit_secs: i64) -> Vec<(i64, i64)> {
    if to - from <= limit_secs {
        return vec![(from, to)];
    }

    let mut windows = Vec::new();
    let mut cursor = from;
    while cursor < to {
        let window_end = (cursor + limit_secs).min(to);
        windows.push((cursor, window_end));
        cursor = window_end;
    }
    windows
}

/// Deduplicate by timestamp (keep first occurrence) and sort ascending.
fn dedupe_sort(mut candles: Vec<RawCandle>) -> Vec<RawCandle> {
    let mut seen = HashSet::new();
    candles.retain(|c| seen.insert(c.timestamp));
    candles.sort_by_key(|c| c.timestamp);
    candles
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    struct FakeClient {
        windows_seen: std::sync::Mutex<Vec<(i64, i64)>>,
    }

    #[async_trait::async_trait]
    impl UpstreamClient for FakeClient {
        async fn connect_stream(&self) -> Result<mpsc::Receiver<crate::market_data::tick::Tick>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn subscribe(&self, _tokens: &[u32], _mode: crate::market_data::tick::TickMode) -> Result<()> {
            Ok(())
        }
        async fn get_ltp(&self, _keys: &[String]) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
        async fn fetch_candles(&self, _token: u32, from: i64, to: i64, _interval: &str) -> Result<Vec<RawCandle>> {
            self.windows_seen.lock().unwrap().push((from, to));
            Ok(vec![RawCandle {
                timestamp: from,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1,
            }])
        }
    }

    #[test]
    fn single_window_when_within_limit() {
        let windows = split_windows(0, 10 * SECONDS_PER_DAY, 60 * SECONDS_PER_DAY);
        assert_eq!(windows, vec![(0, 10 * SECONDS_PER_DAY)]);
    }

    #[test]
    fn scenario_5_splits_into_two_windows() {
        // §8 scenario 5: ~120 days at a 60-day limit -> exactly 2 windows.
        let from = 0;
        let to = 120 * SECONDS_PER_DAY;
        let windows = split_windows(from, to, 60 * SECONDS_PER_DAY);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0], (0, 60 * SECONDS_PER_DAY));
        assert_eq!(windows[1], (60 * SECONDS_PER_DAY, 120 * SECONDS_PER_DAY));
    }

    #[test]
    fn dedupe_keeps_first_occurrence_and_sorts() {
        let candles = vec![
            RawCandle { timestamp: 300, open: 9.0, high: 9.0, low: 9.0, close: 9.0, volume: 0 },
            RawCandle { timestamp: 100, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 0 },
            RawCandle { timestamp: 100, open: 2.0, high: 2.0, low: 2.0, close: 2.0, volume: 0 },
            RawCandle { timestamp: 200, open: 3.0, high: 3.0, low: 3.0, close: 3.0, volume: 0 },
        ];
        let out = dedupe_sort(candles);
        let timestamps: Vec<i64> = out.iter().map(|c| c.timestamp).collect();
        assert_eq!(timestamps, vec![100, 200, 300]);
        assert_eq!(out[0].open, 1.0); // first occurrence kept
    }

    #[tokio::test]
    async fn fetch_historical_walks_all_windows_and_dedupes() {
        let client: Arc<dyn UpstreamClient> = Arc::new(FakeClient { windows_seen: std::sync::Mutex::new(Vec::new()) });
        let result = fetch_historical(&client, 101, 0, 120 * SECONDS_PER_DAY, "5minute").await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].timestamp, 0);
        assert_eq!(result[1].timestamp, 60 * SECONDS_PER_DAY);
    }
}
