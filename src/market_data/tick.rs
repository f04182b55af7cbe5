// =============================================================================
// Tick — single price/volume observation from the upstream market-data feed
// =============================================================================

use serde::{Deserialize, Serialize};

/// Streaming subscription depth requested for a token (§4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickMode {
    Ltp,
    Quote,
    Full,
}

/// One top-of-book side entry, present only in `Full` mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: u64,
}

/// A single tick from the upstream streaming source (§3).
///
/// `timestamp` is always populated — if the upstream payload omits it, the
/// Tick Hub substitutes the local receive instant before the tick reaches any
/// consumer (§4.A "Timestamping").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub token: u32,
    pub timestamp: i64,
    pub last_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_traded: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oi: Option<i64>,
}

impl Tick {
    /// Construct a tick, substituting `receive_instant_ms` for a missing
    /// upstream timestamp (§4.A).
    pub fn with_fallback_timestamp(
        token: u32,
        timestamp: Option<i64>,
        last_price: f64,
        receive_instant_ms: i64,
    ) -> Self {
        Self {
            token,
            timestamp: timestamp.unwrap_or(receive_instant_ms),
            last_price,
            volume_traded: None,
            bid: None,
            ask: None,
            oi: None,
        }
    }
}

/// Everything the Tick Hub knows about one subscribed instrument (§4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentMeta {
    pub token: u32,
    pub symbol: String,
    pub exchange: String,
    pub mode: TickMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_timestamp_falls_back_to_receive_instant() {
        let tick = Tick::with_fallback_timestamp(101, None, 2500.0, 1_700_000_000_000);
        assert_eq!(tick.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn present_timestamp_is_kept() {
        let tick = Tick::with_fallback_timestamp(101, Some(42), 2500.0, 1_700_000_000_000);
        assert_eq!(tick.timestamp, 42);
    }
}
