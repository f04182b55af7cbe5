// =============================================================================
// Upstream Client — abstract broker transport (§1, §1a)
// =============================================================================
//
// Signing/auth against a specific broker is explicitly out of scope (§1). This
// generalizes the teacher's `binance/client.rs` -- an HMAC-SHA256 signed REST
// client hardcoded to one exchange's wire format -- into a trait any upstream
// can implement, while keeping the signing primitives (`hmac`/`sha2`/`hex`)
// and the `reqwest` + `anyhow::Context` request idiom the teacher established.
// =============================================================================

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::sync::mpsc;
use tracing::debug;

use super::tick::{Tick, TickMode};

type HmacSha256 = Hmac<Sha256>;

/// A single OHLCV row as returned by the upstream's historical-candle query
/// (§6 "Historical candle query").
#[derive(Debug, Clone, Copy)]
pub struct RawCandle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Abstracts the upstream market-data source so the core never hard-codes one
/// broker's signing scheme or wire format (§1a "Upstream transport").
///
/// Implementations own their own connection/auth state; the Tick Hub only
/// calls through this trait.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Open the streaming connection and return a channel of ticks. The
    /// receiver end is driven by [`crate::market_data::tick_hub::TickHub`]
    /// until it closes or errors, at which point the hub reconnects.
    async fn connect_stream(&self) -> Result<mpsc::Receiver<Tick>>;

    /// Subscribe (or change mode for) the given tokens on the open stream.
    async fn subscribe(&self, tokens: &[u32], mode: TickMode) -> Result<()>;

    /// Request/response LTP query given `["EX:SYMBOL", ...]` keys (§6).
    async fn get_ltp(&self, keys: &[String]) -> Result<HashMap<String, f64>>;

    /// Historical candle query for one interval-bounded window. Callers
    /// needing a larger range go through `market_data::historical` for
    /// chunking (§4.D); this method fetches exactly one window.
    async fn fetch_candles(
        &self,
        _token: u32,
        _from: i64,
        _to: i64,
        _interval: &str,
    ) -> Result<Vec<RawCandle>> {
        anyhow::bail!("historical candle query not implemented by this upstream client")
    }
}

/// Generic HMAC-SHA256 signed REST client, generalized from the teacher's
/// `binance/client.rs`. A concrete broker integration plugs in its own
/// `base_url`/endpoint paths and implements [`UpstreamClient`] in terms of
/// `signed_query`/`sign` below; those two primitives are kept verbatim since
/// the signing *mechanism* (not the broker's specific scheme) is ambient.
#[derive(Clone)]
pub struct SignedRestClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: reqwest::Client,
}

const RECV_WINDOW_MS: u64 = 5000;

impl SignedRestClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build reqwest client"),
        }
    }

    pub fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    pub fn signed_query(&self, params: &str) -> String {
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow={RECV_WINDOW_MS}")
        } else {
            format!("{params}&timestamp={ts}&recvWindow={RECV_WINDOW_MS}")
        };
        let sig = self.sign(&base);
        format!("{base}&signature={sig}")
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// GET an LTP quote for symbols already formatted as `EX:SYMBOL`. Shape
    /// matches §6's upstream LTP response: `{ "EX:SYMBOL": { last_price } }`.
    pub async fn get_ltp(&self, keys: &[String]) -> Result<HashMap<String, f64>> {
        let joined = keys.join(",");
        let qs = self.signed_query(&format!("i={joined}"));
        let url = format!("{}/quote/ltp?{}", self.base_url, qs);

        let resp = self
            .http
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .send()
            .await
            .context("LTP query request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp.json().await.context("failed to parse LTP response")?;
        if !status.is_success() {
            anyhow::bail!("upstream LTP query returned {}: {}", status, body);
        }

        let mut out = HashMap::new();
        if let Some(obj) = body.as_object() {
            for (key, v) in obj {
                if let Some(price) = v.get("last_price").and_then(|p| p.as_f64()) {
                    out.insert(key.clone(), price);
                }
            }
        }
        debug!(count = out.len(), "LTP batch retrieved");
        Ok(out)
    }
}

impl std::fmt::Debug for SignedRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedRestClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Concrete, broker-agnostic `UpstreamClient` over a WebSocket tick feed plus
/// the REST primitives above. The wire format (subscribe-frame shape,
/// tick-frame shape) is generic JSON rather than any one broker's actual
/// protocol, since the signing/framing of a specific upstream is out of scope
/// (§1); a real deployment swaps this for a broker-specific implementation of
/// the same trait.
pub struct WsUpstreamClient {
    rest: SignedRestClient,
    feed_url: String,
    writer: tokio::sync::Mutex<Option<futures_util::stream::SplitSink<WsStream, tokio_tungstenite::tungstenite::Message>>>,
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

impl WsUpstreamClient {
    pub fn new(rest: SignedRestClient, feed_url: impl Into<String>) -> Self {
        Self {
            rest,
            feed_url: feed_url.into(),
            writer: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl UpstreamClient for WsUpstreamClient {
    async fn connect_stream(&self) -> Result<mpsc::Receiver<Tick>> {
        use futures_util::{SinkExt, StreamExt};

        let (ws, _resp) = tokio_tungstenite::connect_async(&self.feed_url)
            .await
            .with_context(|| format!("failed to connect upstream tick feed at {}", self.feed_url))?;
        let (sink, mut stream) = ws.split();
        *self.writer.lock().await = Some(sink);

        let (tx, rx) = mpsc::channel(1024);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        debug!(error = %e, "upstream tick feed closed with error");
                        break;
                    }
                };
                let text = match msg {
                    tokio_tungstenite::tungstenite::Message::Text(t) => t,
                    tokio_tungstenite::tungstenite::Message::Close(_) => break,
                    _ => continue,
                };
                let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                    continue;
                };
                let Some(tick) = parse_tick_frame(&value) else {
                    continue;
                };
                if tx.send(tick).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn subscribe(&self, tokens: &[u32], mode: TickMode) -> Result<()> {
        use futures_util::SinkExt;

        let mode_str = match mode {
            TickMode::Ltp => "ltp",
            TickMode::Quote => "quote",
            TickMode::Full => "full",
        };
        let frame = serde_json::json!({ "action": "subscribe", "tokens": tokens, "mode": mode_str }).to_string();

        let mut guard = self.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            anyhow::bail!("cannot subscribe before connect_stream has established the feed");
        };
        sink.send(tokio_tungstenite::tungstenite::Message::Text(frame))
            .await
            .context("failed to send subscribe frame")?;
        Ok(())
    }

    async fn get_ltp(&self, keys: &[String]) -> Result<HashMap<String, f64>> {
        self.rest.get_ltp(keys).await
    }
}

/// Parse one tick frame of the shape `{"token": u32, "ts": i64, "ltp": f64,
/// "volume": u64, "bid": f64, "ask": f64, "oi": u64}`. Unknown/malformed
/// frames are skipped by the caller rather than treated as fatal.
fn parse_tick_frame(value: &serde_json::Value) -> Option<Tick> {
    let token = value.get("token")?.as_u64()? as u32;
    let price = value.get("ltp")?.as_f64()?;
    let ts = value.get("ts").and_then(|v| v.as_i64());
    let mut tick = Tick::with_fallback_timestamp(token, ts, price, SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_millis() as i64);
    tick.volume_traded = value.get("volume").and_then(|v| v.as_u64());
    tick.bid = value.get("bid").and_then(|v| v.as_f64());
    tick.ask = value.get("ask").and_then(|v| v.as_f64());
    tick.oi = value.get("oi").and_then(|v| v.as_i64());
    Some(tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_query_appends_timestamp_and_signature() {
        let client = SignedRestClient::new("key", "secret", "https://example.invalid");
        let qs = client.signed_query("symbol=RELIANCE");
        assert!(qs.contains("symbol=RELIANCE"));
        assert!(qs.contains("timestamp="));
        assert!(qs.contains("recvWindow=5000"));
        assert!(qs.contains("signature="));
    }

    #[test]
    fn sign_is_deterministic_for_same_input() {
        let client = SignedRestClient::new("key", "secret", "https://example.invalid");
        assert_eq!(client.sign("a=1"), client.sign("a=1"));
        assert_ne!(client.sign("a=1"), client.sign("a=2"));
    }

    #[test]
    fn debug_redacts_credentials() {
        let client = SignedRestClient::new("key", "supersecret", "https://example.invalid");
        let debug = format!("{client:?}");
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("<redacted>"));
    }
}
