// =============================================================================
// Tick Hub — one upstream subscription, fanned out to many consumers (§4.A)
// =============================================================================
//
// Reconnect loop is the teacher's `candle_buffer.rs::run_kline_stream` idiom:
// `loop { match connect().await { ... } ; sleep(5s).await }`, generalized from
// a hardcoded Binance kline URL to an upstream-agnostic subscription set that
// is reapplied in full on every reconnect.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{error, info, warn};

use super::tick::{InstrumentMeta, Tick, TickMode};
use super::upstream::UpstreamClient;

const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

type TickHandler = Arc<dyn Fn(&Tick) + Send + Sync>;

/// Fans out one upstream streaming connection to many registered consumers
/// (§4.A). Owns the subscription set and reapplies it on reconnect.
pub struct TickHub {
    client: Arc<dyn UpstreamClient>,
    subscriptions: RwLock<HashMap<u32, InstrumentMeta>>,
    handlers: RwLock<Vec<TickHandler>>,
    connected: AtomicBool,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
}

impl TickHub {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            client,
            subscriptions: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            connected: AtomicBool::new(false),
            max_reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Idempotently add tokens to the subscription set. When the hub is
    /// currently disconnected, the request is merely recorded and applied on
    /// the next successful (re)connect (§4.A).
    pub fn subscribe(&self, instruments: Vec<InstrumentMeta>) {
        let mut subs = self.subscriptions.write();
        for inst in instruments {
            subs.insert(inst.token, inst);
        }
    }

    pub fn unsubscribe(&self, tokens: &[u32]) {
        let mut subs = self.subscriptions.write();
        for token in tokens {
            subs.remove(token);
        }
    }

    pub fn subscribed_tokens(&self) -> HashSet<u32> {
        self.subscriptions.read().keys().copied().collect()
    }

    /// Register a fan-out consumer. Delivery order between consumers is not
    /// guaranteed; each consumer individually sees ticks in upstream order
    /// (§4.A).
    pub fn on_tick<F>(&self, handler: F)
    where
        F: Fn(&Tick) + Send + Sync + 'static,
    {
        self.handlers.write().push(Arc::new(handler));
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Dispatch a tick to every registered handler. Lock-free during
    /// invocation (§5): handlers are `Arc`-cloned into a snapshot `Vec` under
    /// a brief read lock, which is then dropped before any handler runs. A
    /// handler that panics is isolated via `catch_unwind` and never prevents
    /// sibling handlers from running (§4.A "Failure semantics").
    fn dispatch(&self, tick: &Tick) {
        let handlers: Vec<TickHandler> = self.handlers.read().clone();
        for handler in &handlers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(tick)));
            if let Err(_e) = outcome {
                warn!(token = tick.token, "tick handler panicked; isolated from siblings");
            }
        }
    }

    /// Run the reconnect loop until `stop()` is observed. Mirrors the
    /// teacher's `run_kline_stream`: connect, stream until the connection
    /// drops or errors, sleep, retry -- bounded at `max_reconnect_attempts`.
    pub async fn run(self: Arc<Self>) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.connect_stream().await {
                Ok(mut rx) => {
                    attempt = 0;
                    self.connected.store(true, Ordering::Relaxed);
                    self.resubscribe_all().await;
                    info!("tick hub connected");

                    while let Some(tick) = rx.recv().await {
                        self.dispatch(&tick);
                    }

                    self.connected.store(false, Ordering::Relaxed);
                    warn!("tick hub stream ended; reconnecting");
                }
                Err(e) => {
                    error!(error = %e, attempt, "tick hub connect failed");
                }
            }

            if attempt >= self.max_reconnect_attempts {
                error!(attempt, "tick hub exhausted reconnect attempts, giving up");
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn resubscribe_all(&self) {
        let subs: Vec<InstrumentMeta> = self.subscriptions.read().values().cloned().collect();
        if subs.is_empty() {
            return;
        }
        let tokens: Vec<u32> = subs.iter().map(|s| s.token).collect();
        let mode = subs.first().map(|s| s.mode).unwrap_or(TickMode::Ltp);
        if let Err(e) = self.client.subscribe(&tokens, mode).await {
            error!(error = %e, "failed to reapply subscriptions on reconnect");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    struct NullClient;

    #[async_trait::async_trait]
    impl UpstreamClient for NullClient {
        async fn connect_stream(&self) -> anyhow::Result<mpsc::Receiver<Tick>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn subscribe(&self, _tokens: &[u32], _mode: TickMode) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_ltp(&self, _keys: &[String]) -> anyhow::Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    #[test]
    fn subscribe_is_idempotent() {
        let hub = TickHub::new(Arc::new(NullClient));
        let inst = InstrumentMeta {
            token: 101,
            symbol: "RELIANCE".into(),
            exchange: "NSE".into(),
            mode: TickMode::Ltp,
        };
        hub.subscribe(vec![inst.clone()]);
        hub.subscribe(vec![inst]);
        assert_eq!(hub.subscribed_tokens().len(), 1);
    }

    #[test]
    fn unsubscribe_removes_token() {
        let hub = TickHub::new(Arc::new(NullClient));
        hub.subscribe(vec![InstrumentMeta {
            token: 101,
            symbol: "RELIANCE".into(),
            exchange: "NSE".into(),
            mode: TickMode::Ltp,
        }]);
        hub.unsubscribe(&[101]);
        assert!(hub.subscribed_tokens().is_empty());
    }

    #[test]
    fn dispatch_isolates_panicking_handler() {
        let hub = TickHub::new(Arc::new(NullClient));
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        hub.on_tick(move |_tick| {
            panic!("boom");
        });
        hub.on_tick(move |_tick| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        let tick = Tick::with_fallback_timestamp(101, Some(1), 100.0, 1);
        hub.dispatch(&tick);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
