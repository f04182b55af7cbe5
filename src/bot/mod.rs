// =============================================================================
// Trading Bot — orchestration, scheduling, risk enforcement (§4.G)
// =============================================================================
//
// Grounded on `original_source/backend/app/services/trading_bot.py`'s
// `TradingBot`: same state machine (`BotStatus` -> `BotState`), same
// monitoring-loop shape (LTP refresh -> market-hours gate -> square-off gate
// -> strategy evaluation), same signal-execution mapping (BUY/SELL places a
// market order plus a linked stop-loss order, EXIT flattens). The Python
// original drives this from a daemon `threading.Thread`; here it is one
// `tokio::spawn`'d task per §5's "scheduler task for the Trading Bot
// monitoring loop", cancelled via an `AtomicBool` stop flag the way
// `main.rs`'s existing loops check shutdown conditions between iterations.
//
// Cyclic references are broken by message passing (§9): the bot holds
// `Arc<PaperEngine>` and `Arc<TickHub>` and issues commands to them; neither
// holds a handle back into the bot.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::market_clock::MarketClock;
use crate::market_data::tick::{InstrumentMeta, Tick, TickMode};
use crate::market_data::upstream::UpstreamClient;
use crate::market_data::{CandleBuilder, TickHub};
use crate::paper_engine::{PaperEngine, PlaceOrderRequest};
use crate::strategy::{Signal, SignalKind, Strategy};
use crate::types::{BotState, OrderStatus, OrderType, Product, Side};

/// Instrument metadata the bot needs to resolve a symbol to a token and wire
/// it into the Tick Hub / Candle Builder (§4.A, §4.B).
#[derive(Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub exchange: String,
    pub token: u32,
}

/// Inputs to [`TradingBot::start`] (§4.G "Start").
pub struct StartRequest {
    pub symbols: Vec<SymbolInfo>,
    pub capital_per_symbol: f64,
    pub product: Product,
}

/// One symbol's active bracket -- the BUY/SELL market order plus its linked
/// stop-loss leg -- tracked so `EXIT` and `update_sl` signals and
/// square-off know what to act on (§4.G "Signal execution").
#[derive(Debug, Clone)]
struct ActivePosition {
    entry_order_id: crate::paper_engine::OrderId,
    sl_order_id: Option<crate::paper_engine::OrderId>,
    side: Side,
    qty: u64,
}

/// Tunables for the monitoring loop (§4.G "Monitoring loop").
#[derive(Debug, Clone, Copy)]
pub struct BotConfig {
    pub check_interval: Duration,
    pub auto_square_off_hour: u32,
    pub auto_square_off_minute: u32,
    pub periodic_interval_minutes: u32,
    pub periodic_lookback_days: i64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            auto_square_off_hour: 15,
            auto_square_off_minute: 15,
            periodic_interval_minutes: 5,
            periodic_lookback_days: 5,
        }
    }
}

struct StrategySlot {
    info: SymbolInfo,
    strategy: Mutex<Box<dyn Strategy>>,
}

/// Orchestrates the Strategy Runtime and Paper Engine: one instance per
/// process, states `STOPPED -> STARTING -> RUNNING <-> PAUSED -> STOPPING ->
/// STOPPED` plus a terminal `ERROR` (§4.G).
pub struct TradingBot {
    state: RwLock<BotState>,
    strategies: RwLock<HashMap<String, Arc<StrategySlot>>>,
    active_positions: RwLock<HashMap<String, ActivePosition>>,
    stop_flag: Arc<AtomicBool>,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,

    paper_engine: Arc<PaperEngine>,
    tick_hub: Arc<TickHub>,
    candle_builder: Arc<CandleBuilder>,
    upstream: Arc<dyn UpstreamClient>,
    market_clock: Arc<MarketClock>,
    config: BotConfig,

    trades_today: std::sync::atomic::AtomicU32,
    signals_generated: std::sync::atomic::AtomicU64,
    orders_placed: std::sync::atomic::AtomicU64,
}

/// Introspection snapshot for `get_status()` (§4.G, supplemented accessor).
#[derive(Debug, Clone, serde::Serialize)]
pub struct BotStatusReport {
    pub state: BotState,
    pub symbols: Vec<String>,
    pub trades_today: u32,
    pub signals_generated: u64,
    pub orders_placed: u64,
    pub active_positions: usize,
}

impl TradingBot {
    pub fn new(
        paper_engine: Arc<PaperEngine>,
        tick_hub: Arc<TickHub>,
        candle_builder: Arc<CandleBuilder>,
        upstream: Arc<dyn UpstreamClient>,
        market_clock: Arc<MarketClock>,
        config: BotConfig,
    ) -> Self {
        Self {
            state: RwLock::new(BotState::Stopped),
            strategies: RwLock::new(HashMap::new()),
            active_positions: RwLock::new(HashMap::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            loop_handle: Mutex::new(None),
            paper_engine,
            tick_hub,
            candle_builder,
            upstream,
            market_clock,
            config,
            trades_today: std::sync::atomic::AtomicU32::new(0),
            signals_generated: std::sync::atomic::AtomicU64::new(0),
            orders_placed: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> BotState {
        *self.state.read()
    }

    fn set_state(&self, new_state: BotState) {
        *self.state.write() = new_state;
    }

    pub fn status(&self) -> BotStatusReport {
        BotStatusReport {
            state: self.state(),
            symbols: self.strategies.read().keys().cloned().collect(),
            trades_today: self.trades_today.load(Ordering::Relaxed),
            signals_generated: self.signals_generated.load(Ordering::Relaxed),
            orders_placed: self.orders_placed.load(Ordering::Relaxed),
            active_positions: self.active_positions.read().len(),
        }
    }

    /// §4.G "Start": instantiate one strategy per symbol, allocate capital,
    /// subscribe the Tick Hub, wire per-symbol tick callbacks, and launch the
    /// monitoring loop.
    pub async fn start(
        self: &Arc<Self>,
        req: StartRequest,
        make_strategy: impl Fn(&SymbolInfo) -> Box<dyn Strategy>,
    ) -> Result<(), String> {
        if self.state() == BotState::Running {
            return Err("bot already running".into());
        }
        self.set_state(BotState::Starting);

        let total_capital = req.capital_per_symbol * req.symbols.len() as f64;
        if let Err(e) = self.paper_engine.allocate(total_capital).await {
            self.set_state(BotState::Error);
            return Err(format!("insufficient funds to allocate: {e}"));
        }

        let mut strategies = HashMap::new();
        for info in &req.symbols {
            let strategy = make_strategy(info);
            strategies.insert(
                info.symbol.clone(),
                Arc::new(StrategySlot {
                    info: info.clone(),
                    strategy: Mutex::new(strategy),
                }),
            );
        }
        *self.strategies.write() = strategies;

        let instruments: Vec<InstrumentMeta> = req
            .symbols
            .iter()
            .map(|s| InstrumentMeta {
                token: s.token,
                symbol: s.symbol.clone(),
                exchange: s.exchange.clone(),
                mode: TickMode::Full,
            })
            .collect();
        self.tick_hub.subscribe(instruments);

        self.register_tick_callback();

        self.stop_flag.store(false, Ordering::SeqCst);
        self.set_state(BotState::Running);

        let bot = self.clone();
        let handle = tokio::spawn(async move { bot.monitoring_loop(req.product).await });
        *self.loop_handle.lock() = Some(handle);

        info!(symbols = req.symbols.len(), capital = total_capital, "trading bot started");
        Ok(())
    }

    /// Per-symbol tick callback: feeds tick-driven strategies and keeps the
    /// Paper Engine's LTP cache warm for real-time P&L (§4.G "Start" step 4).
    fn register_tick_callback(self: &Arc<Self>) {
        let bot = self.clone();
        self.tick_hub.on_tick(move |tick: &Tick| {
            let symbol = {
                let strategies = bot.strategies.read();
                strategies
                    .values()
                    .find(|s| s.info.token == tick.token)
                    .map(|s| s.info.clone())
            };
            let Some(info) = symbol else { return };

            let engine = bot.paper_engine.clone();
            let exchange = info.exchange.clone();
            let symbol_name = info.symbol.clone();
            let price = tick.last_price;
            tokio::spawn(async move {
                engine.update_ltp(&symbol_name, &exchange, price).await;
            });

            if let Some(slot) = bot.strategies.read().get(&info.symbol).cloned() {
                slot.strategy.lock().process_tick(tick);
            }
        });
    }

    /// §4.G "Monitoring loop": single cooperative task, default 60 s cadence.
    async fn monitoring_loop(self: Arc<Self>, product: Product) {
        info!("bot monitoring loop started");
        loop {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }

            self.refresh_ltps().await;

            if !self.market_clock.should_stream_data() {
                tokio::time::sleep(self.config.check_interval).await;
                continue;
            }

            if self
                .market_clock
                .is_past_square_off(self.config.auto_square_off_hour, self.config.auto_square_off_minute)
            {
                info!("auto square-off time reached");
                self.auto_square_off(product).await;
                self.set_state(BotState::Stopped);
                break;
            }

            if self.state() == BotState::Running {
                self.process_strategies(product).await;
            }

            tokio::time::sleep(self.config.check_interval).await;
        }
        info!("bot monitoring loop stopped");
    }

    /// Refresh LTPs for every symbol currently held or subscribed, even when
    /// the market is closed, so dashboards stay alive (§4.G step 1).
    async fn refresh_ltps(&self) {
        let symbols: Vec<SymbolInfo> = self.strategies.read().values().map(|s| s.info.clone()).collect();
        if symbols.is_empty() {
            return;
        }
        let keys: Vec<String> = symbols.iter().map(|s| format!("{}:{}", s.exchange, s.symbol)).collect();
        match self.upstream.get_ltp(&keys).await {
            Ok(prices) => {
                for s in &symbols {
                    let key = format!("{}:{}", s.exchange, s.symbol);
                    if let Some(price) = prices.get(&key) {
                        self.paper_engine.update_ltp(&s.symbol, &s.exchange, *price).await;
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "LTP refresh failed this cycle");
            }
        }
    }

    /// §4.G "Monitoring loop" step 4: fetch recent periodic bars and the
    /// current LTP for each strategy, evaluate, and execute any signal.
    async fn process_strategies(self: &Arc<Self>, product: Product) {
        let slots: Vec<Arc<StrategySlot>> = self.strategies.read().values().cloned().collect();
        for slot in slots {
            let candles = self.candle_builder.get_historical_candles(
                slot.info.token,
                self.config.periodic_interval_minutes,
                (self.config.periodic_lookback_days * 24 * 60 / self.config.periodic_interval_minutes as i64) as usize,
            );
            if candles.is_empty() {
                continue;
            }

            let key = format!("{}:{}", slot.info.exchange, slot.info.symbol);
            let current_price = match self.upstream.get_ltp(&[key]).await {
                Ok(prices) => prices.values().next().copied(),
                Err(_) => None,
            };
            let Some(current_price) = current_price else { continue };

            self.paper_engine.update_ltp(&slot.info.symbol, &slot.info.exchange, current_price).await;

            let signal = slot.strategy.lock().generate_signal(&candles, current_price);
            if let Some(signal) = signal {
                self.signals_generated.fetch_add(1, Ordering::Relaxed);
                self.execute_signal(&slot.info, signal, product).await;
            }
        }
    }

    /// §4.G "Signal execution": map signal kind to a Paper Engine action.
    async fn execute_signal(&self, info: &SymbolInfo, signal: Signal, product: Product) {
        match signal.kind {
            SignalKind::Buy | SignalKind::Sell => {
                let side = if signal.kind == SignalKind::Buy { Side::Buy } else { Side::Sell };
                let tag = format!("BOT_{}", info.symbol);
                let req = PlaceOrderRequest {
                    symbol: info.symbol.clone(),
                    exchange: info.exchange.clone(),
                    side,
                    qty: signal.qty,
                    order_type: OrderType::Market,
                    product,
                    price: None,
                    trigger_price: None,
                    tag: Some(tag),
                };
                match self.paper_engine.place_order(req).await {
                    Ok(entry_order_id) => {
                        self.orders_placed.fetch_add(1, Ordering::Relaxed);
                        self.trades_today.fetch_add(1, Ordering::Relaxed);

                        let sl_order_id = if let Some(sl_price) = signal.stop_loss {
                            let sl_req = PlaceOrderRequest {
                                symbol: info.symbol.clone(),
                                exchange: info.exchange.clone(),
                                side: side.opposite(),
                                qty: signal.qty,
                                order_type: OrderType::SlM,
                                product,
                                price: None,
                                trigger_price: Some(sl_price),
                                tag: Some(format!("SL_BOT_{}", info.symbol)),
                            };
                            self.paper_engine.place_order(sl_req).await.ok()
                        } else {
                            None
                        };

                        self.active_positions.write().insert(
                            info.symbol.clone(),
                            ActivePosition {
                                entry_order_id,
                                sl_order_id,
                                side,
                                qty: signal.qty,
                            },
                        );
                    }
                    Err(e) => {
                        error!(symbol = %info.symbol, error = %e, "bot order placement rejected");
                    }
                }
            }
            SignalKind::Hold => {
                if signal.metadata.as_ref().and_then(|m| m.get("action")).and_then(|a| a.as_str()) == Some("update_sl") {
                    if let (Some(new_sl), Some(active)) =
                        (signal.stop_loss, self.active_positions.read().get(&info.symbol).cloned())
                    {
                        if let Some(sl_order_id) = active.sl_order_id {
                            if let Err(e) = self.paper_engine.modify_order(&sl_order_id, None, None, Some(new_sl)).await {
                                warn!(symbol = %info.symbol, error = %e, "failed to update trailing stop-loss");
                            }
                        }
                    }
                }
            }
            SignalKind::Exit => {
                if let Some(active) = self.active_positions.write().remove(&info.symbol) {
                    let req = PlaceOrderRequest {
                        symbol: info.symbol.clone(),
                        exchange: info.exchange.clone(),
                        side: active.side.opposite(),
                        qty: active.qty,
                        order_type: OrderType::Market,
                        product,
                        price: None,
                        trigger_price: None,
                        tag: Some(format!("BOT_{}", info.symbol)),
                    };
                    if let Err(e) = self.paper_engine.place_order(req).await {
                        error!(symbol = %info.symbol, error = %e, "exit order rejected");
                    }
                    if let Some(sl_order_id) = active.sl_order_id {
                        let _ = self.paper_engine.cancel_order(&sl_order_id).await;
                    }
                }
            }
        }
    }

    /// §4.G "Auto-square-off": flatten every position day-scoped by product,
    /// tagged `AUTO_SQUAREOFF`, then cancel every `OPEN`/`PENDING` order.
    async fn auto_square_off(&self, product: Product) {
        let positions = self.paper_engine.positions_snapshot().await;
        for position in positions.into_iter().filter(|p| p.product == product) {
            if position.net_qty == 0 {
                continue;
            }
            let side = if position.net_qty > 0 { Side::Sell } else { Side::Buy };
            let qty = position.net_qty.unsigned_abs();
            let req = PlaceOrderRequest {
                symbol: position.symbol.clone(),
                exchange: position.exchange.clone(),
                side,
                qty,
                order_type: OrderType::Market,
                product,
                price: None,
                trigger_price: None,
                tag: Some("AUTO_SQUAREOFF".into()),
            };
            if let Err(e) = self.paper_engine.place_order(req).await {
                error!(symbol = %position.symbol, error = %e, "auto square-off order rejected");
            }
        }

        let open_orders = self.paper_engine.open_orders().await;
        for order in open_orders.into_iter().filter(|o| matches!(o.status, OrderStatus::Open | OrderStatus::Pending)) {
            if let Err(e) = self.paper_engine.cancel_order(&order.order_id).await {
                warn!(order_id = %order.order_id, error = %e, "failed to cancel order during square-off");
            }
        }
        self.active_positions.write().clear();
        info!("auto square-off complete");
    }

    /// `pause()` — stop signal generation only; LTP updates continue (§4.G).
    pub fn pause(&self) -> Result<(), String> {
        if self.state() != BotState::Running {
            return Err("bot not running".into());
        }
        self.set_state(BotState::Paused);
        Ok(())
    }

    /// `resume()` — restore signal generation (§4.G).
    pub fn resume(&self) -> Result<(), String> {
        if self.state() != BotState::Paused {
            return Err("bot not paused".into());
        }
        self.set_state(BotState::Running);
        Ok(())
    }

    /// `reset_state()` — clear active positions and daily counters (§4.G).
    pub fn reset_state(&self) {
        self.active_positions.write().clear();
        self.trades_today.store(0, Ordering::Relaxed);
        self.signals_generated.store(0, Ordering::Relaxed);
        self.orders_placed.store(0, Ordering::Relaxed);
    }

    /// `stop(square_off)` — set the stop flag, join the loop, optionally
    /// flatten positions and cancel pending orders, reclaim reserved funds,
    /// clear strategies (§4.G).
    pub async fn stop(&self, square_off: bool, product: Product) -> Result<(), String> {
        if self.state() == BotState::Stopped {
            return Err("bot not running".into());
        }
        self.set_state(BotState::Stopping);
        self.stop_flag.store(true, Ordering::SeqCst);

        let handle = self.loop_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        if square_off {
            self.auto_square_off(product).await;
        }

        self.paper_engine.reclaim().await;
        self.strategies.write().clear();
        self.active_positions.write().clear();
        self.set_state(BotState::Stopped);
        info!(square_off, "trading bot stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper_engine::RiskLimits;
    use crate::store::Store;
    use crate::strategy::StrategyStatus;
    use crate::types::ExecutionMode;
    use std::collections::HashMap as StdHashMap;
    use tokio::sync::mpsc;

    struct NullUpstream {
        ltp: Mutex<StdHashMap<String, f64>>,
    }

    #[async_trait::async_trait]
    impl UpstreamClient for NullUpstream {
        async fn connect_stream(&self) -> anyhow::Result<mpsc::Receiver<Tick>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn subscribe(&self, _tokens: &[u32], _mode: TickMode) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_ltp(&self, keys: &[String]) -> anyhow::Result<StdHashMap<String, f64>> {
            let cache = self.ltp.lock();
            Ok(keys.iter().filter_map(|k| cache.get(k).map(|v| (k.clone(), *v))).collect())
        }
    }

    struct StubStrategy {
        symbol: String,
        fire_once: Mutex<bool>,
    }

    impl Strategy for StubStrategy {
        fn symbol(&self) -> &str {
            &self.symbol
        }
        fn generate_signal(&mut self, _candles: &[crate::market_data::Candle], current_price: f64) -> Option<Signal> {
            let mut fired = self.fire_once.lock();
            if *fired {
                return None;
            }
            *fired = true;
            Some(Signal {
                ts: chrono::Utc::now(),
                symbol: self.symbol.clone(),
                kind: SignalKind::Buy,
                price: current_price,
                qty: 1,
                stop_loss: Some(current_price * 0.98),
                target: Some(current_price * 1.02),
                reason: "test".into(),
                confidence: 1.0,
                metadata: None,
            })
        }
        fn calculate_stop_loss(&self, entry: f64, _side: Side) -> f64 {
            entry * 0.98
        }
        fn calculate_target(&self, entry: f64, _side: Side) -> f64 {
            entry * 1.02
        }
        fn get_status(&self) -> StrategyStatus {
            StrategyStatus {
                symbol: self.symbol.clone(),
                name: "stub",
                in_position: false,
                entry_price: None,
                stop_loss: None,
                target: None,
                trades_today: 0,
                daily_pnl: 0.0,
            }
        }
    }

    fn make_bot(upstream_ltp: StdHashMap<String, f64>) -> Arc<TradingBot> {
        let store = Store::open_in_memory().unwrap();
        let mode = Arc::new(RwLock::new(ExecutionMode::Paper));
        let upstream: Arc<dyn UpstreamClient> = Arc::new(NullUpstream { ltp: Mutex::new(upstream_ltp) });
        let engine = Arc::new(PaperEngine::new(store, 100_000.0, mode, RiskLimits::default(), Some(upstream.clone()), 100.0));
        let tick_hub = Arc::new(TickHub::new(upstream.clone()));
        let candle_builder = Arc::new(CandleBuilder::new());
        let clock = Arc::new(MarketClock::new());
        Arc::new(TradingBot::new(engine, tick_hub, candle_builder, upstream, clock, BotConfig::default()))
    }

    #[tokio::test]
    async fn start_allocates_capital_and_sets_running() {
        let bot = make_bot(StdHashMap::new());
        let req = StartRequest {
            symbols: vec![SymbolInfo { symbol: "RELIANCE".into(), exchange: "NSE".into(), token: 101 }],
            capital_per_symbol: 5_000.0,
            product: Product::Mis,
        };
        bot.start(req, |info| Box::new(StubStrategy { symbol: info.symbol.clone(), fire_once: Mutex::new(false) }))
            .await
            .unwrap();
        assert_eq!(bot.state(), BotState::Running);
        let funds = bot.paper_engine.funds_snapshot().await;
        assert_eq!(funds.reserved, 5_000.0);
        bot.stop(false, Product::Mis).await.unwrap();
        assert_eq!(bot.state(), BotState::Stopped);
    }

    #[tokio::test]
    async fn stop_reclaims_funds() {
        let bot = make_bot(StdHashMap::new());
        let req = StartRequest {
            symbols: vec![SymbolInfo { symbol: "TCS".into(), exchange: "NSE".into(), token: 202 }],
            capital_per_symbol: 1_000.0,
            product: Product::Mis,
        };
        bot.start(req, |info| Box::new(StubStrategy { symbol: info.symbol.clone(), fire_once: Mutex::new(false) }))
            .await
            .unwrap();
        bot.stop(false, Product::Mis).await.unwrap();
        let funds = bot.paper_engine.funds_snapshot().await;
        assert_eq!(funds.reserved, 0.0);
        assert_eq!(funds.available, 100_000.0);
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_state() {
        let bot = make_bot(StdHashMap::new());
        let req = StartRequest {
            symbols: vec![SymbolInfo { symbol: "INFY".into(), exchange: "NSE".into(), token: 303 }],
            capital_per_symbol: 1_000.0,
            product: Product::Mis,
        };
        bot.start(req, |info| Box::new(StubStrategy { symbol: info.symbol.clone(), fire_once: Mutex::new(false) }))
            .await
            .unwrap();
        bot.pause().unwrap();
        assert_eq!(bot.state(), BotState::Paused);
        bot.resume().unwrap();
        assert_eq!(bot.state(), BotState::Running);
        bot.stop(false, Product::Mis).await.unwrap();
    }

    #[tokio::test]
    async fn auto_square_off_flattens_open_position() {
        let mut ltp = StdHashMap::new();
        ltp.insert("NSE:RELIANCE".to_string(), 2500.0);
        let bot = make_bot(ltp);
        bot.paper_engine.update_ltp("RELIANCE", "NSE", 2500.0).await;
        bot.paper_engine
            .place_order(PlaceOrderRequest {
                symbol: "RELIANCE".into(),
                exchange: "NSE".into(),
                side: Side::Buy,
                qty: 10,
                order_type: OrderType::Market,
                product: Product::Mis,
                price: None,
                trigger_price: None,
                tag: Some("BOT_RELIANCE".into()),
            })
            .await
            .unwrap();
        assert_eq!(bot.paper_engine.positions_snapshot().await.len(), 1);

        bot.auto_square_off(Product::Mis).await;
        assert!(bot.paper_engine.positions_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn reset_state_clears_counters_and_active_positions() {
        let bot = make_bot(StdHashMap::new());
        bot.trades_today.store(5, Ordering::Relaxed);
        bot.signals_generated.store(3, Ordering::Relaxed);
        bot.active_positions.write().insert(
            "RELIANCE".into(),
            ActivePosition {
                entry_order_id: crate::paper_engine::OrderId::new(),
                sl_order_id: None,
                side: Side::Buy,
                qty: 1,
            },
        );
        bot.reset_state();
        assert_eq!(bot.trades_today.load(Ordering::Relaxed), 0);
        assert_eq!(bot.signals_generated.load(Ordering::Relaxed), 0);
        assert!(bot.active_positions.read().is_empty());
    }
}
