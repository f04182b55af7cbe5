// =============================================================================
// Central Application State — trading engine core
// =============================================================================
//
// The single source of truth for the running engine. Subsystems hold `Arc`
// references to their own interior-mutable state; `AppState` ties them
// together and provides a unified snapshot for the REST/WebSocket surface.
// Shape (atomics for lock-free version tracking, `parking_lot::RwLock` for
// shared collections, `Arc` for subsystem engines) is carried from the
// teacher's `app_state.rs`; the subsystems themselves are this engine's own
// (Paper Engine, Tick Hub, Candle Builder, Trading Bot) rather than the
// teacher's crypto-specific ones.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::bot::{BotConfig, BotStatusReport, SymbolInfo, TradingBot};
use crate::market_clock::{MarketClock, MarketStatusReport};
use crate::market_data::upstream::UpstreamClient;
use crate::market_data::{CandleBuilder, RenkoAccumulator, TickHub};
use crate::paper_engine::manager::{EngineConfig, PaperEngineManager};
use crate::paper_engine::{Funds, Order, PaperEngine, Position, RiskLimits};
use crate::runtime_config::RuntimeConfig;
use crate::strategy::breakout::{BreakoutParams, BreakoutStrategy};
use crate::strategy::indicator_threshold::{IndicatorThresholdParams, IndicatorThresholdStrategy};
use crate::strategy::orb::{OrbParams, OrbStrategy};
use crate::strategy::pattern_strategy::{PatternParams, PatternStrategy};
use crate::strategy::renko_macd::{RenkoMacdParams, RenkoMacdStrategy};
use crate::strategy::supertrend_strategy::{SupertrendParams, SupertrendStrategy};
use crate::strategy::Strategy;
use crate::types::{ExecutionMode, UserId};

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: Option<String>,
    pub at: String,
}

const MAX_RECENT_ERRORS: usize = 50;

/// Single-process deployment's implicit account. Multi-user isolation is
/// available through `paper_engines` directly (§3 supplement); the bot and
/// the default REST surface operate against this one identity.
pub fn default_user() -> UserId {
    UserId("default".to_string())
}

/// Build the strategy instance named by `strategy_name` for `info`, dispatch
/// mirroring `trading_bot.py`'s `_create_strategy` string-keyed table (§4.G
/// "Start"). Unrecognized names fall back to `supertrend`.
pub fn create_strategy(
    strategy_name: &str,
    info: &SymbolInfo,
    capital: f64,
    renko: Arc<RenkoAccumulator>,
) -> Box<dyn Strategy> {
    match strategy_name {
        "breakout" => Box::new(BreakoutStrategy::new(info.symbol.clone(), BreakoutParams::standard(capital))),
        "indicator_threshold" => Box::new(IndicatorThresholdStrategy::new(
            info.symbol.clone(),
            IndicatorThresholdParams::standard(capital),
        )),
        "orb" => Box::new(OrbStrategy::new(info.symbol.clone(), OrbParams::standard(capital))),
        "pattern" => Box::new(PatternStrategy::new(info.symbol.clone(), PatternParams::standard(capital))),
        "renko_macd" => Box::new(RenkoMacdStrategy::new(
            info.symbol.clone(),
            info.token,
            renko,
            RenkoMacdParams::standard(capital),
        )),
        _ => Box::new(SupertrendStrategy::new(info.symbol.clone(), SupertrendParams::standard(capital))),
    }
}

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, incremented on every
    /// meaningful mutation; the WebSocket feed uses this to detect changes.
    pub state_version: AtomicU64,
    pub ws_sequence_number: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    pub execution_mode: Arc<RwLock<ExecutionMode>>,

    /// Per-user Paper Engine instances (§3 supplement). `default_user()`'s
    /// engine backs the single-user REST surface.
    pub paper_engines: Arc<PaperEngineManager>,

    pub tick_hub: Arc<TickHub>,
    pub candle_builder: Arc<CandleBuilder>,
    pub renko: Arc<RenkoAccumulator>,
    pub market_clock: Arc<MarketClock>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub bot: Arc<TradingBot>,

    /// Instruments currently registered with the bot/tick hub, keyed by
    /// symbol, for REST endpoints that resolve a symbol to a token.
    pub symbols: RwLock<HashMap<String, SymbolInfo>>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub start_time: std::time::Instant,

    /// Whether a dashboard is currently connected over the push WebSocket.
    pub ws_user_connected: RwLock<bool>,
    pub last_ws_user_event: RwLock<std::time::Instant>,
}

impl AppState {
    /// Construct a new `AppState` from `config`, wiring the Paper Engine
    /// Manager, Tick Hub, Candle Builder, Renko Accumulator, Market Clock,
    /// and Trading Bot against the given upstream client. Async because the
    /// default user's Paper Engine is restored from its store on startup.
    pub async fn new(config: RuntimeConfig, upstream: Arc<dyn UpstreamClient>) -> Result<Self> {
        let execution_mode = Arc::new(RwLock::new(if config.paper_trading {
            ExecutionMode::Paper
        } else {
            ExecutionMode::Live
        }));

        let risk_limits = RiskLimits {
            max_loss_per_day: config.max_loss_per_day,
            max_trades_per_day: config.max_trades_per_day,
            max_positions: config.max_positions as usize,
        };

        let db_dir = std::path::Path::new(&config.store_dsn)
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| ".".to_string());
        if db_dir != ":memory:" {
            std::fs::create_dir_all(&db_dir).ok();
        }

        let engine_config = EngineConfig {
            db_dir,
            default_capital: config.default_capital_per_symbol * 10.0,
            execution_mode: execution_mode.clone(),
            risk_limits,
            upstream: Some(upstream.clone()),
            fallback_price: 100.0,
        };
        let paper_engines = Arc::new(PaperEngineManager::new(engine_config));
        // Eagerly restore the default user's engine so startup surfaces a
        // corrupt store immediately rather than on first request.
        let default_engine = paper_engines.get_engine(&default_user()).await?;

        let tick_hub = Arc::new(TickHub::new(upstream.clone()));
        let candle_builder = Arc::new(CandleBuilder::new());
        let renko = Arc::new(RenkoAccumulator::new());
        let market_clock = Arc::new(MarketClock::new());

        let bot = Arc::new(TradingBot::new(
            default_engine,
            tick_hub.clone(),
            candle_builder.clone(),
            upstream.clone(),
            market_clock.clone(),
            BotConfig {
                check_interval: std::time::Duration::from_secs(60),
                auto_square_off_hour: config.auto_square_off_hour,
                auto_square_off_minute: config.auto_square_off_minute,
                periodic_interval_minutes: 5,
                periodic_lookback_days: 5,
            },
        ));

        Ok(Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),
            runtime_config: Arc::new(RwLock::new(config)),
            execution_mode,
            paper_engines,
            tick_hub,
            candle_builder,
            renko,
            market_clock,
            upstream,
            bot,
            symbols: RwLock::new(HashMap::new()),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        })
    }

    /// The default (single-user) Paper Engine.
    pub async fn default_engine(&self) -> Result<Arc<PaperEngine>, crate::store::StoreError> {
        self.paper_engines.get_engine(&default_user()).await
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Record an error message, evicting the oldest entry once
    /// [`MAX_RECENT_ERRORS`] is exceeded.
    pub fn push_error(&self, msg: String) {
        self.push_error_with_code(msg, None);
    }

    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };
        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        self.increment_version();
    }

    /// Register a symbol with the bot/tick hub's address book so REST
    /// endpoints can resolve `symbol -> token`.
    pub fn register_symbol(&self, info: SymbolInfo) {
        self.symbols.write().insert(info.symbol.clone(), info);
    }

    pub fn resolve_symbol(&self, symbol: &str) -> Option<SymbolInfo> {
        self.symbols.read().get(symbol).cloned()
    }

    /// Build a complete, serialisable snapshot of engine state: the payload
    /// for the REST `GET /api/v1/state` endpoint and the WebSocket push feed
    /// (§6 "WebSocket push").
    pub async fn build_snapshot(&self) -> Result<StateSnapshot, crate::store::StoreError> {
        let now = Utc::now();
        let version = self.current_state_version();
        let engine = self.default_engine().await?;

        let funds = engine.funds_snapshot().await;
        let positions = engine.positions_snapshot().await;
        let open_orders = engine.open_orders().await;
        let bot_status = self.bot.status();
        let market_status = self.market_clock.status_report();

        let recent_errors = self.recent_errors.read().clone();
        let uptime_s = self.start_time.elapsed().as_secs();

        Ok(StateSnapshot {
            state_version: version,
            server_time: now.timestamp_millis(),
            uptime_s,
            execution_mode: self.execution_mode.read().to_string(),
            funds,
            positions,
            open_orders,
            bot: bot_status,
            market: market_status,
            recent_errors,
        })
    }
}

/// Full engine state snapshot sent to the dashboard (§6 "WebSocket push").
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_s: u64,
    pub execution_mode: String,
    pub funds: Funds,
    pub positions: Vec<Position>,
    pub open_orders: Vec<Order>,
    pub bot: BotStatusReport,
    pub market: MarketStatusReport,
    pub recent_errors: Vec<ErrorRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::tick::TickMode;
    use tokio::sync::mpsc;

    struct NullUpstream;

    #[async_trait::async_trait]
    impl UpstreamClient for NullUpstream {
        async fn connect_stream(&self) -> Result<mpsc::Receiver<crate::market_data::tick::Tick>> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }
        async fn subscribe(&self, _tokens: &[u32], _mode: TickMode) -> Result<()> {
            Ok(())
        }
        async fn get_ltp(&self, _keys: &[String]) -> Result<HashMap<String, f64>> {
            Ok(HashMap::new())
        }
    }

    fn test_config() -> RuntimeConfig {
        let mut cfg = RuntimeConfig::default();
        cfg.store_dsn = ":memory:/app_state_test.db".to_string();
        cfg
    }

    #[tokio::test]
    async fn new_wires_default_engine_and_bot_stopped() {
        let state = AppState::new(test_config(), Arc::new(NullUpstream)).await.unwrap();
        assert_eq!(state.bot.state(), crate::types::BotState::Stopped);
        let funds = state.default_engine().await.unwrap().funds_snapshot().await;
        assert!(funds.available > 0.0);
    }

    #[tokio::test]
    async fn build_snapshot_reflects_current_funds() {
        let state = AppState::new(test_config(), Arc::new(NullUpstream)).await.unwrap();
        let snapshot = state.build_snapshot().await.unwrap();
        assert_eq!(snapshot.state_version, 1);
        assert!(snapshot.funds.available > 0.0);
    }

    #[test]
    fn register_symbol_then_resolve_round_trips() {
        let hashmap: HashMap<String, SymbolInfo> = HashMap::new();
        let symbols = RwLock::new(hashmap);
        symbols.write().insert(
            "RELIANCE".to_string(),
            SymbolInfo {
                symbol: "RELIANCE".to_string(),
                exchange: "NSE".to_string(),
                token: 101,
            },
        );
        assert_eq!(symbols.read().get("RELIANCE").unwrap().token, 101);
    }
}
