// =============================================================================
// Strategy Runtime — capability-set contract for trading strategies (§4.F)
// =============================================================================
//
// The source dispatches over a strategy base class with shared pre/post
// hooks (regime gating, insurance checks, position sizing) and per-strategy
// overrides of the signal-generation step. Rather than modeling that with
// runtime inheritance, this follows the capability-set pattern the redesign
// calls for: one `Strategy` trait with a required `generate_signal` and a
// default no-op `process_tick` for the tick-driven family member (Renko).
// Position sizing, the risk gate, and exit monitoring are shared free
// functions every variant calls, grounded on `strategy.rs`'s SL/TP-floor and
// position-sizing arithmetic (ATR-based distance, percentage floors, capital
// fraction), generalized from that file's BUY/SELL string checks to `Side`.
// =============================================================================

pub mod breakout;
pub mod indicator_threshold;
pub mod orb;
pub mod pattern_strategy;
pub mod renko_macd;
pub mod supertrend_strategy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::market_data::tick::Tick;
use crate::market_data::Candle;
use crate::types::Side;

/// The kind of action a strategy is recommending this evaluation (§4.F
/// "Signal").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    Buy,
    Sell,
    Hold,
    Exit,
}

/// One strategy evaluation's output (§4.F "Signal").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub kind: SignalKind,
    pub price: f64,
    pub qty: u64,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub reason: String,
    pub confidence: f64,
    pub metadata: Option<Value>,
}

impl Signal {
    pub fn hold(symbol: &str, price: f64, reason: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            symbol: symbol.to_string(),
            kind: SignalKind::Hold,
            price,
            qty: 0,
            stop_loss: None,
            target: None,
            reason: reason.into(),
            confidence: 0.0,
            metadata: None,
        }
    }

    /// A `HOLD` carrying `metadata.action = "update_sl"`, the bot's trigger
    /// for re-pointing an open SL order's trigger price (§4.G "Signal
    /// execution").
    pub fn update_stop_loss(symbol: &str, price: f64, new_stop_loss: f64, reason: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            symbol: symbol.to_string(),
            kind: SignalKind::Hold,
            price,
            qty: 0,
            stop_loss: Some(new_stop_loss),
            target: None,
            reason: reason.into(),
            confidence: 0.0,
            metadata: Some(serde_json::json!({ "action": "update_sl" })),
        }
    }

    pub fn exit(symbol: &str, price: f64, reason: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            symbol: symbol.to_string(),
            kind: SignalKind::Exit,
            price,
            qty: 0,
            stop_loss: None,
            target: None,
            reason: reason.into(),
            confidence: 1.0,
            metadata: None,
        }
    }
}

/// Introspection snapshot for `get_status()` (§4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStatus {
    pub symbol: String,
    pub name: &'static str,
    pub in_position: bool,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub target: Option<f64>,
    pub trades_today: u32,
    pub daily_pnl: f64,
}

/// Tracks a variant's currently open entry, shared by every family member so
/// exit monitoring and the risk gate don't have to be reimplemented per
/// strategy (§4.F "Exit monitoring", "Risk gate").
#[derive(Debug, Clone, Default)]
pub struct OpenEntry {
    pub side: Option<Side>,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target: f64,
}

impl OpenEntry {
    pub fn is_open(&self) -> bool {
        self.side.is_some()
    }

    pub fn clear(&mut self) {
        *self = OpenEntry::default();
    }

    pub fn open(&mut self, side: Side, entry_price: f64, stop_loss: f64, target: f64) {
        self.side = Some(side);
        self.entry_price = entry_price;
        self.stop_loss = stop_loss;
        self.target = target;
    }
}

/// A strategy instance bound to one symbol with a capital allocation (§4.F).
///
/// `process_tick` is a no-op default; only tick-driven variants (Renko+MACD)
/// override it. Everything else is driven from periodic candle closes via
/// `generate_signal`.
pub trait Strategy: Send + Sync {
    fn symbol(&self) -> &str;

    /// Evaluate on a periodic candle dataframe (oldest first) and the latest
    /// spot price; `None` means no actionable signal this evaluation.
    fn generate_signal(&mut self, candles: &[Candle], current_price: f64) -> Option<Signal>;

    fn process_tick(&mut self, _tick: &Tick) {}

    fn calculate_stop_loss(&self, entry: f64, side: Side) -> f64;
    fn calculate_target(&self, entry: f64, side: Side) -> f64;
    fn get_status(&self) -> StrategyStatus;
}

/// Default position-sizing rule: `qty = floor(capital * risk_per_trade /
/// |entry - stop_loss|)`, capped by `floor(capital / entry)` (§4.F "Position
/// sizing").
pub fn default_position_size(capital: f64, risk_per_trade: f64, entry: f64, stop_loss: f64) -> u64 {
    let risk_distance = (entry - stop_loss).abs();
    if risk_distance <= 0.0 || entry <= 0.0 {
        return 0;
    }
    let risk_based = (capital * risk_per_trade / risk_distance).floor();
    let capital_cap = (capital / entry).floor();
    risk_based.min(capital_cap).max(0.0) as u64
}

/// Risk gate checked before emitting a new entry signal: no existing
/// position, daily loss under the limit, trade count under the limit (§4.F
/// "Risk gate").
pub fn risk_gate(
    has_position: bool,
    daily_pnl: f64,
    max_loss_per_day: f64,
    trades_today: u32,
    max_trades_per_day: u32,
) -> bool {
    !has_position && daily_pnl.abs() < max_loss_per_day && trades_today < max_trades_per_day
}

/// Exit monitoring: if a position is open, check stop-loss/target hit against
/// `current_price`; returns the `EXIT` signal to emit if so (§4.F "Exit
/// monitoring").
pub fn check_exit(symbol: &str, entry: &OpenEntry, current_price: f64) -> Option<Signal> {
    let side = entry.side?;
    match side {
        Side::Buy => {
            if current_price <= entry.stop_loss {
                return Some(Signal::exit(symbol, current_price, "stop-loss hit"));
            }
            if current_price >= entry.target {
                return Some(Signal::exit(symbol, current_price, "target hit"));
            }
        }
        Side::Sell => {
            if current_price >= entry.stop_loss {
                return Some(Signal::exit(symbol, current_price, "stop-loss hit"));
            }
            if current_price <= entry.target {
                return Some(Signal::exit(symbol, current_price, "target hit"));
            }
        }
    }
    None
}
