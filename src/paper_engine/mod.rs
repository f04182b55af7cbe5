// =============================================================================
// Paper Engine — single-writer simulated execution core (§4.E)
// =============================================================================
//
// All state mutations are serialized under one `tokio::sync::Mutex<Inner>` and
// persisted to the `Store` before the call returns, matching §4.E's
// "single-writer, serialized under one mutex... persists on every mutation"
// contract. The lock is the async kind (not `parking_lot`) because the fill
// procedure may need to await an upstream LTP fetch while holding it — the
// whole point is that no other order can interleave mid-fill.
//
// Grounded on `risk.rs`'s `Inner` + lock wrapper shape, generalized from
// `parking_lot::RwLock` to an async mutex since order placement now awaits
// upstream I/O; the HashMap-of-keyed-records layout mirrors
// `position_engine.rs`'s `positions: RwLock<HashMap<...>>`.
// =============================================================================

pub mod errors;
pub mod funds;
pub mod manager;
pub mod order;
pub mod position;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::market_data::upstream::UpstreamClient;
use crate::store::{Store, TradeLogEntry};
use crate::types::{ExecutionMode, OrderStatus, OrderType, Product, Side};

pub use errors::{PaperEngineError, PaperEngineResult, RiskRule};
pub use funds::Funds;
pub use order::{Order, OrderId};
pub use position::{Position, PositionKey};

/// Risk-limit thresholds checked before accepting any order (§4.E "risk
/// limits").
#[derive(Debug, Clone, Copy)]
pub struct RiskLimits {
    pub max_loss_per_day: f64,
    pub max_trades_per_day: u32,
    pub max_positions: usize,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_loss_per_day: 5_000.0,
            max_trades_per_day: 20,
            max_positions: 10,
        }
    }
}

/// Everything needed to place one order (§4.E "Order placement").
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub exchange: String,
    pub side: Side,
    pub qty: u64,
    pub order_type: OrderType,
    pub product: Product,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub tag: Option<String>,
}

struct Inner {
    orders: HashMap<OrderId, Order>,
    positions: HashMap<PositionKey, Position>,
    funds: Funds,
    ltp_cache: HashMap<String, f64>,
}

fn ltp_key(exchange: &str, symbol: &str) -> String {
    format!("{exchange}:{symbol}")
}

/// One simulated-trading account: orders, positions, funds, all serialized
/// under a single mutex and mirrored into `Store` on every mutation.
pub struct PaperEngine {
    inner: Mutex<Inner>,
    store: Store,
    execution_mode: Arc<RwLock<ExecutionMode>>,
    risk_limits: RiskLimits,
    upstream: Option<Arc<dyn UpstreamClient>>,
    fallback_price: f64,
}

impl PaperEngine {
    /// Fresh engine with no prior state, seeded with `capital`.
    pub fn new(
        store: Store,
        capital: f64,
        execution_mode: Arc<RwLock<ExecutionMode>>,
        risk_limits: RiskLimits,
        upstream: Option<Arc<dyn UpstreamClient>>,
        fallback_price: f64,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                orders: HashMap::new(),
                positions: HashMap::new(),
                funds: Funds::new(capital),
                ltp_cache: HashMap::new(),
            }),
            store,
            execution_mode,
            risk_limits,
            upstream,
            fallback_price,
        }
    }

    /// Reconstruct in-memory state from `store` -- funds, then orders, then
    /// positions, then the trade log (§4.E "Persistence contract"). The trade
    /// log itself is not cached in memory; it is append-only in the store.
    pub async fn restore(
        store: Store,
        default_capital: f64,
        execution_mode: Arc<RwLock<ExecutionMode>>,
        risk_limits: RiskLimits,
        upstream: Option<Arc<dyn UpstreamClient>>,
        fallback_price: f64,
    ) -> PaperEngineResult<Self> {
        let funds = store
            .load_funds()
            .map_err(|e| PaperEngineError::Validation(format!("loading funds: {e}")))?
            .unwrap_or_else(|| Funds::new(default_capital));

        let orders = store
            .load_orders()
            .map_err(|e| PaperEngineError::Validation(format!("loading orders: {e}")))?;
        let positions = store
            .load_positions()
            .map_err(|e| PaperEngineError::Validation(format!("loading positions: {e}")))?;
        let _trades = store
            .load_trades()
            .map_err(|e| PaperEngineError::Validation(format!("loading trade log: {e}")))?;

        let mut orders_map = HashMap::with_capacity(orders.len());
        for o in orders {
            orders_map.insert(o.order_id.clone(), o);
        }
        let mut positions_map = HashMap::with_capacity(positions.len());
        for p in positions {
            positions_map.insert(p.key(), p);
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                orders: orders_map,
                positions: positions_map,
                funds,
                ltp_cache: HashMap::new(),
            }),
            store,
            execution_mode,
            risk_limits,
            upstream,
            fallback_price,
        })
    }

    fn check_safety_guard(&self) -> PaperEngineResult<()> {
        if *self.execution_mode.read() != ExecutionMode::Paper {
            return Err(PaperEngineError::SafetyGuardViolation);
        }
        Ok(())
    }

    /// `place_order` — validate, check risk limits and funds, accept, and for
    /// `MARKET` orders run the fill procedure immediately (§4.E).
    pub async fn place_order(&self, req: PlaceOrderRequest) -> PaperEngineResult<OrderId> {
        self.check_safety_guard()?;
        if req.qty == 0 {
            return Err(PaperEngineError::Validation("qty must be > 0".into()));
        }
        if req.order_type == OrderType::Limit && req.price.is_none() {
            return Err(PaperEngineError::Validation("LIMIT order requires a price".into()));
        }

        let mut inner = self.inner.lock().await;

        if inner.funds.daily_pnl.abs() >= self.risk_limits.max_loss_per_day {
            return Err(PaperEngineError::RiskLimitBreach(RiskRule::MaxLossPerDay));
        }
        if inner.funds.trades_today >= self.risk_limits.max_trades_per_day {
            return Err(PaperEngineError::RiskLimitBreach(RiskRule::MaxTradesPerDay));
        }
        if inner.positions.len() >= self.risk_limits.max_positions {
            return Err(PaperEngineError::RiskLimitBreach(RiskRule::MaxPositions));
        }

        let is_bot = req.tag.as_deref().is_some_and(|t| t.starts_with("BOT_"));

        if req.side == Side::Buy {
            let key = ltp_key(&req.exchange, &req.symbol);
            let estimate_price = req
                .price
                .or_else(|| inner.ltp_cache.get(&key).copied())
                .unwrap_or(self.fallback_price);
            let estimated_cost = req.qty as f64 * estimate_price;
            let available = if is_bot {
                inner.funds.bot_spendable()
            } else {
                inner.funds.available
            };
            if estimated_cost > available {
                return Err(PaperEngineError::InsufficientFunds {
                    needed: estimated_cost,
                    available,
                });
            }
        }

        let mut order = Order::new_pending(
            req.symbol.clone(),
            req.exchange.clone(),
            req.side,
            req.qty,
            req.order_type,
            req.product,
            req.price,
            req.trigger_price,
            req.tag.clone(),
        );

        if req.order_type != OrderType::Market {
            order.mark_open();
        }

        inner.orders.insert(order.order_id.clone(), order.clone());
        self.persist_order(&order);

        if req.order_type == OrderType::Market {
            let order_id = order.order_id.clone();
            self.fill_order_locked(&mut inner, &order_id).await?;
        }

        Ok(order.order_id)
    }

    /// Determine the fill price for a MARKET order: cached LTP, then a
    /// synchronous upstream fetch (cached on success), then the configured
    /// fallback (§4.E "Fill procedure").
    async fn resolve_market_price(&self, inner: &mut Inner, exchange: &str, symbol: &str) -> f64 {
        let key = ltp_key(exchange, symbol);
        if let Some(price) = inner.ltp_cache.get(&key) {
            return *price;
        }
        if let Some(upstream) = &self.upstream {
            let query_key = key.clone();
            match upstream.get_ltp(&[query_key.clone()]).await {
                Ok(prices) => {
                    if let Some(price) = prices.get(&query_key) {
                        inner.ltp_cache.insert(key, *price);
                        return *price;
                    }
                }
                Err(e) => {
                    warn!(error = %e, %symbol, "upstream LTP fetch failed during fill, using fallback price");
                }
            }
        }
        self.fallback_price
    }

    async fn fill_order_locked(&self, inner: &mut Inner, order_id: &OrderId) -> PaperEngineResult<()> {
        let Some(order) = inner.orders.get(order_id).cloned() else {
            return Err(PaperEngineError::OrderNotFound(order_id.0.clone()));
        };

        let fill_price = match order.order_type {
            OrderType::Market => self.resolve_market_price(inner, &order.exchange, &order.symbol).await,
            _ => order.price.ok_or_else(|| PaperEngineError::NoFillPrice(order.symbol.clone()))?,
        };

        let now = Utc::now();
        let is_bot = order.is_bot_order();
        let key = PositionKey::new(order.symbol.clone(), order.exchange.clone(), order.product);
        let existing = inner.positions.get(&key).cloned();
        let mut position = Position::new_or(existing, &key);

        match order.side {
            Side::Buy => {
                let value = order.qty as f64 * fill_price;
                position.apply_buy(order.qty, fill_price);
                inner.funds.apply_buy(value, is_bot);
            }
            Side::Sell => {
                let outcome = position.apply_sell(order.qty, fill_price);
                let proceeds = order.qty as f64 * fill_price;
                inner
                    .funds
                    .apply_sell(proceeds, outcome.cost_of_sold, outcome.delta_realized, is_bot);
            }
        }

        let mut completed = order.clone();
        completed.apply_full_fill(fill_price, now);
        inner.orders.insert(completed.order_id.clone(), completed.clone());
        self.persist_order(&completed);

        if position.is_destroyed() {
            inner.positions.remove(&key);
            if let Err(e) = self.store.delete_position(&key) {
                error!(error = %e, %key, "failed to persist position close, store now divergent");
            }
        } else {
            inner.positions.insert(key, position.clone());
            self.persist_position(&position);
        }

        self.persist_funds(&inner.funds);

        let trade = TradeLogEntry {
            ts: now,
            order_id: completed.order_id.clone(),
            symbol: completed.symbol.clone(),
            side: completed.side,
            qty: completed.qty,
            price: fill_price,
            tag: completed.tag.clone(),
        };
        if let Err(e) = self.store.append_trade(&trade) {
            error!(error = %e, "failed to persist trade log entry, store now divergent");
        }

        Ok(())
    }

    /// Modify `qty`/`price`/`trigger_price` on an order in `{PENDING, OPEN}`
    /// (§4.E "Order modification / cancellation").
    pub async fn modify_order(
        &self,
        order_id: &OrderId,
        qty: Option<u64>,
        price: Option<f64>,
        trigger_price: Option<f64>,
    ) -> PaperEngineResult<()> {
        self.check_safety_guard()?;
        let mut inner = self.inner.lock().await;
        let Some(order) = inner.orders.get_mut(order_id) else {
            return Err(PaperEngineError::OrderNotFound(order_id.0.clone()));
        };
        if !order.is_modifiable() {
            return Err(PaperEngineError::NotModifiable(order_id.0.clone()));
        }
        if let Some(qty) = qty {
            if qty == 0 {
                return Err(PaperEngineError::Validation("qty must be > 0".into()));
            }
            order.qty = qty;
            order.pending_qty = qty - order.filled_qty - order.cancelled_qty;
        }
        if let Some(price) = price {
            order.price = Some(price);
        }
        if let Some(trigger_price) = trigger_price {
            order.trigger_price = Some(trigger_price);
        }
        let snapshot = order.clone();
        self.persist_order(&snapshot);
        Ok(())
    }

    pub async fn cancel_order(&self, order_id: &OrderId) -> PaperEngineResult<()> {
        self.check_safety_guard()?;
        let mut inner = self.inner.lock().await;
        let Some(order) = inner.orders.get_mut(order_id) else {
            return Err(PaperEngineError::OrderNotFound(order_id.0.clone()));
        };
        if !order.is_modifiable() {
            return Err(PaperEngineError::NotModifiable(order_id.0.clone()));
        }
        order.cancel();
        let snapshot = order.clone();
        self.persist_order(&snapshot);
        Ok(())
    }

    /// `update_ltp` — refresh the cache and recompute unrealized P&L on every
    /// position matching `(symbol, exchange, *)` (§4.E "LTP updates").
    pub async fn update_ltp(&self, symbol: &str, exchange: &str, price: f64) {
        let mut inner = self.inner.lock().await;
        inner.ltp_cache.insert(ltp_key(exchange, symbol), price);

        let matching_keys: Vec<PositionKey> = inner
            .positions
            .keys()
            .filter(|k| k.symbol == symbol && k.exchange == exchange)
            .cloned()
            .collect();

        for key in matching_keys {
            if let Some(position) = inner.positions.get_mut(&key) {
                position.update_last_price(price);
                let snapshot = position.clone();
                self.persist_position(&snapshot);
            }
        }
        self.persist_funds(&inner.funds);
    }

    /// `allocate(amount)` — move `available → reserved` for the bot's capital
    /// carve-out (§4.E).
    pub async fn allocate(&self, amount: f64) -> PaperEngineResult<()> {
        let mut inner = self.inner.lock().await;
        inner.funds.allocate(amount)?;
        self.persist_funds(&inner.funds);
        Ok(())
    }

    /// `reclaim()` — move all `reserved → available`, used on bot stop
    /// (§4.E).
    pub async fn reclaim(&self) {
        let mut inner = self.inner.lock().await;
        inner.funds.reclaim();
        self.persist_funds(&inner.funds);
    }

    pub async fn reset_daily(&self) {
        let mut inner = self.inner.lock().await;
        inner.funds.reset_daily();
        self.persist_funds(&inner.funds);
    }

    pub async fn funds_snapshot(&self) -> Funds {
        self.inner.lock().await.funds.clone()
    }

    pub async fn positions_snapshot(&self) -> Vec<Position> {
        self.inner.lock().await.positions.values().cloned().collect()
    }

    pub async fn orders_snapshot(&self) -> Vec<Order> {
        self.inner.lock().await.orders.values().cloned().collect()
    }

    pub async fn open_orders(&self) -> Vec<Order> {
        self.inner
            .lock()
            .await
            .orders
            .values()
            .filter(|o| matches!(o.status, OrderStatus::Pending | OrderStatus::Open))
            .cloned()
            .collect()
    }

    pub fn trade_log(&self) -> PaperEngineResult<Vec<TradeLogEntry>> {
        self.store
            .load_trades()
            .map_err(|e| PaperEngineError::Validation(format!("loading trade log: {e}")))
    }

    fn persist_order(&self, order: &Order) {
        if let Err(e) = self.store.upsert_order(order) {
            error!(error = %e, order_id = %order.order_id, "failed to persist order, store now divergent");
        }
    }

    fn persist_position(&self, position: &Position) {
        if let Err(e) = self.store.upsert_position(position) {
            error!(error = %e, key = %position.key(), "failed to persist position, store now divergent");
        }
    }

    fn persist_funds(&self, funds: &Funds) {
        if let Err(e) = self.store.upsert_funds(funds) {
            error!(error = %e, "failed to persist funds, store now divergent");
        }
    }
}
