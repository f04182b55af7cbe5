// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. `/health` requires no authentication;
// every other endpoint requires a valid Bearer token checked via the
// `AuthBearer` extractor (kept from the teacher near-verbatim). Route groups
// mirror §6 "HTTP API (exposed, abstract)": tick streaming control, paper
// trading portfolio/trades/funds/stats/reset/manual trade, bot
// start/stop/pause/resume/status/positions, and historical-data pass-through.
// CORS is configured permissively for development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::{create_strategy, AppState};
use crate::bot::{StartRequest, SymbolInfo};
use crate::market_data::tick::{InstrumentMeta, TickMode};
use crate::paper_engine::{PaperEngineError, PlaceOrderRequest};
use crate::types::{OrderType, Product, Side};

// =============================================================================
// Router construction
// =============================================================================

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .route("/api/v1/state", get(get_state))
        .route("/api/v1/market/status", get(market_status))
        .route("/api/v1/ticks/start", post(ticks_start))
        .route("/api/v1/ticks/stop", post(ticks_stop))
        .route("/api/v1/ticks/subscribe", post(ticks_subscribe))
        .route("/api/v1/ticks/unsubscribe", post(ticks_unsubscribe))
        .route("/api/v1/portfolio", get(portfolio))
        .route("/api/v1/funds", get(funds))
        .route("/api/v1/trades", get(trades))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/orders/place", post(place_order))
        .route("/api/v1/orders/:order_id/modify", post(modify_order))
        .route("/api/v1/orders/:order_id/cancel", post(cancel_order))
        .route("/api/v1/reset", post(reset_portfolio))
        .route("/api/v1/bot/start", post(bot_start))
        .route("/api/v1/bot/stop", post(bot_stop))
        .route("/api/v1/bot/pause", post(bot_pause))
        .route("/api/v1/bot/resume", post(bot_resume))
        .route("/api/v1/bot/status", get(bot_status))
        .route("/api/v1/bot/positions", get(bot_positions))
        .route("/api/v1/historical/:symbol", get(historical_candles))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Shared error response
// =============================================================================

#[derive(Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorBody { status: "error", message: message.into() }),
    )
        .into_response()
}

impl IntoResponse for PaperEngineError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            PaperEngineError::SafetyGuardViolation => StatusCode::INTERNAL_SERVER_ERROR,
            PaperEngineError::RiskLimitBreach(_) => StatusCode::BAD_REQUEST,
            PaperEngineError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
            PaperEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            PaperEngineError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            PaperEngineError::NotModifiable(_) => StatusCode::BAD_REQUEST,
            PaperEngineError::NoFillPrice(_) => StatusCode::SERVICE_UNAVAILABLE,
            PaperEngineError::AllocationFailed { .. } => StatusCode::BAD_REQUEST,
        };
        error_response(status, self.to_string())
    }
}

// =============================================================================
// Health / state
// =============================================================================

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_state(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    match state.build_snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn market_status(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    Json(state.market_clock.status_report())
}

// =============================================================================
// Tick streaming control (§6 "Tick streaming control")
// =============================================================================

#[derive(Deserialize)]
struct TokensRequest {
    tokens: Vec<u32>,
    #[serde(default)]
    mode: Option<String>,
}

fn parse_mode(raw: Option<&str>) -> TickMode {
    match raw.map(str::to_ascii_uppercase).as_deref() {
        Some("QUOTE") => TickMode::Quote,
        Some("FULL") => TickMode::Full,
        _ => TickMode::Ltp,
    }
}

async fn ticks_start(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    // The hub's reconnect loop is already running from `main`; "start" here
    // re-applies the full known symbol universe's subscriptions (§4.A).
    let instruments: Vec<InstrumentMeta> = state
        .symbols
        .read()
        .values()
        .map(|s| InstrumentMeta { token: s.token, symbol: s.symbol.clone(), exchange: s.exchange.clone(), mode: TickMode::Full })
        .collect();
    state.tick_hub.subscribe(instruments);
    Json(serde_json::json!({ "status": "ok", "connected": state.tick_hub.is_connected() }))
}

async fn ticks_stop(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    let tokens: Vec<u32> = state.tick_hub.subscribed_tokens().into_iter().collect();
    state.tick_hub.unsubscribe(&tokens);
    Json(serde_json::json!({ "status": "ok" }))
}

async fn ticks_subscribe(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(req): Json<TokensRequest>,
) -> impl IntoResponse {
    let mode = parse_mode(req.mode.as_deref());
    let symbols = state.symbols.read();
    let instruments: Vec<InstrumentMeta> = req
        .tokens
        .iter()
        .filter_map(|token| {
            symbols
                .values()
                .find(|s| s.token == *token)
                .map(|s| InstrumentMeta { token: s.token, symbol: s.symbol.clone(), exchange: s.exchange.clone(), mode })
        })
        .collect();
    drop(symbols);
    let resolved = instruments.len();
    state.tick_hub.subscribe(instruments);
    Json(serde_json::json!({ "status": "ok", "subscribed": resolved }))
}

async fn ticks_unsubscribe(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(req): Json<TokensRequest>,
) -> impl IntoResponse {
    state.tick_hub.unsubscribe(&req.tokens);
    Json(serde_json::json!({ "status": "ok" }))
}

// =============================================================================
// Paper trading: portfolio / funds / trades / stats / reset / manual trade
// =============================================================================

async fn portfolio(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let positions = engine.positions_snapshot().await;
    let open_orders = engine.open_orders().await;
    Json(serde_json::json!({ "positions": positions, "open_orders": open_orders })).into_response()
}

async fn funds(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    Json(engine.funds_snapshot().await).into_response()
}

#[derive(Deserialize)]
struct TradesQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn trades(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Query(q): Query<TradesQuery>,
) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    match engine.trade_log() {
        Ok(mut log) => {
            log.sort_by_key(|t| std::cmp::Reverse(t.ts));
            if let Some(limit) = q.limit {
                log.truncate(limit);
            }
            Json(log).into_response()
        }
        Err(e) => e.into_response(),
    }
}

#[derive(Serialize)]
struct StatsResponse {
    total_trades: usize,
    win_rate: f64,
    profit_factor: f64,
    realized_pnl: f64,
    total_pnl: f64,
    trades_today: u32,
}

async fn stats(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let funds = engine.funds_snapshot().await;
    let log = match engine.trade_log() {
        Ok(l) => l,
        Err(e) => return e.into_response(),
    };

    // Approximate realized win/loss by pairing opposite-side fills per
    // symbol sequentially; the trade log itself only records fills, not
    // realized P&L per trade, so stats here are a coarse convenience view
    // over the authoritative funds.realized_pnl.
    let total_trades = log.len();
    let (mut gains, mut losses, mut wins) = (0.0_f64, 0.0_f64, 0usize);
    let mut running: std::collections::HashMap<(String, crate::types::Side), f64> = std::collections::HashMap::new();
    for t in &log {
        let opposite = t.side.opposite();
        if let Some(entry_price) = running.remove(&(t.symbol.clone(), opposite)) {
            let delta = match opposite {
                crate::types::Side::Buy => (t.price - entry_price) * t.qty as f64,
                crate::types::Side::Sell => (entry_price - t.price) * t.qty as f64,
            };
            if delta >= 0.0 {
                gains += delta;
                wins += 1;
            } else {
                losses += -delta;
            }
        } else {
            running.insert((t.symbol.clone(), t.side), t.price);
        }
    }
    let win_rate = if total_trades == 0 { 0.0 } else { wins as f64 / total_trades as f64 };
    let profit_factor = if losses > 0.0 { gains / losses } else if gains > 0.0 { f64::INFINITY } else { 0.0 };

    Json(StatsResponse {
        total_trades,
        win_rate,
        profit_factor,
        realized_pnl: funds.realized_pnl,
        total_pnl: funds.total_pnl,
        trades_today: funds.trades_today,
    })
    .into_response()
}

#[derive(Deserialize)]
struct PlaceOrderBody {
    symbol: String,
    exchange: String,
    side: Side,
    qty: u64,
    order_type: OrderType,
    product: Product,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    trigger_price: Option<f64>,
    #[serde(default)]
    tag: Option<String>,
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<PlaceOrderBody>,
) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let req = PlaceOrderRequest {
        symbol: body.symbol,
        exchange: body.exchange,
        side: body.side,
        qty: body.qty,
        order_type: body.order_type,
        product: body.product,
        price: body.price,
        trigger_price: body.trigger_price,
        tag: body.tag,
    };
    match engine.place_order(req).await {
        Ok(order_id) => {
            state.increment_version();
            Json(serde_json::json!({ "status": "ok", "order_id": order_id.0 })).into_response()
        }
        Err(e) => {
            state.push_error_with_code(e.to_string(), None);
            e.into_response()
        }
    }
}

#[derive(Deserialize)]
struct ModifyOrderBody {
    #[serde(default)]
    qty: Option<u64>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    trigger_price: Option<f64>,
}

async fn modify_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(order_id): Path<String>,
    Json(body): Json<ModifyOrderBody>,
) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let id = crate::paper_engine::OrderId(order_id);
    match engine.modify_order(&id, body.qty, body.price, body.trigger_price).await {
        Ok(()) => {
            state.increment_version();
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(order_id): Path<String>,
) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    let id = crate::paper_engine::OrderId(order_id);
    match engine.cancel_order(&id).await {
        Ok(()) => {
            state.increment_version();
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

async fn reset_portfolio(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    // Resetting counters here affects the bot's own in-memory daily counters
    // too, mirroring §4.G "reset_state()... called after portfolio resets".
    state.bot.reset_state();
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    engine.reset_daily().await;
    state.increment_version();
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

// =============================================================================
// Bot control (§6 "Bot control")
// =============================================================================

#[derive(Deserialize)]
struct BotStartBody {
    symbols: Vec<String>,
    #[serde(default)]
    capital_per_symbol: Option<f64>,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    product: Option<String>,
}

async fn bot_start(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<BotStartBody>,
) -> impl IntoResponse {
    let cfg = state.runtime_config.read().clone();
    let capital_per_symbol = body.capital_per_symbol.unwrap_or(cfg.default_capital_per_symbol);
    let strategy_name = body.strategy.unwrap_or(cfg.default_strategy.clone());
    let product: Product = body
        .product
        .as_deref()
        .unwrap_or(&cfg.default_product)
        .parse()
        .unwrap_or(cfg.product());

    let mut infos = Vec::with_capacity(body.symbols.len());
    for sym in &body.symbols {
        match state.resolve_symbol(sym) {
            Some(info) => infos.push(info),
            None => return error_response(StatusCode::BAD_REQUEST, format!("unknown symbol: {sym}")),
        }
    }
    if infos.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no valid symbols given");
    }

    let renko = state.renko.clone();
    let strategy_name_owned = strategy_name.clone();
    let make_strategy = move |info: &SymbolInfo| -> Box<dyn crate::strategy::Strategy> {
        create_strategy(&strategy_name_owned, info, capital_per_symbol, renko.clone())
    };

    let req = StartRequest { symbols: infos, capital_per_symbol, product };
    match state.bot.start(req, make_strategy).await {
        Ok(()) => {
            state.increment_version();
            info!(strategy = %strategy_name, "bot started via REST");
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(message) => {
            warn!(%message, "bot start rejected");
            error_response(StatusCode::BAD_REQUEST, message)
        }
    }
}

#[derive(Deserialize)]
struct BotStopBody {
    #[serde(default = "default_true")]
    square_off: bool,
}

fn default_true() -> bool {
    true
}

async fn bot_stop(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Json(body): Json<BotStopBody>,
) -> impl IntoResponse {
    let product = state.runtime_config.read().product();
    match state.bot.stop(body.square_off, product).await {
        Ok(()) => {
            state.increment_version();
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(message) => error_response(StatusCode::BAD_REQUEST, message),
    }
}

async fn bot_pause(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    match state.bot.pause() {
        Ok(()) => {
            state.increment_version();
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(message) => error_response(StatusCode::BAD_REQUEST, message),
    }
}

async fn bot_resume(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    match state.bot.resume() {
        Ok(()) => {
            state.increment_version();
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
        Err(message) => error_response(StatusCode::BAD_REQUEST, message),
    }
}

async fn bot_status(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    Json(state.bot.status())
}

async fn bot_positions(State(state): State<Arc<AppState>>, _auth: AuthBearer) -> impl IntoResponse {
    let engine = match state.default_engine().await {
        Ok(e) => e,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    Json(engine.positions_snapshot().await).into_response()
}

// =============================================================================
// Historical data pass-through (§6 "Historical data and indicator
// calculations (pass-throughs)")
// =============================================================================

#[derive(Deserialize)]
struct HistoricalQuery {
    from: i64,
    to: i64,
    #[serde(default = "default_interval")]
    interval: String,
}

fn default_interval() -> String {
    "5minute".to_string()
}

async fn historical_candles(
    State(state): State<Arc<AppState>>,
    _auth: AuthBearer,
    Path(symbol): Path<String>,
    Query(q): Query<HistoricalQuery>,
) -> impl IntoResponse {
    let Some(info) = state.resolve_symbol(&symbol) else {
        return error_response(StatusCode::BAD_REQUEST, format!("unknown symbol: {symbol}"));
    };
    match crate::market_data::historical::fetch_historical(&state.upstream, info.token, q.from, q.to, &q.interval).await {
        Ok(candles) => Json(serde_json::json!({ "symbol": symbol, "interval": q.interval, "candles": candles.len() }))
            .into_response(),
        Err(e) => {
            warn!(symbol = %symbol, error = %e, "historical fetch failed");
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}
