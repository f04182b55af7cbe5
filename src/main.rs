// =============================================================================
// Aurora Trading Engine — Main Entry Point
// =============================================================================
//
// Startup order follows the teacher's `main.rs`: load env/config, build shared
// state, spawn background tasks, serve the API, wait for Ctrl+C, persist
// config on shutdown. The subsystems wired here are this engine's own (Tick
// Hub, Candle Builder, Renko Accumulator, Paper Engine, Trading Bot) rather
// than the teacher's Binance-specific streams.
//
// The engine starts with the bot stopped; a dashboard or REST call starts it
// explicitly once the operator has reviewed the configured symbols and
// strategy.
// =============================================================================

mod api;
mod app_state;
mod bot;
mod indicators;
mod market_clock;
mod market_data;
mod paper_engine;
mod runtime_config;
mod store;
mod strategy;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::bot::SymbolInfo;
use crate::market_data::upstream::{SignedRestClient, UpstreamClient, WsUpstreamClient};
use crate::runtime_config::RuntimeConfig;

const CANDLE_INTERVALS_MINUTES: &[u32] = &[1, 3, 5, 10, 15, 30, 60];
const RUNTIME_CONFIG_PATH: &str = "runtime_config.json";

/// Read the configured symbol universe from `AURORA_SYMBOLS` (`TOKEN:EX:SYM`
/// entries, comma-separated), falling back to a small NSE default set so the
/// engine is runnable out of the box.
fn load_symbol_universe() -> Vec<SymbolInfo> {
    if let Ok(raw) = std::env::var("AURORA_SYMBOLS") {
        let parsed: Vec<SymbolInfo> = raw
            .split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }
                let mut parts = entry.splitn(3, ':');
                let token: u32 = parts.next()?.parse().ok()?;
                let exchange = parts.next()?.to_string();
                let symbol = parts.next()?.to_string();
                Some(SymbolInfo { symbol, exchange, token })
            })
            .collect();
        if !parsed.is_empty() {
            return parsed;
        }
    }

    vec![
        SymbolInfo { symbol: "RELIANCE".into(), exchange: "NSE".into(), token: 738561 },
        SymbolInfo { symbol: "TCS".into(), exchange: "NSE".into(), token: 2953217 },
        SymbolInfo { symbol: "INFY".into(), exchange: "NSE".into(), token: 408065 },
        SymbolInfo { symbol: "HDFCBANK".into(), exchange: "NSE".into(), token: 341249 },
        SymbolInfo { symbol: "SBIN".into(), exchange: "NSE".into(), token: 779521 },
    ]
}

fn build_upstream_client() -> Arc<dyn UpstreamClient> {
    let api_key = std::env::var("AURORA_UPSTREAM_KEY").unwrap_or_default();
    let api_secret = std::env::var("AURORA_UPSTREAM_SECRET").unwrap_or_default();
    let base_url = std::env::var("AURORA_UPSTREAM_REST_URL")
        .unwrap_or_else(|_| "https://api.upstream.invalid".to_string());
    let feed_url = std::env::var("AURORA_UPSTREAM_WS_URL")
        .unwrap_or_else(|_| "wss://feed.upstream.invalid/ticks".to_string());

    let rest = SignedRestClient::new(api_key, api_secret, base_url);
    Arc::new(WsUpstreamClient::new(rest, feed_url))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Aurora Trading Engine — Starting Up               ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    // ── 1. Configuration ─────────────────────────────────────────────────
    let config = RuntimeConfig::load(RUNTIME_CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load runtime config, using defaults");
        RuntimeConfig::default()
    });

    info!(
        paper_trading = config.paper_trading,
        default_strategy = %config.default_strategy,
        store_dsn = %config.store_dsn,
        "runtime config resolved"
    );

    // ── 2. Upstream client + shared state ────────────────────────────────
    let upstream = build_upstream_client();
    let state = Arc::new(AppState::new(config, upstream).await?);

    let symbols = load_symbol_universe();
    for info in &symbols {
        state.register_symbol(info.clone());
    }
    info!(count = symbols.len(), "symbol universe registered");

    // ── 3. Wire Tick Hub → Candle Builder + Renko Accumulator ────────────
    // Every tick feeds the candle builder at each supported interval and the
    // Renko accumulator for the instrument; the Trading Bot registers its own
    // callback separately when it starts (§4.A "on_tick" fan-out).
    {
        let candle_builder = state.candle_builder.clone();
        let renko = state.renko.clone();
        state.tick_hub.on_tick(move |tick| {
            for &interval in CANDLE_INTERVALS_MINUTES {
                let volume_delta = tick.volume_traded.unwrap_or(0);
                candle_builder.update(tick.token, interval, tick.timestamp, tick.last_price, volume_delta);
            }
            renko.update_brick(tick.token, tick.last_price);
        });
    }

    // ── 4. Launch the Tick Hub's reconnect loop ──────────────────────────
    {
        let hub = state.tick_hub.clone();
        tokio::spawn(async move {
            hub.run().await;
        });
    }

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr = std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_for_log = bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .expect("failed to bind API server");
        info!(addr = %bind_addr_for_log, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ──────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    if state.bot.state() != crate::types::BotState::Stopped {
        if let Err(e) = state.bot.stop(true, state.runtime_config.read().product()).await {
            error!(error = %e, "failed to stop trading bot cleanly during shutdown");
        }
    }

    if let Err(e) = state.runtime_config.read().save(RUNTIME_CONFIG_PATH) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("Aurora Trading Engine shut down complete.");
    Ok(())
}
