// =============================================================================
// Runtime Configuration — Hot-reloadable engine settings with atomic save
// =============================================================================
//
// Every tunable parameter lives here so the engine can be reconfigured without
// a restart. Persistence uses an atomic tmp + rename pattern to prevent
// corruption on crash. All fields carry `#[serde(default)]` so that adding new
// fields never breaks loading an older config file (§6 "Configuration").
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Product;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_max_loss_per_day() -> f64 {
    5_000.0
}

fn default_max_positions() -> u32 {
    10
}

fn default_risk_per_trade() -> f64 {
    0.01
}

fn default_max_trades_per_day() -> u32 {
    20
}

fn default_capital_per_symbol() -> f64 {
    10_000.0
}

fn default_product() -> String {
    "MIS".to_string()
}

fn default_strategy() -> String {
    "supertrend".to_string()
}

fn default_square_off_hour() -> u32 {
    15
}

fn default_square_off_minute() -> u32 {
    15
}

fn default_store_dsn() -> String {
    "data/aurora.db".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the trading engine core (§6
/// "Configuration"). Every field has a serde default so older JSON files
/// missing new fields still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Whether the engine operates on simulated funds. `false` enables the
    /// live-order path; the Paper Engine refuses to place orders whenever
    /// this is `false` is not matched by a live implementation (§4.E "safety
    /// guard").
    #[serde(default = "default_true")]
    pub paper_trading: bool,

    /// Maximum cumulative daily loss before the Paper Engine's risk gate
    /// rejects further orders.
    #[serde(default = "default_max_loss_per_day")]
    pub max_loss_per_day: f64,

    /// Maximum simultaneous open positions per engine.
    #[serde(default = "default_max_positions")]
    pub max_positions: u32,

    /// Fraction of capital risked per trade, used by
    /// `strategy::default_position_size`.
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade: f64,

    /// Maximum order placements per day before the risk gate rejects further
    /// orders.
    #[serde(default = "default_max_trades_per_day")]
    pub max_trades_per_day: u32,

    /// Capital allocated to each symbol when the bot starts, summed and
    /// passed to `PaperEngine::allocate`.
    #[serde(default = "default_capital_per_symbol")]
    pub default_capital_per_symbol: f64,

    /// Default product type (`MIS`/`CNC`/`NRML`) for bot-placed orders.
    #[serde(default = "default_product")]
    pub default_product: String,

    /// Strategy family selected when the caller does not name one explicitly.
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    /// Hour (IST, 24h) the Trading Bot auto-square-off fires.
    #[serde(default = "default_square_off_hour")]
    pub auto_square_off_hour: u32,

    /// Minute (IST) the Trading Bot auto-square-off fires.
    #[serde(default = "default_square_off_minute")]
    pub auto_square_off_minute: u32,

    /// Path to the SQLite store backing the default (single-user) engine.
    #[serde(default = "default_store_dsn")]
    pub store_dsn: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            paper_trading: default_true(),
            max_loss_per_day: default_max_loss_per_day(),
            max_positions: default_max_positions(),
            risk_per_trade: default_risk_per_trade(),
            max_trades_per_day: default_max_trades_per_day(),
            default_capital_per_symbol: default_capital_per_symbol(),
            default_product: default_product(),
            default_strategy: default_strategy(),
            auto_square_off_hour: default_square_off_hour(),
            auto_square_off_minute: default_square_off_minute(),
            store_dsn: default_store_dsn(),
        }
    }
}

impl RuntimeConfig {
    /// Parse `default_product` into the strong type, falling back to `MIS` on
    /// an unrecognized value rather than failing startup.
    pub fn product(&self) -> Product {
        self.default_product.parse().unwrap_or(Product::Mis)
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            paper_trading = config.paper_trading,
            default_strategy = %config.default_strategy,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). Prevents corruption if the process
    /// crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.paper_trading);
        assert_eq!(cfg.max_positions, 10);
        assert_eq!(cfg.max_trades_per_day, 20);
        assert_eq!(cfg.auto_square_off_hour, 15);
        assert_eq!(cfg.auto_square_off_minute, 15);
        assert_eq!(cfg.product(), Product::Mis);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.paper_trading);
        assert_eq!(cfg.max_loss_per_day, 5_000.0);
        assert_eq!(cfg.default_strategy, "supertrend");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "default_strategy": "breakout", "max_positions": 5 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.default_strategy, "breakout");
        assert_eq!(cfg.max_positions, 5);
        assert!(cfg.paper_trading);
        assert_eq!(cfg.max_trades_per_day, 20);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.default_strategy, cfg2.default_strategy);
        assert_eq!(cfg.max_positions, cfg2.max_positions);
        assert_eq!(cfg.store_dsn, cfg2.store_dsn);
    }

    #[test]
    fn save_then_load_round_trips_via_atomic_rename() {
        let mut path = std::env::temp_dir();
        path.push(format!("aurora_runtime_config_test_{}.json", std::process::id()));

        let mut cfg = RuntimeConfig::default();
        cfg.default_strategy = "orb".to_string();
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.default_strategy, "orb");

        std::fs::remove_file(&path).unwrap();
    }
}
