// =============================================================================
// Position — per-(symbol, exchange, product) accounting (§3, §4.E)
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Product, Side};

/// Composite key identifying one position (§3).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub symbol: String,
    pub exchange: String,
    pub product: Product,
}

impl PositionKey {
    pub fn new(symbol: impl Into<String>, exchange: impl Into<String>, product: Product) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            product,
        }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.exchange, self.symbol, self.product)
    }
}

/// Current accounting state for one instrument/product combination (§3).
/// Long when `net_qty > 0`, short when `net_qty < 0`. Destroyed (removed from
/// the store) the instant `net_qty` returns to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub exchange: String,
    pub product: Product,
    pub net_qty: i64,
    pub avg_price: f64,
    pub last_price: f64,
    pub buy_qty: u64,
    pub sell_qty: u64,
    pub buy_value: f64,
    pub sell_value: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying a SELL fill: the realized P&L booked by that fill and
/// whether the position was destroyed (§3 "Position" lifecycle).
pub struct SellOutcome {
    pub delta_realized: f64,
    pub cost_of_sold: f64,
    pub closed: bool,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.symbol.clone(), self.exchange.clone(), self.product)
    }

    fn opened(symbol: String, exchange: String, product: Product) -> Self {
        let now = Utc::now();
        Self {
            symbol,
            exchange,
            product,
            net_qty: 0,
            avg_price: 0.0,
            last_price: 0.0,
            buy_qty: 0,
            sell_qty: 0,
            buy_value: 0.0,
            sell_value: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            opened_at: now,
            updated_at: now,
        }
    }

    /// Create-or-fetch a position for `key`, handing back a fresh zeroed
    /// record when none exists yet (§3 "created by first fill").
    pub fn new_or(existing: Option<Position>, key: &PositionKey) -> Self {
        existing.unwrap_or_else(|| Self::opened(key.symbol.clone(), key.exchange.clone(), key.product))
    }

    /// Apply a BUY fill of `qty @ fill_price` (§4.E "Position & fund math").
    pub fn apply_buy(&mut self, qty: u64, fill_price: f64) {
        let value = qty as f64 * fill_price;
        self.buy_qty += qty;
        self.buy_value += value;
        self.net_qty += qty as i64;
        self.touch_price(fill_price);
    }

    /// Apply a SELL fill of `qty @ fill_price`, returning the realized P&L
    /// delta this fill books (§4.E "Position & fund math").
    ///
    /// Average cost is `buy_value / buy_qty` at the moment of the sell; when
    /// the sell fully closes the position, the remaining `buy_value` is used
    /// in place of `qty * avg_cost` to avoid rounding drift (§3 "on
    /// destruction buy_value has been proportionally drawn down to zero").
    pub fn apply_sell(&mut self, qty: u64, fill_price: f64) -> SellOutcome {
        let value = qty as f64 * fill_price;
        self.sell_qty += qty;
        self.sell_value += value;
        self.net_qty -= qty as i64;

        let avg_cost = if self.buy_qty > 0 {
            self.buy_value / self.buy_qty as f64
        } else {
            0.0
        };

        let closing_all = self.net_qty == 0;
        let cost_of_sold = if closing_all {
            self.buy_value
        } else {
            qty as f64 * avg_cost
        };

        self.buy_value -= cost_of_sold;
        let delta_realized = value - cost_of_sold;
        self.realized_pnl += delta_realized;
        self.touch_price(fill_price);

        SellOutcome {
            delta_realized,
            cost_of_sold,
            closed: self.net_qty == 0,
        }
    }

    /// Recompute `avg_price` from the proportional buy/sell drawdown rule and
    /// refresh `unrealized_pnl` against `last_price` (§4.E, §3 "avg_price
    /// recomputed after each fill").
    fn touch_price(&mut self, last_price: f64) {
        if self.net_qty != 0 {
            self.avg_price = (self.buy_value - self.sell_value).abs() / self.net_qty.unsigned_abs() as f64;
        }
        self.last_price = last_price;
        self.recompute_unrealized();
        self.updated_at = Utc::now();
    }

    /// `(last_price - avg_price) * net_qty` for longs, the mirror for shorts
    /// (§4.E "LTP updates").
    pub fn recompute_unrealized(&mut self) {
        self.unrealized_pnl = if self.net_qty > 0 {
            (self.last_price - self.avg_price) * self.net_qty as f64
        } else if self.net_qty < 0 {
            (self.avg_price - self.last_price) * self.net_qty.unsigned_abs() as f64
        } else {
            0.0
        };
    }

    /// Update to a fresh LTP without a fill (§4.E "update_ltp").
    pub fn update_last_price(&mut self, price: f64) {
        self.last_price = price;
        self.recompute_unrealized();
        self.updated_at = Utc::now();
    }

    pub fn is_destroyed(&self) -> bool {
        self.net_qty == 0
    }

    pub fn side(&self) -> Option<Side> {
        if self.net_qty > 0 {
            Some(Side::Buy)
        } else if self.net_qty < 0 {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Position {
        Position::opened("RELIANCE".into(), "NSE".into(), Product::Mis)
    }

    #[test]
    fn scenario_1_buy_then_sell_round_trip() {
        // §8 scenario 1.
        let mut p = fresh();
        p.apply_buy(10, 2500.0);
        assert_eq!(p.net_qty, 10);
        assert_eq!(p.avg_price, 2500.0);

        p.update_last_price(2510.0);
        assert!((p.unrealized_pnl - 100.0).abs() < 1e-9);

        let outcome = p.apply_sell(10, 2510.0);
        assert_eq!(p.net_qty, 0);
        assert!(p.is_destroyed());
        assert!((outcome.delta_realized - 100.0).abs() < 1e-9);
        assert!((p.realized_pnl - 100.0).abs() < 1e-9);
    }

    #[test]
    fn partial_sell_draws_down_buy_value_proportionally() {
        let mut p = fresh();
        p.apply_buy(10, 100.0); // buy_value = 1000
        let outcome = p.apply_sell(4, 110.0); // cost_of_sold = 4*100 = 400
        assert!((outcome.cost_of_sold - 400.0).abs() < 1e-9);
        assert!((p.buy_value - 600.0).abs() < 1e-9);
        assert_eq!(p.net_qty, 6);
        assert!(!p.is_destroyed());
    }

    #[test]
    fn short_position_unrealized_pnl_mirrors_long() {
        let mut p = fresh();
        p.apply_sell(5, 100.0);
        assert_eq!(p.net_qty, -5);
        p.update_last_price(90.0);
        assert!((p.unrealized_pnl - 50.0).abs() < 1e-9); // (100-90)*5
    }

    #[test]
    fn full_close_uses_remaining_buy_value_not_qty_times_avg_cost() {
        let mut p = fresh();
        p.apply_buy(3, 100.0);
        p.apply_buy(7, 110.0); // buy_value = 300 + 770 = 1070, buy_qty=10
        let outcome = p.apply_sell(10, 120.0);
        assert!((outcome.cost_of_sold - 1070.0).abs() < 1e-9);
        assert!((p.buy_value).abs() < 1e-9);
        assert!(p.is_destroyed());
    }
}
