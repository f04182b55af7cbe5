// =============================================================================
// Funds — fund-reservation model (§3, §4.E)
// =============================================================================
//
// Three buckets -- `available`, `reserved`, `invested` -- plus running P&L
// counters. `allocate`/`reclaim` are the bot's capital-carve-out primitives
// (§4.E "Fund-reservation model"); `apply_buy`/`apply_sell` are invoked by the
// Paper Engine's fill procedure.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paper_engine::errors::{PaperEngineError, PaperEngineResult};

/// Singleton fund record (`id = "global_state"` at the persistence layer, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Funds {
    pub capital: f64,
    pub available: f64,
    pub invested: f64,
    pub reserved: f64,
    pub realized_pnl: f64,
    pub daily_pnl: f64,
    pub total_pnl: f64,
    pub trades_today: u32,
    pub updated_at: DateTime<Utc>,
}

impl Funds {
    pub fn new(capital: f64) -> Self {
        Self {
            capital,
            available: capital,
            invested: 0.0,
            reserved: 0.0,
            realized_pnl: 0.0,
            daily_pnl: 0.0,
            total_pnl: 0.0,
            trades_today: 0,
            updated_at: Utc::now(),
        }
    }

    /// Move `amount` from `available` to `reserved` (§4.E "allocate").
    pub fn allocate(&mut self, amount: f64) -> PaperEngineResult<()> {
        if amount > self.available {
            return Err(PaperEngineError::AllocationFailed {
                requested: amount,
                available: self.available,
            });
        }
        self.available -= amount;
        self.reserved += amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move all `reserved` back to `available` (§4.E "reclaim", used on bot
    /// stop).
    pub fn reclaim(&mut self) {
        self.available += self.reserved;
        self.reserved = 0.0;
        self.updated_at = Utc::now();
    }

    /// Funds usable by an order tagged `BOT_*`: reserved first, then
    /// available (§4.E "funds check").
    pub fn bot_spendable(&self) -> f64 {
        self.available + self.reserved
    }

    /// Debit `value` for a BUY fill, drawing from `reserved` first when
    /// `is_bot` and reserved funds exist (§4.E "BUY").
    pub fn apply_buy(&mut self, value: f64, is_bot: bool) {
        if is_bot && self.reserved > 0.0 {
            let from_reserved = value.min(self.reserved);
            self.reserved -= from_reserved;
            self.available -= value - from_reserved;
        } else {
            self.available -= value;
        }
        self.invested += value;
        self.updated_at = Utc::now();
    }

    /// Credit a SELL fill's proceeds and realized P&L delta. Per §9's open
    /// question, a `BOT_*` tagged sell always credits `reserved` regardless
    /// of which bucket the original buy drew from.
    pub fn apply_sell(&mut self, proceeds: f64, cost_of_sold: f64, delta_realized: f64, is_bot: bool) {
        self.invested -= cost_of_sold;
        if is_bot {
            self.reserved += proceeds;
        } else {
            self.available += proceeds;
        }
        self.realized_pnl += delta_realized;
        self.daily_pnl += delta_realized;
        self.total_pnl += delta_realized;
        self.trades_today += 1;
        self.updated_at = Utc::now();
    }

    /// Reset the trade/PnL counters that roll over daily (called by the bot
    /// at session start, or whenever the market-local date changes).
    pub fn reset_daily(&mut self) {
        self.daily_pnl = 0.0;
        self.trades_today = 0;
        self.updated_at = Utc::now();
    }

    /// `available + reserved + invested + unrealized_pnl` should track
    /// `capital + realized_pnl` up to rounding (§8 invariant); callers supply
    /// the aggregated unrealized P&L across all open positions.
    pub fn consistency_gap(&self, unrealized_pnl_total: f64) -> f64 {
        (self.available + self.reserved + self.invested + unrealized_pnl_total)
            - (self.capital + self.realized_pnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_reclaim_restores_split() {
        let mut f = Funds::new(10_000.0);
        f.allocate(6_000.0).unwrap();
        assert_eq!(f.available, 4_000.0);
        assert_eq!(f.reserved, 6_000.0);
        f.reclaim();
        assert_eq!(f.available, 10_000.0);
        assert_eq!(f.reserved, 0.0);
    }

    #[test]
    fn allocate_rejects_over_available() {
        let mut f = Funds::new(1_000.0);
        assert!(f.allocate(1_500.0).is_err());
        assert_eq!(f.available, 1_000.0);
    }

    #[test]
    fn scenario_1_buy_sell_round_trip_on_funds() {
        // §8 scenario 1: 100000 available, BUY 10 @2500 = 25000.
        let mut f = Funds::new(100_000.0);
        f.apply_buy(25_000.0, false);
        assert_eq!(f.available, 75_000.0);
        assert_eq!(f.invested, 25_000.0);

        // SELL 10 @2510, cost_of_sold=25000, delta=100
        f.apply_sell(25_100.0, 25_000.0, 100.0, false);
        assert_eq!(f.available, 100_100.0);
        assert_eq!(f.invested, 0.0);
        assert_eq!(f.realized_pnl, 100.0);
        assert_eq!(f.daily_pnl, 100.0);
    }

    #[test]
    fn scenario_2_bot_reservation_drawdown() {
        // §8 scenario 2.
        let mut f = Funds::new(10_000.0);
        f.allocate(6_000.0).unwrap();
        assert_eq!(f.available, 4_000.0);
        assert_eq!(f.reserved, 6_000.0);

        f.apply_buy(2_500.0, true);
        assert_eq!(f.reserved, 3_500.0);
        assert_eq!(f.available, 4_000.0);
        assert_eq!(f.invested, 2_500.0);

        f.reclaim();
        assert_eq!(f.available, 7_500.0);
        assert_eq!(f.reserved, 0.0);
    }

    #[test]
    fn bot_buy_spills_into_available_once_reserved_exhausted() {
        let mut f = Funds::new(10_000.0);
        f.allocate(1_000.0).unwrap();
        f.apply_buy(1_500.0, true); // 1000 from reserved, 500 from available
        assert_eq!(f.reserved, 0.0);
        assert_eq!(f.available, 8_500.0);
    }
}
