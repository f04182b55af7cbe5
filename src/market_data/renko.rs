// =============================================================================
// Renko Accumulator — price-driven brick generator (§4.C)
// =============================================================================
//
// Grounded on `original_source/backend/app/services/renko.py`'s
// `RenkoCalculator`/`RenkoBrick`: same transition math, translated from a
// dict-returning method into a value-returning one, and from a single global
// lock to a `parking_lot::RwLock` guarding a per-instrument map as the rest of
// this crate's shared-state components do.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Per-instrument brick state (§3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RenkoState {
    pub brick_size: f64,
    pub upper_limit: Option<f64>,
    pub lower_limit: Option<f64>,
    pub brick_count: i64,
    pub last_price: f64,
}

impl RenkoState {
    fn new(brick_size: f64) -> Self {
        Self {
            brick_size,
            upper_limit: None,
            lower_limit: None,
            brick_count: 0,
            last_price: 0.0,
        }
    }
}

/// Outcome of one price update, mirroring the Python original's return dict.
#[derive(Debug, Clone, Copy)]
pub struct RenkoUpdate {
    pub brick_formed: bool,
    pub brick_count: i64,
    pub brick_change: i64,
}

/// Thread-safe Renko brick accumulator keyed by instrument token (§4.C).
pub struct RenkoAccumulator {
    state: RwLock<HashMap<u32, RenkoState>>,
}

impl Default for RenkoAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RenkoAccumulator {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Create brick state for `token`, optionally seeding limits from
    /// `initial_price` (§4.C "If limits unset...").
    pub fn initialize_brick(&self, token: u32, brick_size: f64, initial_price: Option<f64>) {
        let mut brick = RenkoState::new(brick_size);
        if let Some(p) = initial_price {
            brick.upper_limit = Some(p + brick_size);
            brick.lower_limit = Some(p - brick_size);
            brick.last_price = p;
        }
        self.state.write().insert(token, brick);
        info!(token, brick_size, "renko brick initialized");
    }

    /// Feed a new price into `token`'s brick state (§4.C "Transition on price").
    ///
    /// Auto-initializes with `brick_size=1.0` if the token has no state yet,
    /// matching the original's auto-initialize-on-first-update behavior.
    pub fn update_brick(&self, token: u32, price: f64) -> RenkoUpdate {
        let mut map = self.state.write();
        let brick = map.entry(token).or_insert_with(|| RenkoState::new(1.0));
        brick.last_price = price;

        if brick.upper_limit.is_none() {
            brick.upper_limit = Some(price + brick.brick_size);
            brick.lower_limit = Some(price - brick.brick_size);
            return RenkoUpdate {
                brick_formed: false,
                brick_count: 0,
                brick_change: 0,
            };
        }

        let upper = brick.upper_limit.unwrap();
        let lower = brick.lower_limit.unwrap();
        let old_count = brick.brick_count;
        let mut brick_formed = false;

        if price > upper {
            let gap = ((price - upper) / brick.brick_size).floor() as i64;
            let bricks_formed = 1 + gap;
            brick.lower_limit = Some(upper + (gap as f64 * brick.brick_size) - brick.brick_size);
            brick.upper_limit = Some(upper + (bricks_formed as f64 * brick.brick_size));
            brick.brick_count = (brick.brick_count + bricks_formed).max(1);
            brick_formed = true;
        } else if price < lower {
            let gap = ((lower - price) / brick.brick_size).floor() as i64;
            let bricks_formed = 1 + gap;
            brick.upper_limit = Some(lower - (gap as f64 * brick.brick_size) + brick.brick_size);
            brick.lower_limit = Some(lower - (bricks_formed as f64 * brick.brick_size));
            brick.brick_count = (brick.brick_count - bricks_formed).min(-1);
            brick_formed = true;
        }

        RenkoUpdate {
            brick_formed,
            brick_count: brick.brick_count,
            brick_change: brick.brick_count - old_count,
        }
    }

    pub fn get_brick_state(&self, token: u32) -> Option<RenkoState> {
        self.state.read().get(&token).copied()
    }

    pub fn get_brick_count(&self, token: u32) -> i64 {
        self.state.read().get(&token).map_or(0, |b| b.brick_count)
    }

    /// `brick_count >= threshold` (§4.C, supplemented).
    pub fn is_strong_uptrend(&self, token: u32, threshold: i64) -> bool {
        self.get_brick_count(token) >= threshold
    }

    /// `brick_count <= -threshold` (§4.C, supplemented).
    pub fn is_strong_downtrend(&self, token: u32, threshold: i64) -> bool {
        self.get_brick_count(token) <= -threshold
    }

    /// Clear one instrument's state (used on portfolio reset).
    pub fn reset_brick(&self, token: u32) {
        self.state.write().remove(&token);
    }

    /// Snapshot of every tracked instrument's state, for dashboard display.
    pub fn get_all_states(&self) -> HashMap<u32, RenkoState> {
        self.state.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_sets_limits_without_forming_brick() {
        let acc = RenkoAccumulator::new();
        acc.initialize_brick(1, 1.0, None);
        let update = acc.update_brick(1, 100.0);
        assert!(!update.brick_formed);
        let state = acc.get_brick_state(1).unwrap();
        assert_eq!(state.upper_limit, Some(101.0));
        assert_eq!(state.lower_limit, Some(99.0));
    }

    #[test]
    fn scenario_3_brick_accumulation_matches_spec() {
        // §8 scenario 3: brick_size=1, initial price=100.
        let acc = RenkoAccumulator::new();
        acc.initialize_brick(1, 1.0, Some(100.0));
        assert_eq!(acc.get_brick_state(1).unwrap().upper_limit, Some(101.0));
        assert_eq!(acc.get_brick_state(1).unwrap().lower_limit, Some(99.0));

        let u = acc.update_brick(1, 100.5);
        assert!(!u.brick_formed);
        assert_eq!(acc.get_brick_count(1), 0);

        let u = acc.update_brick(1, 101.2);
        assert!(u.brick_formed);
        assert_eq!(acc.get_brick_count(1), 1);
        let s = acc.get_brick_state(1).unwrap();
        assert_eq!(s.lower_limit, Some(100.0));
        assert_eq!(s.upper_limit, Some(102.0));

        let u = acc.update_brick(1, 102.5);
        assert!(u.brick_formed);
        assert_eq!(acc.get_brick_count(1), 2);
        let s = acc.get_brick_state(1).unwrap();
        assert_eq!(s.lower_limit, Some(101.0));
        assert_eq!(s.upper_limit, Some(103.0));

        // Direction flip: matches the original `RenkoCalculator.update_brick`
        // formula exactly (the spec's own prose example for this step is
        // inconsistent with its source; the transition math here is the
        // authority per §4.C).
        let u = acc.update_brick(1, 99.8);
        assert!(u.brick_formed);
        assert_eq!(acc.get_brick_count(1), -1);
        let s = acc.get_brick_state(1).unwrap();
        assert_eq!(s.lower_limit, Some(99.0));
        assert_eq!(s.upper_limit, Some(101.0));
    }

    #[test]
    fn price_equal_to_upper_limit_does_not_form_brick() {
        let acc = RenkoAccumulator::new();
        acc.initialize_brick(1, 1.0, Some(100.0));
        let u = acc.update_brick(1, 101.0);
        assert!(!u.brick_formed);
        assert_eq!(acc.get_brick_count(1), 0);
    }

    #[test]
    fn strong_trend_helpers_use_threshold() {
        let acc = RenkoAccumulator::new();
        acc.initialize_brick(1, 1.0, Some(100.0));
        acc.update_brick(1, 101.2);
        acc.update_brick(1, 102.5);
        assert!(acc.is_strong_uptrend(1, 2));
        assert!(!acc.is_strong_uptrend(1, 3));
        assert!(!acc.is_strong_downtrend(1, 2));
    }

    #[test]
    fn reset_brick_clears_state() {
        let acc = RenkoAccumulator::new();
        acc.initialize_brick(1, 1.0, Some(100.0));
        acc.reset_brick(1);
        assert!(acc.get_brick_state(1).is_none());
        assert_eq!(acc.get_brick_count(1), 0);
    }

    #[test]
    fn auto_initializes_on_first_update_without_explicit_init() {
        let acc = RenkoAccumulator::new();
        let u = acc.update_brick(7, 50.0);
        assert!(!u.brick_formed);
        assert_eq!(acc.get_brick_state(7).unwrap().brick_size, 1.0);
    }
}
