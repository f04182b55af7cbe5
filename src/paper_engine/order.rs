// =============================================================================
// Order — lifecycle record for a single paper order (§3)
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{OrderStatus, OrderType, Product, Side};

/// Opaque, unique order identifier minted by the Paper Engine on acceptance
/// (§4.E "On acceptance").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An order's full lifecycle record (§3). Invariant enforced by every mutator
/// in this module: `filled_qty + pending_qty + cancelled_qty == qty`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub symbol: String,
    pub exchange: String,
    pub side: Side,
    pub qty: u64,
    pub order_type: OrderType,
    pub product: Product,
    pub status: OrderStatus,
    pub price: Option<f64>,
    pub trigger_price: Option<f64>,
    pub avg_price: Option<f64>,
    pub filled_qty: u64,
    pub pending_qty: u64,
    pub cancelled_qty: u64,
    pub tag: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub exchange_ts: Option<DateTime<Utc>>,
}

impl Order {
    /// Construct a freshly accepted order in `PENDING`, `pending_qty == qty`
    /// (§3 "Order" lifecycle).
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        symbol: String,
        exchange: String,
        side: Side,
        qty: u64,
        order_type: OrderType,
        product: Product,
        price: Option<f64>,
        trigger_price: Option<f64>,
        tag: Option<String>,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            symbol,
            exchange,
            side,
            qty,
            order_type,
            product,
            status: OrderStatus::Pending,
            price,
            trigger_price,
            avg_price: None,
            filled_qty: 0,
            pending_qty: qty,
            cancelled_qty: 0,
            tag,
            placed_at: Utc::now(),
            exchange_ts: None,
        }
    }

    /// Whether this tag identifies a bot-originated order (`BOT_*`), which
    /// draws from `reserved` funds before `available` (§4.E).
    pub fn is_bot_order(&self) -> bool {
        self.tag.as_deref().is_some_and(|t| t.starts_with("BOT_"))
    }

    /// Fully fill the order at `fill_price` (§4.E "Fill procedure").
    pub fn apply_full_fill(&mut self, fill_price: f64, at: DateTime<Utc>) {
        self.status = OrderStatus::Complete;
        self.filled_qty = self.qty;
        self.pending_qty = 0;
        self.avg_price = Some(fill_price);
        self.exchange_ts = Some(at);
    }

    /// Transition to `OPEN` — used for LIMIT/SL orders that do not fill
    /// immediately (§3 "Order" lifecycle).
    pub fn mark_open(&mut self) {
        self.status = OrderStatus::Open;
    }

    /// Move all remaining `pending_qty` to `cancelled_qty` (§4.E "Order
    /// modification / cancellation").
    pub fn cancel(&mut self) {
        self.cancelled_qty += self.pending_qty;
        self.pending_qty = 0;
        self.status = OrderStatus::Cancelled;
    }

    pub fn is_modifiable(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Open)
    }

    /// `filled_qty + pending_qty + cancelled_qty == qty` (§8 invariant).
    pub fn quantities_balanced(&self) -> bool {
        self.filled_qty + self.pending_qty + self.cancelled_qty == self.qty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new_pending(
            "RELIANCE".into(),
            "NSE".into(),
            Side::Buy,
            10,
            OrderType::Market,
            Product::Mis,
            None,
            None,
            Some("BOT_RELIANCE".into()),
        )
    }

    #[test]
    fn new_pending_starts_balanced() {
        let o = sample_order();
        assert!(o.quantities_balanced());
        assert_eq!(o.status, OrderStatus::Pending);
        assert_eq!(o.pending_qty, 10);
    }

    #[test]
    fn is_bot_order_detects_tag_prefix() {
        let o = sample_order();
        assert!(o.is_bot_order());
        let mut untagged = sample_order();
        untagged.tag = Some("manual".into());
        assert!(!untagged.is_bot_order());
    }

    #[test]
    fn full_fill_balances_quantities_and_sets_complete() {
        let mut o = sample_order();
        o.apply_full_fill(2500.0, Utc::now());
        assert!(o.quantities_balanced());
        assert_eq!(o.status, OrderStatus::Complete);
        assert_eq!(o.filled_qty, o.qty);
        assert_eq!(o.avg_price, Some(2500.0));
    }

    #[test]
    fn cancel_moves_pending_to_cancelled() {
        let mut o = sample_order();
        o.cancel();
        assert!(o.quantities_balanced());
        assert_eq!(o.cancelled_qty, 10);
        assert_eq!(o.status, OrderStatus::Cancelled);
        assert!(!o.is_modifiable());
    }

    #[test]
    fn complete_order_is_not_modifiable() {
        let mut o = sample_order();
        o.apply_full_fill(100.0, Utc::now());
        assert!(!o.is_modifiable());
    }
}
