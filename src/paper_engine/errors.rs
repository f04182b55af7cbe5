// =============================================================================
// Paper Engine error taxonomy (§7)
// =============================================================================
//
// The source raises exceptions for fund/risk checks and catches them at the
// bot; here they become explicit result values per §9's
// `PlaceOrderResult = Ok{order_id} | Err{ValidationKind, message}` decision.
// Grounded on `risk.rs`'s plain-string error returns, formalized into a
// `thiserror` enum the way `barter-rs-barter-rs` and `BurnOutTrader-fund-forge`
// structure their domain errors (see DESIGN.md).
// =============================================================================

use thiserror::Error;

/// Which specific rule rejected an order (§7 "Risk-limit breach").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskRule {
    MaxLossPerDay,
    MaxTradesPerDay,
    MaxPositions,
}

impl std::fmt::Display for RiskRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskRule::MaxLossPerDay => write!(f, "max_loss_per_day"),
            RiskRule::MaxTradesPerDay => write!(f, "max_trades_per_day"),
            RiskRule::MaxPositions => write!(f, "max_positions"),
        }
    }
}

/// Every way a Paper Engine operation can fail without panicking (§7).
#[derive(Debug, Error)]
pub enum PaperEngineError {
    /// Attempted a paper-mode operation while the process is configured for
    /// live execution, or vice versa (§4.E "safety guard").
    #[error("safety guard violation: paper engine refuses to operate outside paper mode")]
    SafetyGuardViolation,

    /// One of the three risk limits in §4.E was breached.
    #[error("risk limit breached: {0}")]
    RiskLimitBreach(RiskRule),

    /// Estimated order cost exceeds available (+ reserved, for BOT_* tags)
    /// funds (§4.E "funds check").
    #[error("insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    /// `qty == 0`, negative price, or other locally-rejectable validation
    /// failure (§7 "Validation").
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("order {0} not found")]
    OrderNotFound(String),

    /// Modify/cancel attempted on an order outside `{PENDING, OPEN}` (§4.E
    /// "Order modification / cancellation").
    #[error("order {0} is not modifiable in its current state")]
    NotModifiable(String),

    /// Fill could not determine a price: no cached LTP, no price hint, and no
    /// upstream oracle reachable (§4.E "Fill procedure").
    #[error("no price available to fill order for {0}")]
    NoFillPrice(String),

    #[error("allocation failed: requested {requested:.2}, available {available:.2}")]
    AllocationFailed { requested: f64, available: f64 },
}

pub type PaperEngineResult<T> = Result<T, PaperEngineError>;
