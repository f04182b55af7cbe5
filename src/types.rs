// =============================================================================
// Shared types used across the trading engine core
// =============================================================================

use serde::{Deserialize, Serialize};

/// Buy or sell side of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that flattens a position opened on `self`.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type. `Sl` and `SlM` are stop-loss (limit and market trigger) orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Sl,
    SlM,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
            OrderType::Sl => write!(f, "SL"),
            OrderType::SlM => write!(f, "SL-M"),
        }
    }
}

/// Product type — intraday margin, delivery, or normal carry-forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Product {
    Mis,
    Cnc,
    Nrml,
}

impl Default for Product {
    fn default() -> Self {
        Self::Mis
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Product::Mis => write!(f, "MIS"),
            Product::Cnc => write!(f, "CNC"),
            Product::Nrml => write!(f, "NRML"),
        }
    }
}

impl std::str::FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MIS" => Ok(Product::Mis),
            "CNC" => Ok(Product::Cnc),
            "NRML" => Ok(Product::Nrml),
            other => Err(format!("unknown product type: {other}")),
        }
    }
}

/// Order lifecycle state. `PENDING` and `OPEN` are the only mutable states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    Complete,
    Cancelled,
    Rejected,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Open => write!(f, "OPEN"),
            OrderStatus::Complete => write!(f, "COMPLETE"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Whether the engine is configured for simulated or real-money execution.
/// The paper engine refuses to operate outside `Paper` mode (safety guard,
/// see `paper_engine::errors::PaperEngineError::SafetyGuardViolation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Paper
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMode::Paper => write!(f, "Paper"),
            ExecutionMode::Live => write!(f, "Live"),
        }
    }
}

/// Trading bot lifecycle state (§4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Error,
}

impl Default for BotState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotState::Stopped => write!(f, "STOPPED"),
            BotState::Starting => write!(f, "STARTING"),
            BotState::Running => write!(f, "RUNNING"),
            BotState::Paused => write!(f, "PAUSED"),
            BotState::Stopping => write!(f, "STOPPING"),
            BotState::Error => write!(f, "ERROR"),
        }
    }
}

/// Opaque per-user identifier for multi-user paper-trading isolation
/// (§3, supplemented from `multi_user_paper_trading.py`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert_eq!(Side::Buy.opposite().opposite(), Side::Buy);
    }

    #[test]
    fn product_from_str_accepts_lowercase() {
        assert_eq!("mis".parse::<Product>().unwrap(), Product::Mis);
        assert_eq!("CNC".parse::<Product>().unwrap(), Product::Cnc);
        assert!("XYZ".parse::<Product>().is_err());
    }

    #[test]
    fn display_formats_match_wire_strings() {
        assert_eq!(Side::Buy.to_string(), "BUY");
        assert_eq!(OrderType::SlM.to_string(), "SL-M");
        assert_eq!(OrderStatus::Complete.to_string(), "COMPLETE");
        assert_eq!(Product::Nrml.to_string(), "NRML");
    }
}
