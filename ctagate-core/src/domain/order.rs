//! Orders, stop orders, and trades, with their direction/offset semantics.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Semantic direction of an order: long or short exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

/// Whether an order opens a new position or closes an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offset {
    Open,
    Close,
}

/// Monotonically increasing limit-order identifier, unique within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order-{}", self.0)
    }
}

/// Stop orders live in their own id space — they are engine-local constructs
/// until triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StopOrderId(pub u64);

impl std::fmt::Display for StopOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stop-{}", self.0)
    }
}

/// Reference returned by the order-submission primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRef {
    Limit(OrderId),
    Stop(StopOrderId),
}

/// Limit order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
}

/// A limit order resting in the engine's book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub traded: f64,
    pub status: OrderStatus,
    pub datetime: NaiveDateTime,
}

impl Order {
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }
}

/// Stop order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopOrderStatus {
    Waiting,
    Triggered,
    Cancelled,
}

/// A stop order waiting for its trigger price to trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopOrder {
    pub id: StopOrderId,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub status: StopOrderStatus,
    pub datetime: NaiveDateTime,
}

/// A fill produced by crossing an order against a bar or tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub symbol: String,
    pub direction: Direction,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub datetime: NaiveDateTime,
}

impl Trade {
    /// Signed position delta this fill applies: long adds, short subtracts.
    pub fn position_change(&self) -> f64 {
        match self.direction {
            Direction::Long => self.volume,
            Direction::Short => -self.volume,
        }
    }
}
