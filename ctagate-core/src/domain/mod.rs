//! Domain types shared by the engine, strategies, and the runner.

pub mod bar;
pub mod order;

pub use bar::{Bar, Interval, Tick};
pub use order::{
    Direction, Offset, Order, OrderId, OrderRef, OrderStatus, StopOrder, StopOrderId,
    StopOrderStatus, Trade,
};
