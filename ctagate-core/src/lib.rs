//! ctagate core — engine, domain types, strategy host, filter overlay.
//!
//! This crate contains the backtesting side of the system:
//! - Domain types (bars, ticks, orders, stop orders, trades)
//! - The filter overlay protocol (`Filter` trait + `ToggleSet`)
//! - The strategy composition shim (`Strategy` trait, `StrategyHost`,
//!   `TradeCtx` with toggle-gated order primitives)
//! - Bar aggregation (`BarGenerator`)
//! - The bar/tick replay engine (`BacktestEngine`) and its `RunConfig`
//! - Market data feeds (in-memory and CSV)

pub mod data;
pub mod domain;
pub mod engine;
pub mod strategy;

pub use data::{CsvFeed, FeedError, MarketDataFeed, MemoryFeed};
pub use domain::{Bar, Direction, Interval, Offset, Order, OrderId, OrderRef, OrderStatus, StopOrder, StopOrderId, StopOrderStatus, Tick, Trade};
pub use engine::{BacktestEngine, BacktestMode, ConfigError, ReplayResult, RunConfig};
pub use strategy::{Action, BarGenerator, Filter, NoOpFilter, Strategy, StrategyHost, ToggleSet, TradeCtx};
