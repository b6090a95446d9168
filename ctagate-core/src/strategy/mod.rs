//! Strategy composition — toggles, the filter overlay, bar aggregation,
//! and the host that wires them together.

pub mod bargen;
pub mod examples;
pub mod filter;
pub mod host;
pub mod toggles;

pub use bargen::BarGenerator;
pub use filter::{Filter, NoOpFilter};
pub use host::{Strategy, StrategyHost, TradeCtx};
pub use toggles::{Action, ToggleSet};
