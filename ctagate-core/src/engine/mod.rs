//! Backtesting engine: run configuration and bar/tick replay.

pub mod backtest;
pub mod config;

pub use backtest::{BacktestEngine, ReplayResult};
pub use config::{BacktestMode, ConfigError, RunConfig};
