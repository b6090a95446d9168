//! Serializable run configuration for one backtest.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Interval;

/// Whether the engine replays bars or raw ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestMode {
    Bar,
    Tick,
}

/// Configuration errors caught before any replay begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("end {end} is not after start {start}")]
    EndBeforeStart {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("bar aggregation window must be >= 1")]
    ZeroWindow,
    #[error("no strategy attached")]
    NoStrategy,
    #[error("engine not configured; call set_parameters first")]
    NotConfigured,
}

/// The full set of fixed parameters for one backtest run.
///
/// Immutable for the duration of an optimization sweep; each worker gets
/// its own clone. Every field of the base engine's parameter set is kept
/// as-is, with `window` appended for strategy construction — the engine
/// itself replays raw bars and never looks at `window`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub symbol: String,
    pub interval: Interval,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Commission rate per unit of turnover.
    pub rate: f64,
    /// Slippage in price units per contract per fill.
    pub slippage: f64,
    /// Contract multiplier.
    pub size: f64,
    /// Minimum price increment.
    pub pricetick: f64,
    pub capital: f64,
    #[serde(default = "default_mode")]
    pub mode: BacktestMode,
    /// Inverse contract: PnL accrues in the base currency (1/price terms).
    #[serde(default)]
    pub inverse: bool,
    /// Annualized risk-free rate used by the Sharpe calculation.
    #[serde(default)]
    pub risk_free: f64,
    /// Trading days per year for annualization.
    #[serde(default = "default_annual_days")]
    pub annual_days: u32,
    /// Bar aggregation window, threaded into strategy construction.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_mode() -> BacktestMode {
    BacktestMode::Bar
}

fn default_annual_days() -> u32 {
    240
}

fn default_window() -> usize {
    1
}

impl RunConfig {
    /// Check the consistency invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.end <= self.start {
            return Err(ConfigError::EndBeforeStart {
                start: self.start,
                end: self.end,
            });
        }
        for (field, value) in [
            ("capital", self.capital),
            ("size", self.size),
            ("pricetick", self.pricetick),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in [("rate", self.rate), ("slippage", self.slippage)] {
            if value < 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }

    /// Deterministic content hash of this configuration.
    ///
    /// Two runs with identical configs share a run id, which makes sweep
    /// output attributable and reproducible.
    pub fn run_id(&self) -> String {
        // RunConfig has no non-serializable fields; this cannot fail.
        let json = serde_json::to_string(self).expect("RunConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
