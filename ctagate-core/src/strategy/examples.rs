//! Reference strategy and filter implementations.
//!
//! Used by the CLI's strategy registry and the integration tests; also the
//! canonical examples of how the host, toggles, and filters fit together.

use chrono::Timelike;

use crate::domain::{Bar, Tick};
use crate::strategy::filter::Filter;
use crate::strategy::host::{Strategy, TradeCtx};
use crate::strategy::toggles::ToggleSet;

/// Dual moving-average crossover strategy.
///
/// Long when the fast SMA crosses above the slow SMA, short when it crosses
/// below. Always reverses through flat: close the opposite leg first, then
/// open the new one. Orders are priced at the signal bar's close and cross
/// on the next raw bar.
#[derive(Debug, Clone)]
pub struct DualMaStrategy {
    fast_window: usize,
    slow_window: usize,
    volume: f64,
    closes: Vec<f64>,
}

impl DualMaStrategy {
    pub fn new(fast_window: usize, slow_window: usize, volume: f64) -> Self {
        Self {
            fast_window: fast_window.max(1),
            slow_window: slow_window.max(2),
            volume,
            closes: Vec::new(),
        }
    }

    fn sma(&self, window: usize, skip_last: usize) -> Option<f64> {
        let end = self.closes.len().checked_sub(skip_last)?;
        if end < window {
            return None;
        }
        let slice = &self.closes[end - window..end];
        Some(slice.iter().sum::<f64>() / window as f64)
    }

    /// Some(true) = golden cross, Some(false) = death cross.
    fn cross(&self) -> Option<bool> {
        let fast_now = self.sma(self.fast_window, 0)?;
        let slow_now = self.sma(self.slow_window, 0)?;
        let fast_prev = self.sma(self.fast_window, 1)?;
        let slow_prev = self.sma(self.slow_window, 1)?;

        if fast_prev <= slow_prev && fast_now > slow_now {
            Some(true)
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Some(false)
        } else {
            None
        }
    }
}

impl Strategy for DualMaStrategy {
    fn on_bar(&mut self, bar: &Bar, ctx: &mut TradeCtx<'_>) {
        self.closes.push(bar.close);

        match self.cross() {
            Some(true) => {
                if ctx.pos() < 0.0 {
                    ctx.cover(bar.close, ctx.pos().abs(), false);
                }
                if ctx.pos() <= 0.0 {
                    ctx.buy(bar.close, self.volume, false);
                }
            }
            Some(false) => {
                if ctx.pos() > 0.0 {
                    ctx.sell(bar.close, ctx.pos(), false);
                }
                if ctx.pos() >= 0.0 {
                    ctx.short(bar.close, self.volume, false);
                }
            }
            None => {}
        }
    }
}

/// Session filter: permits position-opening actions only inside a daily
/// time window, while closes stay permitted at all times.
///
/// Gates on the window bar's timestamp; a strategy deciding on the same
/// event already sees the updated toggles.
#[derive(Debug, Clone)]
pub struct SessionFilter {
    start_hour: u32,
    end_hour: u32,
}

impl SessionFilter {
    /// Opens are allowed when `start_hour <= hour < end_hour`.
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    fn in_session(&self, hour: u32) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

impl Filter for SessionFilter {
    fn on_bar(&mut self, bar: &Bar, toggles: &mut ToggleSet) {
        toggles.set_opens(self.in_session(bar.datetime.hour()));
    }

    fn on_tick(&mut self, tick: &Tick, toggles: &mut ToggleSet) {
        toggles.set_opens(self.in_session(tick.datetime.hour()));
    }
}
