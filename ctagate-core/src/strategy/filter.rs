//! Filter overlay — gates strategy actions by flipping toggles on events.
//!
//! A filter is bound to exactly one strategy host and sees every event
//! before the strategy's own handler runs, on the same thread. Hooks read
//! and write the host's `ToggleSet` directly; there is no buffering or
//! deferred application. A filter that overrides nothing is behaviorally
//! transparent.

use crate::domain::{Bar, Order, StopOrder, Tick, Trade};
use crate::strategy::toggles::ToggleSet;

/// Event hooks a gating overlay can implement.
///
/// Every hook has a no-op default body, so implementations only override
/// the events they care about. The trait bound itself is the capability
/// check: anything accepted by `StrategyHost::attach_filter` satisfies the
/// full hook set at compile time.
///
/// Layered gating logic composes inside a single implementation — a host
/// holds at most one filter.
pub trait Filter: Send {
    fn on_start(&mut self, _toggles: &mut ToggleSet) {}

    fn on_bar(&mut self, _bar: &Bar, _toggles: &mut ToggleSet) {}

    fn on_tick(&mut self, _tick: &Tick, _toggles: &mut ToggleSet) {}

    fn on_order(&mut self, _order: &Order, _toggles: &mut ToggleSet) {}

    fn on_trade(&mut self, _trade: &Trade, _toggles: &mut ToggleSet) {}

    fn on_stop_order(&mut self, _stop: &StopOrder, _toggles: &mut ToggleSet) {}
}

/// Transparent filter: overrides no hooks, leaves every toggle permitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpFilter;

impl Filter for NoOpFilter {}
