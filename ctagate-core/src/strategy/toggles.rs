//! Four independent action permissions shared by a strategy and its filter.

use serde::{Deserialize, Serialize};

/// The four directional actions a strategy can take.
///
/// Each maps to a fixed (direction, offset) pair:
/// buy = long/open, sell = short/close, short = short/open, cover = long/close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
    Short,
    Cover,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Buy, Action::Sell, Action::Short, Action::Cover];
}

/// Per-action permission flags, all permitted by default.
///
/// The set is owned by the strategy host; filter hooks receive a mutable
/// reference to this same value, never a copy. A false flag makes the
/// matching order primitive a silent no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleSet {
    buy: bool,
    sell: bool,
    short: bool,
    cover: bool,
}

impl Default for ToggleSet {
    fn default() -> Self {
        Self {
            buy: true,
            sell: true,
            short: true,
            cover: true,
        }
    }
}

impl ToggleSet {
    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::Buy => self.buy,
            Action::Sell => self.sell,
            Action::Short => self.short,
            Action::Cover => self.cover,
        }
    }

    pub fn set(&mut self, action: Action, permitted: bool) {
        match action {
            Action::Buy => self.buy = permitted,
            Action::Sell => self.sell = permitted,
            Action::Short => self.short = permitted,
            Action::Cover => self.cover = permitted,
        }
    }

    /// Permit or veto both position-opening actions (buy and short) at once.
    pub fn set_opens(&mut self, permitted: bool) {
        self.buy = permitted;
        self.short = permitted;
    }

    /// Permit or veto both position-closing actions (sell and cover) at once.
    pub fn set_closes(&mut self, permitted: bool) {
        self.sell = permitted;
        self.cover = permitted;
    }

    /// Restore the default all-permitted state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
