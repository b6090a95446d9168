//! Performance metrics — pure functions that compute backtest statistics.
//!
//! Every metric is a pure function: daily equity points and/or round trips
//! in, scalar out. No dependencies on the optimizer or the engine beyond
//! the replay output types.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use ctagate_core::domain::{Direction, Offset, Trade};
use ctagate_core::engine::{ReplayResult, RunConfig};

/// Aggregate performance metrics for a single backtest run.
///
/// `win_rate` and `profit_factor` are only defined when the run produced
/// the round trips they need; `to_map` omits the keys entirely when they
/// are `None`, so a metric lookup against them fails loudly instead of
/// reporting a silent 0.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub end_balance: f64,
    pub total_return: f64,
    pub annual_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub return_drawdown_ratio: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub daily_count: usize,
    pub trade_count: usize,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
}

impl PerformanceMetrics {
    /// Compute all metrics from a replay result.
    pub fn compute(result: &ReplayResult, config: &RunConfig) -> Self {
        let daily = daily_equity(&result.equity_curve);
        let equity: Vec<f64> = daily.iter().map(|(_, eq)| *eq).collect();
        let round_trips = pair_round_trips(&result.trades, config.size);

        Self {
            end_balance: result.end_balance,
            total_return: total_return(&equity, config.capital),
            annual_return: annual_return(&equity, config.capital, config.annual_days),
            sharpe: sharpe_ratio(&equity, config.risk_free, config.annual_days),
            max_drawdown: max_drawdown(&equity),
            return_drawdown_ratio: return_drawdown_ratio(&equity, config.capital),
            total_commission: result.total_commission,
            total_slippage: result.total_slippage,
            daily_count: daily.len(),
            trade_count: result.trades.len(),
            win_rate: win_rate(&round_trips),
            profit_factor: profit_factor(&round_trips),
        }
    }

    /// Flatten into a name → value map for target-metric lookup.
    ///
    /// Undefined metrics are absent, not zero.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("end_balance".to_string(), self.end_balance);
        map.insert("total_return".to_string(), self.total_return);
        map.insert("annual_return".to_string(), self.annual_return);
        map.insert("sharpe".to_string(), self.sharpe);
        map.insert("max_drawdown".to_string(), self.max_drawdown);
        map.insert(
            "return_drawdown_ratio".to_string(),
            self.return_drawdown_ratio,
        );
        map.insert("total_commission".to_string(), self.total_commission);
        map.insert("total_slippage".to_string(), self.total_slippage);
        map.insert("daily_count".to_string(), self.daily_count as f64);
        map.insert("trade_count".to_string(), self.trade_count as f64);
        if let Some(wr) = self.win_rate {
            map.insert("win_rate".to_string(), wr);
        }
        if let Some(pf) = self.profit_factor {
            map.insert("profit_factor".to_string(), pf);
        }
        map
    }
}

/// One completed open/close cycle, paired FIFO from the fill stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub direction: Direction,
    pub open_price: f64,
    pub close_price: f64,
    pub volume: f64,
    pub pnl: f64,
}

// ─── Individual metric functions ────────────────────────────────────

/// Collapse an intrabar equity curve to one point per calendar day (the
/// last mark of each day), preserving order.
pub fn daily_equity(curve: &[(chrono::NaiveDateTime, f64)]) -> Vec<(NaiveDate, f64)> {
    let mut daily: Vec<(NaiveDate, f64)> = Vec::new();
    for (dt, eq) in curve {
        let date = dt.date();
        match daily.last_mut() {
            Some((last_date, last_eq)) if *last_date == date => *last_eq = *eq,
            _ => daily.push((date, *eq)),
        }
    }
    daily
}

/// Total return as a fraction of starting capital.
pub fn total_return(equity: &[f64], capital: f64) -> f64 {
    if equity.is_empty() || capital <= 0.0 {
        return 0.0;
    }
    (equity[equity.len() - 1] - capital) / capital
}

/// Annualized return: total return scaled by annual_days / daily points.
pub fn annual_return(equity: &[f64], capital: f64, annual_days: u32) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }
    total_return(equity, capital) / equity.len() as f64 * annual_days as f64
}

/// Annualized Sharpe ratio from daily returns.
///
/// Sharpe = mean(daily returns - daily rf) / std * sqrt(annual_days).
/// Returns 0.0 if variance is zero or fewer than 2 daily points.
pub fn sharpe_ratio(equity: &[f64], risk_free: f64, annual_days: u32) -> f64 {
    let returns = daily_returns(equity);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free / annual_days as f64;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let mean = mean_f64(&excess);
    let std = std_dev(&excess);
    if std < 1e-15 {
        return 0.0;
    }
    (mean / std) * (annual_days as f64).sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(equity: &[f64]) -> f64 {
    if equity.len() < 2 {
        return 0.0;
    }
    let mut peak = equity[0];
    let mut max_dd = 0.0_f64;
    for &eq in equity {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            let dd = (eq - peak) / peak;
            if dd < max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// Total return / |max drawdown|. Returns 0.0 when there is no drawdown.
pub fn return_drawdown_ratio(equity: &[f64], capital: f64) -> f64 {
    let dd = max_drawdown(equity);
    if dd >= 0.0 {
        return 0.0;
    }
    total_return(equity, capital) / dd.abs()
}

/// Win rate over round trips. Undefined without round trips.
pub fn win_rate(round_trips: &[RoundTrip]) -> Option<f64> {
    if round_trips.is_empty() {
        return None;
    }
    let winners = round_trips.iter().filter(|rt| rt.pnl > 0.0).count();
    Some(winners as f64 / round_trips.len() as f64)
}

/// Profit factor: gross profits / gross losses over round trips.
///
/// Undefined unless at least one round trip lost money; an all-winner run
/// has no denominator, and reporting a cap would invent a value.
pub fn profit_factor(round_trips: &[RoundTrip]) -> Option<f64> {
    let gross_profit: f64 = round_trips
        .iter()
        .filter(|rt| rt.pnl > 0.0)
        .map(|rt| rt.pnl)
        .sum();
    let gross_loss: f64 = round_trips
        .iter()
        .filter(|rt| rt.pnl < 0.0)
        .map(|rt| rt.pnl.abs())
        .sum();
    if gross_loss < 1e-10 {
        return None;
    }
    Some(gross_profit / gross_loss)
}

/// Pair opening fills with closing fills FIFO into round trips.
///
/// A closing fill consumes open volume oldest-first; partial volumes split
/// the open across several round trips. Long round trips open with a Long
/// fill and close with a Short fill, short round trips the reverse.
pub fn pair_round_trips(trades: &[Trade], size: f64) -> Vec<RoundTrip> {
    // (direction, price, remaining volume)
    let mut open_queue: Vec<(Direction, f64, f64)> = Vec::new();
    let mut round_trips = Vec::new();

    for trade in trades {
        match trade.offset {
            Offset::Open => open_queue.push((trade.direction, trade.price, trade.volume)),
            Offset::Close => {
                let mut remaining = trade.volume;
                while remaining > 1e-12 {
                    let Some((direction, open_price, open_volume)) = open_queue.first_mut() else {
                        break;
                    };
                    let matched = remaining.min(*open_volume);
                    let pnl = match direction {
                        Direction::Long => (trade.price - *open_price) * matched * size,
                        Direction::Short => (*open_price - trade.price) * matched * size,
                    };
                    round_trips.push(RoundTrip {
                        direction: *direction,
                        open_price: *open_price,
                        close_price: trade.price,
                        volume: matched,
                        pnl,
                    });
                    remaining -= matched;
                    *open_volume -= matched;
                    if *open_volume <= 1e-12 {
                        open_queue.remove(0);
                    }
                }
            }
        }
    }
    round_trips
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Compute daily returns from a daily equity series.
pub fn daily_returns(equity: &[f64]) -> Vec<f64> {
    if equity.len() < 2 {
        return Vec::new();
    }
    equity
        .windows(2)
        .map(|w| {
            if w[0] > 0.0 {
                (w[1] - w[0]) / w[0]
            } else {
                0.0
            }
        })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
