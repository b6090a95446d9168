//! Bar/tick replay engine.
//!
//! One engine instance runs exactly one backtest: configure, attach a
//! strategy (and optionally a filter), load data, replay. Orders submitted
//! during an event cross against the *next* bar or tick, so strategies
//! never trade on information from the bar that produced the signal.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::data::{FeedError, MarketDataFeed};
use crate::domain::{
    Bar, Direction, Order, OrderId, OrderStatus, StopOrder, StopOrderId, StopOrderStatus, Tick,
    Trade,
};
use crate::engine::config::{BacktestMode, ConfigError, RunConfig};
use crate::strategy::filter::Filter;
use crate::strategy::host::{Strategy, StrategyHost};

/// Everything a completed replay produced. Statistics are computed from
/// this by the runner crate.
#[derive(Debug, Clone, Default)]
pub struct ReplayResult {
    /// Equity marked at every processed bar (or tick) close.
    pub equity_curve: Vec<(NaiveDateTime, f64)>,
    pub trades: Vec<Trade>,
    pub bar_count: usize,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub end_balance: f64,
}

/// The backtesting engine collaborator.
pub struct BacktestEngine {
    config: Option<RunConfig>,
    host: Option<StrategyHost>,
    bars: Vec<Bar>,
    ticks: Vec<Tick>,
    active_orders: BTreeMap<OrderId, Order>,
    active_stops: BTreeMap<StopOrderId, StopOrder>,
    trades: Vec<Trade>,
    trade_seq: u64,
    pos: f64,
    /// Signed sum of fill cash flows, before the contract multiplier.
    cash_flow: f64,
    commission: f64,
    slippage_cost: f64,
    equity_curve: Vec<(NaiveDateTime, f64)>,
}

impl Default for BacktestEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BacktestEngine {
    pub fn new() -> Self {
        Self {
            config: None,
            host: None,
            bars: Vec::new(),
            ticks: Vec::new(),
            active_orders: BTreeMap::new(),
            active_stops: BTreeMap::new(),
            trades: Vec::new(),
            trade_seq: 0,
            pos: 0.0,
            cash_flow: 0.0,
            commission: 0.0,
            slippage_cost: 0.0,
            equity_curve: Vec::new(),
        }
    }

    /// Validate and store the run parameters. Must be called before
    /// `attach_strategy`, since the bar aggregation window and interval are
    /// strategy-construction-time arguments.
    pub fn set_parameters(&mut self, config: &RunConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = Some(config.clone());
        Ok(())
    }

    /// Build the strategy host from the configured window and interval.
    pub fn attach_strategy(&mut self, strategy: Box<dyn Strategy>) -> Result<(), ConfigError> {
        let config = self.config.as_ref().ok_or(ConfigError::NotConfigured)?;
        self.host = Some(StrategyHost::new(
            strategy,
            config.symbol.clone(),
            config.window,
            config.interval,
        ));
        Ok(())
    }

    /// Attach a gating filter to the already-attached strategy.
    pub fn attach_filter(&mut self, filter: Box<dyn Filter>) -> Result<(), ConfigError> {
        let host = self.host.as_mut().ok_or(ConfigError::NoStrategy)?;
        host.attach_filter(filter);
        Ok(())
    }

    /// Load history for the configured instrument, interval, and range.
    pub fn load_data(&mut self, feed: &dyn MarketDataFeed) -> Result<(), FeedError> {
        let config = self.config.as_ref().ok_or(FeedError::NotConfigured)?;
        match config.mode {
            BacktestMode::Bar => {
                self.bars =
                    feed.load_bars(&config.symbol, config.interval, config.start, config.end)?;
            }
            BacktestMode::Tick => {
                self.ticks = feed.load_ticks(&config.symbol, config.start, config.end)?;
            }
        }
        Ok(())
    }

    /// Replay the loaded history through the strategy and return the run's
    /// raw output. Consumes the loaded data; the engine is one-shot.
    pub fn run_backtesting(&mut self) -> Result<ReplayResult, ConfigError> {
        let config = self.config.clone().ok_or(ConfigError::NotConfigured)?;
        if self.host.is_none() {
            return Err(ConfigError::NoStrategy);
        }

        self.with_host(&config, |host| host.handle_init());
        self.with_host(&config, |host| host.handle_start());

        match config.mode {
            BacktestMode::Bar => {
                let bars = std::mem::take(&mut self.bars);
                for bar in &bars {
                    self.new_bar(bar, &config);
                }
            }
            BacktestMode::Tick => {
                let ticks = std::mem::take(&mut self.ticks);
                for tick in &ticks {
                    self.new_tick(tick, &config);
                }
            }
        }

        self.with_host(&config, |host| host.handle_stop());

        let end_balance = self
            .equity_curve
            .last()
            .map(|&(_, equity)| equity)
            .unwrap_or(config.capital);
        let bar_count = self.equity_curve.len();

        Ok(ReplayResult {
            equity_curve: std::mem::take(&mut self.equity_curve),
            trades: std::mem::take(&mut self.trades),
            bar_count,
            total_commission: self.commission,
            total_slippage: self.slippage_cost,
            end_balance,
        })
    }

    fn new_bar(&mut self, bar: &Bar, config: &RunConfig) {
        self.cross_limit_orders(bar.low, bar.high, bar.open, bar.datetime, config);
        self.cross_stop_orders(bar.low, bar.high, bar.open, bar.datetime, config);
        self.with_host(config, |host| host.handle_bar(bar));
        self.mark_equity(bar.datetime, bar.close, config);
    }

    fn new_tick(&mut self, tick: &Tick, config: &RunConfig) {
        // With a single traded price, the fill price collapses to the tick.
        let price = tick.last_price;
        self.cross_limit_orders(price, price, price, tick.datetime, config);
        self.cross_stop_orders(price, price, price, tick.datetime, config);
        self.with_host(config, |host| host.handle_tick(tick));
        self.mark_equity(tick.datetime, price, config);
    }

    /// Cross resting limit orders against the current price range.
    ///
    /// A long order crosses when the range traded at or below its price and
    /// fills at the better of its limit and the open; symmetrically for
    /// shorts.
    fn cross_limit_orders(
        &mut self,
        low: f64,
        high: f64,
        open: f64,
        datetime: NaiveDateTime,
        config: &RunConfig,
    ) {
        let ids: Vec<OrderId> = self.active_orders.keys().copied().collect();
        for id in ids {
            let Some(mut order) = self.active_orders.remove(&id) else {
                continue;
            };

            let fill_price = match order.direction {
                Direction::Long if order.price >= low => Some(order.price.min(open)),
                Direction::Short if order.price <= high => Some(order.price.max(open)),
                _ => None,
            };

            match fill_price {
                Some(price) => {
                    order.traded = order.volume;
                    order.status = OrderStatus::Filled;
                    self.with_host(config, |host| host.handle_order(&order));
                    self.apply_fill(order.direction, order.offset, price, order.volume, datetime, config);
                }
                None => {
                    self.active_orders.insert(id, order);
                }
            }
        }
    }

    /// Cross waiting stop orders: a long stop triggers once the range trades
    /// at or above its price, a short stop at or below.
    fn cross_stop_orders(
        &mut self,
        low: f64,
        high: f64,
        open: f64,
        datetime: NaiveDateTime,
        config: &RunConfig,
    ) {
        let ids: Vec<StopOrderId> = self.active_stops.keys().copied().collect();
        for id in ids {
            let Some(mut stop) = self.active_stops.remove(&id) else {
                continue;
            };

            let fill_price = match stop.direction {
                Direction::Long if high >= stop.price => Some(stop.price.max(open)),
                Direction::Short if low <= stop.price => Some(stop.price.min(open)),
                _ => None,
            };

            match fill_price {
                Some(price) => {
                    stop.status = StopOrderStatus::Triggered;
                    self.with_host(config, |host| host.handle_stop_order(&stop));
                    self.apply_fill(stop.direction, stop.offset, price, stop.volume, datetime, config);
                }
                None => {
                    self.active_stops.insert(id, stop);
                }
            }
        }
    }

    fn apply_fill(
        &mut self,
        direction: Direction,
        offset: crate::domain::Offset,
        price: f64,
        volume: f64,
        datetime: NaiveDateTime,
        config: &RunConfig,
    ) {
        self.trade_seq += 1;
        let trade = Trade {
            id: self.trade_seq,
            symbol: config.symbol.clone(),
            direction,
            offset,
            price,
            volume,
            datetime,
        };

        self.cash_flow += fill_flow(direction, price, volume, config.inverse);
        self.pos += trade.position_change();
        self.commission += turnover(price, volume, config) * config.rate;
        self.slippage_cost += volume * config.size * config.slippage;

        let pos = self.pos;
        self.with_host(config, |host| {
            host.set_pos(pos);
            host.handle_trade(&trade);
        });
        self.trades.push(trade);
    }

    /// Move orders created during the last event into the books, rounding
    /// prices to the configured tick.
    fn collect_new_orders(&mut self, config: &RunConfig) {
        let host = match self.host.as_mut() {
            Some(host) => host,
            None => return,
        };
        let (orders, stops) = host.take_orders();
        for mut order in orders {
            order.price = round_to(order.price, config.pricetick);
            self.active_orders.insert(order.id, order);
        }
        for mut stop in stops {
            stop.price = round_to(stop.price, config.pricetick);
            self.active_stops.insert(stop.id, stop);
        }
    }

    fn mark_equity(&mut self, datetime: NaiveDateTime, close: f64, config: &RunConfig) {
        let mark = if config.inverse {
            -self.pos / close
        } else {
            self.pos * close
        };
        let equity = config.capital + (self.cash_flow + mark) * config.size
            - self.commission
            - self.slippage_cost;
        self.equity_curve.push((datetime, equity));
    }

    /// Run a closure against the host, then collect any orders the
    /// dispatched hooks created.
    fn with_host<F: FnOnce(&mut StrategyHost)>(&mut self, config: &RunConfig, f: F) {
        if let Some(host) = self.host.as_mut() {
            f(host);
        }
        self.collect_new_orders(config);
    }
}

/// Signed cash flow of one fill, before the contract multiplier.
///
/// Inverse contracts accrue PnL in the base currency, so flows and marks
/// use 1/price terms with flipped signs.
fn fill_flow(direction: Direction, price: f64, volume: f64, inverse: bool) -> f64 {
    match (inverse, direction) {
        (false, Direction::Long) => -volume * price,
        (false, Direction::Short) => volume * price,
        (true, Direction::Long) => volume / price,
        (true, Direction::Short) => -volume / price,
    }
}

/// Turnover of one fill in settlement-currency terms.
fn turnover(price: f64, volume: f64, config: &RunConfig) -> f64 {
    if config.inverse {
        volume * config.size / price
    } else {
        volume * config.size * price
    }
}

fn round_to(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return value;
    }
    (value / target).round() * target
}
