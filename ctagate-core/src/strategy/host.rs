//! Strategy host — the composition shim between engine, filter, and strategy.
//!
//! The host owns the toggle state, the optional filter, and the bar
//! aggregator. For every event it (1) runs framework bookkeeping (bar
//! aggregation), (2) invokes the filter's hook if one is attached, then
//! (3) invokes the strategy's own hook. That ordering is a firm contract:
//! a filter always sees an event before the strategy reacts to it, so it
//! can veto a toggle within the same event.

use chrono::NaiveDateTime;

use crate::domain::{
    Bar, Direction, Interval, Offset, Order, OrderId, OrderRef, OrderStatus, StopOrder,
    StopOrderId, StopOrderStatus, Tick, Trade,
};
use crate::strategy::bargen::BarGenerator;
use crate::strategy::filter::Filter;
use crate::strategy::toggles::{Action, ToggleSet};

/// Author-facing strategy hooks.
///
/// Hook names are distinct from the host's `handle_*` dispatch methods, so
/// framework bookkeeping can never be shadowed by a strategy override.
/// All hooks default to no-ops; strategies implement only what they use
/// and act through the [`TradeCtx`] order primitives.
pub trait Strategy: Send {
    fn on_init(&mut self) {}

    fn on_start(&mut self, _ctx: &mut TradeCtx<'_>) {}

    fn on_stop(&mut self) {}

    /// Called with aggregated window bars, not raw minute bars.
    fn on_bar(&mut self, _bar: &Bar, _ctx: &mut TradeCtx<'_>) {}

    fn on_tick(&mut self, _tick: &Tick, _ctx: &mut TradeCtx<'_>) {}

    fn on_trade(&mut self, _trade: &Trade, _ctx: &mut TradeCtx<'_>) {}

    fn on_order(&mut self, _order: &Order, _ctx: &mut TradeCtx<'_>) {}

    fn on_stop_order(&mut self, _stop: &StopOrder, _ctx: &mut TradeCtx<'_>) {}
}

/// Orders created by strategy hooks, waiting for the engine to collect them.
#[derive(Debug, Default)]
struct PendingOrders {
    new_orders: Vec<Order>,
    new_stops: Vec<StopOrder>,
    order_seq: u64,
    stop_seq: u64,
}

/// Per-event view handed to strategy hooks: current position, the shared
/// toggle state, and the four order-submission primitives.
pub struct TradeCtx<'a> {
    toggles: &'a mut ToggleSet,
    pending: &'a mut PendingOrders,
    symbol: &'a str,
    now: NaiveDateTime,
    pos: f64,
}

impl TradeCtx<'_> {
    /// Net position in contracts (long positive, short negative).
    pub fn pos(&self) -> f64 {
        self.pos
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    /// The host's toggle state. Strategies normally only read it; writing
    /// is the filter's job, but the state is shared by design.
    pub fn toggles(&mut self) -> &mut ToggleSet {
        self.toggles
    }

    /// Send a buy order (long/open). `stop` makes it a stop order.
    pub fn buy(&mut self, price: f64, volume: f64, stop: bool) -> Option<OrderRef> {
        self.send(Action::Buy, Direction::Long, Offset::Open, price, volume, stop)
    }

    /// Send a sell order to close a long position (short/close).
    pub fn sell(&mut self, price: f64, volume: f64, stop: bool) -> Option<OrderRef> {
        self.send(Action::Sell, Direction::Short, Offset::Close, price, volume, stop)
    }

    /// Send a short order to open a short position (short/open).
    pub fn short(&mut self, price: f64, volume: f64, stop: bool) -> Option<OrderRef> {
        self.send(Action::Short, Direction::Short, Offset::Open, price, volume, stop)
    }

    /// Send a cover order to close a short position (long/close).
    pub fn cover(&mut self, price: f64, volume: f64, stop: bool) -> Option<OrderRef> {
        self.send(Action::Cover, Direction::Long, Offset::Close, price, volume, stop)
    }

    /// Toggle check happens here, immediately before the order is built.
    /// A vetoed call creates nothing and returns `None`.
    fn send(
        &mut self,
        action: Action,
        direction: Direction,
        offset: Offset,
        price: f64,
        volume: f64,
        stop: bool,
    ) -> Option<OrderRef> {
        if !self.toggles.permits(action) {
            return None;
        }

        if stop {
            self.pending.stop_seq += 1;
            let id = StopOrderId(self.pending.stop_seq);
            self.pending.new_stops.push(StopOrder {
                id,
                symbol: self.symbol.to_string(),
                direction,
                offset,
                price,
                volume,
                status: StopOrderStatus::Waiting,
                datetime: self.now,
            });
            Some(OrderRef::Stop(id))
        } else {
            self.pending.order_seq += 1;
            let id = OrderId(self.pending.order_seq);
            self.pending.new_orders.push(Order {
                id,
                symbol: self.symbol.to_string(),
                direction,
                offset,
                price,
                volume,
                traded: 0.0,
                status: OrderStatus::Active,
                datetime: self.now,
            });
            Some(OrderRef::Limit(id))
        }
    }
}

/// Wires one strategy, at most one filter, the shared toggles, and the bar
/// aggregator into a single event-driven unit.
pub struct StrategyHost {
    strategy: Box<dyn Strategy>,
    filter: Option<Box<dyn Filter>>,
    toggles: ToggleSet,
    bargen: BarGenerator,
    pending: PendingOrders,
    symbol: String,
    now: NaiveDateTime,
    pos: f64,
}

impl StrategyHost {
    pub fn new(
        strategy: Box<dyn Strategy>,
        symbol: impl Into<String>,
        window: usize,
        interval: Interval,
    ) -> Self {
        Self {
            strategy,
            filter: None,
            toggles: ToggleSet::default(),
            bargen: BarGenerator::new(window, interval),
            pending: PendingOrders::default(),
            symbol: symbol.into(),
            now: NaiveDateTime::UNIX_EPOCH,
            pos: 0.0,
        }
    }

    /// Attach the gating overlay. The trait bound is the capability check;
    /// replacing an existing filter is allowed before the run starts.
    pub fn attach_filter(&mut self, filter: Box<dyn Filter>) {
        self.filter = Some(filter);
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn toggles(&self) -> &ToggleSet {
        &self.toggles
    }

    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// Engine-side: keep the host's position in sync after fills.
    pub fn set_pos(&mut self, pos: f64) {
        self.pos = pos;
    }

    /// Engine-side: drain orders created during the last dispatched event.
    pub fn take_orders(&mut self) -> (Vec<Order>, Vec<StopOrder>) {
        (
            std::mem::take(&mut self.pending.new_orders),
            std::mem::take(&mut self.pending.new_stops),
        )
    }

    pub fn handle_init(&mut self) {
        self.strategy.on_init();
    }

    pub fn handle_start(&mut self) {
        if let Some(filter) = self.filter.as_mut() {
            filter.on_start(&mut self.toggles);
        }
        let mut ctx = TradeCtx {
            toggles: &mut self.toggles,
            pending: &mut self.pending,
            symbol: &self.symbol,
            now: self.now,
            pos: self.pos,
        };
        self.strategy.on_start(&mut ctx);
    }

    pub fn handle_stop(&mut self) {
        self.strategy.on_stop();
    }

    /// Raw bar update: aggregate first, then (on a completed window bar)
    /// filter hook, then strategy hook.
    pub fn handle_bar(&mut self, bar: &Bar) {
        self.now = bar.datetime;
        if let Some(wbar) = self.bargen.update_bar(bar) {
            self.dispatch_window_bar(&wbar);
        }
    }

    /// Raw tick update: feed the aggregator (which may complete a minute
    /// bar and in turn a window bar), then the tick hooks themselves.
    pub fn handle_tick(&mut self, tick: &Tick) {
        self.now = tick.datetime;
        if let Some(minute_bar) = self.bargen.update_tick(tick) {
            if let Some(wbar) = self.bargen.update_bar(&minute_bar) {
                self.dispatch_window_bar(&wbar);
            }
        }
        if let Some(filter) = self.filter.as_mut() {
            filter.on_tick(tick, &mut self.toggles);
        }
        let mut ctx = TradeCtx {
            toggles: &mut self.toggles,
            pending: &mut self.pending,
            symbol: &self.symbol,
            now: self.now,
            pos: self.pos,
        };
        self.strategy.on_tick(tick, &mut ctx);
    }

    pub fn handle_trade(&mut self, trade: &Trade) {
        if let Some(filter) = self.filter.as_mut() {
            filter.on_trade(trade, &mut self.toggles);
        }
        let mut ctx = TradeCtx {
            toggles: &mut self.toggles,
            pending: &mut self.pending,
            symbol: &self.symbol,
            now: self.now,
            pos: self.pos,
        };
        self.strategy.on_trade(trade, &mut ctx);
    }

    pub fn handle_order(&mut self, order: &Order) {
        if let Some(filter) = self.filter.as_mut() {
            filter.on_order(order, &mut self.toggles);
        }
        let mut ctx = TradeCtx {
            toggles: &mut self.toggles,
            pending: &mut self.pending,
            symbol: &self.symbol,
            now: self.now,
            pos: self.pos,
        };
        self.strategy.on_order(order, &mut ctx);
    }

    pub fn handle_stop_order(&mut self, stop: &StopOrder) {
        if let Some(filter) = self.filter.as_mut() {
            filter.on_stop_order(stop, &mut self.toggles);
        }
        let mut ctx = TradeCtx {
            toggles: &mut self.toggles,
            pending: &mut self.pending,
            symbol: &self.symbol,
            now: self.now,
            pos: self.pos,
        };
        self.strategy.on_stop_order(stop, &mut ctx);
    }

    fn dispatch_window_bar(&mut self, wbar: &Bar) {
        if let Some(filter) = self.filter.as_mut() {
            filter.on_bar(wbar, &mut self.toggles);
        }
        let mut ctx = TradeCtx {
            toggles: &mut self.toggles,
            pending: &mut self.pending,
            symbol: &self.symbol,
            now: self.now,
            pos: self.pos,
        };
        self.strategy.on_bar(wbar, &mut ctx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::filter::NoOpFilter;
    use chrono::NaiveDate;

    fn bar_at(min: u32, close: f64) -> Bar {
        Bar {
            symbol: "RB888".into(),
            datetime: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(9, min, 0)
                .unwrap(),
            interval: Interval::Minute,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 10.0,
        }
    }

    /// Buys one contract on every window bar and records the outcome.
    #[derive(Default)]
    struct AlwaysBuy {
        attempts: Vec<Option<OrderRef>>,
    }

    impl Strategy for AlwaysBuy {
        fn on_bar(&mut self, bar: &Bar, ctx: &mut TradeCtx<'_>) {
            self.attempts.push(ctx.buy(bar.close, 1.0, false));
        }
    }

    /// Vetoes buying on every bar it sees.
    struct BlockBuys;

    impl Filter for BlockBuys {
        fn on_bar(&mut self, _bar: &Bar, toggles: &mut ToggleSet) {
            toggles.set(Action::Buy, false);
        }
    }

    #[test]
    fn primitives_map_to_direction_offset_pairs() {
        struct AllFour;
        impl Strategy for AllFour {
            fn on_bar(&mut self, bar: &Bar, ctx: &mut TradeCtx<'_>) {
                ctx.buy(bar.close, 1.0, false);
                ctx.sell(bar.close, 1.0, false);
                ctx.short(bar.close, 1.0, false);
                ctx.cover(bar.close, 1.0, false);
            }
        }

        let mut host = StrategyHost::new(Box::new(AllFour), "RB888", 1, Interval::Minute);
        host.handle_bar(&bar_at(0, 100.0));
        let (orders, stops) = host.take_orders();
        assert!(stops.is_empty());
        let pairs: Vec<_> = orders.iter().map(|o| (o.direction, o.offset)).collect();
        assert_eq!(
            pairs,
            vec![
                (Direction::Long, Offset::Open),
                (Direction::Short, Offset::Close),
                (Direction::Short, Offset::Open),
                (Direction::Long, Offset::Close),
            ]
        );
    }

    #[test]
    fn vetoed_buy_is_a_silent_noop() {
        let mut host = StrategyHost::new(Box::new(AlwaysBuy::default()), "RB888", 1, Interval::Minute);
        host.attach_filter(Box::new(BlockBuys));
        host.handle_bar(&bar_at(0, 100.0));

        let (orders, stops) = host.take_orders();
        assert!(orders.is_empty(), "vetoed buy must create no order");
        assert!(stops.is_empty());
    }

    #[test]
    fn filter_runs_before_strategy_on_same_event() {
        // The filter flips the buy toggle during on_bar; the strategy's own
        // on_bar for the *same* bar must already observe the veto.
        let mut host = StrategyHost::new(Box::new(AlwaysBuy::default()), "RB888", 1, Interval::Minute);
        host.attach_filter(Box::new(BlockBuys));
        host.handle_bar(&bar_at(0, 100.0));
        assert!(!host.toggles().permits(Action::Buy));
        let (orders, _) = host.take_orders();
        assert!(orders.is_empty());
    }

    #[test]
    fn permitted_buy_creates_exactly_one_order() {
        let mut host = StrategyHost::new(Box::new(AlwaysBuy::default()), "RB888", 1, Interval::Minute);
        host.handle_bar(&bar_at(0, 100.0));
        let (orders, _) = host.take_orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, OrderId(1));
        assert_eq!(orders[0].price, 100.0);
    }

    #[test]
    fn no_filter_equals_noop_filter() {
        let mut bare = StrategyHost::new(Box::new(AlwaysBuy::default()), "RB888", 1, Interval::Minute);
        let mut noop = StrategyHost::new(Box::new(AlwaysBuy::default()), "RB888", 1, Interval::Minute);
        noop.attach_filter(Box::new(NoOpFilter));

        for min in 0..3 {
            bare.handle_bar(&bar_at(min, 100.0 + min as f64));
            noop.handle_bar(&bar_at(min, 100.0 + min as f64));
        }

        let (bare_orders, _) = bare.take_orders();
        let (noop_orders, _) = noop.take_orders();
        assert_eq!(bare_orders.len(), noop_orders.len());
        for (a, b) in bare_orders.iter().zip(&noop_orders) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.price, b.price);
            assert_eq!(a.direction, b.direction);
        }
    }

    #[test]
    fn stop_orders_use_their_own_id_space() {
        struct StopBuyer;
        impl Strategy for StopBuyer {
            fn on_bar(&mut self, bar: &Bar, ctx: &mut TradeCtx<'_>) {
                assert!(matches!(
                    ctx.buy(bar.close + 5.0, 1.0, true),
                    Some(OrderRef::Stop(StopOrderId(1)))
                ));
            }
        }

        let mut host = StrategyHost::new(Box::new(StopBuyer), "RB888", 1, Interval::Minute);
        host.handle_bar(&bar_at(0, 100.0));
        let (orders, stops) = host.take_orders();
        assert!(orders.is_empty());
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].status, StopOrderStatus::Waiting);
    }

    #[test]
    fn aggregation_defers_strategy_until_window_completes() {
        let mut host = StrategyHost::new(Box::new(AlwaysBuy::default()), "RB888", 5, Interval::Minute);
        for min in 0..4 {
            host.handle_bar(&bar_at(min, 100.0));
        }
        assert!(host.take_orders().0.is_empty(), "window not complete yet");
        host.handle_bar(&bar_at(4, 100.0));
        assert_eq!(host.take_orders().0.len(), 1);
    }
}
