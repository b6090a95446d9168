//! Bar aggregation: ticks into minute bars, minute bars into window bars.

use chrono::{Datelike, Timelike};

use crate::domain::{Bar, Interval, Tick};

/// Aggregates fine-grained updates into coarser bars.
///
/// Two stages, mirroring the host's event flow:
/// - `update_tick` builds 1-minute bars from raw ticks and returns each
///   minute bar as it completes.
/// - `update_bar` merges 1-minute bars into `window`-sized bars at the
///   configured interval and returns each window bar as it completes.
///
/// Minute windows complete on the bar whose minute ends the window
/// (`(minute + 1) % window == 0`). Hour and daily windows complete when the
/// next bar crosses a bucket boundary, so the final partial window of a
/// series is never emitted.
#[derive(Debug, Clone)]
pub struct BarGenerator {
    window: usize,
    interval: Interval,
    window_bar: Option<Bar>,
    minute_bar: Option<Bar>,
    /// Completed hour/day buckets merged into the current window bar.
    buckets_done: usize,
    /// Bucket key of the most recent bar, so the counter only moves on
    /// bucket transitions rather than on every bar of a later bucket.
    last_bucket: Option<i64>,
}

impl BarGenerator {
    /// `window` must be >= 1; the engine's config validation guarantees it.
    pub fn new(window: usize, interval: Interval) -> Self {
        Self {
            window: window.max(1),
            interval,
            window_bar: None,
            minute_bar: None,
            buckets_done: 0,
            last_bucket: None,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    /// Feed one raw tick; returns the previous minute bar once a tick from a
    /// later minute arrives.
    pub fn update_tick(&mut self, tick: &Tick) -> Option<Bar> {
        let minute_start = tick
            .datetime
            .with_second(0)
            .and_then(|dt| dt.with_nanosecond(0))
            .unwrap_or(tick.datetime);

        let mut finished = None;
        if let Some(current) = self.minute_bar.as_mut() {
            if current.datetime != minute_start {
                finished = self.minute_bar.take();
            } else {
                current.high = current.high.max(tick.last_price);
                current.low = current.low.min(tick.last_price);
                current.close = tick.last_price;
                current.volume += tick.volume;
                return None;
            }
        }

        self.minute_bar = Some(Bar {
            symbol: tick.symbol.clone(),
            datetime: minute_start,
            interval: Interval::Minute,
            open: tick.last_price,
            high: tick.last_price,
            low: tick.last_price,
            close: tick.last_price,
            volume: tick.volume,
        });
        finished
    }

    /// Feed one 1-minute bar; returns the aggregated window bar when it
    /// completes.
    pub fn update_bar(&mut self, bar: &Bar) -> Option<Bar> {
        match self.interval {
            Interval::Minute => self.update_minute(bar),
            Interval::Hour | Interval::Daily => self.update_bucketed(bar),
        }
    }

    fn update_minute(&mut self, bar: &Bar) -> Option<Bar> {
        self.merge(bar);
        if (bar.datetime.minute() as usize + 1) % self.window == 0 {
            self.window_bar.take()
        } else {
            None
        }
    }

    fn update_bucketed(&mut self, bar: &Bar) -> Option<Bar> {
        let key = self.bucket_key(bar);
        let mut finished = None;
        if let Some(last) = self.last_bucket {
            if key != last {
                self.buckets_done += 1;
                if self.buckets_done >= self.window {
                    finished = self.window_bar.take();
                    self.buckets_done = 0;
                }
            }
        }
        self.last_bucket = Some(key);
        self.merge(bar);
        finished
    }

    fn bucket_key(&self, bar: &Bar) -> i64 {
        match self.interval {
            Interval::Minute => unreachable!("minute windows use the modulo rule"),
            Interval::Hour => {
                bar.datetime.num_days_from_ce() as i64 * 24 + bar.datetime.hour() as i64
            }
            Interval::Daily => bar.datetime.num_days_from_ce() as i64,
        }
    }

    fn merge(&mut self, bar: &Bar) {
        match self.window_bar.as_mut() {
            None => {
                let mut started = bar.clone();
                started.interval = self.interval;
                self.window_bar = Some(started);
            }
            Some(current) => {
                current.high = current.high.max(bar.high);
                current.low = current.low.min(bar.low);
                current.close = bar.close;
                current.volume += bar.volume;
            }
        }
    }
}
