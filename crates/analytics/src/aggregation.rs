// Copyright (C) 2025-present The Minutely Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A module that provides per-minute aggregation of time-series data over a
//! trailing (sliding) time window.
//!
//! The main components are:
//! - `TimeSeriesData` and `Measurement`: traits for the data points, giving
//!   their event time and the value being aggregated
//! - `SlidingWindowAggregator`: core struct that keeps the window buffer,
//!   detects minute boundaries and computes the configured
//!   [`crate::metrics::Metric`]
//! - `SlidingWindowAdaptor` and `SlidingWindowStreamAdaptor`: iterator and
//!   stream adapters providing an ergonomic API over the aggregator
//!
//! The windowing system features:
//! - One result per elapsed minute, including minutes without any event
//! - Eviction of the events older than the window size, amortized O(1) per
//!   event
//! - Rejection of late events (events belonging to an already reported minute)
//!
//! Example usage:
//! ```text
//! use minutely_analytics::{aggregation::*, metrics::MetricRegistry};
//!
//! let aggregator =
//!     SlidingWindowAggregator::from_registry(10, "moving_average", &MetricRegistry::default())?;
//! let results = get_events_iterator()
//!     .sliding_window(aggregator)
//!     .filter_map(|x| x.left()) // Drop late events
//!     .collect::<Vec<_>>();
//! ```

use crate::{
    event::MinuteResult,
    metrics::{Metric, MetricRegistry},
};
use chrono::{DateTime, TimeDelta, Timelike, Utc};
use either::Either;
use futures_core::Stream;
use pin_project::pin_project;
use std::{
    cmp::Ordering,
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};

/// A trait for defining time-series data points
pub trait TimeSeriesData {
    fn get_ts(&self) -> DateTime<Utc>;
}

/// A trait for data points carrying the quantity being aggregated
pub trait Measurement {
    fn get_value(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
pub enum AggregationError {
    #[strum(to_string = "window size must be greater than 0 minutes")]
    InvalidWindowSize,

    #[strum(to_string = "unsupported metric '{name}', supported metrics: {supported}")]
    UnsupportedMetric { name: String, supported: String },
}

impl std::error::Error for AggregationError {}

/// Truncate the timestamp to the start of its minute
pub fn truncate_to_minute(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = i64::from(timestamp.second()) * 1_000_000_000 + i64::from(timestamp.nanosecond());
    timestamp - TimeDelta::nanoseconds(nanos)
}

/// The first minute boundary after the minute containing the timestamp.
///
/// A minute is only reported once it fully elapsed, so an event at `12:34:21`
/// belongs to the minute closing at `12:35:00`.
///
/// Panics when the next minute is past the latest representable time, which
/// [`crate::event::Event::validate`] rules out.
pub fn round_up_minute(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    truncate_to_minute(timestamp) + TimeDelta::minutes(1)
}

/// Sliding-window aggregator emitting one [`MinuteResult`] per elapsed minute.
///
/// Items must be pushed in non-decreasing time order. Items whose minute was
/// already reported are handed back to the caller untouched.
#[derive(Debug)]
pub struct SlidingWindowAggregator<Input> {
    window_size_minutes: u32,
    /// Items in the window, oldest first
    buffer: VecDeque<Input>,
    /// The minute boundary being accumulated, `None` until the first item
    current_minute: Option<DateTime<Utc>>,
    metric: Box<dyn Metric>,
}

impl<Input: TimeSeriesData + Measurement> SlidingWindowAggregator<Input> {
    pub fn new(window_size_minutes: u32, metric: Box<dyn Metric>) -> Result<Self, AggregationError> {
        if window_size_minutes == 0 {
            return Err(AggregationError::InvalidWindowSize);
        }
        Ok(Self {
            window_size_minutes,
            buffer: VecDeque::new(),
            current_minute: None,
            metric,
        })
    }

    /// Create an aggregator for the metric registered under `metric_name`
    pub fn from_registry(
        window_size_minutes: u32,
        metric_name: &str,
        registry: &MetricRegistry,
    ) -> Result<Self, AggregationError> {
        let metric = registry.build(metric_name)?;
        Self::new(window_size_minutes, metric)
    }

    pub const fn window_size_minutes(&self) -> u32 {
        self.window_size_minutes
    }

    pub fn metric(&self) -> &dyn Metric {
        self.metric.as_ref()
    }

    pub const fn current_minute(&self) -> Option<DateTime<Utc>> {
        self.current_minute
    }

    /// Number of items currently held in the window
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Push an item into the window.
    ///
    /// Returns the results of every minute closed by this item, in ascending
    /// order, or the item itself if it belongs to an already reported minute.
    /// The very first item always produces a single `0` result for the minute
    /// it falls in, since there is no previous window to aggregate.
    pub fn process(&mut self, item: Input) -> Either<Vec<MinuteResult>, Input> {
        let item_minute = round_up_minute(item.get_ts());
        let Some(current_minute) = self.current_minute else {
            self.current_minute = Some(item_minute);
            self.buffer.push_back(item);
            let placeholder = MinuteResult::new(
                item_minute - TimeDelta::minutes(1),
                0.0,
                self.metric.output_field(),
            );
            return Either::Left(vec![placeholder]);
        };

        match item_minute.cmp(&current_minute) {
            Ordering::Less => Either::Right(item),
            Ordering::Equal => {
                self.buffer.push_back(item);
                Either::Left(vec![])
            }
            Ordering::Greater => {
                // Fill every elapsed minute, including the ones without items
                let mut results = Vec::new();
                let mut minute = current_minute;
                while minute < item_minute {
                    results.push(self.compute_minute(minute));
                    minute += TimeDelta::minutes(1);
                    self.current_minute = Some(minute);
                }
                self.buffer.push_back(item);
                Either::Left(results)
            }
        }
    }

    /// Flush the minute currently being accumulated.
    ///
    /// Meant to be called once at the end of the stream, calling it again
    /// without pushing new items reports the same minute again.
    pub fn finalize(&mut self) -> Option<MinuteResult> {
        let current_minute = self.current_minute?;
        Some(self.compute_minute(current_minute))
    }

    fn compute_minute(&mut self, minute: DateTime<Utc>) -> MinuteResult {
        self.evict(minute);
        let value = self
            .metric
            .compute(&mut self.buffer.iter().map(Measurement::get_value));
        MinuteResult::new(minute, value, self.metric.output_field())
    }

    /// Drop the items older than the window ending at `minute`
    fn evict(&mut self, minute: DateTime<Utc>) {
        // A window reaching before the earliest representable time evicts nothing
        let Some(cutoff) =
            minute.checked_sub_signed(TimeDelta::minutes(i64::from(self.window_size_minutes)))
        else {
            return;
        };
        while self
            .buffer
            .front()
            .is_some_and(|item| item.get_ts() < cutoff)
        {
            self.buffer.pop_front();
        }
    }
}

/// An iterator adaptor that provides an ergonomic API for sliding-window
/// aggregation.
///
/// Yields `Either::Left` for every minute result and `Either::Right` for every
/// rejected late item. The last open minute is flushed once the source is
/// exhausted.
pub struct SlidingWindowAdaptor<Input, I: Iterator<Item = Input>> {
    source: I,
    aggregator: SlidingWindowAggregator<Input>,
    buffer: VecDeque<Either<MinuteResult, Input>>,
    finalized: bool,
}

impl<Input: TimeSeriesData + Measurement, I: Iterator<Item = Input>> SlidingWindowAdaptor<Input, I> {
    pub fn new(source: I, aggregator: SlidingWindowAggregator<Input>) -> Self {
        Self {
            source,
            aggregator,
            buffer: VecDeque::new(),
            finalized: false,
        }
    }
}

fn buffer_outcome<Input>(
    buffer: &mut VecDeque<Either<MinuteResult, Input>>,
    outcome: Either<Vec<MinuteResult>, Input>,
) {
    match outcome {
        Either::Left(results) => buffer.extend(results.into_iter().map(Either::Left)),
        Either::Right(late) => buffer.push_back(Either::Right(late)),
    }
}

impl<Input: TimeSeriesData + Measurement, I: Iterator<Item = Input>> Iterator
    for SlidingWindowAdaptor<Input, I>
{
    type Item = Either<MinuteResult, Input>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(next) = self.buffer.pop_front() {
                return Some(next);
            }
            if self.finalized {
                return None;
            }
            match self.source.next() {
                Some(item) => buffer_outcome(&mut self.buffer, self.aggregator.process(item)),
                None => {
                    self.finalized = true;
                    return self.aggregator.finalize().map(Either::Left);
                }
            }
        }
    }
}

pub trait SlidingWindowExt<Input: TimeSeriesData + Measurement>:
    Iterator<Item = Input> + Sized
{
    fn sliding_window(
        self,
        aggregator: SlidingWindowAggregator<Input>,
    ) -> SlidingWindowAdaptor<Input, Self> {
        SlidingWindowAdaptor::new(self, aggregator)
    }
}

impl<Input: TimeSeriesData + Measurement, I: Iterator<Item = Input>> SlidingWindowExt<Input> for I {}

/// Stream counterpart of [`SlidingWindowAdaptor`]
#[pin_project]
pub struct SlidingWindowStreamAdaptor<Input, I: Stream<Item = Input>> {
    #[pin]
    source: I,
    aggregator: SlidingWindowAggregator<Input>,
    buffer: VecDeque<Either<MinuteResult, Input>>,
    finalized: bool,
}

impl<Input: TimeSeriesData + Measurement, I: Stream<Item = Input>>
    SlidingWindowStreamAdaptor<Input, I>
{
    pub fn new(source: I, aggregator: SlidingWindowAggregator<Input>) -> Self {
        Self {
            source,
            aggregator,
            buffer: VecDeque::new(),
            finalized: false,
        }
    }
}

impl<Input: TimeSeriesData + Measurement, I: Stream<Item = Input>> Stream
    for SlidingWindowStreamAdaptor<Input, I>
{
    type Item = Either<MinuteResult, Input>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(next) = this.buffer.pop_front() {
                return Poll::Ready(Some(next));
            }
            if *this.finalized {
                return Poll::Ready(None);
            }
            match this.source.as_mut().poll_next(cx) {
                Poll::Ready(Some(item)) => {
                    buffer_outcome(this.buffer, this.aggregator.process(item));
                }
                Poll::Ready(None) => {
                    *this.finalized = true;
                    return Poll::Ready(this.aggregator.finalize().map(Either::Left));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

pub trait SlidingWindowStreamExt<Input: TimeSeriesData + Measurement>:
    Stream<Item = Input>
{
    fn sliding_window(
        self,
        aggregator: SlidingWindowAggregator<Input>,
    ) -> SlidingWindowStreamAdaptor<Input, Self>
    where
        Self: Sized,
    {
        SlidingWindowStreamAdaptor::new(self, aggregator)
    }
}

impl<Input: TimeSeriesData + Measurement, I: Stream<Item = Input>> SlidingWindowStreamExt<Input>
    for I
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Maximum, MovingAverage};
    use chrono::TimeZone;
    use futures::{stream, StreamExt};

    // Test item carrying only what the aggregator looks at
    #[derive(Debug, Clone, PartialEq)]
    struct TestItem {
        ts: DateTime<Utc>,
        value: f64,
    }

    impl TimeSeriesData for TestItem {
        fn get_ts(&self) -> DateTime<Utc> {
            self.ts
        }
    }

    impl Measurement for TestItem {
        fn get_value(&self) -> f64 {
            self.value
        }
    }

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, 20, h, m, s).unwrap()
    }

    fn item(h: u32, m: u32, s: u32, value: f64) -> TestItem {
        TestItem {
            ts: ts(h, m, s),
            value,
        }
    }

    fn average(window: u32) -> SlidingWindowAggregator<TestItem> {
        SlidingWindowAggregator::new(window, Box::new(MovingAverage)).unwrap()
    }

    fn maximum(window: u32) -> SlidingWindowAggregator<TestItem> {
        SlidingWindowAggregator::new(window, Box::new(Maximum)).unwrap()
    }

    fn avg(date: DateTime<Utc>, value: f64) -> MinuteResult {
        MinuteResult::new(date, value, "average_delivery_time")
    }

    fn results(outcome: Either<Vec<MinuteResult>, TestItem>) -> Vec<MinuteResult> {
        outcome.left().expect("item unexpectedly rejected as late")
    }

    #[test]
    fn test_round_up_minute() {
        assert_eq!(round_up_minute(ts(12, 34, 21)), ts(12, 35, 0));
        assert_eq!(
            round_up_minute(ts(23, 59, 59)),
            Utc.with_ymd_and_hms(2025, 4, 21, 0, 0, 0).unwrap()
        );
        assert_eq!(round_up_minute(ts(12, 0, 0)), ts(12, 1, 0));
        let sub_second = ts(12, 34, 59) + TimeDelta::microseconds(999_999);
        assert_eq!(round_up_minute(sub_second), ts(12, 35, 0));
    }

    #[test]
    fn test_round_up_minute_bounds() {
        let base = ts(8, 0, 0);
        for offset in (0..180_000_000).step_by(7_919_131) {
            let t = base + TimeDelta::microseconds(offset);
            let rounded = round_up_minute(t);
            assert!(rounded > t);
            assert!(rounded - t <= TimeDelta::seconds(60));
            assert_eq!(rounded.second(), 0);
            assert_eq!(rounded.nanosecond(), 0);
            // Re-rounding just below a boundary lands on the same boundary
            assert_eq!(round_up_minute(rounded - TimeDelta::microseconds(1)), rounded);
        }
    }

    #[test]
    fn test_invalid_window_size() {
        let result = SlidingWindowAggregator::<TestItem>::new(0, Box::new(MovingAverage));
        assert!(matches!(result, Err(AggregationError::InvalidWindowSize)));
    }

    #[test]
    fn test_from_registry() {
        let registry = MetricRegistry::default();
        let aggregator =
            SlidingWindowAggregator::<TestItem>::from_registry(5, "maximum", &registry).unwrap();
        assert_eq!(aggregator.metric().name(), "maximum");
        assert_eq!(aggregator.window_size_minutes(), 5);
        assert!(aggregator.current_minute().is_none());

        let result = SlidingWindowAggregator::<TestItem>::from_registry(5, "median", &registry);
        assert!(matches!(
            result,
            Err(AggregationError::UnsupportedMetric { .. })
        ));
    }

    #[test]
    fn test_first_item_emits_zero() {
        let mut aggregator = average(10);
        let out = results(aggregator.process(item(12, 0, 1, 10.0)));
        assert_eq!(out, vec![avg(ts(12, 0, 0), 0.0)]);
        assert_eq!(aggregator.current_minute(), Some(ts(12, 1, 0)));
        assert_eq!(aggregator.len(), 1);

        let mut aggregator = maximum(10);
        let out = results(aggregator.process(item(12, 0, 1, 10.0)));
        assert_eq!(
            out,
            vec![MinuteResult::new(ts(12, 0, 0), 0.0, "max_delivery_time")]
        );
    }

    #[test]
    fn test_same_minute_emits_nothing() {
        let mut aggregator = average(10);
        aggregator.process(item(12, 0, 1, 10.0));
        let out = results(aggregator.process(item(12, 0, 31, 20.0)));
        assert!(out.is_empty());
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.current_minute(), Some(ts(12, 1, 0)));
    }

    #[test]
    fn test_single_minute_crossing() {
        let mut aggregator = average(10);
        aggregator.process(item(12, 0, 1, 10.0));
        aggregator.process(item(12, 0, 31, 20.0));
        let out = results(aggregator.process(item(12, 1, 5, 60.0)));
        // The crossing item belongs to the next minute, not yet reported
        assert_eq!(out, vec![avg(ts(12, 1, 0), 15.0)]);
        assert_eq!(aggregator.current_minute(), Some(ts(12, 2, 0)));
        assert_eq!(aggregator.len(), 3);
    }

    #[test]
    fn test_multiple_minute_gap() {
        let mut aggregator = average(10);
        aggregator.process(item(12, 0, 1, 10.0));
        let out = results(aggregator.process(item(12, 3, 30, 20.0)));
        assert_eq!(
            out,
            vec![
                avg(ts(12, 1, 0), 10.0),
                avg(ts(12, 2, 0), 10.0),
                avg(ts(12, 3, 0), 10.0),
            ]
        );
        assert_eq!(aggregator.current_minute(), Some(ts(12, 4, 0)));
    }

    #[test]
    fn test_gap_filling_evicts_per_minute() {
        let mut aggregator = maximum(2);
        aggregator.process(item(12, 0, 10, 50.0));
        aggregator.process(item(12, 1, 10, 30.0));
        let out = results(aggregator.process(item(12, 6, 0, 1.0)));
        let dates: Vec<_> = out.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![ts(12, 2, 0), ts(12, 3, 0), ts(12, 4, 0), ts(12, 5, 0), ts(12, 6, 0)]
        );
        let values: Vec<_> = out.iter().map(|r| r.value).collect();
        // 12:00:10 leaves the window at 12:03, 12:01:10 at 12:04
        assert_eq!(values, vec![50.0, 30.0, 0.0, 0.0, 0.0]);
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_finalize() {
        let mut aggregator = average(10);
        assert_eq!(aggregator.finalize(), None);
        aggregator.process(item(12, 0, 0, 10.0));
        assert_eq!(aggregator.finalize(), Some(avg(ts(12, 1, 0), 10.0)));
        // Deterministic but not idempotent in side effect
        assert_eq!(aggregator.finalize(), Some(avg(ts(12, 1, 0), 10.0)));
    }

    #[test]
    fn test_finalize_evicts() {
        let mut aggregator = maximum(1);
        aggregator.process(item(12, 0, 0, 90.0));
        aggregator.process(item(12, 1, 30, 10.0));
        // Window for 12:02 starts at 12:01, the first item is gone
        assert_eq!(
            aggregator.finalize(),
            Some(MinuteResult::new(ts(12, 2, 0), 10.0, "max_delivery_time"))
        );
        assert_eq!(aggregator.len(), 1);
    }

    #[test]
    fn test_late_item_rejected() {
        let mut aggregator = average(10);
        aggregator.process(item(12, 0, 1, 10.0));
        aggregator.process(item(12, 2, 1, 20.0));
        let late = item(12, 0, 59, 1000.0);
        let outcome = aggregator.process(late.clone());
        assert_eq!(outcome, Either::Right(late));
        assert_eq!(aggregator.len(), 2);
        assert_eq!(aggregator.current_minute(), Some(ts(12, 3, 0)));
        assert_eq!(aggregator.finalize(), Some(avg(ts(12, 3, 0), 15.0)));
    }

    #[test]
    fn test_out_of_order_within_current_minute_accepted() {
        let mut aggregator = average(10);
        aggregator.process(item(12, 0, 40, 10.0));
        let out = results(aggregator.process(item(12, 0, 5, 30.0)));
        assert!(out.is_empty());
        assert_eq!(aggregator.finalize(), Some(avg(ts(12, 1, 0), 20.0)));
    }

    #[test]
    fn test_eviction_property() {
        let window = 3;
        let mut aggregator = maximum(window);
        let items: Vec<TestItem> = (0..40)
            .map(|i| TestItem {
                ts: ts(10, 0, 0) + TimeDelta::seconds(i * i * 3),
                value: ((i * 13) % 17) as f64,
            })
            .collect();
        let mut emitted = Vec::new();
        for it in items.iter().cloned() {
            emitted.extend(results(aggregator.process(it)));
        }
        emitted.extend(aggregator.finalize());
        // Brute force: the maximum of every item at or after the cutoff which
        // was pushed before the result was emitted
        for result in emitted.iter().skip(1) {
            let cutoff = result.date - TimeDelta::minutes(i64::from(window));
            let expected = items
                .iter()
                .filter(|it| it.ts >= cutoff && round_up_minute(it.ts) <= result.date)
                .map(|it| it.value)
                .reduce(f64::max)
                .unwrap_or(0.0);
            assert_eq!(result.value, expected, "result at {}", result.date);
        }
        let dates: Vec<_> = emitted.iter().map(|r| r.date).collect();
        assert!(dates.windows(2).all(|w| w[1] - w[0] == TimeDelta::minutes(1)));
    }

    #[test]
    fn test_sliding_window_iterator() {
        let items = vec![
            item(12, 0, 1, 10.0),
            item(12, 0, 31, 20.0),
            item(12, 1, 5, 30.0),
            // Late: minute 12:01 was already reported
            item(12, 0, 50, 99.0),
            item(12, 3, 0, 40.0),
        ];
        let expected = vec![
            Either::Left(avg(ts(12, 0, 0), 0.0)),
            Either::Left(avg(ts(12, 1, 0), 15.0)),
            Either::Right(item(12, 0, 50, 99.0)),
            Either::Left(avg(ts(12, 2, 0), 20.0)),
            Either::Left(avg(ts(12, 3, 0), 20.0)),
            Either::Left(avg(ts(12, 4, 0), 25.0)),
        ];
        let out: Vec<_> = items.into_iter().sliding_window(average(10)).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_window_reaching_before_earliest_time() {
        let first = DateTime::<Utc>::MIN_UTC + TimeDelta::seconds(30);
        let mut aggregator = average(u32::MAX);
        results(aggregator.process(TestItem {
            ts: first,
            value: 4.0,
        }));
        let emitted = results(aggregator.process(TestItem {
            ts: first + TimeDelta::minutes(2),
            value: 8.0,
        }));
        assert_eq!(
            emitted.iter().map(|r| r.value).collect::<Vec<_>>(),
            vec![4.0, 4.0]
        );
        assert_eq!(aggregator.len(), 2);
    }

    #[test]
    fn test_sliding_window_adaptor_new() {
        let items = vec![item(12, 0, 1, 10.0), item(12, 1, 5, 30.0)];
        let out: Vec<_> = SlidingWindowAdaptor::new(items.into_iter(), average(10))
            .filter_map(Either::left)
            .collect();
        assert_eq!(
            out,
            vec![
                avg(ts(12, 0, 0), 0.0),
                avg(ts(12, 1, 0), 10.0),
                avg(ts(12, 2, 0), 20.0),
            ]
        );
    }

    #[test]
    fn test_sliding_window_iterator_empty() {
        let out: Vec<_> = Vec::<TestItem>::new()
            .into_iter()
            .sliding_window(average(10))
            .collect();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_sliding_window_stream() {
        let items = vec![
            item(12, 0, 1, 10.0),
            item(12, 1, 5, 20.0),
            item(12, 3, 30, 60.0),
        ];
        let iter_results: Vec<_> = items
            .clone()
            .into_iter()
            .sliding_window(maximum(1))
            .filter_map(|x| x.left())
            .collect();
        let stream_results: Vec<_> = stream::iter(items)
            .sliding_window(maximum(1))
            .filter_map(|x| async move { x.left() })
            .collect()
            .await;
        assert_eq!(stream_results, iter_results);
        let values: Vec<_> = stream_results.iter().map(|r| r.value).collect();
        // 12:01:05 leaves the one minute window at 12:03
        assert_eq!(values, vec![0.0, 10.0, 20.0, 0.0, 60.0]);
    }
}
