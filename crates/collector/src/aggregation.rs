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

//! Actor-based sliding window aggregation of delivery events.
//!
//! - `AggregationActor` - Runs the events through a
//!   [`SlidingWindowAggregator`] and forwards every per-minute result
//! - `AggregationActorHandle` - Handle for controlling the actor and receiving
//!   the results
//! - `AggregationStats` - Metrics collection for aggregation operations
//!
//! Once the event channel closes, the result of the last open minute is
//! emitted and the actor terminates, closing its own output channel.

use either::Either;
use futures::stream::StreamExt;
use minutely_analytics::{
    aggregation::{SlidingWindowAggregator, SlidingWindowStreamExt, TimeSeriesData},
    event::{Event, MinuteResult, DATE_FORMAT},
};
use opentelemetry::metrics::{Counter, Meter};
use pin_utils::pin_mut;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct AggregationStats {
    pub received_events: Counter<u64>,
    pub late_events: Counter<u64>,
    pub sent_results: Counter<u64>,
    pub send_error: Counter<u64>,
}

impl AggregationStats {
    pub fn new(meter: Meter) -> Self {
        let received_events = meter
            .u64_counter("minutely.collector.aggregation.received.events")
            .with_description("Number of delivery events received for aggregation")
            .build();
        let late_events = meter
            .u64_counter("minutely.collector.aggregation.late.events")
            .with_description("Number of events older than the current minute discarded")
            .build();
        let sent_results = meter
            .u64_counter("minutely.collector.aggregation.sent.results")
            .with_description("Number of per-minute results successfully sent downstream")
            .build();
        let send_error = meter
            .u64_counter("minutely.collector.aggregation.send.error")
            .with_description("Number of per-minute results that failed to be sent downstream")
            .build();
        Self {
            received_events,
            late_events,
            sent_results,
            send_error,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AggregationCommand {
    Shutdown,
}

#[derive(Debug)]
struct AggregationActor {
    cmd_recv: mpsc::Receiver<AggregationCommand>,
    rx: async_channel::Receiver<Event>,
    tx: async_channel::Sender<MinuteResult>,
    aggregator: SlidingWindowAggregator<Event>,
    stats: AggregationStats,
}

impl AggregationActor {
    fn new(
        cmd_recv: mpsc::Receiver<AggregationCommand>,
        rx: async_channel::Receiver<Event>,
        tx: async_channel::Sender<MinuteResult>,
        aggregator: SlidingWindowAggregator<Event>,
        stats: AggregationStats,
    ) -> Self {
        Self {
            cmd_recv,
            rx,
            tx,
            aggregator,
            stats,
        }
    }

    async fn run(mut self) -> anyhow::Result<String> {
        info!(
            "Starting aggregation of {} over a {} minute(s) window",
            self.aggregator.metric().name(),
            self.aggregator.window_size_minutes()
        );
        let stats = self.stats.clone();
        let agg = self
            .rx
            .inspect(move |_| stats.received_events.add(1, &[]))
            .sliding_window(self.aggregator);
        pin_mut!(agg);

        let mut cmd_open = true;
        loop {
            tokio::select! {
                biased;
                cmd_recv = self.cmd_recv.recv(), if cmd_open => {
                    match cmd_recv {
                        Some(AggregationCommand::Shutdown) => {
                            info!("Received shutdown command, shutting down AggregationActor");
                            return Ok("Aggregation terminated after a shutdown command".to_string());
                        }
                        None => {
                            // Only the event channel decides when aggregation is done
                            debug!("Aggregation command channel closed");
                            cmd_open = false;
                        }
                    }
                }
                result = agg.next() => {
                    match result {
                        Some(Either::Left(minute)) => {
                            debug!("Minute {} computed: {}", minute.date.format(DATE_FORMAT), minute.value);
                            if let Err(err) = self.tx.send(minute).await {
                                error!("AggregationActor send error: {err}");
                                self.stats.send_error.add(1, &[]);
                                return Err(anyhow::anyhow!("results channel closed: {err}"));
                            }
                            self.stats.sent_results.add(1, &[]);
                        }
                        Some(Either::Right(late)) => {
                            warn!(
                                "Discarding late event {} with timestamp {}",
                                late.translation_id,
                                late.get_ts().format(DATE_FORMAT)
                            );
                            self.stats.late_events.add(1, &[]);
                        }
                        None => {
                            info!("Event channel closed, shutting down AggregationActor");
                            return Ok("Aggregation terminated successfully".to_string());
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, strum_macros::Display)]
pub enum AggregationActorHandleError {
    #[strum(to_string = "error sending command to the aggregation actor")]
    SendError,
}

impl std::error::Error for AggregationActorHandleError {}

#[derive(Debug)]
pub struct AggregationActorHandle {
    cmd_send: mpsc::Sender<AggregationCommand>,
    rx: async_channel::Receiver<MinuteResult>,
}

impl AggregationActorHandle {
    pub fn new(
        buffer_size: usize,
        aggregator: SlidingWindowAggregator<Event>,
        event_rx: async_channel::Receiver<Event>,
        stats: Either<Meter, AggregationStats>,
    ) -> (JoinHandle<anyhow::Result<String>>, Self) {
        let (cmd_send, cmd_recv) = mpsc::channel(10);
        let (tx, rx) = async_channel::bounded(buffer_size);
        let stats = match stats {
            Either::Left(meter) => AggregationStats::new(meter),
            Either::Right(stats) => stats,
        };
        let actor = AggregationActor::new(cmd_recv, event_rx, tx, aggregator, stats);
        let join_handle = tokio::spawn(actor.run());
        let handle = Self { cmd_send, rx };
        (join_handle, handle)
    }

    /// Stops the actor right away, without emitting the open minute
    pub async fn shutdown(&self) -> Result<(), AggregationActorHandleError> {
        self.cmd_send
            .send(AggregationCommand::Shutdown)
            .await
            .map_err(|_| AggregationActorHandleError::SendError)
    }

    pub fn subscribe(&self) -> async_channel::Receiver<MinuteResult> {
        self.rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use minutely_analytics::metrics::MetricRegistry;

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 12, 26, hour, min, sec).unwrap()
    }

    fn meter() -> Meter {
        opentelemetry::global::meter("minutely-test")
    }

    fn aggregator(window: u32, metric: &str) -> SlidingWindowAggregator<Event> {
        SlidingWindowAggregator::from_registry(window, metric, &MetricRegistry::default()).unwrap()
    }

    #[tokio::test]
    async fn test_aggregation_actor_moving_average() {
        let (event_tx, event_rx) = async_channel::bounded(16);
        let (join, handle) = AggregationActorHandle::new(
            16,
            aggregator(10, "moving_average"),
            event_rx,
            Either::Left(meter()),
        );
        let rx = handle.subscribe();

        for (ts, duration) in [
            (at(18, 11, 8), 20.0),
            (at(18, 15, 19), 31.0),
            (at(18, 23, 19), 54.0),
        ] {
            event_tx.send(Event::delivered(ts, duration)).await.unwrap();
        }
        drop(event_tx);

        let mut results = vec![];
        while let Ok(result) = rx.recv().await {
            results.push(result);
        }
        assert_eq!(join.await.unwrap().unwrap(), "Aggregation terminated successfully");

        let values: Vec<f64> = results.iter().map(|r| r.value).collect();
        assert_eq!(
            values,
            vec![
                0.0, 20.0, 20.0, 20.0, 20.0, 25.5, 25.5, 25.5, 25.5, 25.5, 25.5, 31.0, 31.0,
                42.5
            ]
        );
        assert_eq!(results.first().unwrap().date, at(18, 11, 0));
        assert_eq!(results.last().unwrap().date, at(18, 24, 0));
        assert!(results
            .iter()
            .all(|r| r.field == "average_delivery_time"));
    }

    #[tokio::test]
    async fn test_aggregation_actor_discards_late_events() {
        let (event_tx, event_rx) = async_channel::bounded(16);
        let (join, handle) =
            AggregationActorHandle::new(16, aggregator(5, "maximum"), event_rx, Either::Left(meter()));
        let rx = handle.subscribe();

        event_tx
            .send(Event::delivered(at(10, 5, 0), 40.0))
            .await
            .unwrap();
        event_tx
            .send(Event::delivered(at(10, 3, 0), 99.0))
            .await
            .unwrap();
        drop(event_tx);

        let mut results = vec![];
        while let Ok(result) = rx.recv().await {
            results.push(result);
        }
        join.await.unwrap().unwrap();
        let values: Vec<f64> = results.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0.0, 40.0]);
        assert!(results.iter().all(|r| r.field == "max_delivery_time"));
    }

    #[tokio::test]
    async fn test_aggregation_actor_shutdown() {
        let (_event_tx, event_rx) = async_channel::bounded::<Event>(16);
        let (join, handle) =
            AggregationActorHandle::new(16, aggregator(5, "maximum"), event_rx, Either::Left(meter()));
        handle.shutdown().await.unwrap();
        assert_eq!(
            join.await.unwrap().unwrap(),
            "Aggregation terminated after a shutdown command"
        );
    }
}
