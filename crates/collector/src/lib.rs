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

use crate::{
    aggregation::AggregationActorHandle,
    config::CollectorConfig,
    inputs::files::FilesActorHandle,
    publishers::json_lines::JsonLinesPublisherActorHandle,
};
use futures::{stream::FuturesUnordered, StreamExt};
use minutely_analytics::{aggregation::SlidingWindowAggregator, metrics::MetricRegistry};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod aggregation;
pub mod config;
pub mod inputs;
pub mod publishers;

/// Time given to an actor to acknowledge a shutdown command
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Time given to the remaining actors to terminate once one of them failed
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// The running file -> aggregation -> publisher pipeline
pub struct Collection {
    files_handle: FilesActorHandle,
    join_set: FuturesUnordered<JoinHandle<anyhow::Result<String>>>,
    /// Kept across calls to [`Collection::wait`], a cancelled wait must not
    /// lose it
    first_error: Option<anyhow::Error>,
}

impl Collection {
    /// Start all the actors, the configuration is expected to be validated
    pub async fn start(
        config: &CollectorConfig,
        registry: &MetricRegistry,
        meter: opentelemetry::metrics::Meter,
    ) -> anyhow::Result<Self> {
        let aggregator = SlidingWindowAggregator::from_registry(
            config.aggregation.window_size_minutes,
            &config.aggregation.metric,
            registry,
        )?;

        let (files_join, files_handle) = FilesActorHandle::new(
            config.input.clone(),
            config.buffer_size,
            either::Left(meter.clone()),
        );
        let (aggregation_join, aggregation_handle) = AggregationActorHandle::new(
            config.buffer_size,
            aggregator,
            files_handle.subscribe(),
            either::Left(meter.clone()),
        );
        let (publisher_join, publisher_handle) = match JsonLinesPublisherActorHandle::from_config(
            &config.output,
            aggregation_handle.subscribe(),
            either::Left(meter),
        )
        .await
        {
            Ok(ret) => ret,
            Err(err) => {
                error!("Failed to start the publisher: {err}");
                let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, files_handle.shutdown()).await;
                let _ =
                    tokio::time::timeout(SHUTDOWN_TIMEOUT, aggregation_handle.shutdown()).await;
                return Err(err.into());
            }
        };

        let join_set = FuturesUnordered::new();
        join_set.push(files_join);
        join_set.push(aggregation_join);
        join_set.push(publisher_join);
        info!(
            "Collecting {} over {} minute(s) from {:?} to {}",
            config.aggregation.metric,
            config.aggregation.window_size_minutes,
            config.input.path(),
            publisher_handle.name()
        );
        Ok(Self {
            files_handle,
            join_set,
            first_error: None,
        })
    }

    /// Stop reading the input. The minute being accumulated is still emitted
    /// and written before the pipeline completes.
    pub async fn shutdown(&self) {
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.files_handle.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!("Files actor already terminated: {err}"),
            Err(_) => warn!("Files actor did not acknowledge the shutdown command"),
        }
    }

    /// Wait until every actor terminated.
    ///
    /// On the first failure the input is stopped so the remaining actors can
    /// drain, the ones still running after [`DRAIN_TIMEOUT`] are aborted.
    /// The first failure is returned, even when an earlier call was cancelled
    /// after observing it.
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        loop {
            let next = if self.first_error.is_some() {
                match tokio::time::timeout(DRAIN_TIMEOUT, self.join_set.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("Collection actors did not terminate in time, aborting them");
                        self.join_set.iter().for_each(JoinHandle::abort);
                        continue;
                    }
                }
            } else {
                self.join_set.next().await
            };
            let Some(join_ret) = next else {
                break;
            };
            match join_ret.map_err(anyhow::Error::from).and_then(|ret| ret) {
                Ok(msg) => info!("{msg}"),
                Err(err) if self.first_error.is_some() => debug!("Collection actor terminated: {err}"),
                Err(err) => {
                    error!("Collection actor failed: {err:#}");
                    self.first_error = Some(err);
                    self.shutdown().await;
                }
            }
        }
        self.first_error.take().map_or(Ok(()), Err)
    }
}
