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

use crate::publishers::{OutputConfig, PublisherError};
use minutely_analytics::event::MinuteResult;
use opentelemetry::KeyValue;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, error, info};

type Output = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, strum_macros::Display)]
pub(crate) enum JsonLinesPublisherActorCommand {
    /// Command to shut down the actor.
    Shutdown(mpsc::Sender<String>),
}

#[derive(Debug, Clone)]
pub struct JsonLinesPublisherStats {
    received: opentelemetry::metrics::Counter<u64>,
    written: opentelemetry::metrics::Counter<u64>,
    failed: opentelemetry::metrics::Counter<u64>,
}

impl JsonLinesPublisherStats {
    pub fn new(meter: opentelemetry::metrics::Meter) -> Self {
        let received = meter
            .u64_counter("minutely.collector.publisher.received")
            .with_description("Number of results received from the aggregation actor")
            .build();
        let written = meter
            .u64_counter("minutely.collector.publisher.written")
            .with_description("Number of results written to the output")
            .build();
        let failed = meter
            .u64_counter("minutely.collector.publisher.failed")
            .with_description("Number of results that failed to be written to the output")
            .build();
        Self {
            received,
            written,
            failed,
        }
    }
}

struct JsonLinesPublisherActor {
    /// Human friendly name of the output for logging purposes
    name: String,
    output: Output,
    msg_recv: async_channel::Receiver<MinuteResult>,
    cmd_recv: mpsc::Receiver<JsonLinesPublisherActorCommand>,
    stats: JsonLinesPublisherStats,
}

impl JsonLinesPublisherActor {
    fn new(
        name: String,
        output: Output,
        msg_recv: async_channel::Receiver<MinuteResult>,
        cmd_recv: mpsc::Receiver<JsonLinesPublisherActorCommand>,
        stats: JsonLinesPublisherStats,
    ) -> Self {
        Self {
            name,
            output,
            msg_recv,
            cmd_recv,
            stats,
        }
    }

    /// Each line is flushed right away so readers of the output never see a
    /// partial result
    async fn write(&mut self, result: &MinuteResult) -> Result<(), PublisherError> {
        let mut line = serde_json::to_vec(result)
            .map_err(|err| PublisherError::SerializationError(err.to_string()))?;
        line.push(b'\n');
        let write_error = |err: std::io::Error| PublisherError::WriteError {
            path: self.name.clone(),
            reason: err.to_string(),
        };
        self.output.write_all(&line).await.map_err(write_error)?;
        self.output.flush().await.map_err(write_error)
    }

    async fn run(mut self) -> anyhow::Result<String> {
        let tags = [KeyValue::new("output", self.name.clone())];
        let mut cmd_open = true;
        loop {
            tokio::select! {
                biased;
                cmd = self.cmd_recv.recv(), if cmd_open => {
                    match cmd {
                        Some(JsonLinesPublisherActorCommand::Shutdown(tx)) => {
                            info!("[{}] Received shutdown command, shutting down", self.name);
                            let _ = tx.send(self.name.clone()).await;
                            return Ok(self.name);
                        }
                        None => {
                            debug!("[{}] Command channel closed, publishing until the results channel closes", self.name);
                            cmd_open = false;
                        }
                    }
                }
                msg = self.msg_recv.recv() => {
                    match msg {
                        Ok(result) => {
                            self.stats.received.add(1, &tags);
                            match self.write(&result).await {
                                Ok(()) => self.stats.written.add(1, &tags),
                                Err(err) => {
                                    error!("[{}] {err}", self.name);
                                    self.stats.failed.add(1, &tags);
                                    return Err(err.into());
                                }
                            }
                        }
                        Err(_) => {
                            info!("[{}] Results channel closed, shutting down", self.name);
                            return Ok(self.name);
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug, strum_macros::Display)]
pub enum JsonLinesPublisherActorHandleError {
    SendError,
    ReceiveError,
}

impl std::error::Error for JsonLinesPublisherActorHandleError {}

#[derive(Debug, Clone)]
pub struct JsonLinesPublisherActorHandle {
    name: String,
    cmd_tx: mpsc::Sender<JsonLinesPublisherActorCommand>,
}

impl JsonLinesPublisherActorHandle {
    pub const fn name(&self) -> &String {
        &self.name
    }

    async fn open_output(config: &OutputConfig) -> Result<(String, Output), PublisherError> {
        match config {
            OutputConfig::Console => {
                let stdout: Output = Box::new(tokio::io::stdout());
                Ok(("console".to_string(), stdout))
            }
            OutputConfig::File { path } => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await
                    .map_err(|err| PublisherError::OpenError {
                        path: path.display().to_string(),
                        reason: err.to_string(),
                    })?;
                let file: Output = Box::new(file);
                Ok((path.display().to_string(), file))
            }
        }
    }

    /// Opens the output, failing early when it can't be written to
    pub async fn from_config(
        config: &OutputConfig,
        msg_recv: async_channel::Receiver<MinuteResult>,
        stats: either::Either<opentelemetry::metrics::Meter, JsonLinesPublisherStats>,
    ) -> Result<(JoinHandle<anyhow::Result<String>>, Self), PublisherError> {
        let (name, output) = Self::open_output(config).await?;
        let stats = match stats {
            either::Left(meter) => JsonLinesPublisherStats::new(meter),
            either::Right(stats) => stats,
        };
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        info!("[{}] Starting JSON lines publisher", name);
        let actor = JsonLinesPublisherActor::new(name.clone(), output, msg_recv, cmd_rx, stats);
        let join_handle = tokio::spawn(actor.run());
        Ok((join_handle, Self { name, cmd_tx }))
    }

    pub async fn shutdown(&self) -> Result<String, JsonLinesPublisherActorHandleError> {
        let (tx, mut rx) = mpsc::channel(1);
        self.cmd_tx
            .send(JsonLinesPublisherActorCommand::Shutdown(tx))
            .await
            .map_err(|_| JsonLinesPublisherActorHandleError::SendError)?;
        match rx.recv().await {
            Some(name) => Ok(name),
            None => Err(JsonLinesPublisherActorHandleError::ReceiveError),
        }
    }
}
