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

//! File-based event input actor module.
//!
//! This module provides the core actor implementation for the event file
//! input:
//! - `FilesActor` - Main actor that replays and follows the event file
//! - `FilesActorHandle` - Handle for controlling the actor and receiving the
//!   parsed events
//! - `FilesActorStats` - Metrics collection for file processing operations
//!
//! ## File Processing Flow
//!
//! 1. Replay every line already present in the file, in file order
//! 2. Stop there, unless the input is configured to follow the file
//! 3. Otherwise poll the file for appended lines every `poll_interval`
//! 4. While the file is missing or unreadable, log and retry every
//!    `retry_interval`
//!
//! Malformed lines are logged, counted and skipped. A closed event channel
//! stops the actor with an error.
use crate::inputs::{
    files::{
        handlers::JsonEventsHandler,
        processor::FileProcessor,
        FilesConfig,
    },
    InputProcessingError,
};
use minutely_analytics::event::Event;
use tokio::{sync::mpsc, task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Upper bound of lines read between two checks of the command channel
const READ_BATCH_SIZE: usize = 1_024;

#[derive(Debug, Clone)]
enum FilesActorCommand {
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct FilesActorStats {
    lines_read: opentelemetry::metrics::Counter<u64>,
    events_sent: opentelemetry::metrics::Counter<u64>,
    malformed_lines: opentelemetry::metrics::Counter<u64>,
    read_errors: opentelemetry::metrics::Counter<u64>,
}

impl FilesActorStats {
    pub fn new(meter: opentelemetry::metrics::Meter) -> Self {
        let lines_read = meter
            .u64_counter("minutely.collector.input.files.lines.read")
            .with_description("Number of lines consumed from the event file")
            .build();
        let events_sent = meter
            .u64_counter("minutely.collector.input.files.events.sent")
            .with_description("Number of parsed events sent downstream")
            .build();
        let malformed_lines = meter
            .u64_counter("minutely.collector.input.files.lines.malformed")
            .with_description("Number of lines skipped because they are not a valid event")
            .build();
        let read_errors = meter
            .u64_counter("minutely.collector.input.files.read.errors")
            .with_description("Errors while reading the event file")
            .build();
        Self {
            lines_read,
            events_sent,
            malformed_lines,
            read_errors,
        }
    }
}

/// Reading half of the actor, kept apart from the command channel so both can
/// be polled in the same `select!`.
struct EventReader {
    processor: FileProcessor,
    handler: JsonEventsHandler,
    tx: async_channel::Sender<Event>,
    stats: FilesActorStats,
}

impl EventReader {
    /// Sends every event currently available in the file, returns how many
    /// were sent.
    async fn drain(&mut self) -> Result<usize, InputProcessingError> {
        let mut sent = 0;
        loop {
            let batch = self
                .processor
                .read_lines::<Event, _>(&mut self.handler, READ_BATCH_SIZE)
                .await?;
            if batch.lines == 0 {
                return Ok(sent);
            }
            self.stats.lines_read.add(batch.lines as u64, &[]);
            for item in batch.items {
                match item {
                    Ok(event) => {
                        self.tx.send(event).await.map_err(|_| {
                            InputProcessingError::ChannelClosed {
                                context: format!("FilesActor ({:?})", self.processor.path()),
                            }
                        })?;
                        self.stats.events_sent.add(1, &[]);
                        sent += 1;
                    }
                    Err(err) => {
                        warn!("Skipping malformed line: {err}");
                        self.stats.malformed_lines.add(
                            1,
                            &[opentelemetry::KeyValue::new("category", err.category())],
                        );
                    }
                }
            }
        }
    }
}

/// Replays, and optionally follows, a single event file
struct FilesActor {
    config: FilesConfig,
    cmd_rx: mpsc::Receiver<FilesActorCommand>,
    reader: EventReader,
}

impl FilesActor {
    fn new(
        config: FilesConfig,
        cmd_rx: mpsc::Receiver<FilesActorCommand>,
        tx: async_channel::Sender<Event>,
        stats: FilesActorStats,
    ) -> Self {
        let processor = FileProcessor::new(config.path(), config.follow());
        Self {
            config,
            cmd_rx,
            reader: EventReader {
                processor,
                handler: JsonEventsHandler::new(),
                tx,
                stats,
            },
        }
    }

    fn shutdown_message(cmd: Option<FilesActorCommand>) -> String {
        match cmd {
            Some(FilesActorCommand::Shutdown) => {
                info!("Files actor shutting down");
                "Files actor terminated after a shutdown command".to_string()
            }
            None => {
                warn!("Files actor terminated due to empty command channel");
                "Files actor terminated due to empty command channel".to_string()
            }
        }
    }

    /// Main actor event loop
    async fn run(mut self) -> anyhow::Result<String> {
        info!("Replaying events from file: {:?}", self.config.path());
        let reader = &mut self.reader;
        let replayed = tokio::select! {
            biased;
            cmd = self.cmd_rx.recv() => return Ok(Self::shutdown_message(cmd)),
            replayed = reader.drain() => replayed?,
        };
        info!(
            "Replayed {replayed} events from file: {:?}",
            self.config.path()
        );
        if !self.config.follow() {
            return Ok(format!(
                "Files actor terminated after replaying {replayed} events"
            ));
        }

        info!("Processing complete. Monitoring for new events...");
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            let reader = &mut self.reader;
            let interval = &mut interval;
            tokio::select! {
                biased;

                cmd = self.cmd_rx.recv() => return Ok(Self::shutdown_message(cmd)),

                result = async {
                    interval.tick().await;
                    reader.drain().await
                } => {
                    match result {
                        Ok(0) => {}
                        Ok(sent) => debug!("Read {sent} new events from file: {:?}", self.config.path()),
                        Err(err @ InputProcessingError::IoError { .. }) => {
                            warn!(
                                "Failed to read file, retrying in {:?}: {err}",
                                self.config.retry_interval()
                            );
                            self.reader.stats.read_errors.add(
                                1,
                                &[opentelemetry::KeyValue::new("category", err.category())],
                            );
                            interval.reset_after(self.config.retry_interval());
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }
    }
}

#[derive(Debug, strum_macros::Display)]
pub enum FilesActorHandleError {
    #[strum(to_string = "error sending command to the files actor: {0}")]
    SendError(String),
}

impl std::error::Error for FilesActorHandleError {}

/// Handle for controlling and communicating with a files actor.
#[derive(Debug, Clone)]
pub struct FilesActorHandle {
    cmd_send: mpsc::Sender<FilesActorCommand>,
    rx: async_channel::Receiver<Event>,
}

impl FilesActorHandle {
    pub fn new(
        config: FilesConfig,
        buffer_size: usize,
        stats: either::Either<opentelemetry::metrics::Meter, FilesActorStats>,
    ) -> (JoinHandle<anyhow::Result<String>>, Self) {
        let (cmd_send, cmd_rx) = mpsc::channel::<FilesActorCommand>(1);
        let (tx, rx) = async_channel::bounded(buffer_size);
        let stats = match stats {
            either::Left(meter) => FilesActorStats::new(meter),
            either::Right(stats) => stats,
        };
        let actor = FilesActor::new(config, cmd_rx, tx, stats);
        let join_handle = tokio::spawn(actor.run());
        let handle = Self { cmd_send, rx };
        (join_handle, handle)
    }

    pub async fn shutdown(&self) -> Result<(), FilesActorHandleError> {
        self.cmd_send
            .send(FilesActorCommand::Shutdown)
            .await
            .map_err(|e| FilesActorHandleError::SendError(e.to_string()))
    }

    /// Events in file order, the channel closes once the actor is done
    pub fn subscribe(&self) -> async_channel::Receiver<Event> {
        self.rx.clone()
    }
}
